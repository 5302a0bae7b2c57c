/*
 * Created on Thu Jan 08 2026
 *
 * This file is a part of LF
 * LF is a free and open-source globally replicated record graph store
 * with the vision to provide a convergent, append-only trust graph
 * without relying on a central authority.
 *
 * Copyright (c) 2026, LF Developers
 *
 * This program is free software: you can redistribute it and/or modify
 * it under the terms of the GNU Affero General Public License as published by
 * the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * This program is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
 * GNU Affero General Public License for more details.
 *
 * You should have received a copy of the GNU Affero General Public License
 * along with this program. If not, see <https://www.gnu.org/licenses/>.
 *
*/

//! Link-candidate selection for newly-authored records

use crate::engine::{error::RuntimeResult, graph::GraphFile, meta::MetaStore, record::Hash};

/// How much larger a pool to pull from `meta` than `desired`, so the
/// tip/recency/spread rank in step 2-3 has something to rank over.
const POOL_FACTOR: usize = 8;

/// Return up to `desired` record hashes suitable as link targets for a new
/// record, ranked:
/// 1. tips (`linked_count == 0`) first
/// 2. within a bucket, descending `goff` (most recent)
/// 3. fill remainder from the lowest `linked_count`
///
/// `exclude` lists hashes the caller has already chosen, so they are not
/// offered twice.
pub fn get_links(meta: &MetaStore, graph: &GraphFile, desired: usize, exclude: &[Hash]) -> RuntimeResult<Vec<Hash>> {
    if desired == 0 {
        return Ok(Vec::new());
    }
    let pool = meta.recent_candidates(desired.saturating_mul(POOL_FACTOR).max(desired))?;
    let mut ranked: Vec<(bool, u64, u64, Hash)> = Vec::with_capacity(pool.len());
    for (hash, goff) in pool {
        if exclude.contains(&hash) {
            continue;
        }
        let header = match graph.read_header(goff) {
            Ok(h) => h,
            Err(_) => continue,
        };
        ranked.push((header.linked_count == 0, header.linked_count, goff, hash));
    }
    // tips first, then by descending goff within the tip bucket, then by
    // ascending linked_count to spread weight among non-tips
    ranked.sort_by(|a, b| {
        b.0.cmp(&a.0)
            .then_with(|| if a.0 { b.2.cmp(&a.2) } else { a.1.cmp(&b.1) })
            .then_with(|| b.2.cmp(&a.2))
    });
    Ok(ranked.into_iter().take(desired).map(|(_, _, _, h)| h).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::record::NewRecord;
    use crate::engine::store::Store;
    use crate::StoreConfig;

    fn rec(hash: u8, links: Vec<Hash>) -> NewRecord {
        NewRecord {
            hash: [hash; 32],
            id: crate::engine::record::RecordId([hash; 16]),
            owner: vec![1],
            timestamp: 1,
            ttl: 1000,
            score: 1,
            change_owner: None,
            sel0: None,
            sel1: None,
            links,
            bytes: vec![hash],
        }
    }

    #[test]
    fn prefers_tips_then_recency() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(dir.path(), StoreConfig::default()).unwrap();
        store.put_record(rec(1, vec![])).unwrap();
        store.put_record(rec(2, vec![])).unwrap();
        // 2 links to 1, so 1 is no longer a tip; 2 remains a tip
        store.put_record(rec(3, vec![[1; 32]])).unwrap();
        let candidates = store.get_links(1, &[]).unwrap();
        assert_eq!(candidates, vec![[3; 32]]);
    }
}
