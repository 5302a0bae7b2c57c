/*
 * Created on Fri Jan 09 2026
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

//! The read surface: `GetByHash`, `GetMatching`, `Stats`, `CRC64`,
//! `HasPending`

use crate::engine::{
    datalog::DataLog,
    error::RuntimeResult,
    graph::GraphFile,
    meta::MetaStore,
    record::{Hash, RecordId, Weight},
};
use crc::{Crc, CRC_64_ECMA_182};

/// A fully-resolved record as handed back to callers: metadata, the
/// record's own bytes, and its current weight (which may still be rising
/// if the background propagator hasn't caught up).
#[derive(Debug, Clone)]
pub struct RecordView {
    pub hash: Hash,
    pub id: RecordId,
    pub owner: Vec<u8>,
    pub ts: u64,
    pub ttl: u64,
    pub score: u32,
    pub sel0: Option<Vec<u8>>,
    pub sel1: Option<Vec<u8>>,
    pub change_owner: Option<Vec<u8>>,
    pub links: Vec<Option<Hash>>,
    pub weight: Weight,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Stats {
    pub record_count: u64,
    pub data_log_bytes: u64,
}

fn resolve(meta: &MetaStore, datalog: &DataLog, graph: &GraphFile, goff: u64) -> RuntimeResult<RecordView> {
    let info = meta.get_record_info_by_goff(goff)?;
    let header = graph.read_header(goff)?;
    let bytes = datalog.read(info.doff, info.dlen)?;
    Ok(RecordView {
        hash: info.hash,
        id: info.id,
        owner: info.owner,
        ts: info.ts,
        ttl: info.ttl,
        score: info.score,
        sel0: info.sel0,
        sel1: info.sel1,
        change_owner: info.change_owner,
        links: resolve_link_hashes(meta, graph, goff, header.link_count)?,
        weight: header.weight,
        bytes,
    })
}

fn resolve_link_hashes(
    meta: &MetaStore,
    graph: &GraphFile,
    goff: u64,
    link_count: u8,
) -> RuntimeResult<Vec<Option<Hash>>> {
    let slots = graph.read_slots(goff, link_count)?;
    let mut out = Vec::with_capacity(slots.len());
    for slot in slots {
        if slot == crate::engine::graph::DANGLING {
            out.push(None);
        } else {
            let info = meta.get_record_info_by_goff(slot as u64)?;
            out.push(Some(info.hash));
        }
    }
    Ok(out)
}

pub fn get_by_hash(meta: &MetaStore, datalog: &DataLog, graph: &GraphFile, hash: &Hash) -> RuntimeResult<RecordView> {
    let goff = meta.get_goff_by_hash(hash)?;
    resolve(meta, datalog, graph, goff)
}

/// All records matching the given (optional) criteria, in ascending `goff`
/// order. There is no general query language — only this fixed set of
/// lookup parameters.
pub fn get_matching(
    meta: &MetaStore,
    datalog: &DataLog,
    graph: &GraphFile,
    id: Option<&RecordId>,
    owner: Option<&[u8]>,
    sel0: Option<&[u8]>,
    sel1: Option<&[u8]>,
) -> RuntimeResult<Vec<RecordView>> {
    let infos = meta.matching(id, owner, sel0, sel1)?;
    let mut out = Vec::with_capacity(infos.len());
    for info in infos {
        out.push(resolve(meta, datalog, graph, info.goff)?);
    }
    Ok(out)
}

pub fn stats(meta: &MetaStore) -> RuntimeResult<Stats> {
    let (record_count, data_log_bytes) = meta.stats()?;
    Ok(Stats {
        record_count,
        data_log_bytes,
    })
}

pub fn has_pending(meta: &MetaStore) -> RuntimeResult<bool> {
    meta.has_pending()
}

/// Deterministic cross-replica integrity digest: fold each
/// record's hash and current weight, in ascending `hash` order, into one
/// CRC-64/ECMA-182 checksum. Ascending `hash` (not `goff`, which is a
/// function of insertion order) is what makes two replicas holding the same
/// records at quiescence (`HasPending() == false`) produce the same digest
/// regardless of the order the records were admitted in.
pub fn crc64(meta: &MetaStore, graph: &GraphFile) -> RuntimeResult<u64> {
    const ALGO: Crc<u64> = Crc::<u64>::new(&CRC_64_ECMA_182);
    let mut digest = ALGO.digest();
    for (hash, goff) in meta.all_hashes_by_hash()? {
        digest.update(&hash);
        let header = graph.read_header(goff)?;
        digest.update(&header.weight.to_bytes());
    }
    Ok(digest.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{config::StoreConfig, record::NewRecord};
    use crate::engine::{datalog::DataLog, graph::GraphFile, insert::put_record, meta::MetaStore};
    use std::path::Path;

    fn rec(hash: u8, links: Vec<Hash>) -> NewRecord {
        NewRecord {
            hash: [hash; 32],
            id: RecordId([hash; 16]),
            owner: vec![9],
            timestamp: 1,
            ttl: 100,
            score: 4,
            change_owner: None,
            sel0: Some(vec![1]),
            sel1: None,
            links,
            bytes: vec![hash, hash],
        }
    }

    fn open_all(dir: &Path) -> (MetaStore, DataLog, GraphFile, StoreConfig) {
        let cfg = StoreConfig::default();
        let meta = MetaStore::open(dir).unwrap();
        let datalog = DataLog::open(dir, cfg.mapped_initial_size, cfg.mapped_min_increment, 0).unwrap();
        let graph = GraphFile::open(
            dir,
            cfg.mapped_initial_size,
            cfg.mapped_min_increment,
            0,
            cfg.node_lock_count,
            cfg.node_stride_hint,
        )
        .unwrap();
        (meta, datalog, graph, cfg)
    }

    #[test]
    fn get_by_hash_round_trips_bytes_and_selector() {
        let dir = tempfile::tempdir().unwrap();
        let (meta, datalog, graph, cfg) = open_all(dir.path());
        put_record(&meta, &datalog, &graph, &cfg, rec(5, vec![])).unwrap();
        let view = get_by_hash(&meta, &datalog, &graph, &[5; 32]).unwrap();
        assert_eq!(view.bytes, vec![5, 5]);
        assert_eq!(view.sel0, Some(vec![1]));
        assert!(view.links.is_empty());
    }

    #[test]
    fn get_matching_filters_by_owner_in_goff_order() {
        let dir = tempfile::tempdir().unwrap();
        let (meta, datalog, graph, cfg) = open_all(dir.path());
        put_record(&meta, &datalog, &graph, &cfg, rec(1, vec![])).unwrap();
        put_record(&meta, &datalog, &graph, &cfg, rec(2, vec![])).unwrap();
        let views = get_matching(&meta, &datalog, &graph, None, Some(&[9]), None, None).unwrap();
        assert_eq!(views.len(), 2);
        assert!(views[0].hash < views[1].hash || views[0].hash == [1; 32]);
    }

    #[test]
    fn crc64_is_stable_across_two_identical_runs() {
        let dir_a = tempfile::tempdir().unwrap();
        let (meta_a, datalog_a, graph_a, cfg_a) = open_all(dir_a.path());
        put_record(&meta_a, &datalog_a, &graph_a, &cfg_a, rec(1, vec![])).unwrap();

        let dir_b = tempfile::tempdir().unwrap();
        let (meta_b, datalog_b, graph_b, cfg_b) = open_all(dir_b.path());
        put_record(&meta_b, &datalog_b, &graph_b, &cfg_b, rec(1, vec![])).unwrap();

        assert_eq!(crc64(&meta_a, &graph_a).unwrap(), crc64(&meta_b, &graph_b).unwrap());
    }
}
