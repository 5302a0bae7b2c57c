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

//! The insertion pipeline: `PutRecord`

use crate::engine::{
    config::StoreConfig,
    datalog::DataLog,
    error::{Error, ErrorKind, RuntimeResult},
    graph::{GraphFile, DANGLING},
    meta::MetaStore,
    record::NewRecord,
};

/// Validate a [`NewRecord`] against the configured bounds before any
/// mutation is attempted.
fn validate(rec: &NewRecord, cfg: &StoreConfig) -> RuntimeResult<()> {
    if rec.links.len() > cfg.max_links {
        return Err(Error::new(ErrorKind::InvalidParameter("link count exceeds maximum")));
    }
    if rec.owner.len() > cfg.max_owner_len {
        return Err(Error::new(ErrorKind::InvalidParameter("owner exceeds maximum length")));
    }
    if let Some(co) = &rec.change_owner {
        if co.len() > cfg.max_owner_len {
            return Err(Error::new(ErrorKind::InvalidParameter(
                "change_owner exceeds maximum length",
            )));
        }
    }
    for sel in [&rec.sel0, &rec.sel1].into_iter().flatten() {
        if sel.len() > cfg.max_selector_len {
            return Err(Error::new(ErrorKind::InvalidParameter("selector exceeds maximum length")));
        }
    }
    Ok(())
}

/// Run the full admission sequence for one record: duplicate check, data
/// append, graph node allocation, link resolution, metadata commit, hole
/// backfill. Returns `Ok(true)` if the record was newly admitted, `Ok(false)`
/// if it was a duplicate (informational no-op).
pub fn put_record(
    meta: &MetaStore,
    datalog: &DataLog,
    graph: &GraphFile,
    cfg: &StoreConfig,
    rec: NewRecord,
) -> RuntimeResult<bool> {
    validate(&rec, cfg)?;

    // step 1: duplicate check
    if meta.has_record(&rec.hash)? {
        return Ok(false);
    }

    // step 2: append data
    let doff = datalog.append(&rec.bytes)?;
    let dlen = rec.bytes.len() as u64;

    // step 3: allocate graph node, slots optimistically dangling
    let optimistic_slots = vec![DANGLING; rec.links.len()];
    let goff = graph.allocate(&optimistic_slots)?;

    // step 4: resolve links. `goff` is not yet visible to any other thread
    // (its metadata row isn't committed until step 5), so filling its own
    // slots needs no lock; bumping a target's `linked_count` does, since
    // other inserts or the propagator may touch that node concurrently.
    let mut hole_count: u32 = 0;
    for (i, link_hash) in rec.links.iter().enumerate() {
        let slot = i as u8;
        match meta.get_goff_by_hash(link_hash) {
            Ok(target_goff) => {
                graph.fill_slot(goff, slot, target_goff)?;
                let _guard = graph.lock(target_goff);
                graph.increment_linked_count(target_goff)?;
            }
            Err(e) if e.is_not_found() => {
                meta.add_dangling(link_hash, goff, slot)?;
                if !meta.has_record(link_hash)? {
                    meta.add_wanted(link_hash, rec.timestamp)?;
                }
                hole_count += 1;
            }
            Err(e) => return Err(e),
        }
    }

    // steps 5 & 7: persist metadata and flag pending in one transaction
    // (also clears any wanted(hash) row) — see `MetaStore::commit_record`
    // for why these two are combined. `commit_record` uses INSERT OR IGNORE
    // to guard the case where a concurrent `put_record` for the same hash
    // won the race between this thread's step-1 duplicate check and now: if
    // our row lost, `goff` is an orphaned, uncommitted node that no metadata
    // row points at, and must not be used to backfill anyone else's holes.
    if !meta.commit_record(&rec, doff, dlen, goff, hole_count)? {
        return Ok(false);
    }

    // step 6: backfill holes that point to this record. The two node
    // mutations never nest: `holder_goff` and `goff` are locked one at a
    // time, never both at once, so no lock-ordering discipline is needed.
    for (holder_goff, slot) in meta.get_dangling_links(&rec.hash)? {
        let filled = {
            let _guard = graph.lock(holder_goff);
            graph.fill_slot(holder_goff, slot, goff)?
        };
        if filled {
            let _guard = graph.lock(goff);
            graph.increment_linked_count(goff)?;
        }
        meta.delete_dangling_slot(holder_goff, slot)?;
        meta.delete_hole(holder_goff, slot)?;
        if let Some(count) = meta.get_pending_hole_count(holder_goff)? {
            if count > 0 {
                meta.update_pending_hole_count(holder_goff, count - 1)?;
            }
        }
    }
    meta.delete_dangling(&rec.hash)?;

    Ok(true)
}
