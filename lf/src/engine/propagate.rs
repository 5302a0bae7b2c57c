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

//! The background weight-propagation worker
//!
//! One dedicated OS thread per open store, polling `pending` in ascending
//! `goff` order — the order of admission, which is also what makes `CRC64`
//! deterministic at quiescence. A plain loop with a short sleep when idle is
//! enough — no async runtime involved.

use crate::engine::{
    config::StoreConfig,
    error::RuntimeResult,
    graph::{GraphFile, DANGLING},
    meta::MetaStore,
};
use std::{
    collections::HashSet,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread::JoinHandle,
};

/// Handle to the running propagator thread; `stop` signals it and joins.
pub struct Propagator {
    running: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl Propagator {
    pub fn spawn(meta: Arc<MetaStore>, graph: Arc<GraphFile>, cfg: StoreConfig) -> Self {
        let running = Arc::new(AtomicBool::new(true));
        let thread_running = running.clone();
        let handle = std::thread::Builder::new()
            .name("lf-propagator".into())
            .spawn(move || worker_loop(meta, graph, cfg, thread_running))
            .expect("failed to spawn propagator thread");
        Self {
            running,
            handle: Some(handle),
        }
    }

    /// Signal the worker to stop at the next safe point and join it. The
    /// worker must not be mid-node-lock when it returns.
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(h) = self.handle.take() {
            let _ = h.join();
        }
    }
}

impl Drop for Propagator {
    fn drop(&mut self) {
        self.stop();
    }
}

fn worker_loop(meta: Arc<MetaStore>, graph: Arc<GraphFile>, cfg: StoreConfig, running: Arc<AtomicBool>) {
    while running.load(Ordering::SeqCst) {
        let did_work = match std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            run_pass(&meta, &graph, &cfg, &running)
        })) {
            Ok(Ok(did_work)) => did_work,
            Ok(Err(e)) => {
                log::warn!("weight propagation pass failed: {e}");
                false
            }
            Err(_) => {
                log::error!("weight propagator panicked; worker is exiting, store will stop converging until reopened");
                return;
            }
        };
        if !did_work {
            std::thread::sleep(cfg.propagator_idle_sleep);
        }
    }
}

fn run_pass(meta: &MetaStore, graph: &GraphFile, cfg: &StoreConfig, running: &AtomicBool) -> RuntimeResult<bool> {
    let pending = meta.get_records_for_weight_application()?;
    if pending.is_empty() {
        return Ok(false);
    }
    // Whether any record in this pass actually made progress (a hole was
    // resolved, or a score was applied and the record left `pending`).
    // Records blocked on holes that have exhausted `hole_retry_limit` make
    // none: reporting them as "did work" would keep the worker spinning at
    // full tilt against the metadata store forever instead of idling.
    let mut did_work = false;
    for goff in pending {
        if !running.load(Ordering::SeqCst) {
            break;
        }
        if apply_one(meta, graph, cfg, goff)? {
            did_work = true;
        }
    }
    Ok(did_work)
}

/// One pending record's turn: repair holes if any remain, then — only once
/// the record has zero outstanding holes, whether it started that way or
/// hole repair just finished the job this pass — walk its ancestors and
/// add its score exactly once. Running the ancestor walk unconditionally on
/// every pass while holes remain would re-add the score to already-visited
/// ancestors on each subsequent pass; restricting it to the hole-free pass
/// keeps each record's contribution applied exactly once — the accumulated
/// weight must be an exact sum, never an overcount. Returns whether this
/// record's turn made any real progress.
fn apply_one(meta: &MetaStore, graph: &GraphFile, cfg: &StoreConfig, goff: u64) -> RuntimeResult<bool> {
    let mut holes = meta.get_pending_hole_count(goff)?.unwrap_or(0);
    let mut did_work = false;
    if holes > 0 {
        let (remaining, resolved_any) = repair_holes(meta, graph, cfg, goff)?;
        meta.update_pending_hole_count(goff, remaining)?;
        holes = remaining;
        did_work = resolved_any;
    }
    if holes == 0 {
        let info = meta.get_record_info_by_goff(goff)?;
        apply_score_to_ancestors(graph, goff, info.score)?;
        meta.delete_completed_pending(goff)?;
        did_work = true;
    }
    Ok(did_work)
}

/// Attempt to resolve every still-dangling slot of `holder_goff`. Returns
/// the number of slots still unresolved afterwards, and whether at least
/// one slot was resolved this pass. A slot whose `hole` row has already
/// reached `cfg.hole_retry_limit` is not queried again — it stays pending
/// indefinitely, but the repair attempt itself stays bounded rather than
/// re-querying a hash we already know isn't there on every single pass.
fn repair_holes(meta: &MetaStore, graph: &GraphFile, cfg: &StoreConfig, holder_goff: u64) -> RuntimeResult<(u32, bool)> {
    let mut remaining = 0u32;
    let mut resolved_any = false;
    for (hash_wanted, slot) in meta.dangling_for_holder(holder_goff)? {
        if let Some(retries) = meta.hole_retry_count(holder_goff, slot)? {
            if retries >= cfg.hole_retry_limit {
                remaining += 1;
                continue;
            }
        }
        match meta.get_goff_by_hash(&hash_wanted) {
            Ok(target_goff) => {
                let filled = {
                    let _guard = graph.lock(holder_goff);
                    graph.fill_slot(holder_goff, slot, target_goff)?
                };
                if filled {
                    let _guard = graph.lock(target_goff);
                    graph.increment_linked_count(target_goff)?;
                }
                meta.delete_dangling_slot(holder_goff, slot)?;
                meta.delete_hole(holder_goff, slot)?;
                resolved_any = true;
            }
            Err(_) => {
                meta.add_hole(holder_goff, slot)?;
                let retries = meta.bump_hole_retry(holder_goff, slot)?;
                if retries == cfg.hole_retry_limit {
                    log::warn!(
                        "hole at goff={holder_goff} slot={slot} unresolved after {retries} passes, giving up active retry"
                    );
                }
                remaining += 1;
            }
        }
    }
    Ok((remaining, resolved_any))
}

fn apply_score_to_ancestors(graph: &GraphFile, goff: u64, score: u32) -> RuntimeResult<()> {
    let header = graph.read_header(goff)?;
    let mut stack: Vec<u64> = graph
        .read_slots(goff, header.link_count)?
        .into_iter()
        .filter(|&s| s != DANGLING)
        .map(|s| s as u64)
        .collect();
    let mut visited: HashSet<u64> = HashSet::new();
    while let Some(ancestor) = stack.pop() {
        if !visited.insert(ancestor) {
            continue;
        }
        {
            let _guard = graph.lock(ancestor);
            graph.add_weight(ancestor, score)?;
        }
        let ancestor_header = graph.read_header(ancestor)?;
        for slot in graph.read_slots(ancestor, ancestor_header.link_count)? {
            if slot != DANGLING {
                stack.push(slot as u64);
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{datalog::DataLog, record::NewRecord};
    use std::path::Path;

    fn rec(hash: u8, score: u32, links: Vec<[u8; 32]>) -> NewRecord {
        NewRecord {
            hash: [hash; 32],
            id: crate::engine::record::RecordId([hash; 16]),
            owner: vec![0xAA],
            timestamp: 1,
            ttl: 3600,
            score,
            change_owner: None,
            sel0: None,
            sel1: None,
            links,
            bytes: vec![hash],
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

    fn drain(meta: &MetaStore, graph: &GraphFile, cfg: &StoreConfig) {
        for _ in 0..64 {
            if run_pass(meta, graph, cfg, &AtomicBool::new(true)).unwrap() == false
                && meta.get_records_for_weight_application().unwrap().is_empty()
            {
                break;
            }
        }
    }

    #[test]
    fn diamond_shape_applies_score_once_per_ancestor() {
        let dir = tempfile::tempdir().unwrap();
        let (meta, datalog, graph, cfg) = open_all(dir.path());
        crate::engine::insert::put_record(&meta, &datalog, &graph, &cfg, rec(0, 10, vec![])).unwrap();
        crate::engine::insert::put_record(&meta, &datalog, &graph, &cfg, rec(1, 5, vec![[0; 32]])).unwrap();
        crate::engine::insert::put_record(&meta, &datalog, &graph, &cfg, rec(2, 7, vec![[0; 32]])).unwrap();
        crate::engine::insert::put_record(&meta, &datalog, &graph, &cfg, rec(3, 3, vec![[1; 32], [2; 32]])).unwrap();
        drain(&meta, &graph, &cfg);
        let goff0 = meta.get_goff_by_hash(&[0; 32]).unwrap();
        // record 3's score must reach 0 exactly once even though both of
        // its links pass through it
        assert_eq!(graph.read_header(goff0).unwrap().weight.lo, 5 + 7 + 3);
        assert!(meta.get_records_for_weight_application().unwrap().is_empty());
    }

    #[test]
    fn out_of_order_insertion_converges() {
        let dir = tempfile::tempdir().unwrap();
        let (meta, datalog, graph, cfg) = open_all(dir.path());
        crate::engine::insert::put_record(&meta, &datalog, &graph, &cfg, rec(1, 5, vec![[0; 32]])).unwrap();
        drain(&meta, &graph, &cfg);
        // R0 not present yet: R1 stays pending with one hole
        assert!(!meta.get_records_for_weight_application().unwrap().is_empty());
        crate::engine::insert::put_record(&meta, &datalog, &graph, &cfg, rec(0, 10, vec![])).unwrap();
        drain(&meta, &graph, &cfg);
        assert!(meta.get_records_for_weight_application().unwrap().is_empty());
        let goff0 = meta.get_goff_by_hash(&[0; 32]).unwrap();
        assert_eq!(graph.read_header(goff0).unwrap().weight.lo, 5);
    }
}
