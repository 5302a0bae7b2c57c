/*
 * Created on Sat Jan 10 2026
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

//! `Store`: the crate's single entry point, open → serving → close. Owns
//! the mapped files, the metadata store and the propagator thread, and
//! wires the insertion pipeline, link-candidate selector and query surface
//! over them.

use crate::engine::{
    config::StoreConfig,
    datalog::DataLog,
    error::{Error, ErrorKind, RuntimeResult},
    graph::GraphFile,
    insert,
    links,
    meta::MetaStore,
    propagate::Propagator,
    query::{self, RecordView, Stats},
    record::{Hash, NewRecord, RecordId},
};
use std::{fs, path::Path, sync::Arc, time::Instant};

const CONFIG_KEY_NEXT_DOFF: &str = "next_doff";
const CONFIG_KEY_NEXT_GOFF: &str = "next_goff";
const CONFIG_KEY_SCHEMA_VERSION: &str = "schema_version";
const CONFIG_KEY_LAST_CHECKPOINT: &str = "last_checkpoint_ts";
const SCHEMA_VERSION: &str = "1";

/// A single open record-graph store; owns its own worker thread and is
/// independent of any other `Store` open in the same process. No
/// process-wide singletons: multiple stores may coexist as long as they
/// use distinct directories.
pub struct Store {
    meta: Arc<MetaStore>,
    datalog: Arc<DataLog>,
    graph: Arc<GraphFile>,
    cfg: StoreConfig,
    propagator: Option<Propagator>,
    last_checkpoint: parking_lot::Mutex<Instant>,
}

impl Store {
    /// Open (creating if absent) the store directory at `dir`. Runs
    /// recovery before starting the propagator thread.
    pub fn open(dir: &Path, cfg: StoreConfig) -> RuntimeResult<Self> {
        fs::create_dir_all(dir)?;
        let meta = MetaStore::open(dir)?;

        // Recovery step 1: cursor positions. A fresh store has no config
        // rows yet; derive starting cursors from the metadata's own
        // high-water marks so a reopen after a clean shutdown (where
        // `set_config` ran) picks up where it left off, and a reopen after
        // a crash (no config rows written since the last checkpoint) falls
        // back to scanning the furthest-extending record via
        // `get_max_doff`/`get_max_goff`.
        let next_doff = match meta.get_config(CONFIG_KEY_NEXT_DOFF)? {
            Some(v) => v.parse().unwrap_or(0),
            None => meta.get_max_doff()?,
        };
        let next_goff = match meta.get_config(CONFIG_KEY_NEXT_GOFF)? {
            Some(v) => v.parse().unwrap_or(0),
            None => meta.get_max_goff(crate::engine::graph::HEADER_SIZE)?,
        };
        meta.set_config(CONFIG_KEY_SCHEMA_VERSION, SCHEMA_VERSION)?;

        let datalog = DataLog::open(
            dir,
            cfg.mapped_initial_size,
            cfg.mapped_min_increment,
            next_doff,
        )?;
        let graph = GraphFile::open(
            dir,
            cfg.mapped_initial_size,
            cfg.mapped_min_increment,
            next_goff,
            cfg.node_lock_count,
            cfg.node_stride_hint,
        )?;

        // Recovery step 2: validate the cursors are actually inside the
        // files we just mapped. `MappedFile::open` always maps at least
        // `initial_size`, which can legitimately exceed the recorded
        // cursor (unused preallocated space) but must never be smaller
        // than it — that would mean the file was truncated out from under
        // us since the last checkpoint.
        if next_doff > datalog.mapped_len() {
            return Err(Error::new(ErrorKind::Corruption(format!(
                "recorded next_doff {next_doff} exceeds records.log length"
            ))));
        }
        if next_goff > graph.mapped_len() {
            return Err(Error::new(ErrorKind::Corruption(format!(
                "recorded next_goff {next_goff} exceeds graph.bin length"
            ))));
        }

        // Recovery step 3: structural consistency pass. Metadata does not
        // retain resolved link target hashes (only still-dangling ones, in
        // `dangling`), so a torn
        // write's slot *contents* cannot be reconstructed from metadata
        // alone; what recovery can and does check is that each node's
        // on-disk `link_count` still matches the `link_count` recorded at
        // insertion time. A mismatch means the header write was torn and
        // the store is corrupt in a way this crate cannot repair — it is
        // surfaced, not silently patched over.
        for (goff, expected_link_count) in meta.all_link_counts()? {
            let header = graph.read_header(goff)?;
            if header.link_count != expected_link_count {
                return Err(Error::new(ErrorKind::Corruption(format!(
                    "graph node at goff={goff} has link_count {} on disk, {} in metadata",
                    header.link_count, expected_link_count
                ))));
            }
        }

        let meta = Arc::new(meta);
        let datalog = Arc::new(datalog);
        let graph = Arc::new(graph);
        let propagator = Propagator::spawn(meta.clone(), graph.clone(), cfg.clone());

        Ok(Self {
            meta,
            datalog,
            graph,
            cfg,
            propagator: Some(propagator),
            last_checkpoint: parking_lot::Mutex::new(Instant::now()),
        })
    }

    /// Validate, persist and graph-link an incoming record. Returns
    /// `Ok(true)` if newly admitted, `Ok(false)` if `rec.hash` was already
    /// present (an informational duplicate, treated as success by the
    /// caller).
    pub fn put_record(&self, rec: NewRecord) -> RuntimeResult<bool> {
        let admitted = insert::put_record(&self.meta, &self.datalog, &self.graph, &self.cfg, rec)?;
        self.checkpoint_if_due()?;
        Ok(admitted)
    }

    /// Look up a single record by its content hash.
    pub fn get_by_hash(&self, hash: &Hash) -> RuntimeResult<RecordView> {
        query::get_by_hash(&self.meta, &self.datalog, &self.graph, hash)
    }

    /// Look up records matching any subset of the four parameters; `None`
    /// leaves that parameter unconstrained. Rendered as an iterator rather
    /// than a bare callback — the caller drives it with `.for_each`,
    /// `.try_for_each`, or collects it directly.
    pub fn get_matching(
        &self,
        id: Option<&RecordId>,
        owner: Option<&[u8]>,
        sel0: Option<&[u8]>,
        sel1: Option<&[u8]>,
    ) -> RuntimeResult<impl Iterator<Item = RecordView>> {
        let views = query::get_matching(&self.meta, &self.datalog, &self.graph, id, owner, sel0, sel1)?;
        Ok(views.into_iter())
    }

    /// Up to `desired` candidate hashes for a new record's own link array,
    /// ranked tip-first then by recency then by spread. `exclude` is
    /// typically the links the caller has already chosen while
    /// incrementally building one record's list.
    pub fn get_links(&self, desired: usize, exclude: &[Hash]) -> RuntimeResult<Vec<Hash>> {
        links::get_links(&self.meta, &self.graph, desired, exclude)
    }

    pub fn stats(&self) -> RuntimeResult<Stats> {
        query::stats(&self.meta)
    }

    /// Deterministic cross-replica integrity digest; meaningful only at
    /// quiescence.
    pub fn crc64(&self) -> RuntimeResult<u64> {
        query::crc64(&self.meta, &self.graph)
    }

    /// `false` implies every admitted record's score has reached every
    /// ancestor it transitively links to.
    pub fn has_pending(&self) -> RuntimeResult<bool> {
        query::has_pending(&self.meta)
    }

    /// Block the calling thread until `has_pending()` is false or `tries`
    /// polls of `poll_interval` have elapsed. A convenience for tests and
    /// callers that need convergence before reading `crc64()` — this is a
    /// blocking wrapper, not an alternative non-blocking check.
    pub fn wait_quiescent(&self, tries: u32, poll_interval: std::time::Duration) -> RuntimeResult<bool> {
        for _ in 0..tries {
            if !self.has_pending()? {
                return Ok(true);
            }
            std::thread::sleep(poll_interval);
        }
        Ok(!self.has_pending()?)
    }

    /// Persist append cursors if `checkpoint_interval` has elapsed since
    /// the last checkpoint.
    fn checkpoint_if_due(&self) -> RuntimeResult<()> {
        let mut last = self.last_checkpoint.lock();
        if last.elapsed() < self.cfg.checkpoint_interval {
            return Ok(());
        }
        self.checkpoint()?;
        *last = Instant::now();
        Ok(())
    }

    fn checkpoint(&self) -> RuntimeResult<()> {
        self.meta.set_config(CONFIG_KEY_NEXT_DOFF, &self.datalog.next_doff().to_string())?;
        self.meta.set_config(CONFIG_KEY_NEXT_GOFF, &self.graph.next_goff().to_string())?;
        self.meta.set_config(
            CONFIG_KEY_LAST_CHECKPOINT,
            &std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap_or_default()
                .as_secs()
                .to_string(),
        )?;
        self.datalog.flush()?;
        self.graph.flush()?;
        Ok(())
    }

    /// Close the store: stop and join the propagator thread, then write a
    /// final checkpoint. Joining guarantees the worker thread is not
    /// mid-node-lock when this returns.
    pub fn close(mut self) -> RuntimeResult<()> {
        if let Some(mut p) = self.propagator.take() {
            p.stop();
        }
        self.checkpoint()
    }
}

impl Drop for Store {
    fn drop(&mut self) {
        if let Some(mut p) = self.propagator.take() {
            p.stop();
        }
        if let Err(e) = self.checkpoint() {
            log::error!("final checkpoint on drop failed: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::record::RecordId as Rid;

    fn rec(hash: u8, score: u32, links: Vec<Hash>) -> NewRecord {
        NewRecord {
            hash: [hash; 32],
            id: Rid([hash; 16]),
            owner: vec![1],
            timestamp: 1000,
            ttl: 3600,
            score,
            change_owner: None,
            sel0: None,
            sel1: None,
            links,
            bytes: vec![hash; 3],
        }
    }

    fn drained(store: &Store) {
        assert!(store.wait_quiescent(200, std::time::Duration::from_millis(10)).unwrap());
    }

    #[test]
    fn s1_single_record_has_zero_weight_at_quiescence() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(dir.path(), StoreConfig::default()).unwrap();
        store.put_record(rec(0, 10, vec![])).unwrap();
        drained(&store);
        let stats = store.stats().unwrap();
        assert_eq!(stats.record_count, 1);
        let view = store.get_by_hash(&[0; 32]).unwrap();
        assert_eq!(view.weight.lo, 0);
    }

    #[test]
    fn s2_s3_weight_accumulates_through_a_chain() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(dir.path(), StoreConfig::default()).unwrap();
        store.put_record(rec(0, 10, vec![])).unwrap();
        store.put_record(rec(1, 5, vec![[0; 32]])).unwrap();
        drained(&store);
        assert_eq!(store.get_by_hash(&[0; 32]).unwrap().weight.lo, 5);
        assert_eq!(store.get_by_hash(&[1; 32]).unwrap().weight.lo, 0);

        store.put_record(rec(2, 7, vec![[0; 32], [1; 32]])).unwrap();
        drained(&store);
        assert_eq!(store.get_by_hash(&[0; 32]).unwrap().weight.lo, 12);
        assert_eq!(store.get_by_hash(&[1; 32]).unwrap().weight.lo, 7);
        assert_eq!(store.get_by_hash(&[2; 32]).unwrap().weight.lo, 0);
    }

    #[test]
    fn s4_out_of_order_insertion_converges_with_no_leftover_rows() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(dir.path(), StoreConfig::default()).unwrap();
        store.put_record(rec(1, 5, vec![[0; 32]])).unwrap();
        store.put_record(rec(0, 10, vec![])).unwrap();
        drained(&store);
        assert_eq!(store.get_by_hash(&[0; 32]).unwrap().weight.lo, 5);
        assert_eq!(store.get_by_hash(&[1; 32]).unwrap().weight.lo, 0);
        assert!(!store.meta.is_wanted(&[0; 32]).unwrap());
        assert!(store.meta.get_dangling_links(&[0; 32]).unwrap().is_empty());
    }

    #[test]
    fn s5_crc64_is_order_independent_at_quiescence() {
        let dir_a = tempfile::tempdir().unwrap();
        let store_a = Store::open(dir_a.path(), StoreConfig::default()).unwrap();
        store_a.put_record(rec(1, 5, vec![[0; 32]])).unwrap();
        store_a.put_record(rec(0, 10, vec![])).unwrap();
        drained(&store_a);

        let dir_b = tempfile::tempdir().unwrap();
        let store_b = Store::open(dir_b.path(), StoreConfig::default()).unwrap();
        store_b.put_record(rec(0, 10, vec![])).unwrap();
        store_b.put_record(rec(1, 5, vec![[0; 32]])).unwrap();
        drained(&store_b);

        assert_eq!(store_a.crc64().unwrap(), store_b.crc64().unwrap());
    }

    #[test]
    fn duplicate_put_is_a_noop_and_preserves_crc64() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(dir.path(), StoreConfig::default()).unwrap();
        store.put_record(rec(0, 10, vec![])).unwrap();
        drained(&store);
        let before = store.crc64().unwrap();
        assert!(!store.put_record(rec(0, 10, vec![])).unwrap());
        drained(&store);
        assert_eq!(store.crc64().unwrap(), before);
    }

    #[test]
    fn reopen_after_close_preserves_records_and_weights() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = Store::open(dir.path(), StoreConfig::default()).unwrap();
            store.put_record(rec(0, 10, vec![])).unwrap();
            store.put_record(rec(1, 5, vec![[0; 32]])).unwrap();
            drained(&store);
            store.close().unwrap();
        }
        let store = Store::open(dir.path(), StoreConfig::default()).unwrap();
        drained(&store);
        assert_eq!(store.get_by_hash(&[0; 32]).unwrap().weight.lo, 5);
        assert_eq!(store.get_by_hash(&[1; 32]).unwrap().bytes, vec![1, 1, 1]);
    }
}
