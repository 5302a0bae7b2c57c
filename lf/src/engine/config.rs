/*
 * Created on Tue Jan 06 2026
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

use std::time::Duration;

/// In-process tunables for a [`crate::Store`]
///
/// This is a plain struct, not a file format: loading configuration from a
/// file, environment or CLI flags is a concern of the caller (a daemon, a
/// test harness), not of the storage engine.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// initial size, in bytes, of `records.log` and `graph.bin`
    pub mapped_initial_size: u64,
    /// minimum growth increment, in bytes, once the mapped region is full
    pub mapped_min_increment: u64,
    /// number of mutexes in the per-graph-node lock array; should be prime
    /// to spread contiguous `goff` allocations across locks
    pub node_lock_count: usize,
    /// byte stride used to derive a node's lock index from its `goff`
    pub node_stride_hint: u64,
    /// how long the propagator sleeps when it finds nothing pending
    pub propagator_idle_sleep: Duration,
    /// passes a dangling link slot may go unresolved before the
    /// propagator stops actively retrying it
    pub hole_retry_limit: u32,
    /// minimum wall-clock interval between metadata checkpoints
    pub checkpoint_interval: Duration,
    /// maximum accepted length, in bytes, for `owner` and `change_owner`
    pub max_owner_len: usize,
    /// maximum accepted length, in bytes, for `sel0`/`sel1`
    pub max_selector_len: usize,
    /// maximum accepted `links.len()` for a single record
    pub max_links: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            mapped_initial_size: 1 << 20,
            mapped_min_increment: 1 << 20,
            node_lock_count: 197,
            node_stride_hint: 64,
            propagator_idle_sleep: Duration::from_millis(25),
            hole_retry_limit: 16,
            checkpoint_interval: Duration::from_secs(3600),
            max_owner_len: 64,
            max_selector_len: 64,
            max_links: 256,
        }
    }
}
