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

//! # LF — record graph storage engine
//!
//! LF stores records in a directed acyclic graph: every record links to a
//! handful of prior records, and a record's trust weight is the transitive
//! sum of the scores of every record that directly or indirectly links to
//! it. This crate is the storage core only — the data log, the graph file,
//! the metadata index, the insertion pipeline and the background weight
//! propagator. Networking, the FUSE façade and record signing live above
//! this crate and are not its concern.

pub mod engine;

pub use engine::{
    config::StoreConfig,
    error::{Error, ErrorKind},
    query::RecordView,
    record::{NewRecord, RecordId},
    store::Store,
};
