/*
 * Created on Wed Jan 07 2026
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

//! Packed graph-node file over the mapped file
//!
//! Each node is addressed by its byte offset `goff` and packs a fixed
//! header followed by `link_count` signed 64-bit link slots. A slot holds
//! either the `goff` of a resolved ancestor or `-1` for a dangling link.
//! Nodes are allocated at the size their own `link_count` needs, not padded
//! to the 256-link upper bound (see DESIGN.md).

use {
    crate::engine::{
        error::{Error, ErrorKind, RuntimeResult},
        mapped::MappedFile,
        record::Weight,
    },
    bytes::BufMut,
    parking_lot::Mutex,
    std::path::Path,
    std::sync::atomic::{AtomicU64, Ordering},
};

pub const FILE_NAME: &str = "graph.bin";

/// `weight_lo(8) + pad(6)? -> keep explicit offsets below` see field offsets
pub const HEADER_SIZE: u64 = 32;
const OFF_WEIGHT_LO: u64 = 0;
const OFF_WEIGHT_HI: u64 = 8;
const OFF_LINKED_COUNT: u64 = 16;
const OFF_LINK_COUNT: u64 = 24;
const SLOT_SIZE: u64 = 8;

/// sentinel for an unresolved ("dangling") link slot
pub const DANGLING: i64 = -1;

/// In-memory view of a node's fixed header fields
#[derive(Debug, Clone, Copy)]
pub struct NodeHeader {
    pub weight: Weight,
    pub linked_count: u64,
    pub link_count: u8,
}

pub fn node_stride(link_count: u8) -> u64 {
    HEADER_SIZE + link_count as u64 * SLOT_SIZE
}

/// The packed graph-node file plus the per-node lock array guarding
/// concurrent weight/linked_count/slot mutation
pub struct GraphFile {
    mapped: MappedFile,
    next_goff: AtomicU64,
    node_locks: Box<[Mutex<()>]>,
    node_stride_hint: u64,
}

impl GraphFile {
    pub fn open(
        dir: &Path,
        initial_size: u64,
        min_increment: u64,
        next_goff: u64,
        node_lock_count: usize,
        node_stride_hint: u64,
    ) -> RuntimeResult<Self> {
        let mapped = MappedFile::open(&dir.join(FILE_NAME), initial_size, min_increment)?;
        let node_locks = (0..node_lock_count.max(1)).map(|_| Mutex::new(())).collect();
        Ok(Self {
            mapped,
            next_goff: AtomicU64::new(next_goff),
            node_locks,
            node_stride_hint: node_stride_hint.max(1),
        })
    }

    pub fn next_goff(&self) -> u64 {
        self.next_goff.load(Ordering::SeqCst)
    }

    pub fn set_next_goff(&self, goff: u64) {
        self.next_goff.store(goff, Ordering::SeqCst);
    }

    /// Current size of the backing mapped region in bytes.
    pub fn mapped_len(&self) -> u64 {
        self.mapped.len()
    }

    fn lock_index(&self, goff: u64) -> usize {
        ((goff / self.node_stride_hint) as usize) % self.node_locks.len()
    }

    /// Acquire the lock guarding the node at `goff`. Callers performing a
    /// multi-field read-modify-write (e.g. slot fill + linked_count bump)
    /// must hold this for the whole sequence.
    pub fn lock(&self, goff: u64) -> parking_lot::MutexGuard<'_, ()> {
        self.node_locks[self.lock_index(goff)].lock()
    }

    /// Allocate a new node with the given initial link slots, returning its
    /// `goff`. `slots[i]` is either a resolved ancestor `goff` or
    /// [`DANGLING`]. `link_count` must equal `slots.len()`.
    pub fn allocate(&self, slots: &[i64]) -> RuntimeResult<u64> {
        if slots.len() > u8::MAX as usize {
            return Err(Error::new(ErrorKind::InvalidParameter("link_count exceeds 256")));
        }
        let link_count = slots.len() as u8;
        let stride = node_stride(link_count);
        let goff = self.next_goff.fetch_add(stride, Ordering::SeqCst);
        // pack the header + slot array in a scratch buffer before the
        // single mmap write; `bytes::BytesMut`'s put_* calls avoid a
        // hand-rolled offset-tracking cursor
        let mut buf = bytes::BytesMut::with_capacity(stride as usize);
        buf.put_u64_le(0); // weight_lo
        buf.put_u16_le(0); // weight_hi
        buf.put_u64_le(0); // linked_count
        buf.put_u8(link_count);
        buf.put_bytes(0, (HEADER_SIZE as usize) - buf.len());
        for s in slots {
            buf.put_i64_le(*s);
        }
        self.mapped.write_at(goff, &buf)?;
        Ok(goff)
    }

    pub fn read_header(&self, goff: u64) -> RuntimeResult<NodeHeader> {
        let range = self.mapped.get(goff, HEADER_SIZE)?;
        let b = range.as_slice();
        let weight = Weight::from_bytes(&b[OFF_WEIGHT_LO as usize..OFF_WEIGHT_LO as usize + 10].try_into().unwrap());
        let linked_count = u64::from_le_bytes(
            b[OFF_LINKED_COUNT as usize..OFF_LINK_COUNT as usize]
                .try_into()
                .unwrap(),
        );
        let link_count = b[OFF_LINK_COUNT as usize];
        Ok(NodeHeader {
            weight,
            linked_count,
            link_count,
        })
    }

    pub fn read_slots(&self, goff: u64, link_count: u8) -> RuntimeResult<Vec<i64>> {
        if link_count == 0 {
            return Ok(Vec::new());
        }
        let len = link_count as u64 * SLOT_SIZE;
        let range = self.mapped.get(goff + HEADER_SIZE, len)?;
        let b = range.as_slice();
        Ok(b.chunks_exact(8)
            .map(|c| i64::from_le_bytes(c.try_into().unwrap()))
            .collect())
    }

    pub fn read_slot(&self, goff: u64, slot: u8) -> RuntimeResult<i64> {
        let off = goff + HEADER_SIZE + slot as u64 * SLOT_SIZE;
        let range = self.mapped.get(off, SLOT_SIZE)?;
        Ok(i64::from_le_bytes(range.as_slice().try_into().unwrap()))
    }

    /// Fill a dangling slot with a resolved `goff`. The caller must hold
    /// `self.lock(goff)`. Never reverts a non-dangling slot: once a hole is
    /// resolved it is written exactly once and never reverts to `-1`.
    pub fn fill_slot(&self, goff: u64, slot: u8, target_goff: u64) -> RuntimeResult<bool> {
        let current = self.read_slot(goff, slot)?;
        if current != DANGLING {
            return Ok(false);
        }
        let off = goff + HEADER_SIZE + slot as u64 * SLOT_SIZE;
        self.mapped.write_at(off, &(target_goff as i64).to_le_bytes())?;
        Ok(true)
    }

    /// Caller must hold `self.lock(goff)`.
    pub fn increment_linked_count(&self, goff: u64) -> RuntimeResult<()> {
        let header = self.read_header(goff)?;
        let next = header.linked_count + 1;
        self.mapped
            .write_at(goff + OFF_LINKED_COUNT, &next.to_le_bytes())?;
        Ok(())
    }

    /// Caller must hold `self.lock(goff)`.
    pub fn add_weight(&self, goff: u64, score: u32) -> RuntimeResult<()> {
        let header = self.read_header(goff)?;
        let next = header.weight.saturating_add_u32(score);
        self.mapped.write_at(goff + OFF_WEIGHT_LO, &next.to_bytes())?;
        Ok(())
    }

    pub fn flush(&self) -> RuntimeResult<()> {
        self.mapped.flush()
    }
}
