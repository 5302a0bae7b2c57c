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

//! A growable memory-mapped byte region
//!
//! Growth is the only operation that invalidates existing pointers into the
//! map. It is gated by a reader-writer lock: ordinary reads and writes into
//! the already-mapped range take the read side and never block each other;
//! a grow takes the write side, unmaps, remaps at the new size and releases.

use {
    crate::engine::error::{Error, ErrorKind, RuntimeResult},
    memmap2::MmapMut,
    parking_lot::{RwLock, RwLockReadGuard},
    std::fs::{File, OpenOptions},
    std::path::Path,
};

/// A growable mmap'd file with a grow-lock discipline
pub struct MappedFile {
    file: File,
    map: RwLock<MmapMut>,
    min_increment: u64,
}

impl MappedFile {
    pub fn open(path: &Path, initial_size: u64, min_increment: u64) -> RuntimeResult<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(path)?;
        let len = file.metadata()?.len();
        let target = len.max(initial_size).max(1);
        file.set_len(target)?;
        let map = unsafe { MmapMut::map_mut(&file)? };
        Ok(Self {
            file,
            map: RwLock::new(map),
            min_increment: min_increment.max(1),
        })
    }

    /// current size of the mapped region in bytes
    pub fn len(&self) -> u64 {
        self.map.read().len() as u64
    }

    /// Grow the map so that `off + len` bytes fit, doubling geometrically
    /// with `min_increment` as a floor
    pub fn ensure(&self, off: u64, len: u64) -> RuntimeResult<()> {
        let needed = off
            .checked_add(len)
            .ok_or_else(|| Error::new(ErrorKind::IOError("offset overflow".into())))?;
        if (self.map.read().len() as u64) >= needed {
            return Ok(());
        }
        let mut guard = self.map.write();
        let mut cur = guard.len() as u64;
        if cur >= needed {
            return Ok(());
        }
        while cur < needed {
            let grown = cur.saturating_mul(2).max(cur + self.min_increment);
            cur = grown;
        }
        self.file.set_len(cur)?;
        // SAFETY: no other thread holds a reference into the old map: all
        // accessors take the read lock for the duration of their access
        // and we hold the write lock here.
        let new_map = unsafe { MmapMut::map_mut(&self.file)? };
        *guard = new_map;
        Ok(())
    }

    /// Borrow a contiguous range `[off, off+len)`, growing first if needed.
    /// The returned guard keeps the grow-lock's read side held for as long
    /// as the slice is live, so a concurrent grow cannot unmap underneath it.
    pub fn get(&self, off: u64, len: u64) -> RuntimeResult<MappedRange<'_>> {
        self.ensure(off, len)?;
        let guard = self.map.read();
        if (off + len) as usize > guard.len() {
            return Err(Error::new(ErrorKind::Corruption(format!(
                "range [{off}, {}) outside mapped region of {} bytes",
                off + len,
                guard.len()
            ))));
        }
        Ok(MappedRange {
            guard,
            off: off as usize,
            len: len as usize,
        })
    }

    /// Write `data` at `off`, growing first if needed.
    ///
    /// Takes only the grow-lock's *read* side — all other accesses,
    /// including writes to individual bytes, hold the read lock and
    /// synchronize through finer-grained locks. Disjointness
    /// between concurrent writers is the caller's responsibility: the data
    /// log relies on monotonically non-overlapping append offsets, the
    /// graph file on its per-node lock array (`GraphFile::lock`) around any
    /// byte range after initial allocation.
    pub fn write_at(&self, off: u64, data: &[u8]) -> RuntimeResult<()> {
        self.ensure(off, data.len() as u64)?;
        let guard = self.map.read();
        let start = off as usize;
        if start + data.len() > guard.len() {
            return Err(Error::new(ErrorKind::Corruption(format!(
                "write range [{start}, {}) outside mapped region of {} bytes",
                start + data.len(),
                guard.len()
            ))));
        }
        // SAFETY: holding the read side of `map` guarantees no concurrent
        // remap invalidates this pointer. Aliasing the read guard's slice
        // as mutable is sound because every caller already serializes
        // writes to any given byte range through a lock outside this type
        // (see doc comment above).
        unsafe {
            let ptr = guard.as_ptr() as *mut u8;
            std::ptr::copy_nonoverlapping(data.as_ptr(), ptr.add(start), data.len());
        }
        Ok(())
    }

    pub fn flush(&self) -> RuntimeResult<()> {
        self.map.read().flush()?;
        Ok(())
    }
}

/// A read-locked view into a [`MappedFile`]'s byte range
pub struct MappedRange<'a> {
    guard: RwLockReadGuard<'a, MmapMut>,
    off: usize,
    len: usize,
}

impl<'a> MappedRange<'a> {
    pub fn as_slice(&self) -> &[u8] {
        &self.guard[self.off..self.off + self.len]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grows_geometrically_and_preserves_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mapped.bin");
        let mf = MappedFile::open(&path, 16, 16).unwrap();
        mf.write_at(0, b"hello").unwrap();
        assert_eq!(mf.get(0, 5).unwrap().as_slice(), b"hello");
        // force a grow past the initial 16 bytes
        mf.write_at(100, b"world").unwrap();
        assert!(mf.len() >= 105);
        assert_eq!(mf.get(100, 5).unwrap().as_slice(), b"world");
        // earlier bytes survived the remap
        assert_eq!(mf.get(0, 5).unwrap().as_slice(), b"hello");
    }

    #[test]
    fn reopens_existing_file_without_truncating() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mapped.bin");
        {
            let mf = MappedFile::open(&path, 64, 64).unwrap();
            mf.write_at(0, b"persisted").unwrap();
            mf.flush().unwrap();
        }
        let mf = MappedFile::open(&path, 64, 64).unwrap();
        assert_eq!(mf.get(0, 9).unwrap().as_slice(), b"persisted");
    }
}
