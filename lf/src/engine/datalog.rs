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

//! Append-only record-bytes log over the mapped file

use {
    crate::engine::{error::RuntimeResult, mapped::MappedFile},
    std::path::Path,
    std::sync::atomic::{AtomicU64, Ordering},
};

pub const FILE_NAME: &str = "records.log";

/// The append-only data log. `doff` is a stable byte offset into this file.
pub struct DataLog {
    mapped: MappedFile,
    next_doff: AtomicU64,
}

impl DataLog {
    pub fn open(dir: &Path, initial_size: u64, min_increment: u64, next_doff: u64) -> RuntimeResult<Self> {
        let mapped = MappedFile::open(&dir.join(FILE_NAME), initial_size, min_increment)?;
        Ok(Self {
            mapped,
            next_doff: AtomicU64::new(next_doff),
        })
    }

    /// Reserve space for `bytes.len()` bytes and append them, returning the
    /// `doff` they now occupy. The cursor advances unconditionally, even if
    /// a later pipeline step fails — an orphaned append is inert bytes, not
    /// a half-committed record.
    pub fn append(&self, bytes: &[u8]) -> RuntimeResult<u64> {
        let doff = self.next_doff.fetch_add(bytes.len() as u64, Ordering::SeqCst);
        self.mapped.write_at(doff, bytes)?;
        Ok(doff)
    }

    pub fn read(&self, doff: u64, dlen: u64) -> RuntimeResult<Vec<u8>> {
        Ok(self.mapped.get(doff, dlen)?.as_slice().to_vec())
    }

    pub fn next_doff(&self) -> u64 {
        self.next_doff.load(Ordering::SeqCst)
    }

    /// Current size of the backing mapped region in bytes (not the same as
    /// `next_doff`: the map is geometrically over-allocated ahead of the
    /// append cursor).
    pub fn mapped_len(&self) -> u64 {
        self.mapped.len()
    }

    /// Truncate the recovery cursor to `doff`, used when reopening a store
    /// whose on-disk cursor position trails the file length recorded at the
    /// previous checkpoint.
    pub fn set_next_doff(&self, doff: u64) {
        self.next_doff.store(doff, Ordering::SeqCst);
    }

    pub fn flush(&self) -> RuntimeResult<()> {
        self.mapped.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn append_is_monotonic_and_readable() {
        let dir = tempfile::tempdir().unwrap();
        let log = DataLog::open(dir.path(), 64, 64, 0).unwrap();
        let d0 = log.append(b"first").unwrap();
        let d1 = log.append(b"second").unwrap();
        assert_eq!(d0, 0);
        assert_eq!(d1, 5);
        assert_eq!(log.read(d0, 5).unwrap(), b"first");
        assert_eq!(log.read(d1, 6).unwrap(), b"second");
    }
}
