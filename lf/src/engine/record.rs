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

use std::fmt;

/// 32-byte content digest; the primary key of a record
pub type Hash = [u8; 32];

#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
/// Opaque, fixed-size identity token
pub struct RecordId(pub [u8; 16]);

impl fmt::Debug for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for b in &self.0 {
            write!(f, "{b:02x}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
impl From<uuid::Uuid> for RecordId {
    fn from(u: uuid::Uuid) -> Self {
        Self(*u.as_bytes())
    }
}

/// 80-bit saturating weight counter, stored little-endian as `(lo: u64, hi: u16)`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Weight {
    pub lo: u64,
    pub hi: u16,
}

impl Weight {
    pub const ZERO: Self = Self { lo: 0, hi: 0 };

    pub fn saturating_add_u32(self, score: u32) -> Self {
        let (lo, carry) = self.lo.overflowing_add(score as u64);
        let hi = if carry {
            self.hi.saturating_add(1)
        } else {
            self.hi
        };
        Self { lo, hi }
    }

    pub fn to_bytes(self) -> [u8; 10] {
        let mut out = [0u8; 10];
        out[..8].copy_from_slice(&self.lo.to_le_bytes());
        out[8..].copy_from_slice(&self.hi.to_le_bytes());
        out
    }

    pub fn from_bytes(b: &[u8; 10]) -> Self {
        let mut lo_bytes = [0u8; 8];
        lo_bytes.copy_from_slice(&b[..8]);
        let mut hi_bytes = [0u8; 2];
        hi_bytes.copy_from_slice(&b[8..]);
        Self {
            lo: u64::from_le_bytes(lo_bytes),
            hi: u16::from_le_bytes(hi_bytes),
        }
    }
}

/// A validated record as accepted by [`crate::Store::put_record`]
///
/// The core does not verify signatures, proof-of-work or bytes-to-hash
/// correspondence; the caller is expected to have already done that.
#[derive(Debug, Clone)]
pub struct NewRecord {
    pub hash: Hash,
    pub id: RecordId,
    pub owner: Vec<u8>,
    pub timestamp: u64,
    pub ttl: u64,
    pub score: u32,
    pub change_owner: Option<Vec<u8>>,
    pub sel0: Option<Vec<u8>>,
    pub sel1: Option<Vec<u8>>,
    pub links: Vec<Hash>,
    pub bytes: Vec<u8>,
}

impl NewRecord {
    pub fn expires_at(&self) -> u64 {
        self.timestamp.saturating_add(self.ttl)
    }
}
