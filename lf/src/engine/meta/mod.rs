/*
 * Created on Thu Jan 08 2026
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

//! Relational metadata store
//!
//! A single `rusqlite` connection behind a mutex. The mutex is the
//! metadata store's single-writer lock: all mutations serialize through it,
//! while queries that have already resolved `(doff,dlen)` or `goff` go on
//! to read the data/graph files without touching this lock again.

mod schema;

use {
    crate::engine::{
        error::{Error, ErrorKind, RuntimeResult},
        record::{Hash, NewRecord, RecordId},
    },
    parking_lot::Mutex,
    rusqlite::{params, Connection, OptionalExtension},
    std::path::Path,
};

pub const FILE_NAME: &str = "index.db";

#[derive(Debug, Clone)]
pub struct RecordLocation {
    pub doff: u64,
    pub dlen: u64,
}

#[derive(Debug, Clone)]
pub struct RecordInfo {
    pub hash: Hash,
    pub id: RecordId,
    pub owner: Vec<u8>,
    pub ts: u64,
    pub ttl: u64,
    pub score: u32,
    pub sel0: Option<Vec<u8>>,
    pub sel1: Option<Vec<u8>>,
    pub change_owner: Option<Vec<u8>>,
    pub goff: u64,
    pub doff: u64,
    pub dlen: u64,
    pub link_count: u8,
}

pub struct MetaStore {
    conn: Mutex<Connection>,
}

fn hash_param(h: &Hash) -> &[u8] {
    &h[..]
}

fn row_to_info(row: &rusqlite::Row) -> rusqlite::Result<RecordInfo> {
    let hash_v: Vec<u8> = row.get("hash")?;
    let id_v: Vec<u8> = row.get("id")?;
    let mut hash = [0u8; 32];
    hash.copy_from_slice(&hash_v);
    let mut id = [0u8; 16];
    id.copy_from_slice(&id_v);
    Ok(RecordInfo {
        hash,
        id: RecordId(id),
        owner: row.get("owner")?,
        ts: row.get::<_, i64>("ts")? as u64,
        ttl: row.get::<_, i64>("ttl")? as u64,
        score: row.get::<_, i64>("score")? as u32,
        sel0: row.get("sel0")?,
        sel1: row.get("sel1")?,
        change_owner: row.get("change_owner")?,
        goff: row.get::<_, i64>("goff")? as u64,
        doff: row.get::<_, i64>("doff")? as u64,
        dlen: row.get::<_, i64>("dlen")? as u64,
        link_count: row.get::<_, i64>("link_count")? as u8,
    })
}

impl MetaStore {
    pub fn open(dir: &Path) -> RuntimeResult<Self> {
        let conn = Connection::open(dir.join(FILE_NAME))?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;
        conn.execute_batch(schema::SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Insert a record row and flag it pending weight application in one
    /// transaction. Combining the two closes the crash window between
    /// "record committed" and "record flagged pending" that doing them as
    /// two separate statements would leave open — without it, a crash
    /// between the two writes would strand a record whose score never gets
    /// applied, with nothing on disk to say so. Idempotent: if `hash` is
    /// already present this returns `Ok(false)` rather than an error.
    #[allow(clippy::too_many_arguments)]
    pub fn commit_record(
        &self,
        rec: &NewRecord,
        doff: u64,
        dlen: u64,
        goff: u64,
        hole_count: u32,
    ) -> RuntimeResult<bool> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        let changes = tx.execute(
            "INSERT OR IGNORE INTO record
                (hash, doff, dlen, goff, id, owner, ts, ttl, score, sel0, sel1, change_owner, link_count)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
            params![
                hash_param(&rec.hash),
                doff as i64,
                dlen as i64,
                goff as i64,
                &rec.id.0[..],
                rec.owner,
                rec.timestamp as i64,
                rec.ttl as i64,
                rec.score as i64,
                rec.sel0,
                rec.sel1,
                rec.change_owner,
                rec.links.len() as i64,
            ],
        )?;
        if changes > 0 {
            tx.execute("DELETE FROM wanted WHERE hash = ?1", params![hash_param(&rec.hash)])?;
            tx.execute(
                "INSERT OR REPLACE INTO pending (goff, hole_count) VALUES (?1, ?2)",
                params![goff as i64, hole_count as i64],
            )?;
        }
        tx.commit()?;
        Ok(changes > 0)
    }

    pub fn has_record(&self, hash: &Hash) -> RuntimeResult<bool> {
        let conn = self.conn.lock();
        let found: Option<i64> = conn
            .query_row("SELECT 1 FROM record WHERE hash = ?1", params![hash_param(hash)], |r| r.get(0))
            .optional()?;
        Ok(found.is_some())
    }

    pub fn get_by_hash(&self, hash: &Hash) -> RuntimeResult<RecordLocation> {
        let conn = self.conn.lock();
        conn.query_row(
            "SELECT doff, dlen FROM record WHERE hash = ?1",
            params![hash_param(hash)],
            |r| {
                Ok(RecordLocation {
                    doff: r.get::<_, i64>(0)? as u64,
                    dlen: r.get::<_, i64>(1)? as u64,
                })
            },
        )
        .optional()?
        .ok_or_else(|| Error::new(ErrorKind::NotFound))
    }

    pub fn get_goff_by_hash(&self, hash: &Hash) -> RuntimeResult<u64> {
        let conn = self.conn.lock();
        conn.query_row(
            "SELECT goff FROM record WHERE hash = ?1",
            params![hash_param(hash)],
            |r| r.get::<_, i64>(0),
        )
        .optional()?
        .map(|v| v as u64)
        .ok_or_else(|| Error::new(ErrorKind::NotFound))
    }

    pub fn get_record_info_by_goff(&self, goff: u64) -> RuntimeResult<RecordInfo> {
        let conn = self.conn.lock();
        conn.query_row(
            "SELECT hash, doff, dlen, goff, id, owner, ts, ttl, score, sel0, sel1, change_owner, link_count
             FROM record WHERE goff = ?1",
            params![goff as i64],
            row_to_info,
        )
        .optional()?
        .ok_or_else(|| Error::new(ErrorKind::NotFound))
    }

    /// Ordered pool of recent (hash, goff) pairs for the link-candidate
    /// selector (C5.5) to rank by tip-ness; see `engine::links`.
    pub fn recent_candidates(&self, limit: usize) -> RuntimeResult<Vec<(Hash, u64)>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare("SELECT hash, goff FROM record ORDER BY goff DESC LIMIT ?1")?;
        let rows = stmt
            .query_map(params![limit as i64], |r| {
                let hash_v: Vec<u8> = r.get(0)?;
                let mut hash = [0u8; 32];
                hash.copy_from_slice(&hash_v);
                Ok((hash, r.get::<_, i64>(1)? as u64))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    pub fn add_dangling(&self, hash_wanted: &Hash, holder_goff: u64, link_slot: u8) -> RuntimeResult<()> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT OR REPLACE INTO dangling (hash_wanted, holder_goff, link_slot) VALUES (?1, ?2, ?3)",
            params![hash_param(hash_wanted), holder_goff as i64, link_slot as i64],
        )?;
        Ok(())
    }

    pub fn get_dangling_links(&self, hash_wanted: &Hash) -> RuntimeResult<Vec<(u64, u8)>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare("SELECT holder_goff, link_slot FROM dangling WHERE hash_wanted = ?1")?;
        let rows = stmt
            .query_map(params![hash_param(hash_wanted)], |r| {
                Ok((r.get::<_, i64>(0)? as u64, r.get::<_, i64>(1)? as u8))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    /// All still-dangling slots belonging to a single holder node, used by
    /// the propagator's hole-repair pass.
    pub fn dangling_for_holder(&self, holder_goff: u64) -> RuntimeResult<Vec<(Hash, u8)>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare("SELECT hash_wanted, link_slot FROM dangling WHERE holder_goff = ?1")?;
        let rows = stmt
            .query_map(params![holder_goff as i64], |r| {
                let hash_v: Vec<u8> = r.get(0)?;
                let mut hash = [0u8; 32];
                hash.copy_from_slice(&hash_v);
                Ok((hash, r.get::<_, i64>(1)? as u8))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    pub fn delete_dangling(&self, hash_wanted: &Hash) -> RuntimeResult<()> {
        let conn = self.conn.lock();
        conn.execute("DELETE FROM dangling WHERE hash_wanted = ?1", params![hash_param(hash_wanted)])?;
        Ok(())
    }

    pub fn delete_dangling_slot(&self, holder_goff: u64, link_slot: u8) -> RuntimeResult<()> {
        let conn = self.conn.lock();
        conn.execute(
            "DELETE FROM dangling WHERE holder_goff = ?1 AND link_slot = ?2",
            params![holder_goff as i64, link_slot as i64],
        )?;
        Ok(())
    }

    pub fn add_wanted(&self, hash: &Hash, first_seen_ts: u64) -> RuntimeResult<()> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT OR IGNORE INTO wanted (hash, first_seen_ts, retries) VALUES (?1, ?2, 0)",
            params![hash_param(hash), first_seen_ts as i64],
        )?;
        Ok(())
    }

    pub fn delete_wanted(&self, hash: &Hash) -> RuntimeResult<()> {
        let conn = self.conn.lock();
        conn.execute("DELETE FROM wanted WHERE hash = ?1", params![hash_param(hash)])?;
        Ok(())
    }

    pub fn is_wanted(&self, hash: &Hash) -> RuntimeResult<bool> {
        let conn = self.conn.lock();
        let found: Option<i64> = conn
            .query_row("SELECT 1 FROM wanted WHERE hash = ?1", params![hash_param(hash)], |r| r.get(0))
            .optional()?;
        Ok(found.is_some())
    }

    pub fn add_hole(&self, holder_goff: u64, link_slot: u8) -> RuntimeResult<()> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT OR IGNORE INTO hole (holder_goff, link_slot, retry_count) VALUES (?1, ?2, 0)",
            params![holder_goff as i64, link_slot as i64],
        )?;
        Ok(())
    }

    pub fn get_holes(&self) -> RuntimeResult<Vec<(u64, u8, u32)>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare("SELECT holder_goff, link_slot, retry_count FROM hole")?;
        let rows = stmt
            .query_map([], |r| {
                Ok((
                    r.get::<_, i64>(0)? as u64,
                    r.get::<_, i64>(1)? as u8,
                    r.get::<_, i64>(2)? as u32,
                ))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    /// Current retry count for a single hole, if it has been through at
    /// least one failed repair attempt. `None` means it has never failed
    /// yet (still tracked only in `dangling`, not `hole`).
    pub fn hole_retry_count(&self, holder_goff: u64, link_slot: u8) -> RuntimeResult<Option<u32>> {
        let conn = self.conn.lock();
        let v: Option<i64> = conn
            .query_row(
                "SELECT retry_count FROM hole WHERE holder_goff = ?1 AND link_slot = ?2",
                params![holder_goff as i64, link_slot as i64],
                |r| r.get(0),
            )
            .optional()?;
        Ok(v.map(|v| v as u32))
    }

    pub fn bump_hole_retry(&self, holder_goff: u64, link_slot: u8) -> RuntimeResult<u32> {
        let conn = self.conn.lock();
        conn.execute(
            "UPDATE hole SET retry_count = retry_count + 1 WHERE holder_goff = ?1 AND link_slot = ?2",
            params![holder_goff as i64, link_slot as i64],
        )?;
        let retry: i64 = conn.query_row(
            "SELECT retry_count FROM hole WHERE holder_goff = ?1 AND link_slot = ?2",
            params![holder_goff as i64, link_slot as i64],
            |r| r.get(0),
        )?;
        Ok(retry as u32)
    }

    pub fn delete_hole(&self, holder_goff: u64, link_slot: u8) -> RuntimeResult<()> {
        let conn = self.conn.lock();
        conn.execute(
            "DELETE FROM hole WHERE holder_goff = ?1 AND link_slot = ?2",
            params![holder_goff as i64, link_slot as i64],
        )?;
        Ok(())
    }

    pub fn flag_weight_pending(&self, goff: u64, hole_count: u32) -> RuntimeResult<()> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT OR REPLACE INTO pending (goff, hole_count) VALUES (?1, ?2)",
            params![goff as i64, hole_count as i64],
        )?;
        Ok(())
    }

    pub fn update_pending_hole_count(&self, goff: u64, count: u32) -> RuntimeResult<()> {
        let conn = self.conn.lock();
        conn.execute(
            "UPDATE pending SET hole_count = ?2 WHERE goff = ?1",
            params![goff as i64, count as i64],
        )?;
        Ok(())
    }

    pub fn get_records_for_weight_application(&self) -> RuntimeResult<Vec<u64>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare("SELECT goff FROM pending ORDER BY goff ASC")?;
        let rows = stmt
            .query_map([], |r| r.get::<_, i64>(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows.into_iter().map(|v| v as u64).collect())
    }

    pub fn get_pending_hole_count(&self, goff: u64) -> RuntimeResult<Option<u32>> {
        let conn = self.conn.lock();
        let v: Option<i64> = conn
            .query_row("SELECT hole_count FROM pending WHERE goff = ?1", params![goff as i64], |r| r.get(0))
            .optional()?;
        Ok(v.map(|v| v as u32))
    }

    pub fn delete_completed_pending(&self, goff: u64) -> RuntimeResult<()> {
        let conn = self.conn.lock();
        conn.execute("DELETE FROM pending WHERE goff = ?1", params![goff as i64])?;
        Ok(())
    }

    /// `true` while any record still awaits weight application, whether or
    /// not it currently has holes. `false` implies every record's score has
    /// reached its full transitive closure.
    pub fn has_pending(&self) -> RuntimeResult<bool> {
        let conn = self.conn.lock();
        let found: Option<i64> = conn.query_row("SELECT 1 FROM pending LIMIT 1", [], |r| r.get(0)).optional()?;
        Ok(found.is_some())
    }

    /// First free `doff`, derived from the furthest-extending record row;
    /// used by `Store::open` to reconstruct the data-log append cursor on
    /// restart.
    pub fn get_max_doff(&self) -> RuntimeResult<u64> {
        let conn = self.conn.lock();
        let v: Option<i64> = conn.query_row("SELECT MAX(doff + dlen) FROM record", [], |r| r.get(0))?;
        Ok(v.unwrap_or(0) as u64)
    }

    /// First free `goff`, derived from the furthest-extending graph node.
    /// `header_size` is the fixed node header width (`graph::HEADER_SIZE`);
    /// each node occupies `header_size + link_count * 8` bytes.
    pub fn get_max_goff(&self, header_size: u64) -> RuntimeResult<u64> {
        let conn = self.conn.lock();
        let v: Option<i64> = conn.query_row(
            "SELECT MAX(goff + ?1 + link_count * 8) FROM record",
            params![header_size as i64],
            |r| r.get(0),
        )?;
        Ok(v.unwrap_or(0) as u64)
    }

    /// `(goff, link_count)` for every record, so `Store::open`'s torn-write
    /// healing pass can check each on-disk graph node's `link_count`
    /// against what metadata recorded at insertion time.
    pub fn all_link_counts(&self) -> RuntimeResult<Vec<(u64, u8)>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare("SELECT goff, link_count FROM record")?;
        let rows = stmt
            .query_map([], |r| Ok((r.get::<_, i64>(0)? as u64, r.get::<_, i64>(1)? as u8)))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    pub fn stats(&self) -> RuntimeResult<(u64, u64)> {
        let conn = self.conn.lock();
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM record", [], |r| r.get(0))?;
        let size: Option<i64> = conn.query_row("SELECT SUM(dlen) FROM record", [], |r| r.get(0))?;
        Ok((count as u64, size.unwrap_or(0) as u64))
    }

    /// Stream `(hash, goff)` pairs in ascending `hash` order. `goff` is a
    /// function of insertion order, so folding in `goff` order would make
    /// `CRC64` depend on admission order rather than just the record set;
    /// ascending `hash` is canonical regardless of when each record arrived.
    pub fn all_hashes_by_hash(&self) -> RuntimeResult<Vec<(Hash, u64)>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare("SELECT hash, goff FROM record ORDER BY hash ASC")?;
        let rows = stmt
            .query_map([], |r| {
                let hash_v: Vec<u8> = r.get(0)?;
                let mut hash = [0u8; 32];
                hash.copy_from_slice(&hash_v);
                Ok((hash, r.get::<_, i64>(1)? as u64))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    pub fn matching(
        &self,
        id: Option<&RecordId>,
        owner: Option<&[u8]>,
        sel0: Option<&[u8]>,
        sel1: Option<&[u8]>,
    ) -> RuntimeResult<Vec<RecordInfo>> {
        let conn = self.conn.lock();
        let mut clauses = Vec::new();
        let mut binds: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();
        if let Some(id) = id {
            clauses.push("id = ?".to_string());
            binds.push(Box::new(id.0.to_vec()));
        }
        if let Some(owner) = owner {
            clauses.push("owner = ?".to_string());
            binds.push(Box::new(owner.to_vec()));
        }
        if let Some(sel0) = sel0 {
            clauses.push("sel0 = ?".to_string());
            binds.push(Box::new(sel0.to_vec()));
        }
        if let Some(sel1) = sel1 {
            clauses.push("sel1 = ?".to_string());
            binds.push(Box::new(sel1.to_vec()));
        }
        let where_clause = if clauses.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", clauses.join(" AND "))
        };
        let sql = format!(
            "SELECT hash, doff, dlen, goff, id, owner, ts, ttl, score, sel0, sel1, change_owner, link_count
             FROM record {where_clause} ORDER BY goff ASC"
        );
        let mut stmt = conn.prepare(&sql)?;
        let params_ref: Vec<&dyn rusqlite::ToSql> = binds.iter().map(|b| b.as_ref()).collect();
        let rows = stmt
            .query_map(params_ref.as_slice(), row_to_info)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    pub fn set_config(&self, key: &str, value: &str) -> RuntimeResult<()> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT OR REPLACE INTO config (key, value) VALUES (?1, ?2)",
            params![key, value],
        )?;
        Ok(())
    }

    pub fn get_config(&self, key: &str) -> RuntimeResult<Option<String>> {
        let conn = self.conn.lock();
        let v: Option<String> = conn
            .query_row("SELECT value FROM config WHERE key = ?1", params![key], |r| r.get(0))
            .optional()?;
        Ok(v)
    }
}
