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

//! DDL for the relational metadata store

pub const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS record (
    hash         BLOB PRIMARY KEY,
    doff         INTEGER NOT NULL,
    dlen         INTEGER NOT NULL,
    goff         INTEGER NOT NULL,
    id           BLOB NOT NULL,
    owner        BLOB NOT NULL,
    ts           INTEGER NOT NULL,
    ttl          INTEGER NOT NULL,
    score        INTEGER NOT NULL,
    sel0         BLOB,
    sel1         BLOB,
    change_owner BLOB,
    link_count   INTEGER NOT NULL
);
CREATE UNIQUE INDEX IF NOT EXISTS record_goff ON record(goff);
CREATE INDEX IF NOT EXISTS record_id ON record(id);
CREATE INDEX IF NOT EXISTS record_owner ON record(owner);
CREATE INDEX IF NOT EXISTS record_sel0 ON record(sel0);
CREATE INDEX IF NOT EXISTS record_sel1 ON record(sel1);

CREATE TABLE IF NOT EXISTS dangling (
    hash_wanted BLOB NOT NULL,
    holder_goff INTEGER NOT NULL,
    link_slot   INTEGER NOT NULL,
    PRIMARY KEY (holder_goff, link_slot)
);
CREATE INDEX IF NOT EXISTS dangling_wanted ON dangling(hash_wanted);

CREATE TABLE IF NOT EXISTS wanted (
    hash          BLOB PRIMARY KEY,
    first_seen_ts INTEGER NOT NULL,
    retries       INTEGER NOT NULL DEFAULT 0
);

CREATE TABLE IF NOT EXISTS hole (
    holder_goff INTEGER NOT NULL,
    link_slot   INTEGER NOT NULL,
    retry_count INTEGER NOT NULL DEFAULT 0,
    PRIMARY KEY (holder_goff, link_slot)
);

CREATE TABLE IF NOT EXISTS pending (
    goff       INTEGER PRIMARY KEY,
    hole_count INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS config (
    key   TEXT PRIMARY KEY,
    value TEXT NOT NULL
);
";
