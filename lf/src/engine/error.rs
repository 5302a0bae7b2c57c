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

pub type RuntimeResult<T> = Result<T, Error>;

#[derive(Debug)]
/// The kind of error returned by an engine operation
///
/// `Duplicate` is informational only: a caller that receives it from
/// `PutRecord` should treat the call as a successful no-op.
pub enum ErrorKind {
    /// a malformed input was rejected before any mutation was attempted
    InvalidParameter(&'static str),
    /// `PutRecord` was called with a hash that is already present
    Duplicate,
    /// a lookup found nothing matching the given key
    NotFound,
    /// a file grow, read, write or mmap operation failed
    IOError(String),
    /// a structural inconsistency was detected on disk or in the index
    Corruption(String),
    /// the embedded relational store returned a native error
    Database(String),
    /// the store is shutting down and can no longer accept work
    Cancelled,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidParameter(msg) => write!(f, "invalid parameter: {msg}"),
            Self::Duplicate => write!(f, "duplicate record"),
            Self::NotFound => write!(f, "not found"),
            Self::IOError(msg) => write!(f, "I/O error: {msg}"),
            Self::Corruption(msg) => write!(f, "corruption: {msg}"),
            Self::Database(msg) => write!(f, "database error: {msg}"),
            Self::Cancelled => write!(f, "store is closing"),
        }
    }
}

#[derive(Debug)]
/// An error surfaced by the engine to its caller
pub struct Error {
    kind: ErrorKind,
}

impl Error {
    pub fn new(kind: ErrorKind) -> Self {
        Self { kind }
    }
    pub fn kind(&self) -> &ErrorKind {
        &self.kind
    }
    pub fn is_duplicate(&self) -> bool {
        matches!(self.kind, ErrorKind::Duplicate)
    }
    pub fn is_not_found(&self) -> bool {
        matches!(self.kind, ErrorKind::NotFound)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "lf: {}", self.kind)
    }
}

impl std::error::Error for Error {}

impl From<ErrorKind> for Error {
    fn from(kind: ErrorKind) -> Self {
        Self::new(kind)
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Self::new(ErrorKind::IOError(e.to_string()))
    }
}

impl From<rusqlite::Error> for Error {
    fn from(e: rusqlite::Error) -> Self {
        Self::new(ErrorKind::Database(e.to_string()))
    }
}
