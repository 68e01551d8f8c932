//! Embedded document-store client.
//!
//! # Responsibility
//! - Host JSON document collections on one SQLite connection.
//! - Offer insert/find/update/delete/aggregate/index operations that take a
//!   [`RequestContext`](crate::context::RequestContext).
//!
//! # Invariants
//! - `_id` is assigned once at insert and never rewritten.
//! - Unique index violations surface as [`StoreError::DuplicateKey`].
//! - Text search without a text index fails with
//!   [`StoreError::TextIndexRequired`].

use crate::context::{ContextState, RequestContext};
use once_cell::sync::Lazy;
use regex::Regex;
use rusqlite::ErrorCode;
use std::error::Error;
use std::fmt::{Display, Formatter};

mod collection;
mod database;
mod expiry;
mod index;
mod object_id;
pub mod query;
mod text;

pub use collection::Collection;
pub use database::Database;
pub use index::{IndexKey, IndexKind, IndexModel};
pub use object_id::{ObjectId, ObjectIdParseError};
pub use query::{Accumulator, FindOptions, Filter, GroupAll, SortDirection, SortKey, Update};

/// Stored document shape: a JSON object that always carries `_id` when read back.
pub type Document = serde_json::Map<String, serde_json::Value>;

pub type StoreResult<T> = Result<T, StoreError>;

static NAME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z][A-Za-z0-9_]{0,63}$").expect("valid name regex"));

#[derive(Debug)]
pub enum StoreError {
    Sqlite(rusqlite::Error),
    /// A unique index rejected the write.
    DuplicateKey { message: String },
    /// An index with this name exists with different options.
    IndexConflict { name: String },
    TextIndexRequired { collection: String },
    /// Caller built a request the store cannot execute.
    InvalidRequest(String),
    Serialization(serde_json::Error),
    Cancelled,
    DeadlineExceeded,
}

impl StoreError {
    pub fn is_duplicate_key(&self) -> bool {
        matches!(self, Self::DuplicateKey { .. })
    }
}

impl Display for StoreError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sqlite(err) => write!(f, "{err}"),
            Self::DuplicateKey { message } => write!(f, "duplicate key error: {message}"),
            Self::IndexConflict { name } => {
                write!(f, "index `{name}` already exists with different options")
            }
            Self::TextIndexRequired { collection } => {
                write!(f, "text index required for $search on `{collection}`")
            }
            Self::InvalidRequest(message) => write!(f, "invalid store request: {message}"),
            Self::Serialization(err) => write!(f, "document serialization failed: {err}"),
            Self::Cancelled => write!(f, "operation cancelled"),
            Self::DeadlineExceeded => write!(f, "operation deadline exceeded"),
        }
    }
}

impl Error for StoreError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Sqlite(err) => Some(err),
            Self::Serialization(err) => Some(err),
            _ => None,
        }
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(value: rusqlite::Error) -> Self {
        if is_unique_violation(&value) {
            return Self::DuplicateKey {
                message: value.to_string(),
            };
        }
        Self::Sqlite(value)
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(value: serde_json::Error) -> Self {
        Self::Serialization(value)
    }
}

fn is_unique_violation(err: &rusqlite::Error) -> bool {
    match err {
        rusqlite::Error::SqliteFailure(failure, _) => {
            failure.code == ErrorCode::ConstraintViolation
                && (failure.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
                    || failure.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY)
        }
        _ => false,
    }
}

fn is_interrupt(err: &StoreError) -> bool {
    match err {
        StoreError::Sqlite(inner) => inner.sqlite_error_code() == Some(ErrorCode::OperationInterrupted),
        _ => false,
    }
}

/// Fails fast when `ctx` no longer accepts work.
pub(crate) fn check_context(ctx: &RequestContext) -> StoreResult<()> {
    match ctx.state() {
        ContextState::Live => Ok(()),
        ContextState::Cancelled => Err(StoreError::Cancelled),
        ContextState::DeadlineExceeded => Err(StoreError::DeadlineExceeded),
    }
}

/// Rewrites SQLite interrupts caused by `ctx` into context errors.
pub(crate) fn map_context_error(err: StoreError, ctx: &RequestContext) -> StoreError {
    if !is_interrupt(&err) {
        return err;
    }
    match ctx.state() {
        ContextState::Cancelled => StoreError::Cancelled,
        ContextState::DeadlineExceeded => StoreError::DeadlineExceeded,
        ContextState::Live => err,
    }
}

/// Collection and field names are interpolated into SQL; only plain identifiers pass.
pub(crate) fn validate_name(kind: &str, value: &str) -> StoreResult<()> {
    if NAME_RE.is_match(value) {
        Ok(())
    } else {
        Err(StoreError::InvalidRequest(format!(
            "invalid {kind} name `{value}`"
        )))
    }
}
