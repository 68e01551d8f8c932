//! Note repository contract and store-backed implementation.
//!
//! # Responsibility
//! - Map note use-cases onto single store calls.
//! - Provision collection indexes once at construction.
//!
//! # Invariants
//! - Malformed ids and missing documents both surface as `NotFound`.
//! - Every other store error is passed through unchanged in `RepoError::Store`.

use crate::store::StoreError;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub mod indexes;
pub mod note_repo;
pub mod query;

pub type RepoResult<T> = Result<T, RepoError>;

#[derive(Debug)]
pub enum RepoError {
    /// Malformed id, or no matching note.
    NotFound,
    Store(StoreError),
    /// A stored document could not be decoded as a note.
    InvalidData(String),
}

impl RepoError {
    /// Insert or rename collided with an existing title.
    pub fn is_duplicate_key(&self) -> bool {
        matches!(self, Self::Store(err) if err.is_duplicate_key())
    }
}

impl Display for RepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotFound => write!(f, "note not found"),
            Self::Store(err) => write!(f, "{err}"),
            Self::InvalidData(message) => write!(f, "invalid stored note: {message}"),
        }
    }
}

impl Error for RepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Store(err) => Some(err),
            Self::NotFound | Self::InvalidData(_) => None,
        }
    }
}

impl From<StoreError> for RepoError {
    fn from(value: StoreError) -> Self {
        Self::Store(value)
    }
}
