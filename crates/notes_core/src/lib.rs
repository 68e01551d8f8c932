//! Notes data-access layer over an embedded document store.
//! This crate is the single source of truth for note storage semantics.

pub mod config;
pub mod context;
pub mod logging;
pub mod model;
pub mod repo;
pub mod store;

pub use config::{ConfigError, RepoConfig, StoreConfig};
pub use context::{CancelHandle, ContextState, RequestContext};
pub use logging::{default_log_level, init_logging, logging_status};
pub use model::note::{NewNote, Note, NoteId, NotePatch, NoteStats, NoteValidationError};
pub use repo::indexes::IndexReport;
pub use repo::note_repo::{NoteRepository, StoreNoteRepository};
pub use repo::query::{NoteCursorQuery, NoteListQuery, NOTES_DEFAULT_LIMIT, NOTES_LIMIT_MAX};
pub use repo::{RepoError, RepoResult};
pub use store::{Database, StoreError, StoreResult};

/// Minimal health-check API for caller wiring.
pub fn ping() -> &'static str {
    "pong"
}

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
