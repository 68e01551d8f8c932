//! Note collection index provisioning.
//!
//! # Responsibility
//! - Ensure the title uniqueness, text search and expiry indexes exist.
//! - Separate fatal failures from advisory ones.
//!
//! # Invariants
//! - Title and text index failures abort repository construction.
//! - Expiry index failure only disables automatic expiry.

use crate::context::RequestContext;
use crate::repo::RepoResult;
use crate::store::{Collection, IndexModel};
use log::{info, warn};
use std::time::{Duration, Instant};

pub const TITLE_FIELD: &str = "title";
pub const CONTENT_FIELD: &str = "content";
pub const EXPIRES_AT_FIELD: &str = "expiresAt";

/// Outcome of [`ensure_note_indexes`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexReport {
    /// `false` when the expiry index could not be created.
    pub expiry_enabled: bool,
}

pub fn title_index() -> IndexModel {
    IndexModel::ascending(TITLE_FIELD).unique()
}

pub fn text_index() -> IndexModel {
    IndexModel::text(&[TITLE_FIELD, CONTENT_FIELD])
}

/// Zero offset: a note is removed once its own `expiresAt` has passed.
pub fn expiry_index() -> IndexModel {
    IndexModel::ascending(EXPIRES_AT_FIELD).expire_after(Duration::ZERO)
}

/// Idempotently creates the note indexes on `collection`.
///
/// # Errors
/// - Returns the store error when the title or text index cannot be created.
pub fn ensure_note_indexes(ctx: &RequestContext, collection: &Collection) -> RepoResult<IndexReport> {
    let started_at = Instant::now();
    info!(
        "event=index_provision module=index status=start collection={}",
        collection.name()
    );

    for model in [title_index(), text_index()] {
        if let Err(err) = collection.create_index(ctx, &model) {
            warn!(
                "event=index_provision module=index status=error collection={} index={} error={}",
                collection.name(),
                model.name(),
                err
            );
            return Err(err.into());
        }
    }

    let expiry = expiry_index();
    let expiry_enabled = match collection.create_index(ctx, &expiry) {
        Ok(_) => true,
        Err(err) => {
            warn!(
                "event=index_provision module=index status=degraded collection={} index={} error={}",
                collection.name(),
                expiry.name(),
                err
            );
            false
        }
    };

    info!(
        "event=index_provision module=index status=ok collection={} expiry_enabled={} duration_ms={}",
        collection.name(),
        expiry_enabled,
        started_at.elapsed().as_millis()
    );
    Ok(IndexReport { expiry_enabled })
}
