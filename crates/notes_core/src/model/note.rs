//! Note domain model.
//!
//! # Responsibility
//! - Define the stored note document and its stats projection.
//! - Provide the create/update inputs used by the repository.
//!
//! # Invariants
//! - `id` is assigned by the store at insert and never changes.
//! - `updated_at >= created_at`.
//! - `expires_at`, when set, is strictly after `created_at`.

use crate::store::ObjectId;
use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::time::Duration;

/// Store-assigned note identifier.
pub type NoteId = ObjectId;

/// One note document as stored in the `notes` collection.
///
/// Timestamps are stored as epoch milliseconds; `expiresAt` is omitted when
/// the note does not expire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Note {
    #[serde(rename = "_id")]
    pub id: NoteId,
    pub title: String,
    pub content: String,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub updated_at: DateTime<Utc>,
    #[serde(
        default,
        with = "chrono::serde::ts_milliseconds_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub expires_at: Option<DateTime<Utc>>,
}

/// Broken [`Note`] invariant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NoteValidationError {
    UpdatedBeforeCreated,
    ExpiresNotAfterCreated,
}

impl Display for NoteValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UpdatedBeforeCreated => write!(f, "updatedAt is earlier than createdAt"),
            Self::ExpiresNotAfterCreated => write!(f, "expiresAt must be after createdAt"),
        }
    }
}

impl Error for NoteValidationError {}

impl Note {
    pub fn validate(&self) -> Result<(), NoteValidationError> {
        if self.updated_at < self.created_at {
            return Err(NoteValidationError::UpdatedBeforeCreated);
        }
        if let Some(expires_at) = self.expires_at {
            if expires_at <= self.created_at {
                return Err(NoteValidationError::ExpiresNotAfterCreated);
            }
        }
        Ok(())
    }
}

/// Input for note creation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewNote {
    pub title: String,
    pub content: String,
    /// Time to live from creation. `None` or zero means the note never expires.
    pub ttl: Option<Duration>,
}

impl NewNote {
    pub fn new(title: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            content: content.into(),
            ttl: None,
        }
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }
}

/// Partial update. `None` leaves a field untouched; `Some(String::new())`
/// stores an empty value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NotePatch {
    pub title: Option<String>,
    pub content: Option<String>,
}

impl NotePatch {
    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn content(mut self, content: impl Into<String>) -> Self {
        self.content = Some(content.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.title.is_none() && self.content.is_none()
    }
}

/// Collection-wide aggregate over notes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NoteStats {
    pub count: u64,
    /// Mean content length in characters (code points), not bytes.
    pub avg_length: f64,
}

/// Current time at the millisecond precision used for storage.
pub(crate) fn stored_now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(3)
}

#[cfg(test)]
mod tests {
    use super::{Note, NotePatch, NoteValidationError};
    use crate::store::ObjectId;
    use chrono::{Duration as ChronoDuration, TimeZone, Utc};

    fn sample_note() -> Note {
        let created = Utc.timestamp_millis_opt(1_700_000_000_123).unwrap();
        Note {
            id: ObjectId::new(),
            title: "title".to_string(),
            content: "content".to_string(),
            created_at: created,
            updated_at: created,
            expires_at: None,
        }
    }

    #[test]
    fn serializes_with_store_field_names_and_millis() {
        let note = sample_note();
        let value = serde_json::to_value(&note).unwrap();
        assert_eq!(value["_id"], note.id.to_hex());
        assert_eq!(value["createdAt"], 1_700_000_000_123i64);
        assert_eq!(value["updatedAt"], 1_700_000_000_123i64);
        assert!(value.get("expiresAt").is_none());

        let decoded: Note = serde_json::from_value(value).unwrap();
        assert_eq!(decoded, note);
    }

    #[test]
    fn validate_rejects_expiry_at_creation_time() {
        let mut note = sample_note();
        note.expires_at = Some(note.created_at);
        assert_eq!(
            note.validate(),
            Err(NoteValidationError::ExpiresNotAfterCreated)
        );

        note.expires_at = Some(note.created_at + ChronoDuration::seconds(1));
        assert!(note.validate().is_ok());
    }

    #[test]
    fn validate_rejects_updated_before_created() {
        let mut note = sample_note();
        note.updated_at = note.created_at - ChronoDuration::milliseconds(1);
        assert_eq!(note.validate(), Err(NoteValidationError::UpdatedBeforeCreated));
    }

    #[test]
    fn empty_patch_is_detected() {
        assert!(NotePatch::default().is_empty());
        assert!(!NotePatch::default().content("").is_empty());
    }
}
