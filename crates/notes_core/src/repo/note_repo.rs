//! Note repository contract and store-backed implementation.
//!
//! # Responsibility
//! - Provide note CRUD, listing and stats on top of one store collection.
//! - Own timestamp stamping (`createdAt`, `updatedAt`, `expiresAt`).
//!
//! # Invariants
//! - Each operation is exactly one store call (stats: one aggregation).
//! - `updatedAt` is refreshed on every update, including empty patches.
//! - Expiry is only set for a non-zero TTL, so `expiresAt > createdAt`.

use crate::config::RepoConfig;
use crate::context::RequestContext;
use crate::model::note::{stored_now, NewNote, Note, NoteId, NotePatch, NoteStats};
use crate::repo::indexes::{ensure_note_indexes, IndexReport, CONTENT_FIELD, TITLE_FIELD};
use crate::repo::query::{build_cursor_query, build_list_query, NoteCursorQuery, NoteListQuery};
use crate::repo::{RepoError, RepoResult};
use crate::store::{
    Accumulator, Collection, Database, Document, Filter, FindOptions, GroupAll, Update,
};
use chrono::{DateTime, Utc};
use log::{debug, info};
use serde::Serialize;
use serde_json::Value;
use std::time::Duration;

/// Repository interface for note use-cases.
///
/// Ids are taken in their external hex form; malformed ids behave like
/// missing notes.
pub trait NoteRepository {
    /// Inserts a note and returns it with its assigned id.
    fn create(&self, ctx: &RequestContext, note: NewNote) -> RepoResult<Note>;

    /// Inserts a note that the store removes once `ttl` has elapsed.
    fn create_with_expiry(
        &self,
        ctx: &RequestContext,
        title: &str,
        content: &str,
        ttl: Duration,
    ) -> RepoResult<Note> {
        self.create(ctx, NewNote::new(title, content).with_ttl(ttl))
    }

    fn by_id(&self, ctx: &RequestContext, id: &str) -> RepoResult<Note>;
    /// Offset page, newest `createdAt` first.
    fn list(&self, ctx: &RequestContext, query: &NoteListQuery) -> RepoResult<Vec<Note>>;
    /// Cursor page, highest id first, strictly below `query.after`.
    fn list_cursor(&self, ctx: &RequestContext, query: &NoteCursorQuery)
        -> RepoResult<Vec<Note>>;
    /// Applies `patch` and returns the note as stored after the update.
    fn update(&self, ctx: &RequestContext, id: &str, patch: &NotePatch) -> RepoResult<Note>;
    fn delete(&self, ctx: &RequestContext, id: &str) -> RepoResult<()>;
    fn stats(&self, ctx: &RequestContext) -> RepoResult<NoteStats>;
}

/// Stored shape of a note before the store assigns `_id`.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct NewNoteDocument<'a> {
    title: &'a str,
    content: &'a str,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    created_at: DateTime<Utc>,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    updated_at: DateTime<Utc>,
    #[serde(
        with = "chrono::serde::ts_milliseconds_option",
        skip_serializing_if = "Option::is_none"
    )]
    expires_at: Option<DateTime<Utc>>,
}

/// Note repository backed by a [`Collection`].
pub struct StoreNoteRepository {
    collection: Collection,
    indexes: IndexReport,
}

impl StoreNoteRepository {
    /// Opens the default `notes` collection and provisions its indexes.
    pub fn try_new(ctx: &RequestContext, db: &Database) -> RepoResult<Self> {
        Self::with_config(ctx, db, &RepoConfig::default())
    }

    /// Opens `config.collection` and provisions its indexes.
    ///
    /// # Errors
    /// - Fails when the title or text index cannot be created.
    pub fn with_config(
        ctx: &RequestContext,
        db: &Database,
        config: &RepoConfig,
    ) -> RepoResult<Self> {
        let collection = db.collection(ctx, &config.collection)?;
        let indexes = ensure_note_indexes(ctx, &collection)?;
        Ok(Self {
            collection,
            indexes,
        })
    }

    /// Whether the expiry index exists, i.e. TTL notes are removed automatically.
    pub fn expiry_enabled(&self) -> bool {
        self.indexes.expiry_enabled
    }

    pub fn collection(&self) -> &Collection {
        &self.collection
    }

    fn find_page(
        &self,
        ctx: &RequestContext,
        filter: &Filter,
        options: &FindOptions,
    ) -> RepoResult<Vec<Note>> {
        self.collection
            .find(ctx, filter, options)?
            .into_iter()
            .map(decode_note)
            .collect()
    }
}

impl NoteRepository for StoreNoteRepository {
    fn create(&self, ctx: &RequestContext, note: NewNote) -> RepoResult<Note> {
        let now = stored_now();
        let expires_at = note
            .ttl
            .filter(|ttl| !ttl.is_zero())
            .map(|ttl| expiry_after(now, ttl));

        let stored = NewNoteDocument {
            title: &note.title,
            content: &note.content,
            created_at: now,
            updated_at: now,
            expires_at,
        };
        let document = to_document(&stored)?;
        let id = self.collection.insert_one(ctx, document)?;

        info!(
            "event=note_create module=repo status=ok note_id={id} expiring={}",
            expires_at.is_some()
        );
        Ok(Note {
            id,
            title: note.title,
            content: note.content,
            created_at: now,
            updated_at: now,
            expires_at,
        })
    }

    fn by_id(&self, ctx: &RequestContext, id: &str) -> RepoResult<Note> {
        let id = parse_id(id)?;
        match self.collection.find_one(ctx, &Filter::IdEq(id))? {
            Some(document) => decode_note(document),
            None => Err(RepoError::NotFound),
        }
    }

    fn list(&self, ctx: &RequestContext, query: &NoteListQuery) -> RepoResult<Vec<Note>> {
        let (filter, options) = build_list_query(query);
        let notes = self.find_page(ctx, &filter, &options)?;
        debug!(
            "event=note_list module=repo status=ok mode=offset skip={} returned={}",
            options.skip,
            notes.len()
        );
        Ok(notes)
    }

    fn list_cursor(
        &self,
        ctx: &RequestContext,
        query: &NoteCursorQuery,
    ) -> RepoResult<Vec<Note>> {
        let (filter, options) = build_cursor_query(query);
        let notes = self.find_page(ctx, &filter, &options)?;
        debug!(
            "event=note_list module=repo status=ok mode=cursor returned={}",
            notes.len()
        );
        Ok(notes)
    }

    fn update(&self, ctx: &RequestContext, id: &str, patch: &NotePatch) -> RepoResult<Note> {
        let id = parse_id(id)?;

        let mut update = Update::default().set("updatedAt", stored_now().timestamp_millis());
        if let Some(title) = patch.title.as_ref() {
            update = update.set(TITLE_FIELD, title.as_str());
        }
        if let Some(content) = patch.content.as_ref() {
            update = update.set(CONTENT_FIELD, content.as_str());
        }

        match self
            .collection
            .find_one_and_update(ctx, &Filter::IdEq(id), &update)?
        {
            Some(document) => {
                info!(
                    "event=note_update module=repo status=ok note_id={id} fields={} touch_only={}",
                    update.set.len(),
                    patch.is_empty()
                );
                decode_note(document)
            }
            None => Err(RepoError::NotFound),
        }
    }

    fn delete(&self, ctx: &RequestContext, id: &str) -> RepoResult<()> {
        let id = parse_id(id)?;
        if self.collection.delete_one(ctx, &Filter::IdEq(id))? == 0 {
            return Err(RepoError::NotFound);
        }
        info!("event=note_delete module=repo status=ok note_id={id}");
        Ok(())
    }

    fn stats(&self, ctx: &RequestContext) -> RepoResult<NoteStats> {
        let group = GroupAll::new()
            .accumulate("count", Accumulator::Count)
            .accumulate("avgLength", Accumulator::AvgCharLength(CONTENT_FIELD.to_string()));
        let groups = self.collection.aggregate(ctx, &group)?;

        let Some(group) = groups.into_iter().next() else {
            return Ok(NoteStats::default());
        };
        Ok(NoteStats {
            count: group.get("count").and_then(Value::as_u64).unwrap_or(0),
            avg_length: group.get("avgLength").and_then(Value::as_f64).unwrap_or(0.0),
        })
    }
}

/// Malformed ids can never match a stored note.
fn parse_id(value: &str) -> RepoResult<NoteId> {
    NoteId::parse_hex(value).map_err(|_| RepoError::NotFound)
}

/// `now + ttl`, rounded up to whole milliseconds and saturating far in the future.
fn expiry_after(now: DateTime<Utc>, ttl: Duration) -> DateTime<Utc> {
    let ttl_ms = i64::try_from(ttl.as_nanos().div_ceil(1_000_000)).unwrap_or(i64::MAX);
    chrono::Duration::try_milliseconds(ttl_ms)
        .and_then(|ttl| now.checked_add_signed(ttl))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

fn to_document(value: &impl Serialize) -> RepoResult<Document> {
    match serde_json::to_value(value) {
        Ok(Value::Object(document)) => Ok(document),
        Ok(other) => Err(RepoError::InvalidData(format!(
            "note serialized to non-object value {other}"
        ))),
        Err(err) => Err(RepoError::InvalidData(err.to_string())),
    }
}

fn decode_note(document: Document) -> RepoResult<Note> {
    serde_json::from_value(Value::Object(document))
        .map_err(|err| RepoError::InvalidData(err.to_string()))
}

#[cfg(test)]
mod tests {
    use super::{expiry_after, parse_id};
    use crate::model::note::stored_now;
    use crate::repo::RepoError;
    use std::time::Duration;

    #[test]
    fn parse_id_maps_garbage_to_not_found() {
        assert!(matches!(parse_id("xyz"), Err(RepoError::NotFound)));
        assert!(matches!(parse_id(""), Err(RepoError::NotFound)));

        let padded = format!("  {}\n", crate::store::ObjectId::new().to_hex());
        assert!(matches!(parse_id(&padded), Err(RepoError::NotFound)));
    }

    #[test]
    fn expiry_rounds_up_to_next_millisecond() {
        let now = stored_now();
        let expires = expiry_after(now, Duration::from_micros(10));
        assert_eq!((expires - now).num_milliseconds(), 1);

        let expires = expiry_after(now, Duration::from_secs(1));
        assert_eq!((expires - now).num_milliseconds(), 1000);
    }

    #[test]
    fn huge_ttl_saturates_instead_of_overflowing() {
        let now = stored_now();
        let expires = expiry_after(now, Duration::from_secs(u64::MAX));
        assert!(expires > now);
    }
}
