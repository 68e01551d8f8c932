//! Index models and index management for collections.
//!
//! # Responsibility
//! - Describe ascending/descending, unique, text and expiry indexes.
//! - Create them idempotently and record them in the `_store_indexes` catalog.
//!
//! # Invariants
//! - Index names derive from keys (`title_1`, `title_text_content_text`).
//! - Re-creating an index with identical options is a no-op.
//! - A collection holds at most one text index.

use super::collection::Collection;
use super::{validate_name, StoreError, StoreResult};
use crate::context::RequestContext;
use log::{debug, info};
use rusqlite::{params, OptionalExtension, Transaction};
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexKind {
    Ascending,
    Descending,
    Text,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexKey {
    pub field: String,
    pub kind: IndexKind,
}

/// Index definition passed to [`Collection::create_index`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexModel {
    pub keys: Vec<IndexKey>,
    #[serde(default)]
    pub unique: bool,
    /// Seconds after the indexed timestamp at which a document expires.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expire_after_secs: Option<u64>,
}

impl IndexModel {
    pub fn ascending(field: impl Into<String>) -> Self {
        Self::single(field, IndexKind::Ascending)
    }

    /// Combined text index over `fields`.
    pub fn text(fields: &[&str]) -> Self {
        Self {
            keys: fields
                .iter()
                .map(|field| IndexKey {
                    field: (*field).to_string(),
                    kind: IndexKind::Text,
                })
                .collect(),
            unique: false,
            expire_after_secs: None,
        }
    }

    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    /// Marks the index as an expiry index. Sub-second parts are dropped.
    pub fn expire_after(mut self, offset: Duration) -> Self {
        self.expire_after_secs = Some(offset.as_secs());
        self
    }

    /// Name derived from keys, e.g. `title_1`, `title_text`.
    pub fn name(&self) -> String {
        self.keys
            .iter()
            .map(|key| {
                let suffix = match key.kind {
                    IndexKind::Ascending => "1",
                    IndexKind::Descending => "-1",
                    IndexKind::Text => "text",
                };
                format!("{}_{suffix}", key.field)
            })
            .collect::<Vec<_>>()
            .join("_")
    }

    pub fn is_text(&self) -> bool {
        self.keys.iter().any(|key| key.kind == IndexKind::Text)
    }

    fn single(field: impl Into<String>, kind: IndexKind) -> Self {
        Self {
            keys: vec![IndexKey {
                field: field.into(),
                kind,
            }],
            unique: false,
            expire_after_secs: None,
        }
    }

    fn validate(&self) -> StoreResult<()> {
        if self.keys.is_empty() {
            return Err(StoreError::InvalidRequest(
                "index needs at least one key".to_string(),
            ));
        }
        for key in &self.keys {
            validate_name("field", &key.field)?;
        }
        if self.is_text() {
            if self.keys.iter().any(|key| key.kind != IndexKind::Text) {
                return Err(StoreError::InvalidRequest(
                    "text indexes cannot mix text and ordered keys".to_string(),
                ));
            }
            if self.unique || self.expire_after_secs.is_some() {
                return Err(StoreError::InvalidRequest(
                    "text indexes cannot be unique or expiring".to_string(),
                ));
            }
        }
        if self.expire_after_secs.is_some() && self.keys.len() != 1 {
            return Err(StoreError::InvalidRequest(
                "expiry indexes must have exactly one key".to_string(),
            ));
        }
        Ok(())
    }
}

impl Collection {
    /// Creates `model` unless an identical index already exists.
    ///
    /// Returns the index name.
    ///
    /// # Errors
    /// - `IndexConflict` when the name exists with other options, or when a
    ///   second text index is requested.
    /// - `DuplicateKey` when a unique index meets duplicate stored values.
    pub fn create_index(&self, ctx: &RequestContext, model: &IndexModel) -> StoreResult<String> {
        model.validate()?;
        let name = model.name();
        let collection = self.name().to_string();

        self.database().with_conn(ctx, |conn| {
            let tx = conn.transaction()?;

            if let Some(existing) = load_index(&tx, &collection, &name)? {
                if existing == *model {
                    debug!(
                        "event=index_create module=store status=noop collection={collection} index={name}"
                    );
                    return Ok(name.clone());
                }
                return Err(StoreError::IndexConflict { name: name.clone() });
            }

            if model.is_text() {
                if let Some(other) = find_text_index(&tx, &collection)? {
                    return Err(StoreError::IndexConflict { name: other });
                }
                create_text_index(&tx, &collection, model)?;
            } else {
                create_ordered_index(&tx, &collection, &name, model)?;
            }

            tx.execute(
                "INSERT INTO _store_indexes (collection, name, spec, expire_after_secs)
                 VALUES (?1, ?2, ?3, ?4);",
                params![
                    collection.as_str(),
                    name.as_str(),
                    serde_json::to_string(model)?,
                    model.expire_after_secs.map(|secs| secs as i64),
                ],
            )?;
            tx.commit()?;

            info!(
                "event=index_create module=store status=ok collection={collection} index={name} unique={} expiring={}",
                model.unique,
                model.expire_after_secs.is_some()
            );
            Ok(name.clone())
        })
    }

    /// Lists `(name, model)` pairs recorded for this collection.
    pub fn list_indexes(&self, ctx: &RequestContext) -> StoreResult<Vec<(String, IndexModel)>> {
        let collection = self.name().to_string();
        self.database().with_conn(ctx, |conn| {
            let mut stmt = conn.prepare(
                "SELECT name, spec FROM _store_indexes WHERE collection = ?1 ORDER BY name;",
            )?;
            let mut rows = stmt.query([collection.as_str()])?;
            let mut indexes = Vec::new();
            while let Some(row) = rows.next()? {
                let name: String = row.get(0)?;
                let spec: String = row.get(1)?;
                indexes.push((name, serde_json::from_str(&spec)?));
            }
            Ok(indexes)
        })
    }
}

/// FTS5 table holding the text-indexed fields of `collection`.
pub(crate) fn text_table_name(collection: &str) -> String {
    format!("{collection}__text")
}

pub(crate) fn has_text_index(conn: &rusqlite::Connection, collection: &str) -> StoreResult<bool> {
    Ok(find_text_index(conn, collection)?.is_some())
}

fn load_index(
    tx: &Transaction<'_>,
    collection: &str,
    name: &str,
) -> StoreResult<Option<IndexModel>> {
    let spec: Option<String> = tx
        .query_row(
            "SELECT spec FROM _store_indexes WHERE collection = ?1 AND name = ?2;",
            params![collection, name],
            |row| row.get(0),
        )
        .optional()?;
    match spec {
        Some(spec) => Ok(Some(serde_json::from_str(&spec)?)),
        None => Ok(None),
    }
}

fn find_text_index(conn: &rusqlite::Connection, collection: &str) -> StoreResult<Option<String>> {
    let mut stmt =
        conn.prepare("SELECT name, spec FROM _store_indexes WHERE collection = ?1;")?;
    let mut rows = stmt.query([collection])?;
    while let Some(row) = rows.next()? {
        let name: String = row.get(0)?;
        let spec: String = row.get(1)?;
        let model: IndexModel = serde_json::from_str(&spec)?;
        if model.is_text() {
            return Ok(Some(name));
        }
    }
    Ok(None)
}

fn create_ordered_index(
    tx: &Transaction<'_>,
    collection: &str,
    name: &str,
    model: &IndexModel,
) -> StoreResult<()> {
    let columns = model
        .keys
        .iter()
        .map(|key| {
            let direction = match key.kind {
                IndexKind::Descending => "DESC",
                _ => "ASC",
            };
            format!("json_extract(doc, '$.{}') {direction}", key.field)
        })
        .collect::<Vec<_>>()
        .join(", ");
    let unique = if model.unique { "UNIQUE " } else { "" };

    tx.execute_batch(&format!(
        "CREATE {unique}INDEX IF NOT EXISTS \"{collection}__{name}\" ON \"{collection}\" ({columns});"
    ))?;
    Ok(())
}

fn create_text_index(tx: &Transaction<'_>, collection: &str, model: &IndexModel) -> StoreResult<()> {
    let table = text_table_name(collection);
    let columns: Vec<String> = (0..model.keys.len()).map(|i| format!("f{i}")).collect();
    let column_list = columns.join(", ");
    let extracted = |row: &str| {
        model
            .keys
            .iter()
            .map(|key| format!("json_extract({row}doc, '$.{}')", key.field))
            .collect::<Vec<_>>()
            .join(", ")
    };
    let new_values = extracted("new.");
    let existing_values = extracted("");

    tx.execute_batch(&format!(
        "CREATE VIRTUAL TABLE \"{table}\" USING fts5({column_list}, tokenize = 'porter unicode61');
         CREATE TRIGGER \"{table}_ai\" AFTER INSERT ON \"{collection}\" BEGIN
             INSERT INTO \"{table}\" (rowid, {column_list}) VALUES (new.seq, {new_values});
         END;
         CREATE TRIGGER \"{table}_ad\" AFTER DELETE ON \"{collection}\" BEGIN
             DELETE FROM \"{table}\" WHERE rowid = old.seq;
         END;
         CREATE TRIGGER \"{table}_au\" AFTER UPDATE ON \"{collection}\" BEGIN
             DELETE FROM \"{table}\" WHERE rowid = old.seq;
             INSERT INTO \"{table}\" (rowid, {column_list}) VALUES (new.seq, {new_values});
         END;
         INSERT INTO \"{table}\" (rowid, {column_list})
             SELECT seq, {existing_values} FROM \"{collection}\";"
    ))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::IndexModel;
    use std::time::Duration;

    #[test]
    fn names_follow_key_layout() {
        assert_eq!(IndexModel::ascending("title").unique().name(), "title_1");
        assert_eq!(
            IndexModel::text(&["title", "content"]).name(),
            "title_text_content_text"
        );
    }

    #[test]
    fn expiry_offset_drops_subsecond_part() {
        let model = IndexModel::ascending("expiresAt").expire_after(Duration::from_millis(1500));
        assert_eq!(model.expire_after_secs, Some(1));
    }

    #[test]
    fn validate_rejects_unique_text_index() {
        assert!(IndexModel::text(&["title"]).unique().validate().is_err());
        assert!(IndexModel::text(&[]).validate().is_err());
        assert!(IndexModel::ascending("expiresAt")
            .expire_after(Duration::ZERO)
            .validate()
            .is_ok());
    }
}
