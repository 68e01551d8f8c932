//! Collection-level document operations.
//!
//! # Responsibility
//! - Compile [`Filter`], [`FindOptions`], [`Update`] and [`GroupAll`] into SQL
//!   over the collection table.
//! - Keep `_id` (BLOB column) and the stored JSON `_id` in agreement.
//!
//! # Invariants
//! - `Update` never touches `_id`.
//! - `find_one_and_update` and `delete_one` act on at most one document.

use super::database::Database;
use super::index::{has_text_index, text_table_name};
use super::query::{Accumulator, Filter, FindOptions, GroupAll, SortDirection, SortField, Update};
use super::text::build_match_expression;
use super::{validate_name, Document, ObjectId, StoreError, StoreResult};
use crate::context::RequestContext;
use rusqlite::types::Value as SqlValue;
use rusqlite::{params, params_from_iter, Connection};
use serde_json::Value;

/// Handle to one collection of a [`Database`].
#[derive(Clone)]
pub struct Collection {
    db: Database,
    name: String,
}

impl Collection {
    pub(crate) fn new(db: Database, name: &str) -> Self {
        Self {
            db,
            name: name.to_string(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    /// Inserts one document and returns its `_id`.
    ///
    /// A string `_id` already present in `document` is kept; otherwise a new
    /// id is allocated.
    pub fn insert_one(&self, ctx: &RequestContext, mut document: Document) -> StoreResult<ObjectId> {
        let id = match document.get("_id") {
            Some(Value::String(text)) => ObjectId::parse_hex(text)
                .map_err(|err| StoreError::InvalidRequest(err.to_string()))?,
            Some(other) => {
                return Err(StoreError::InvalidRequest(format!(
                    "`_id` must be an object id string, got {other}"
                )))
            }
            None => ObjectId::new(),
        };
        document.insert("_id".to_string(), Value::String(id.to_hex()));
        let body = serde_json::to_string(&document)?;

        self.db.with_conn(ctx, |conn| {
            conn.execute(
                &format!("INSERT INTO \"{}\" (_id, doc) VALUES (?1, ?2);", self.name),
                params![id.as_bytes(), body],
            )?;
            Ok(id)
        })
    }

    pub fn find_one(&self, ctx: &RequestContext, filter: &Filter) -> StoreResult<Option<Document>> {
        let options = FindOptions {
            limit: Some(1),
            ..FindOptions::default()
        };
        Ok(self.find(ctx, filter, &options)?.into_iter().next())
    }

    pub fn find(
        &self,
        ctx: &RequestContext,
        filter: &Filter,
        options: &FindOptions,
    ) -> StoreResult<Vec<Document>> {
        self.db.with_conn(ctx, |conn| {
            let mut binds = Vec::new();
            let where_sql = self.compile_filter(conn, filter, &mut binds)?;
            let mut sql = format!("SELECT doc FROM \"{}\" WHERE {where_sql}", self.name);

            let order = compile_sort(options)?;
            sql.push_str(" ORDER BY ");
            sql.push_str(&order);

            // SQLite needs a LIMIT clause before OFFSET; -1 means unbounded.
            let limit = options.limit.map_or(-1, clamp_to_i64);
            sql.push_str(" LIMIT ?");
            binds.push(SqlValue::Integer(limit));
            if options.skip > 0 {
                sql.push_str(" OFFSET ?");
                binds.push(SqlValue::Integer(clamp_to_i64(options.skip)));
            }

            let mut stmt = conn.prepare(&sql)?;
            let mut rows = stmt.query(params_from_iter(binds))?;
            let mut documents = Vec::new();
            while let Some(row) = rows.next()? {
                let body: String = row.get(0)?;
                documents.push(parse_document(&body)?);
            }
            Ok(documents)
        })
    }

    /// Applies `update` to the first match and returns the document after the update.
    pub fn find_one_and_update(
        &self,
        ctx: &RequestContext,
        filter: &Filter,
        update: &Update,
    ) -> StoreResult<Option<Document>> {
        if update.set.is_empty() {
            return Err(StoreError::InvalidRequest(
                "update must set at least one field".to_string(),
            ));
        }

        let mut assignments = Vec::with_capacity(update.set.len());
        let mut set_binds = Vec::with_capacity(update.set.len());
        for (field, value) in &update.set {
            validate_name("field", field)?;
            assignments.push(format!("'$.{field}', json(?)"));
            set_binds.push(SqlValue::Text(serde_json::to_string(value)?));
        }

        self.db.with_conn(ctx, |conn| {
            let mut binds = set_binds;
            let where_sql = self.compile_filter(conn, filter, &mut binds)?;
            let sql = format!(
                "UPDATE \"{name}\"
                 SET doc = json_set(doc, {assignments})
                 WHERE seq = (SELECT seq FROM \"{name}\" WHERE {where_sql} LIMIT 1)
                 RETURNING doc;",
                name = self.name,
                assignments = assignments.join(", "),
            );

            let mut stmt = conn.prepare(&sql)?;
            let mut rows = stmt.query(params_from_iter(binds))?;
            match rows.next()? {
                Some(row) => {
                    let body: String = row.get(0)?;
                    Ok(Some(parse_document(&body)?))
                }
                None => Ok(None),
            }
        })
    }

    /// Deletes the first match. Returns the deleted count (0 or 1).
    pub fn delete_one(&self, ctx: &RequestContext, filter: &Filter) -> StoreResult<u64> {
        self.db.with_conn(ctx, |conn| {
            let mut binds = Vec::new();
            let where_sql = self.compile_filter(conn, filter, &mut binds)?;
            let deleted = conn.execute(
                &format!(
                    "DELETE FROM \"{name}\"
                     WHERE seq = (SELECT seq FROM \"{name}\" WHERE {where_sql} LIMIT 1);",
                    name = self.name
                ),
                params_from_iter(binds),
            )?;
            Ok(deleted as u64)
        })
    }

    pub fn count_documents(&self, ctx: &RequestContext, filter: &Filter) -> StoreResult<u64> {
        self.db.with_conn(ctx, |conn| {
            let mut binds = Vec::new();
            let where_sql = self.compile_filter(conn, filter, &mut binds)?;
            let count: i64 = conn.query_row(
                &format!("SELECT COUNT(*) FROM \"{}\" WHERE {where_sql};", self.name),
                params_from_iter(binds),
                |row| row.get(0),
            )?;
            Ok(count.max(0) as u64)
        })
    }

    /// Runs a group-all aggregation.
    ///
    /// Yields no groups when nothing matches, otherwise one document with
    /// `_id: null` and one field per accumulator.
    pub fn aggregate(&self, ctx: &RequestContext, group: &GroupAll) -> StoreResult<Vec<Document>> {
        let mut projections = vec!["COUNT(*)".to_string()];
        for (output, accumulator) in &group.accumulators {
            validate_name("output", output)?;
            projections.push(match accumulator {
                Accumulator::Count => "COUNT(*)".to_string(),
                Accumulator::AvgCharLength(field) => {
                    validate_name("field", field)?;
                    format!(
                        "AVG(CASE WHEN json_type(doc, '$.{field}') = 'text'
                              THEN length(json_extract(doc, '$.{field}')) END)"
                    )
                }
            });
        }

        self.db.with_conn(ctx, |conn| {
            let mut binds = Vec::new();
            let where_sql = self.compile_filter(conn, &group.filter, &mut binds)?;
            let sql = format!(
                "SELECT {} FROM \"{}\" WHERE {where_sql};",
                projections.join(", "),
                self.name
            );

            let mut stmt = conn.prepare(&sql)?;
            let mut rows = stmt.query(params_from_iter(binds))?;
            let Some(row) = rows.next()? else {
                return Ok(Vec::new());
            };
            let matched: i64 = row.get(0)?;
            if matched == 0 {
                return Ok(Vec::new());
            }

            let mut document = Document::new();
            document.insert("_id".to_string(), Value::Null);
            for (offset, (output, accumulator)) in group.accumulators.iter().enumerate() {
                let value = match accumulator {
                    Accumulator::Count => Value::from(row.get::<_, i64>(offset + 1)?),
                    Accumulator::AvgCharLength(_) => row
                        .get::<_, Option<f64>>(offset + 1)?
                        .map_or(Value::Null, Value::from),
                };
                document.insert(output.clone(), value);
            }
            Ok(vec![document])
        })
    }

    fn compile_filter(
        &self,
        conn: &Connection,
        filter: &Filter,
        binds: &mut Vec<SqlValue>,
    ) -> StoreResult<String> {
        if filter.uses_text_search() && !has_text_index(conn, &self.name)? {
            return Err(StoreError::TextIndexRequired {
                collection: self.name.clone(),
            });
        }
        Ok(self.compile_node(filter, binds))
    }

    fn compile_node(&self, filter: &Filter, binds: &mut Vec<SqlValue>) -> String {
        match filter {
            Filter::All => "1".to_string(),
            Filter::IdEq(id) => {
                binds.push(SqlValue::Blob(id.as_bytes().to_vec()));
                "_id = ?".to_string()
            }
            Filter::IdLt(id) => {
                binds.push(SqlValue::Blob(id.as_bytes().to_vec()));
                "_id < ?".to_string()
            }
            Filter::Text(search) => match build_match_expression(search) {
                Some(expression) => {
                    binds.push(SqlValue::Text(expression));
                    let table = text_table_name(&self.name);
                    format!("seq IN (SELECT rowid FROM \"{table}\" WHERE \"{table}\" MATCH ?)")
                }
                None => "0".to_string(),
            },
            Filter::And(parts) if parts.is_empty() => "1".to_string(),
            Filter::And(parts) => parts
                .iter()
                .map(|part| format!("({})", self.compile_node(part, binds)))
                .collect::<Vec<_>>()
                .join(" AND "),
        }
    }
}

fn compile_sort(options: &FindOptions) -> StoreResult<String> {
    if options.sort.is_empty() {
        return Ok("seq ASC".to_string());
    }
    let mut keys = Vec::with_capacity(options.sort.len());
    for key in &options.sort {
        let direction = match key.direction {
            SortDirection::Ascending => "ASC",
            SortDirection::Descending => "DESC",
        };
        let expression = match &key.field {
            SortField::Id => "_id".to_string(),
            SortField::Field(field) => {
                validate_name("field", field)?;
                format!("json_extract(doc, '$.{field}')")
            }
        };
        keys.push(format!("{expression} {direction}"));
    }
    Ok(keys.join(", "))
}

fn parse_document(body: &str) -> StoreResult<Document> {
    match serde_json::from_str::<Value>(body)? {
        Value::Object(document) => Ok(document),
        other => Err(StoreError::InvalidRequest(format!(
            "stored document is not an object: {other}"
        ))),
    }
}

fn clamp_to_i64(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}
