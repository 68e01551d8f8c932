//! Expiry index sweeping.
//!
//! # Responsibility
//! - Delete documents whose expiry field plus index offset is in the past.
//! - Run that pass periodically on a background thread.
//!
//! # Invariants
//! - Only integer (epoch millisecond) values are considered; documents
//!   without the field, or with another type, never expire.
//! - The sweeper thread exits once the owning store is dropped.

use super::database::{Database, DatabaseInner};
use super::index::IndexModel;
use super::StoreResult;
use crate::context::RequestContext;
use chrono::Utc;
use log::{debug, warn};
use rusqlite::{params, Connection};
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::sync::Weak;
use std::thread;
use std::time::Duration;

/// Keeps the sweeper alive; dropping it stops the thread.
pub(crate) struct SweeperHandle {
    _stop: Sender<()>,
}

pub(crate) fn spawn_sweeper(
    db: Weak<DatabaseInner>,
    interval: Duration,
) -> Option<SweeperHandle> {
    let (stop_tx, stop_rx) = mpsc::channel::<()>();
    let spawned = thread::Builder::new()
        .name("store-expiry-sweeper".to_string())
        .spawn(move || loop {
            match stop_rx.recv_timeout(interval) {
                Err(RecvTimeoutError::Timeout) => {}
                Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
            }

            let Some(inner) = db.upgrade() else {
                break;
            };
            let store = Database::from_inner(inner);
            let ctx = RequestContext::with_timeout(interval);
            match store.sweep_expired(&ctx) {
                Ok(removed) => debug!(
                    "event=expiry_sweep module=store status=ok removed={removed}"
                ),
                Err(err) => warn!("event=expiry_sweep module=store status=error error={err}"),
            }
        });

    match spawned {
        Ok(_) => Some(SweeperHandle { _stop: stop_tx }),
        Err(err) => {
            warn!("event=expiry_sweeper_spawn module=store status=degraded error={err}");
            None
        }
    }
}

pub(crate) fn sweep_expired_documents(conn: &mut Connection) -> StoreResult<u64> {
    let expiring = load_expiry_indexes(conn)?;
    let now_ms = Utc::now().timestamp_millis();
    let mut removed = 0u64;

    for (collection, field, expire_after_secs) in expiring {
        let expire_after_ms = expire_after_secs.saturating_mul(1000);
        let deleted = conn.execute(
            &format!(
                "DELETE FROM \"{collection}\"
                 WHERE json_type(doc, '$.{field}') = 'integer'
                   AND json_extract(doc, '$.{field}') + ?1 <= ?2;"
            ),
            params![expire_after_ms, now_ms],
        )?;
        removed += deleted as u64;
    }

    Ok(removed)
}

fn load_expiry_indexes(conn: &Connection) -> StoreResult<Vec<(String, String, i64)>> {
    let mut stmt = conn.prepare(
        "SELECT collection, spec, expire_after_secs
         FROM _store_indexes
         WHERE expire_after_secs IS NOT NULL
         ORDER BY collection, name;",
    )?;
    let mut rows = stmt.query([])?;
    let mut expiring = Vec::new();
    while let Some(row) = rows.next()? {
        let collection: String = row.get(0)?;
        let spec: String = row.get(1)?;
        let expire_after_secs: i64 = row.get(2)?;
        let model: IndexModel = serde_json::from_str(&spec)?;
        if let Some(key) = model.keys.first() {
            expiring.push((collection, key.field.clone(), expire_after_secs));
        }
    }
    Ok(expiring)
}
