//! Store handle bootstrap and connection access.
//!
//! # Responsibility
//! - Open file or in-memory stores and create the index catalog.
//! - Serialize access to the shared connection under a caller context.
//! - Own the optional background expiry sweeper.
//!
//! # Invariants
//! - Every statement runs with a progress handler bound to the caller context.
//! - Lock waits give up once the caller context is done.

use super::collection::Collection;
use super::expiry::{self, SweeperHandle};
use super::{check_context, map_context_error, validate_name, StoreError, StoreResult};
use crate::config::StoreConfig;
use crate::context::RequestContext;
use log::{error, info};
use parking_lot::{Mutex, MutexGuard};
use rusqlite::Connection;
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

const LOCK_POLL_INTERVAL: Duration = Duration::from_millis(10);
const PROGRESS_HANDLER_OPS: i32 = 1_000;

const CATALOG_SQL: &str = "CREATE TABLE IF NOT EXISTS _store_indexes (
    collection TEXT NOT NULL,
    name TEXT NOT NULL,
    spec TEXT NOT NULL,
    expire_after_secs INTEGER,
    PRIMARY KEY (collection, name)
);";

/// Shared, clonable handle to one embedded store.
///
/// Clones share the same connection; the handle is `Send + Sync`.
#[derive(Clone)]
pub struct Database {
    inner: Arc<DatabaseInner>,
}

pub(crate) struct DatabaseInner {
    conn: Mutex<Connection>,
    mode: &'static str,
    _sweeper: Option<SweeperHandle>,
}

impl Database {
    /// Opens the store described by `config`.
    ///
    /// `config.path == None` opens a private in-memory store.
    ///
    /// # Side effects
    /// - Creates the index catalog when missing.
    /// - Spawns the expiry sweeper when `expiry_sweep_interval` is set.
    /// - Emits `store_open` logging events with duration and status.
    pub fn open(config: &StoreConfig) -> StoreResult<Self> {
        let mode = if config.path.is_some() { "file" } else { "memory" };
        let started_at = Instant::now();
        info!("event=store_open module=store status=start mode={mode}");

        let opened = match config.path.as_ref() {
            Some(path) => Connection::open(path),
            None => Connection::open_in_memory(),
        };
        let conn = match opened {
            Ok(conn) => conn,
            Err(err) => {
                error!(
                    "event=store_open module=store status=error mode={mode} duration_ms={} error_code=store_open_failed error={}",
                    started_at.elapsed().as_millis(),
                    err
                );
                return Err(err.into());
            }
        };

        if let Err(err) = bootstrap_connection(&conn, config.busy_timeout) {
            error!(
                "event=store_open module=store status=error mode={mode} duration_ms={} error_code=store_bootstrap_failed error={}",
                started_at.elapsed().as_millis(),
                err
            );
            return Err(err);
        }

        let sweep_interval = config.expiry_sweep_interval;
        let inner = Arc::new_cyclic(|weak: &Weak<DatabaseInner>| DatabaseInner {
            conn: Mutex::new(conn),
            mode,
            _sweeper: sweep_interval.and_then(|interval| expiry::spawn_sweeper(weak.clone(), interval)),
        });

        info!(
            "event=store_open module=store status=ok mode={mode} duration_ms={} expiry_sweeper={}",
            started_at.elapsed().as_millis(),
            inner._sweeper.is_some()
        );
        Ok(Self { inner })
    }

    /// Opens a private in-memory store without a background sweeper.
    pub fn open_in_memory() -> StoreResult<Self> {
        Self::open(&StoreConfig {
            path: None,
            expiry_sweep_interval: None,
            ..StoreConfig::default()
        })
    }

    /// Returns a handle to `name`, creating the collection on first use.
    pub fn collection(&self, ctx: &RequestContext, name: &str) -> StoreResult<Collection> {
        validate_name("collection", name)?;
        if name.contains("__") {
            return Err(StoreError::InvalidRequest(format!(
                "collection name `{name}` must not contain `__`"
            )));
        }

        self.with_conn(ctx, |conn| {
            conn.execute_batch(&format!(
                "CREATE TABLE IF NOT EXISTS \"{name}\" (
                    seq INTEGER PRIMARY KEY,
                    _id BLOB NOT NULL UNIQUE,
                    doc TEXT NOT NULL
                );"
            ))?;
            Ok(())
        })?;

        Ok(Collection::new(self.clone(), name))
    }

    /// Runs one expiry pass over every collection with an expiry index.
    ///
    /// Returns the number of removed documents.
    pub fn sweep_expired(&self, ctx: &RequestContext) -> StoreResult<u64> {
        self.with_conn(ctx, expiry::sweep_expired_documents)
    }

    /// `file` or `memory`.
    pub fn mode(&self) -> &'static str {
        self.inner.mode
    }

    pub(crate) fn from_inner(inner: Arc<DatabaseInner>) -> Self {
        Self { inner }
    }

    /// Runs `op` on the shared connection under `ctx`.
    ///
    /// Statements and row iterators created inside `op` are dropped before the
    /// lock is released, on success and error paths alike.
    pub(crate) fn with_conn<T>(
        &self,
        ctx: &RequestContext,
        op: impl FnOnce(&mut Connection) -> StoreResult<T>,
    ) -> StoreResult<T> {
        check_context(ctx)?;
        let mut conn = self.lock(ctx)?;

        let watched = ctx.clone();
        conn.progress_handler(PROGRESS_HANDLER_OPS, Some(move || watched.is_done()));
        let result = op(&mut *conn);
        conn.progress_handler(0, None::<fn() -> bool>);

        result.map_err(|err| map_context_error(err, ctx))
    }

    fn lock(&self, ctx: &RequestContext) -> StoreResult<MutexGuard<'_, Connection>> {
        loop {
            if let Some(guard) = self.inner.conn.try_lock_for(LOCK_POLL_INTERVAL) {
                return Ok(guard);
            }
            check_context(ctx)?;
        }
    }
}

fn bootstrap_connection(conn: &Connection, busy_timeout: Duration) -> StoreResult<()> {
    conn.busy_timeout(busy_timeout)?;
    conn.execute_batch(CATALOG_SQL)?;
    Ok(())
}
