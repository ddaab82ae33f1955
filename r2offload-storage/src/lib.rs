//! SQLite storage layer for R2 offload.
//!
//! Three durable tables back the bulk pipeline:
//!
//! - `queue_items`: the job queue and its per-item state machine
//! - `offload_records` / `derivative_objects`: which subjects currently live
//!   in the object store, and where
//! - `activity_log`: a bounded log of recent outcomes for display
//!
//! # Concurrency
//!
//! Several worker processes may open the same database file. Every mutation
//! is a single status-guarded statement run inside an `IMMEDIATE`
//! transaction, so two claimers can never flip the same row. File databases
//! use WAL mode with a busy timeout.

mod activity_log;
mod error;
mod queue_store;
mod record_store;
mod types;

pub use activity_log::{ActivityLog, DEFAULT_ACTIVITY_CAPACITY};
pub use error::{StorageError, StorageResult};
pub use queue_store::{QueueStore, PROGRESS_WINDOW_HOURS, SUPERSEDED_MESSAGE};
pub use record_store::OffloadRecordStore;
pub use types::*;

use rusqlite::{Connection, Transaction, TransactionBehavior};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tracing::{debug, warn};

/// How long a writer waits for another process's lock before giving up.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Handle to the offload database. Cheap to clone.
///
/// All stores handed out by one `Database` share a single connection.
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    /// Opens or creates the database at `path`.
    pub fn open(path: &Path) -> StorageResult<Self> {
        let conn = open_sqlite(path)?;
        initialize_schema(&conn)?;
        Ok(Self::from_connection(conn))
    }

    /// Opens an in-memory database (for testing).
    pub fn open_in_memory() -> StorageResult<Self> {
        let conn = Connection::open_in_memory()?;
        initialize_schema(&conn)?;
        Ok(Self::from_connection(conn))
    }

    fn from_connection(conn: Connection) -> Self {
        Self {
            conn: Arc::new(Mutex::new(conn)),
        }
    }

    pub fn queue(&self) -> QueueStore {
        QueueStore::new(self.conn.clone())
    }

    pub fn records(&self) -> OffloadRecordStore {
        OffloadRecordStore::new(self.conn.clone())
    }

    /// Activity log keeping at most `capacity` entries.
    pub fn activity(&self, capacity: usize) -> ActivityLog {
        ActivityLog::new(self.conn.clone(), capacity)
    }
}

/// Open a SQLite connection tuned for several concurrent worker processes.
fn open_sqlite(path: &Path) -> StorageResult<Connection> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let conn = Connection::open(path)?;
    conn.busy_timeout(BUSY_TIMEOUT)?;
    let mode: String = conn.query_row("PRAGMA journal_mode=WAL", [], |row| row.get(0))?;
    if !mode.eq_ignore_ascii_case("wal") {
        warn!("SQLite refused WAL mode for {} (got {mode})", path.display());
    }
    conn.execute_batch("PRAGMA synchronous=NORMAL; PRAGMA foreign_keys=ON;")?;
    debug!("opened offload database at {}", path.display());
    Ok(conn)
}

/// Acquire the connection lock, recovering from poison left by a panicked
/// holder instead of propagating the panic.
pub(crate) fn lock(conn: &Mutex<Connection>) -> MutexGuard<'_, Connection> {
    conn.lock().unwrap_or_else(|poisoned| {
        warn!("recovering from poisoned database mutex");
        poisoned.into_inner()
    })
}

/// Runs `f` inside an `IMMEDIATE` transaction so the write lock is taken up
/// front and the busy timeout applies.
pub(crate) fn write_tx<T>(
    conn: &Mutex<Connection>,
    f: impl FnOnce(&Transaction<'_>) -> rusqlite::Result<T>,
) -> StorageResult<T> {
    let mut guard = lock(conn);
    let tx = guard.transaction_with_behavior(TransactionBehavior::Immediate)?;
    let value = f(&tx)?;
    tx.commit()?;
    Ok(value)
}

fn initialize_schema(conn: &Connection) -> StorageResult<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS queue_items (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            subject_id INTEGER NOT NULL,
            action TEXT NOT NULL CHECK (action IN ('offload', 'restore', 'delete_local')),
            status TEXT NOT NULL DEFAULT 'pending'
                CHECK (status IN ('pending', 'processing', 'completed', 'failed', 'cancelled')),
            error_message TEXT,
            result_message TEXT,
            created_at INTEGER NOT NULL,
            claimed_at INTEGER,
            processed_at INTEGER
        );
        CREATE UNIQUE INDEX IF NOT EXISTS idx_queue_pending_subject
            ON queue_items(subject_id) WHERE status = 'pending';
        CREATE INDEX IF NOT EXISTS idx_queue_claim
            ON queue_items(status, action, created_at, id);
        CREATE INDEX IF NOT EXISTS idx_queue_processed ON queue_items(processed_at);

        CREATE TABLE IF NOT EXISTS offload_records (
            subject_id INTEGER PRIMARY KEY,
            remote_key TEXT NOT NULL,
            remote_url TEXT NOT NULL,
            local_path TEXT NOT NULL,
            local_exists INTEGER NOT NULL DEFAULT 1,
            file_size INTEGER NOT NULL DEFAULT 0,
            offloaded_at INTEGER NOT NULL
        );

        CREATE TABLE IF NOT EXISTS derivative_objects (
            subject_id INTEGER NOT NULL,
            variant TEXT NOT NULL,
            remote_key TEXT NOT NULL,
            remote_url TEXT NOT NULL,
            local_path TEXT NOT NULL,
            PRIMARY KEY (subject_id, variant)
        );

        CREATE TABLE IF NOT EXISTS activity_log (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            timestamp INTEGER NOT NULL,
            subject_id INTEGER NOT NULL,
            filename TEXT NOT NULL,
            status TEXT NOT NULL,
            message TEXT NOT NULL
        );
        "#,
    )?;
    Ok(())
}
