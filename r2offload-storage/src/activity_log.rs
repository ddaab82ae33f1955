//! Bounded log of recent transfer outcomes, newest first.

use crate::error::StorageResult;
use crate::types::{from_millis, to_millis, ActivityEntry};
use crate::{lock, write_tx};
use rusqlite::{params, Connection};
use std::sync::{Arc, Mutex};

/// Entries kept when no capacity is configured.
pub const DEFAULT_ACTIVITY_CAPACITY: usize = 100;

/// Append-only log capped at `capacity` entries; the oldest are evicted.
#[derive(Clone)]
pub struct ActivityLog {
    conn: Arc<Mutex<Connection>>,
    capacity: usize,
}

impl ActivityLog {
    pub(crate) fn new(conn: Arc<Mutex<Connection>>, capacity: usize) -> Self {
        Self {
            conn,
            capacity: capacity.max(1),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Appends an entry and evicts anything beyond capacity.
    pub fn append(&self, entry: &ActivityEntry) -> StorageResult<()> {
        let capacity = self.capacity as i64;
        write_tx(&self.conn, |tx| {
            tx.execute(
                "INSERT INTO activity_log (timestamp, subject_id, filename, status, message) \
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    to_millis(entry.timestamp),
                    entry.subject_id,
                    entry.filename,
                    entry.status,
                    entry.message,
                ],
            )?;
            tx.execute(
                "DELETE FROM activity_log WHERE id NOT IN \
                 (SELECT id FROM activity_log ORDER BY id DESC LIMIT ?1)",
                params![capacity],
            )?;
            Ok(())
        })
    }

    /// Up to `limit` most recent entries, newest first.
    pub fn recent(&self, limit: usize) -> StorageResult<Vec<ActivityEntry>> {
        let conn = lock(&self.conn);
        let mut stmt = conn.prepare(
            "SELECT timestamp, subject_id, filename, status, message \
             FROM activity_log ORDER BY id DESC LIMIT ?1",
        )?;
        let entries = stmt
            .query_map(params![limit as i64], |row| {
                Ok(ActivityEntry {
                    timestamp: from_millis(row.get(0)?),
                    subject_id: row.get(1)?,
                    filename: row.get(2)?,
                    status: row.get(3)?,
                    message: row.get(4)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(entries)
    }

    pub fn len(&self) -> StorageResult<usize> {
        let conn = lock(&self.conn);
        let n: i64 = conn.query_row("SELECT COUNT(*) FROM activity_log", [], |row| row.get(0))?;
        Ok(n.max(0) as usize)
    }

    pub fn is_empty(&self) -> StorageResult<bool> {
        Ok(self.len()? == 0)
    }

    /// Removes every entry.
    pub fn clear(&self) -> StorageResult<usize> {
        Ok(write_tx(&self.conn, |tx| tx.execute("DELETE FROM activity_log", []))?)
    }
}
