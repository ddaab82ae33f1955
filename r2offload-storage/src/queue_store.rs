//! Durable job queue with a status-guarded state machine.
//!
//! Every transition is a compare-and-swap on `status`: a row only moves if
//! it is still in the expected source state. Callers learn whether their
//! transition happened from the returned `bool`/`Option`, never by reading
//! back and hoping nobody else raced them.

use crate::error::StorageResult;
use crate::types::{
    from_millis, to_millis, Action, QueueCounts, QueueItem, QueueStatus, SubjectId,
};
use crate::{lock, write_tx};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

/// Trailing window (hours) in which terminal items count towards progress.
pub const PROGRESS_WINDOW_HOURS: i64 = 24;

/// Error recorded on a stale item whose subject was queued again.
pub const SUPERSEDED_MESSAGE: &str = "superseded by a newer queue item";

fn progress_window() -> chrono::Duration {
    chrono::Duration::hours(PROGRESS_WINDOW_HOURS)
}

const ITEM_COLUMNS: &str = "id, subject_id, action, status, error_message, result_message, \
     created_at, claimed_at, processed_at";

/// Job queue over the `queue_items` table.
#[derive(Clone)]
pub struct QueueStore {
    conn: Arc<Mutex<Connection>>,
}

impl QueueStore {
    pub(crate) fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    /// Adds a Pending item for `subject_id`.
    ///
    /// Returns false without inserting when the subject already has a
    /// Pending item (for any action). The partial unique index on
    /// `subject_id WHERE status = 'pending'` makes this race-free across
    /// concurrent enqueuers.
    pub fn enqueue(&self, subject_id: SubjectId, action: Action) -> StorageResult<bool> {
        let now = to_millis(Utc::now());
        let inserted = write_tx(&self.conn, |tx| {
            tx.execute(
                "INSERT OR IGNORE INTO queue_items (subject_id, action, status, created_at) \
                 VALUES (?1, ?2, 'pending', ?3)",
                params![subject_id, action, now],
            )
        })?;

        if inserted == 1 {
            debug!(%subject_id, %action, "enqueued");
        } else {
            debug!(%subject_id, %action, "already pending, not enqueued");
        }
        Ok(inserted == 1)
    }

    /// Claims the oldest Pending item for `action` and flips it to Processing.
    ///
    /// The select and the flip happen in one `UPDATE … RETURNING` statement,
    /// so concurrent claimers never receive the same row.
    pub fn claim_next(&self, action: Action) -> StorageResult<Option<QueueItem>> {
        let sql = format!(
            "UPDATE queue_items SET status = 'processing', claimed_at = ?1 \
             WHERE id = (SELECT id FROM queue_items WHERE status = 'pending' AND action = ?2 \
                         ORDER BY created_at, id LIMIT 1) \
               AND status = 'pending' \
             RETURNING {ITEM_COLUMNS}"
        );
        let now = to_millis(Utc::now());
        let claimed = write_tx(&self.conn, |tx| {
            tx.query_row(&sql, params![now, action], row_to_item).optional()
        })?;

        if let Some(ref item) = claimed {
            debug!(id = item.id, subject_id = %item.subject_id, %action, "claimed");
        }
        Ok(claimed)
    }

    /// Claims the oldest Pending item regardless of action.
    pub fn claim_next_any(&self) -> StorageResult<Option<QueueItem>> {
        let sql = format!(
            "UPDATE queue_items SET status = 'processing', claimed_at = ?1 \
             WHERE id = (SELECT id FROM queue_items WHERE status = 'pending' \
                         ORDER BY created_at, id LIMIT 1) \
               AND status = 'pending' \
             RETURNING {ITEM_COLUMNS}"
        );
        let now = to_millis(Utc::now());
        let claimed = write_tx(&self.conn, |tx| {
            tx.query_row(&sql, params![now], row_to_item).optional()
        })?;
        Ok(claimed)
    }

    /// Processing → Completed. Returns false if the item was not Processing.
    pub fn mark_completed(&self, id: i64, message: &str) -> StorageResult<bool> {
        let now = to_millis(Utc::now());
        let changed = write_tx(&self.conn, |tx| {
            tx.execute(
                "UPDATE queue_items SET status = 'completed', result_message = ?2, processed_at = ?3 \
                 WHERE id = ?1 AND status = 'processing'",
                params![id, message, now],
            )
        })?;
        Ok(changed == 1)
    }

    /// Processing → Failed. Returns false if the item was not Processing.
    pub fn mark_failed(&self, id: i64, message: &str) -> StorageResult<bool> {
        let now = to_millis(Utc::now());
        let changed = write_tx(&self.conn, |tx| {
            tx.execute(
                "UPDATE queue_items SET status = 'failed', error_message = ?2, processed_at = ?3 \
                 WHERE id = ?1 AND status = 'processing'",
                params![id, message, now],
            )
        })?;
        Ok(changed == 1)
    }

    /// Flips every Pending item (any action) to Cancelled.
    ///
    /// Processing items are left alone: they finish their current unit of
    /// work.
    pub fn cancel_pending(&self) -> StorageResult<usize> {
        let now = to_millis(Utc::now());
        let cancelled = write_tx(&self.conn, |tx| {
            tx.execute(
                "UPDATE queue_items SET status = 'cancelled', processed_at = ?1 \
                 WHERE status = 'pending'",
                params![now],
            )
        })?;
        if cancelled > 0 {
            info!("cancelled {cancelled} pending queue items");
        }
        Ok(cancelled)
    }

    /// Deletes every Completed, Cancelled and Failed item.
    pub fn purge_terminal(&self) -> StorageResult<usize> {
        let purged = write_tx(&self.conn, |tx| {
            tx.execute(
                "DELETE FROM queue_items WHERE status IN ('completed', 'cancelled', 'failed')",
                [],
            )
        })?;
        debug!("purged {purged} terminal queue items");
        Ok(purged)
    }

    /// Counts by status. Terminal items only count within [`PROGRESS_WINDOW_HOURS`].
    pub fn counts(&self) -> StorageResult<QueueCounts> {
        self.counts_since(Utc::now() - progress_window())
    }

    /// Counts by status, with terminal items limited to those processed at or
    /// after `cutoff`.
    pub fn counts_since(&self, cutoff: DateTime<Utc>) -> StorageResult<QueueCounts> {
        let conn = lock(&self.conn);
        let mut stmt = conn.prepare(
            "SELECT status, COUNT(*) FROM queue_items \
             WHERE status IN ('pending', 'processing') OR processed_at >= ?1 \
             GROUP BY status",
        )?;
        let rows = stmt.query_map(params![to_millis(cutoff)], |row| {
            Ok((row.get::<_, QueueStatus>(0)?, row.get::<_, i64>(1)?))
        })?;

        let mut counts = QueueCounts::default();
        for row in rows {
            let (status, n) = row?;
            let n = n.max(0) as u64;
            match status {
                QueueStatus::Pending => counts.pending = n,
                QueueStatus::Processing => counts.processing = n,
                QueueStatus::Completed => counts.completed = n,
                QueueStatus::Failed => counts.failed = n,
                QueueStatus::Cancelled => counts.cancelled = n,
            }
        }
        counts.total = counts.pending + counts.processing + counts.completed + counts.failed;
        Ok(counts)
    }

    /// Resets Failed items processed within [`PROGRESS_WINDOW_HOURS`] to Pending.
    pub fn retry_failed(&self) -> StorageResult<usize> {
        self.retry_failed_since(Utc::now() - progress_window())
    }

    /// Resets Failed items processed at or after `cutoff` to Pending,
    /// clearing their error and processed time.
    ///
    /// A subject that already has a Pending item keeps its Failed row.
    pub fn retry_failed_since(&self, cutoff: DateTime<Utc>) -> StorageResult<usize> {
        let reset = write_tx(&self.conn, |tx| {
            tx.execute(
                "UPDATE OR IGNORE queue_items \
                 SET status = 'pending', error_message = NULL, processed_at = NULL, claimed_at = NULL \
                 WHERE status = 'failed' AND processed_at >= ?1",
                params![to_millis(cutoff)],
            )
        })?;
        info!("reset {reset} failed queue items to pending");
        Ok(reset)
    }

    /// Resets the most recent Failed item of `subject_id` to Pending.
    pub fn retry_one(&self, subject_id: SubjectId) -> StorageResult<bool> {
        let reset = write_tx(&self.conn, |tx| {
            tx.execute(
                "UPDATE OR IGNORE queue_items \
                 SET status = 'pending', error_message = NULL, processed_at = NULL, claimed_at = NULL \
                 WHERE id = (SELECT id FROM queue_items WHERE subject_id = ?1 AND status = 'failed' \
                             ORDER BY processed_at DESC, id DESC LIMIT 1) \
                   AND status = 'failed'",
                params![subject_id],
            )
        })?;
        Ok(reset == 1)
    }

    /// Returns Processing items claimed at or before `now - older_than` to Pending.
    ///
    /// Only needed after a worker died mid-item; a live worker always writes
    /// a terminal state. A stale item whose subject was queued again in the
    /// meantime cannot go back to Pending; it is marked Failed as superseded.
    pub fn release_stale(&self, older_than: chrono::Duration) -> StorageResult<usize> {
        let cutoff = to_millis(Utc::now() - older_than);
        let now = to_millis(Utc::now());
        let (released, superseded) = write_tx(&self.conn, |tx| {
            let released = tx.execute(
                "UPDATE OR IGNORE queue_items SET status = 'pending', claimed_at = NULL \
                 WHERE status = 'processing' AND claimed_at <= ?1",
                params![cutoff],
            )?;
            // Whatever is still stale lost the race for the subject's Pending slot.
            let superseded = tx.execute(
                "UPDATE queue_items SET status = 'failed', error_message = ?2, processed_at = ?3 \
                 WHERE status = 'processing' AND claimed_at <= ?1",
                params![cutoff, SUPERSEDED_MESSAGE, now],
            )?;
            Ok((released, superseded))
        })?;
        if released > 0 {
            info!("released {released} stale processing items back to pending");
        }
        if superseded > 0 {
            warn!("marked {superseded} stale processing items failed: subject already queued");
        }
        Ok(released)
    }

    /// The most recently claimed item still in flight, if any.
    pub fn current_processing(&self) -> StorageResult<Option<QueueItem>> {
        let conn = lock(&self.conn);
        let item = conn
            .query_row(
                &format!(
                    "SELECT {ITEM_COLUMNS} FROM queue_items WHERE status = 'processing' \
                     ORDER BY claimed_at DESC, id DESC LIMIT 1"
                ),
                [],
                row_to_item,
            )
            .optional()?;
        Ok(item)
    }

    pub fn get(&self, id: i64) -> StorageResult<Option<QueueItem>> {
        let conn = lock(&self.conn);
        let item = conn
            .query_row(
                &format!("SELECT {ITEM_COLUMNS} FROM queue_items WHERE id = ?1"),
                params![id],
                row_to_item,
            )
            .optional()?;
        Ok(item)
    }

    /// Items in `status`, newest first.
    pub fn list_by_status(&self, status: QueueStatus, limit: usize) -> StorageResult<Vec<QueueItem>> {
        let conn = lock(&self.conn);
        let mut stmt = conn.prepare(&format!(
            "SELECT {ITEM_COLUMNS} FROM queue_items WHERE status = ?1 \
             ORDER BY COALESCE(processed_at, created_at) DESC, id DESC LIMIT ?2"
        ))?;
        let items = stmt
            .query_map(params![status, limit as i64], row_to_item)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(items)
    }

    /// Deletes every item regardless of status.
    pub fn clear_all(&self) -> StorageResult<usize> {
        Ok(write_tx(&self.conn, |tx| tx.execute("DELETE FROM queue_items", []))?)
    }
}

fn row_to_item(row: &Row<'_>) -> rusqlite::Result<QueueItem> {
    Ok(QueueItem {
        id: row.get(0)?,
        subject_id: row.get(1)?,
        action: row.get(2)?,
        status: row.get(3)?,
        error_message: row.get(4)?,
        result_message: row.get(5)?,
        created_at: from_millis(row.get(6)?),
        claimed_at: row.get::<_, Option<i64>>(7)?.map(from_millis),
        processed_at: row.get::<_, Option<i64>>(8)?.map(from_millis),
    })
}

#[cfg(test)]
mod tests {
    use crate::Database;
    use crate::types::{Action, SubjectId};

    #[test]
    fn fifo_tie_break_is_by_id() {
        let queue = Database::open_in_memory().unwrap().queue();
        for id in 1..=3 {
            queue.enqueue(SubjectId(id), Action::Offload).unwrap();
        }
        let ids: Vec<i64> = (0..3)
            .map(|_| queue.claim_next(Action::Offload).unwrap().unwrap().subject_id.0)
            .collect();
        assert_eq!(ids, vec![1, 2, 3]);
    }
}
