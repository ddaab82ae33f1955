//! Offload records: the source of truth for whether a subject currently
//! lives in the object store and whether its local copy still exists.

use crate::error::StorageResult;
use crate::types::{
    from_millis, to_millis, DerivativeObject, OffloadRecord, OffloadStats, SubjectId,
};
use crate::{lock, write_tx};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::sync::{Arc, Mutex};
use tracing::debug;

/// Store over `offload_records` and `derivative_objects`.
#[derive(Clone)]
pub struct OffloadRecordStore {
    conn: Arc<Mutex<Connection>>,
}

impl OffloadRecordStore {
    pub(crate) fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    /// Inserts or replaces the record for `record.subject_id`.
    pub fn upsert(&self, record: &OffloadRecord) -> StorageResult<()> {
        write_tx(&self.conn, |tx| {
            tx.execute(
                r#"
                INSERT OR REPLACE INTO offload_records (
                    subject_id, remote_key, remote_url, local_path,
                    local_exists, file_size, offloaded_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                "#,
                params![
                    record.subject_id,
                    record.remote_key,
                    record.remote_url,
                    record.local_path,
                    record.local_exists,
                    record.file_size as i64,
                    to_millis(record.offloaded_at),
                ],
            )
        })?;
        debug!(subject_id = %record.subject_id, key = %record.remote_key, "offload record saved");
        Ok(())
    }

    pub fn get(&self, subject_id: SubjectId) -> StorageResult<Option<OffloadRecord>> {
        let conn = lock(&self.conn);
        let record = conn
            .query_row(
                "SELECT subject_id, remote_key, remote_url, local_path, local_exists, file_size, offloaded_at \
                 FROM offload_records WHERE subject_id = ?1",
                params![subject_id],
                row_to_record,
            )
            .optional()?;
        Ok(record)
    }

    pub fn is_offloaded(&self, subject_id: SubjectId) -> StorageResult<bool> {
        let conn = lock(&self.conn);
        let found: Option<i64> = conn
            .query_row(
                "SELECT 1 FROM offload_records WHERE subject_id = ?1",
                params![subject_id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }

    /// Deletes the record and its derivative mapping. Returns whether a
    /// record existed.
    pub fn delete(&self, subject_id: SubjectId) -> StorageResult<bool> {
        let removed = write_tx(&self.conn, |tx| {
            tx.execute(
                "DELETE FROM derivative_objects WHERE subject_id = ?1",
                params![subject_id],
            )?;
            tx.execute(
                "DELETE FROM offload_records WHERE subject_id = ?1",
                params![subject_id],
            )
        })?;
        Ok(removed == 1)
    }

    /// Updates `local_exists`. Returns false if there is no record.
    pub fn set_local_exists(&self, subject_id: SubjectId, exists: bool) -> StorageResult<bool> {
        let changed = write_tx(&self.conn, |tx| {
            tx.execute(
                "UPDATE offload_records SET local_exists = ?2 WHERE subject_id = ?1",
                params![subject_id, exists],
            )
        })?;
        Ok(changed == 1)
    }

    /// Replaces the derivative mapping of `subject_id` with `objects`.
    pub fn put_derivatives(
        &self,
        subject_id: SubjectId,
        objects: &[DerivativeObject],
    ) -> StorageResult<()> {
        write_tx(&self.conn, |tx| {
            tx.execute(
                "DELETE FROM derivative_objects WHERE subject_id = ?1",
                params![subject_id],
            )?;
            let mut stmt = tx.prepare(
                "INSERT INTO derivative_objects (subject_id, variant, remote_key, remote_url, local_path) \
                 VALUES (?1, ?2, ?3, ?4, ?5)",
            )?;
            for obj in objects {
                stmt.execute(params![
                    subject_id,
                    obj.variant,
                    obj.remote_key,
                    obj.remote_url,
                    obj.local_path,
                ])?;
            }
            Ok(())
        })
    }

    /// Derivatives of `subject_id`, ordered by variant name.
    pub fn derivatives(&self, subject_id: SubjectId) -> StorageResult<Vec<DerivativeObject>> {
        let conn = lock(&self.conn);
        let mut stmt = conn.prepare(
            "SELECT subject_id, variant, remote_key, remote_url, local_path \
             FROM derivative_objects WHERE subject_id = ?1 ORDER BY variant",
        )?;
        let objects = stmt
            .query_map(params![subject_id], |row| {
                Ok(DerivativeObject {
                    subject_id: row.get(0)?,
                    variant: row.get(1)?,
                    remote_key: row.get(2)?,
                    remote_url: row.get(3)?,
                    local_path: row.get(4)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(objects)
    }

    pub fn stats(&self) -> StorageResult<OffloadStats> {
        let conn = lock(&self.conn);
        let stats = conn.query_row(
            "SELECT COUNT(*), \
                    COALESCE(SUM(CASE WHEN local_exists = 0 THEN 1 ELSE 0 END), 0), \
                    COALESCE(SUM(file_size), 0) \
             FROM offload_records",
            [],
            |row| {
                Ok(OffloadStats {
                    offloaded: row.get::<_, i64>(0)?.max(0) as u64,
                    local_deleted: row.get::<_, i64>(1)?.max(0) as u64,
                    total_bytes: row.get::<_, i64>(2)?.max(0) as u64,
                })
            },
        )?;
        Ok(stats)
    }
}

fn row_to_record(row: &Row<'_>) -> rusqlite::Result<OffloadRecord> {
    Ok(OffloadRecord {
        subject_id: row.get(0)?,
        remote_key: row.get(1)?,
        remote_url: row.get(2)?,
        local_path: row.get(3)?,
        local_exists: row.get(4)?,
        file_size: row.get::<_, i64>(5)?.max(0) as u64,
        offloaded_at: from_millis(row.get(6)?),
    })
}
