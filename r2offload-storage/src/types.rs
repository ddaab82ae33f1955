//! Shared types for the queue, offload records and activity log.

use chrono::{DateTime, Utc};
use rusqlite::ToSql;
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSqlOutput, ValueRef};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Identifier of the media object a queue item acts on.
///
/// Owned by the host media library, not by this crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubjectId(pub i64);

impl fmt::Display for SubjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for SubjectId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

impl ToSql for SubjectId {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        self.0.to_sql()
    }
}

impl FromSql for SubjectId {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        i64::column_result(value).map(SubjectId)
    }
}

/// Error returned when a stored enum value is not recognized.
#[derive(Debug, Error)]
#[error("unknown {kind} value: {value}")]
pub struct ParseEnumError {
    kind: &'static str,
    value: String,
}

/// What a queue item asks the transfer executor to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    Offload,
    Restore,
    DeleteLocal,
}

impl Action {
    pub const ALL: [Action; 3] = [Action::Offload, Action::Restore, Action::DeleteLocal];

    pub fn as_str(self) -> &'static str {
        match self {
            Action::Offload => "offload",
            Action::Restore => "restore",
            Action::DeleteLocal => "delete_local",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Action {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "offload" => Ok(Action::Offload),
            "restore" => Ok(Action::Restore),
            "delete_local" => Ok(Action::DeleteLocal),
            other => Err(ParseEnumError {
                kind: "action",
                value: other.to_string(),
            }),
        }
    }
}

impl ToSql for Action {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for Action {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        value
            .as_str()?
            .parse()
            .map_err(|e| FromSqlError::Other(Box::new(e)))
    }
}

/// Lifecycle status of a queue item.
///
/// ```text
/// Pending --claim--> Processing --success--> Completed
///                    Processing --failure--> Failed
/// Pending --cancel--> Cancelled
/// Failed  --retry--> Pending
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    Cancelled,
}

impl QueueStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            QueueStatus::Pending => "pending",
            QueueStatus::Processing => "processing",
            QueueStatus::Completed => "completed",
            QueueStatus::Failed => "failed",
            QueueStatus::Cancelled => "cancelled",
        }
    }

    /// Completed, Failed and Cancelled are terminal.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            QueueStatus::Completed | QueueStatus::Failed | QueueStatus::Cancelled
        )
    }
}

impl fmt::Display for QueueStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for QueueStatus {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(QueueStatus::Pending),
            "processing" => Ok(QueueStatus::Processing),
            "completed" => Ok(QueueStatus::Completed),
            "failed" => Ok(QueueStatus::Failed),
            "cancelled" => Ok(QueueStatus::Cancelled),
            other => Err(ParseEnumError {
                kind: "status",
                value: other.to_string(),
            }),
        }
    }
}

impl ToSql for QueueStatus {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for QueueStatus {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        value
            .as_str()?
            .parse()
            .map_err(|e| FromSqlError::Other(Box::new(e)))
    }
}

/// One unit of queued work.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueItem {
    pub id: i64,
    pub subject_id: SubjectId,
    pub action: Action,
    pub status: QueueStatus,
    /// Set only when `status` is Failed.
    pub error_message: Option<String>,
    /// Outcome note recorded on completion.
    pub result_message: Option<String>,
    pub created_at: DateTime<Utc>,
    /// When the item was last flipped to Processing.
    pub claimed_at: Option<DateTime<Utc>>,
    /// Null until the item reaches a terminal status.
    pub processed_at: Option<DateTime<Utc>>,
}

/// Aggregate queue counts for progress reporting.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueCounts {
    pub pending: u64,
    pub processing: u64,
    pub completed: u64,
    pub failed: u64,
    pub cancelled: u64,
    /// `pending + processing + completed + failed`; cancelled items are not
    /// part of the run's denominator.
    pub total: u64,
}

impl QueueCounts {
    /// True while any item is waiting or in flight.
    pub fn is_active(&self) -> bool {
        self.pending + self.processing > 0
    }
}

/// Durable record of a subject that currently lives in the object store.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OffloadRecord {
    pub subject_id: SubjectId,
    pub remote_key: String,
    pub remote_url: String,
    pub local_path: String,
    pub local_exists: bool,
    pub file_size: u64,
    pub offloaded_at: DateTime<Utc>,
}

/// Remote copy of one derivative (e.g. a thumbnail size) of a subject.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DerivativeObject {
    pub subject_id: SubjectId,
    /// Variant name such as `thumbnail` or `medium_large`.
    pub variant: String,
    pub remote_key: String,
    pub remote_url: String,
    pub local_path: String,
}

/// Totals over all offload records.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OffloadStats {
    pub offloaded: u64,
    pub local_deleted: u64,
    pub total_bytes: u64,
}

/// One line of the bounded activity log.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityEntry {
    pub timestamp: DateTime<Utc>,
    pub subject_id: SubjectId,
    pub filename: String,
    pub status: QueueStatus,
    pub message: String,
}

pub(crate) fn to_millis(ts: DateTime<Utc>) -> i64 {
    ts.timestamp_millis()
}

pub(crate) fn from_millis(ms: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(ms).unwrap_or_default()
}
