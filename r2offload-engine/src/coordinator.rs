//! Drives the queue through the transfer executor, one item per call.
//!
//! A run is `Running` while any item is pending or in flight. The caller
//! invokes [`BulkCoordinator::process_one`] repeatedly (from a request
//! handler, a scheduled task or [`drive`](crate::drive)); the coordinator
//! owns no thread or timer of its own.
//!
//! Several coordinators, in one process or many, may share a database:
//! each claim atomically flips one row, so no item is processed twice.

use crate::cancel::CancellationFlag;
use crate::config::EngineConfig;
use crate::eligibility::Eligibility;
use crate::error::EngineResult;
use crate::library::MediaLibrary;
use crate::transfer::{TransferExecutor, TransferResult};
use chrono::Utc;
use r2offload_cloud::ObjectStore;
use r2offload_storage::{
    Action, ActivityEntry, ActivityLog, Database, OffloadRecordStore, QueueCounts, QueueItem,
    QueueStatus, QueueStore, SubjectId,
};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info, warn};

/// State of the current bulk run.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    NotRunning,
    Running,
    Completed,
    Cancelled,
}

/// Result of one [`BulkCoordinator::process_one`] call.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessOutcome {
    /// No pending item remains, or cancellation took effect.
    pub done: bool,
    /// Status written for the processed item; `Cancelled` when the call
    /// stopped on cancellation; `None` when there was nothing to claim.
    pub status: Option<QueueStatus>,
    pub subject_id: Option<SubjectId>,
    pub filename: String,
    pub message: String,
}

impl ProcessOutcome {
    fn cancelled() -> Self {
        Self {
            done: true,
            status: Some(QueueStatus::Cancelled),
            subject_id: None,
            filename: String::new(),
            message: "Cancelled".to_string(),
        }
    }

    fn idle() -> Self {
        Self {
            done: true,
            status: None,
            subject_id: None,
            filename: String::new(),
            message: "No pending items".to_string(),
        }
    }
}

/// Progress snapshot for display.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Progress {
    pub completed: u64,
    pub failed: u64,
    pub pending: u64,
    pub processing: u64,
    pub total: u64,
    pub is_running: bool,
    /// Subject currently being processed, if any.
    pub current_subject: Option<SubjectId>,
    /// Share of `total` that reached a terminal status, 0 to 100.
    pub percent: u8,
}

impl Progress {
    fn from_counts(counts: QueueCounts, current: Option<&QueueItem>) -> Self {
        let finished = counts.completed + counts.failed;
        let percent = if counts.total == 0 {
            0
        } else {
            (finished * 100 / counts.total).min(100) as u8
        };
        Self {
            completed: counts.completed,
            failed: counts.failed,
            pending: counts.pending,
            processing: counts.processing,
            total: counts.total,
            is_running: counts.is_active(),
            current_subject: current.map(|item| item.subject_id),
            percent,
        }
    }
}

pub struct BulkCoordinator {
    queue: QueueStore,
    records: OffloadRecordStore,
    activity: ActivityLog,
    library: Arc<dyn MediaLibrary>,
    executor: TransferExecutor,
    cancel: CancellationFlag,
    run_action: Mutex<Option<Action>>,
    config: EngineConfig,
}

impl BulkCoordinator {
    pub fn new(
        db: &Database,
        store: Arc<dyn ObjectStore>,
        library: Arc<dyn MediaLibrary>,
        config: EngineConfig,
    ) -> Self {
        let records = db.records();
        let executor = TransferExecutor::new(store, records.clone(), config.key_prefix.clone());
        Self {
            queue: db.queue(),
            records,
            activity: db.activity(config.activity_capacity),
            library,
            executor,
            cancel: CancellationFlag::new(config.cancel_ttl()),
            run_action: Mutex::new(None),
            config,
        }
    }

    /// Replaces the offload eligibility predicate.
    pub fn with_eligibility(mut self, eligibility: Arc<dyn Eligibility>) -> Self {
        self.executor = self.executor.with_eligibility(eligibility);
        self
    }

    pub fn executor(&self) -> &TransferExecutor {
        &self.executor
    }

    /// Handle to the cancellation flag, e.g. for a signal handler.
    pub fn cancellation_flag(&self) -> CancellationFlag {
        self.cancel.clone()
    }

    /// Starts a run: purges finished items, enqueues the subjects the action
    /// applies to and clears any earlier cancellation. Returns how many
    /// items were enqueued.
    pub fn start_bulk(&self, action: Action, subject_ids: &[SubjectId]) -> EngineResult<usize> {
        let purged = self.queue.purge_terminal()?;
        let mut enqueued = 0;
        for &subject_id in subject_ids {
            if !self.applies(action, subject_id)? {
                continue;
            }
            if self.queue.enqueue(subject_id, action)? {
                enqueued += 1;
            }
        }
        self.cancel.clear();
        *self.lock_run_action() = Some(action);
        info!(%action, requested = subject_ids.len(), enqueued, purged, "bulk run started");
        Ok(enqueued)
    }

    fn applies(&self, action: Action, subject_id: SubjectId) -> EngineResult<bool> {
        Ok(match action {
            Action::Offload => !self.records.is_offloaded(subject_id)?,
            Action::Restore => self.records.is_offloaded(subject_id)?,
            Action::DeleteLocal => self
                .records
                .get(subject_id)?
                .is_some_and(|record| record.local_exists),
        })
    }

    /// Claims and executes the next pending item, preferring the current
    /// run's action. `done` is set only once no pending item of any action
    /// remains.
    pub async fn process_one(&self) -> EngineResult<ProcessOutcome> {
        if self.cancel.is_set() {
            debug!("cancellation in effect, not claiming");
            return Ok(ProcessOutcome::cancelled());
        }

        let run_action = *self.lock_run_action();
        let mut claimed = match run_action {
            Some(action) => self.queue.claim_next(action)?,
            None => None,
        };
        if claimed.is_none() {
            // The run's action is drained; pick up anything else queued.
            if run_action.is_some() {
                *self.lock_run_action() = None;
            }
            claimed = self.queue.claim_next_any()?;
        }
        let Some(item) = claimed else {
            return Ok(ProcessOutcome::idle());
        };

        let (result, filename) = match self.library.subject(item.subject_id) {
            Some(subject) => (
                self.executor.execute(item.action, &subject).await,
                subject.filename(),
            ),
            None => (
                TransferResult::failure(format!(
                    "Subject {} not found in the media library",
                    item.subject_id
                )),
                format!("#{}", item.subject_id),
            ),
        };

        let status = if result.success {
            QueueStatus::Completed
        } else {
            QueueStatus::Failed
        };
        let transitioned = match status {
            QueueStatus::Completed => self.queue.mark_completed(item.id, &result.message)?,
            _ => self.queue.mark_failed(item.id, &result.message)?,
        };
        if !transitioned {
            warn!(id = item.id, subject_id = %item.subject_id, "item was no longer processing; outcome not recorded");
        }

        let entry = ActivityEntry {
            timestamp: Utc::now(),
            subject_id: item.subject_id,
            filename: filename.clone(),
            status,
            message: result.message.clone(),
        };
        if let Err(e) = self.activity.append(&entry) {
            warn!(error = %e, "failed to append activity entry");
        }

        let pending = self.queue.counts_since(self.window_start())?.pending;
        debug!(id = item.id, subject_id = %item.subject_id, action = %item.action, %status, pending, "processed");
        Ok(ProcessOutcome {
            done: pending == 0,
            status: Some(status),
            subject_id: Some(item.subject_id),
            filename,
            message: result.message,
        })
    }

    /// Stops the run: pending items become Cancelled and the next
    /// `process_one` returns `done` without claiming. The item in flight, if
    /// any, runs to completion. Applies to every action, not only the
    /// current run's.
    pub fn cancel(&self) -> EngineResult<usize> {
        self.cancel.set();
        let cancelled = self.queue.cancel_pending()?;
        info!(cancelled, "bulk run cancelled");
        Ok(cancelled)
    }

    pub fn get_progress(&self) -> EngineResult<Progress> {
        let counts = self.queue.counts_since(self.window_start())?;
        let current = self.queue.current_processing()?;
        Ok(Progress::from_counts(counts, current.as_ref()))
    }

    pub fn run_state(&self) -> EngineResult<RunState> {
        let counts = self.queue.counts_since(self.window_start())?;
        Ok(if counts.is_active() {
            RunState::Running
        } else if self.cancel.is_set() {
            RunState::Cancelled
        } else if counts.completed + counts.failed > 0 {
            RunState::Completed
        } else if counts.cancelled > 0 {
            RunState::Cancelled
        } else {
            RunState::NotRunning
        })
    }

    pub fn enqueue(&self, subject_id: SubjectId, action: Action) -> EngineResult<bool> {
        Ok(self.queue.enqueue(subject_id, action)?)
    }

    pub fn counts(&self) -> EngineResult<QueueCounts> {
        Ok(self.queue.counts_since(self.window_start())?)
    }

    /// Returns recently failed items to Pending.
    pub fn retry_failed(&self) -> EngineResult<usize> {
        let retried = self.queue.retry_failed_since(self.window_start())?;
        if retried > 0 {
            info!(retried, "failed items re-queued");
        }
        Ok(retried)
    }

    pub fn retry_one(&self, subject_id: SubjectId) -> EngineResult<bool> {
        Ok(self.queue.retry_one(subject_id)?)
    }

    /// Returns Processing items claimed longer than `older_than` ago to
    /// Pending. For use after a worker crash.
    pub fn release_stale(&self, older_than: chrono::Duration) -> EngineResult<usize> {
        let released = self.queue.release_stale(older_than)?;
        if released > 0 {
            warn!(released, "released stale claims");
        }
        Ok(released)
    }

    pub fn clear_log(&self) -> EngineResult<usize> {
        Ok(self.activity.clear()?)
    }

    pub fn recent_activity(&self, limit: usize) -> EngineResult<Vec<ActivityEntry>> {
        Ok(self.activity.recent(limit)?)
    }

    fn window_start(&self) -> chrono::DateTime<Utc> {
        Utc::now() - self.config.progress_window()
    }

    fn lock_run_action(&self) -> MutexGuard<'_, Option<Action>> {
        self.run_action.lock().unwrap_or_else(|poisoned| {
            warn!("recovering from poisoned run action mutex");
            poisoned.into_inner()
        })
    }
}
