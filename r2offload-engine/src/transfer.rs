//! Performs one offload, restore or local delete for one subject.
//!
//! Every operation returns a [`TransferResult`]; object store and database
//! errors are folded into `success: false` and never propagate to the queue
//! driver.

use crate::eligibility::{Eligibility, MimeAllowList};
use crate::library::Subject;
use chrono::Utc;
use r2offload_cloud::ObjectStore;
use r2offload_storage::{Action, DerivativeObject, OffloadRecord, OffloadRecordStore};
use serde::{Deserialize, Serialize};
use std::io::ErrorKind;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Per-derivative counts for one operation.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DerivativeSummary {
    pub total: usize,
    pub success: usize,
    /// Variant names that failed.
    pub failed: Vec<String>,
}

/// Outcome of one transfer.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferResult {
    pub success: bool,
    pub message: String,
    pub url: Option<String>,
    pub derivatives: Option<DerivativeSummary>,
}

impl TransferResult {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
            url: None,
            derivatives: None,
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            url: None,
            derivatives: None,
        }
    }
}

pub struct TransferExecutor {
    store: Arc<dyn ObjectStore>,
    records: OffloadRecordStore,
    eligibility: Arc<dyn Eligibility>,
    key_prefix: String,
}

impl TransferExecutor {
    /// Executor using the default [`MimeAllowList`].
    pub fn new(
        store: Arc<dyn ObjectStore>,
        records: OffloadRecordStore,
        key_prefix: impl Into<String>,
    ) -> Self {
        Self {
            store,
            records,
            eligibility: Arc::new(MimeAllowList::default()),
            key_prefix: key_prefix.into(),
        }
    }

    pub fn with_eligibility(mut self, eligibility: Arc<dyn Eligibility>) -> Self {
        self.eligibility = eligibility;
        self
    }

    /// Remote key for a path relative to the uploads root.
    pub fn remote_key(&self, relative_path: &str) -> String {
        let rel = relative_path.trim_start_matches('/');
        if self.key_prefix.is_empty() {
            return rel.to_string();
        }
        format!("{}/{rel}", self.key_prefix.trim_end_matches('/'))
    }

    pub async fn execute(&self, action: Action, subject: &Subject) -> TransferResult {
        match action {
            Action::Offload => self.offload(subject).await,
            Action::Restore => self.restore(subject).await,
            Action::DeleteLocal => self.delete_local(subject).await,
        }
    }

    /// Uploads the primary file, then each derivative. Derivative failures
    /// are reported but do not fail the offload.
    pub async fn offload(&self, subject: &Subject) -> TransferResult {
        if !self.eligibility.is_eligible(subject) {
            return TransferResult::failure(format!(
                "File type {} is not eligible for offload",
                display_mime(&subject.mime_type)
            ));
        }
        match self.records.is_offloaded(subject.id) {
            Ok(true) => return TransferResult::failure("Already offloaded"),
            Ok(false) => {}
            Err(e) => return TransferResult::failure(format!("Failed to read offload status: {e}")),
        }
        if !is_file(&subject.local_path).await {
            return TransferResult::failure(format!(
                "Local file not found: {}",
                subject.local_path.display()
            ));
        }

        let key = self.remote_key(&subject.relative_path);
        let uploaded = match self.store.upload(&subject.local_path, &key).await {
            Ok(uploaded) => uploaded,
            Err(e) => {
                warn!(subject_id = %subject.id, key = %key, error = %e, "offload failed");
                return TransferResult::failure(e.to_string());
            }
        };

        let mut summary = DerivativeSummary {
            total: subject.derivatives.len(),
            ..DerivativeSummary::default()
        };
        let mut objects = Vec::with_capacity(subject.derivatives.len());
        for derivative in &subject.derivatives {
            let dkey = self.remote_key(&derivative.relative_path);
            match self.store.upload(&derivative.local_path, &dkey).await {
                Ok(obj) => {
                    summary.success += 1;
                    objects.push(DerivativeObject {
                        subject_id: subject.id,
                        variant: derivative.variant.clone(),
                        remote_key: obj.key,
                        remote_url: obj.url,
                        local_path: derivative.local_path.to_string_lossy().into_owned(),
                    });
                }
                Err(e) => {
                    warn!(subject_id = %subject.id, variant = %derivative.variant, error = %e, "derivative upload failed");
                    summary.failed.push(derivative.variant.clone());
                }
            }
        }

        let record = OffloadRecord {
            subject_id: subject.id,
            remote_key: uploaded.key.clone(),
            remote_url: uploaded.url.clone(),
            local_path: subject.local_path.to_string_lossy().into_owned(),
            local_exists: true,
            file_size: uploaded.size,
            offloaded_at: Utc::now(),
        };
        let saved = self
            .records
            .upsert(&record)
            .and_then(|()| self.records.put_derivatives(subject.id, &objects));
        if let Err(e) = saved {
            warn!(subject_id = %subject.id, error = %e, "offload record not saved");
            return TransferResult::failure(format!("Uploaded but failed to save offload record: {e}"));
        }

        info!(subject_id = %subject.id, key = %uploaded.key, derivatives = summary.success, "offloaded");
        let message = if summary.failed.is_empty() {
            "Offloaded to R2".to_string()
        } else {
            format!(
                "Offloaded to R2; {} of {} sizes failed",
                summary.failed.len(),
                summary.total
            )
        };
        TransferResult {
            success: true,
            message,
            url: Some(uploaded.url),
            derivatives: Some(summary),
        }
    }

    /// Stops treating the subject as offloaded. Remote objects and local
    /// files are left alone.
    pub async fn restore(&self, subject: &Subject) -> TransferResult {
        let record = match self.records.get(subject.id) {
            Ok(Some(record)) => record,
            Ok(None) => return TransferResult::failure("Not offloaded"),
            Err(e) => return TransferResult::failure(format!("Failed to read offload status: {e}")),
        };
        if let Err(e) = self.records.delete(subject.id) {
            warn!(subject_id = %subject.id, error = %e, "restore failed");
            return TransferResult::failure(format!("Failed to clear offload record: {e}"));
        }

        info!(subject_id = %subject.id, "restored");
        if record.local_exists {
            TransferResult::ok("Restored to local serving")
        } else {
            TransferResult::ok("Restored; the local copy was deleted earlier and is not re-downloaded")
        }
    }

    /// Deletes local files of an offloaded subject.
    pub async fn delete_local(&self, subject: &Subject) -> TransferResult {
        match self.records.is_offloaded(subject.id) {
            Ok(true) => {}
            Ok(false) => {
                return TransferResult::failure("Not offloaded; refusing to delete the local copy")
            }
            Err(e) => return TransferResult::failure(format!("Failed to read offload status: {e}")),
        }

        let primary = match remove_if_present(&subject.local_path).await {
            Ok(removed) => removed,
            Err(e) => {
                warn!(subject_id = %subject.id, error = %e, "local delete failed");
                return TransferResult::failure(format!(
                    "Failed to delete {}: {e}",
                    subject.local_path.display()
                ));
            }
        };

        let mut summary = DerivativeSummary::default();
        for derivative in &subject.derivatives {
            match remove_if_present(&derivative.local_path).await {
                Ok(true) => {
                    summary.total += 1;
                    summary.success += 1;
                }
                Ok(false) => {}
                Err(e) => {
                    debug!(subject_id = %subject.id, variant = %derivative.variant, error = %e, "derivative delete failed");
                    summary.total += 1;
                    summary.failed.push(derivative.variant.clone());
                }
            }
        }

        if let Err(e) = self.records.set_local_exists(subject.id, false) {
            return TransferResult::failure(format!("Deleted files but failed to update offload record: {e}"));
        }

        let deleted = usize::from(primary) + summary.success;
        let message = if deleted == 0 && summary.failed.is_empty() {
            "Nothing to delete locally".to_string()
        } else {
            format!("Deleted {deleted} local files")
        };
        info!(subject_id = %subject.id, deleted, "local copy deleted");
        TransferResult {
            success: true,
            message,
            url: None,
            derivatives: Some(summary),
        }
    }
}

fn display_mime(mime: &str) -> &str {
    if mime.trim().is_empty() { "(unknown)" } else { mime }
}

async fn is_file(path: &Path) -> bool {
    tokio::fs::metadata(path)
        .await
        .map(|m| m.is_file())
        .unwrap_or(false)
}

/// Removes `path`. Returns false if there was nothing to remove.
async fn remove_if_present(path: &Path) -> std::io::Result<bool> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e),
    }
}
