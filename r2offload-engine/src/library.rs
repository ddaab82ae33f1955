//! The host media library as seen by the engine.

use r2offload_storage::SubjectId;
use std::path::{Path, PathBuf};

/// A secondary rendition of a subject, such as a thumbnail size.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Derivative {
    pub variant: String,
    pub local_path: PathBuf,
    /// Path relative to the uploads root; the remote key is derived from it.
    pub relative_path: String,
}

/// A media object and its files.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Subject {
    pub id: SubjectId,
    pub local_path: PathBuf,
    /// Path relative to the uploads root, e.g. `2024/05/photo.jpg`.
    pub relative_path: String,
    pub mime_type: String,
    pub derivatives: Vec<Derivative>,
}

impl Subject {
    /// File name for display, falling back to the subject id.
    pub fn filename(&self) -> String {
        file_name_of(&self.local_path).unwrap_or_else(|| format!("#{}", self.id))
    }
}

fn file_name_of(path: &Path) -> Option<String> {
    path.file_name().map(|n| n.to_string_lossy().into_owned())
}

/// Looks up subjects by id.
pub trait MediaLibrary: Send + Sync {
    /// `None` when the subject no longer exists.
    fn subject(&self, id: SubjectId) -> Option<Subject>;
}
