//! Which subjects may be offloaded.

use crate::library::Subject;

/// Offload precondition checked before any upload.
pub trait Eligibility: Send + Sync {
    fn is_eligible(&self, subject: &Subject) -> bool;
}

impl<F> Eligibility for F
where
    F: Fn(&Subject) -> bool + Send + Sync,
{
    fn is_eligible(&self, subject: &Subject) -> bool {
        self(subject)
    }
}

/// Allows subjects whose MIME type starts with one of the listed prefixes.
#[derive(Clone, Debug)]
pub struct MimeAllowList {
    prefixes: Vec<String>,
}

impl MimeAllowList {
    pub fn new<I, S>(prefixes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            prefixes: prefixes
                .into_iter()
                .map(|p| p.into().to_ascii_lowercase())
                .collect(),
        }
    }
}

impl Default for MimeAllowList {
    /// Images, video, audio and PDF documents.
    fn default() -> Self {
        Self::new(["image/", "video/", "audio/", "application/pdf"])
    }
}

impl Eligibility for MimeAllowList {
    fn is_eligible(&self, subject: &Subject) -> bool {
        let mime = subject.mime_type.trim().to_ascii_lowercase();
        !mime.is_empty() && self.prefixes.iter().any(|p| mime.starts_with(p.as_str()))
    }
}
