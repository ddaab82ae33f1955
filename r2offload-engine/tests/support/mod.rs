//! Shared fixtures: an in-memory object store and a media library backed by
//! a temporary directory.

#![allow(dead_code)]

use async_trait::async_trait;
use r2offload_cloud::{CloudError, CloudResult, ConnectionStatus, ObjectStore, UploadedObject};
use r2offload_engine::{BulkCoordinator, Derivative, EngineConfig, MediaLibrary, Subject};
use r2offload_storage::{Database, SubjectId};
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

// ── Object store ────────────────────────────────────────────────

#[derive(Default)]
pub struct MemoryStore {
    objects: Mutex<HashMap<String, Vec<u8>>>,
    failing: Mutex<HashSet<String>>,
    uploads: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Makes every upload to `key` fail.
    pub fn fail_on(&self, key: &str) {
        self.failing.lock().unwrap().insert(key.to_string());
    }

    pub fn contains(&self, key: &str) -> bool {
        self.objects.lock().unwrap().contains_key(key)
    }

    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.objects.lock().unwrap().keys().cloned().collect();
        keys.sort();
        keys
    }

    pub fn upload_count(&self) -> usize {
        self.uploads.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn test_connection(&self) -> ConnectionStatus {
        ConnectionStatus::ok("memory")
    }

    async fn upload(&self, local_path: &Path, remote_key: &str) -> CloudResult<UploadedObject> {
        self.uploads.fetch_add(1, Ordering::SeqCst);
        if self.failing.lock().unwrap().contains(remote_key) {
            return Err(CloudError::S3(format!("upload failed for {remote_key}: injected")));
        }
        let bytes = tokio::fs::read(local_path)
            .await
            .map_err(|_| CloudError::FileMissing(local_path.display().to_string()))?;
        let size = bytes.len() as u64;
        self.objects
            .lock()
            .unwrap()
            .insert(remote_key.to_string(), bytes);
        Ok(UploadedObject {
            key: remote_key.to_string(),
            url: self.public_url_for(remote_key),
            size,
            content_type: r2offload_cloud::guess_content_type(local_path),
        })
    }

    async fn download(&self, remote_key: &str, local_path: &Path) -> CloudResult<()> {
        let bytes = self
            .objects
            .lock()
            .unwrap()
            .get(remote_key)
            .cloned()
            .ok_or_else(|| CloudError::S3(format!("no such key {remote_key}")))?;
        tokio::fs::write(local_path, bytes).await?;
        Ok(())
    }

    async fn delete(&self, remote_key: &str) -> CloudResult<()> {
        self.objects.lock().unwrap().remove(remote_key);
        Ok(())
    }

    async fn exists(&self, remote_key: &str) -> bool {
        self.contains(remote_key)
    }

    fn public_url_for(&self, remote_key: &str) -> String {
        format!("https://cdn.test/{remote_key}")
    }
}

// ── Media library ───────────────────────────────────────────────

pub struct TestLibrary {
    dir: TempDir,
    subjects: Mutex<HashMap<SubjectId, Subject>>,
}

impl TestLibrary {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            dir: TempDir::new().unwrap(),
            subjects: Mutex::new(HashMap::new()),
        })
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    /// Registers a JPEG subject with files on disk for the primary and each
    /// named derivative variant.
    pub fn add_image(&self, id: i64, name: &str, variants: &[&str]) -> Subject {
        let subject = self.describe(id, name, "image/jpeg", variants);
        write(&subject.local_path, format!("primary {id}").as_bytes());
        for d in &subject.derivatives {
            write(&d.local_path, format!("{} {id}", d.variant).as_bytes());
        }
        self.insert(subject.clone());
        subject
    }

    /// Registers a subject whose files do not exist on disk.
    pub fn add_without_file(&self, id: i64, name: &str) -> Subject {
        let subject = self.describe(id, name, "image/jpeg", &[]);
        self.insert(subject.clone());
        subject
    }

    /// Registers a subject with a custom MIME type and a file on disk.
    pub fn add_with_mime(&self, id: i64, name: &str, mime: &str) -> Subject {
        let subject = self.describe(id, name, mime, &[]);
        write(&subject.local_path, b"payload");
        self.insert(subject.clone());
        subject
    }

    pub fn get(&self, id: i64) -> Subject {
        self.subjects.lock().unwrap()[&SubjectId(id)].clone()
    }

    fn describe(&self, id: i64, name: &str, mime: &str, variants: &[&str]) -> Subject {
        let relative = format!("2024/05/{name}");
        let (stem, ext) = name.rsplit_once('.').unwrap_or((name, "jpg"));
        let derivatives = variants
            .iter()
            .enumerate()
            .map(|(i, variant)| {
                let size = 150 * (i + 1);
                let rel = format!("2024/05/{stem}-{size}x{size}.{ext}");
                Derivative {
                    variant: variant.to_string(),
                    local_path: self.dir.path().join(&rel),
                    relative_path: rel,
                }
            })
            .collect();
        Subject {
            id: SubjectId(id),
            local_path: self.dir.path().join(&relative),
            relative_path: relative,
            mime_type: mime.to_string(),
            derivatives,
        }
    }

    fn insert(&self, subject: Subject) {
        self.subjects.lock().unwrap().insert(subject.id, subject);
    }
}

impl MediaLibrary for TestLibrary {
    fn subject(&self, id: SubjectId) -> Option<Subject> {
        self.subjects.lock().unwrap().get(&id).cloned()
    }
}

pub fn write(path: &Path, contents: &[u8]) {
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, contents).unwrap();
}

// ── Harness ─────────────────────────────────────────────────────

pub struct Harness {
    pub db: Database,
    pub store: Arc<MemoryStore>,
    pub library: Arc<TestLibrary>,
    pub coordinator: BulkCoordinator,
}

pub fn harness() -> Harness {
    harness_with(EngineConfig::default())
}

pub fn harness_with(config: EngineConfig) -> Harness {
    let db = Database::open_in_memory().unwrap();
    let store = MemoryStore::new();
    let library = TestLibrary::new();
    let coordinator = BulkCoordinator::new(&db, store.clone(), library.clone(), config);
    Harness {
        db,
        store,
        library,
        coordinator,
    }
}

pub fn ids(raw: &[i64]) -> Vec<SubjectId> {
    raw.iter().copied().map(SubjectId).collect()
}
