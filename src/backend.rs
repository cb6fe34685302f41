//! Backing Medium
//!
//! TigerStyle: Byte-level read/write behind a trait so the store can be
//! exercised against a read-only medium without touching the real disk.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │                Backend Trait                 │
//! └─────────────────────────────────────────────┘
//!          ↑                         ↑
//!          │                         │
//! ┌────────┴────────┐       ┌────────┴────────┐
//! │  MemoryBackend  │       │   FileBackend   │
//! │    (testing)    │       │  (production)   │
//! └─────────────────┘       └─────────────────┘
//! ```

use async_trait::async_trait;
use std::ffi::OsString;
use std::fmt::Debug;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::fs;
use tokio::sync::Mutex;

// =============================================================================
// Backend Trait
// =============================================================================

/// Whole-document storage for the form collection
#[async_trait]
pub trait Backend: Send + Sync + Debug {
    /// Read the full document.
    async fn read(&self) -> Result<Vec<u8>, BackendError>;

    /// Replace the full document.
    async fn write(&self, bytes: &[u8]) -> Result<(), BackendError>;

    /// Human-readable location, for logs.
    fn describe(&self) -> String;
}

// =============================================================================
// FileBackend
// =============================================================================

/// A JSON document on the local filesystem.
///
/// Writes go to a sibling `.tmp` file which is then renamed over the
/// target, so a crash mid-write never leaves a truncated document.
#[derive(Debug, Clone)]
pub struct FileBackend {
    path: PathBuf,
}

impl FileBackend {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        assert!(!path.as_os_str().is_empty(), "data path cannot be empty");
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn tmp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| OsString::from("forms"));
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

#[async_trait]
impl Backend for FileBackend {
    async fn read(&self) -> Result<Vec<u8>, BackendError> {
        Ok(fs::read(&self.path).await?)
    }

    async fn write(&self, bytes: &[u8]) -> Result<(), BackendError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).await?;
            }
        }

        let tmp_path = self.tmp_path();
        fs::write(&tmp_path, bytes).await?;
        if let Err(e) = fs::rename(&tmp_path, &self.path).await {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(e.into());
        }
        Ok(())
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}

// =============================================================================
// MemoryBackend
// =============================================================================

/// In-memory document with a read-only switch.
///
/// Stands in for deployments where the filesystem can be read but not
/// written.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    document: Mutex<Option<Vec<u8>>>,
    read_only: AtomicBool,
}

impl MemoryBackend {
    /// Empty medium: reads fail as "not found" until the first write.
    pub fn new() -> Self {
        Self::default()
    }

    /// Medium pre-seeded with a document.
    pub fn with_document(bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            document: Mutex::new(Some(bytes.into())),
            read_only: AtomicBool::new(false),
        }
    }

    /// Reject (or stop rejecting) all writes.
    pub fn set_read_only(&self, read_only: bool) {
        self.read_only.store(read_only, Ordering::SeqCst);
    }

    /// Current document, if any was seeded or written.
    pub async fn document(&self) -> Option<Vec<u8>> {
        self.document.lock().await.clone()
    }
}

#[async_trait]
impl Backend for MemoryBackend {
    async fn read(&self) -> Result<Vec<u8>, BackendError> {
        self.document.lock().await.clone().ok_or_else(|| {
            BackendError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "no document written",
            ))
        })
    }

    async fn write(&self, bytes: &[u8]) -> Result<(), BackendError> {
        if self.read_only.load(Ordering::SeqCst) {
            return Err(BackendError::ReadOnly(self.describe()));
        }
        *self.document.lock().await = Some(bytes.to_vec());
        Ok(())
    }

    fn describe(&self) -> String {
        "memory".to_string()
    }
}

// =============================================================================
// Errors
// =============================================================================

/// Backing medium errors
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("backing medium is read-only: {0}")]
    ReadOnly(String),
}

// =============================================================================
// Tests
// =============================================================================
