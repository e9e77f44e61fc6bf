//! The file store the index and the editor work against.
//!
//! A vault owns the files, computes their structural metadata and tells
//! subscribers about changes. [`MemoryVault`] keeps everything in memory and
//! lets tests control exactly when metadata becomes available; [`FsVault`]
//! is backed by a directory on disk.

pub mod fs;
pub mod memory;

pub use fs::FsVault;
pub use memory::MemoryVault;

use async_trait::async_trait;
use tokio::sync::broadcast;

use crate::io::lock::LockError;
use crate::model::metadata::FileMetadata;

/// The only file extension whose contents are indexed
pub const MARKDOWN_EXTENSION: &str = ".md";

/// Capacity of the change notification channel
pub const EVENT_CHANNEL_CAPACITY: usize = 1024;

/// Whether the vault-relative `path` names a markdown file
pub fn is_markdown(path: &str) -> bool {
    path.ends_with(MARKDOWN_EXTENSION)
}

/// Change notifications published by a vault. Paths are vault-relative and
/// use `/` as separator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VaultEvent {
    Created(String),
    /// Content changed and the file's metadata has been recomputed
    Changed(String),
    Deleted(String),
    Renamed { path: String, old_path: String },
    /// Metadata for every file has been (re)computed. Fires repeatedly.
    Resolved,
    /// The vault finished its own start-up enumeration
    LayoutReady,
}

#[derive(Debug, thiserror::Error)]
pub enum VaultError {
    #[error("file not found: {0}")]
    NotFound(String),
    #[error("{0} is not a markdown file")]
    UnsupportedExtension(String),
    #[error("I/O error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    Lock(#[from] LockError),
    #[error("could not watch vault: {0}")]
    Watch(#[from] notify::Error),
}

/// A collection of text files with structural metadata and change events
#[async_trait]
pub trait Vault: Send + Sync {
    /// Every markdown file, sorted by path
    fn markdown_files(&self) -> Vec<String>;

    async fn read(&self, path: &str) -> Result<String, VaultError>;

    /// Replace the full content of an existing file
    async fn modify(&self, path: &str, content: &str) -> Result<(), VaultError>;

    fn exists(&self, path: &str) -> bool;

    fn is_folder(&self, path: &str) -> bool;

    async fn create_folder(&self, path: &str) -> Result<(), VaultError>;

    /// Structural metadata for `path`, or `None` if it has not been
    /// computed yet
    fn file_cache(&self, path: &str) -> Option<FileMetadata>;

    fn subscribe(&self) -> broadcast::Receiver<VaultEvent>;
}
