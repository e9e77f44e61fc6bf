use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError, RwLock, Weak};

use async_trait::async_trait;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use super::{EVENT_CHANNEL_CAPACITY, Vault, VaultError, VaultEvent, is_markdown};
use crate::io::atomic::atomic_write;
use crate::io::lock::VaultLock;
use crate::io::watcher::{FsChange, VaultWatcher};
use crate::model::metadata::FileMetadata;
use crate::parse::structure::scan;

/// A vault backed by a directory on disk.
///
/// Metadata is computed for every markdown file when the vault is opened and
/// kept current by the watcher started with [`FsVault::start`]. Writes go
/// through a temp file and rename while holding the vault's advisory lock.
pub struct FsVault {
    root: PathBuf,
    metadata: RwLock<HashMap<String, FileMetadata>>,
    tx: broadcast::Sender<VaultEvent>,
    watcher: Mutex<Option<VaultWatcher>>,
    forwarder: Mutex<Option<JoinHandle<()>>>,
}

impl FsVault {
    /// Open the vault rooted at `root` and compute metadata for every file
    pub fn open(root: &Path) -> Result<Arc<Self>, VaultError> {
        let root = std::fs::canonicalize(root).map_err(|e| VaultError::Io {
            path: root.display().to_string(),
            source: e,
        })?;
        let (tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let vault = Arc::new(FsVault {
            root,
            metadata: RwLock::new(HashMap::new()),
            tx,
            watcher: Mutex::new(None),
            forwarder: Mutex::new(None),
        });

        let files = vault.markdown_files();
        for path in &files {
            match std::fs::read_to_string(vault.full_path(path)) {
                Ok(content) => vault.store_metadata(path, scan(&content)),
                Err(e) => warn!(%path, error = %e, "FsVault::open: could not read file"),
            }
        }
        info!(
            root = %vault.root.display(),
            files = files.len(),
            "FsVault::open: metadata resolved"
        );
        Ok(vault)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Announce that the vault is ready. With `watch`, also start following
    /// changes on disk until the vault is dropped.
    pub fn start(self: &Arc<Self>, watch: bool) -> Result<(), VaultError> {
        if watch {
            let (tx, rx) = mpsc::unbounded_channel();
            let watcher = VaultWatcher::start(&self.root, tx)?;
            *self.watcher.lock().unwrap_or_else(PoisonError::into_inner) = Some(watcher);

            let handle = tokio::spawn(forward_changes(Arc::downgrade(self), rx));
            *self.forwarder.lock().unwrap_or_else(PoisonError::into_inner) = Some(handle);
            info!(root = %self.root.display(), "FsVault::start: watching for changes");
        }
        self.emit(VaultEvent::LayoutReady);
        self.emit(VaultEvent::Resolved);
        Ok(())
    }

    fn emit(&self, event: VaultEvent) {
        debug!(?event, "FsVault::emit");
        let _ = self.tx.send(event);
    }

    fn full_path(&self, path: &str) -> PathBuf {
        self.root.join(path)
    }

    /// Vault-relative path with `/` separators
    fn relative_path(&self, full: &Path) -> Option<String> {
        let relative = full.strip_prefix(&self.root).ok()?;
        let parts: Vec<&str> = relative
            .components()
            .map(|c| c.as_os_str().to_str())
            .collect::<Option<Vec<_>>>()?;
        Some(parts.join("/"))
    }

    fn store_metadata(&self, path: &str, metadata: FileMetadata) {
        self.metadata
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(path.to_string(), metadata);
    }

    fn forget_metadata(&self, path: &str) -> bool {
        self.metadata
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(path)
            .is_some()
    }

    fn knows(&self, path: &str) -> bool {
        self.metadata
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(path)
    }

    /// Re-read `path` from disk and refresh its metadata. Returns false if
    /// the file is gone.
    async fn refresh(&self, path: &str) -> bool {
        match tokio::fs::read_to_string(self.full_path(path)).await {
            Ok(content) => {
                self.store_metadata(path, scan(&content));
                true
            }
            Err(e) => {
                debug!(%path, error = %e, "FsVault::refresh: file not readable");
                false
            }
        }
    }

    async fn apply_change(&self, change: FsChange) {
        match change {
            FsChange::Changed(full) => {
                let Some(path) = self.relative_path(&full).filter(|p| is_markdown(p)) else {
                    return;
                };
                let known = self.knows(&path);
                if self.refresh(&path).await {
                    self.emit(if known {
                        VaultEvent::Changed(path)
                    } else {
                        VaultEvent::Created(path)
                    });
                } else if self.forget_metadata(&path) {
                    self.emit(VaultEvent::Deleted(path));
                }
            }
            FsChange::Removed(full) => {
                if let Some(path) = self.relative_path(&full)
                    && self.forget_metadata(&path)
                {
                    self.emit(VaultEvent::Deleted(path));
                }
            }
            FsChange::Renamed { from, to } => {
                let old_path = self.relative_path(&from);
                let new_path = self.relative_path(&to).filter(|p| is_markdown(p));
                let had_old = old_path.as_deref().is_some_and(|p| self.forget_metadata(p));

                match (old_path, new_path) {
                    (Some(old_path), Some(path)) if had_old => {
                        self.refresh(&path).await;
                        self.emit(VaultEvent::Renamed { path, old_path });
                    }
                    (old_path, Some(path)) => {
                        // Source unknown (already reported removed, or not markdown)
                        let known = self.knows(&path);
                        if self.refresh(&path).await {
                            self.emit(if known {
                                VaultEvent::Changed(path)
                            } else {
                                VaultEvent::Created(path)
                            });
                        }
                        debug!(?old_path, "FsVault::apply_change: rename from untracked path");
                    }
                    (Some(old_path), None) if had_old => {
                        self.emit(VaultEvent::Deleted(old_path));
                    }
                    _ => {}
                }
            }
        }
    }
}

/// Apply watcher changes in arrival order until the vault goes away
async fn forward_changes(vault: Weak<FsVault>, mut rx: mpsc::UnboundedReceiver<FsChange>) {
    while let Some(change) = rx.recv().await {
        let Some(vault) = vault.upgrade() else {
            break;
        };
        vault.apply_change(change).await;
    }
    debug!("forward_changes: watcher closed");
}

impl Drop for FsVault {
    fn drop(&mut self) {
        if let Some(handle) = self.forwarder.lock().unwrap_or_else(PoisonError::into_inner).take() {
            handle.abort();
        }
    }
}

#[async_trait]
impl Vault for FsVault {
    fn markdown_files(&self) -> Vec<String> {
        let mut files: Vec<String> = WalkDir::new(&self.root)
            .follow_links(false)
            .into_iter()
            .filter_entry(|e| e.depth() == 0 || !e.file_name().to_string_lossy().starts_with('.'))
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .filter_map(|e| self.relative_path(e.path()))
            .filter(|p| is_markdown(p))
            .collect();
        files.sort();
        files
    }

    async fn read(&self, path: &str) -> Result<String, VaultError> {
        tokio::fs::read_to_string(self.full_path(path))
            .await
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => VaultError::NotFound(path.to_string()),
                _ => VaultError::Io {
                    path: path.to_string(),
                    source: e,
                },
            })
    }

    async fn modify(&self, path: &str, content: &str) -> Result<(), VaultError> {
        let full = self.full_path(path);
        if !full.is_file() {
            return Err(VaultError::NotFound(path.to_string()));
        }

        let root = self.root.clone();
        let bytes = content.as_bytes().to_vec();
        let written = tokio::task::spawn_blocking(move || -> Result<(), VaultError> {
            let _lock = VaultLock::acquire_default(&root)?;
            atomic_write(&full, &bytes).map_err(|e| VaultError::Io {
                path: full.display().to_string(),
                source: e,
            })
        })
        .await
        .map_err(|e| VaultError::Io {
            path: path.to_string(),
            source: std::io::Error::other(e),
        })?;
        written?;

        // The watcher reports the change; keep metadata current for callers
        // that query it before the event arrives.
        self.store_metadata(path, scan(content));
        debug!(%path, bytes = content.len(), "FsVault::modify: written");
        Ok(())
    }

    fn exists(&self, path: &str) -> bool {
        self.full_path(path).exists()
    }

    fn is_folder(&self, path: &str) -> bool {
        self.full_path(path).is_dir()
    }

    async fn create_folder(&self, path: &str) -> Result<(), VaultError> {
        tokio::fs::create_dir_all(self.full_path(path))
            .await
            .map_err(|e| VaultError::Io {
                path: path.to_string(),
                source: e,
            })
    }

    fn file_cache(&self, path: &str) -> Option<FileMetadata> {
        self.metadata
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(path)
            .cloned()
    }

    fn subscribe(&self) -> broadcast::Receiver<VaultEvent> {
        self.tx.subscribe()
    }
}
