use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use tokio::sync::broadcast;
use tracing::debug;

use super::{EVENT_CHANNEL_CAPACITY, Vault, VaultError, VaultEvent, is_markdown};
use crate::model::metadata::FileMetadata;
use crate::parse::structure::scan;

#[derive(Default)]
struct MemoryState {
    files: BTreeMap<String, String>,
    folders: BTreeSet<String>,
    metadata: HashMap<String, FileMetadata>,
    /// Paths whose metadata is deliberately not available yet
    withheld: HashSet<String>,
}

impl MemoryState {
    fn put(&mut self, path: &str, content: &str) {
        self.files.insert(path.to_string(), content.to_string());
        if self.withheld.contains(path) {
            self.metadata.remove(path);
        } else {
            self.metadata.insert(path.to_string(), scan(content));
        }
    }
}

/// An in-memory vault.
///
/// Mutations made through the inherent methods behave like a user editing
/// files behind the index's back: they update content and metadata and then
/// publish the matching event. Metadata can be withheld per path to simulate
/// a host that has not caught up with a recent write.
pub struct MemoryVault {
    state: Mutex<MemoryState>,
    tx: broadcast::Sender<VaultEvent>,
    metadata_queries: AtomicUsize,
}

impl MemoryVault {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        MemoryVault {
            state: Mutex::new(MemoryState::default()),
            tx,
            metadata_queries: AtomicUsize::new(0),
        }
    }

    /// A vault pre-populated with files, without publishing any events
    pub fn with_files<'a>(files: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
        let vault = MemoryVault::new();
        {
            let mut state = vault.lock();
            for (path, content) in files {
                state.put(path, content);
            }
        }
        vault
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn emit(&self, event: VaultEvent) {
        debug!(?event, "MemoryVault::emit");
        // No subscribers is fine
        let _ = self.tx.send(event);
    }

    /// Set file content without publishing anything
    pub fn insert(&self, path: &str, content: &str) {
        self.lock().put(path, content);
    }

    pub fn create(&self, path: &str, content: &str) {
        self.insert(path, content);
        self.emit(VaultEvent::Created(path.to_string()));
    }

    pub fn change(&self, path: &str, content: &str) {
        self.insert(path, content);
        self.emit(VaultEvent::Changed(path.to_string()));
    }

    pub fn delete(&self, path: &str) {
        {
            let mut state = self.lock();
            state.files.remove(path);
            state.metadata.remove(path);
        }
        self.emit(VaultEvent::Deleted(path.to_string()));
    }

    /// Move a file. Metadata moves with it; content is not re-read.
    pub fn rename(&self, old_path: &str, new_path: &str) {
        {
            let mut state = self.lock();
            if let Some(content) = state.files.remove(old_path) {
                state.files.insert(new_path.to_string(), content);
            }
            if let Some(meta) = state.metadata.remove(old_path) {
                state.metadata.insert(new_path.to_string(), meta);
            }
        }
        self.emit(VaultEvent::Renamed {
            path: new_path.to_string(),
            old_path: old_path.to_string(),
        });
    }

    pub fn layout_ready(&self) {
        self.emit(VaultEvent::LayoutReady);
    }

    pub fn resolve(&self) {
        self.emit(VaultEvent::Resolved);
    }

    /// Hide metadata for `path` until [`MemoryVault::release_metadata`]
    pub fn withhold_metadata(&self, path: &str) {
        let mut state = self.lock();
        state.withheld.insert(path.to_string());
        state.metadata.remove(path);
    }

    /// Compute metadata for `path` again from its current content
    pub fn release_metadata(&self, path: &str) {
        let mut state = self.lock();
        state.withheld.remove(path);
        if let Some(content) = state.files.get(path).cloned() {
            state.metadata.insert(path.to_string(), scan(&content));
        }
    }

    /// Replace the metadata for `path`, e.g. with a stale copy
    pub fn set_metadata(&self, path: &str, metadata: FileMetadata) {
        self.lock().metadata.insert(path.to_string(), metadata);
    }

    /// Current content, for assertions
    pub fn content(&self, path: &str) -> Option<String> {
        self.lock().files.get(path).cloned()
    }

    /// How many times [`Vault::file_cache`] has been called
    pub fn metadata_queries(&self) -> usize {
        self.metadata_queries.load(Ordering::SeqCst)
    }
}

impl Default for MemoryVault {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Vault for MemoryVault {
    fn markdown_files(&self) -> Vec<String> {
        self.lock().files.keys().filter(|p| is_markdown(p)).cloned().collect()
    }

    async fn read(&self, path: &str) -> Result<String, VaultError> {
        self.content(path).ok_or_else(|| VaultError::NotFound(path.to_string()))
    }

    async fn modify(&self, path: &str, content: &str) -> Result<(), VaultError> {
        {
            let mut state = self.lock();
            if !state.files.contains_key(path) {
                return Err(VaultError::NotFound(path.to_string()));
            }
            state.put(path, content);
        }
        self.emit(VaultEvent::Changed(path.to_string()));
        Ok(())
    }

    fn exists(&self, path: &str) -> bool {
        let state = self.lock();
        state.files.contains_key(path) || state.folders.contains(path)
    }

    fn is_folder(&self, path: &str) -> bool {
        self.lock().folders.contains(path)
    }

    async fn create_folder(&self, path: &str) -> Result<(), VaultError> {
        self.lock().folders.insert(path.trim_end_matches('/').to_string());
        Ok(())
    }

    fn file_cache(&self, path: &str) -> Option<FileMetadata> {
        self.metadata_queries.fetch_add(1, Ordering::SeqCst);
        self.lock().metadata.get(path).cloned()
    }

    fn subscribe(&self) -> broadcast::Receiver<VaultEvent> {
        self.tx.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn events_follow_mutations() {
        let vault = MemoryVault::new();
        let mut rx = vault.subscribe();

        vault.create("a.md", "- [ ] one");
        vault.change("a.md", "- [ ] two");
        vault.rename("a.md", "b.md");
        vault.delete("b.md");

        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        assert_eq!(
            events,
            vec![
                VaultEvent::Created("a.md".into()),
                VaultEvent::Changed("a.md".into()),
                VaultEvent::Renamed {
                    path: "b.md".into(),
                    old_path: "a.md".into()
                },
                VaultEvent::Deleted("b.md".into()),
            ]
        );
        assert!(!vault.exists("b.md"));
    }

    #[tokio::test]
    async fn withheld_metadata_and_query_count() {
        let vault = MemoryVault::with_files([("a.md", "- [ ] one")]);
        assert!(vault.file_cache("a.md").is_some());

        vault.withhold_metadata("a.md");
        vault.change("a.md", "- [ ] one\n- [ ] two");
        assert!(vault.file_cache("a.md").is_none());

        vault.release_metadata("a.md");
        assert_eq!(vault.file_cache("a.md").map(|m| m.list_items.len()), Some(2));
        assert_eq!(vault.metadata_queries(), 3);
    }

    #[tokio::test]
    async fn modify_requires_existing_file() {
        let vault = MemoryVault::with_files([("a.md", "x"), ("img.png", "")]);
        assert!(matches!(vault.modify("nope.md", "y").await, Err(VaultError::NotFound(_))));
        vault.modify("a.md", "y").await.unwrap();
        assert_eq!(vault.read("a.md").await.unwrap(), "y");
        assert_eq!(vault.markdown_files(), vec!["a.md".to_string()]);
    }

    #[tokio::test]
    async fn folders() {
        let vault = MemoryVault::new();
        vault.create_folder("archive/").await.unwrap();
        assert!(vault.is_folder("archive"));
        assert!(vault.exists("archive"));
        assert!(!vault.is_folder("archive.md"));
    }
}
