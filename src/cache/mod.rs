//! The task index.
//!
//! [`Cache`] owns the list of every task in the vault and keeps it in step
//! with the vault's change events. The list is published as an immutable
//! snapshot (`Arc<Vec<Task>>`) that is swapped whole; every change to it
//! happens while holding `tasks_mutex`, so a full load and per-file updates
//! never interleave their read-modify-write.

pub mod debounce;

pub use debounce::Debouncer;

use std::cell::LazyCell;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock, Weak};

use futures::future::join_all;
use serde::Serialize;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::events::{CacheUpdate, EventRef, TasksEvents};
use crate::model::config::Settings;
use crate::model::filter::GlobalFilter;
use crate::model::metadata::FileMetadata;
use crate::model::task::Task;
use crate::notice::Notices;
use crate::parse::date_fallback::DateFallback;
use crate::parse::file_parser::{LineFailure, parse_file_content};
use crate::vault::{Vault, VaultEvent, is_markdown};

/// Lifecycle of the index. Only ever moves forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub enum State {
    /// The vault is not ready yet
    Cold,
    /// The first full load is running
    Initializing,
    /// At least one full load has completed
    Warm,
}

pub struct Cache {
    vault: Arc<dyn Vault>,
    events: Arc<TasksEvents>,
    notices: Arc<dyn Notices>,
    filter: GlobalFilter,
    date_fallback: DateFallback,

    tasks_mutex: tokio::sync::Mutex<()>,
    tasks: RwLock<Arc<Vec<Task>>>,
    state: watch::Sender<State>,

    /// `Resolved` fires on every metadata change; only the first one loads
    loaded_after_first_resolve: AtomicBool,
    /// Created/deleted/renamed are ignored until the vault's layout is ready
    vault_events_enabled: AtomicBool,
    parse_error_reported: AtomicBool,

    notify: Debouncer,
    request_ref: EventRef,
    listener: Mutex<Option<JoinHandle<()>>>,
}

impl Cache {
    /// Create the index and start listening to `vault`.
    ///
    /// Must be called inside a tokio runtime. The index starts `Cold` and
    /// loads once the vault reports `Resolved` or `LayoutReady`.
    pub fn new(
        vault: Arc<dyn Vault>,
        events: Arc<TasksEvents>,
        notices: Arc<dyn Notices>,
        settings: &Settings,
    ) -> Arc<Cache> {
        // Subscribe before anything can be published
        let rx = vault.subscribe();

        let cache = Arc::new_cyclic(|weak: &Weak<Cache>| {
            let for_notify = weak.clone();
            let notify = Debouncer::new(settings.cache.debounce(), false, move || {
                if let Some(cache) = for_notify.upgrade() {
                    cache.notify_subscribers();
                }
            });

            let for_requests = weak.clone();
            let request_ref = events.on_request_cache_update(move || match for_requests.upgrade() {
                Some(cache) => cache.snapshot(),
                None => CacheUpdate {
                    tasks: Arc::new(Vec::new()),
                    state: State::Cold,
                },
            });

            let (state, _) = watch::channel(State::Cold);
            Cache {
                vault,
                events: events.clone(),
                notices,
                filter: settings.global_filter.clone(),
                date_fallback: DateFallback::new(settings.date_fallback.clone()),
                tasks_mutex: tokio::sync::Mutex::new(()),
                tasks: RwLock::new(Arc::new(Vec::new())),
                state,
                loaded_after_first_resolve: AtomicBool::new(false),
                vault_events_enabled: AtomicBool::new(false),
                parse_error_reported: AtomicBool::new(false),
                notify,
                request_ref,
                listener: Mutex::new(None),
            }
        });

        let handle = tokio::spawn(listen(Arc::downgrade(&cache), rx));
        *cache.listener.lock().unwrap_or_else(PoisonError::into_inner) = Some(handle);
        debug!("Cache::new: listening to vault");
        cache
    }

    /// Stop listening to the vault and answering snapshot requests. The last
    /// task list stays readable.
    pub fn unload(&self) {
        if let Some(handle) = self.listener.lock().unwrap_or_else(PoisonError::into_inner).take() {
            handle.abort();
        }
        self.events.off(self.request_ref);
        self.notify.cancel();
        info!("Cache::unload: detached from vault");
    }

    /// The current task list. Cheap; the snapshot is shared, not copied.
    pub fn get_tasks(&self) -> Arc<Vec<Task>> {
        self.tasks.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn get_state(&self) -> State {
        *self.state.borrow()
    }

    /// Follow state changes, e.g. to wait until the index is `Warm`
    pub fn watch_state(&self) -> watch::Receiver<State> {
        self.state.subscribe()
    }

    fn snapshot(&self) -> CacheUpdate {
        CacheUpdate {
            tasks: self.get_tasks(),
            state: self.get_state(),
        }
    }

    fn publish(&self, tasks: Vec<Task>) {
        *self.tasks.write().unwrap_or_else(PoisonError::into_inner) = Arc::new(tasks);
    }

    fn advance_state(&self, next: State) {
        let changed = self.state.send_if_modified(|state| {
            if next > *state {
                *state = next;
                true
            } else {
                false
            }
        });
        if changed {
            info!(state = ?next, "Cache: state changed");
        }
    }

    fn notify_subscribers(&self) {
        self.events.trigger_cache_update(&self.snapshot());
    }

    /// Schedule one debounced notification
    fn request_notify(&self) {
        self.notify.call();
    }

    /// Re-index every markdown file in the vault.
    ///
    /// Files are read and parsed concurrently; the results replace the task
    /// list in one step. Tasks of files that no longer exist are dropped;
    /// files whose metadata is not available yet keep their previous tasks.
    pub async fn load_vault(&self) {
        let _guard = self.tasks_mutex.lock().await;
        self.advance_state(State::Initializing);

        let files = self.vault.markdown_files();
        info!(files = files.len(), "Cache::load_vault: loading");
        let parsed = join_all(files.iter().map(|path| self.read_tasks(path))).await;

        let current = self.get_tasks();
        let mut next = Vec::with_capacity(current.len());
        for (path, result) in files.iter().zip(parsed) {
            match result {
                Some(tasks) => next.extend(tasks),
                None => next.extend(current.iter().filter(|t| t.path() == path.as_str()).cloned()),
            }
        }
        let count = next.len();
        self.publish(next);

        self.advance_state(State::Warm);
        info!(tasks = count, "Cache::load_vault: loaded");
        self.request_notify();
    }

    /// Re-index one file, replacing its tasks if anything changed
    pub async fn index_file(&self, path: &str) {
        let _guard = self.tasks_mutex.lock().await;
        let Some(new_tasks) = self.read_tasks(path).await else {
            return;
        };

        let current = self.get_tasks();
        let old_tasks: Vec<&Task> = current.iter().filter(|t| t.path() == path).collect();
        if Task::lists_are_identical(old_tasks.iter().copied(), &new_tasks) {
            debug!(%path, tasks = new_tasks.len(), "Cache::index_file: unchanged");
            return;
        }

        debug!(
            %path,
            old = old_tasks.len(),
            new = new_tasks.len(),
            "Cache::index_file: replacing tasks"
        );
        let mut next: Vec<Task> = current.iter().filter(|t| t.path() != path).cloned().collect();
        next.extend(new_tasks);
        self.publish(next);
        self.request_notify();
    }

    /// Drop every task of a deleted file
    pub async fn remove_file(&self, path: &str) {
        let _guard = self.tasks_mutex.lock().await;
        let current = self.get_tasks();
        let next: Vec<Task> = current.iter().filter(|t| t.path() != path).cloned().collect();
        debug!(%path, removed = current.len() - next.len(), "Cache::remove_file");
        self.publish(next);
        self.request_notify();
    }

    /// Point the tasks of a renamed file at its new path without reading it
    pub async fn rename_file(&self, path: &str, old_path: &str) {
        let _guard = self.tasks_mutex.lock().await;
        let current = self.get_tasks();
        let next = if is_markdown(path) {
            relocate_tasks(&current, old_path, path, &self.date_fallback)
        } else {
            debug!(%path, %old_path, "Cache::rename_file: no longer markdown, dropping tasks");
            current.iter().filter(|t| t.path() != old_path).cloned().collect()
        };
        debug!(%path, %old_path, "Cache::rename_file");
        self.publish(next);
        self.request_notify();
    }

    /// Parse the current tasks of `path`, or `None` when the file cannot be
    /// indexed yet (not markdown, no metadata, unreadable)
    async fn read_tasks(&self, path: &str) -> Option<Vec<Task>> {
        if !is_markdown(path) {
            debug!(%path, "Cache::read_tasks: not markdown, skipping");
            return None;
        }
        let Some(metadata) = self.vault.file_cache(path) else {
            debug!(%path, "Cache::read_tasks: no metadata yet, skipping");
            return None;
        };
        let content = match self.vault.read(path).await {
            Ok(content) => content,
            Err(e) => {
                warn!(%path, error = %e, "Cache::read_tasks: could not read file");
                return None;
            }
        };
        Some(self.parse(path, &content, &metadata))
    }

    fn parse(&self, path: &str, content: &str, metadata: &FileMetadata) -> Vec<Task> {
        let tasks = parse_file_content(
            path,
            content,
            metadata,
            &self.filter,
            &self.date_fallback,
            |failure| self.report_parse_failure(&failure),
        );
        debug!(%path, tasks = tasks.len(), "Cache::parse: read tasks");
        tasks
    }

    fn report_parse_failure(&self, failure: &LineFailure<'_>) {
        error!(
            path = failure.path,
            line_number = failure.list_item.line,
            line = failure.line,
            error = %failure.error,
            "Cache: error reading task line"
        );
        // Interrupt the user once at most, and only during the first load
        if self.get_state() == State::Initializing
            && !self.parse_error_reported.swap(true, Ordering::SeqCst)
        {
            self.notices.error(&format!(
                "There was an error reading one of the tasks in this vault.\n\
                 The following task has been ignored, to prevent the index from being stuck:\n\
                 \"{}\" (line {} of \"{}\")\n\
                 {}\n\
                 Please report this, including the task line above.",
                failure.line,
                failure.list_item.line + 1,
                failure.path,
                failure.error,
            ));
        }
    }

    async fn handle_event(&self, event: VaultEvent) {
        debug!(?event, "Cache::handle_event");
        match event {
            VaultEvent::LayoutReady => {
                self.vault_events_enabled.store(true, Ordering::SeqCst);
                self.load_vault().await;
            }
            VaultEvent::Resolved => {
                if !self.loaded_after_first_resolve.swap(true, Ordering::SeqCst) {
                    self.load_vault().await;
                }
            }
            VaultEvent::Changed(path) => self.index_file(&path).await,
            event if !self.vault_events_enabled.load(Ordering::SeqCst) => {
                debug!(?event, "Cache::handle_event: vault not ready, ignoring");
            }
            VaultEvent::Created(path) => self.index_file(&path).await,
            VaultEvent::Deleted(path) => self.remove_file(&path).await,
            VaultEvent::Renamed { path, old_path } => self.rename_file(&path, &old_path).await,
        }
    }
}

/// Apply vault events one at a time until the vault or the index goes away
async fn listen(cache: Weak<Cache>, mut rx: broadcast::Receiver<VaultEvent>) {
    loop {
        let event = match rx.recv().await {
            Ok(event) => event,
            Err(RecvError::Lagged(skipped)) => {
                warn!(skipped, "Cache: missed vault events, reloading everything");
                match cache.upgrade() {
                    Some(cache) => cache.load_vault().await,
                    None => break,
                }
                continue;
            }
            Err(RecvError::Closed) => break,
        };
        let Some(cache) = cache.upgrade() else {
            break;
        };
        cache.handle_event(event).await;
    }
    debug!("Cache: listener stopped");
}

/// Rewrite the location of every task in `old_path`. With date fallback
/// enabled, inferred scheduled dates are re-derived from the new name.
fn relocate_tasks(
    tasks: &[Task],
    old_path: &str,
    new_path: &str,
    date_fallback: &DateFallback,
) -> Vec<Task> {
    let fallback = LazyCell::new(|| date_fallback.from_path(new_path));
    tasks
        .iter()
        .map(|task| {
            if task.path() != old_path {
                return task.clone();
            }
            let location = task.location.from_renamed_file(new_path);
            if date_fallback.is_enabled() {
                DateFallback::update_task_path(task, location, *fallback)
            } else {
                Task {
                    location,
                    ..task.clone()
                }
            }
        })
        .collect()
}
