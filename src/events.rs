//! Publish/subscribe between the task index and its consumers.
//!
//! The index publishes a [`CacheUpdate`] after every change. Consumers that
//! start later can ask for the current snapshot with
//! [`TasksEvents::request_cache_update`] instead of waiting for the next
//! change.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::debug;

use crate::cache::State;
use crate::model::task::Task;

/// The tasks and lifecycle state of the index at one point in time
#[derive(Debug, Clone)]
pub struct CacheUpdate {
    pub tasks: Arc<Vec<Task>>,
    pub state: State,
}

/// Handle returned by a registration, used to remove it again
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EventRef(u64);

type UpdateHandler = Arc<dyn Fn(&CacheUpdate) + Send + Sync>;
type SnapshotProvider = Arc<dyn Fn() -> CacheUpdate + Send + Sync>;

enum Registration {
    CacheUpdate(UpdateHandler),
    RequestCacheUpdate(SnapshotProvider),
}

#[derive(Default)]
pub struct TasksEvents {
    next_ref: AtomicU64,
    registrations: Mutex<Vec<(EventRef, Registration)>>,
}

impl TasksEvents {
    pub fn new() -> Self {
        Self::default()
    }

    fn registrations(&self) -> MutexGuard<'_, Vec<(EventRef, Registration)>> {
        self.registrations.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn register(&self, registration: Registration) -> EventRef {
        let event_ref = EventRef(self.next_ref.fetch_add(1, Ordering::Relaxed));
        self.registrations().push((event_ref, registration));
        event_ref
    }

    /// Call `handler` with every update the index publishes
    pub fn on_cache_update(
        &self,
        handler: impl Fn(&CacheUpdate) + Send + Sync + 'static,
    ) -> EventRef {
        let event_ref = self.register(Registration::CacheUpdate(Arc::new(handler)));
        debug!(?event_ref, "TasksEvents::on_cache_update: subscribed");
        event_ref
    }

    pub fn trigger_cache_update(&self, update: &CacheUpdate) {
        // Handlers run without the registry lock so they may (un)subscribe
        let handlers: Vec<UpdateHandler> = self
            .registrations()
            .iter()
            .filter_map(|(_, r)| match r {
                Registration::CacheUpdate(h) => Some(h.clone()),
                Registration::RequestCacheUpdate(_) => None,
            })
            .collect();
        debug!(
            handlers = handlers.len(),
            tasks = update.tasks.len(),
            state = ?update.state,
            "TasksEvents::trigger_cache_update"
        );
        for handler in handlers {
            handler(update);
        }
    }

    /// Register the source of on-demand snapshots (the index)
    pub fn on_request_cache_update(
        &self,
        provider: impl Fn() -> CacheUpdate + Send + Sync + 'static,
    ) -> EventRef {
        self.register(Registration::RequestCacheUpdate(Arc::new(provider)))
    }

    /// Call `handler` once with the current snapshot. Does nothing if no
    /// index is registered.
    pub fn request_cache_update(&self, handler: impl Fn(&CacheUpdate)) {
        let providers: Vec<SnapshotProvider> = self
            .registrations()
            .iter()
            .filter_map(|(_, r)| match r {
                Registration::RequestCacheUpdate(p) => Some(p.clone()),
                Registration::CacheUpdate(_) => None,
            })
            .collect();
        for provider in providers {
            handler(&provider());
        }
    }

    pub fn off(&self, event_ref: EventRef) {
        self.registrations().retain(|(r, _)| *r != event_ref);
        debug!(?event_ref, "TasksEvents::off");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn update(state: State) -> CacheUpdate {
        CacheUpdate {
            tasks: Arc::new(Vec::new()),
            state,
        }
    }

    #[test]
    fn subscribe_trigger_unsubscribe() {
        let events = TasksEvents::new();
        let seen = Arc::new(AtomicUsize::new(0));

        let counter = seen.clone();
        let handle = events.on_cache_update(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        events.trigger_cache_update(&update(State::Warm));
        events.trigger_cache_update(&update(State::Warm));
        events.off(handle);
        events.trigger_cache_update(&update(State::Warm));

        assert_eq!(seen.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn request_answers_from_provider() {
        let events = TasksEvents::new();
        let states = Mutex::new(Vec::new());

        events.request_cache_update(|u| states.lock().unwrap().push(u.state));
        assert!(states.lock().unwrap().is_empty());

        let provider = events.on_request_cache_update(|| update(State::Initializing));
        events.request_cache_update(|u| states.lock().unwrap().push(u.state));
        assert_eq!(*states.lock().unwrap(), vec![State::Initializing]);

        events.off(provider);
        events.request_cache_update(|u| states.lock().unwrap().push(u.state));
        assert_eq!(states.lock().unwrap().len(), 1);
    }

    #[test]
    fn providers_are_not_update_handlers() {
        let events = TasksEvents::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        events.on_request_cache_update(move || {
            counter.fetch_add(1, Ordering::SeqCst);
            update(State::Cold)
        });
        events.trigger_cache_update(&update(State::Warm));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }
}
