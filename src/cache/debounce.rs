use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tracing::trace;

#[derive(Default)]
struct Pending {
    /// Bumped on every call; a timer only acts if nothing came after it
    generation: u64,
    /// A trailing call is owed when the window closes
    trailing: bool,
    window_open: bool,
}

/// Coalesces bursts of calls into one invocation of `action`.
///
/// Every call (re)starts a quiet window. When the window passes without
/// further calls, `action` runs once. With `leading`, the first call of a
/// burst runs `action` immediately and the trailing run only happens if more
/// calls arrived during the window.
///
/// Timers are tokio tasks, so [`Debouncer::call`] must run inside a runtime.
#[derive(Clone)]
pub struct Debouncer {
    window: Duration,
    leading: bool,
    action: Arc<dyn Fn() + Send + Sync>,
    pending: Arc<Mutex<Pending>>,
}

impl Debouncer {
    pub fn new(window: Duration, leading: bool, action: impl Fn() + Send + Sync + 'static) -> Self {
        Debouncer {
            window,
            leading,
            action: Arc::new(action),
            pending: Arc::new(Mutex::new(Pending::default())),
        }
    }

    pub fn call(&self) {
        let (generation, fire_now) = {
            let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
            pending.generation += 1;
            let fire_now = self.leading && !pending.window_open;
            if !fire_now {
                pending.trailing = true;
            }
            pending.window_open = true;
            (pending.generation, fire_now)
        };

        if fire_now {
            trace!("Debouncer::call: leading edge");
            (self.action)();
        }

        let pending = self.pending.clone();
        let action = self.action.clone();
        let window = self.window;
        tokio::spawn(async move {
            tokio::time::sleep(window).await;
            let fire = {
                let mut pending = pending.lock().unwrap_or_else(PoisonError::into_inner);
                if pending.generation != generation {
                    return;
                }
                pending.window_open = false;
                std::mem::take(&mut pending.trailing)
            };
            if fire {
                trace!("Debouncer: trailing edge");
                action();
            }
        });
    }

    /// Drop any pending trailing call
    pub fn cancel(&self) {
        let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        pending.generation += 1;
        pending.trailing = false;
        pending.window_open = false;
    }
}
