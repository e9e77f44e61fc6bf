//! User-visible notices.
//!
//! The index and the editor report problems the user has to act on through
//! [`Notices`]; everything else goes to the log only.

use std::sync::{Mutex, PoisonError};

use tracing::{error, warn};

pub trait Notices: Send + Sync {
    fn warn(&self, message: &str);
    fn error(&self, message: &str);
}

/// Notices written to the log
#[derive(Debug, Default)]
pub struct LogNotices;

impl Notices for LogNotices {
    fn warn(&self, message: &str) {
        warn!(notice = true, "{message}");
    }

    fn error(&self, message: &str) {
        error!(notice = true, "{message}");
    }
}

/// Notices printed to stderr, for the command line
#[derive(Debug, Default)]
pub struct StderrNotices;

impl Notices for StderrNotices {
    fn warn(&self, message: &str) {
        eprintln!("warning: {message}");
    }

    fn error(&self, message: &str) {
        eprintln!("error: {message}");
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    Warn(String),
    Error(String),
}

/// Keeps every notice for later inspection
#[derive(Debug, Default)]
pub struct RecordingNotices {
    notices: Mutex<Vec<Notice>>,
}

impl RecordingNotices {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn notices(&self) -> Vec<Notice> {
        self.notices.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn errors(&self) -> Vec<String> {
        self.notices()
            .into_iter()
            .filter_map(|n| match n {
                Notice::Error(message) => Some(message),
                Notice::Warn(_) => None,
            })
            .collect()
    }

    fn push(&self, notice: Notice) {
        self.notices.lock().unwrap_or_else(PoisonError::into_inner).push(notice);
    }
}

impl Notices for RecordingNotices {
    fn warn(&self, message: &str) {
        self.push(Notice::Warn(message.to_string()));
    }

    fn error(&self, message: &str) {
        self.push(Notice::Error(message.to_string()));
    }
}
