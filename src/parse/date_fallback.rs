use std::sync::LazyLock;

use chrono::NaiveDate;
use regex::Regex;

use crate::model::config::DateFallbackConfig;
use crate::model::location::TaskLocation;
use crate::model::task::Task;

static DASHED_DATE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d{4})-(\d{2})-(\d{2})").expect("valid date regex"));
static COMPACT_DATE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d{4})(\d{2})(\d{2})").expect("valid date regex"));

/// Infers a scheduled date from a file name such as `daily/2024-03-01.md`.
#[derive(Debug, Clone, Default)]
pub struct DateFallback {
    config: DateFallbackConfig,
}

impl DateFallback {
    pub fn new(config: DateFallbackConfig) -> Self {
        DateFallback { config }
    }

    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    /// The date in the file name, if the feature is on and the file is in
    /// one of the configured folders.
    pub fn from_path(&self, path: &str) -> Option<NaiveDate> {
        if !self.config.enabled {
            return None;
        }
        if !self.matches_any_folder(path) {
            return None;
        }
        extract_date_from_path(path)
    }

    fn matches_any_folder(&self, path: &str) -> bool {
        if self.config.folders.is_empty() {
            return true;
        }
        self.config
            .folders
            .iter()
            .any(|folder| path.starts_with(&format!("{folder}/")))
    }

    /// Move a task to a renamed file, re-deriving an inferred scheduled date
    /// from the new name. Dates written on the task line are never touched.
    pub fn update_task_path(
        task: &Task,
        location: TaskLocation,
        fallback: Option<NaiveDate>,
    ) -> Task {
        let mut updated = Task {
            location,
            ..task.clone()
        };
        if task.scheduled_date_is_inferred {
            updated.scheduled_date = fallback;
            updated.scheduled_date_is_inferred = fallback.is_some();
        } else if task.has_no_happens_dates()
            && let Some(date) = fallback
        {
            updated.scheduled_date = Some(date);
            updated.scheduled_date_is_inferred = true;
        }
        updated
    }
}

/// Basename (without extension) matched against `YYYY-MM-DD`, then `YYYYMMDD`
pub fn extract_date_from_path(path: &str) -> Option<NaiveDate> {
    let first = path.rfind('/').map_or(0, |i| i + 1);
    let last = path.rfind('.').filter(|&i| i >= first).unwrap_or(path.len());
    let basename = &path[first..last];

    let caps = DASHED_DATE
        .captures(basename)
        .or_else(|| COMPACT_DATE.captures(basename))?;
    let year = caps[1].parse().ok()?;
    let month = caps[2].parse().ok()?;
    let day = caps[3].parse().ok()?;
    NaiveDate::from_ymd_opt(year, month, day)
}
