use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::filter::GlobalFilter;

/// Configuration from `.taskvault.toml`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Settings {
    /// Text a checklist line must contain to count as a task (empty = all)
    #[serde(default)]
    pub global_filter: GlobalFilter,
    #[serde(default)]
    pub date_fallback: DateFallbackConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub edit: EditConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DateFallbackConfig {
    /// Use a date in the file name as the scheduled date of undated tasks
    #[serde(default)]
    pub enabled: bool,
    /// Only files under these folders (no trailing `/`). Empty = everywhere.
    #[serde(default)]
    pub folders: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Window for coalescing change notifications
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        CacheConfig {
            debounce_ms: default_debounce_ms(),
        }
    }
}

impl CacheConfig {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EditConfig {
    /// Retries after the first attempt before an edit is abandoned
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Upper bound for the delay between two attempts
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
}

impl Default for EditConfig {
    fn default() -> Self {
        EditConfig {
            max_retries: default_max_retries(),
            max_backoff_ms: default_max_backoff_ms(),
        }
    }
}

impl EditConfig {
    /// Delay before the next attempt: 1, 10, 100, 100, ... ms with the default cap
    pub fn backoff(&self, previous_tries: u32) -> Duration {
        let millis = 10u64
            .checked_pow(previous_tries)
            .unwrap_or(u64::MAX)
            .min(self.max_backoff_ms);
        Duration::from_millis(millis)
    }
}

fn default_debounce_ms() -> u64 {
    100
}

fn default_max_retries() -> u32 {
    10
}

fn default_max_backoff_ms() -> u64 {
    100
}
