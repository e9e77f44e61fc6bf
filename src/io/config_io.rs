use std::fs;
use std::path::{Path, PathBuf};

use crate::model::config::Settings;

/// Name of the settings file in the vault root
pub const CONFIG_FILE_NAME: &str = ".taskvault.toml";

/// Error type for reading and editing `.taskvault.toml`
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("could not read {path}: {source}")]
    ReadError {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("could not write {path}: {source}")]
    WriteError {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("could not parse .taskvault.toml: {0}")]
    ParseError(#[from] toml::de::Error),
    #[error("could not parse .taskvault.toml for editing: {0}")]
    EditParseError(#[from] toml_edit::TomlError),
    #[error("unknown setting '{0}'")]
    UnknownKey(String),
    #[error("invalid value '{value}' for {key}: expected {expected}")]
    InvalidValue {
        key: String,
        value: String,
        expected: &'static str,
    },
}

/// Read settings for the vault at `root`. A missing file means defaults.
pub fn read_settings(root: &Path) -> Result<Settings, ConfigError> {
    let path = root.join(CONFIG_FILE_NAME);
    if !path.exists() {
        return Ok(Settings::default());
    }
    let text = fs::read_to_string(&path).map_err(|e| ConfigError::ReadError {
        path: path.clone(),
        source: e,
    })?;
    Ok(toml::from_str(&text)?)
}

/// Set one dotted key (e.g. `edit.max_retries`) in the settings file,
/// preserving the rest of its formatting. Creates the file if needed.
pub fn set_setting(root: &Path, key: &str, value: &str) -> Result<(), ConfigError> {
    let path = root.join(CONFIG_FILE_NAME);
    let text = if path.exists() {
        fs::read_to_string(&path).map_err(|e| ConfigError::ReadError {
            path: path.clone(),
            source: e,
        })?
    } else {
        String::new()
    };
    let mut doc: toml_edit::DocumentMut = text.parse()?;
    apply_setting(&mut doc, key, value)?;

    // Refuse to write something that no longer loads
    toml::from_str::<Settings>(&doc.to_string())?;

    fs::write(&path, doc.to_string()).map_err(|e| ConfigError::WriteError { path, source: e })
}

/// Update the document in place for a known key
pub fn apply_setting(
    doc: &mut toml_edit::DocumentMut,
    key: &str,
    value: &str,
) -> Result<(), ConfigError> {
    match key {
        "global_filter" => {
            doc["global_filter"] = toml_edit::value(value);
        }
        "date_fallback.enabled" => {
            let enabled = parse_bool(key, value)?;
            set_in_table(doc, "date_fallback", "enabled", toml_edit::value(enabled));
        }
        "date_fallback.folders" => {
            let mut folders = toml_edit::Array::new();
            for folder in value.split(',').map(str::trim).filter(|f| !f.is_empty()) {
                folders.push(folder.trim_end_matches('/'));
            }
            set_in_table(doc, "date_fallback", "folders", toml_edit::value(folders));
        }
        "cache.debounce_ms" => {
            set_in_table(doc, "cache", "debounce_ms", toml_edit::value(parse_int(key, value)?));
        }
        "edit.max_retries" => {
            set_in_table(doc, "edit", "max_retries", toml_edit::value(parse_int(key, value)?));
        }
        "edit.max_backoff_ms" => {
            set_in_table(doc, "edit", "max_backoff_ms", toml_edit::value(parse_int(key, value)?));
        }
        _ => return Err(ConfigError::UnknownKey(key.to_string())),
    }
    Ok(())
}

fn set_in_table(doc: &mut toml_edit::DocumentMut, table: &str, key: &str, item: toml_edit::Item) {
    if !doc.contains_key(table) {
        doc[table] = toml_edit::Item::Table(toml_edit::Table::new());
    }
    doc[table][key] = item;
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    match value {
        "true" | "yes" | "on" => Ok(true),
        "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            key: key.to_string(),
            value: value.to_string(),
            expected: "true or false",
        }),
    }
}

fn parse_int(key: &str, value: &str) -> Result<i64, ConfigError> {
    value
        .parse::<i64>()
        .ok()
        .filter(|n| *n >= 0)
        .ok_or_else(|| ConfigError::InvalidValue {
            key: key.to_string(),
            value: value.to_string(),
            expected: "a non-negative integer",
        })
}
