//! Rewriting task lines in files that may have changed since they were
//! indexed.

pub mod locate;
pub mod move_task;

pub use locate::{LocateError, find_line_number_of_task};

use std::sync::Arc;

use tracing::{debug, error, info, warn};

use crate::model::config::{EditConfig, Settings};
use crate::model::filter::GlobalFilter;
use crate::model::task::Task;
use crate::notice::Notices;
use crate::vault::{Vault, VaultError, is_markdown};

/// Outcome of an edit that did not happen
#[derive(Debug, thiserror::Error)]
pub enum EditError {
    #[error("{reason}")]
    Permanent { path: String, reason: String },
    #[error("could not locate the task line in {path} after {attempts} attempts")]
    RetriesExhausted { path: String, attempts: u32 },
    #[error(transparent)]
    Vault(#[from] VaultError),
}

/// A task line found in the current content of its file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocatedTask {
    pub path: String,
    pub line_number: usize,
    pub content: String,
}

impl LocatedTask {
    pub fn lines(&self) -> Vec<&str> {
        self.content.split('\n').collect()
    }
}

/// Applies edits to task lines through the vault
pub struct TaskEditor {
    vault: Arc<dyn Vault>,
    filter: GlobalFilter,
    config: EditConfig,
    notices: Arc<dyn Notices>,
}

impl TaskEditor {
    pub fn new(vault: Arc<dyn Vault>, settings: &Settings, notices: Arc<dyn Notices>) -> Self {
        TaskEditor {
            vault,
            filter: settings.global_filter.clone(),
            config: settings.edit.clone(),
            notices,
        }
    }

    /// Replace the line holding `task` with `new_lines` (one or more) and
    /// write the file back.
    pub async fn replace_task_with_lines(
        &self,
        task: &Task,
        new_lines: &[String],
    ) -> Result<(), EditError> {
        let located = self.locate_with_retry(task).await?;
        let mut lines = located.lines();
        let line_number = located.line_number;
        lines.splice(line_number..=line_number, new_lines.iter().map(String::as_str));

        if let Err(e) = self.vault.modify(&located.path, &lines.join("\n")).await {
            error!(
                path = %located.path,
                error = %e,
                "TaskEditor::replace_task_with_lines: write failed"
            );
            self.notices.error(&format!("Could not write {}: {e}", located.path));
            return Err(e.into());
        }
        info!(
            path = %located.path,
            line_number,
            replacement_lines = new_lines.len(),
            "TaskEditor::replace_task_with_lines: updated"
        );
        Ok(())
    }

    /// Where `task` is now, for jumping to it without editing
    pub async fn locate_task_line(&self, task: &Task) -> Option<(usize, String)> {
        self.locate_with_retry(task)
            .await
            .ok()
            .map(|located| (located.line_number, located.path))
    }

    /// Locate `task`, retrying with backoff while the failure is transient.
    ///
    /// Gives up after `max_retries` retries; permanent failures end the loop
    /// at once. Either way the user gets a notice.
    pub(crate) async fn locate_with_retry(&self, task: &Task) -> Result<LocatedTask, EditError> {
        let path = task.path();
        let mut previous_tries = 0u32;
        loop {
            let error = match self.try_locate(task).await {
                Ok(located) => return Ok(located),
                Err(error) => error,
            };

            match &error {
                LocateError::Permanent(reason) => {
                    error!(%path, %reason, "TaskEditor: cannot locate task");
                    self.notices.error(reason);
                    return Err(EditError::Permanent {
                        path: path.to_string(),
                        reason: reason.clone(),
                    });
                }
                LocateError::TransientWarn(reason) => {
                    warn!(%path, previous_tries, %reason, "TaskEditor: retrying");
                }
                LocateError::TransientSilent => {
                    debug!(%path, previous_tries, "TaskEditor: retrying");
                }
            }

            if previous_tries >= self.config.max_retries {
                error!(%path, attempts = previous_tries + 1, "TaskEditor: giving up");
                self.notices.error(&retries_exhausted_message(task));
                return Err(EditError::RetriesExhausted {
                    path: path.to_string(),
                    attempts: previous_tries + 1,
                });
            }

            tokio::time::sleep(self.config.backoff(previous_tries)).await;
            previous_tries += 1;
        }
    }

    /// One attempt at finding the task line, classifying any failure
    async fn try_locate(&self, task: &Task) -> Result<LocatedTask, LocateError> {
        let path = task.path();
        if !is_markdown(path) {
            return Err(LocateError::Permanent(format!(
                "Files like {path} are not supported; only markdown files can be edited."
            )));
        }
        if !self.vault.exists(path) {
            return Err(LocateError::Permanent(format!(
                "No file found for task {}",
                task.description
            )));
        }

        let Some(metadata) = self.vault.file_cache(path) else {
            return Err(LocateError::TransientWarn(format!("No file cache found for file {path}")));
        };
        if metadata.list_items.is_empty() {
            return Err(LocateError::TransientWarn(format!(
                "No list items found in file cache of {path}"
            )));
        }

        let content = self
            .vault
            .read(path)
            .await
            .map_err(|e| LocateError::Permanent(e.to_string()))?;
        let lines: Vec<&str> = content.split('\n').collect();
        let found = find_line_number_of_task(task, &lines, &metadata.list_items, &self.filter)?;
        match found {
            Some(line_number) => Ok(LocatedTask {
                path: path.to_string(),
                line_number,
                content,
            }),
            None => Err(LocateError::TransientSilent),
        }
    }
}

fn retries_exhausted_message(task: &Task) -> String {
    format!(
        "Could not find the correct task line to update.\n\
         \n\
         The task line not updated is:\n\
         {}\n\
         \n\
         In this markdown file:\n\
         \"{}\"\n\
         \n\
         Recommendations:\n\
         \n\
         1. Close anything that has the above file open, and then re-open the file.\n\
         \n\
         2. Check for exactly identical copies of the task line in this file, \
         and see if you can make them different.",
        task.original_markdown,
        task.path()
    )
}
