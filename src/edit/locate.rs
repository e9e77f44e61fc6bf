use tracing::debug;

use crate::model::filter::GlobalFilter;
use crate::model::metadata::ListItemCache;
use crate::model::task::Task;

/// Why a task line could not be located, and whether trying again may help
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LocateError {
    /// Expected to clear up shortly; worth a log warning
    #[error("{0}")]
    TransientWarn(String),
    /// Expected to clear up shortly; not worth mentioning
    #[error("task line not found yet")]
    TransientSilent,
    #[error("{0}")]
    Permanent(String),
}

/// Find the line that currently holds `task` in `lines`.
///
/// Tries, in order: the recorded line number, a unique exact match anywhere
/// in the file, then the task's position among the checklist items of its
/// section. `Ok(None)` means nothing matched (or the metadata is behind the
/// file); an error means the section position now holds different text.
pub fn find_line_number_of_task(
    task: &Task,
    lines: &[&str],
    list_items: &[ListItemCache],
    filter: &GlobalFilter,
) -> Result<Option<usize>, LocateError> {
    let location = &task.location;
    let markdown = task.original_markdown.as_str();

    if lines.get(location.line_number) == Some(&markdown) {
        debug!(
            path = %location.path,
            line_number = location.line_number,
            "find_line_number_of_task: exact line"
        );
        return Ok(Some(location.line_number));
    }

    let mut matches = lines.iter().enumerate().filter(|(_, line)| **line == markdown);
    if let (Some((line_number, _)), None) = (matches.next(), matches.next()) {
        debug!(path = %location.path, line_number, "find_line_number_of_task: unique match");
        return Ok(Some(line_number));
    }

    find_by_section_position(task, lines, list_items, filter)
}

/// Count tasks from the start of the task's section the way the file parser does
fn find_by_section_position(
    task: &Task,
    lines: &[&str],
    list_items: &[ListItemCache],
    filter: &GlobalFilter,
) -> Result<Option<usize>, LocateError> {
    let location = &task.location;
    let mut section_index = 0;

    for item in list_items {
        if item.line >= lines.len() {
            // Metadata describes a longer file than the one we read
            debug!(
                path = %location.path,
                line_number = item.line,
                "find_by_section_position: metadata past end of file"
            );
            return Ok(None);
        }
        if item.line < location.section_start || !item.is_task() {
            continue;
        }

        // Count only lines the file parser would have turned into tasks
        let line = lines[item.line];
        if !matches!(Task::from_line(line, location.clone(), filter, || None), Ok(Some(_))) {
            continue;
        }
        if section_index == location.section_index {
            if line == task.original_markdown {
                debug!(
                    path = %location.path,
                    line_number = item.line,
                    "find_by_section_position: found"
                );
                return Ok(Some(item.line));
            }
            return Err(LocateError::Permanent(format!(
                "Unable to find task in file {}.\nExpected task:\n{}\nFound task:\n{}",
                location.path, task.original_markdown, line
            )));
        }
        section_index += 1;
    }

    Ok(None)
}
