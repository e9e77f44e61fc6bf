use std::cell::LazyCell;
use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;

use crate::model::filter::GlobalFilter;
use crate::model::location::TaskLocation;
use crate::model::metadata::{FileMetadata, ListItemCache, SectionCache};
use crate::model::task::{ListItem, ListNode, Task};
use crate::parse::date_fallback::DateFallback;
use crate::parse::task_parser::TaskLineError;

/// A task line that could not be read, handed to the caller's error callback
#[derive(Debug)]
pub struct LineFailure<'a> {
    pub error: TaskLineError,
    pub path: &'a str,
    pub list_item: &'a ListItemCache,
    pub line: &'a str,
}

/// Read every task in one file.
///
/// `metadata` may be stale relative to `content`. A list item past the end
/// of the file ends the scan with the tasks found so far; a list item outside
/// every section is skipped; a line that fails to parse is passed to
/// `on_error` and skipped. The next change notification for the file will
/// correct any of these.
pub fn parse_file_content(
    path: &str,
    content: &str,
    metadata: &FileMetadata,
    filter: &GlobalFilter,
    date_fallback: &DateFallback,
    mut on_error: impl FnMut(LineFailure<'_>),
) -> Vec<Task> {
    let mut tasks = Vec::new();
    let lines: Vec<&str> = content.split('\n').collect();

    // Only worth computing if some task turns out to have no dates
    let fallback_date = LazyCell::new(|| date_fallback.from_path(path));

    let mut current_section: Option<&SectionCache> = None;
    let mut section_index = 0;
    let mut line_to_node: HashMap<usize, Arc<ListNode>> = HashMap::new();

    for list_item in &metadata.list_items {
        let line_number = list_item.line;
        if line_number >= lines.len() {
            // The file shrank since the metadata was computed
            debug!(
                path,
                line_number,
                lines_in_file = lines.len(),
                "parse_file_content: list item past the end of the file"
            );
            return tasks;
        }

        if current_section.is_none_or(|s| s.end < line_number) {
            current_section = metadata.section_containing(line_number);
            section_index = 0;
        }
        let Some(section) = current_section else {
            continue;
        };

        let line = lines[line_number];
        let parent = list_item
            .parent
            .and_then(|p| line_to_node.get(&p))
            .cloned();

        if list_item.is_task() {
            let location = TaskLocation::new(
                path,
                line_number,
                section.start,
                section_index,
                metadata.preceding_header(line_number).map(str::to_string),
            );
            match Task::from_line(line, location, filter, || *fallback_date) {
                Ok(Some(mut task)) => {
                    task.parent = parent;
                    line_to_node.insert(line_number, Arc::new(ListNode::Task(task.clone())));
                    section_index += 1;
                    tasks.push(task);
                    continue;
                }
                Ok(None) => {}
                Err(error) => {
                    on_error(LineFailure {
                        error,
                        path,
                        list_item,
                        line,
                    });
                    continue;
                }
            }
        }

        // Plain list items, and checklist lines that are not managed tasks,
        // still anchor the parent chain of anything nested below them.
        line_to_node.insert(
            line_number,
            Arc::new(ListNode::Item(ListItem {
                original_markdown: line.to_string(),
                line_number,
                parent,
            })),
        );
    }

    tasks
}
