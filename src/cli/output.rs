use indexmap::IndexMap;
use serde::Serialize;

use crate::cache::State;
use crate::model::task::{StatusType, Task};

// ---------------------------------------------------------------------------
// JSON output structs
// ---------------------------------------------------------------------------

#[derive(Serialize)]
pub struct TaskJson {
    /// 1-based, as editors show it
    pub line: usize,
    pub status: StatusType,
    pub status_character: char,
    pub description: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scheduled: Option<String>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub scheduled_inferred: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub due: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub done: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub heading: Option<String>,
}

#[derive(Serialize)]
pub struct FileTasksJson {
    pub path: String,
    pub tasks: Vec<TaskJson>,
}

#[derive(Serialize)]
pub struct UpdateJson {
    pub state: State,
    pub tasks: usize,
    pub files: usize,
}

// ---------------------------------------------------------------------------
// Conversions
// ---------------------------------------------------------------------------

pub fn task_to_json(task: &Task) -> TaskJson {
    TaskJson {
        line: task.line_number() + 1,
        status: task.status(),
        status_character: task.status_character,
        description: task.description.clone(),
        tags: task.tags.clone(),
        start: task.start_date.map(|d| d.to_string()),
        scheduled: task.scheduled_date.map(|d| d.to_string()),
        scheduled_inferred: task.scheduled_date_is_inferred,
        due: task.due_date.map(|d| d.to_string()),
        done: task.done_date.map(|d| d.to_string()),
        heading: task.location.preceding_header.clone(),
    }
}

/// Tasks grouped by file, files in the order they first appear
pub fn group_by_file<'a>(
    tasks: impl IntoIterator<Item = &'a Task>,
) -> IndexMap<&'a str, Vec<&'a Task>> {
    let mut groups: IndexMap<&str, Vec<&Task>> = IndexMap::new();
    for task in tasks {
        groups.entry(task.path()).or_default().push(task);
    }
    groups
}

pub fn files_to_json(groups: &IndexMap<&str, Vec<&Task>>) -> Vec<FileTasksJson> {
    groups
        .iter()
        .map(|(path, tasks)| FileTasksJson {
            path: path.to_string(),
            tasks: tasks.iter().map(|t| task_to_json(t)).collect(),
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Human-readable formatting
// ---------------------------------------------------------------------------

/// One task as `  12 [ ] description 📅 2024-01-02`
pub fn format_task_line(task: &Task) -> String {
    let mut line = format!(
        "{:>4} [{}] {}",
        task.line_number() + 1,
        task.status_character,
        task.description
    );
    let dates = [
        ("🛫", task.start_date),
        ("⏳", task.scheduled_date),
        ("📅", task.due_date),
        ("✅", task.done_date),
    ];
    for (sign, date) in dates {
        if let Some(date) = date {
            line.push_str(&format!(" {} {}", sign, date));
        }
    }
    line
}

/// Files separated by a blank line, each headed by its path
pub fn format_file_listing(groups: &IndexMap<&str, Vec<&Task>>) -> Vec<String> {
    let mut lines = Vec::new();
    for (i, (path, tasks)) in groups.iter().enumerate() {
        if i > 0 {
            lines.push(String::new());
        }
        lines.push(path.to_string());
        lines.extend(tasks.iter().map(|t| format_task_line(t)));
    }
    lines
}

/// One line per index update in `tv watch`
pub fn format_update(state: State, tasks: &[Task]) -> String {
    let files = group_by_file(tasks).len();
    format!("{:?}: {} tasks in {} files", state, tasks.len(), files)
}

pub fn update_to_json(state: State, tasks: &[Task]) -> UpdateJson {
    UpdateJson {
        state,
        tasks: tasks.len(),
        files: group_by_file(tasks).len(),
    }
}
