use std::sync::LazyLock;

use chrono::NaiveDate;
use regex::Regex;

use crate::model::filter::GlobalFilter;
use crate::model::location::TaskLocation;
use crate::model::task::Task;

/// Indentation (including `>` for blockquotes and callouts), list marker,
/// checkbox with its status character, and the rest of the line.
static TASK_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([\s>]*)([-*+]|[0-9]+\.) +\[(.)\] *(.*)$").expect("valid task regex")
});

/// `#tag` at the start of the text or after whitespace
static HASH_TAGS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?:^|\s)(#[^ !@#$%^&*(),.?":{}|<>]+)"#).expect("valid tag regex")
});

static BLOCK_LINK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r" \^[a-zA-Z0-9-]+$").expect("valid block link regex"));

/// Date signifiers recognised at the end of a task body
const START_SIGNIFIER: &str = "🛫";
const SCHEDULED_SIGNIFIER: &str = "⏳";
const DUE_SIGNIFIER: &str = "📅";
const DONE_SIGNIFIER: &str = "✅";

/// Failure to read one task line. Reported per line; never aborts a file.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TaskLineError {
    #[error("invalid {field} date '{value}'")]
    InvalidDate { field: &'static str, value: String },
}

/// The pieces of a checklist line before any signifier parsing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskComponents<'a> {
    pub indentation: &'a str,
    pub list_marker: &'a str,
    pub status_character: char,
    pub body: &'a str,
}

/// Split a line into its checklist components, or `None` if it is not a
/// checklist line.
pub fn extract_task_components(line: &str) -> Option<TaskComponents<'_>> {
    let caps = TASK_LINE.captures(line)?;
    Some(TaskComponents {
        indentation: caps.get(1).map_or("", |m| m.as_str()),
        list_marker: caps.get(2).map_or("", |m| m.as_str()),
        status_character: caps.get(3)?.as_str().chars().next()?,
        body: caps.get(4).map_or("", |m| m.as_str()),
    })
}

impl Task {
    /// Build a task from one line of a file.
    ///
    /// Returns `Ok(None)` if the line is not a checklist line or does not pass
    /// the global filter. `fallback` is only called when the task has no
    /// start, scheduled or due date of its own.
    pub fn from_line(
        line: &str,
        location: TaskLocation,
        filter: &GlobalFilter,
        fallback: impl FnOnce() -> Option<NaiveDate>,
    ) -> Result<Option<Task>, TaskLineError> {
        let Some(components) = extract_task_components(line) else {
            return Ok(None);
        };

        // Cheapest rejection first
        if !filter.included_in(components.body) {
            return Ok(None);
        }

        let mut task = Task {
            status_character: components.status_character,
            description: String::new(),
            indentation: components.indentation.to_string(),
            list_marker: components.list_marker.to_string(),
            tags: Vec::new(),
            block_link: String::new(),
            start_date: None,
            scheduled_date: None,
            due_date: None,
            done_date: None,
            scheduled_date_is_inferred: false,
            original_markdown: line.to_string(),
            location,
            parent: None,
        };

        let mut remaining = components.body.trim_end();
        if let Some(m) = BLOCK_LINK.find(remaining) {
            task.block_link = m.as_str().to_string();
            remaining = remaining[..m.start()].trim_end();
        }

        // Strip signifiers from the end, in any order, until none match
        loop {
            let before = remaining;
            for (signifier, field) in [
                (START_SIGNIFIER, "start"),
                (SCHEDULED_SIGNIFIER, "scheduled"),
                (DUE_SIGNIFIER, "due"),
                (DONE_SIGNIFIER, "done"),
            ] {
                if let Some((rest, date)) = strip_trailing_date(remaining, signifier, field)? {
                    let slot = match field {
                        "start" => &mut task.start_date,
                        "scheduled" => &mut task.scheduled_date,
                        "due" => &mut task.due_date,
                        _ => &mut task.done_date,
                    };
                    *slot = Some(date);
                    remaining = rest;
                }
            }
            if remaining == before {
                break;
            }
        }

        task.description = remaining.trim().to_string();
        task.tags = HASH_TAGS
            .captures_iter(&task.description)
            .filter_map(|c| c.get(1))
            .map(|m| m.as_str().trim().to_string())
            .filter(|tag| !filter.equals(tag))
            .collect();

        if task.has_no_happens_dates()
            && let Some(date) = fallback()
        {
            task.scheduled_date = Some(date);
            task.scheduled_date_is_inferred = true;
        }

        Ok(Some(task))
    }

    /// The original line with a different checkbox character
    pub fn to_file_line_with_status(&self, status: char) -> String {
        match extract_task_components(&self.original_markdown) {
            Some(c) => {
                let mut line = format!("{}{} [{}]", c.indentation, c.list_marker, status);
                if !c.body.is_empty() {
                    line.push(' ');
                    line.push_str(c.body);
                }
                line
            }
            None => self.original_markdown.clone(),
        }
    }
}

/// If `text` ends with `<signifier> YYYY-MM-DD`, return the text before it
/// and the parsed date.
fn strip_trailing_date<'a>(
    text: &'a str,
    signifier: &str,
    field: &'static str,
) -> Result<Option<(&'a str, NaiveDate)>, TaskLineError> {
    let Some(pos) = text.rfind(signifier) else {
        return Ok(None);
    };
    let value = text[pos + signifier.len()..].trim();
    if !looks_like_date(value) {
        return Ok(None);
    }
    let date = NaiveDate::parse_from_str(value, "%Y-%m-%d").map_err(|_| {
        TaskLineError::InvalidDate {
            field,
            value: value.to_string(),
        }
    })?;
    Ok(Some((text[..pos].trim_end(), date)))
}

/// `NNNN-NN-NN`, digits only; calendar validity is checked separately
fn looks_like_date(s: &str) -> bool {
    let bytes = s.as_bytes();
    bytes.len() == 10
        && bytes.iter().enumerate().all(|(i, b)| match i {
            4 | 7 => *b == b'-',
            _ => b.is_ascii_digit(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn parse(line: &str) -> Option<Task> {
        Task::from_line(
            line,
            TaskLocation::from_unknown_position("a.md"),
            &GlobalFilter::default(),
            || None,
        )
        .unwrap()
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn components_of_indented_quoted_line() {
        let c = extract_task_components(">   - [/] inside a callout").unwrap();
        assert_eq!(c.indentation, ">   ");
        assert_eq!(c.list_marker, "-");
        assert_eq!(c.status_character, '/');
        assert_eq!(c.body, "inside a callout");
    }

    #[test]
    fn numbered_list_marker() {
        let task = parse("12. [x] numbered").unwrap();
        assert_eq!(task.list_marker, "12.");
        assert_eq!(task.status_character, 'x');
        assert_eq!(task.description, "numbered");
    }

    #[test]
    fn not_a_checklist_line() {
        assert!(parse("- plain item").is_none());
        assert!(parse("# heading").is_none());
        assert!(parse("").is_none());
    }

    #[test]
    fn parses_dates_tags_and_block_link() {
        let line = "- [ ] #task write docs #docs 🛫 2024-01-02 📅 2024-01-05 ^abc-1";
        let task = parse(line).unwrap();
        assert_eq!(task.description, "#task write docs #docs");
        assert_eq!(task.tags, vec!["#task".to_string(), "#docs".to_string()]);
        assert_eq!(task.block_link, " ^abc-1");
        assert_eq!(task.start_date, Some(date(2024, 1, 2)));
        assert_eq!(task.due_date, Some(date(2024, 1, 5)));
        assert_eq!(task.scheduled_date, None);
        assert_eq!(task.original_markdown, line);
    }

    #[test]
    fn impossible_date_is_a_line_error() {
        let err = Task::from_line(
            "- [ ] broken 📅 2024-02-31",
            TaskLocation::from_unknown_position("a.md"),
            &GlobalFilter::default(),
            || None,
        )
        .unwrap_err();
        assert_eq!(
            err,
            TaskLineError::InvalidDate {
                field: "due",
                value: "2024-02-31".into()
            }
        );
    }

    #[test]
    fn global_filter_excludes_and_is_removed_from_tags() {
        let filter = GlobalFilter::new("#task");
        let loc = || TaskLocation::from_unknown_position("a.md");
        let unmanaged = Task::from_line("- [ ] no filter here", loc(), &filter, || None);
        assert!(unmanaged.unwrap().is_none());

        let task = Task::from_line("- [ ] #task with #other", loc(), &filter, || None)
            .unwrap()
            .unwrap();
        assert_eq!(task.tags, vec!["#other".to_string()]);
    }

    #[test]
    fn fallback_applies_only_without_dates() {
        let loc = || TaskLocation::from_unknown_position("2024-03-01.md");
        let filter = GlobalFilter::default();

        let undated = Task::from_line("- [ ] undated", loc(), &filter, || Some(date(2024, 3, 1)))
            .unwrap()
            .unwrap();
        assert_eq!(undated.scheduled_date, Some(date(2024, 3, 1)));
        assert!(undated.scheduled_date_is_inferred);

        let mut called = false;
        let dated = Task::from_line("- [ ] dated 📅 2024-05-05", loc(), &filter, || {
            called = true;
            Some(date(2024, 3, 1))
        })
        .unwrap()
        .unwrap();
        assert!(!called);
        assert_eq!(dated.scheduled_date, None);
        assert!(!dated.scheduled_date_is_inferred);
    }

    #[test]
    fn rewrite_status_keeps_rest_of_line() {
        let task = parse("  * [ ] keep me 📅 2024-01-01").unwrap();
        assert_eq!(task.to_file_line_with_status('x'), "  * [x] keep me 📅 2024-01-01");
        let empty = parse("- [x]").unwrap();
        assert_eq!(empty.to_file_line_with_status(' '), "- [ ]");
    }
}
