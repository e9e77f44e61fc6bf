use std::sync::Arc;

use chrono::NaiveDate;
use serde::Serialize;

use super::location::TaskLocation;

/// What a checkbox character means
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusType {
    Todo,
    InProgress,
    Done,
    Cancelled,
    NonStandard,
}

impl StatusType {
    /// Classify a checkbox character
    pub fn from_checkbox_char(c: char) -> StatusType {
        match c {
            ' ' => StatusType::Todo,
            '/' => StatusType::InProgress,
            'x' | 'X' => StatusType::Done,
            '-' => StatusType::Cancelled,
            _ => StatusType::NonStandard,
        }
    }
}

/// A markdown list line that is not a managed task.
///
/// Only kept while scanning a file so that tasks nested under plain list
/// items can still reach their ancestors.
#[derive(Debug, Clone, PartialEq)]
pub struct ListItem {
    pub original_markdown: String,
    pub line_number: usize,
    pub parent: Option<Arc<ListNode>>,
}

/// A node in the parent chain of a task
#[derive(Debug, Clone, PartialEq)]
pub enum ListNode {
    Item(ListItem),
    Task(Task),
}

impl ListNode {
    pub fn original_markdown(&self) -> &str {
        match self {
            ListNode::Item(item) => &item.original_markdown,
            ListNode::Task(task) => &task.original_markdown,
        }
    }

    pub fn line_number(&self) -> usize {
        match self {
            ListNode::Item(item) => item.line_number,
            ListNode::Task(task) => task.location.line_number,
        }
    }

    pub fn parent(&self) -> Option<&ListNode> {
        match self {
            ListNode::Item(item) => item.parent.as_deref(),
            ListNode::Task(task) => task.parent.as_deref(),
        }
    }

    pub fn as_task(&self) -> Option<&Task> {
        match self {
            ListNode::Task(task) => Some(task),
            ListNode::Item(_) => None,
        }
    }

    pub fn is_task(&self) -> bool {
        matches!(self, ListNode::Task(_))
    }
}

/// A checklist line recognised as a task, with its location and parsed fields
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Task {
    /// Character inside the checkbox `[ ]`
    pub status_character: char,
    /// Task text with dates and block link removed
    pub description: String,
    /// Leading whitespace and blockquote markers
    pub indentation: String,
    /// `-`, `*`, `+` or `N.`
    pub list_marker: String,
    /// Tags including the `#` prefix, global filter removed
    pub tags: Vec<String>,
    /// Trailing ` ^block-id`, or empty
    pub block_link: String,
    pub start_date: Option<NaiveDate>,
    pub scheduled_date: Option<NaiveDate>,
    pub due_date: Option<NaiveDate>,
    pub done_date: Option<NaiveDate>,
    /// Scheduled date came from the file name, not the line itself
    pub scheduled_date_is_inferred: bool,

    // --- Source tracking ---
    /// The exact line text at indexing time
    pub original_markdown: String,
    pub location: TaskLocation,
    /// Structural parent (indentation based); a copy taken at parse time
    #[serde(skip)]
    pub parent: Option<Arc<ListNode>>,
}

impl Task {
    pub fn path(&self) -> &str {
        &self.location.path
    }

    pub fn line_number(&self) -> usize {
        self.location.line_number
    }

    pub fn status(&self) -> StatusType {
        StatusType::from_checkbox_char(self.status_character)
    }

    pub fn parent(&self) -> Option<&ListNode> {
        self.parent.as_deref()
    }

    /// Iterate from the direct parent up to the root of the list
    pub fn ancestors(&self) -> impl Iterator<Item = &ListNode> {
        std::iter::successors(self.parent(), |node| node.parent())
    }

    /// The root of this task's list, or `None` if the task is itself a root
    pub fn root(&self) -> Option<&ListNode> {
        self.ancestors().last()
    }

    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }

    /// Whether neither start, scheduled nor due date is set
    pub fn has_no_happens_dates(&self) -> bool {
        self.start_date.is_none() && self.scheduled_date.is_none() && self.due_date.is_none()
    }

    /// The checkbox character a toggle would switch to
    pub fn toggled_status_character(&self) -> char {
        match self.status() {
            StatusType::Done | StatusType::Cancelled => ' ',
            _ => 'x',
        }
    }

    /// Equality over everything that matters to consumers of the index:
    /// markdown, location, status, dates and the markdown of the parent.
    pub fn identical_to(&self, other: &Task) -> bool {
        self.original_markdown == other.original_markdown
            && self.location == other.location
            && self.status_character == other.status_character
            && self.scheduled_date == other.scheduled_date
            && self.scheduled_date_is_inferred == other.scheduled_date_is_inferred
            && self.parent().map(ListNode::original_markdown)
                == other.parent().map(ListNode::original_markdown)
    }

    /// Same length and pairwise [`Task::identical_to`] in the same order
    pub fn lists_are_identical<'a>(
        a: impl IntoIterator<Item = &'a Task>,
        b: impl IntoIterator<Item = &'a Task>,
    ) -> bool {
        let (mut a, mut b) = (a.into_iter(), b.into_iter());
        loop {
            match (a.next(), b.next()) {
                (None, None) => return true,
                (Some(x), Some(y)) if x.identical_to(y) => {}
                _ => return false,
            }
        }
    }
}
