use tracing::{debug, info};

use super::{EditError, TaskEditor};
use crate::model::metadata::{FileMetadata, HeadingCache, ListItemCache};
use crate::model::task::Task;
use crate::vault::VaultError;

/// Where to put a moved task in its target file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MoveTarget {
    pub path: String,
    /// Heading text to file the task under. `None` means the part of the
    /// file before the first heading.
    pub heading: Option<String>,
    /// Ignore `heading` and append at the end of the file
    pub append_to_end: bool,
}

/// The task line plus every following line indented deeper than it.
///
/// Blank lines are kept only if more children follow them.
pub fn task_with_children<'a>(lines: &[&'a str], task_line: usize) -> Vec<&'a str> {
    let Some(&first) = lines.get(task_line) else {
        return Vec::new();
    };
    let task_indent = indent_level(first);
    let mut result = vec![first];

    for (offset, &line) in lines[task_line + 1..].iter().enumerate() {
        if line.trim().is_empty() {
            let rest = &lines[task_line + 1 + offset + 1..];
            if !more_children_follow(rest, task_indent) {
                break;
            }
            result.push(line);
            continue;
        }
        if indent_level(line) > task_indent {
            result.push(line);
        } else {
            break;
        }
    }
    result
}

fn more_children_follow(lines: &[&str], task_indent: usize) -> bool {
    lines
        .iter()
        .find(|line| !line.trim().is_empty())
        .is_some_and(|line| indent_level(line) > task_indent)
}

fn indent_level(line: &str) -> usize {
    line.len() - line.trim_start().len()
}

/// Line index in `lines` at which moved lines should be inserted.
///
/// - `append_to_end`: end of file
/// - no heading: after the last task before the first heading, else end of file
/// - heading present: after the last task under it, else directly below it
/// - heading absent: end of file
///
/// `metadata` may lag behind `lines`. Entries pointing past the end of
/// `lines` are ignored and the result never exceeds `lines.len()`.
pub fn find_insertion_point(
    lines: &[&str],
    metadata: Option<&FileMetadata>,
    heading: Option<&str>,
    append_to_end: bool,
) -> usize {
    if append_to_end {
        return lines.len();
    }
    let (headings, list_items): (Vec<&HeadingCache>, Vec<&ListItemCache>) = match metadata {
        Some(meta) => (
            meta.headings.iter().filter(|h| h.line < lines.len()).collect(),
            meta.list_items.iter().filter(|item| item.line < lines.len()).collect(),
        ),
        None => (Vec::new(), Vec::new()),
    };
    let last_task_in = |from: Option<usize>, to: usize| {
        list_items
            .iter()
            .filter(|item| item.is_task() && from.is_none_or(|f| item.line > f) && item.line < to)
            .map(|item| item.line)
            .max()
    };

    let Some(heading) = heading else {
        let first_heading = headings.first().map_or(usize::MAX, |h| h.line);
        return last_task_in(None, first_heading).map_or(lines.len(), |line| line + 1);
    };

    let Some(index) = headings.iter().position(|h| h.heading == heading) else {
        return lines.len();
    };
    let heading_line = headings[index].line;
    let next_heading = headings.get(index + 1).map_or(lines.len(), |h| h.line);
    last_task_in(Some(heading_line), next_heading)
        .map_or(heading_line + 1, |line| line + 1)
        .min(lines.len())
}

/// Move a block of lines within one file
pub fn move_within_file(
    lines: &[&str],
    task_line: usize,
    insertion: usize,
    moved: &[&str],
) -> Vec<String> {
    let end = task_line + moved.len();
    let result: Vec<&str> = if insertion <= task_line {
        [&lines[..insertion], moved, &lines[insertion..task_line], &lines[end..]].concat()
    } else {
        [&lines[..task_line], &lines[end..insertion], moved, &lines[insertion..]].concat()
    };
    result.into_iter().map(str::to_string).collect()
}

impl TaskEditor {
    /// Move `task` and its children to another place, in the same or in
    /// another file. The target is written before the source, so a failure
    /// in between leaves a copy rather than losing the task.
    pub async fn move_task_to_section(
        &self,
        task: &Task,
        target: &MoveTarget,
    ) -> Result<(), EditError> {
        let located = self.locate_with_retry(task).await?;
        let source_lines = located.lines();
        let moved = task_with_children(&source_lines, located.line_number);
        debug!(
            path = %located.path,
            line_number = located.line_number,
            lines = moved.len(),
            "TaskEditor::move_task_to_section: moving task with children"
        );

        if target.path == located.path {
            let insertion = find_insertion_point(
                &source_lines,
                self.vault.file_cache(&located.path).as_ref(),
                target.heading.as_deref(),
                target.append_to_end,
            );
            // Inserting inside the moved block itself would be a no-op at best
            let block = located.line_number..located.line_number + moved.len();
            let insertion = if block.contains(&insertion) {
                located.line_number
            } else {
                insertion
            };
            let updated = move_within_file(&source_lines, located.line_number, insertion, &moved);
            self.vault.modify(&located.path, &updated.join("\n")).await?;
            info!(
                path = %located.path,
                insertion,
                "TaskEditor::move_task_to_section: moved within file"
            );
            return Ok(());
        }

        if !self.vault.exists(&target.path) {
            return Err(VaultError::NotFound(target.path.clone()).into());
        }
        let target_content = self.vault.read(&target.path).await?;
        let mut target_lines: Vec<&str> = target_content.split('\n').collect();
        let insertion = find_insertion_point(
            &target_lines,
            self.vault.file_cache(&target.path).as_ref(),
            target.heading.as_deref(),
            target.append_to_end,
        );
        target_lines.splice(insertion..insertion, moved.iter().copied());
        self.vault.modify(&target.path, &target_lines.join("\n")).await?;

        let mut remaining = source_lines.clone();
        remaining.drain(located.line_number..located.line_number + moved.len());
        self.vault.modify(&located.path, &remaining.join("\n")).await?;

        info!(
            from = %located.path,
            to = %target.path,
            insertion,
            "TaskEditor::move_task_to_section: moved between files"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::config::Settings;
    use crate::model::filter::GlobalFilter;
    use crate::model::location::TaskLocation;
    use crate::notice::RecordingNotices;
    use crate::parse::structure::scan;
    use crate::vault::MemoryVault;
    use pretty_assertions::assert_eq;
    use std::sync::Arc;

    fn lines(text: &str) -> Vec<&str> {
        text.split('\n').collect()
    }

    fn insertion(text: &str, heading: Option<&str>, append: bool) -> usize {
        find_insertion_point(&lines(text), Some(&scan(text)), heading, append)
    }

    #[test]
    fn children_include_nested_and_inner_blank_lines() {
        let text = "- [ ] parent\n  - [ ] child\n\n    more\n- [ ] sibling";
        assert_eq!(
            task_with_children(&lines(text), 0),
            vec!["- [ ] parent", "  - [ ] child", "", "    more"]
        );
    }

    #[test]
    fn trailing_blank_lines_are_not_children() {
        let text = "- [ ] parent\n  - [ ] child\n\n# Next";
        assert_eq!(task_with_children(&lines(text), 0), vec!["- [ ] parent", "  - [ ] child"]);
    }

    #[test]
    fn insertion_points() {
        let text = "- [ ] loose\nprose\n# Work\n- [ ] a\n- [ ] b\n# Empty\n\n# Last";
        assert_eq!(insertion(text, None, false), 1);
        assert_eq!(insertion(text, Some("Work"), false), 5);
        assert_eq!(insertion(text, Some("Empty"), false), 6);
        assert_eq!(insertion(text, Some("Missing"), false), 8);
        assert_eq!(insertion(text, Some("Work"), true), 8);
        assert_eq!(insertion("# Only heading\n- [ ] t", None, false), 2);
        assert_eq!(find_insertion_point(&lines("a\nb"), None, Some("X"), false), 2);
    }

    #[test]
    fn outdated_metadata_never_points_past_the_end() {
        let outdated = scan("# Today\n- [ ] a\n- [ ] b\n# Later");
        let current = lines("# Today");
        assert_eq!(find_insertion_point(&current, Some(&outdated), Some("Today"), false), 1);
        assert_eq!(find_insertion_point(&current, Some(&outdated), Some("Later"), false), 1);
        assert_eq!(find_insertion_point(&current, Some(&outdated), None, false), 1);
    }

    #[test]
    fn moving_within_a_file_in_both_directions() {
        let src = lines("a\nT\n  c\nb\nz");
        let moved = task_with_children(&src, 1);
        assert_eq!(move_within_file(&src, 1, 0, &moved), vec!["T", "  c", "a", "b", "z"]);
        assert_eq!(move_within_file(&src, 1, 4, &moved), vec!["a", "b", "T", "  c", "z"]);
        assert_eq!(move_within_file(&src, 1, 5, &moved), vec!["a", "b", "z", "T", "  c"]);
    }

    fn task_at(path: &str, markdown: &str, line_number: usize) -> Task {
        let location = TaskLocation::new(path, line_number, 0, 0, None);
        Task::from_line(markdown, location, &GlobalFilter::default(), || None)
            .unwrap()
            .unwrap()
    }

    fn editor(vault: &Arc<MemoryVault>) -> TaskEditor {
        TaskEditor::new(vault.clone(), &Settings::default(), Arc::new(RecordingNotices::new()))
    }

    #[tokio::test]
    async fn move_between_files_under_heading() {
        let vault = Arc::new(MemoryVault::with_files([
            ("inbox.md", "- [ ] keep\n- [ ] go\n    - [ ] sub\n- [ ] stay"),
            ("work.md", "# Today\n- [ ] existing\n\n# Later\n- [ ] later"),
        ]));
        let task = task_at("inbox.md", "- [ ] go", 1);
        let target = MoveTarget {
            path: "work.md".into(),
            heading: Some("Today".into()),
            append_to_end: false,
        };

        editor(&vault).move_task_to_section(&task, &target).await.unwrap();

        assert_eq!(vault.content("inbox.md").unwrap(), "- [ ] keep\n- [ ] stay");
        assert_eq!(
            vault.content("work.md").unwrap(),
            "# Today\n- [ ] existing\n- [ ] go\n    - [ ] sub\n\n# Later\n- [ ] later"
        );
    }

    #[tokio::test]
    async fn move_into_file_whose_metadata_is_behind() {
        let vault = Arc::new(MemoryVault::with_files([
            ("inbox.md", "- [ ] go"),
            ("work.md", "# Today"),
        ]));
        // Index still describes a longer version of work.md
        vault.set_metadata("work.md", scan("# Today\n- [ ] a\n- [ ] b\n# Later"));
        let task = task_at("inbox.md", "- [ ] go", 0);
        let target = MoveTarget {
            path: "work.md".into(),
            heading: Some("Today".into()),
            append_to_end: false,
        };

        editor(&vault).move_task_to_section(&task, &target).await.unwrap();

        assert_eq!(vault.content("work.md").unwrap(), "# Today\n- [ ] go");
        assert_eq!(vault.content("inbox.md").unwrap(), "");
    }

    #[tokio::test]
    async fn move_within_file_to_other_heading() {
        let vault = Arc::new(MemoryVault::with_files([(
            "a.md",
            "# Todo\n- [ ] one\n- [ ] two\n# Done\n- [x] old",
        )]));
        let task = task_at("a.md", "- [ ] one", 1);
        let target = MoveTarget {
            path: "a.md".into(),
            heading: Some("Done".into()),
            append_to_end: false,
        };

        editor(&vault).move_task_to_section(&task, &target).await.unwrap();
        assert_eq!(
            vault.content("a.md").unwrap(),
            "# Todo\n- [ ] two\n# Done\n- [x] old\n- [ ] one"
        );
    }

    #[tokio::test]
    async fn move_to_missing_file_changes_nothing() {
        let vault = Arc::new(MemoryVault::with_files([("a.md", "- [ ] one")]));
        let task = task_at("a.md", "- [ ] one", 0);
        let target = MoveTarget {
            path: "nope.md".into(),
            heading: None,
            append_to_end: true,
        };
        let result = editor(&vault).move_task_to_section(&task, &target).await;
        assert!(matches!(result, Err(EditError::Vault(VaultError::NotFound(_)))));
        assert_eq!(vault.content("a.md").unwrap(), "- [ ] one");
    }
}
