use serde::Serialize;

/// One markdown list line as recorded in a file's structural metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ListItemCache {
    /// 0-indexed line of the list marker
    pub line: usize,
    /// Checkbox character if the item is a checklist line (`- [x] ...`)
    pub task: Option<char>,
    /// Line of the enclosing list item; `None` for root items
    pub parent: Option<usize>,
}

impl ListItemCache {
    pub fn is_task(&self) -> bool {
        self.task.is_some()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SectionKind {
    Heading,
    List,
    Code,
    Blockquote,
    Paragraph,
}

/// A contiguous block of lines (inclusive on both ends)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SectionCache {
    pub kind: SectionKind,
    pub start: usize,
    pub end: usize,
}

impl SectionCache {
    pub fn contains(&self, line: usize) -> bool {
        self.start <= line && line <= self.end
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HeadingCache {
    pub heading: String,
    pub level: u8,
    pub line: usize,
}

/// Positions of headings, sections and list items in one file.
///
/// This is computed from a file's text at some point in time and may be
/// stale relative to what is on disk now. Everything that consumes it has to
/// tolerate line numbers that no longer match.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FileMetadata {
    pub list_items: Vec<ListItemCache>,
    pub sections: Vec<SectionCache>,
    pub headings: Vec<HeadingCache>,
}

impl FileMetadata {
    /// The section whose line range covers `line`
    pub fn section_containing(&self, line: usize) -> Option<&SectionCache> {
        self.sections.iter().find(|s| s.contains(line))
    }

    /// Text of the last heading that starts at or before `line`
    pub fn preceding_header(&self, line: usize) -> Option<&str> {
        let mut preceding = None;
        for heading in &self.headings {
            if heading.line > line {
                break;
            }
            preceding = Some(heading.heading.as_str());
        }
        preceding
    }
}
