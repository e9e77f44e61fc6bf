use serde::Serialize;

/// Where a task line lives: the file, the line, and enough section
/// information to find it again when line numbers have drifted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TaskLocation {
    /// Vault-relative path of the owning file (`/` separated)
    pub path: String,
    /// 0-indexed line number at indexing time
    pub line_number: usize,
    /// First line of the section that contains the task
    pub section_start: usize,
    /// The index of the nth task in its section
    pub section_index: usize,
    /// Text of the nearest heading above the task, if any
    pub preceding_header: Option<String>,
}

impl TaskLocation {
    pub fn new(
        path: impl Into<String>,
        line_number: usize,
        section_start: usize,
        section_index: usize,
        preceding_header: Option<String>,
    ) -> Self {
        TaskLocation {
            path: path.into(),
            line_number,
            section_start,
            section_index,
            preceding_header,
        }
    }

    /// For tasks whose position in a file is unknown or not needed.
    pub fn from_unknown_position(path: impl Into<String>) -> Self {
        TaskLocation::new(path, 0, 0, 0, None)
    }

    /// Same position, new file path. Used when a file is renamed and
    /// its content is known to be unchanged.
    pub fn from_renamed_file(&self, new_path: impl Into<String>) -> Self {
        TaskLocation {
            path: new_path.into(),
            ..self.clone()
        }
    }
}
