use serde::{Deserialize, Serialize};

/// The inclusion filter deciding whether a checklist line is a managed task.
///
/// An empty filter includes every checklist line. Otherwise the filter text
/// (usually a tag such as `#task`) must appear somewhere in the task body.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GlobalFilter(String);

impl GlobalFilter {
    pub fn new(filter: impl Into<String>) -> Self {
        GlobalFilter(filter.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Whether `text` passes the filter
    pub fn included_in(&self, text: &str) -> bool {
        text.contains(&self.0)
    }

    /// Whether the filter is exactly this tag (tags are stored with `#`)
    pub fn equals(&self, tag: &str) -> bool {
        !self.0.is_empty() && self.0 == tag
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_filter_includes_everything() {
        let filter = GlobalFilter::default();
        assert!(filter.is_empty());
        assert!(filter.included_in("- [ ] anything"));
        assert!(!filter.equals(""));
    }

    #[test]
    fn tag_filter() {
        let filter = GlobalFilter::new("#task");
        assert!(filter.included_in("- [ ] #task write tests"));
        assert!(!filter.included_in("- [ ] write tests"));
        assert!(filter.equals("#task"));
        assert!(!filter.equals("#tasks"));
    }
}
