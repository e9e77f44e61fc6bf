use std::sync::LazyLock;

use regex::Regex;

use crate::model::metadata::{FileMetadata, HeadingCache, ListItemCache, SectionCache, SectionKind};

static HEADING: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^ {0,3}(#{1,6})[ \t]+(.*?)[ \t]*$").expect("valid heading regex")
});

/// Indentation, list marker, then an optional checkbox
static LIST_ITEM: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([ \t]*)(?:[-*+]|\d+[.)])(?:[ \t]+|$)(?:\[(.)\](?:[ \t]|$))?")
        .expect("valid list item regex")
});

/// Tabs count as this many columns when comparing list indentation
const TAB_WIDTH: usize = 4;

/// Compute headings, sections and list items for one markdown file.
///
/// This is the structural view a host editor would normally provide. Line
/// numbers are 0-indexed and refer to `text.split('\n')`.
pub fn scan(text: &str) -> FileMetadata {
    let lines: Vec<&str> = text.split('\n').collect();
    let mut meta = FileMetadata::default();
    let mut idx = 0;

    while idx < lines.len() {
        let line = lines[idx];

        if line.trim().is_empty() {
            idx += 1;
            continue;
        }

        if is_fence(line) {
            let start = idx;
            idx += 1;
            while idx < lines.len() && !is_fence(lines[idx]) {
                idx += 1;
            }
            let end = idx.min(lines.len() - 1);
            meta.sections.push(section(SectionKind::Code, start, end));
            idx = end + 1;
            continue;
        }

        if let Some((level, heading)) = parse_heading(line) {
            meta.headings.push(HeadingCache {
                heading,
                level,
                line: idx,
            });
            meta.sections.push(section(SectionKind::Heading, idx, idx));
            idx += 1;
            continue;
        }

        if is_quote(line) {
            let start = idx;
            while idx < lines.len() && is_quote(lines[idx]) {
                idx += 1;
            }
            meta.sections.push(section(SectionKind::Blockquote, start, idx - 1));
            scan_list_items(&lines[start..idx], start, &mut meta.list_items);
            continue;
        }

        if LIST_ITEM.is_match(line) {
            let start = idx;
            let end = list_block_end(&lines, idx);
            meta.sections.push(section(SectionKind::List, start, end));
            scan_list_items(&lines[start..=end], start, &mut meta.list_items);
            idx = end + 1;
            continue;
        }

        let start = idx;
        while idx < lines.len() && continues_paragraph(lines[idx]) {
            idx += 1;
        }
        meta.sections.push(section(SectionKind::Paragraph, start, idx - 1));
    }

    meta
}

/// Last line of the list that starts at `start`. Blank lines stay inside the
/// list when more list content follows them.
fn list_block_end(lines: &[&str], start: usize) -> usize {
    let mut end = start;
    let mut idx = start + 1;
    while idx < lines.len() {
        let line = lines[idx];
        if line.trim().is_empty() {
            let mut peek = idx;
            while peek < lines.len() && lines[peek].trim().is_empty() {
                peek += 1;
            }
            if peek < lines.len()
                && (LIST_ITEM.is_match(lines[peek]) || count_indent(lines[peek]) > 0)
                && parse_heading(lines[peek]).is_none()
            {
                idx = peek;
                continue;
            }
            break;
        }
        let unindented = count_indent(line) == 0;
        if parse_heading(line).is_some() || is_quote(line) || (unindented && is_fence(line)) {
            break;
        }
        end = idx;
        idx += 1;
    }
    end
}

fn continues_paragraph(line: &str) -> bool {
    !line.trim().is_empty()
        && parse_heading(line).is_none()
        && !is_fence(line)
        && !is_quote(line)
        && !LIST_ITEM.is_match(line)
}

/// Record every list item in `lines`, linking each to the nearest less
/// indented item above it.
fn scan_list_items(lines: &[&str], offset: usize, items: &mut Vec<ListItemCache>) {
    let mut stack: Vec<(usize, usize)> = Vec::new();
    let mut in_fence = false;

    for (i, raw) in lines.iter().enumerate() {
        let body = strip_quote(raw);
        if is_fence(body) {
            in_fence = !in_fence;
            continue;
        }
        if in_fence {
            continue;
        }
        let Some(caps) = LIST_ITEM.captures(body) else {
            continue;
        };

        let indent = indent_width(caps.get(1).map_or("", |m| m.as_str()));
        while stack.last().is_some_and(|&(ind, _)| ind >= indent) {
            stack.pop();
        }
        let line = offset + i;
        items.push(ListItemCache {
            line,
            task: caps.get(2).and_then(|m| m.as_str().chars().next()),
            parent: stack.last().map(|&(_, parent)| parent),
        });
        stack.push((indent, line));
    }
}

fn section(kind: SectionKind, start: usize, end: usize) -> SectionCache {
    SectionCache { kind, start, end }
}

fn parse_heading(line: &str) -> Option<(u8, String)> {
    let caps = HEADING.captures(line)?;
    let level = caps[1].len() as u8;
    let text = caps[2].trim_end_matches('#').trim_end().to_string();
    Some((level, text))
}

fn is_fence(line: &str) -> bool {
    let trimmed = line.trim_start();
    trimmed.starts_with("```") || trimmed.starts_with("~~~")
}

fn is_quote(line: &str) -> bool {
    line.trim_start().starts_with('>')
}

/// Remove any number of leading `>` markers (and one following space each)
fn strip_quote(line: &str) -> &str {
    let mut rest = line;
    loop {
        let trimmed = rest.trim_start();
        match trimmed.strip_prefix('>') {
            Some(after) => rest = after.strip_prefix(' ').unwrap_or(after),
            None => return rest,
        }
    }
}

/// Count leading whitespace characters
fn count_indent(line: &str) -> usize {
    line.len() - line.trim_start().len()
}

fn indent_width(indent: &str) -> usize {
    indent
        .chars()
        .map(|c| if c == '\t' { TAB_WIDTH } else { 1 })
        .sum()
}
