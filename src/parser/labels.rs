//! Label-bounded value extraction.
//!
//! Report pages have no declared schema: a field is a `Label:` followed by
//! its value, and the value ends wherever the next field starts. Fields sit
//! either side by side on one line (separated by two or more spaces) or one
//! per line, so the end of a value is found structurally: the first place
//! where something shaped like another label begins.

use std::sync::LazyLock;

use regex::Regex;

/// Something shaped like a field label: a short run of words, digits and
/// `&()/#?-`, then a colon.
pub(crate) const LABEL_SHAPE: &str = r"[A-Za-z0-9 &()/#?-]+?:";

/// A run of two-or-more whitespace characters, or a single newline, followed
/// by a label.
static BOUNDARY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(
        r"(?P<double>\s{{2,}}{LABEL_SHAPE})|(?P<newline>\n{LABEL_SHAPE})"
    ))
    .unwrap()
});
static MULTI_SPACE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s{2,}").unwrap());

/// Where a label's value stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Boundary {
    /// Two or more spaces, then another label on the same line.
    DoubleSpaceLabel,
    /// A line break, then another label.
    NewlineLabel,
    /// Nothing else followed.
    EndOfText,
}

/// Find where the value starting at the head of `rest` ends.
pub fn find_boundary(rest: &str) -> (usize, Boundary) {
    match BOUNDARY_RE.captures(rest) {
        Some(caps) => {
            let start = caps.get(0).map_or(rest.len(), |m| m.start());
            if caps.name("double").is_some() {
                (start, Boundary::DoubleSpaceLabel)
            } else {
                (start, Boundary::NewlineLabel)
            }
        }
        None => (rest.len(), Boundary::EndOfText),
    }
}

/// Recover the value of `label` from `text`. Case-insensitive; the first
/// occurrence of `label:` wins. Never fails: a missing label, or a label
/// with nothing after it, is `None`.
pub fn extract(text: &str, label: &str) -> Option<String> {
    extract_bounded(text, label).or_else(|| extract_line(text, label))
}

/// Try each label in order and return the first value found.
pub fn extract_any(text: &str, labels: &[&str]) -> Option<String> {
    labels.iter().find_map(|label| extract(text, label))
}

/// Primary tier: the value runs until the next structural boundary.
fn extract_bounded(text: &str, label: &str) -> Option<String> {
    let re = label_regex(label, r"\s*")?;
    let start = re.find(text)?.end();
    let rest = &text[start..];
    let (end, _) = find_boundary(rest);
    let value = MULTI_SPACE_RE.replace_all(rest[..end].trim(), " ");
    non_empty(&value)
}

/// Fallback tier: the value runs to the end of the label's own line.
fn extract_line(text: &str, label: &str) -> Option<String> {
    let re = label_regex(label, r"[ \t]*")?;
    let start = re.find(text)?.end();
    let rest = &text[start..];
    let end = rest.find(['\n', '\r']).unwrap_or(rest.len());
    non_empty(&rest[..end])
}

fn label_regex(label: &str, gap: &str) -> Option<Regex> {
    Regex::new(&format!("(?i){}:{}", regex::escape(label), gap)).ok()
}

fn non_empty(value: &str) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}
