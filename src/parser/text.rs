use std::borrow::Cow;
use std::sync::LazyLock;

use regex::Regex;

static COMMENT_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?s)<!--.*?-->").unwrap());
static SCRIPT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<script\b[^>]*>.*?</script\s*>").unwrap());
static STYLE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<style\b[^>]*>.*?</style\s*>").unwrap());
static TAG_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]*>").unwrap());
static LINE_END_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\r\n?").unwrap());
static HSPACE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[ \t]{2,}").unwrap());

/// Turn report markup into plain text.
///
/// Each non-blank text fragment between tags lands on its own line, so a table cell
/// holding `Case Number:` and the next cell holding the value come out as
/// two lines. Runs of horizontal whitespace collapse to exactly two spaces:
/// the label extractor reads a double space as "a new field may start here".
pub fn clean_text(markup: &str) -> String {
    let text = COMMENT_RE.replace_all(markup, "");
    let text = SCRIPT_RE.replace_all(&text, "");
    let text = STYLE_RE.replace_all(&text, "");

    let joined = TAG_RE
        .split(&text)
        .map(decode_entities)
        .filter_map(|fragment| {
            let trimmed = fragment.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_string())
        })
        .collect::<Vec<_>>()
        .join("\n");

    let joined = joined.replace('\u{a0}', " ");
    let joined = LINE_END_RE.replace_all(&joined, "\n");
    let joined = HSPACE_RE.replace_all(&joined, "  ");
    joined.trim().to_string()
}

/// Decode character references in a text fragment. Fragments with an
/// entity we do not know are kept as written.
pub fn decode_entities(fragment: &str) -> Cow<'_, str> {
    if !fragment.contains('&') {
        return Cow::Borrowed(fragment);
    }
    quick_xml::escape::unescape_with(fragment, |entity| match entity {
        "amp" => Some("&"),
        "lt" => Some("<"),
        "gt" => Some(">"),
        "quot" => Some("\""),
        "apos" => Some("'"),
        "nbsp" => Some("\u{a0}"),
        _ => None,
    })
    .unwrap_or(Cow::Borrowed(fragment))
}
