//! Plain-text normalization shared by every parser.
//!
//! These helpers never fail: malformed markup degrades to whatever text is left
//! after the known constructs are removed.

use std::sync::LazyLock;

use html_escape::decode_html_entities;
use regex::Regex;

static CITATION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[\w+\]").expect("citation pattern"));
static NUMERIC_CITATION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[\d+\]").expect("numeric citation pattern"));
static SEASON_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)season\s+(\d+)").expect("season pattern"));
static EDIT_MARKER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\[\s*edit\s*\]").expect("edit marker pattern"));

static REF_BLOCK_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<ref[^>/]*>.*?</ref>").expect("ref block pattern"));
static REF_SELF_CLOSING_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)<ref[^>]*/>").expect("self-closing ref pattern"));
static WIKI_LINK_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[\[(?:[^|\]]+\|)?([^\]]+)\]\]").expect("wiki link pattern"));
static TEMPLATE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{\{[^}]+\}\}").expect("template pattern"));
static BOLD_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"'''+").expect("bold pattern"));
static ITALIC_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"''").expect("italic pattern"));
static TAG_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]+>").expect("tag pattern"));
static EXTERNAL_LINK_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[https?:[^\]]+\]").expect("external link pattern"));

/// Collapses every whitespace run into a single space and trims the ends.
pub fn normalize_whitespace(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut last_was_space = false;
    for ch in input.chars() {
        if ch.is_whitespace() {
            if !last_was_space {
                out.push(' ');
                last_was_space = true;
            }
        } else {
            out.push(ch);
            last_was_space = false;
        }
    }
    out.trim().to_string()
}

/// Removes bracketed citation markers such as `[1]`, `[a]` or `[nb]`.
pub fn strip_citations(text: &str) -> String {
    CITATION_RE.replace_all(text, "").into_owned()
}

/// Cleans a rendered text fragment: numeric citations removed, whitespace collapsed.
pub fn clean_text(text: &str) -> String {
    normalize_whitespace(&NUMERIC_CITATION_RE.replace_all(text, ""))
}

/// Cleans an episode title cell: citations stripped, surrounding quote marks trimmed.
pub fn clean_title(raw: &str) -> String {
    let stripped = strip_citations(raw);
    let collapsed = normalize_whitespace(&stripped);
    collapsed
        .trim_matches(|c: char| matches!(c, '"' | '\u{201c}' | '\u{201d}'))
        .trim()
        .to_string()
}

/// Lower-cases a header cell and drops everything that is not a word character,
/// so `No. in season` becomes `noinseason`.
pub fn normalize_header(text: &str) -> String {
    text.to_lowercase()
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '_')
        .collect()
}

/// Removes `[edit]` links left behind in rendered headings.
pub fn strip_edit_marker(text: &str) -> String {
    EDIT_MARKER_RE.replace_all(text, "").trim().to_string()
}

/// Extracts `N` from the first `season N` occurrence.
pub fn parse_season(text: &str) -> Option<u32> {
    SEASON_RE
        .captures(text)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

/// Parses the leading run of digits, ignoring anything after it. Zero is not a
/// valid episode number and yields `None`.
pub fn leading_number(text: &str) -> Option<u32> {
    let trimmed = text.trim();
    let end = trimmed
        .char_indices()
        .find(|(_, c)| !c.is_ascii_digit())
        .map(|(idx, _)| idx)
        .unwrap_or(trimmed.len());
    trimmed[..end].parse().ok().filter(|n| *n > 0)
}

/// Converts a wikitext line into plain text.
///
/// Handles internal links (keeping the label), templates, bold/italic quotes,
/// `<ref>` citations, HTML tags, bracketed external links and numeric citation
/// markers. HTML entities are decoded last.
pub fn strip_wiki_markup(line: &str) -> String {
    let text = REF_BLOCK_RE.replace_all(line, "");
    let text = REF_SELF_CLOSING_RE.replace_all(&text, "");
    let text = WIKI_LINK_RE.replace_all(&text, "$1");
    let text = TEMPLATE_RE.replace_all(&text, "");
    let text = BOLD_RE.replace_all(&text, "");
    let text = ITALIC_RE.replace_all(&text, "");
    let text = TAG_RE.replace_all(&text, "");
    let text = EXTERNAL_LINK_RE.replace_all(&text, "");
    let text = NUMERIC_CITATION_RE.replace_all(&text, "");
    normalize_whitespace(&decode_html_entities(&text))
}
