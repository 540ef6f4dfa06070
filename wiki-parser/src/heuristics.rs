//! Line classification heuristics for quote pages.

use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

/// Lines longer than this are never treated as cast listings.
const CAST_LINE_MAX_CHARS: usize = 220;

/// A prefix at least this long is prose, not a speaker name.
const SPEAKER_MAX_CHARS: usize = 40;

/// Canonical speaker separator after dash normalization.
const SPEAKER_SEPARATOR: &str = " \u{2014} ";

/// Fixed phrases from external-link sections at the bottom of quote pages.
const EXTERNAL_LINK_BOILERPLATE: &[&str] = &[
    "quotes at the internet movie database",
    "seinfeldscripts.com",
];

static CAST_LINE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-zÀ-ÿ .,'’\-()]+–[A-Za-zÀ-ÿ .,'’\-()]+$").expect("cast line pattern")
});
static NUMERIC_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\d+$").expect("numeric"));
static ORDINAL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(?:season|episode)\s+\d+").expect("ordinal pattern"));
static NUMBERED_HEADING_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[\d+\.\d+\]").expect("numbered heading pattern"));
static TITLED_HEADING_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)the .*?\(.*?\)").expect("titled heading pattern"));
static DASH_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+[\x{2013}\x{2014}\x{2015}]\s+").expect("dash pattern"));

/// True for lines that list an actor and their role (`Actor – Character`), bare
/// numbers, and empty lines.
pub fn looks_like_cast_line(text: &str) -> bool {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return true;
    }
    if trimmed.chars().count() > CAST_LINE_MAX_CHARS {
        return false;
    }
    NUMERIC_RE.is_match(trimmed) || CAST_LINE_RE.is_match(trimmed)
}

/// True for page navigation and external-link boilerplate.
pub fn looks_like_navigation(text: &str) -> bool {
    let lowered = text.trim().to_lowercase();
    if lowered.is_empty() {
        return true;
    }
    if lowered.contains("seasons") && lowered.contains("main") {
        return true;
    }
    if EXTERNAL_LINK_BOILERPLATE
        .iter()
        .any(|phrase| lowered.contains(phrase))
    {
        return true;
    }
    ORDINAL_RE.is_match(&lowered) || lowered.starts_with("external links")
}

/// Either check rejects the line.
pub fn is_boilerplate(text: &str) -> bool {
    looks_like_cast_line(text) || looks_like_navigation(text)
}

/// Episode headings carry a `[season.episode]` marker or read like
/// `The Something (…)`.
pub fn is_episode_heading(text: &str) -> bool {
    NUMBERED_HEADING_RE.is_match(text) || TITLED_HEADING_RE.is_match(text)
}

/// A quote line split into its speaker and spoken text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SpeakerLine {
    /// Attributed speaker, empty when unknown.
    pub speaker: String,
    /// Quote body.
    pub text: String,
}

/// Splits `Speaker — text` or `Speaker: text` into its parts.
///
/// Dash-like separators are normalized first. A prefix of 40 characters or more
/// is not a speaker, so the whole line becomes text.
pub fn split_speaker(raw: &str) -> SpeakerLine {
    let normalized = DASH_RE.replace_all(raw, SPEAKER_SEPARATOR);
    if let Some((speaker, rest)) = normalized.split_once(SPEAKER_SEPARATOR) {
        if speaker.chars().count() < SPEAKER_MAX_CHARS {
            return SpeakerLine {
                speaker: speaker.trim().to_string(),
                text: rest.trim().to_string(),
            };
        }
    }
    if let Some((speaker, rest)) = raw.split_once(':') {
        if speaker.chars().count() < SPEAKER_MAX_CHARS {
            return SpeakerLine {
                speaker: speaker.trim().to_string(),
                text: rest.trim().to_string(),
            };
        }
    }
    SpeakerLine {
        speaker: String::new(),
        text: raw.trim().to_string(),
    }
}
