//! Quote extraction from Wikiquote pages.
//!
//! Two document shapes are supported. Wikitext (the raw page source) is preferred
//! because list markers survive intact; rendered HTML is the fallback when the
//! source is unavailable. Both produce the same [`QuoteLine`] candidates.

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use serde::Serialize;
use tracing::debug;

use crate::dom::{
    has_chrome_ancestor, heading_anchor, is_heading, is_heading_wrapper, select_content_root,
    visible_text,
};
use crate::heuristics::{is_boilerplate, is_episode_heading, split_speaker};
use crate::markup::{clean_text, strip_edit_marker, strip_wiki_markup};

/// Cleaned wikitext lines shorter than this are not quotes.
const WIKITEXT_MIN_LINE_CHARS: usize = 10;
/// Quote text left after a wikitext speaker split must be at least this long.
const WIKITEXT_MIN_TEXT_CHARS: usize = 8;
/// Minimum length of a split HTML list line.
const HTML_MIN_LINE_CHARS: usize = 8;
/// Cleaned HTML candidates shorter than this are dropped.
const HTML_MIN_CANDIDATE_CHARS: usize = 4;
/// Quote text left after an HTML speaker split must be at least this long.
const HTML_MIN_TEXT_CHARS: usize = 6;

static HEADING_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^===+\s*(.*?)\s*===+$").expect("wikitext heading pattern"));
static LIST_MARKER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[*#:;]+\s*").expect("list marker pattern"));
static LINE_SPLIT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s*\n+\s*| {2,}").expect("line split pattern"));

/// Candidate quote before dedup and id assignment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuoteLine {
    /// Quote body.
    pub text: String,
    /// Speaker, empty when unattributed.
    pub speaker: String,
    /// Heading the quote appeared under, empty when unknown.
    pub episode_title: String,
    /// Season of the page the quote was harvested from.
    pub season: Option<u32>,
}

/// How a single wikitext line participates in extraction.
#[derive(Debug, Clone, PartialEq, Eq)]
enum WikitextLine<'a> {
    Blank,
    /// A level-3-or-deeper heading; carries the cleaned heading text.
    Heading(String),
    /// Section headings, templates and links at column zero.
    Structural,
    /// A list or definition line with its markers removed.
    Candidate(&'a str),
    /// Plain prose outside list markup.
    Prose,
}

fn classify_wikitext_line(line: &str) -> WikitextLine<'_> {
    if line.is_empty() {
        return WikitextLine::Blank;
    }
    if let Some(caps) = HEADING_RE.captures(line) {
        let inner = caps.get(1).map(|m| m.as_str()).unwrap_or_default();
        return WikitextLine::Heading(strip_edit_marker(&strip_wiki_markup(inner)));
    }
    if line.starts_with("==") || line.starts_with("{{") || line.starts_with("[[") {
        return WikitextLine::Structural;
    }
    match LIST_MARKER_RE.find(line) {
        Some(marker) => WikitextLine::Candidate(&line[marker.end()..]),
        None => WikitextLine::Prose,
    }
}

/// Fold state for a wikitext scan.
struct WikitextScan {
    season: Option<u32>,
    heading: String,
    quotes: Vec<QuoteLine>,
}

impl WikitextScan {
    fn step(mut self, raw_line: &str) -> Self {
        match classify_wikitext_line(raw_line.trim()) {
            WikitextLine::Heading(heading) => self.heading = heading,
            WikitextLine::Candidate(body) => {
                if let Some(quote) = self.candidate(body) {
                    self.quotes.push(quote);
                }
            }
            WikitextLine::Blank | WikitextLine::Structural | WikitextLine::Prose => {}
        }
        self
    }

    fn candidate(&self, body: &str) -> Option<QuoteLine> {
        let cleaned = strip_wiki_markup(body);
        if cleaned.chars().count() < WIKITEXT_MIN_LINE_CHARS || is_boilerplate(&cleaned) {
            return None;
        }
        let split = split_speaker(&cleaned);
        if split.text.chars().count() < WIKITEXT_MIN_TEXT_CHARS {
            return None;
        }
        Some(QuoteLine {
            text: split.text,
            speaker: split.speaker,
            episode_title: self.heading.clone(),
            season: self.season,
        })
    }
}

/// Extracts quotes from raw wikitext, attributing each to the most recent
/// level-3-or-deeper heading.
pub fn parse_wikitext_quotes(wikitext: &str, season: Option<u32>) -> Vec<QuoteLine> {
    let scan = WikitextScan {
        season,
        heading: String::new(),
        quotes: Vec::new(),
    };
    wikitext.lines().fold(scan, WikitextScan::step).quotes
}

/// Extracts quotes from a rendered Wikiquote page.
///
/// List items and definition descriptions are grouped under episode-looking
/// headings. Without such headings the whole content root is one unattributed
/// block.
pub fn parse_html_quotes(html: &str, season: Option<u32>, debug: bool) -> Vec<QuoteLine> {
    let document = Html::parse_document(html);
    let root = select_content_root(&document);
    let heading_selector = Selector::parse("h2, h3, h4").expect("heading selector");
    let item_selector = Selector::parse("li, dd").expect("list item selector");
    let label = season.map_or_else(|| "base".to_string(), |s| s.to_string());

    let headings: Vec<(ElementRef<'_>, String)> = root
        .select(&heading_selector)
        .filter(|heading| !has_chrome_ancestor(heading))
        .map(|heading| (heading, strip_edit_marker(&clean_text(&visible_text(heading)))))
        .collect();
    let episode_headings: Vec<_> = headings
        .into_iter()
        .filter(|(_, title)| is_episode_heading(title))
        .collect();
    if debug {
        debug!(season = %label, episode_headings = episode_headings.len(), "quote page headings");
    }

    let mut candidates: Vec<(String, String)> = Vec::new();
    if episode_headings.is_empty() {
        for item in root.select(&item_selector) {
            if has_chrome_ancestor(&item) {
                continue;
            }
            let raw = clean_text(&visible_text(item));
            if !raw.is_empty() && !is_boilerplate(&raw) {
                candidates.push((raw, String::new()));
            }
        }
    } else {
        for (heading, title) in &episode_headings {
            for item in section_items(*heading, &item_selector) {
                let raw = visible_text(item);
                if is_boilerplate(&clean_text(&raw)) {
                    continue;
                }
                for line in LINE_SPLIT_RE.split(&raw).map(clean_text) {
                    if line.chars().count() < HTML_MIN_LINE_CHARS || is_boilerplate(&line) {
                        continue;
                    }
                    candidates.push((line, title.clone()));
                }
            }
        }
    }

    let mut seen = HashSet::new();
    let quotes: Vec<QuoteLine> = candidates
        .into_iter()
        .filter_map(|(raw, episode_title)| {
            let cleaned = clean_text(&raw);
            if cleaned.chars().count() < HTML_MIN_CANDIDATE_CHARS || !seen.insert(cleaned.clone()) {
                return None;
            }
            let split = split_speaker(&cleaned);
            (split.text.chars().count() >= HTML_MIN_TEXT_CHARS).then(|| QuoteLine {
                text: split.text,
                speaker: split.speaker,
                episode_title,
                season,
            })
        })
        .collect();

    if debug {
        debug!(season = %label, quotes = quotes.len(), "quote page extracted");
        if quotes.is_empty() {
            let samples: Vec<String> = root
                .select(&Selector::parse("li").expect("li selector"))
                .take(8)
                .map(|li| clean_text(&visible_text(li)))
                .filter(|text| !text.is_empty())
                .collect();
            debug!(?samples, "sample list items");
        }
    }
    quotes
}

/// List items and definitions between a heading and the next heading.
fn section_items<'a>(heading: ElementRef<'a>, item_selector: &Selector) -> Vec<ElementRef<'a>> {
    let mut items = Vec::new();
    for sibling in heading_anchor(heading)
        .next_siblings()
        .filter_map(ElementRef::wrap)
    {
        if is_heading(&sibling) || is_heading_wrapper(&sibling) {
            break;
        }
        if has_chrome_ancestor(&sibling) {
            continue;
        }
        if matches!(sibling.value().name(), "li" | "dd") {
            items.push(sibling);
        }
        items.extend(
            sibling
                .select(item_selector)
                .filter(|item| !has_chrome_ancestor(item)),
        );
    }
    items
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn classifies_wikitext_lines() {
        assert_eq!(
            classify_wikitext_line("=== The Pen [3.03] ==="),
            WikitextLine::Heading("The Pen [3.03]".into())
        );
        assert_eq!(classify_wikitext_line("== Season 3 =="), WikitextLine::Structural);
        assert_eq!(classify_wikitext_line("{{Wikipedia}}"), WikitextLine::Structural);
        assert_eq!(classify_wikitext_line(":Jerry: Hi"), WikitextLine::Candidate("Jerry: Hi"));
        assert_eq!(classify_wikitext_line("Some prose."), WikitextLine::Prose);
    }

    #[test]
    fn wikitext_quotes_follow_headings() {
        let wikitext = "\
== Episodes ==
=== [[The Contest]] ===
:'''Jerry''': Out?
:'''George''': I'm out!!! And I am walking to the store right now.
* Michael Richards – Cosmo Kramer
=== The Pez Dispenser ===
* Jerry — That's a shame. Too bad about that.
";
        let quotes = parse_wikitext_quotes(wikitext, Some(4));
        assert_eq!(
            quotes,
            vec![
                QuoteLine {
                    text: "I'm out!!! And I am walking to the store right now.".into(),
                    speaker: "George".into(),
                    episode_title: "The Contest".into(),
                    season: Some(4),
                },
                QuoteLine {
                    text: "That's a shame. Too bad about that.".into(),
                    speaker: "Jerry".into(),
                    episode_title: "The Pez Dispenser".into(),
                    season: Some(4),
                },
            ]
        );
    }

    #[test]
    fn html_without_episode_headings_is_unattributed() {
        let html = r#"
        <div id="mw-content-text">
          <h2>Quotes</h2>
          <ul>
            <li>Newman: Hello, Jerry.</li>
            <li>Newman: Hello, Jerry.</li>
            <li>Jason Alexander – George Costanza</li>
          </ul>
          <div class="navbox"><ul><li>Seinfeld seasons 1 2 3 main</li></ul></div>
        </div>
        "#;
        let quotes = parse_html_quotes(html, None, false);
        assert_eq!(
            quotes,
            vec![QuoteLine {
                text: "Hello, Jerry.".into(),
                speaker: "Newman".into(),
                episode_title: String::new(),
                season: None,
            }]
        );
    }
}
