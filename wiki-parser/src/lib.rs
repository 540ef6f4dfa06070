//! Extract episode listings and quotes from wiki HTML and wikitext.
//!
//! Every parser here is pure: it takes document text and returns candidate
//! records, leaving fetching, dedup and enrichment to the caller. Parsers are
//! tolerant by construction and fall back through ordered strategies rather than
//! failing on unexpected markup.
//!
//! # Example
//!
//! ```
//! use wiki_parser::{parse_episode_tables, ParseOptions};
//!
//! let html = r#"<table class="wikitable"><caption>Season 1</caption>
//!   <tr><th>No. overall</th><th>Title</th></tr>
//!   <tr><th>1</th><td>"The Seinfeld Chronicles"</td></tr></table>"#;
//! let rows = parse_episode_tables(html, &ParseOptions::default());
//! assert_eq!(rows[0].title, "The Seinfeld Chronicles");
//! assert_eq!(rows[0].season, Some(1));
//! ```

mod dom;
pub mod episodes;
pub mod heuristics;
pub mod markup;
pub mod quotes;

pub use episodes::{
    is_episode_header_row, parse_episode_tables, EpisodeRow, ParseOptions, TABLE_SELECTOR_TIERS,
};
pub use heuristics::{
    is_episode_heading, looks_like_cast_line, looks_like_navigation, split_speaker, SpeakerLine,
};
pub use markup::{clean_text, normalize_whitespace, parse_season, strip_wiki_markup};
pub use quotes::{parse_html_quotes, parse_wikitext_quotes, QuoteLine};
