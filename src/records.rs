//! Persisted record shapes and the controlled topic vocabulary.

use std::fmt;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use wiki_parser::{EpisodeRow, QuoteLine};

/// Provenance tag stamped on every harvested quote.
pub const WIKIQUOTE_SOURCE: &str = "Wikiquote";

/// Stored when neither the table nor the article intro yields a summary.
pub const SUMMARY_PLACEHOLDER: &str = "Summary not available.";

/// The two dataset kinds the pipeline publishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, ValueEnum)]
pub enum RecordKind {
    /// Episode listings.
    Episodes,
    /// Quotes.
    Quotes,
}

impl RecordKind {
    /// Keys every record of this kind must carry.
    pub fn required_keys(self) -> &'static [&'static str] {
        match self {
            Self::Episodes => &[
                "id", "title", "season", "episode", "summary", "subtitle", "topics",
            ],
            Self::Quotes => &[
                "id",
                "text",
                "speaker",
                "listener",
                "situation",
                "episodeTitle",
                "season",
                "episode",
                "source",
            ],
        }
    }

    /// The field that must be a non-empty string.
    pub fn text_field(self) -> &'static str {
        match self {
            Self::Episodes => "title",
            Self::Quotes => "text",
        }
    }

    /// File stem of the published dataset.
    pub fn file_stem(self) -> &'static str {
        match self {
            Self::Episodes => "episodes",
            Self::Quotes => "quotes",
        }
    }

    /// Global the embedding script binds the dataset to.
    pub fn global_name(self) -> &'static str {
        match self {
            Self::Episodes => "__EPISODES__",
            Self::Quotes => "__QUOTES__",
        }
    }
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.file_stem())
    }
}

/// One episode of the series.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EpisodeRecord {
    /// Dense 1-based id assigned after dedup (`ep-N`).
    pub id: String,
    /// Episode title.
    pub title: String,
    /// Season number, `None` when the source table carried none.
    pub season: Option<u32>,
    /// Episode number within the season (or overall when that is all there is).
    pub episode: Option<u32>,
    /// Plot summary, possibly [`SUMMARY_PLACEHOLDER`].
    pub summary: String,
    /// One-sentence description produced by enrichment.
    pub subtitle: String,
    /// Labels from the topic vocabulary.
    pub topics: Vec<String>,
}

impl From<EpisodeRow> for EpisodeRecord {
    fn from(row: EpisodeRow) -> Self {
        Self {
            id: String::new(),
            title: row.title,
            season: row.season,
            episode: row.episode,
            summary: row.summary,
            subtitle: String::new(),
            topics: Vec::new(),
        }
    }
}

/// One quote.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuoteRecord {
    /// Dense 1-based id assigned after dedup (`wq-N`).
    pub id: String,
    /// Quote body.
    pub text: String,
    /// Speaker, empty when unknown.
    pub speaker: String,
    /// Who the quote was addressed to, empty when unknown.
    pub listener: String,
    /// Short scene description, empty when unknown.
    pub situation: String,
    /// Episode the quote belongs to, empty when unattributed.
    pub episode_title: String,
    /// Season number.
    pub season: Option<u32>,
    /// Episode number.
    pub episode: Option<u32>,
    /// Provenance tag.
    pub source: String,
}

impl QuoteRecord {
    /// Builds an unenriched record from a parsed quote line.
    pub fn from_line(line: QuoteLine, source: &str) -> Self {
        Self {
            id: String::new(),
            text: line.text,
            speaker: line.speaker,
            listener: String::new(),
            situation: String::new(),
            episode_title: line.episode_title,
            season: line.season,
            episode: None,
            source: source.to_string(),
        }
    }
}

/// Ordered, closed set of topic labels the classifier may choose from.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TopicVocabulary(Vec<String>);

impl TopicVocabulary {
    /// Wraps labels, dropping blanks and repeats while keeping order.
    pub fn new<I, S>(labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut out: Vec<String> = Vec::new();
        for label in labels {
            let label = label.into().trim().to_string();
            if !label.is_empty() && !out.contains(&label) {
                out.push(label);
            }
        }
        Self(out)
    }

    /// Reads a JSON array of labels.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed to read topic vocabulary {:?}", path))?;
        let labels: Vec<String> = serde_json::from_str(&raw)
            .with_context(|| format!("topic vocabulary {:?} is not a JSON array of strings", path))?;
        Ok(Self::new(labels))
    }

    /// Labels in vocabulary order.
    pub fn labels(&self) -> &[String] {
        &self.0
    }

    /// Whether the vocabulary holds no labels.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Keeps only labels from the vocabulary, first occurrence wins.
    pub fn retain_known<I>(&self, labels: I) -> Vec<String>
    where
        I: IntoIterator<Item = String>,
    {
        let mut kept: Vec<String> = Vec::new();
        for label in labels {
            let label = label.trim().to_string();
            if self.0.contains(&label) && !kept.contains(&label) {
                kept.push(label);
            }
        }
        kept
    }
}
