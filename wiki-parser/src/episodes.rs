//! Episode table extraction from rendered episode-list pages.
//!
//! Tables are located through an ordered list of selector tiers. Within a table,
//! rows are folded through a [`TableScan`] that tracks the most recent header
//! block, since long tables repeat their headers per sub-season.

use scraper::{ElementRef, Html, Selector};
use serde::Serialize;
use tracing::debug;

use crate::dom::{sibling_heading, visible_text};
use crate::markup::{
    clean_title, leading_number, normalize_header, normalize_whitespace, parse_season,
    strip_citations, strip_edit_marker,
};

/// Selector tiers tried in order; the first tier yielding any episode wins.
pub const TABLE_SELECTOR_TIERS: [&str; 2] = ["table.wikiepisodetable", "table.wikitable"];

const OVERALL_MARKER: &str = "nooverall";
const IN_SEASON_MARKER: &str = "noinseason";

/// Candidate episode row. Subtitle and topics are filled in by enrichment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EpisodeRow {
    /// Cleaned episode title.
    pub title: String,
    /// Season inferred from the table or the section being parsed.
    pub season: Option<u32>,
    /// In-season number, falling back to the overall number.
    pub episode: Option<u32>,
    /// Summary text when the table carries one, otherwise empty.
    pub summary: String,
}

/// Knobs for a single parse call.
#[derive(Debug, Clone, Copy, Default)]
pub struct ParseOptions {
    /// Emit selector and header diagnostics at debug level.
    pub debug: bool,
    /// Season applied to every table, used when parsing one season section at a time.
    pub season_override: Option<u32>,
}

impl ParseOptions {
    /// Options for a section whose heading already names the season.
    pub fn for_season(season: Option<u32>, debug: bool) -> Self {
        Self {
            debug,
            season_override: season,
        }
    }
}

/// Parses every episode table in `html`, trying [`TABLE_SELECTOR_TIERS`] in order.
pub fn parse_episode_tables(html: &str, options: &ParseOptions) -> Vec<EpisodeRow> {
    let document = Html::parse_document(html);
    let selectors = RowSelectors::new();
    TABLE_SELECTOR_TIERS
        .iter()
        .map(|tier| parse_tier(&document, tier, &selectors, options))
        .find(|rows| !rows.is_empty())
        .unwrap_or_default()
}

/// A header row has more than one header cell, a title column, and an overall or
/// in-season number column. Inputs are already normalized with
/// [`normalize_header`].
pub fn is_episode_header_row(headers: &[String]) -> bool {
    headers.len() > 1
        && headers.iter().any(|text| text.contains("title"))
        && headers
            .iter()
            .any(|text| text.contains(OVERALL_MARKER) || text.contains(IN_SEASON_MARKER))
}

fn parse_tier(
    document: &Html,
    tier: &str,
    selectors: &RowSelectors,
    options: &ParseOptions,
) -> Vec<EpisodeRow> {
    let table_selector = Selector::parse(tier).expect("valid table selector");
    let tables: Vec<ElementRef<'_>> = document.select(&table_selector).collect();
    if options.debug {
        debug!(selector = tier, tables = tables.len(), "episode table tier");
    }

    let mut episodes = Vec::new();
    for table in tables {
        let detected = table_season(table, selectors);
        if options.debug && detected.is_none() {
            let heading = preceding_heading_text(table).unwrap_or_default();
            debug!(%heading, "episode table has no season");
        }
        let season = options.season_override.or(detected);
        let scan = table
            .select(&selectors.row)
            .fold(TableScan::new(season, options.debug), |scan, row| {
                scan.step(row, selectors)
            });
        episodes.extend(scan.rows);
    }
    episodes
}

struct RowSelectors {
    row: Selector,
    header_cell: Selector,
    cell: Selector,
    link: Selector,
    caption: Selector,
    colspan_header: Selector,
}

impl RowSelectors {
    fn new() -> Self {
        Self {
            row: Selector::parse("tr").expect("row selector"),
            header_cell: Selector::parse("th").expect("header cell selector"),
            cell: Selector::parse("td, th").expect("cell selector"),
            link: Selector::parse("a").expect("link selector"),
            caption: Selector::parse("caption").expect("caption selector"),
            colspan_header: Selector::parse("th[colspan]").expect("colspan selector"),
        }
    }
}

/// Caption first, then a spanning header cell, then the nearest preceding heading.
fn table_season(table: ElementRef<'_>, selectors: &RowSelectors) -> Option<u32> {
    let first_text = |selector: &Selector| {
        table
            .select(selector)
            .next()
            .map(|node| node.text().collect::<String>())
    };
    first_text(&selectors.caption)
        .and_then(|text| parse_season(text.trim()))
        .or_else(|| first_text(&selectors.colspan_header).and_then(|text| parse_season(text.trim())))
        .or_else(|| preceding_heading_text(table).and_then(|text| parse_season(&text)))
}

fn preceding_heading_text(table: ElementRef<'_>) -> Option<String> {
    table
        .prev_siblings()
        .filter_map(ElementRef::wrap)
        .find_map(sibling_heading)
        .map(|heading| strip_edit_marker(&visible_text(heading)))
}

/// Column positions resolved from the active header row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ColumnMap {
    title: usize,
    summary: Option<usize>,
    overall: Option<usize>,
    in_season: Option<usize>,
}

impl ColumnMap {
    fn from_headers(headers: &[String]) -> Option<Self> {
        let position = |marker: &str| headers.iter().position(|text| text.contains(marker));
        let title = position("title")?;
        let overall = position(OVERALL_MARKER);
        let in_season = position(IN_SEASON_MARKER);
        if overall.is_none() && in_season.is_none() {
            return None;
        }
        Some(Self {
            title,
            summary: position("summary"),
            overall,
            in_season,
        })
    }
}

/// Fold state threaded through the rows of one table.
struct TableScan {
    season: Option<u32>,
    columns: Option<ColumnMap>,
    rows: Vec<EpisodeRow>,
    debug: bool,
}

impl TableScan {
    fn new(season: Option<u32>, debug: bool) -> Self {
        Self {
            season,
            columns: None,
            rows: Vec::new(),
            debug,
        }
    }

    fn step(mut self, row: ElementRef<'_>, selectors: &RowSelectors) -> Self {
        let headers: Vec<String> = row
            .select(&selectors.header_cell)
            .map(|th| normalize_header(strip_citations(&th.text().collect::<String>()).trim()))
            .collect();
        if is_episode_header_row(&headers) {
            if self.debug {
                debug!(?headers, "episode header row");
            }
            self.columns = ColumnMap::from_headers(&headers);
            return self;
        }

        let cells: Vec<ElementRef<'_>> = row.select(&selectors.cell).collect();
        if cells.is_empty() {
            return self;
        }
        if let Some(summary) = description_row(&cells) {
            if let Some(last) = self.rows.last_mut().filter(|last| last.summary.is_empty()) {
                last.summary = summary;
            }
            return self;
        }

        let Some(columns) = self.columns else {
            return self;
        };
        let Some(title_cell) = cells.get(columns.title) else {
            return self;
        };
        let title = title_cell
            .select(&selectors.link)
            .next()
            .and_then(|link| link.value().attr("title"))
            .map(str::to_string)
            .unwrap_or_else(|| title_cell.text().collect());
        let title = clean_title(&title);
        if title.is_empty() {
            return self;
        }

        let cell_text = |index: Option<usize>| {
            index
                .and_then(|idx| cells.get(idx))
                .map(|cell| cell.text().collect::<String>())
        };
        let summary = cell_text(columns.summary)
            .map(|text| normalize_whitespace(&strip_citations(&text)))
            .unwrap_or_default();
        let episode = cell_text(columns.in_season)
            .and_then(|text| leading_number(&text))
            .or_else(|| cell_text(columns.overall).and_then(|text| leading_number(&text)));

        self.rows.push(EpisodeRow {
            title,
            season: self.season,
            episode,
            summary,
        });
        self
    }
}

/// The collapsed synopsis row that follows each episode row: a lone
/// `td.description` cell.
fn description_row(cells: &[ElementRef<'_>]) -> Option<String> {
    let [cell] = cells else {
        return None;
    };
    if !cell.value().classes().any(|class| class == "description") {
        return None;
    }
    let text = normalize_whitespace(&strip_citations(&cell.text().collect::<String>()));
    (!text.is_empty()).then_some(text)
}
