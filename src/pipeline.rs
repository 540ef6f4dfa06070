//! Harvest runs: fetch, parse, dedup and enrich one dataset.
//!
//! Both datasets are produced by an ordered chain of strategies. Each strategy
//! is tried in turn and the first one yielding records wins; when every
//! strategy comes back empty the run fails instead of producing an empty
//! dataset.

use thiserror::Error;
use tracing::{debug, info, warn};
use wiki_parser::{
    parse_episode_tables, parse_html_quotes, parse_season, parse_wikitext_quotes,
    strip_wiki_markup, EpisodeRow, ParseOptions, QuoteLine,
};

use crate::controls::{FetchControls, SeriesConfig};
use crate::dedup::dedup_and_index;
use crate::enrich::{ChatBackend, EnrichContext, Enricher};
use crate::fetch::{FetchError, Source, SourceFetcher, Transport};
use crate::records::{
    EpisodeRecord, QuoteRecord, RecordKind, TopicVocabulary, SUMMARY_PLACEHOLDER,
    WIKIQUOTE_SOURCE,
};
use crate::wiki_api::MediaWikiApi;

/// Fatal conditions for a run.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// A required document could not be read from any location.
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error("invalid source URL: {0}")]
    Url(#[from] url::ParseError),
    /// Every strategy produced zero records.
    #[error("parsed 0 {0} after every strategy; aborting to avoid overwriting data")]
    NoRecords(RecordKind),
}

/// Ways of finding episode rows, in the order they are tried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EpisodeStrategy {
    /// Every episode table of the full list page.
    DocumentTables,
    /// One season section of the list page at a time.
    SeasonSections,
}

impl EpisodeStrategy {
    const CHAIN: [Self; 2] = [Self::DocumentTables, Self::SeasonSections];
}

/// Ways of finding quotes, in the order they are tried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum QuoteStrategy {
    /// One page per season, wikitext first then rendered HTML.
    SeasonPages,
    /// The series' main quote page, unattributed to a season.
    BasePage,
}

impl QuoteStrategy {
    const CHAIN: [Self; 2] = [Self::SeasonPages, Self::BasePage];
}

/// Drives one harvest over a transport and a classifier backend.
pub struct Harvester<T, B> {
    fetcher: SourceFetcher<T>,
    enricher: Enricher<B>,
    series: SeriesConfig,
    controls: FetchControls,
    wikipedia: MediaWikiApi,
    wikiquote: MediaWikiApi,
    debug: bool,
}

impl<T: Transport, B: ChatBackend> Harvester<T, B> {
    pub fn new(
        fetcher: SourceFetcher<T>,
        enricher: Enricher<B>,
        series: SeriesConfig,
        controls: FetchControls,
        debug: bool,
    ) -> Result<Self, PipelineError> {
        let wikipedia = MediaWikiApi::new(&SeriesConfig::api_endpoint(&series.wikipedia))?;
        let wikiquote = MediaWikiApi::new(&SeriesConfig::api_endpoint(&series.wikiquote))?;
        Ok(Self {
            fetcher,
            enricher,
            series,
            controls,
            wikipedia,
            wikiquote,
            debug,
        })
    }

    /// Produces the episode dataset, enriched against `topics`.
    pub async fn harvest_episodes(
        &self,
        topics: &TopicVocabulary,
    ) -> Result<Vec<EpisodeRecord>, PipelineError> {
        let mut rows = Vec::new();
        for strategy in EpisodeStrategy::CHAIN {
            rows = self.run_episode_strategy(strategy).await?;
            if !rows.is_empty() {
                info!(?strategy, rows = rows.len(), "episode rows parsed");
                break;
            }
            warn!(?strategy, "episode strategy produced no rows");
        }

        let mut episodes = dedup_and_index(rows.into_iter().map(EpisodeRecord::from).collect());
        if episodes.is_empty() {
            return Err(PipelineError::NoRecords(RecordKind::Episodes));
        }

        self.backfill_summaries(&mut episodes).await;
        if !self.enricher.is_enabled() {
            warn!("no OpenAI credential; episodes are saved without subtitles or topics");
        }
        let ctx = EnrichContext {
            series: &self.series.name,
            topics,
        };
        let (mut episodes, report) = self.enricher.enrich_all(episodes, &ctx).await;
        info!(?report, "episode enrichment finished");

        for episode in episodes.iter_mut().filter(|e| e.summary.trim().is_empty()) {
            episode.summary = SUMMARY_PLACEHOLDER.to_string();
        }
        Ok(episodes)
    }

    /// Produces the quote dataset.
    pub async fn harvest_quotes(&self) -> Result<Vec<QuoteRecord>, PipelineError> {
        let mut lines = Vec::new();
        for strategy in QuoteStrategy::CHAIN {
            lines = self.run_quote_strategy(strategy).await?;
            if !lines.is_empty() {
                info!(?strategy, quotes = lines.len(), "quote candidates parsed");
                break;
            }
            warn!(?strategy, "quote strategy produced no candidates");
        }

        let quotes = dedup_and_index(
            lines
                .into_iter()
                .map(|line| QuoteRecord::from_line(line, WIKIQUOTE_SOURCE))
                .collect(),
        );
        if quotes.is_empty() {
            return Err(PipelineError::NoRecords(RecordKind::Quotes));
        }

        if !self.enricher.is_enabled() {
            warn!("no OpenAI credential; quotes are saved without enrichment");
        }
        let topics = TopicVocabulary::default();
        let ctx = EnrichContext {
            series: &self.series.name,
            topics: &topics,
        };
        let (quotes, report) = self.enricher.enrich_all(quotes, &ctx).await;
        info!(?report, "quote enrichment finished");
        Ok(quotes)
    }

    async fn run_episode_strategy(
        &self,
        strategy: EpisodeStrategy,
    ) -> Result<Vec<EpisodeRow>, PipelineError> {
        match strategy {
            EpisodeStrategy::DocumentTables => {
                let document = self.fetcher.fetch_first(&self.episode_list_sources()?).await?;
                debug!(provenance = %document.provenance, "episode list fetched");
                Ok(parse_episode_tables(
                    &document.content,
                    &ParseOptions::for_season(None, self.debug),
                ))
            }
            EpisodeStrategy::SeasonSections => self.parse_season_sections().await,
        }
    }

    fn episode_list_sources(&self) -> Result<Vec<Source>, PipelineError> {
        let base = self.series.wikipedia.trim_end_matches('/');
        let page = &self.series.episode_list_page;
        Ok(vec![
            Source::page(&format!("{base}/w/index.php?title={page}&printable=yes"))?,
            Source::page(&format!("{base}/wiki/{page}?action=render"))?,
            Source::page(&format!("{base}/api/rest_v1/page/html/{page}"))?,
            Source::parse_html(&self.wikipedia, page, None),
        ])
    }

    async fn parse_season_sections(&self) -> Result<Vec<EpisodeRow>, PipelineError> {
        let page = &self.series.episode_list_page;
        let sections = self.fetcher.fetch_sections(&self.wikipedia, page).await?;
        let mut rows = Vec::new();
        for section in sections {
            let heading = strip_wiki_markup(&section.line);
            if !heading.to_lowercase().contains("season") {
                continue;
            }
            let season = parse_season(&heading);
            let source = Source::parse_html(&self.wikipedia, page, Some(section.index.as_str()));
            match self.fetcher.fetch_first(std::slice::from_ref(&source)).await {
                Ok(document) => {
                    let parsed = parse_episode_tables(
                        &document.content,
                        &ParseOptions::for_season(season, self.debug),
                    );
                    debug!(%heading, ?season, rows = parsed.len(), "season section parsed");
                    rows.extend(parsed);
                }
                Err(err) => warn!(%heading, error = %err, "skipping season section"),
            }
        }
        Ok(rows)
    }

    /// One intro-extract request per summary-less episode, paced by the
    /// enrichment call delay.
    async fn backfill_summaries(&self, episodes: &mut [EpisodeRecord]) {
        let delay = self.enricher.policy().call_delay();
        let missing = episodes
            .iter_mut()
            .filter(|episode| episode.summary.trim().is_empty());
        for (n, episode) in missing.enumerate() {
            if n > 0 {
                tokio::time::sleep(delay).await;
            }
            match self.fetcher.fetch_intro(&self.wikipedia, &episode.title).await {
                Ok(Some(extract)) => episode.summary = extract,
                Ok(None) => debug!(title = %episode.title, "no intro extract"),
                Err(err) => warn!(title = %episode.title, error = %err, "summary backfill failed"),
            }
        }
    }

    async fn run_quote_strategy(
        &self,
        strategy: QuoteStrategy,
    ) -> Result<Vec<QuoteLine>, PipelineError> {
        match strategy {
            QuoteStrategy::SeasonPages => {
                let mut lines = Vec::new();
                for season in 1..=self.series.seasons {
                    let page_lines = self.season_quotes(season).await?;
                    info!(season, quotes = page_lines.len(), "season page harvested");
                    lines.extend(page_lines);
                }
                Ok(lines)
            }
            QuoteStrategy::BasePage => {
                let page = &self.series.quote_page;
                let sources = [
                    Source::page(&SeriesConfig::page_url(&self.series.wikiquote, page))?,
                    Source::parse_html(&self.wikiquote, page, None),
                ];
                let document = self.fetcher.fetch_first(&sources).await?;
                Ok(parse_html_quotes(&document.content, None, self.debug))
            }
        }
    }

    /// Wikitext first; the rendered page only when wikitext yields nothing.
    async fn season_quotes(&self, season: u32) -> Result<Vec<QuoteLine>, PipelineError> {
        let page = self.series.season_quote_page(season);

        match self
            .fetcher
            .fetch_first(&[Source::parse_wikitext(&self.wikiquote, &page)])
            .await
        {
            Ok(document) => {
                let lines = parse_wikitext_quotes(&document.content, Some(season));
                if !lines.is_empty() {
                    tokio::time::sleep(self.controls.wikitext_page_delay()).await;
                    return Ok(lines);
                }
                debug!(season, "wikitext yielded no quotes, trying rendered page");
            }
            Err(err) => debug!(season, error = %err, "no wikitext, trying rendered page"),
        }

        let sources = [
            Source::page(&SeriesConfig::page_url(&self.series.wikiquote, &page))?,
            Source::parse_html(&self.wikiquote, &page, None),
        ];
        let lines = match self.fetcher.fetch_first(&sources).await {
            Ok(document) => parse_html_quotes(&document.content, Some(season), self.debug),
            Err(err) => {
                warn!(season, error = %err, "season page unavailable");
                Vec::new()
            }
        };
        tokio::time::sleep(self.controls.html_page_delay()).await;
        Ok(lines)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use serde_json::json;

    use super::*;
    use crate::controls::EnrichPolicy;
    use crate::enrich::testing::{instant_policy, ScriptedChat};
    use crate::fetch::testing::ScriptedTransport;
    use pretty_assertions::assert_eq;

    const EPISODE_LIST: &str =
        include_str!("../wiki-parser/tests/fixtures/html/episode-list.html");
    const QUOTES_SEASON: &str =
        include_str!("../wiki-parser/tests/fixtures/html/quotes-season.html");
    const SEASON_WIKITEXT: &str =
        include_str!("../wiki-parser/tests/fixtures/wikitext/season-4.wikitext");

    fn series(seasons: u32) -> SeriesConfig {
        SeriesConfig {
            seasons,
            ..SeriesConfig::default()
        }
    }

    fn controls() -> FetchControls {
        FetchControls::new(Duration::from_secs(1), Duration::ZERO, Duration::ZERO)
    }

    fn harvester<'c>(
        transport: ScriptedTransport,
        chat: Option<&'c ScriptedChat>,
        seasons: u32,
    ) -> Harvester<ScriptedTransport, &'c ScriptedChat> {
        let enricher = match chat {
            Some(chat) => Enricher::new(chat, instant_policy(None)),
            None => Enricher::disabled(instant_policy(None)),
        };
        Harvester::new(
            SourceFetcher::new(transport),
            enricher,
            series(seasons),
            controls(),
            false,
        )
        .unwrap()
    }

    fn parse_text(html: &str) -> String {
        json!({"parse": {"text": {"*": html}}}).to_string()
    }

    #[tokio::test(flavor = "current_thread")]
    async fn episodes_from_document_tables_are_backfilled_and_enriched() {
        let transport = ScriptedTransport::default()
            .route("printable=yes", EPISODE_LIST)
            .route(
                "prop=extracts",
                r#"{"query":{"pages":{"1":{"extract":"Jerry and George stake out a building."}}}}"#,
            );
        let chat = ScriptedChat::default()
            .reply(r#"{"subtitle": "The pilot.", "topics": ["Dating", "Aliens"]}"#);
        let topics = TopicVocabulary::new(["Dating", "Work"]);

        let episodes = harvester(transport, Some(&chat), 9)
            .harvest_episodes(&topics)
            .await
            .unwrap();

        let summary: Vec<_> = episodes
            .iter()
            .map(|e| (e.id.as_str(), e.season, e.episode))
            .collect();
        assert_eq!(
            summary,
            vec![("ep-1", Some(1), Some(1)), ("ep-2", Some(1), Some(2)), ("ep-3", Some(2), Some(1))]
        );
        assert_eq!(episodes[0].subtitle, "The pilot.");
        assert_eq!(episodes[0].topics, vec!["Dating".to_string()]);
        assert_eq!(episodes[1].summary, "Jerry and George stake out a building.");
        assert_eq!(episodes[1].subtitle, "");
        assert_eq!(episodes[2].summary, "George wants to break up with Marcy.");
    }

    #[tokio::test(flavor = "current_thread")]
    async fn empty_document_falls_back_to_season_sections() {
        let section_table = r#"<table class="wikitable">
            <tr><th>No. overall</th><th>Title</th></tr>
            <tr><th>1</th><td>"The Seinfeld Chronicles"</td></tr>
            </table>"#;
        let transport = ScriptedTransport::default()
            .route("printable=yes", "<html><body><p>No tables here.</p></body></html>")
            .route("section=2", &parse_text(section_table))
            .route(
                "prop=sections",
                r#"{"parse":{"sections":[
                    {"index":"1","line":"Series overview"},
                    {"index":"2","line":"<i>Season 1</i> (1989)"}
                ]}}"#,
            );
        let harvester = harvester(transport, None, 9);

        let episodes = harvester
            .harvest_episodes(&TopicVocabulary::default())
            .await
            .unwrap();
        assert_eq!(episodes.len(), 1);
        assert_eq!(episodes[0].title, "The Seinfeld Chronicles");
        assert_eq!(episodes[0].season, Some(1));
        assert_eq!(episodes[0].summary, SUMMARY_PLACEHOLDER);
        assert_eq!(harvester.fetcher.transport().hits("section=1"), 0);
    }

    #[tokio::test(flavor = "current_thread")]
    async fn no_episodes_from_any_strategy_is_fatal() {
        let transport = ScriptedTransport::default()
            .route("printable=yes", "<html><body><p>No tables here.</p></body></html>")
            .route("prop=sections", r#"{"parse":{"sections":[]}}"#);
        let err = harvester(transport, None, 9)
            .harvest_episodes(&TopicVocabulary::default())
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::NoRecords(RecordKind::Episodes)));
    }

    #[tokio::test(flavor = "current_thread")]
    async fn unreachable_episode_list_is_fatal() {
        let err = harvester(ScriptedTransport::default(), None, 9)
            .harvest_episodes(&TopicVocabulary::default())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            PipelineError::Fetch(FetchError::Exhausted { attempted: 4 })
        ));
    }

    #[tokio::test(flavor = "current_thread", start_paused = true)]
    async fn summary_backfill_is_paced_by_call_delay() {
        let transport = ScriptedTransport::default().route(
            "prop=extracts",
            r#"{"query":{"pages":{"7":{"extract":"Kramer buys a horse."}}}}"#,
        );
        let paced = EnrichPolicy::new(4, Duration::ZERO, Duration::from_millis(250), None);
        let harvester = Harvester::new(
            SourceFetcher::new(transport),
            Enricher::<&ScriptedChat>::disabled(paced),
            series(9),
            controls(),
            false,
        )
        .unwrap();
        let mut episodes: Vec<EpisodeRecord> = ["The Pen", "The Dog", "The Library"]
            .into_iter()
            .map(|title| {
                EpisodeRecord::from(EpisodeRow {
                    title: title.into(),
                    season: Some(3),
                    episode: None,
                    summary: String::new(),
                })
            })
            .collect();
        episodes[1].summary = "Already known.".into();

        let start = tokio::time::Instant::now();
        harvester.backfill_summaries(&mut episodes).await;
        let elapsed = start.elapsed();

        assert_eq!(harvester.fetcher.transport().hits("prop=extracts"), 2);
        assert!(elapsed >= Duration::from_millis(250), "{elapsed:?}");
        assert!(elapsed < Duration::from_millis(500), "{elapsed:?}");
        assert_eq!(episodes[0].summary, "Kramer buys a horse.");
        assert_eq!(episodes[1].summary, "Already known.");
    }

    #[tokio::test(flavor = "current_thread")]
    async fn season_pages_prefer_wikitext_and_fall_back_to_html() {
        let wikitext = json!({"parse": {"wikitext": {"*": SEASON_WIKITEXT}}}).to_string();
        let transport = ScriptedTransport::default()
            .route("Seinfeld_%28season_1%29&prop=wikitext", &wikitext)
            .route("wiki/Seinfeld_(season_2)", QUOTES_SEASON);
        let harvester = harvester(transport, None, 2);

        let quotes = harvester.harvest_quotes().await.unwrap();
        let seasons: Vec<_> = quotes.iter().map(|q| q.season).collect();
        assert_eq!(
            seasons,
            vec![
                Some(1),
                Some(1),
                Some(1),
                Some(2),
                Some(2),
                Some(2),
                Some(2),
                Some(2)
            ]
        );
        assert_eq!(quotes[0].id, "wq-1");
        assert_eq!(quotes[7].id, "wq-8");
        assert_eq!(quotes[3].episode_title, "The Ex-Girlfriend [2.01]");
        assert!(quotes.iter().all(|q| q.source == WIKIQUOTE_SOURCE));
        assert_eq!(harvester.fetcher.transport().hits("page=Seinfeld&"), 0);
    }

    #[tokio::test(flavor = "current_thread")]
    async fn empty_season_pages_fall_back_to_base_page() {
        let transport = ScriptedTransport::default().route(
            "page=Seinfeld&prop=text",
            &parse_text("<ul><li>Newman: Hello, Jerry.</li></ul>"),
        );
        let quotes = harvester(transport, None, 1).harvest_quotes().await.unwrap();
        assert_eq!(quotes.len(), 1);
        assert_eq!(quotes[0].speaker, "Newman");
        assert_eq!(quotes[0].season, None);
        assert_eq!(quotes[0].episode_title, "");
    }

    #[tokio::test(flavor = "current_thread")]
    async fn quote_enrichment_merges_back_by_id() {
        let wikitext = json!({"parse": {"wikitext": {"*": SEASON_WIKITEXT}}}).to_string();
        let transport = ScriptedTransport::default()
            .route("Seinfeld_%28season_1%29&prop=wikitext", &wikitext);
        let chat = ScriptedChat::default()
            .reply(r#"{"episodeTitle": "The Trip", "season": 4, "episode": 1, "listener": "Jerry", "situation": "At the airport"}"#);

        let quotes = harvester(transport, Some(&chat), 1)
            .harvest_quotes()
            .await
            .unwrap();
        assert_eq!(quotes.len(), 3);
        assert_eq!(quotes[0].episode_title, "The Trip");
        assert_eq!(quotes[0].episode, Some(1));
        assert_eq!(quotes[0].listener, "Jerry");
        assert_eq!(quotes[1].episode_title, "The Contest [4.11]");
        assert_eq!(quotes[1].season, Some(1));
        assert_eq!(chat.call_count(), 1 + 4 + 4);
    }
}
