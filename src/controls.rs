//! Run configuration shared by the harvesting binaries.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use clap::builder::BoolishValueParser;
use clap::Args;
use tracing::warn;
use tracing_subscriber::EnvFilter;

use crate::enrich::{Enricher, OpenAiChat};

/// Bounds on classifier traffic for one run.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EnrichPolicy {
    max_attempts: u32,
    backoff_step: Duration,
    call_delay: Duration,
    limit: Option<usize>,
}

impl EnrichPolicy {
    /// Constructs a policy; `limit: None` enriches every record.
    pub fn new(
        max_attempts: u32,
        backoff_step: Duration,
        call_delay: Duration,
        limit: Option<usize>,
    ) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff_step,
            call_delay,
            limit,
        }
    }

    /// Total attempts per record, including the first.
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Wait after failed attempt `attempt` (1-based).
    pub fn backoff(&self, attempt: u32) -> Duration {
        self.backoff_step * attempt
    }

    /// Pause between consecutive classifier calls.
    pub fn call_delay(&self) -> Duration {
        self.call_delay
    }

    /// Maximum number of records sent to the classifier.
    pub fn limit(&self) -> Option<usize> {
        self.limit
    }
}

impl Default for EnrichPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            backoff_step: Duration::from_millis(300),
            call_delay: Duration::from_millis(200),
            limit: Some(120),
        }
    }
}

/// Transport timeout and pacing between season pages.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FetchControls {
    timeout: Duration,
    wikitext_page_delay: Duration,
    html_page_delay: Duration,
}

impl FetchControls {
    pub fn new(timeout: Duration, wikitext_page_delay: Duration, html_page_delay: Duration) -> Self {
        Self {
            timeout,
            wikitext_page_delay,
            html_page_delay,
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Pause after a season page read from wikitext.
    pub fn wikitext_page_delay(&self) -> Duration {
        self.wikitext_page_delay
    }

    /// Pause after a season page read from rendered HTML.
    pub fn html_page_delay(&self) -> Duration {
        self.html_page_delay
    }
}

impl Default for FetchControls {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            wikitext_page_delay: Duration::from_millis(100),
            html_page_delay: Duration::from_millis(150),
        }
    }
}

/// Where the series lives on the wikis.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SeriesConfig {
    pub name: String,
    pub episode_list_page: String,
    pub quote_page: String,
    pub seasons: u32,
    pub wikipedia: String,
    pub wikiquote: String,
}

impl SeriesConfig {
    /// Wikiquote page holding one season's quotes.
    pub fn season_quote_page(&self, season: u32) -> String {
        format!("{}_(season_{season})", self.quote_page)
    }

    /// `api.php` endpoint of the wiki at `base`.
    pub fn api_endpoint(base: &str) -> String {
        format!("{}/w/api.php", base.trim_end_matches('/'))
    }

    /// Canonical article URL of `page` on the wiki at `base`.
    pub fn page_url(base: &str, page: &str) -> String {
        format!("{}/wiki/{page}", base.trim_end_matches('/'))
    }
}

impl Default for SeriesConfig {
    fn default() -> Self {
        Self {
            name: "Seinfeld".to_string(),
            episode_list_page: "List_of_Seinfeld_episodes".to_string(),
            quote_page: "Seinfeld".to_string(),
            seasons: 9,
            wikipedia: "https://en.wikipedia.org".to_string(),
            wikiquote: "https://en.wikiquote.org".to_string(),
        }
    }
}

/// Per-binary defaults for flags whose default differs between datasets.
#[derive(Clone, Copy, Debug)]
pub struct EnrichDefaults {
    pub limit: Option<usize>,
    pub call_delay: Duration,
}

/// Flags shared by the harvesting binaries.
#[derive(Args, Debug, Clone)]
pub struct HarvestArgs {
    /// Verbose parser diagnostics (`SCRAPE_DEBUG=1`)
    #[arg(long, env = "SCRAPE_DEBUG", value_parser = BoolishValueParser::new())]
    pub debug: bool,

    /// Directory the datasets are written to
    #[arg(long, env = "SHOWCRAWL_DATA_DIR", default_value = "data")]
    pub data_dir: PathBuf,

    /// Enrichment credential; enrichment is skipped without it
    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true)]
    pub openai_api_key: Option<String>,

    /// Chat model used for enrichment
    #[arg(long, env = "SHOWCRAWL_OPENAI_MODEL", default_value = "gpt-4o-mini")]
    pub openai_model: String,

    /// OpenAI-compatible API base URL
    #[arg(long, env = "SHOWCRAWL_OPENAI_BASE", default_value = "https://api.openai.com/v1")]
    pub openai_base_url: String,

    /// Per-request enrichment timeout in seconds
    #[arg(long, env = "SHOWCRAWL_OPENAI_TIMEOUT_SECS", default_value_t = 60)]
    pub openai_timeout_secs: u64,

    /// Enrich every record instead of the first N
    #[arg(long, env = "QUOTES_ENRICH_ALL", value_parser = BoolishValueParser::new())]
    pub enrich_all: bool,

    /// Number of records sent for enrichment
    #[arg(long, env = "QUOTE_ENRICH_LIMIT")]
    pub enrich_limit: Option<usize>,

    /// Milliseconds to wait between enrichment calls
    #[arg(long, env = "SHOWCRAWL_ENRICH_DELAY_MS")]
    pub enrich_delay_ms: Option<u64>,

    /// Attempts per record before giving up
    #[arg(long, env = "SHOWCRAWL_ENRICH_ATTEMPTS", default_value_t = 4)]
    pub max_attempts: u32,

    /// Linear backoff step in milliseconds
    #[arg(long, env = "SHOWCRAWL_ENRICH_BACKOFF_MS", default_value_t = 300)]
    pub backoff_ms: u64,

    /// Source fetch timeout in seconds
    #[arg(long, env = "SHOWCRAWL_FETCH_TIMEOUT_SECS", default_value_t = 30)]
    pub fetch_timeout_secs: u64,
}

impl HarvestArgs {
    /// Converts the parsed flags into an `EnrichPolicy`.
    pub fn build_policy(&self, defaults: EnrichDefaults) -> EnrichPolicy {
        let limit = if self.enrich_all {
            None
        } else {
            self.enrich_limit.or(defaults.limit)
        };
        EnrichPolicy::new(
            self.max_attempts,
            Duration::from_millis(self.backoff_ms),
            self.enrich_delay_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.call_delay),
            limit,
        )
    }

    /// Converts the parsed flags into `FetchControls`.
    pub fn build_fetch_controls(&self) -> FetchControls {
        FetchControls {
            timeout: Duration::from_secs(self.fetch_timeout_secs),
            ..FetchControls::default()
        }
    }

    /// Credential with surrounding whitespace removed, `None` when blank.
    pub fn api_key(&self) -> Option<&str> {
        self.openai_api_key
            .as_deref()
            .map(str::trim)
            .filter(|key| !key.is_empty())
    }

    pub fn openai_timeout(&self) -> Duration {
        Duration::from_secs(self.openai_timeout_secs)
    }

    /// OpenAI-backed enricher, or a disabled one when no key is configured.
    pub fn build_enricher(&self, defaults: EnrichDefaults) -> Result<Enricher<OpenAiChat>> {
        let policy = self.build_policy(defaults);
        let Some(key) = self.api_key() else {
            warn!("OPENAI_API_KEY is not set; enrichment is disabled for this run");
            return Ok(Enricher::disabled(policy));
        };
        let chat = OpenAiChat::new(
            key,
            &self.openai_base_url,
            self.openai_model.clone(),
            self.openai_timeout(),
        )?;
        Ok(Enricher::new(chat, policy))
    }

    /// Installs the global subscriber. `RUST_LOG` wins over `--debug`.
    pub fn init_tracing(&self) {
        init_tracing(self.debug);
    }
}

/// Installs a stderr `fmt` subscriber filtered by `RUST_LOG`, falling back to
/// `debug` or `info`.
pub fn init_tracing(debug: bool) {
    let fallback = if debug { "debug" } else { "info" };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}
