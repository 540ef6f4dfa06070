//! Source fetching with ordered fallback across candidate locations.
//!
//! A document can usually be read from several places (printable page, render
//! action, REST endpoint, action API). [`SourceFetcher::fetch_first`] walks the
//! candidates in order and hands back the first non-empty body.

use std::future::Future;
use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::Client;
use thiserror::Error;
use tracing::{debug, warn};
use url::Url;

use crate::wiki_api::{self, MediaWikiApi, SectionInfo};

/// Identifies the harvester to the wikis.
pub const USER_AGENT: &str = "showcrawl/0.1 (episode and quote harvester)";

/// Failure reading a single location, or every location of a document.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    /// The request never produced a response.
    #[error("request to {url} failed: {message}")]
    Transport { url: String, message: String },
    /// The server answered with a non-success status.
    #[error("{url} returned HTTP {status}")]
    Status { url: String, status: u16 },
    /// The response body did not match the expected envelope.
    #[error("unexpected response from {url}: {message}")]
    Decode { url: String, message: String },
    /// Every candidate failed or came back empty.
    #[error("all {attempted} candidate sources failed or were empty")]
    Exhausted { attempted: usize },
}

/// Minimal GET seam so the pipeline can run against canned responses.
pub trait Transport {
    /// Fetches `url` and returns the body as text.
    fn get_text(&self, url: &Url) -> impl Future<Output = Result<String, FetchError>> + Send;
}

/// Async HTTP transport backed by `reqwest`.
#[derive(Clone)]
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    /// Builds a client with the harvester's user agent and a request timeout.
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self { client })
    }
}

impl Transport for HttpTransport {
    async fn get_text(&self, url: &Url) -> Result<String, FetchError> {
        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|err| FetchError::Transport {
                url: url.to_string(),
                message: err.to_string(),
            })?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }
        response.text().await.map_err(|err| FetchError::Transport {
            url: url.to_string(),
            message: err.to_string(),
        })
    }
}

/// How the body at a location is turned into document content.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SourceShape {
    /// The body is the document.
    Raw,
    /// Action API `prop=text` envelope.
    ParseHtml,
    /// Action API `prop=wikitext` envelope.
    ParseWikitext,
}

/// One candidate location of a document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Source {
    url: Url,
    shape: SourceShape,
}

impl Source {
    /// A page fetched as-is.
    pub fn page(url: &str) -> Result<Self, url::ParseError> {
        Ok(Self {
            url: Url::parse(url)?,
            shape: SourceShape::Raw,
        })
    }

    /// Rendered HTML through the action API.
    pub fn parse_html(api: &MediaWikiApi, page: &str, section: Option<&str>) -> Self {
        Self {
            url: api.parse_text_url(page, section),
            shape: SourceShape::ParseHtml,
        }
    }

    /// Page wikitext through the action API.
    pub fn parse_wikitext(api: &MediaWikiApi, page: &str) -> Self {
        Self {
            url: api.parse_wikitext_url(page),
            shape: SourceShape::ParseWikitext,
        }
    }
}

/// Text of a document plus where it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawDocument {
    pub content: String,
    pub provenance: String,
}

/// Reads documents through a [`Transport`].
pub struct SourceFetcher<T> {
    transport: T,
}

impl<T: Transport> SourceFetcher<T> {
    pub fn new(transport: T) -> Self {
        Self { transport }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Returns the first candidate that yields non-empty content.
    ///
    /// Individual failures are logged and skipped; only running out of
    /// candidates is an error.
    pub async fn fetch_first(&self, candidates: &[Source]) -> Result<RawDocument, FetchError> {
        for source in candidates {
            match self.fetch_source(source).await {
                Ok(content) if !content.trim().is_empty() => {
                    debug!(url = %source.url, bytes = content.len(), "fetched document");
                    return Ok(RawDocument {
                        content,
                        provenance: source.url.to_string(),
                    });
                }
                Ok(_) => debug!(url = %source.url, "source returned empty content"),
                Err(err) => warn!(url = %source.url, error = %err, "source failed, trying next"),
            }
        }
        Err(FetchError::Exhausted {
            attempted: candidates.len(),
        })
    }

    /// Section outline of a page.
    pub async fn fetch_sections(
        &self,
        api: &MediaWikiApi,
        page: &str,
    ) -> Result<Vec<SectionInfo>, FetchError> {
        let url = api.sections_url(page);
        let body = self.transport.get_text(&url).await?;
        wiki_api::parse_sections(&body).map_err(|err| decode_error(&url, err))
    }

    /// Intro paragraph of an article, `None` when the wiki has nothing.
    pub async fn fetch_intro(
        &self,
        api: &MediaWikiApi,
        title: &str,
    ) -> Result<Option<String>, FetchError> {
        let url = api.intro_extract_url(title);
        let body = self.transport.get_text(&url).await?;
        wiki_api::intro_extract(&body).map_err(|err| decode_error(&url, err))
    }

    async fn fetch_source(&self, source: &Source) -> Result<String, FetchError> {
        let body = self.transport.get_text(&source.url).await?;
        let decoded = match source.shape {
            SourceShape::Raw => return Ok(body),
            SourceShape::ParseHtml => wiki_api::parse_text(&body),
            SourceShape::ParseWikitext => wiki_api::parse_wikitext(&body),
        };
        decoded.map_err(|err| decode_error(&source.url, err))
    }
}

fn decode_error(url: &Url, err: serde_json::Error) -> FetchError {
    FetchError::Decode {
        url: url.to_string(),
        message: err.to_string(),
    }
}
