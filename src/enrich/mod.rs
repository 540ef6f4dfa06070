//! Classifier-backed metadata enrichment.
//!
//! Records go to the classifier one at a time with a fixed pause between calls.
//! Transport failures are retried with linear backoff; anything that still fails
//! leaves the record exactly as it was.

pub mod openai;
pub mod response;

use std::collections::HashMap;
use std::future::Future;

use serde_json::{json, Value};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::controls::EnrichPolicy;
use crate::dedup::Indexed;
use crate::records::{EpisodeRecord, QuoteRecord, TopicVocabulary};
use response::{parse_reply, FieldReader, ParsedReply};

pub use openai::OpenAiChat;

/// Why a record could not be enriched. Never fatal for a run.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EnrichError {
    /// The request did not complete.
    #[error("classifier request failed: {0}")]
    Transport(String),
    /// The service answered with a non-success status.
    #[error("classifier returned HTTP {status}: {body}")]
    Status { status: u16, body: String },
    /// The reply held nothing usable.
    #[error("malformed classifier reply: {0}")]
    Malformed(String),
}

impl EnrichError {
    fn is_retryable(&self) -> bool {
        match self {
            Self::Transport(_) => true,
            Self::Status { status, .. } => *status == 429 || *status >= 500,
            Self::Malformed(_) => false,
        }
    }
}

/// One round trip to a chat model.
pub trait ChatBackend {
    /// Sends a system and a user message and returns the assistant's text.
    fn complete(
        &self,
        system: &str,
        user: &str,
    ) -> impl Future<Output = Result<String, EnrichError>> + Send;
}

/// Run-wide inputs every request may draw on.
#[derive(Debug, Clone, Copy)]
pub struct EnrichContext<'a> {
    pub series: &'a str,
    pub topics: &'a TopicVocabulary,
}

/// A record kind the classifier knows how to fill in.
pub trait Enrichable: Indexed + Clone {
    fn system_prompt(series: &str) -> String;

    /// User message payload.
    fn request(&self, ctx: &EnrichContext<'_>) -> Value;

    /// Records that return `false` are passed through without a call.
    fn wants_enrichment(&self) -> bool {
        true
    }

    /// Copies the reply's fields onto a clone of `self`.
    fn merge(&self, reply: &mut FieldReader<'_>, ctx: &EnrichContext<'_>) -> Self;
}

impl Enrichable for EpisodeRecord {
    fn system_prompt(series: &str) -> String {
        format!(
            "You label {series} episode summaries with a short subtitle and trigger topics. \
             The subtitle is a short description of the episode (1 sentence). \
             Respond with strict JSON in the shape {{\"subtitle\": string, \"topics\": string[]}}. \
             Use only topics from the provided list. \
             Use an empty string and empty array if unknown."
        )
    }

    fn request(&self, ctx: &EnrichContext<'_>) -> Value {
        json!({
            "title": self.title,
            "summary": self.summary,
            "topics": ctx.topics.labels(),
        })
    }

    fn wants_enrichment(&self) -> bool {
        !self.summary.trim().is_empty()
    }

    fn merge(&self, reply: &mut FieldReader<'_>, ctx: &EnrichContext<'_>) -> Self {
        let mut next = self.clone();
        next.subtitle = reply.text("subtitle");
        next.topics = ctx.topics.retain_known(reply.labels("topics"));
        next
    }
}

impl Enrichable for QuoteRecord {
    fn system_prompt(series: &str) -> String {
        format!(
            "You enrich {series} quotes with metadata. Respond with strict JSON: \
             {{\"episodeTitle\": string, \"season\": number|null, \"episode\": number|null, \
             \"listener\": string, \"situation\": string}}. \
             Use empty strings or null if unknown."
        )
    }

    fn request(&self, _ctx: &EnrichContext<'_>) -> Value {
        json!({
            "quote": self.text,
            "speaker": self.speaker,
        })
    }

    fn merge(&self, reply: &mut FieldReader<'_>, _ctx: &EnrichContext<'_>) -> Self {
        let mut next = self.clone();
        next.episode_title = reply.text("episodeTitle");
        next.season = reply.number("season");
        next.episode = reply.number("episode");
        next.listener = reply.text("listener");
        next.situation = reply.text("situation");
        next
    }
}

/// Tallies for one enrichment pass.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct EnrichReport {
    pub enriched: usize,
    pub failed: usize,
    /// Within the cap but not eligible (e.g. no summary to classify).
    pub skipped: usize,
    /// Beyond the cap, or enrichment disabled.
    pub passed_through: usize,
}

/// Sequential, rate-limited enrichment driver.
pub struct Enricher<B> {
    backend: Option<B>,
    policy: EnrichPolicy,
}

impl<B: ChatBackend> Enricher<B> {
    pub fn new(backend: B, policy: EnrichPolicy) -> Self {
        Self {
            backend: Some(backend),
            policy,
        }
    }

    /// An enricher that returns every record unchanged.
    pub fn disabled(policy: EnrichPolicy) -> Self {
        Self {
            backend: None,
            policy,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.backend.is_some()
    }

    pub fn policy(&self) -> &EnrichPolicy {
        &self.policy
    }

    /// Enriches one record, falling back to an unchanged copy on any failure.
    pub async fn enrich<R: Enrichable>(&self, record: &R, ctx: &EnrichContext<'_>) -> R {
        match self.try_enrich(record, ctx).await {
            Ok(next) => next,
            Err(err) => {
                warn!(id = record.id(), error = %err, "enrichment failed, keeping record as parsed");
                record.clone()
            }
        }
    }

    /// Enriches one record, surfacing the failure instead of swallowing it.
    pub async fn try_enrich<R: Enrichable>(
        &self,
        record: &R,
        ctx: &EnrichContext<'_>,
    ) -> Result<R, EnrichError> {
        let Some(backend) = &self.backend else {
            return Ok(record.clone());
        };
        if !record.wants_enrichment() {
            return Ok(record.clone());
        }
        let system = R::system_prompt(ctx.series);
        let user = record.request(ctx).to_string();
        let content = self.complete_with_retry(backend, &system, &user).await?;

        let fields = match parse_reply(&content) {
            ParsedReply::Strict(fields) => fields,
            ParsedReply::Extracted(fields) => {
                debug!(id = record.id(), "recovered JSON object from classifier prose");
                fields
            }
            ParsedReply::Unparseable => {
                return Err(EnrichError::Malformed(format!(
                    "no JSON object in reply: {}",
                    preview(&content)
                )))
            }
        };
        let mut reader = FieldReader::new(&fields);
        let next = record.merge(&mut reader, ctx);
        if reader.typed() == 0 {
            return Err(EnrichError::Malformed(
                "reply carried none of the expected fields".to_string(),
            ));
        }
        Ok(next)
    }

    /// Enriches the first `limit` records in order and merges results back by id.
    pub async fn enrich_all<R: Enrichable>(
        &self,
        records: Vec<R>,
        ctx: &EnrichContext<'_>,
    ) -> (Vec<R>, EnrichReport) {
        let mut report = EnrichReport::default();
        if self.backend.is_none() {
            report.passed_through = records.len();
            return (records, report);
        }

        let total = records.len();
        let cap = self.policy.limit().unwrap_or(total).min(total);
        if cap < total {
            warn!(cap, total, "enrichment capped; remaining records pass through unchanged");
        }
        report.passed_through = total - cap;

        let mut merged: HashMap<String, R> = HashMap::new();
        let mut calls = 0usize;
        for record in records.iter().take(cap) {
            if !record.wants_enrichment() {
                report.skipped += 1;
                continue;
            }
            if calls > 0 {
                tokio::time::sleep(self.policy.call_delay()).await;
            }
            calls += 1;
            match self.try_enrich(record, ctx).await {
                Ok(next) => {
                    report.enriched += 1;
                    merged.insert(next.id().to_string(), next);
                }
                Err(err) => {
                    report.failed += 1;
                    warn!(id = record.id(), error = %err, "enrichment failed, keeping record as parsed");
                }
            }
            if calls % 25 == 0 {
                info!(done = calls, of = cap, "enrichment progress");
            }
        }

        let records = records
            .into_iter()
            .map(|record| merged.remove(record.id()).unwrap_or(record))
            .collect();
        (records, report)
    }

    async fn complete_with_retry(
        &self,
        backend: &B,
        system: &str,
        user: &str,
    ) -> Result<String, EnrichError> {
        let mut attempt = 1u32;
        loop {
            match backend.complete(system, user).await {
                Ok(content) => return Ok(content),
                Err(err) if err.is_retryable() && attempt < self.policy.max_attempts() => {
                    let wait = self.policy.backoff(attempt);
                    debug!(attempt, ?wait, error = %err, "retrying classifier call");
                    tokio::time::sleep(wait).await;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

fn preview(content: &str) -> String {
    content.chars().take(80).collect()
}


#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::testing::{instant_policy, ScriptedChat};
    use super::*;
    use crate::dedup::dedup_and_index;
    use crate::records::WIKIQUOTE_SOURCE;
    use pretty_assertions::assert_eq;
    use wiki_parser::{EpisodeRow, QuoteLine};

    fn quotes() -> Vec<QuoteRecord> {
        dedup_and_index(
            ["Hello, Newman.", "No soup for you!", "Serenity now!"]
                .into_iter()
                .map(|text| {
                    QuoteRecord::from_line(
                        QuoteLine {
                            text: text.into(),
                            speaker: "Jerry".into(),
                            episode_title: "Heading".into(),
                            season: Some(5),
                        },
                        WIKIQUOTE_SOURCE,
                    )
                })
                .collect(),
        )
    }

    fn ctx(topics: &TopicVocabulary) -> EnrichContext<'_> {
        EnrichContext {
            series: "Seinfeld",
            topics,
        }
    }

    #[tokio::test(flavor = "current_thread")]
    async fn exhausted_retries_return_the_record_unchanged() {
        let chat = ScriptedChat::default();
        let enricher = Enricher::new(&chat, instant_policy(None));
        let vocab = TopicVocabulary::default();
        let record = quotes().remove(0);

        let out = enricher.enrich(&record, &ctx(&vocab)).await;
        assert_eq!(out, record);
        assert_eq!(chat.call_count(), 4);
    }

    #[tokio::test(flavor = "current_thread", start_paused = true)]
    async fn backoff_grows_linearly_between_attempts() {
        let chat = ScriptedChat::default();
        let policy = EnrichPolicy::new(4, Duration::from_millis(300), Duration::ZERO, None);
        let enricher = Enricher::new(&chat, policy);
        let vocab = TopicVocabulary::default();
        let record = quotes().remove(0);

        let start = tokio::time::Instant::now();
        let err = enricher.try_enrich(&record, &ctx(&vocab)).await.unwrap_err();
        let elapsed = start.elapsed();

        assert!(matches!(err, EnrichError::Transport(_)));
        assert_eq!(chat.call_count(), 4);
        assert!(elapsed >= Duration::from_millis(300 + 600 + 900), "{elapsed:?}");
        assert!(elapsed < Duration::from_millis(1900), "{elapsed:?}");
    }

    #[tokio::test(flavor = "current_thread", start_paused = true)]
    async fn calls_are_spaced_by_the_call_delay() {
        let reply = r#"{"episodeTitle": "The Pen", "season": 3, "episode": 3, "listener": "", "situation": ""}"#;
        let chat = ScriptedChat::default().reply(reply).reply(reply).reply(reply);
        let policy = EnrichPolicy::new(4, Duration::ZERO, Duration::from_millis(200), None);
        let enricher = Enricher::new(&chat, policy);
        let vocab = TopicVocabulary::default();

        let start = tokio::time::Instant::now();
        let (_, report) = enricher.enrich_all(quotes(), &ctx(&vocab)).await;
        let elapsed = start.elapsed();

        assert_eq!(report.enriched, 3);
        assert!(elapsed >= Duration::from_millis(400), "{elapsed:?}");
        assert!(elapsed < Duration::from_millis(500), "{elapsed:?}");
    }

    #[tokio::test(flavor = "current_thread")]
    async fn client_errors_are_not_retried() {
        let chat = ScriptedChat::default().error(EnrichError::Status {
            status: 401,
            body: "bad key".into(),
        });
        let enricher = Enricher::new(&chat, instant_policy(None));
        let vocab = TopicVocabulary::default();
        let record = quotes().remove(0);
        let err = enricher.try_enrich(&record, &ctx(&vocab)).await.unwrap_err();
        assert!(matches!(err, EnrichError::Status { status: 401, .. }));
        assert_eq!(chat.call_count(), 1);
    }

    #[tokio::test(flavor = "current_thread")]
    async fn retries_then_merges_typed_fields() {
        let chat = ScriptedChat::default()
            .error(EnrichError::Transport("timeout".into()))
            .reply(
                "Here it is: {\"episodeTitle\": \"The Raincoats\", \"season\": 5, \
                 \"episode\": \"x\", \"listener\": \"Elaine\", \"situation\": 3}",
            );
        let enricher = Enricher::new(&chat, instant_policy(None));
        let vocab = TopicVocabulary::default();
        let record = quotes().remove(0);

        let out = enricher.try_enrich(&record, &ctx(&vocab)).await.unwrap();
        assert_eq!(chat.call_count(), 2);
        assert_eq!(out.episode_title, "The Raincoats");
        assert_eq!(out.season, Some(5));
        assert_eq!(out.episode, None);
        assert_eq!(out.listener, "Elaine");
        assert_eq!(out.situation, "");
        assert_eq!(out.text, record.text);
        assert_eq!(out.speaker, record.speaker);
        let sent: Value = serde_json::from_str(&chat.last_user.lock().unwrap()).unwrap();
        assert_eq!(sent, json!({"quote": "Hello, Newman.", "speaker": "Jerry"}));
    }

    #[tokio::test(flavor = "current_thread")]
    async fn all_mistyped_reply_is_malformed() {
        let chat = ScriptedChat::default().reply(r#"{"episodeTitle": 1, "listener": []}"#);
        let enricher = Enricher::new(&chat, instant_policy(None));
        let vocab = TopicVocabulary::default();
        let record = quotes().remove(0);
        let err = enricher.try_enrich(&record, &ctx(&vocab)).await.unwrap_err();
        assert!(matches!(err, EnrichError::Malformed(_)));
    }

    #[tokio::test(flavor = "current_thread")]
    async fn cap_limits_calls_and_preserves_order() {
        let chat = ScriptedChat::default()
            .reply(r#"{"episodeTitle": "A", "season": null, "episode": null, "listener": "", "situation": ""}"#)
            .reply("not json at all");
        let enricher = Enricher::new(&chat, instant_policy(Some(2)));
        let vocab = TopicVocabulary::default();
        let input = quotes();

        let (out, report) = enricher.enrich_all(input.clone(), &ctx(&vocab)).await;
        assert_eq!(chat.call_count(), 2);
        assert_eq!(
            report,
            EnrichReport {
                enriched: 1,
                failed: 1,
                skipped: 0,
                passed_through: 1,
            }
        );
        let ids: Vec<_> = out.iter().map(|q| q.id.as_str()).collect();
        assert_eq!(ids, vec!["wq-1", "wq-2", "wq-3"]);
        assert_eq!(out[0].episode_title, "A");
        assert_eq!(out[0].season, None);
        assert_eq!(out[1], input[1]);
        assert_eq!(out[2], input[2]);
    }

    #[tokio::test(flavor = "current_thread")]
    async fn episodes_without_summary_are_skipped_and_topics_filtered() {
        let chat = ScriptedChat::default()
            .reply(r#"{"subtitle": "Jerry loses a pen.", "topics": ["Gifts", "Aliens", "Gifts"]}"#);
        let enricher = Enricher::new(&chat, instant_policy(None));
        let vocab = TopicVocabulary::new(["Gifts", "Dating"]);
        let episodes = dedup_and_index(vec![
            EpisodeRecord::from(EpisodeRow {
                title: "The Pen".into(),
                season: Some(3),
                episode: Some(3),
                summary: "Jerry and Elaine visit Florida.".into(),
            }),
            EpisodeRecord::from(EpisodeRow {
                title: "The Dog".into(),
                season: Some(3),
                episode: Some(4),
                summary: String::new(),
            }),
        ]);

        let (out, report) = enricher.enrich_all(episodes, &ctx(&vocab)).await;
        assert_eq!(chat.call_count(), 1);
        assert_eq!(report.skipped, 1);
        assert_eq!(out[0].subtitle, "Jerry loses a pen.");
        assert_eq!(out[0].topics, vec!["Gifts".to_string()]);
        assert_eq!(out[1].subtitle, "");
        let sent: Value = serde_json::from_str(&chat.last_user.lock().unwrap()).unwrap();
        assert_eq!(sent["topics"], json!(["Gifts", "Dating"]));
    }

    #[tokio::test(flavor = "current_thread")]
    async fn disabled_enricher_passes_everything_through() {
        let enricher: Enricher<ScriptedChat> = Enricher::disabled(instant_policy(Some(1)));
        let vocab = TopicVocabulary::default();
        let input = quotes();
        let (out, report) = enricher.enrich_all(input.clone(), &ctx(&vocab)).await;
        assert_eq!(out, input);
        assert_eq!(report.passed_through, 3);
        assert!(!enricher.is_enabled());
    }
}
