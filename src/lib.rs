//! Episode and quote harvester for sitcom wikis.
//!
//! Pages are read through [`fetch::SourceFetcher`], parsed by the `wiki-parser`
//! crate, collapsed by [`dedup`], optionally enriched through a chat model, and
//! written by [`output::DatasetWriter`] only after [`validate`] accepts them.

pub mod controls;
pub mod dedup;
pub mod enrich;
pub mod fetch;
pub mod output;
pub mod pipeline;
pub mod records;
pub mod validate;
pub mod wiki_api;

pub use controls::{EnrichDefaults, EnrichPolicy, FetchControls, HarvestArgs, SeriesConfig};
pub use dedup::{dedup_and_index, Indexed};
pub use enrich::{ChatBackend, EnrichContext, EnrichError, EnrichReport, Enricher, OpenAiChat};
pub use fetch::{FetchError, HttpTransport, RawDocument, Source, SourceFetcher, Transport};
pub use output::{DatasetWriter, OutputError, Published};
pub use pipeline::{Harvester, PipelineError};
pub use records::{EpisodeRecord, QuoteRecord, RecordKind, TopicVocabulary};
pub use validate::{validate, Violation};
