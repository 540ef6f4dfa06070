use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use showcrawl::{
    DatasetWriter, EnrichDefaults, HarvestArgs, Harvester, HttpTransport, RecordKind,
    SeriesConfig, SourceFetcher, TopicVocabulary,
};
use tracing::info;

#[derive(Parser, Debug)]
#[command(
    name = "showcrawl-episodes",
    about = "Harvest the episode list into data/episodes.json"
)]
struct EpisodesCli {
    #[command(flatten)]
    harvest: HarvestArgs,

    /// Topic vocabulary, a JSON array of labels (defaults to <data-dir>/topics.json)
    #[arg(long, env = "SHOWCRAWL_TOPICS")]
    topics: Option<PathBuf>,
}

const DEFAULTS: EnrichDefaults = EnrichDefaults {
    limit: None,
    call_delay: Duration::from_millis(250),
};

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = EpisodesCli::parse();
    cli.harvest.init_tracing();

    let topics_path = cli
        .topics
        .clone()
        .unwrap_or_else(|| cli.harvest.data_dir.join("topics.json"));
    let topics = TopicVocabulary::load(&topics_path)?;
    info!(path = ?topics_path, labels = topics.labels().len(), "loaded topic vocabulary");

    let controls = cli.harvest.build_fetch_controls();
    let transport = HttpTransport::new(controls.timeout())?;
    let harvester = Harvester::new(
        SourceFetcher::new(transport),
        cli.harvest.build_enricher(DEFAULTS)?,
        SeriesConfig::default(),
        controls,
        cli.harvest.debug,
    )?;

    let episodes = harvester
        .harvest_episodes(&topics)
        .await
        .context("episode harvest failed")?;

    let writer = DatasetWriter::new(&cli.harvest.data_dir);
    let published = writer.publish(RecordKind::Episodes, &episodes)?;
    writer.publish_topics(&topics)?;
    info!(
        records = published.records,
        path = ?published.json,
        "wrote episodes"
    );
    Ok(())
}
