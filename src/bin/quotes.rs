use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use showcrawl::{
    DatasetWriter, EnrichDefaults, HarvestArgs, Harvester, HttpTransport, RecordKind,
    SeriesConfig, SourceFetcher,
};
use tracing::info;

#[derive(Parser, Debug)]
#[command(
    name = "showcrawl-quotes",
    about = "Harvest season quote pages into data/quotes.json"
)]
struct QuotesCli {
    #[command(flatten)]
    harvest: HarvestArgs,
}

const DEFAULTS: EnrichDefaults = EnrichDefaults {
    limit: Some(120),
    call_delay: Duration::from_millis(200),
};

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = QuotesCli::parse();
    cli.harvest.init_tracing();

    let controls = cli.harvest.build_fetch_controls();
    let transport = HttpTransport::new(controls.timeout())?;
    let harvester = Harvester::new(
        SourceFetcher::new(transport),
        cli.harvest.build_enricher(DEFAULTS)?,
        SeriesConfig::default(),
        controls,
        cli.harvest.debug,
    )?;

    let quotes = harvester
        .harvest_quotes()
        .await
        .context("quote harvest failed")?;

    let writer = DatasetWriter::new(&cli.harvest.data_dir);
    let published = writer.publish(RecordKind::Quotes, &quotes)?;
    info!(
        records = published.records,
        path = ?published.json,
        "wrote quotes"
    );
    Ok(())
}
