use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::{error, info};

use threat_feed::config::Config;
use threat_feed::constants::MAX_WINDOW_DAYS;
use threat_feed::fetch::{FileSource, GrokNewsClient, NewsSource};
use threat_feed::logging;
use threat_feed::metrics;
use threat_feed::pipeline::{Pipeline, PipelineSettings, RunReport};
use threat_feed::publisher::{LogPublisher, Publisher, ThreatApiPublisher};
use threat_feed::storage::PartitionStore;
use threat_feed::types::{Clock, SystemClock};

#[derive(Parser)]
#[command(name = "threat_feed")]
#[command(about = "Security-incident news ingester and publisher")]
#[command(version = "0.1.0")]
struct Cli {
    /// Path to the TOML config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch recent incidents, deduplicate against history and publish the new ones
    Run {
        /// Log submissions instead of sending them
        #[arg(long)]
        dry_run: bool,
    },
    /// Run the pipeline on a saved JSON batch instead of the live feed
    Ingest {
        /// JSON file holding an array of incidents
        #[arg(long)]
        input: PathBuf,
        /// Log submissions instead of sending them
        #[arg(long)]
        dry_run: bool,
    },
    /// List incidents stored in recent partitions
    History {
        /// How many days back to look (defaults to the dedup window)
        #[arg(long, value_parser = clap::value_parser!(i64).range(0..=MAX_WINDOW_DAYS))]
        days: Option<i64>,
    },
}

fn build_publisher(config: &Config, dry_run: bool) -> anyhow::Result<Box<dyn Publisher>> {
    if dry_run {
        info!("🧪 Dry run: submissions will be logged, not sent");
        return Ok(Box::new(LogPublisher));
    }
    let publisher = ThreatApiPublisher::from_env(&config.publish)
        .context("Failed to set up the threat API publisher")?;
    Ok(Box::new(publisher))
}

fn run_pipeline(
    config: &Config,
    source: Box<dyn NewsSource>,
    publisher: Box<dyn Publisher>,
) -> anyhow::Result<RunReport> {
    let pipeline = Pipeline::new(
        source,
        publisher,
        PartitionStore::new(&config.storage.root),
        Box::new(SystemClock),
        PipelineSettings::from_config(config),
    );

    let result = pipeline.run();
    metrics::push_to_gateway("threat_feed");

    match result {
        Ok(report) => Ok(report),
        Err(e) => {
            error!("Pipeline failed: {}", e);
            Err(e).context("Pipeline run failed")
        }
    }
}

fn print_report(report: &RunReport) {
    println!("\n📊 Pipeline Results ({}):", report.run_id);
    println!("   Fetched: {}", report.fetched);
    println!("   Duplicates: {}", report.duplicates);
    println!("   Unique: {}", report.unique);
    println!("   Published: {}", report.published);
    match &report.partition {
        Some(path) => println!("   Partition: {}", path.display()),
        None => println!("   Partition: (nothing stored)"),
    }
}

fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();

    let cli = Cli::parse();
    let config = Config::load(cli.config.as_deref()).context("Failed to load configuration")?;
    let _log_guard = logging::init_logging(&config.logging.dir);
    metrics::init_metrics();

    match cli.command {
        Commands::Run { dry_run } => {
            println!("🔄 Running threat feed pipeline...");
            let source = GrokNewsClient::from_env(config.fetch.clone())
                .context("Failed to set up the news client")?;
            let publisher = build_publisher(&config, dry_run)?;
            let report = run_pipeline(&config, Box::new(source), publisher)?;
            print_report(&report);
        }
        Commands::Ingest { input, dry_run } => {
            println!("📥 Ingesting {}...", input.display());
            let publisher = build_publisher(&config, dry_run)?;
            let report = run_pipeline(&config, Box::new(FileSource::new(input)), publisher)?;
            print_report(&report);
        }
        Commands::History { days } => {
            let days = days.unwrap_or(config.storage.window_days);
            let store = PartitionStore::new(&config.storage.root);
            let records = store
                .load_recent(SystemClock.now(), days)
                .context("Failed to load history")?;

            println!("🗂️  {} incident(s) in the last {} day(s):", records.len(), days);
            for record in &records {
                let date = record
                    .incident_date
                    .map(|d| d.to_string())
                    .unwrap_or_else(|| "unknown date".to_string());
                println!(
                    "   [{}] {} - {}, {}",
                    record.status, date, record.title, record.state
                );
            }
        }
    }

    Ok(())
}
