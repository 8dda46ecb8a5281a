use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use gleaner_client::HttpCatalogClient;
use gleaner_core::{
    CheckpointWriter, DatasetStats, HarvestConfig, HarvestSummary, Harvester, TermCatalog,
    TracingHarvestReporter,
};

#[derive(Parser)]
#[command(name = "gleaner", version, about = "Resumable catalog metadata harvester")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Harvest records until the target is met, resuming from the checkpoint
    Harvest {
        /// Checkpoint file (created if missing, resumed if present)
        #[arg(short, long, env = "GLEANER_CHECKPOINT", default_value = "songs.csv")]
        output: PathBuf,

        /// API client id
        #[arg(long, env = "GLEANER_CLIENT_ID")]
        client_id: String,

        /// API client secret
        #[arg(long, env = "GLEANER_CLIENT_SECRET", hide_env_values = true)]
        client_secret: String,

        /// Catalog API base URL
        #[arg(long, env = "GLEANER_API_BASE", default_value = "https://api.spotify.com/v1")]
        api_base: String,

        /// Market code sent with every request
        #[arg(long, env = "GLEANER_MARKET", default_value = "US")]
        market: String,

        /// Total records to accumulate (overrides GLEANER_TARGET)
        #[arg(short, long)]
        target: Option<usize>,

        /// Page size for search and collection requests
        #[arg(long)]
        page_size: Option<usize>,

        /// Offset ceiling per query
        #[arg(long)]
        max_offset: Option<usize>,

        /// Milliseconds between successive requests
        #[arg(long)]
        pacing_ms: Option<u64>,

        /// Skip the first N search terms (see `gleaner terms`)
        #[arg(long)]
        skip_terms: Option<usize>,

        /// File with one catalog id per line for direct batch lookup
        #[arg(long)]
        batch_ids: Option<PathBuf>,

        /// Print the summary as JSON
        #[arg(long, default_value_t = false)]
        json: bool,
    },

    /// Show totals and breakdowns of an existing checkpoint
    Stats {
        /// Checkpoint file
        #[arg(short, long, env = "GLEANER_CHECKPOINT", default_value = "songs.csv")]
        output: PathBuf,

        /// Number of categories to list
        #[arg(long, default_value_t = 10)]
        top: usize,

        /// Print the stats as JSON
        #[arg(long, default_value_t = false)]
        json: bool,
    },

    /// List the search term sequence with indices
    Terms,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("gleaner=info".parse()?))
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Harvest {
            output,
            client_id,
            client_secret,
            api_base,
            market,
            target,
            page_size,
            max_offset,
            pacing_ms,
            skip_terms,
            batch_ids,
            json,
        } => {
            let mut config = HarvestConfig::from_env().map_err(|e| anyhow::anyhow!(e))?;
            if let Some(target) = target {
                config.target = target;
            }
            if let Some(page_size) = page_size {
                config.page_size = page_size;
            }
            if let Some(max_offset) = max_offset {
                config.max_offset = max_offset;
            }
            if let Some(ms) = pacing_ms {
                config.pacing.delay = Duration::from_millis(ms);
            }
            if let Some(skip) = skip_terms {
                config.skip_terms = skip;
            }

            let ids = match batch_ids {
                Some(path) => read_batch_ids(&path)?,
                None => Vec::new(),
            };

            let client = HttpCatalogClient::new(&client_id, &client_secret)
                .map_err(|e| anyhow::anyhow!(e))?
                .with_api_base(&api_base)
                .with_market(market);

            let summary = cmd_harvest(client, &output, config, ids).await?;
            print_summary(&summary, json)?;
        }
        Commands::Stats { output, top, json } => {
            cmd_stats(&output, top, json)?;
        }
        Commands::Terms => {
            cmd_terms();
        }
    }

    Ok(())
}

async fn cmd_harvest(
    client: HttpCatalogClient,
    output: &Path,
    config: HarvestConfig,
    batch_ids: Vec<String>,
) -> Result<HarvestSummary> {
    let cancel = CancellationToken::new();
    let signal_token = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupt received, saving progress and stopping");
            signal_token.cancel();
        }
    });

    let harvester = Harvester::new(client, CheckpointWriter::new(output), config)
        .with_batch_ids(batch_ids);

    harvester
        .run(cancel, &TracingHarvestReporter)
        .await
        .map_err(|e| anyhow::anyhow!(e))
        .with_context(|| format!("Harvest into {} failed", output.display()))
}

/// One id per line; blank lines and `#` comments are ignored.
fn read_batch_ids(path: &Path) -> Result<Vec<String>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read batch id file: {}", path.display()))?;
    Ok(parse_batch_ids(&raw))
}

fn parse_batch_ids(raw: &str) -> Vec<String> {
    raw.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string)
        .collect()
}

fn print_summary(summary: &HarvestSummary, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(summary)?);
        return Ok(());
    }

    let elapsed = summary.finished_at - summary.started_at;
    println!("Run:        {}", summary.run_id);
    println!(
        "Records:    {} / {} ({} resumed, {} new)",
        summary.total_records, summary.target, summary.resumed_records, summary.new_records
    );
    println!("Checkpoints: {}", summary.checkpoints_written);
    println!("Elapsed:    {}s", elapsed.num_seconds());
    for (strategy, count) in &summary.per_strategy {
        println!("  {:<12} {count}", strategy.as_str());
    }
    if !summary.aborted_strategies.is_empty() {
        let names: Vec<&str> = summary
            .aborted_strategies
            .iter()
            .map(|s| s.as_str())
            .collect();
        println!("Aborted:    {}", names.join(", "));
    }
    if summary.cancelled {
        println!("Interrupted; rerun the same command to resume.");
    } else if !summary.target_reached() {
        println!("All strategies exhausted before reaching the target.");
    }
    Ok(())
}

fn cmd_stats(output: &Path, top: usize, json: bool) -> Result<()> {
    if !output.exists() {
        anyhow::bail!("No checkpoint at {}", output.display());
    }
    let checkpoint = CheckpointWriter::new(output)
        .load()
        .map_err(|e| anyhow::anyhow!(e))
        .with_context(|| format!("Failed to load checkpoint: {}", output.display()))?;
    let stats = DatasetStats::from_records(&checkpoint.records);

    if json {
        println!("{}", serde_json::to_string_pretty(&stats)?);
        return Ok(());
    }

    println!("Records:      {}", stats.total_records);
    println!("Attributions: {}", stats.distinct_attributions);
    println!("By strategy:");
    for (strategy, count) in &stats.per_strategy {
        println!("  {:<12} {count}", strategy.as_str());
    }
    println!("Top categories:");
    for (category, count) in stats.top_categories(top) {
        println!("  {category:<24} {count}");
    }
    Ok(())
}

fn cmd_terms() {
    for (index, term) in TermCatalog::default().terms().enumerate() {
        println!("{index:>4}  {:<12} {}", term.kind_name(), term.query());
    }
}
