use anyhow::{Context, Result};
use clap::Parser;
use mimic::model::Metadata;
use mimic::{run_mimic, util, Config, MemoryStore, MimicRequest, RetryingStore};
use serde_json::Value;
use std::fs::{self, OpenOptions};
use std::path::PathBuf;

/// Replay the provenance of bundles on top of substituted inputs
#[derive(Parser, Debug)]
#[command(name = "mimic", version)]
struct Cli {
    /// Store snapshot (JSON) to replay against
    #[arg(long, value_name = "FILE")]
    store: PathBuf,

    /// Bundle to substitute; pair each with a --new-input
    #[arg(long = "old-input", value_name = "ID")]
    old_inputs: Vec<String>,

    /// Replacement for the --old-input at the same position
    #[arg(long = "new-input", value_name = "ID")]
    new_inputs: Vec<String>,

    /// Bundle whose history is replayed
    #[arg(long, value_name = "ID")]
    old_output: Option<String>,

    /// Name for the bundle replacing --old-output
    #[arg(long)]
    name: Option<String>,

    /// Worksheet receiving the new bundles
    #[arg(long, value_name = "ID")]
    worksheet: String,

    /// Levels of ancestors to discover (config default when omitted)
    #[arg(long)]
    depth: Option<u32>,

    /// Insert new bundles right after the bundles they replace
    #[arg(long)]
    shadow: bool,

    /// Print the plan without changing the store
    #[arg(long)]
    dry_run: bool,

    /// Reuse existing bundles with the same command and dependencies
    #[arg(long)]
    memoize: bool,

    /// Do not copy markup and directives above replaced bundles
    #[arg(long)]
    skip_prelude: bool,

    /// Metadata override for every new bundle (repeatable)
    #[arg(long = "metadata", value_name = "KEY=VALUE", value_parser = parse_metadata)]
    metadata: Vec<(String, Value)>,

    /// Data directory for config and logs (defaults to ~/.mimic)
    #[arg(long, value_name = "DIR")]
    data_dir: Option<PathBuf>,
}

/// `key=value`, where a value that parses as JSON is taken as JSON
fn parse_metadata(raw: &str) -> Result<(String, Value), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got `{raw}`"))?;
    if key.is_empty() {
        return Err(format!("empty metadata key in `{raw}`"));
    }
    let value = serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.to_string()));
    Ok((key.to_string(), value))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    util::init_data_dir(cli.data_dir.clone());

    // Initialize logging to file (~/.mimic/logs/mimic.log)
    fs::create_dir_all(util::logs_dir()).context("Failed to create logs directory")?;

    let log_file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(util::log_file_path())
        .context("Failed to open log file")?;

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .with_writer(log_file)
        .with_ansi(false)
        .init();

    let config = Config::load();

    let mut request = MimicRequest::from_defaults(cli.worksheet.clone(), &config.defaults);
    request.old_inputs = cli.old_inputs;
    request.new_inputs = cli.new_inputs;
    request.old_output = cli.old_output;
    request.new_output_name = cli.name;
    request.dry_run = cli.dry_run;
    request.shadow |= cli.shadow;
    request.memoize |= cli.memoize;
    request.skip_prelude |= cli.skip_prelude;
    if let Some(depth) = cli.depth {
        request.depth = depth;
    }
    request.metadata_override = cli.metadata.into_iter().collect::<Metadata>();

    let memory = MemoryStore::load_snapshot(&cli.store)
        .with_context(|| format!("Failed to load store from {}", cli.store.display()))?;
    let store = RetryingStore::new(memory, config.retry);

    let outcome = run_mimic(&store, &request).await?;
    if let Some(placement) = &outcome.placement {
        tracing::info!(
            host = ?placement.host_worksheet,
            placed = placement.placed.len(),
            appended = placement.appended.len(),
            "Worksheet updated"
        );
    }

    println!(
        "{}",
        serde_json::to_string_pretty(&outcome.plan).context("Failed to serialize plan")?
    );

    if !request.dry_run {
        store
            .inner()
            .save_snapshot(&cli.store)
            .with_context(|| format!("Failed to save store to {}", cli.store.display()))?;
    }

    Ok(())
}
