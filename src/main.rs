use analyzer::{Analyzer, ReanalysisSummary, Reanalyzer};
use anyhow::Context;
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use configuration::{init_tracing, load_config_from, Config, LogFormat};
use core_types::{AnalysisResult, DailyRecord};
use database::{connect, run_migrations, DbRepository, MemoryStore, RecordStore};
use indicatif::{ProgressBar, ProgressStyle};
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

/// The main entry point for the MAG analysis application.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // A missing .env file is fine; the database settings may come from config.toml.
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    let mut config = load_config_from(&cli.config)
        .with_context(|| format!("Failed to load configuration from {}", cli.config.display()))?;
    if let Some(format) = cli.log_format {
        config.logging.format = format;
    }
    let _log_guard = init_tracing(&config.logging)?;

    if let Commands::ShowConfig = cli.command {
        println!("{}", serde_json::to_string_pretty(&config)?);
        return Ok(());
    }

    let store = open_store(&cli, &config).await?;
    let analyzer = Analyzer::new(config.analysis.clone());

    match cli.command {
        Commands::Import(args) => handle_import(args, store.as_ref()).await,
        Commands::Analyze(args) => handle_analyze(args, &analyzer, store.as_ref()).await,
        Commands::Reanalyze(args) => handle_reanalyze(args, &analyzer, store.as_ref()).await,
        Commands::ShowConfig => Ok(()),
    }
}

// ==============================================================================
// CLI Structure
// ==============================================================================

/// Key-node detection and quality rating for assets moving through entry and exit cycles.
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the configuration file. Missing files fall back to defaults.
    #[arg(long, global = true, default_value = "config.toml")]
    config: PathBuf,

    /// Overrides `logging.format` from the configuration.
    #[arg(long, global = true, value_enum)]
    log_format: Option<LogFormat>,

    /// Work against an in-memory store instead of PostgreSQL. Nothing is persisted.
    #[arg(long, global = true)]
    memory: bool,

    /// JSON array of daily records to load into the in-memory store first.
    #[arg(long, global = true, requires = "memory")]
    seed: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate and store daily records from a JSON file.
    Import(ImportArgs),
    /// Analyse a single asset on a single day.
    Analyze(AnalyzeArgs),
    /// Delete and rebuild the analysis for a date range.
    Reanalyze(ReanalyzeArgs),
    /// Print the effective configuration.
    ShowConfig,
}

#[derive(Parser)]
struct ImportArgs {
    /// A JSON array of daily records.
    file: PathBuf,
}

#[derive(Parser)]
struct AnalyzeArgs {
    #[arg(long)]
    asset: String,

    /// The day to analyse (format: YYYY-MM-DD).
    #[arg(long)]
    date: NaiveDate,
}

#[derive(Parser)]
struct ReanalyzeArgs {
    /// First day of the range (format: YYYY-MM-DD).
    #[arg(long)]
    from: NaiveDate,

    /// Last day of the range. Defaults to `--from`.
    #[arg(long)]
    to: Option<NaiveDate>,

    /// Restrict the rebuild to these assets. Repeatable.
    #[arg(long = "asset")]
    assets: Vec<String>,

    /// Print every key node found, not just the summary.
    #[arg(long)]
    verbose: bool,
}

// ==============================================================================
// Store Setup
// ==============================================================================

async fn open_store(cli: &Cli, config: &Config) -> anyhow::Result<Box<dyn RecordStore>> {
    if cli.memory {
        let records = match &cli.seed {
            Some(path) => read_records(path)?,
            None => Vec::new(),
        };
        tracing::info!(records = records.len(), "Using in-memory store.");
        return Ok(Box::new(MemoryStore::from_records(records)));
    }

    let pool = connect(&config.database)
        .await
        .context("Failed to connect to the database")?;
    run_migrations(&pool)
        .await
        .context("Failed to run database migrations")?;
    Ok(Box::new(DbRepository::new(pool)))
}

/// Reads and validates a JSON array of daily records.
fn read_records(path: &Path) -> anyhow::Result<Vec<DailyRecord>> {
    let file = File::open(path).with_context(|| format!("Cannot open {}", path.display()))?;
    let records: Vec<DailyRecord> = serde_json::from_reader(BufReader::new(file))
        .with_context(|| format!("{} is not a JSON array of daily records", path.display()))?;
    for record in &records {
        record.validate()?;
    }
    Ok(records)
}

fn progress_bar(len: u64) -> anyhow::Result<ProgressBar> {
    let bar = ProgressBar::new(len);
    bar.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta}) {msg}")?
            .progress_chars("#>-"),
    );
    Ok(bar)
}

// ==============================================================================
// Command Handlers
// ==============================================================================

async fn handle_import(args: ImportArgs, store: &dyn RecordStore) -> anyhow::Result<()> {
    let records = read_records(&args.file)?;
    let bar = progress_bar(records.len() as u64)?;

    for record in &records {
        bar.set_message(format!("{} {}", record.asset, record.date));
        store.upsert_record(record).await?;
        bar.inc(1);
    }

    bar.finish_with_message("Import complete!");
    println!("Imported {} records from {}.", records.len(), args.file.display());
    Ok(())
}

async fn handle_analyze(args: AnalyzeArgs, analyzer: &Analyzer, store: &dyn RecordStore) -> anyhow::Result<()> {
    match analyzer.analyze(store, &args.asset, args.date).await? {
        Some(result) => {
            println!("{}", result_detail_table(&result));
            let passes = analyzer.chain_passes(store, &args.asset, args.date).await?;
            println!("Benchmark chain: {}", if passes { "pass" } else { "fail" });
        }
        None => println!("{} on {} is not an analysable key node.", args.asset, args.date),
    }
    Ok(())
}

async fn handle_reanalyze(args: ReanalyzeArgs, analyzer: &Analyzer, store: &dyn RecordStore) -> anyhow::Result<()> {
    let end = args.to.unwrap_or(args.from);
    let assets = (!args.assets.is_empty()).then_some(args.assets.as_slice());

    let bar = progress_bar(0)?;
    let bar_handle = bar.clone();
    let summary = Reanalyzer::new(analyzer, store)
        .with_progress(move |done, total| {
            bar_handle.set_length(total as u64);
            bar_handle.set_position(done as u64);
        })
        .run(args.from, end, assets)
        .await?;
    bar.finish_with_message("Reanalysis complete!");

    println!("{}", summary_table(&summary));
    if args.verbose && !summary.results.is_empty() {
        println!("{}", results_table(&summary.results));
    }
    Ok(())
}

// ==============================================================================
// Output Tables
// ==============================================================================

fn new_table() -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic);
    table
}

fn summary_table(summary: &ReanalysisSummary) -> Table {
    let mut table = new_table();
    table.set_header(vec!["Run", "Range", "Results deleted", "Special nodes deleted", "Records", "Key nodes"]);
    table.add_row(vec![
        summary.run_id.to_string(),
        format!("{} .. {}", summary.start, summary.end),
        summary.results_deleted.to_string(),
        summary.special_nodes_deleted.to_string(),
        summary.records_visited.to_string(),
        summary.results.len().to_string(),
    ]);
    table
}

fn results_table(results: &[AnalysisResult]) -> Table {
    let mut table = new_table();
    table.set_header(vec![
        "Date", "Asset", "Node", "Reference", "Current", "Change %", "Corrections", "Final %", "Quality", "Section",
    ]);
    for r in results {
        table.add_row(vec![
            r.date.to_string(),
            r.asset.clone(),
            r.node_type.to_string(),
            format!("{} @ {}", r.reference.offchain_index, r.reference.date),
            r.current_offchain_index.to_string(),
            r.change_pct.round_dp(2).to_string(),
            r.total_correction().round_dp(2).to_string(),
            r.final_pct.round_dp(2).to_string(),
            r.quality.to_string(),
            r.section.number.to_string(),
        ]);
    }
    table
}

fn result_detail_table(r: &AnalysisResult) -> Table {
    let divergence = if r.divergence_details.is_empty() {
        "none".to_string()
    } else {
        r.divergence_details
            .iter()
            .map(|(asset, entry)| format!("{asset} ({}) {}", entry.phase, entry.weight))
            .collect::<Vec<_>>()
            .join(", ")
    };

    let mut table = new_table();
    table.set_header(vec!["Field", "Value"]);
    let rows = [
        ("Asset", format!("{} on {}", r.asset, r.date)),
        ("Key node", format!("{} ({})", r.node_type, r.phase)),
        (
            "Reference",
            format!("{} on {} = {}", r.reference.node_type, r.reference.date, r.reference.offchain_index),
        ),
        ("Current index", r.current_offchain_index.to_string()),
        ("Base change %", r.change_pct.round_dp(2).to_string()),
        ("Phase correction", r.phase_correction.to_string()),
        ("Divergence correction", format!("{} [{divergence}]", r.divergence_correction)),
        ("Break index correction", r.break_index_correction.to_string()),
        ("Approaching correction", r.approaching_correction.to_string()),
        ("Final %", r.final_pct.round_dp(2).to_string()),
        ("Quality", r.quality.to_string()),
        (
            "Section",
            format!("{} ({}%)", r.section.description, r.section.change_pct.round_dp(2)),
        ),
    ];
    for (field, value) in rows {
        table.add_row(vec![field.to_string(), value]);
    }
    table
}
