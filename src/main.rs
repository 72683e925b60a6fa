use std::path::{Path, PathBuf};

use budget_ingest::config::ImportConfig;
use budget_ingest::import::{self, ImportRequest};
use budget_ingest::{IngestError, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

fn main() {
    let cli = Cli::parse();
    if let Err(error) = init_logging().and_then(|()| run(cli)) {
        eprintln!("error: {error}");
        std::process::exit(1);
    }
}

fn init_logging() -> Result<()> {
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .map_err(|error| IngestError::Logging(error.to_string()))
}

fn run(cli: Cli) -> Result<()> {
    let config = match &cli.config {
        Some(path) => ImportConfig::load(path)?,
        None => ImportConfig::default(),
    };

    match cli.command {
        Command::Import(args) => execute_import(args, config),
        Command::Chart(args) => {
            require_input(&args.input)?;
            let stats = import::import_chart(&args.input, &args.sheet, &args.output, &config.chart)?;
            println!(
                "{} accounts written ({} rows without id, {} without code)",
                stats.entries, stats.missing_id, stats.unusable_flags
            );
            Ok(())
        }
        Command::Registry(args) => {
            require_input(&args.input)?;
            let stats =
                import::import_registry(&args.input, &args.sheet, &args.output, &config.registry)?;
            println!(
                "{} products written from {} rows ({} repeated headers)",
                stats.accepted, stats.rows_seen, stats.restated_headers
            );
            Ok(())
        }
        Command::Financial(args) => {
            require_input(&args.input)?;
            let sheet = args.sheet.as_deref().unwrap_or(&config.financial.sheet);
            let stats = import::import_financial(&args.input, sheet, &args.output, &config.financial)?;
            println!(
                "{} accounts written from {} rows ({} skipped)",
                stats.records, stats.rows_seen, stats.noise_rows
            );
            Ok(())
        }
    }
}

fn execute_import(args: ImportArgs, mut config: ImportConfig) -> Result<()> {
    require_input(&args.input)?;
    if let Some(year) = args.year {
        config.year = year;
    }

    let request = ImportRequest {
        input: args.input,
        ledger: args.ledger,
        records: args.records,
        export: args.export,
        sheets: args.sheets,
    };
    let summary = import::import_workbook(&request, &config)?;

    for sheet in &summary.sheets {
        println!(
            "{}: {} rows, {} records, {} facts ({} codes dropped)",
            sheet.sheet, sheet.stats.rows_seen, sheet.stats.records, sheet.facts, sheet.stats.codes_dropped
        );
    }
    println!(
        "{} facts appended, ids {}..{}",
        summary.facts(),
        summary.start_id,
        summary.next_id
    );
    Ok(())
}

fn require_input(path: &Path) -> Result<()> {
    if path.exists() {
        Ok(())
    } else {
        Err(IngestError::MissingInput(path.to_path_buf()))
    }
}

#[derive(Parser)]
#[command(
    author,
    version,
    about = "Load budget, chart-of-accounts and revenue registry workbooks."
)]
struct Cli {
    /// JSON configuration overriding the built-in defaults.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Turn grouped budget sheets into monthly facts appended to a ledger.
    Import(ImportArgs),
    /// Read a chart-of-accounts sheet.
    Chart(SheetArgs),
    /// Read a revenue registry sheet.
    Registry(SheetArgs),
    /// Read the financial budget sheet.
    Financial(FinancialArgs),
}

#[derive(clap::Args)]
struct ImportArgs {
    /// Budget workbook.
    #[arg(long)]
    input: PathBuf,

    /// JSON lines fact ledger to continue.
    #[arg(long)]
    ledger: PathBuf,

    /// Also write the wide records as JSON lines.
    #[arg(long)]
    records: Option<PathBuf>,

    /// Also export this run's facts to a workbook.
    #[arg(long)]
    export: Option<PathBuf>,

    /// Budget year stamped on the facts.
    #[arg(long)]
    year: Option<i32>,

    /// Sheet to import. Repeat for several; defaults to every configured sheet.
    #[arg(long = "sheet")]
    sheets: Vec<String>,
}

#[derive(clap::Args)]
struct SheetArgs {
    /// Source workbook.
    #[arg(long)]
    input: PathBuf,

    /// Sheet name, or part of it.
    #[arg(long)]
    sheet: String,

    /// JSON lines output file.
    #[arg(long)]
    output: PathBuf,
}

#[derive(clap::Args)]
struct FinancialArgs {
    /// Financial budget workbook.
    #[arg(long)]
    input: PathBuf,

    /// Sheet name, or part of it. Defaults to the configured sheet.
    #[arg(long)]
    sheet: Option<String>,

    /// JSON lines output file.
    #[arg(long)]
    output: PathBuf,
}
