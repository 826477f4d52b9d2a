use clap::{Parser, Subcommand};
use kpisync::cli::{self, OutputFormat, SyncArgs};
use kpisync::error::SyncResult;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "kpisync")]
#[command(about = "Sync startup KPIs from Google Sheets into a monthly time series.")]
#[command(long_about = "kpisync - Google Sheets KPI ingestion

Fetches spreadsheet tabs as CSV, maps free-form headers (\"ARR USD\",
\"Churn %\", \"Måned\") onto nine fixed KPIs, normalizes currency, percent
and accounting formats, and merges several sheets into one snapshot per month.

COMMANDS:
  resolve   - Print the CSV export URL for a sheet link
  classify  - Show how each header column of a CSV is understood
  parse     - Parse a local CSV file into monthly snapshots
  sync      - Fetch live sheets, merge, and optionally store

EXAMPLES:
  kpisync resolve https://docs.google.com/spreadsheets/d/abc/edit --tab KPIs
  kpisync parse kpis.csv --format json
  kpisync sync --sheet https://docs.google.com/spreadsheets/d/abc/edit --tab 0
  kpisync sync --config kpisync.yaml --store kpis.json")]
#[command(version)]
struct Cli {
    /// Enable debug logging (also KPISYNC_LOG=debug)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the CSV export URL for a spreadsheet link
    Resolve {
        /// Spreadsheet URL (must contain /spreadsheets/d/<id>)
        url: String,

        /// Tab name or numeric gid
        #[arg(short, long)]
        tab: Option<String>,
    },

    /// Show the role of every header column in a CSV file
    Classify {
        /// Path to CSV file
        file: PathBuf,

        /// External header classifier command (receives headers as JSON on stdin)
        #[arg(long, env = "KPISYNC_CLASSIFIER")]
        classifier: Option<String>,
    },

    /// Parse a local CSV file into monthly snapshots (no network)
    Parse {
        /// Path to CSV file
        file: PathBuf,

        /// Output format
        #[arg(short, long, value_enum, default_value_t = OutputFormat::Table)]
        format: OutputFormat,
    },

    #[command(long_about = "Fetch sheets, merge snapshots and optionally store them.

Sheets are processed in order. For churn, growth and runway the last sheet
with a value wins; every other KPI is summed across sheets for the same month.
Sheets that fail to fetch or contain no KPI columns are skipped with a
warning. The run fails only if no sheet produced a snapshot.

SHEET SOURCES (later sources replace earlier ones):
  --config kpisync.yaml                 sheets: [{url, tab}, ...]
  --sheets '[{\"url\": \"...\", \"tab\": \"0\"}]'
  --sheet URL [--tab TAB]               repeatable; --tab applies to each

STORE:
  --store kpis.json --company acme      upsert by (company, month) and
                                        refresh the current KPI record")]
    /// Fetch live sheets, merge, and optionally store
    Sync {
        /// YAML configuration file
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Spreadsheet URL (repeatable)
        #[arg(long = "sheet")]
        sheets: Vec<String>,

        /// JSON array of {url, tab} objects
        #[arg(long = "sheets")]
        sheets_json: Option<String>,

        /// Tab name or numeric gid for --sheet URLs
        #[arg(short, long)]
        tab: Option<String>,

        /// Company identifier used as the store key
        #[arg(long, env = "KPISYNC_COMPANY")]
        company: Option<String>,

        /// JSON file acting as the snapshot store
        #[arg(long)]
        store: Option<PathBuf>,

        /// External header classifier command
        #[arg(long, env = "KPISYNC_CLASSIFIER")]
        classifier: Option<String>,

        /// Output format
        #[arg(short, long, value_enum, default_value_t = OutputFormat::Table)]
        format: OutputFormat,
    },
}

fn init_logging(verbose: bool) {
    let default = if verbose { "kpisync=debug" } else { "kpisync=warn" };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_env("KPISYNC_LOG")
                .unwrap_or_else(|_| default.into()),
        )
        .init();
}

fn main() -> SyncResult<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Commands::Resolve { url, tab } => cli::resolve(url, tab),

        Commands::Classify { file, classifier } => cli::classify(file, classifier),

        Commands::Parse { file, format } => cli::parse(file, format, cli.verbose),

        Commands::Sync {
            config,
            sheets,
            sheets_json,
            tab,
            company,
            store,
            classifier,
            format,
        } => cli::sync(SyncArgs {
            config,
            sheets,
            sheets_json,
            tab,
            company,
            store,
            classifier,
            format,
        }),
    }
}
