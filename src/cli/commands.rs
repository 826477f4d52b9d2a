use crate::config::SyncConfig;
use crate::error::{SyncError, SyncResult};
use crate::ingest::{self, ingest_csv, ColumnClassifier, CommandClassifier};
use crate::sheets::{self, tokenize, HttpFetcher};
use crate::store::MemoryStore;
use crate::sync::{parse_sheet_payload, SheetStatus, SyncPipeline, SyncReport};
use crate::types::{KpiField, KpiSnapshot, SheetReference};
use colored::Colorize;
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

/// How snapshots are printed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum OutputFormat {
    #[default]
    Table,
    Json,
    Yaml,
}

/// Options for the sync command, after clap parsing
#[derive(Debug, Clone, Default)]
pub struct SyncArgs {
    pub config: Option<PathBuf>,
    pub sheets: Vec<String>,
    pub sheets_json: Option<String>,
    pub tab: Option<String>,
    pub company: Option<String>,
    pub store: Option<PathBuf>,
    pub classifier: Option<String>,
    pub format: OutputFormat,
}

/// Format a number for display, removing unnecessary decimal places
fn format_number(n: f64) -> String {
    let rounded = (n * 1e6).round() / 1e6;
    format!("{:.6}", rounded)
        .trim_end_matches('0')
        .trim_end_matches('.')
        .to_string()
}

fn format_cell(value: Option<f64>) -> String {
    value.map(format_number).unwrap_or_else(|| "-".to_string())
}

/// Render snapshots in the requested format
fn render_snapshots(snapshots: &[KpiSnapshot], format: OutputFormat) -> SyncResult<String> {
    match format {
        OutputFormat::Json => Ok(serde_json::to_string_pretty(snapshots)?),
        OutputFormat::Yaml => Ok(serde_yaml::to_string(snapshots)?),
        OutputFormat::Table => {
            let mut out = format!("{:<12}", "period");
            for field in KpiField::ALL {
                out.push_str(&format!(" {:>14}", field.as_str()));
            }
            out.push('\n');
            for snapshot in snapshots {
                out.push_str(&format!("{:<12}", snapshot.period_date));
                for field in KpiField::ALL {
                    out.push_str(&format!(" {:>14}", format_cell(snapshot.get(field))));
                }
                out.push('\n');
            }
            Ok(out)
        }
    }
}

fn read_csv(file: &PathBuf) -> SyncResult<String> {
    fs::read_to_string(file).map_err(|e| {
        SyncError::Config(format!("Failed to read '{}': {}", file.display(), e))
    })
}

/// Execute the resolve command
pub fn resolve(url: String, tab: Option<String>) -> SyncResult<()> {
    let endpoint = sheets::resolve(&url, tab.as_deref())?;
    println!("{}", endpoint);
    Ok(())
}

/// Execute the classify command - show the role of every header column
pub fn classify(file: PathBuf, classifier: Option<String>) -> SyncResult<()> {
    println!("{}", "🔎 kpisync - Header classification".bold().green());
    println!("   File: {}\n", file.display());

    let content = read_csv(&file)?;
    let rows = tokenize(&content);
    let Some(header) = rows.first() else {
        println!("{}", "⚠️  No header row found".yellow());
        return Ok(());
    };

    let oracle = classifier
        .as_deref()
        .and_then(|c| CommandClassifier::from_command_line(c, Duration::from_secs(10)));
    let classification = ingest::classify_with(
        header,
        oracle.as_ref().map(|o| o as &dyn ColumnClassifier),
    );

    for (index, name) in header.iter().enumerate() {
        let role = classification.role(index).to_string();
        let role = if role == "-" {
            role.dimmed()
        } else {
            role.bright_blue().bold()
        };
        println!("   {:>3}  {:<32} {}", index, name.trim(), role);
    }

    if !classification.has_kpi_columns() {
        println!("\n{}", "⚠️  No KPI columns recognized".yellow());
    }
    Ok(())
}

/// Execute the parse command - ingest a local CSV without network access
pub fn parse(file: PathBuf, format: OutputFormat, verbose: bool) -> SyncResult<()> {
    let content = read_csv(&file)?;
    let ingest = ingest_csv(&content, None, if verbose { usize::MAX } else { 0 })
        .map_err(|reason| {
            SyncError::Config(format!("{}: {}", file.display(), reason))
        })?;

    let snapshots = ingest::merge(ingest.snapshots);

    if format == OutputFormat::Table {
        println!("{}", "📊 kpisync - Parsed snapshots".bold().green());
        println!("   File: {}", file.display());
        println!(
            "   {} snapshot(s), {} row(s) discarded\n",
            snapshots.len(),
            ingest.rows_discarded
        );
    }
    print!("{}", render_snapshots(&snapshots, format)?);
    Ok(())
}

/// Combine config file, flags and sheet payloads into one configuration
fn build_config(args: &SyncArgs) -> SyncResult<SyncConfig> {
    let mut config = match &args.config {
        Some(path) => SyncConfig::load(path)?,
        None => SyncConfig::default(),
    };

    let mut sheets: Vec<SheetReference> = Vec::new();
    if let Some(json) = &args.sheets_json {
        sheets.extend(parse_sheet_payload(json, None)?);
    }
    for url in &args.sheets {
        sheets.extend(parse_sheet_payload(url, args.tab.as_deref())?);
    }
    if !sheets.is_empty() {
        config.sheets = sheets;
    }

    if let Some(company) = &args.company {
        config.company_id = Some(company.clone());
    }
    if let Some(command) = &args.classifier {
        config.classifier_command =
            Some(command.split_whitespace().map(str::to_string).collect());
    }

    config.validate()?;
    Ok(config)
}

fn print_report(report: &SyncReport) {
    for outcome in &report.sheets {
        match &outcome.status {
            SheetStatus::Processed {
                snapshots,
                rows_discarded,
            } => println!(
                "   {} {} ({} snapshot(s), {} row(s) discarded)",
                "✅".green(),
                outcome.url,
                snapshots,
                rows_discarded
            ),
            SheetStatus::Skipped { reason } => println!(
                "   {} {} skipped: {}",
                "⚠️".yellow(),
                outcome.url,
                reason
            ),
        }
    }
    println!();
}

/// Execute the sync command - fetch, merge and optionally store
pub fn sync(args: SyncArgs) -> SyncResult<()> {
    let config = build_config(&args)?;

    if args.format == OutputFormat::Table {
        println!("{}", "🔄 kpisync - Syncing KPI sheets".bold().green());
        println!("   Sheets: {}\n", config.sheets.len());
    }

    let mut pipeline = SyncPipeline::new(HttpFetcher::new(&config.user_agent)?)
        .with_sample_rows(config.debug_sample_rows);
    if let Some(classifier) = config.classifier() {
        pipeline = pipeline.with_classifier(Box::new(classifier));
    }

    let report = match (&args.store, &config.company_id) {
        (Some(path), Some(company)) => {
            let mut store = MemoryStore::load(path)?;
            let report = pipeline.sync_company(company, &config.sheets, &mut store)?;
            store.save(path)?;
            report
        }
        (Some(_), None) => {
            return Err(SyncError::Config(
                "--store requires a company id (--company or company_id)".to_string(),
            ))
        }
        (None, _) => pipeline.run(&config.sheets)?,
    };

    if args.format == OutputFormat::Table {
        print_report(&report);
    }
    print!("{}", render_snapshots(&report.snapshots, args.format)?);

    if args.format == OutputFormat::Table {
        if let Some(latest) = &report.latest {
            println!("\n   Latest period: {}", latest.period_date.bright_blue().bold());
        }
        if let (Some(path), Some(company)) = (&args.store, &config.company_id) {
            println!("   Stored for {} in {}", company.bold(), path.display());
        }
    }
    Ok(())
}

#[cfg(test)]
#[path = "commands_tests.rs"]
mod tests;
