//! zl - zedlog CLI
//!
//! Inspect, convert and replay input logs written by a composite logger.

use anyhow::Result;
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{self, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use zedlog::prelude::*;
use zedlog::recorder::{read_text_log, write_text_log, ReplayState, ReplayStats};

#[derive(Parser)]
#[command(name = "zl")]
#[command(about = "zedlog - inspect, export and replay recorded input logs")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the loggers and entries of a log file
    Show {
        file: PathBuf,
        /// Print every entry, not just the summary
        #[arg(long)]
        all: bool,
        #[arg(long)]
        json: bool,
    },
    /// Export a log file as compact text, one entry per line
    Export {
        file: PathBuf,
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Convert a compact text log back into a log file
    Import {
        file: PathBuf,
        #[arg(short, long)]
        output: PathBuf,
        /// Logger types to list in the new file
        #[arg(long, value_delimiter = ',')]
        loggers: Vec<String>,
    },
    /// Dry-run replay: log every action with its original timing
    Replay {
        file: PathBuf,
        #[arg(short, long, default_value = "1.0")]
        speed: f64,
    },
}

#[derive(Serialize)]
struct Output<T: Serialize> {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<Error>,
}

impl<T: Serialize> Output<T> {
    fn ok(data: T) -> Self {
        Self { success: true, data: Some(data), error: None }
    }
    fn err(e: Error) -> Output<()> {
        Output { success: false, data: None, error: Some(e) }
    }
}

fn print_json<T: Serialize>(output: &T) {
    match serde_json::to_string_pretty(output) {
        Ok(json) => println!("{}", json),
        Err(e) => eprintln!("Error: {}", e),
    }
}

#[derive(Serialize)]
struct LogSummary {
    file: PathBuf,
    loggers: Vec<String>,
    counts: BTreeMap<String, usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    entries: Option<Vec<LogEntry>>,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();

    let result: Result<(), anyhow::Error> = match cli.command {
        Commands::Show { file, all, json } => {
            if json {
                with_json_errors(move || show_json(&file, all))
            } else {
                show(&file, all)
            }
        }
        Commands::Export { file, output } => export(&file, output.as_deref()),
        Commands::Import { file, output, loggers } => import(&file, &output, loggers),
        Commands::Replay { file, speed } => replay(&file, speed),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn with_json_errors<F>(f: F) -> Result<(), anyhow::Error>
where
    F: FnOnce() -> Result<(), anyhow::Error>,
{
    match f() {
        Ok(()) => Ok(()),
        Err(e) => {
            if let Some(err) = e.downcast_ref::<Error>() {
                print_json(&Output::<()>::err(err.clone()));
            }
            Err(e)
        }
    }
}

/// Rebuild a composite from `file`, with a fresh logger per recorded type.
fn load(file: &Path) -> Result<Arc<CompositeDataLogger>> {
    let composite = CompositeDataLogger::new();
    composite.open_log_file(file, &LoggerRegistry::with_standard_sources())?;
    Ok(composite)
}

fn kind_counts(entries: &[LogEntry]) -> BTreeMap<String, usize> {
    let mut counts = BTreeMap::new();
    for entry in entries {
        *counts.entry(entry.event.kind().to_string()).or_insert(0) += 1;
    }
    counts
}

fn logger_tags(composite: &CompositeDataLogger) -> Vec<String> {
    composite
        .loggers()
        .iter()
        .map(|l| l.type_tag().to_string())
        .collect()
}

fn show(file: &Path, all: bool) -> Result<()> {
    let composite = load(file)?;
    let entries = composite.log_entries();
    println!("File: {}", file.display());
    println!("Loggers: {}", logger_tags(&composite).join(", "));
    println!("Entries: {}", entries.len());
    if let (Some(first), Some(last)) = (entries.first(), entries.last()) {
        println!("Span: {} ms", last.timestamp - first.timestamp);
    }
    let summary: Vec<String> = kind_counts(&entries)
        .into_iter()
        .map(|(kind, n)| format!("{} {}", n, kind))
        .collect();
    println!("\nSummary: {}", summary.join(", "));
    if all {
        println!("\n{}", composite);
    }
    Ok(())
}

fn show_json(file: &Path, all: bool) -> Result<()> {
    let composite = load(file)?;
    let entries = composite.log_entries();
    let summary = LogSummary {
        file: file.to_path_buf(),
        loggers: logger_tags(&composite),
        counts: kind_counts(&entries),
        entries: all.then_some(entries),
    };
    print_json(&Output::ok(summary));
    Ok(())
}

fn export(file: &Path, output: Option<&Path>) -> Result<()> {
    let doc = LogDocument::read_from(file)?;
    let count = match output {
        Some(path) => write_text_log(&doc.entries, BufWriter::new(File::create(path)?))?,
        None => write_text_log(&doc.entries, io::stdout().lock())?,
    };
    if let Some(path) = output {
        println!("Exported {} entries to {}", count, path.display());
    }
    Ok(())
}

fn import(file: &Path, output: &Path, loggers: Vec<String>) -> Result<()> {
    let entries = read_text_log(BufReader::new(File::open(file)?))?;
    let doc = LogDocument { loggers, entries };
    doc.write_to(output)?;
    println!("Imported {} entries into {}", doc.entries.len(), output.display());
    Ok(())
}

fn replay(file: &Path, speed: f64) -> Result<()> {
    let composite = load(file)?;
    let tool = ReplayTool::from_logger(&composite)
        .with_config(ReplayConfig::default().speed(speed));

    let stop = tool.stop_handle();
    ctrlc::set_handler(move || stop.stop())?;

    println!(
        "Replaying {} ({} entries) at {}x speed (Ctrl+C to stop)",
        file.display(),
        tool.entries().len(),
        speed
    );
    let stats = tool.run(&mut LoggingActuator)?;
    print_stats(&stats, tool.state());
    io::stdout().flush()?;
    Ok(())
}

fn print_stats(stats: &ReplayStats, state: ReplayState) {
    println!(
        "{:?}: {} keys, {} moves, {} drags, {} clicks, {} presses, {} scrolls, {} skipped",
        state,
        stats.keys,
        stats.moves,
        stats.drags,
        stats.clicks,
        stats.presses,
        stats.scrolls,
        stats.skipped
    );
}
