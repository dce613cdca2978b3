pub mod anomaly;
pub mod cli;
pub mod concentration;
pub mod config;
pub mod data;
pub mod dataset;
pub mod error;
pub mod frequency;
pub mod inference;
pub mod insights;
pub mod io_utils;
pub mod journal;
pub mod normalize;
pub mod report;
pub mod stats;
pub mod storage;
pub mod table;

use std::{
    env,
    fs::File,
    io::{self, BufWriter, Write},
    path::{Path, PathBuf},
    sync::{Arc, OnceLock},
};

use anyhow::{Context, Result};
use clap::Parser;
use log::{LevelFilter, debug, info};

use crate::{
    cli::{AnalyzeArgs, Cli, Commands, HistoryArgs, InputArgs, ListArgs, NormalizeArgs},
    config::ProfilerConfig,
    dataset::Table,
    journal::{EntryKind, JsonLinesJournal, NullJournal, TransformationLog},
    normalize::Normalizer,
    report::Profiler,
    storage::{BlobStore, FsBlobStore},
    table::TextTable,
};

static LOGGER: OnceLock<()> = OnceLock::new();

fn init_logging() {
    LOGGER.get_or_init(|| {
        let mut builder = env_logger::Builder::from_env(env_logger::Env::default());
        if env::var("RUST_LOG").is_err() {
            builder.filter_module("csv_profiler", LevelFilter::Info);
        }
        let _ = builder.format_timestamp_millis().try_init();
    });
}

pub fn run() -> Result<()> {
    init_logging();
    let cli = Cli::parse();
    let config = ProfilerConfig::load_or_default(cli.config.as_deref())?;
    debug!("Effective configuration: {config:?}");
    match cli.command {
        Commands::Normalize(args) => handle_normalize(&args, &config),
        Commands::Analyze(args) => handle_analyze(&args, config),
        Commands::List(args) => handle_list(&args, &config),
        Commands::History(args) => handle_history(&args, &config),
    }
}

fn read_input(args: &InputArgs) -> Result<(Table, String)> {
    let delimiter = io_utils::resolve_input_delimiter(&args.input, args.delimiter);
    let encoding = io_utils::resolve_encoding(args.input_encoding.as_deref())?;
    info!(
        "Reading '{}' with delimiter '{}' and encoding {}",
        args.input.display(),
        printable_delimiter(delimiter),
        encoding.name()
    );
    let table = io_utils::read_table(&args.input, delimiter, encoding)?;
    Ok((table, source_name(&args.input)))
}

/// Name recorded in reports, the journal and the blob store.
fn source_name(path: &Path) -> String {
    if io_utils::is_dash(path) {
        return "stdin".to_string();
    }
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

fn journal_for(
    config: &ProfilerConfig,
    dir: Option<&PathBuf>,
    disabled: bool,
) -> Arc<dyn TransformationLog> {
    if disabled || !config.journal.enabled {
        Arc::new(NullJournal)
    } else {
        let dir = dir.cloned().unwrap_or_else(|| config.journal.dir.clone());
        Arc::new(JsonLinesJournal::new(dir))
    }
}

fn handle_normalize(args: &NormalizeArgs, config: &ProfilerConfig) -> Result<()> {
    let (table, source) = read_input(&args.input)?;
    let journal = journal_for(config, args.journal_dir.as_ref(), args.no_journal);
    let normalized = Normalizer::new(journal)
        .normalize(&table, Some(&source))
        .with_context(|| format!("Normalizing {source}"))?;
    for (original, cleaned) in normalized.name_mapping.pairs() {
        if original != cleaned {
            debug!("Renamed column '{original}' -> '{cleaned}'");
        }
    }
    let delimiter = args.output_delimiter.unwrap_or_else(|| {
        io_utils::resolve_input_delimiter(&args.input.input, args.input.delimiter)
    });
    io_utils::write_table(&normalized.table, args.output.as_deref(), delimiter)
        .context("Writing normalized table")?;
    info!(
        "Normalized {} row(s) across {} column(s)",
        normalized.table.row_count(),
        normalized.table.column_count()
    );
    Ok(())
}

fn apply_overrides(args: &AnalyzeArgs, mut config: ProfilerConfig) -> Result<ProfilerConfig> {
    if let Some(top_n) = args.top_n {
        config.top_n = top_n;
    }
    if let Some(contamination) = args.contamination {
        config.anomaly.contamination = contamination;
    }
    if let Some(seed) = args.seed {
        config.anomaly.seed = seed;
    }
    if !args.methods.is_empty() {
        config.anomaly.methods = args.methods.clone();
        config.anomaly.dedup_methods();
    }
    if let Some(root) = &args.storage_root {
        config.storage.root = root.clone();
    }
    if args.no_store {
        config.storage.enabled = false;
    }
    config.validate().context("Validating analysis options")?;
    Ok(config)
}

fn handle_analyze(args: &AnalyzeArgs, config: ProfilerConfig) -> Result<()> {
    let config = apply_overrides(args, config)?;
    let (table, source) = read_input(&args.input)?;

    let mut profiler = Profiler::new(&config)?.with_journal(journal_for(
        &config,
        args.journal_dir.as_ref(),
        args.no_journal,
    ));
    if config.storage.enabled {
        profiler = profiler.with_store(Box::new(FsBlobStore::new(&config.storage.root)));
    }
    let outcome = profiler
        .profile(&table, &source)
        .with_context(|| format!("Profiling {source}"))?;

    let json = if args.pretty {
        serde_json::to_string_pretty(&outcome.report)
    } else {
        serde_json::to_string(&outcome.report)
    }
    .context("Serializing report")?;
    write_text(args.output.as_deref(), &json)?;

    if let Some(path) = &args.details {
        let method = args
            .details_method
            .unwrap_or_else(|| config.anomaly.details_method());
        let details = outcome
            .details(method)
            .with_context(|| format!("Building {method} anomaly details"))?;
        let delimiter = io_utils::resolve_input_delimiter(path, None);
        io_utils::write_table(&details, Some(path.as_path()), delimiter)
            .with_context(|| format!("Writing anomaly details to {path:?}"))?;
        info!("Anomaly details ({method}) written to {path:?}");
    }

    if args.summary {
        eprint!("{}", summary_table(&outcome.report).render());
    }
    Ok(())
}

fn summary_table(report: &report::ProfileReport) -> TextTable {
    let summary = &report.concentration_analysis.summary;
    let mut table = TextTable::new(["metric", "value"]);
    table.push_row(["rows".to_string(), summary.total_rows.to_string()]);
    table.push_row(["columns".to_string(), summary.total_columns.to_string()]);
    table.push_row(["numeric".to_string(), summary.numeric_columns.to_string()]);
    table.push_row([
        "categorical".to_string(),
        summary.categorical_columns.to_string(),
    ]);
    table.push_row(["temporal".to_string(), summary.temporal_columns.to_string()]);
    table.push_row(["text".to_string(), summary.text_columns.to_string()]);
    match report.anomaly_detection.detection() {
        Some(detection) => {
            for outcome in &detection.outcomes {
                table.push_row([
                    format!("{} anomalies", outcome.method),
                    outcome.detected.count.to_string(),
                ]);
            }
        }
        None => table.push_row(["anomalies".to_string(), "no numeric columns".to_string()]),
    }
    table
}

fn write_text(path: Option<&Path>, text: &str) -> Result<()> {
    match path {
        Some(path) if !io_utils::is_dash(path) => {
            let file =
                File::create(path).with_context(|| format!("Creating output file {path:?}"))?;
            let mut writer = BufWriter::new(file);
            writeln!(writer, "{text}").with_context(|| format!("Writing {path:?}"))?;
            writer.flush().with_context(|| format!("Flushing {path:?}"))?;
            info!("Report written to {path:?}");
        }
        _ => {
            let mut stdout = io::stdout().lock();
            writeln!(stdout, "{text}").context("Writing report to stdout")?;
        }
    }
    Ok(())
}

fn handle_list(args: &ListArgs, config: &ProfilerConfig) -> Result<()> {
    let root = args
        .storage_root
        .clone()
        .unwrap_or_else(|| config.storage.root.clone());
    let store = FsBlobStore::new(&root);
    let keys = store.list().context("Listing stored tables")?;
    if keys.is_empty() {
        info!("No stored tables under {:?}", store.dir());
        return Ok(());
    }
    let mut table = TextTable::new(["key", "rows", "columns"]);
    for key in keys {
        match store.load(&key) {
            Ok(stored) => table.push_row([
                key,
                stored.row_count().to_string(),
                stored.column_count().to_string(),
            ]),
            Err(err) => {
                log::warn!("{err}");
                table.push_row([key, "?".to_string(), "?".to_string()]);
            }
        }
    }
    print!("{}", table.render());
    Ok(())
}

fn handle_history(args: &HistoryArgs, config: &ProfilerConfig) -> Result<()> {
    let dir = args
        .journal_dir
        .clone()
        .unwrap_or_else(|| config.journal.dir.clone());
    let journal = JsonLinesJournal::new(dir);
    let entries = journal
        .history(&args.source)
        .with_context(|| format!("Reading journal history for {}", args.source))?;
    if args.json {
        let mut stdout = io::stdout().lock();
        for entry in &entries {
            let line = serde_json::to_string(entry).context("Serializing journal entry")?;
            writeln!(stdout, "{line}").context("Writing history")?;
        }
        return Ok(());
    }
    let mut table = TextTable::new(["timestamp", "kind", "operation", "rows", "columns", "run_id"]);
    for entry in &entries {
        let (kind, operation, shape) = match &entry.kind {
            EntryKind::Transformation {
                operation, output, ..
            } => ("transformation", operation.clone(), Some(output.shape)),
            EntryKind::Analysis { analysis_type, .. } => ("analysis", analysis_type.clone(), None),
        };
        let (rows, columns) = shape
            .map(|(r, c)| (r.to_string(), c.to_string()))
            .unwrap_or_default();
        table.push_row([
            entry.timestamp.format("%Y-%m-%d %H:%M:%S").to_string(),
            kind.to_string(),
            operation,
            rows,
            columns,
            entry.run_id.to_string(),
        ]);
    }
    info!("{} journal entr(ies) for {}", entries.len(), args.source);
    print!("{}", table.render());
    Ok(())
}

pub(crate) fn printable_delimiter(delimiter: u8) -> String {
    match delimiter {
        b',' => ",".to_string(),
        b'\t' => "\\t".to_string(),
        b'\n' => "\\n".to_string(),
        other => (other as char).to_string(),
    }
}
