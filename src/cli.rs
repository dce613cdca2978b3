use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::anomaly::DetectionMethod;

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "Normalize tabular datasets and profile their concentration and anomalies",
    long_about = None
)]
pub struct Cli {
    /// YAML configuration file (defaults are used when omitted)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Clean column names, convert types and impute missing values
    Normalize(NormalizeArgs),
    /// Normalize a file and report concentration metrics and anomalies as JSON
    Analyze(AnalyzeArgs),
    /// List tables held in the blob store
    List(ListArgs),
    /// Show journal entries recorded for a source file
    History(HistoryArgs),
}

#[derive(Debug, Args)]
pub struct InputArgs {
    /// Input CSV/TSV file (`-` for stdin)
    #[arg(short = 'i', long = "input")]
    pub input: PathBuf,
    /// CSV delimiter character (supports ',', 'tab', ';', '|')
    #[arg(long, value_parser = parse_delimiter)]
    pub delimiter: Option<u8>,
    /// Character encoding of the input file (defaults to utf-8)
    #[arg(long = "input-encoding")]
    pub input_encoding: Option<String>,
}

#[derive(Debug, Args)]
pub struct NormalizeArgs {
    #[command(flatten)]
    pub input: InputArgs,
    /// Output CSV file (stdout if omitted)
    #[arg(short = 'o', long = "output")]
    pub output: Option<PathBuf>,
    /// Delimiter to use for output (defaults to input delimiter)
    #[arg(long = "output-delimiter", value_parser = parse_delimiter)]
    pub output_delimiter: Option<u8>,
    /// Directory for the transformation journal
    #[arg(long = "journal-dir")]
    pub journal_dir: Option<PathBuf>,
    /// Do not append to the transformation journal
    #[arg(long = "no-journal")]
    pub no_journal: bool,
}

#[derive(Debug, Args)]
pub struct AnalyzeArgs {
    #[command(flatten)]
    pub input: InputArgs,
    /// Write the JSON report here instead of stdout
    #[arg(short = 'o', long = "output")]
    pub output: Option<PathBuf>,
    /// Number of leading values used for top-N concentration
    #[arg(long = "top-n")]
    pub top_n: Option<usize>,
    /// Expected share of anomalous rows (0, 0.5]
    #[arg(long)]
    pub contamination: Option<f64>,
    /// Seed for the isolation forest
    #[arg(long)]
    pub seed: Option<u64>,
    /// Restrict detection to these methods (repeatable)
    #[arg(long = "method", value_enum, action = clap::ArgAction::Append)]
    pub methods: Vec<DetectionMethod>,
    /// Write the normalized table with anomaly scores and flags to this CSV
    #[arg(long = "details")]
    pub details: Option<PathBuf>,
    /// Method whose scores populate the details table
    #[arg(long = "details-method", value_enum)]
    pub details_method: Option<DetectionMethod>,
    /// Root directory of the blob store
    #[arg(long = "storage-root")]
    pub storage_root: Option<PathBuf>,
    /// Skip saving the normalized table to the blob store
    #[arg(long = "no-store")]
    pub no_store: bool,
    /// Directory for the transformation journal
    #[arg(long = "journal-dir")]
    pub journal_dir: Option<PathBuf>,
    /// Do not append to the transformation journal
    #[arg(long = "no-journal")]
    pub no_journal: bool,
    /// Pretty-print the JSON report
    #[arg(long)]
    pub pretty: bool,
    /// Print a short summary table to stderr
    #[arg(long)]
    pub summary: bool,
}

#[derive(Debug, Args)]
pub struct ListArgs {
    /// Root directory of the blob store
    #[arg(long = "storage-root")]
    pub storage_root: Option<PathBuf>,
}

#[derive(Debug, Args)]
pub struct HistoryArgs {
    /// Source file name as recorded in the journal (e.g. `sales.csv`)
    #[arg(short = 's', long = "source")]
    pub source: String,
    /// Directory of the transformation journal
    #[arg(long = "journal-dir")]
    pub journal_dir: Option<PathBuf>,
    /// Print the raw JSON lines instead of a table
    #[arg(long)]
    pub json: bool,
}

pub fn parse_delimiter(value: &str) -> Result<u8, String> {
    match value {
        "tab" | "\t" => Ok(b'\t'),
        "comma" | "," => Ok(b','),
        "|" | "pipe" => Ok(b'|'),
        ";" | "semicolon" => Ok(b';'),
        other => {
            let mut chars = other.chars();
            let first = chars
                .next()
                .ok_or_else(|| "Delimiter cannot be empty".to_string())?;
            if chars.next().is_some() {
                return Err("Delimiter must be a single character".to_string());
            }
            if !first.is_ascii() {
                return Err("Delimiter must be ASCII".to_string());
            }
            Ok(first as u8)
        }
    }
}
