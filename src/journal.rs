//! Append-only transformation journal.
//!
//! Every normalization (and every analysis run by the CLI) appends one JSON
//! line describing the input and output tables. Appends are fire-and-forget:
//! a failing sink logs a warning and the computation carries on.

use std::{
    collections::BTreeMap,
    fs::{self, File, OpenOptions},
    io::{BufRead, BufReader, Write},
    path::{Path, PathBuf},
    sync::Mutex,
};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{dataset::Table, inference::ColumnClassification};

const JOURNAL_PREFIX: &str = "transformations_";
const JOURNAL_EXTENSION: &str = "log";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableSnapshot {
    pub source: Option<String>,
    pub shape: (usize, usize),
    pub columns: Vec<String>,
    pub dtypes: BTreeMap<String, String>,
    pub missing_values: BTreeMap<String, usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub column_types: Option<BTreeMap<String, Vec<String>>>,
}

impl TableSnapshot {
    pub fn capture(table: &Table, source: Option<&str>) -> Self {
        Self {
            source: source.map(str::to_string),
            shape: table.shape(),
            columns: table.headers(),
            dtypes: table.dtypes(),
            missing_values: table.missing_counts(),
            column_types: None,
        }
    }

    pub fn with_classification(mut self, classification: &ColumnClassification) -> Self {
        let mut buckets: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for (name, kind) in classification.iter() {
            buckets
                .entry(kind.as_str().to_string())
                .or_default()
                .push(name.to_string());
        }
        self.column_types = Some(buckets);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransformationMetadata {
    /// (original label, cleaned name) pairs in column order.
    pub column_mappings: Vec<(String, String)>,
    pub transformations_applied: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EntryKind {
    Transformation {
        operation: String,
        input: TableSnapshot,
        output: TableSnapshot,
        metadata: TransformationMetadata,
    },
    Analysis {
        analysis_type: String,
        source: Option<String>,
        parameters: serde_json::Value,
        results: serde_json::Value,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JournalEntry {
    pub timestamp: DateTime<Utc>,
    pub run_id: Uuid,
    #[serde(flatten)]
    pub kind: EntryKind,
}

impl JournalEntry {
    pub fn new(kind: EntryKind) -> Self {
        Self {
            timestamp: Utc::now(),
            run_id: Uuid::new_v4(),
            kind,
        }
    }

    /// True when the entry's input or output was read from `source`.
    pub fn mentions_source(&self, source: &str) -> bool {
        match &self.kind {
            EntryKind::Transformation { input, output, .. } => {
                input.source.as_deref() == Some(source) || output.source.as_deref() == Some(source)
            }
            EntryKind::Analysis {
                source: entry_source,
                ..
            } => entry_source.as_deref() == Some(source),
        }
    }
}

/// Sink for journal entries. Implementations must not panic or block the
/// caller on failure.
pub trait TransformationLog: Send + Sync {
    fn append(&self, entry: &JournalEntry);
}

/// Discards every entry.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullJournal;

impl TransformationLog for NullJournal {
    fn append(&self, entry: &JournalEntry) {
        debug!("Discarding journal entry {}", entry.run_id);
    }
}

/// Keeps entries in memory; used by tests and embedding callers.
#[derive(Debug, Default)]
pub struct MemoryJournal {
    entries: Mutex<Vec<JournalEntry>>,
}

impl MemoryJournal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> Vec<JournalEntry> {
        self.entries
            .lock()
            .map(|guard| guard.clone())
            .unwrap_or_default()
    }
}

impl TransformationLog for MemoryJournal {
    fn append(&self, entry: &JournalEntry) {
        match self.entries.lock() {
            Ok(mut guard) => guard.push(entry.clone()),
            Err(_) => warn!("Journal mutex poisoned; dropping entry {}", entry.run_id),
        }
    }
}

/// One JSON document per line in `<dir>/transformations_<YYYYMMDD>.log`.
#[derive(Debug, Clone)]
pub struct JsonLinesJournal {
    dir: PathBuf,
}

impl JsonLinesJournal {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, timestamp: &DateTime<Utc>) -> PathBuf {
        self.dir.join(format!(
            "{JOURNAL_PREFIX}{}.{JOURNAL_EXTENSION}",
            timestamp.format("%Y%m%d")
        ))
    }

    fn try_append(&self, entry: &JournalEntry) -> Result<()> {
        fs::create_dir_all(&self.dir)
            .with_context(|| format!("Creating journal directory {:?}", self.dir))?;
        let path = self.path_for(&entry.timestamp);
        let line = serde_json::to_string(entry).context("Serializing journal entry")?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .with_context(|| format!("Opening journal file {path:?}"))?;
        writeln!(file, "{line}").with_context(|| format!("Appending to journal {path:?}"))?;
        Ok(())
    }

    /// Entries across all journal files whose input or output came from
    /// `source`, oldest file first. Unparseable lines are skipped.
    pub fn history(&self, source: &str) -> Result<Vec<JournalEntry>> {
        if !self.dir.exists() {
            return Ok(Vec::new());
        }
        let mut files = fs::read_dir(&self.dir)
            .with_context(|| format!("Listing journal directory {:?}", self.dir))?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| is_journal_file(path))
            .collect::<Vec<_>>();
        files.sort();

        let mut history = Vec::new();
        for path in files {
            let file = File::open(&path).with_context(|| format!("Opening journal {path:?}"))?;
            for (line_no, line) in BufReader::new(file).lines().enumerate() {
                let line = line.with_context(|| format!("Reading {path:?}"))?;
                if line.trim().is_empty() {
                    continue;
                }
                match serde_json::from_str::<JournalEntry>(&line) {
                    Ok(entry) if entry.mentions_source(source) => history.push(entry),
                    Ok(_) => {}
                    Err(err) => debug!("Skipping {path:?}:{} ({err})", line_no + 1),
                }
            }
        }
        Ok(history)
    }
}

fn is_journal_file(path: &Path) -> bool {
    let name_matches = path
        .file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| n.starts_with(JOURNAL_PREFIX));
    let ext_matches = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e == JOURNAL_EXTENSION);
    name_matches && ext_matches
}

impl TransformationLog for JsonLinesJournal {
    fn append(&self, entry: &JournalEntry) {
        if let Err(err) = self.try_append(entry) {
            warn!("Transformation journal append failed: {err:#}");
        }
    }
}
