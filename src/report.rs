//! Report assembly and the end-to-end profiling pipeline.

use std::sync::Arc;

use log::{info, warn};
use serde::Serialize;
use serde_json::json;

use crate::{
    anomaly::{AnomalyEnsemble, AnomalyReport, DetectionMethod, get_anomaly_details},
    concentration::{ConcentrationReport, analyze_concentration},
    config::ProfilerConfig,
    dataset::Table,
    error::ProfileError,
    insights::{InsightGenerator, Insights, TextGenerator},
    journal::{EntryKind, JournalEntry, NullJournal, TransformationLog},
    normalize::{NormalizedTable, Normalizer},
    storage::BlobStore,
};

/// The combined output of one analysis run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProfileReport {
    pub filename: String,
    pub concentration_analysis: ConcentrationReport,
    pub anomaly_detection: AnomalyReport,
    pub insights: Insights,
}

impl ProfileReport {
    pub fn assemble(
        filename: impl Into<String>,
        concentration: ConcentrationReport,
        anomalies: AnomalyReport,
        insights: Insights,
    ) -> Self {
        Self {
            filename: filename.into(),
            concentration_analysis: concentration,
            anomaly_detection: anomalies,
            insights,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProfileOutcome {
    pub normalized: NormalizedTable,
    pub report: ProfileReport,
    /// False when no store is configured or saving failed.
    pub stored: bool,
}

impl ProfileOutcome {
    /// The normalized table enriched with `method`'s anomaly scores.
    pub fn details(&self, method: DetectionMethod) -> Result<Table, ProfileError> {
        get_anomaly_details(&self.normalized.table, &self.report.anomaly_detection, method)
    }
}

/// Normalize, store, analyse and summarise one table.
pub struct Profiler {
    top_n: usize,
    journal: Arc<dyn TransformationLog>,
    normalizer: Normalizer,
    ensemble: AnomalyEnsemble,
    insights: InsightGenerator,
    store: Option<Box<dyn BlobStore>>,
}

impl Profiler {
    pub fn new(config: &ProfilerConfig) -> Result<Self, ProfileError> {
        config.validate()?;
        let journal: Arc<dyn TransformationLog> = Arc::new(NullJournal);
        Ok(Self {
            top_n: config.top_n,
            normalizer: Normalizer::new(Arc::clone(&journal)),
            journal,
            ensemble: AnomalyEnsemble::from_config(&config.anomaly),
            insights: InsightGenerator::default(),
            store: None,
        })
    }

    pub fn with_journal(mut self, journal: Arc<dyn TransformationLog>) -> Self {
        self.normalizer = Normalizer::new(Arc::clone(&journal));
        self.journal = journal;
        self
    }

    pub fn with_store(mut self, store: Box<dyn BlobStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_generator(mut self, generator: Box<dyn TextGenerator>) -> Self {
        self.insights = InsightGenerator::new(generator);
        self
    }

    pub fn normalizer(&self) -> &Normalizer {
        &self.normalizer
    }

    pub fn profile(&self, table: &Table, filename: &str) -> Result<ProfileOutcome, ProfileError> {
        let normalized = self.normalizer.normalize(table, Some(filename))?;
        let stored = self.store_table(&normalized.table, filename);

        let concentration = analyze_concentration(&normalized.table, self.top_n)?;
        let anomalies = self.ensemble.detect_anomalies(&normalized.table)?;
        let insights = self
            .insights
            .generate_insights(&normalized.table, &concentration, &anomalies);

        let report = ProfileReport::assemble(filename, concentration, anomalies, insights);
        self.journal_analysis(&report);
        info!(
            "Profiled '{filename}': {} row(s), {} column(s)",
            report.concentration_analysis.summary.total_rows,
            report.concentration_analysis.summary.total_columns
        );
        Ok(ProfileOutcome {
            normalized,
            report,
            stored,
        })
    }

    fn store_table(&self, table: &Table, key: &str) -> bool {
        let Some(store) = &self.store else {
            return false;
        };
        match store.save(table, key) {
            Ok(()) => true,
            Err(err) => {
                warn!("Storing normalized table failed: {err}");
                false
            }
        }
    }

    fn journal_analysis(&self, report: &ProfileReport) {
        let anomaly_summary = match report.anomaly_detection.detection() {
            Some(detection) => serde_json::to_value(detection.summary()),
            None => serde_json::to_value(&report.anomaly_detection),
        };
        let results = match (
            serde_json::to_value(&report.concentration_analysis.summary),
            anomaly_summary,
        ) {
            (Ok(concentration), Ok(anomalies)) => {
                json!({"concentration": concentration, "anomalies": anomalies})
            }
            (Err(err), _) | (_, Err(err)) => {
                warn!("Skipping analysis journal entry: {err}");
                return;
            }
        };
        self.journal.append(&JournalEntry::new(EntryKind::Analysis {
            analysis_type: "profile".to_string(),
            source: Some(report.filename.clone()),
            parameters: json!({
                "top_n": self.top_n,
                "methods": self.ensemble.methods(),
            }),
            results,
        }));
    }
}
