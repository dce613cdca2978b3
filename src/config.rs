//! Profiler configuration.
//!
//! Settings load from an optional YAML file; any field left out keeps its
//! default. Command-line flags are applied on top by the caller.

use std::{
    fs::File,
    io::BufReader,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use itertools::Itertools;
use serde::{Deserialize, Serialize};

use crate::{anomaly::DetectionMethod, error::ProfileError};

pub const DEFAULT_TOP_N: usize = 10;
pub const DEFAULT_CONTAMINATION: f64 = 0.1;
pub const DEFAULT_KNN_NEIGHBORS: usize = 5;
pub const DEFAULT_FOREST_ESTIMATORS: usize = 100;
pub const DEFAULT_FOREST_MAX_SAMPLES: usize = 256;
pub const DEFAULT_SEED: u64 = 42;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnomalyConfig {
    pub methods: Vec<DetectionMethod>,
    pub default_method: DetectionMethod,
    pub contamination: f64,
    pub knn_neighbors: usize,
    pub forest_estimators: usize,
    pub forest_max_samples: usize,
    pub seed: u64,
}

impl Default for AnomalyConfig {
    fn default() -> Self {
        Self {
            methods: vec![DetectionMethod::Knn, DetectionMethod::IsolationForest],
            default_method: DetectionMethod::Knn,
            contamination: DEFAULT_CONTAMINATION,
            knn_neighbors: DEFAULT_KNN_NEIGHBORS,
            forest_estimators: DEFAULT_FOREST_ESTIMATORS,
            forest_max_samples: DEFAULT_FOREST_MAX_SAMPLES,
            seed: DEFAULT_SEED,
        }
    }
}

impl AnomalyConfig {
    /// `default_method` when it is configured to run, otherwise the first
    /// configured method.
    pub fn details_method(&self) -> DetectionMethod {
        if self.methods.contains(&self.default_method) {
            self.default_method
        } else {
            self.methods.first().copied().unwrap_or(self.default_method)
        }
    }

    /// Drops repeated methods, keeping the first occurrence of each.
    pub fn dedup_methods(&mut self) {
        self.methods = self.methods.iter().copied().unique().collect();
    }

    pub fn validate(&self) -> Result<(), ProfileError> {
        if self.methods.is_empty() {
            return Err(ProfileError::invalid_parameter(
                "methods",
                "[]",
                "at least one detection method is required",
            ));
        }
        if !(self.contamination > 0.0 && self.contamination <= 0.5) {
            return Err(ProfileError::invalid_parameter(
                "contamination",
                self.contamination,
                "must be in (0, 0.5]",
            ));
        }
        if self.knn_neighbors == 0 {
            return Err(ProfileError::invalid_parameter(
                "knn_neighbors",
                self.knn_neighbors,
                "must be at least 1",
            ));
        }
        if self.forest_estimators == 0 {
            return Err(ProfileError::invalid_parameter(
                "forest_estimators",
                self.forest_estimators,
                "must be at least 1",
            ));
        }
        if self.forest_max_samples < 2 {
            return Err(ProfileError::invalid_parameter(
                "forest_max_samples",
                self.forest_max_samples,
                "must be at least 2",
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub enabled: bool,
    pub root: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            root: PathBuf::from("data"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct JournalConfig {
    pub enabled: bool,
    pub dir: PathBuf,
}

impl Default for JournalConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            dir: PathBuf::from("data").join("logs"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProfilerConfig {
    pub top_n: usize,
    pub anomaly: AnomalyConfig,
    pub storage: StorageConfig,
    pub journal: JournalConfig,
}

impl Default for ProfilerConfig {
    fn default() -> Self {
        Self {
            top_n: DEFAULT_TOP_N,
            anomaly: AnomalyConfig::default(),
            storage: StorageConfig::default(),
            journal: JournalConfig::default(),
        }
    }
}

impl ProfilerConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let file = File::open(path).with_context(|| format!("Opening config file {path:?}"))?;
        let reader = BufReader::new(file);
        let mut config: ProfilerConfig =
            serde_yaml::from_reader(reader).context("Parsing config YAML")?;
        config.anomaly.dedup_methods();
        config
            .validate()
            .with_context(|| format!("Validating config file {path:?}"))?;
        Ok(config)
    }

    /// Loads `path` when given, defaults otherwise.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load(path),
            None => Ok(Self::default()),
        }
    }

    pub fn to_yaml_string(&self) -> Result<String> {
        serde_yaml::to_string(self).context("Serializing config to YAML")
    }

    pub fn validate(&self) -> Result<(), ProfileError> {
        if self.top_n == 0 {
            return Err(ProfileError::invalid_parameter(
                "top_n",
                self.top_n,
                "must be at least 1",
            ));
        }
        self.anomaly.validate()
    }
}
