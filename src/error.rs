//! Error taxonomy for the profiling core.
//!
//! Command handlers wrap these in `anyhow` with context; `main` walks the
//! chain back to the first [`ProfileError`] or [`StorageError`] to pick an
//! exit code.

use thiserror::Error;

/// Failures raised by normalization, concentration analysis and anomaly
/// detection.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ProfileError {
    #[error("invalid value {value} for parameter '{name}': {reason}")]
    InvalidParameter {
        name: String,
        value: String,
        reason: String,
    },
    #[error("{metric} is undefined for column '{column}': {reason}")]
    UndefinedMetric {
        column: String,
        metric: &'static str,
        reason: String,
    },
    #[error("cannot impute {bucket} column '{column}': it has no non-missing values")]
    Imputation { column: String, bucket: &'static str },
    #[error("anomaly method '{method}' was not computed (available: {available})")]
    UnknownMethod { method: String, available: String },
    #[error("need at least {min_required} rows, got {actual}")]
    InsufficientData { min_required: usize, actual: usize },
    #[error("column '{column}' has {count} missing or non-finite values")]
    MissingValues { column: String, count: usize },
    #[error("column '{column}' has zero variance and cannot be standardized")]
    DegenerateColumn { column: String },
    #[error("expected {expected} rows, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
}

impl ProfileError {
    pub fn invalid_parameter(
        name: impl Into<String>,
        value: impl ToString,
        reason: impl Into<String>,
    ) -> Self {
        Self::InvalidParameter {
            name: name.into(),
            value: value.to_string(),
            reason: reason.into(),
        }
    }

    pub fn exit_code(&self) -> i32 {
        match self {
            Self::InvalidParameter { .. } => 2,
            Self::UndefinedMetric { .. } => 3,
            Self::Imputation { .. } => 4,
            Self::UnknownMethod { .. } => 5,
            Self::InsufficientData { .. }
            | Self::MissingValues { .. }
            | Self::DegenerateColumn { .. }
            | Self::DimensionMismatch { .. } => 7,
        }
    }
}

/// Blob store failures. Every variant carries the key it was raised for.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("no stored table under key '{key}'")]
    NotFound { key: String },
    #[error("invalid storage key '{key}': {reason}")]
    InvalidKey { key: String, reason: &'static str },
    #[error("{operation} failed for key '{key}'")]
    Io {
        key: String,
        operation: &'static str,
        #[source]
        source: std::io::Error,
    },
    #[error("{operation} failed while encoding table for key '{key}': {message}")]
    Encode {
        key: String,
        operation: &'static str,
        message: String,
    },
    #[error("{operation} failed while decoding table for key '{key}': {message}")]
    Decode {
        key: String,
        operation: &'static str,
        message: String,
    },
    #[error("stored table '{key}' is corrupt ({operation}): {reason}")]
    Corrupt {
        key: String,
        operation: &'static str,
        reason: String,
    },
}

impl StorageError {
    pub fn key(&self) -> &str {
        match self {
            Self::NotFound { key }
            | Self::InvalidKey { key, .. }
            | Self::Io { key, .. }
            | Self::Encode { key, .. }
            | Self::Decode { key, .. }
            | Self::Corrupt { key, .. } => key,
        }
    }

    /// The storage step that failed, when the variant records one.
    pub fn operation(&self) -> Option<&'static str> {
        match self {
            Self::Io { operation, .. }
            | Self::Encode { operation, .. }
            | Self::Decode { operation, .. }
            | Self::Corrupt { operation, .. } => Some(*operation),
            Self::NotFound { .. } | Self::InvalidKey { .. } => None,
        }
    }

    pub fn exit_code(&self) -> i32 {
        6
    }
}

/// The text generation collaborator could not produce output. Always
/// recovered by the template fallback.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("text generation unavailable: {reason}")]
pub struct GenerationUnavailable {
    pub reason: String,
}

impl GenerationUnavailable {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

/// Maps an error chain to the process exit code.
pub fn exit_code_for(err: &anyhow::Error) -> i32 {
    for cause in err.chain() {
        if let Some(profile) = cause.downcast_ref::<ProfileError>() {
            return profile.exit_code();
        }
        if let Some(storage) = cause.downcast_ref::<StorageError>() {
            return storage.exit_code();
        }
    }
    1
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Context;

    #[test]
    fn exit_code_follows_context_chain() {
        let result: anyhow::Result<()> = Err(ProfileError::UnknownMethod {
            method: "lof".into(),
            available: "knn".into(),
        })
        .context("Building anomaly details");
        let err = result.unwrap_err();
        assert_eq!(exit_code_for(&err), 5);
    }

    #[test]
    fn storage_errors_map_to_storage_code() {
        let err = anyhow::Error::new(StorageError::NotFound { key: "x".into() });
        assert_eq!(exit_code_for(&err), 6);
        assert_eq!(exit_code_for(&anyhow::anyhow!("plain")), 1);
    }

    #[test]
    fn messages_carry_parameter_context() {
        let err = ProfileError::invalid_parameter("top_n", 0, "must be at least 1");
        assert_eq!(
            err.to_string(),
            "invalid value 0 for parameter 'top_n': must be at least 1"
        );
    }
}
