//! Error types for the training harness.
//!
//! Errors here are fatal by design: the harness defines no retry or skip
//! policy, so a failure during an epoch propagates out and terminates the
//! run (spec'd behavior for batch-level numeric issues and checkpoint I/O
//! alike). Configuration problems are caught eagerly at startup, before any
//! training work begins.

use thiserror::Error;

/// Result alias used throughout the crate.
pub type TrainResult<T> = Result<T, TrainError>;

/// The error type for training runs.
#[derive(Debug, Error)]
pub enum TrainError {
    /// Invalid configuration (unsupported dataset, bad hyperparameters,
    /// inconsistent decay thresholds). Raised before training starts.
    #[error("configuration error: {detail}")]
    Config {
        /// Description of the configuration issue.
        detail: String,
    },

    /// Checkpoint read/write failure. Fatal; the run is expected to execute
    /// in an environment where the save path is writable.
    #[error("checkpoint I/O failed at {path}: {source}")]
    CheckpointIo {
        /// Path of the checkpoint that failed.
        path: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Checkpoint (de)serialization failure.
    #[error("checkpoint codec error at {path}: {detail}")]
    CheckpointCodec {
        /// Path of the checkpoint that failed.
        path: String,
        /// Description of the serialization problem.
        detail: String,
    },

    /// A tensor dimension did not match what a consumer expected, e.g. an
    /// encoder feeding the projection pipeline with a different feature
    /// width than it reported at construction time.
    #[error("shape mismatch in {context}: expected {expected}, got {actual}")]
    ShapeMismatch {
        /// Where the mismatch was detected.
        context: String,
        /// Expected dimension.
        expected: usize,
        /// Observed dimension.
        actual: usize,
    },

    /// A model or optimizer implementation failed internally.
    #[error("model error: {detail}")]
    Model {
        /// Description of the model failure.
        detail: String,
    },

    /// A data stream produced an inconsistent batch (e.g. label/input count
    /// mismatch).
    #[error("data error: {detail}")]
    Data {
        /// Description of the data problem.
        detail: String,
    },

    /// Artifact emission (plots, history export) failed.
    #[error("report I/O failed at {path}: {source}")]
    ReportIo {
        /// Path of the artifact that failed.
        path: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
}

impl TrainError {
    /// Convenience constructor for configuration errors.
    pub fn config(detail: impl Into<String>) -> Self {
        Self::Config {
            detail: detail.into(),
        }
    }

    /// Convenience constructor for model errors.
    pub fn model(detail: impl Into<String>) -> Self {
        Self::Model {
            detail: detail.into(),
        }
    }

    /// Convenience constructor for data errors.
    pub fn data(detail: impl Into<String>) -> Self {
        Self::Data {
            detail: detail.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = TrainError::config("dataset not supported: imagenet");
        assert_eq!(
            err.to_string(),
            "configuration error: dataset not supported: imagenet"
        );

        let err = TrainError::ShapeMismatch {
            context: "projection append".to_string(),
            expected: 128,
            actual: 64,
        };
        assert!(err.to_string().contains("expected 128"));
    }
}
