//! Error types for the testimonial pipeline
//!
//! One enum per concern, plus `PipelineError` which is what the pipeline
//! facade and the worker deal in. `ErrorKind` is the coarse classification
//! recorded on a submission as `failed:<kind>`.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::backend::LlmError;

/// Coarse error classification persisted on a submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorKind {
    Validation,
    Parse,
    Generation,
    Persistence,
    Notification,
    /// The run panicked
    Internal,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Validation => "validation",
            Self::Parse => "parse",
            Self::Generation => "generation",
            Self::Persistence => "persistence",
            Self::Notification => "notification",
            Self::Internal => "internal",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "validation" => Some(Self::Validation),
            "parse" => Some(Self::Parse),
            "generation" => Some(Self::Generation),
            "persistence" => Some(Self::Persistence),
            "notification" => Some(Self::Notification),
            "internal" => Some(Self::Internal),
            _ => None,
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A required ingestion field was missing or blank.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("missing required field: {0}")]
    MissingField(&'static str),
}

/// The raw survey blob could not be turned into answers.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    /// A catalog question's text does not occur in the blob
    #[error("question not found in submission: {question:?}")]
    MissingQuestion { question: String },

    /// The next catalog question starts inside the current question's label
    #[error("question {next:?} appears before the end of {question:?}")]
    OutOfOrder { question: String, next: String },

    /// The contact identifier span is blank
    #[error("contact identifier is empty")]
    EmptyContact,

    /// Catalog definition problems
    #[error("invalid question catalog: {0}")]
    InvalidCatalog(String),
}

/// A single generation call failed.
#[derive(Debug, Clone, thiserror::Error)]
pub enum GenerationError {
    #[error("backend error: {0}")]
    Backend(#[from] LlmError),

    #[error("generation timed out after {after_ms}ms")]
    Timeout { after_ms: u64 },

    #[error("generation returned empty output")]
    EmptyOutput,
}

/// Store read/write failures.
#[derive(Debug, Clone, thiserror::Error)]
pub enum StoreError {
    #[error("document not found: {0}")]
    NotFound(String),

    #[error("duplicate submission: {0}")]
    Duplicate(String),

    #[error("store backend error: {0}")]
    Backend(String),
}

/// Downstream notification failures.
#[derive(Debug, Clone, thiserror::Error)]
pub enum NotifyError {
    #[error("notification request failed: {0}")]
    Request(String),

    #[error("notification endpoint returned HTTP {0}")]
    Status(u16),

    #[error("notification timed out after {after_ms}ms")]
    Timeout { after_ms: u64 },
}

/// Main pipeline error type
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("validation failed: {0}")]
    Validation(#[from] ValidationError),

    #[error("parse failed: {0}")]
    Parse(#[from] ParseError),

    /// A dependent stage failed; later stages were not entered
    #[error("stage {stage} failed: {source}")]
    Stage {
        stage: crate::orchestrator::Stage,
        #[source]
        source: GenerationError,
    },

    /// Every synthesis variant failed
    #[error("all testimonial variants failed")]
    SynthesisFailed,

    #[error("persistence failed: {0}")]
    Persistence(#[from] StoreError),

    #[error("notification failed: {0}")]
    Notification(#[from] NotifyError),

    /// Another run for this submission is in flight
    #[error("pipeline already running for submission {0}")]
    AlreadyRunning(String),

    /// The worker queue has shut down
    #[error("pipeline queue closed")]
    QueueClosed,
}

impl PipelineError {
    /// Classification recorded on the submission.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation(_) => ErrorKind::Validation,
            Self::Parse(_) => ErrorKind::Parse,
            Self::Stage { .. } | Self::SynthesisFailed => ErrorKind::Generation,
            Self::Persistence(_) | Self::AlreadyRunning(_) | Self::QueueClosed => {
                ErrorKind::Persistence
            }
            Self::Notification(_) => ErrorKind::Notification,
        }
    }

    /// Whether a fresh run could plausibly succeed.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Stage { .. } | Self::SynthesisFailed => true,
            Self::Persistence(StoreError::Backend(_)) => true,
            _ => false,
        }
    }
}
