// src/error.rs
//! Error taxonomy for the research pipeline. Failures are scoped: a client
//! error belongs to one call, a discover error to one source, a store error
//! to one persistence operation. Only the store going away entirely fails a
//! whole run.

use thiserror::Error;

use crate::model::CandidateStatus;

/// Failure of a single external HTTP collaborator call.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("network error: {0}")]
    Network(String),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("parse error: {0}")]
    Parse(String),

    #[error("missing credential: {0}")]
    MissingCredential(&'static str),
}

impl From<reqwest::Error> for ClientError {
    fn from(err: reqwest::Error) -> Self {
        ClientError::Network(err.to_string())
    }
}

impl From<serde_json::Error> for ClientError {
    fn from(err: serde_json::Error) -> Self {
        ClientError::Parse(err.to_string())
    }
}

/// Per-source discovery failure. `Config` is fatal for the source this run;
/// `Service` and `AnalysisFormat` are recoverable and simply retried on the
/// next scheduled run.
#[derive(Debug, Error)]
pub enum DiscoverError {
    #[error("source misconfigured: {0}")]
    Config(String),

    #[error("external service failed: {0}")]
    Service(#[from] ClientError),

    #[error("analysis response did not match the expected structure: {0}")]
    AnalysisFormat(String),
}

/// Persistence-layer failure. Duplicate inserts are NOT errors — they come
/// back as [`crate::store::InsertOutcome::Duplicate`].
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("publication {0} not found")]
    PublicationNotFound(i64),

    #[error("source {0} not found")]
    SourceNotFound(i64),

    #[error("candidate {0} not found")]
    CandidateNotFound(i64),

    #[error("invalid status transition {from} -> {to}")]
    InvalidTransition {
        from: CandidateStatus,
        to: CandidateStatus,
    },

    #[error("storage backend unavailable: {0}")]
    Backend(String),
}
