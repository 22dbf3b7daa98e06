//! Typed errors surfaced by the allocator, inference clients and orchestrator.
//!
//! Glue code (configuration, SQLite stores, CLI) uses `anyhow`; anything a
//! caller may want to match on is a variant here.

use std::time::Duration;

use summary_harness_core::models::Role;
use thiserror::Error;

/// Failure of a single language-model call.
#[derive(Debug, Error)]
pub enum InferenceError {
    #[error("provider returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("request failed: {0}")]
    Transport(String),

    #[error("no response within {0:?}")]
    Timeout(Duration),

    #[error("malformed response: {0}")]
    MalformedResponse(String),

    #[error("provider returned an empty completion")]
    EmptyResponse,

    #[error("environment variable {0} is not set")]
    MissingApiKey(String),
}

impl InferenceError {
    /// Rate limits, server errors, timeouts and garbled responses are
    /// worth another attempt. Client errors and missing credentials are not.
    pub fn is_retryable(&self) -> bool {
        match self {
            InferenceError::Status { status, .. } => *status == 429 || *status >= 500,
            InferenceError::Transport(_)
            | InferenceError::Timeout(_)
            | InferenceError::MalformedResponse(_)
            | InferenceError::EmptyResponse => true,
            InferenceError::MissingApiKey(_) => false,
        }
    }
}

/// Failure acquiring or releasing a named lock.
#[derive(Debug, Error)]
pub enum LockError {
    #[error("lock '{name}' not acquired within {waited:?}")]
    Timeout { name: String, waited: Duration },

    #[error("lock backend failed: {0}")]
    Backend(#[from] anyhow::Error),
}

/// Failure of a summary request.
#[derive(Debug, Error)]
pub enum SummaryError {
    #[error("no {role} provider has free capacity")]
    NoProviderAvailable { role: Role },

    #[error("{role} provider '{name}' is not configured")]
    UnknownProvider { role: Role, name: String },

    #[error("inference failed: {0}")]
    Inference(#[from] InferenceError),

    #[error("reduction did not converge within {rounds} rounds")]
    ReductionDivergence { rounds: usize },

    #[error(transparent)]
    Lock(#[from] LockError),

    #[error(transparent)]
    Store(#[from] anyhow::Error),
}
