//! Error types for the paging backend.

use thiserror::Error;

/// Errors returned by an [`IncidentBackend`](crate::IncidentBackend).
#[derive(Debug, Error)]
pub enum BackendError {
    /// HTTP request failed before a response was received
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The backend answered with a non-success status
    #[error("backend returned {status}: {body}")]
    Api { status: u16, body: String },

    /// Rate limited and out of retries
    #[error("rate limited after {attempts} attempts")]
    RateLimited { attempts: u32 },

    /// An asynchronous create request never reported an incident id
    #[error("request {0} was not processed in time")]
    Pending(String),

    /// The backend processed the request but refused it
    #[error("request {request_id} failed: {status}")]
    Rejected { request_id: String, status: String },

    /// The named schedule does not exist
    #[error("unknown schedule: {0}")]
    UnknownSchedule(String),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl BackendError {
    /// Whether retrying the same call may succeed.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Http(e) => e.is_timeout() || e.is_connect(),
            Self::Api { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }
}
