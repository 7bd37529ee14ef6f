//! Error types for the escalation engine and configuration.

use paging::{BackendError, IncidentId};
use std::path::PathBuf;
use thiserror::Error;

use crate::incident::{Action, IncidentState};

/// Errors returned by [`EscalationEngine`](crate::engine::EscalationEngine)
/// operations.
///
/// A failed operation leaves the tracked incident as it was before the
/// attempt, except that a cancelled countdown stays cancelled.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The paging backend rejected or failed the call
    #[error("failed to {action} incident: {source}")]
    Backend {
        action: Action,
        #[source]
        source: BackendError,
    },

    /// The incident is not in a state that allows the action
    #[error("cannot {action} incident {id} while it is {state}")]
    InvalidTransition {
        id: IncidentId,
        state: IncidentState,
        action: Action,
    },
}

impl EngineError {
    pub(crate) fn backend(action: Action) -> impl FnOnce(BackendError) -> Self {
        move |source| Self::Backend { action, source }
    }
}

/// Errors raised while loading configuration. All of them are fatal at
/// startup.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("invalid value {value:?} for {key}")]
    InvalidEnv { key: String, value: String },

    #[error("invalid configuration: {0}")]
    Invalid(String),
}
