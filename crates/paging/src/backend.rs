//! The paging backend interface consumed by the escalation engine.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::BackendError;
use crate::priority::Priority;

/// Backend-assigned incident identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IncidentId(String);

impl IncidentId {
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for IncidentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for IncidentId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

/// Everything needed to open an incident.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewIncident {
    /// Short headline shown in the paging app
    pub message: String,
    /// Long description (request text plus a link back to the chat)
    pub description: String,
    /// Initial priority
    pub priority: Priority,
    /// Schedule that should be paged
    pub schedule: String,
    /// Free-form tags
    pub tags: Vec<String>,
}

/// A paging backend (Opsgenie, PagerDuty, ...).
///
/// Implementations own their timeout and retry policy; every method is a
/// single fallible step from the caller's point of view.
#[async_trait]
pub trait IncidentBackend: Send + Sync {
    /// Open an incident and return its id once the backend assigned one.
    async fn create(&self, incident: &NewIncident) -> Result<IncidentId, BackendError>;

    /// Close an incident.
    async fn close(&self, id: &IncidentId) -> Result<(), BackendError>;

    /// Acknowledge an incident on behalf of the responder.
    async fn acknowledge(&self, id: &IncidentId) -> Result<(), BackendError>;

    /// Set the priority of an incident.
    async fn update_priority(&self, id: &IncidentId, priority: Priority) -> Result<(), BackendError>;

    /// Current on-call participants of a schedule, primary first.
    async fn on_call(&self, schedule: &str) -> Result<Vec<String>, BackendError>;
}
