//! Duty roster lookups.
//!
//! The paging backend knows who is on call (as roster handles, i.e. email
//! addresses); the chat platform knows how to address them. [`DutyRoster`]
//! joins the two. Handles the chat platform cannot resolve are dropped, never
//! replaced by a placeholder.

use notify::Notifier;
use paging::{BackendError, IncidentBackend};
use std::sync::Arc;
use tracing::{debug, warn};

/// Resolves on-call participants to chat identities.
#[derive(Clone)]
pub struct DutyRoster {
    backend: Arc<dyn IncidentBackend>,
    notifier: Arc<dyn Notifier>,
}

impl DutyRoster {
    #[must_use]
    pub fn new(backend: Arc<dyn IncidentBackend>, notifier: Arc<dyn Notifier>) -> Self {
        Self { backend, notifier }
    }

    /// Roster handles currently on call for `schedule`, in rotation order.
    pub async fn handles(&self, schedule: &str) -> Result<Vec<String>, BackendError> {
        self.backend.on_call(schedule).await
    }

    /// Chat identities currently on call for `schedule`; the first one is
    /// the primary.
    ///
    /// Fails only when the schedule itself cannot be read.
    pub async fn resolve_on_duty(&self, schedule: &str) -> Result<Vec<String>, BackendError> {
        let handles = self.handles(schedule).await?;
        let on_duty = self.translate(&handles).await;

        debug!(schedule, on_call = handles.len(), resolved = on_duty.len(), "Resolved duty roster");
        Ok(on_duty)
    }

    /// Translate roster handles into chat identities, keeping their order.
    pub async fn translate(&self, handles: &[String]) -> Vec<String> {
        let mut identities = Vec::with_capacity(handles.len());

        for handle in handles.iter().filter(|h| !h.is_empty()) {
            match self.notifier.resolve_identity(handle).await {
                Ok(Some(identity)) => identities.push(identity),
                Ok(None) => warn!(handle = %handle, "No chat user for roster member, dropping"),
                Err(e) => {
                    warn!(handle = %handle, error = %e, "Failed to resolve roster member, dropping");
                }
            }
        }

        identities
    }
}
