//! Escalation countdowns.
//!
//! Each open incident with a ladder gets one background task that ticks once
//! per second. The task owns nothing: on every tick it checks that its entry
//! is still in the engine's registry and exits silently once it is gone.

use async_trait::async_trait;
use notify::MessageRef;
use paging::IncidentId;
use std::collections::{HashMap, HashSet, VecDeque};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use super::EscalationEngine;
use crate::error::EngineError;
use crate::incident::Incident;

/// Length of one countdown tick.
pub const TICK: Duration = Duration::from_secs(1);

/// A render update is emitted every this many ticks.
pub const RENDER_EVERY: u64 = 5;

/// How many closed incident ids are remembered to refuse late clicks.
pub const CLOSED_HISTORY: usize = 1024;

/// Receives countdown progress. Implemented by the chat renderer so the
/// engine never talks to the chat platform itself.
#[async_trait]
pub trait CountdownObserver: Send + Sync {
    /// Time left before the incident is escalated.
    async fn tick(&self, target: &MessageRef, incident: &Incident, remaining: Duration);

    /// The ladder ran out. `error` is set when the escalation failed; the
    /// countdown is not restarted either way.
    async fn expired(&self, target: &MessageRef, incident: &Incident, error: Option<&EngineError>);
}

/// A live countdown.
#[derive(Debug)]
pub(super) struct Entry {
    pub token: CancellationToken,
    /// Distinguishes this countdown from a later one for the same id
    pub generation: u64,
}

/// Incidents and their countdowns, guarded by the engine's lock.
#[derive(Debug, Default)]
pub(super) struct Registry {
    pub incidents: HashMap<IncidentId, Incident>,
    pub countdowns: HashMap<IncidentId, Entry>,
    next_generation: u64,
    closed: HashSet<IncidentId>,
    closed_order: VecDeque<IncidentId>,
}

impl Registry {
    pub fn next_generation(&mut self) -> u64 {
        self.next_generation += 1;
        self.next_generation
    }

    /// Remove and cancel the countdown of `id`, clearing the deadline.
    /// Returns whether a countdown was running.
    pub fn cancel(&mut self, id: &IncidentId) -> bool {
        if let Some(incident) = self.incidents.get_mut(id) {
            incident.escalation_deadline = None;
        }

        match self.countdowns.remove(id) {
            Some(entry) => {
                entry.token.cancel();
                true
            }
            None => false,
        }
    }

    /// Stop tracking `id` and remember it as closed, forgetting the oldest
    /// closed id past [`CLOSED_HISTORY`].
    pub fn close(&mut self, id: &IncidentId) {
        self.cancel(id);
        self.incidents.remove(id);

        if self.closed.insert(id.clone()) {
            self.closed_order.push_back(id.clone());
        }
        while self.closed_order.len() > CLOSED_HISTORY {
            if let Some(oldest) = self.closed_order.pop_front() {
                self.closed.remove(&oldest);
            }
        }
    }

    pub fn is_closed(&self, id: &IncidentId) -> bool {
        self.closed.contains(id)
    }

    /// Whether the countdown `generation` of `id` is still the live one.
    pub fn is_live(&self, id: &IncidentId, generation: u64) -> bool {
        self.countdowns
            .get(id)
            .is_some_and(|entry| entry.generation == generation && !entry.token.is_cancelled())
    }
}

/// Body of a countdown task. Without a `target` message the ladder still
/// escalates, nothing is rendered.
pub(super) async fn run(
    engine: EscalationEngine,
    id: IncidentId,
    generation: u64,
    ladder: Duration,
    token: CancellationToken,
    target: Option<MessageRef>,
    observer: std::sync::Arc<dyn CountdownObserver>,
) {
    let total = ladder.as_secs();
    debug!(incident_id = %id, seconds = total, "Countdown started");

    for remaining in (0..=total).rev() {
        let Some(incident) = engine.live_snapshot(&id, generation).await else {
            debug!(incident_id = %id, "Countdown cancelled");
            return;
        };

        if remaining == 0 {
            let outcome = engine.escalate_expired(&id, generation).await;
            match outcome {
                Ok(Some(escalated)) => {
                    info!(incident_id = %id, priority = %escalated.priority, "Ladder expired, incident escalated");
                    if let Some(target) = &target {
                        observer.expired(target, &escalated, None).await;
                    }
                }
                Ok(None) => debug!(incident_id = %id, "Countdown cancelled at expiry"),
                Err(e) => {
                    error!(incident_id = %id, error = %e, "Ladder expired but escalation failed");
                    if let Some(target) = &target {
                        let current = engine.incident(&id).await.unwrap_or(incident);
                        observer.expired(target, &current, Some(&e)).await;
                    }
                }
            }
            return;
        }

        if remaining < total && remaining % RENDER_EVERY == 0 {
            if let Some(target) = &target {
                observer
                    .tick(target, &incident, Duration::from_secs(remaining))
                    .await;
            }
        }

        tokio::select! {
            () = token.cancelled() => {
                debug!(incident_id = %id, "Countdown cancelled");
                return;
            }
            () = tokio::time::sleep(TICK) => {}
        }
    }
}
