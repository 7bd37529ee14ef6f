//! Incident escalation engine.
//!
//! [`EscalationEngine`] is the only component that mutates incident state.
//! It tracks open incidents for one schedule, runs at most one countdown per
//! incident and serialises human actions against countdown expiry:
//!
//! ```text
//!            create
//!              │
//!              ▼
//!   ┌──────── Open ──────────┐
//!   │          │ acknowledge │ close
//!   │          ▼             ▼
//!   │    Acknowledged ──► Closed
//!   │                close
//!   └─ escalate (manual or ladder expiry): priority → P1, state unchanged
//! ```
//!
//! The registry lock is never held across a backend call. Acknowledge, close
//! and manual escalation cancel the countdown before calling the backend; a
//! failed call leaves the incident as it was but the countdown stays
//! cancelled.
//!
//! Closed incidents are remembered (up to [`CLOSED_HISTORY`] of them) and
//! every later action on them is refused without reaching the backend, which
//! accepts requests on closed alerts and only rejects them asynchronously.

mod countdown;

pub use countdown::{CountdownObserver, CLOSED_HISTORY, RENDER_EVERY, TICK};

use chrono::Utc;
use notify::{MessageRef, Origin};
use paging::{BackendError, IncidentBackend, IncidentId, NewIncident, Priority};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::error::EngineError;
use crate::incident::{Action, EscalationReason, Incident, IncidentState, IncidentToken};
use crate::roster::DutyRoster;
use countdown::{Entry, Registry};

/// Headline of every incident opened from chat.
pub const ALERT_MESSAGE: &str = "you were called in the chat";

/// Tag added to every incident next to the group name.
pub const INCIDENT_TAG: &str = "oncall";

/// Per-schedule engine settings.
#[derive(Debug, Clone)]
pub struct EngineSettings {
    /// Chat-facing group label, used as an incident tag
    pub group: String,
    /// Backend schedule that gets paged
    pub schedule: String,
    /// Priority of new incidents
    pub default_priority: Priority,
    /// Time before an unacknowledged incident is raised to P1; `None`
    /// disables the countdown
    pub ladder: Option<Duration>,
}

/// Escalation engine for one schedule. Cheap to clone.
#[derive(Clone)]
pub struct EscalationEngine {
    inner: Arc<Inner>,
}

struct Inner {
    settings: EngineSettings,
    backend: Arc<dyn IncidentBackend>,
    roster: DutyRoster,
    registry: Mutex<Registry>,
    shutdown: CancellationToken,
}

impl EscalationEngine {
    #[must_use]
    pub fn new(settings: EngineSettings, backend: Arc<dyn IncidentBackend>, roster: DutyRoster) -> Self {
        Self {
            inner: Arc::new(Inner {
                settings,
                backend,
                roster,
                registry: Mutex::new(Registry::default()),
                shutdown: CancellationToken::new(),
            }),
        }
    }

    #[must_use]
    pub fn settings(&self) -> &EngineSettings {
        &self.inner.settings
    }

    #[must_use]
    pub fn ladder(&self) -> Option<Duration> {
        self.inner.settings.ladder
    }

    #[must_use]
    pub fn roster(&self) -> &DutyRoster {
        &self.inner.roster
    }

    /// Open an incident for a help request.
    ///
    /// The on-duty engineer is resolved first. A roster failure is not fatal:
    /// the backend pages the schedule itself, the incident just has no
    /// assignee. A backend failure leaves nothing tracked.
    pub async fn create(&self, description: &str, origin: Origin) -> Result<Incident, EngineError> {
        let settings = &self.inner.settings;

        let assignee = match self.inner.roster.resolve_on_duty(&settings.schedule).await {
            Ok(on_duty) => {
                if on_duty.is_empty() {
                    warn!(schedule = %settings.schedule, "Nobody resolvable is on duty");
                }
                on_duty.into_iter().next()
            }
            Err(e) => {
                warn!(schedule = %settings.schedule, error = %e, "Failed to resolve on-duty engineer");
                None
            }
        };

        let request = NewIncident {
            message: ALERT_MESSAGE.to_string(),
            description: description.to_string(),
            priority: settings.default_priority,
            schedule: settings.schedule.clone(),
            tags: vec![INCIDENT_TAG.to_string(), settings.group.clone()],
        };

        let id = self.inner.backend.create(&request).await.map_err(|source| {
            error!(schedule = %settings.schedule, error = %source, "Failed to open incident");
            EngineError::Backend {
                action: Action::Create,
                source,
            }
        })?;

        let incident = Incident {
            id: id.clone(),
            priority: settings.default_priority,
            state: IncidentState::Open,
            assignee,
            origin: Some(origin),
            escalation_deadline: None,
            created_at: Utc::now(),
        };

        self.inner
            .registry
            .lock()
            .await
            .incidents
            .insert(id.clone(), incident.clone());

        info!(
            incident_id = %id,
            schedule = %settings.schedule,
            priority = %incident.priority,
            assignee = incident.assignee.as_deref().unwrap_or("-"),
            "Incident opened"
        );
        Ok(incident)
    }

    /// Start the escalation countdown of an open incident.
    ///
    /// `target` is the chat message the observer keeps up to date; without
    /// one the incident still escalates but nothing is rendered. Returns
    /// `false` without doing anything when no ladder is configured, the
    /// incident is not open or a countdown is already running for it.
    pub async fn start_countdown(
        &self,
        id: &IncidentId,
        target: Option<MessageRef>,
        observer: Arc<dyn CountdownObserver>,
    ) -> bool {
        let Some(ladder) = self.inner.settings.ladder else {
            return false;
        };

        let (generation, token) = {
            let mut registry = self.inner.registry.lock().await;
            if registry.countdowns.contains_key(id) {
                debug!(incident_id = %id, "Countdown already running");
                return false;
            }

            let Some(incident) = registry.incidents.get_mut(id) else {
                return false;
            };
            if incident.state != IncidentState::Open {
                return false;
            }
            incident.escalation_deadline = Some(Instant::now() + ladder);

            let generation = registry.next_generation();
            let token = self.inner.shutdown.child_token();
            registry.countdowns.insert(
                id.clone(),
                Entry {
                    token: token.clone(),
                    generation,
                },
            );
            (generation, token)
        };

        tokio::spawn(countdown::run(
            self.clone(),
            id.clone(),
            generation,
            ladder,
            token,
            target,
            observer,
        ));
        true
    }

    /// `Open → Acknowledged`.
    pub async fn acknowledge(&self, token: &IncidentToken) -> Result<Incident, EngineError> {
        self.transition(
            token,
            Action::Acknowledge,
            &[IncidentState::Open],
            self.inner.backend.acknowledge(&token.id),
            |incident| incident.state = IncidentState::Acknowledged,
        )
        .await
    }

    /// `Open | Acknowledged → Closed`. Closed incidents are no longer
    /// tracked.
    pub async fn close(&self, token: &IncidentToken) -> Result<Incident, EngineError> {
        self.transition(
            token,
            Action::Close,
            &[IncidentState::Open, IncidentState::Acknowledged],
            self.inner.backend.close(&token.id),
            |incident| incident.state = IncidentState::Closed,
        )
        .await
    }

    /// Raise the incident to the highest priority. The state is unchanged.
    ///
    /// A manual escalation is allowed while open or acknowledged and cancels
    /// the countdown. A ladder expiry only applies to an open incident.
    pub async fn escalate(
        &self,
        token: &IncidentToken,
        reason: EscalationReason,
    ) -> Result<Incident, EngineError> {
        match reason {
            EscalationReason::Manual => {
                self.transition(
                    token,
                    Action::Escalate,
                    &[IncidentState::Open, IncidentState::Acknowledged],
                    self.inner
                        .backend
                        .update_priority(&token.id, Priority::HIGHEST),
                    |incident| incident.priority = incident.priority.max(Priority::HIGHEST),
                )
                .await
            }
            EscalationReason::LadderExpired => match self.expire(&token.id, None).await? {
                Some(incident) => Ok(incident),
                None => Err(EngineError::InvalidTransition {
                    id: token.id.clone(),
                    state: self
                        .incident(&token.id)
                        .await
                        .map_or(IncidentState::Closed, |incident| incident.state),
                    action: Action::Escalate,
                }),
            },
        }
    }

    /// Snapshot of a tracked incident.
    pub async fn incident(&self, id: &IncidentId) -> Option<Incident> {
        self.inner.registry.lock().await.incidents.get(id).cloned()
    }

    /// The tracked incident for `token`, or one rebuilt from the token when
    /// the engine does not track it.
    pub async fn view(&self, token: &IncidentToken) -> Incident {
        match self.incident(&token.id).await {
            Some(incident) => incident,
            None => self.untracked(token).await,
        }
    }

    /// Whether a countdown is live for `id`.
    pub async fn has_countdown(&self, id: &IncidentId) -> bool {
        self.inner.registry.lock().await.countdowns.contains_key(id)
    }

    /// Number of live countdowns.
    pub async fn countdowns(&self) -> usize {
        self.inner.registry.lock().await.countdowns.len()
    }

    /// Number of tracked (open or acknowledged) incidents.
    pub async fn tracked(&self) -> usize {
        self.inner.registry.lock().await.incidents.len()
    }

    /// Stop every countdown. Used on shutdown.
    pub fn shutdown(&self) {
        self.inner.shutdown.cancel();
    }

    async fn transition<F>(
        &self,
        token: &IncidentToken,
        action: Action,
        allowed: &[IncidentState],
        call: F,
        update: impl FnOnce(&mut Incident),
    ) -> Result<Incident, EngineError>
    where
        F: Future<Output = Result<(), BackendError>>,
    {
        let id = &token.id;

        let tracked = {
            let mut registry = self.inner.registry.lock().await;
            if registry.cancel(id) {
                debug!(incident_id = %id, %action, "Countdown cancelled");
            }

            if registry.is_closed(id) {
                return Err(EngineError::InvalidTransition {
                    id: id.clone(),
                    state: IncidentState::Closed,
                    action,
                });
            }

            match registry.incidents.get(id) {
                Some(incident) if !allowed.contains(&incident.state) => {
                    return Err(EngineError::InvalidTransition {
                        id: id.clone(),
                        state: incident.state,
                        action,
                    });
                }
                Some(_) => true,
                None => false,
            }
        };

        if let Err(source) = call.await {
            warn!(incident_id = %id, %action, error = %source, "Backend call failed");
            return Err(EngineError::Backend { action, source });
        }

        if tracked {
            let mut registry = self.inner.registry.lock().await;
            if let Some(incident) = registry.incidents.get_mut(id) {
                update(incident);
                let snapshot = incident.clone();
                if snapshot.state == IncidentState::Closed {
                    registry.close(id);
                }

                info!(incident_id = %id, %action, state = %snapshot.state, priority = %snapshot.priority, "Incident updated");
                return Ok(snapshot);
            }
        }

        let mut incident = self.untracked(token).await;
        update(&mut incident);
        if incident.state == IncidentState::Closed {
            self.inner.registry.lock().await.close(id);
        }
        info!(incident_id = %id, %action, "Untracked incident updated");
        Ok(incident)
    }

    /// Ladder expiry. With `generation`, only the countdown that owns the
    /// entry may expire it. Returns `None` when there is nothing to escalate.
    async fn expire(
        &self,
        id: &IncidentId,
        generation: Option<u64>,
    ) -> Result<Option<Incident>, EngineError> {
        {
            let mut registry = self.inner.registry.lock().await;
            if let Some(generation) = generation {
                if !registry.is_live(id, generation) {
                    return Ok(None);
                }
            }
            registry.cancel(id);

            match registry.incidents.get(id) {
                Some(incident) if incident.state == IncidentState::Open => {}
                _ => return Ok(None),
            }
        }

        self.inner
            .backend
            .update_priority(id, Priority::HIGHEST)
            .await
            .map_err(EngineError::backend(Action::Escalate))?;

        let mut registry = self.inner.registry.lock().await;
        Ok(registry.incidents.get_mut(id).map(|incident| {
            incident.priority = incident.priority.max(Priority::HIGHEST);
            incident.clone()
        }))
    }

    async fn escalate_expired(
        &self,
        id: &IncidentId,
        generation: u64,
    ) -> Result<Option<Incident>, EngineError> {
        self.expire(id, Some(generation)).await
    }

    /// Tracked incident if `generation` is still its live countdown.
    async fn live_snapshot(&self, id: &IncidentId, generation: u64) -> Option<Incident> {
        let registry = self.inner.registry.lock().await;
        if registry.is_live(id, generation) {
            registry.incidents.get(id).cloned()
        } else {
            None
        }
    }

    async fn untracked(&self, token: &IncidentToken) -> Incident {
        let schedule = &self.inner.settings.schedule;
        let assignee = match self.inner.roster.resolve_on_duty(schedule).await {
            Ok(on_duty) => on_duty.into_iter().next(),
            Err(e) => {
                warn!(schedule = %schedule, error = %e, "Failed to resolve on-duty engineer");
                None
            }
        };

        Incident {
            id: token.id.clone(),
            priority: token.priority,
            state: IncidentState::Open,
            assignee,
            origin: None,
            escalation_deadline: None,
            created_at: Utc::now(),
        }
    }
}
