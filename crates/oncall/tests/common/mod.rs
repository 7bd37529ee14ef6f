//! Recording fakes for the engine and dispatcher suites.

#![allow(dead_code)]

use async_trait::async_trait;
use notify::{
    ChannelError, Envelope, EventSource, Message, MessageRef, Notifier, Origin,
};
use oncall::{CountdownObserver, DutyRoster, EngineError, EngineSettings, EscalationEngine, Incident};
use paging::{BackendError, IncidentBackend, IncidentId, NewIncident, Priority};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

// =============================================================================
// Backend
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Create(NewIncident),
    Acknowledge(IncidentId),
    Close(IncidentId),
    UpdatePriority(IncidentId, Priority),
    OnCall(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertStatus {
    Open,
    Acknowledged,
    Closed,
}

#[derive(Debug, Default)]
struct BackendState {
    next_id: u32,
    alerts: HashMap<IncidentId, (AlertStatus, Priority)>,
    calls: Vec<Call>,
    failing: HashSet<&'static str>,
    on_call: Vec<String>,
}

/// In-memory paging backend that behaves like Opsgenie for the lifecycle
/// calls: acknowledging or closing a closed alert is an error.
#[derive(Debug, Default)]
pub struct FakeBackend {
    state: Mutex<BackendState>,
}

impl FakeBackend {
    pub fn with_on_call(handles: &[&str]) -> Self {
        let backend = Self::default();
        backend.state.lock().unwrap().on_call = handles.iter().map(ToString::to_string).collect();
        backend
    }

    /// Make every call of `operation` fail from now on.
    pub fn fail(&self, operation: &'static str) {
        self.state.lock().unwrap().failing.insert(operation);
    }

    pub fn recover(&self, operation: &'static str) {
        self.state.lock().unwrap().failing.remove(operation);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn count(&self, operation: &str) -> usize {
        self.calls()
            .iter()
            .filter(|call| call_name(call) == operation)
            .count()
    }

    /// Every priority ever sent for `id`, in order.
    pub fn priorities(&self, id: &IncidentId) -> Vec<Priority> {
        self.calls()
            .iter()
            .filter_map(|call| match call {
                Call::UpdatePriority(target, priority) if target == id => Some(*priority),
                _ => None,
            })
            .collect()
    }

    pub fn alert(&self, id: &IncidentId) -> Option<(AlertStatus, Priority)> {
        self.state.lock().unwrap().alerts.get(id).copied()
    }

    fn record(&self, call: Call) -> Result<(), BackendError> {
        let mut state = self.state.lock().unwrap();
        let name = call_name(&call);
        state.calls.push(call);

        if state.failing.contains(name) {
            return Err(BackendError::Api {
                status: 503,
                body: format!("{name} unavailable"),
            });
        }
        Ok(())
    }

    fn transition(&self, id: &IncidentId, to: AlertStatus) -> Result<(), BackendError> {
        let mut state = self.state.lock().unwrap();
        match state.alerts.get_mut(id) {
            Some((AlertStatus::Closed, _)) => Err(BackendError::Api {
                status: 422,
                body: "Alert is already closed".to_string(),
            }),
            Some((status, _)) => {
                *status = to;
                Ok(())
            }
            None => Err(BackendError::Api {
                status: 404,
                body: "Alert does not exist".to_string(),
            }),
        }
    }
}

fn call_name(call: &Call) -> &'static str {
    match call {
        Call::Create(_) => "create",
        Call::Acknowledge(_) => "acknowledge",
        Call::Close(_) => "close",
        Call::UpdatePriority(..) => "update_priority",
        Call::OnCall(_) => "on_call",
    }
}

#[async_trait]
impl IncidentBackend for FakeBackend {
    async fn create(&self, incident: &NewIncident) -> Result<IncidentId, BackendError> {
        self.record(Call::Create(incident.clone()))?;

        let mut state = self.state.lock().unwrap();
        state.next_id += 1;
        let id = IncidentId::new(format!("alert-{}", state.next_id));
        state
            .alerts
            .insert(id.clone(), (AlertStatus::Open, incident.priority));
        Ok(id)
    }

    async fn close(&self, id: &IncidentId) -> Result<(), BackendError> {
        self.record(Call::Close(id.clone()))?;
        self.transition(id, AlertStatus::Closed)
    }

    async fn acknowledge(&self, id: &IncidentId) -> Result<(), BackendError> {
        self.record(Call::Acknowledge(id.clone()))?;
        self.transition(id, AlertStatus::Acknowledged)
    }

    async fn update_priority(&self, id: &IncidentId, priority: Priority) -> Result<(), BackendError> {
        self.record(Call::UpdatePriority(id.clone(), priority))?;

        let mut state = self.state.lock().unwrap();
        if let Some((_, current)) = state.alerts.get_mut(id) {
            *current = priority;
        }
        Ok(())
    }

    async fn on_call(&self, schedule: &str) -> Result<Vec<String>, BackendError> {
        self.record(Call::OnCall(schedule.to_string()))?;
        Ok(self.state.lock().unwrap().on_call.clone())
    }
}

// =============================================================================
// Chat
// =============================================================================

#[derive(Debug, Default)]
struct ChatState {
    users: HashMap<String, String>,
    next_ts: u32,
    posts: Vec<(Origin, Message)>,
    updates: Vec<(MessageRef, Message)>,
    ephemerals: Vec<(String, String, String)>,
    permalink_broken: bool,
    posts_broken: bool,
}

/// Chat platform that records everything the bot sends.
#[derive(Debug, Default)]
pub struct FakeChat {
    state: Mutex<ChatState>,
}

impl FakeChat {
    /// A workspace where `alice` and `bob` exist.
    pub fn team() -> Self {
        let chat = Self::default();
        {
            let mut state = chat.state.lock().unwrap();
            state
                .users
                .insert("alice@example.com".to_string(), "U_ALICE".to_string());
            state
                .users
                .insert("bob@example.com".to_string(), "U_BOB".to_string());
        }
        chat
    }

    pub fn break_permalinks(&self) {
        self.state.lock().unwrap().permalink_broken = true;
    }

    pub fn break_posts(&self) {
        self.state.lock().unwrap().posts_broken = true;
    }

    pub fn posts(&self) -> Vec<(Origin, Message)> {
        self.state.lock().unwrap().posts.clone()
    }

    pub fn updates(&self) -> Vec<(MessageRef, Message)> {
        self.state.lock().unwrap().updates.clone()
    }

    pub fn ephemerals(&self) -> Vec<(String, String, String)> {
        self.state.lock().unwrap().ephemerals.clone()
    }
}

#[async_trait]
impl Notifier for FakeChat {
    async fn resolve_identity(&self, handle: &str) -> Result<Option<String>, ChannelError> {
        Ok(self.state.lock().unwrap().users.get(handle).cloned())
    }

    async fn post(&self, origin: &Origin, message: &Message) -> Result<MessageRef, ChannelError> {
        let mut state = self.state.lock().unwrap();
        if state.posts_broken {
            return Err(ChannelError::Api {
                method: "chat.postMessage".to_string(),
                error: "channel_not_found".to_string(),
            });
        }
        state.next_ts += 1;
        let posted = MessageRef::new(&origin.channel, format!("900.{}", state.next_ts));
        state.posts.push((origin.clone(), message.clone()));
        Ok(posted)
    }

    async fn update(&self, target: &MessageRef, message: &Message) -> Result<(), ChannelError> {
        self.state
            .lock()
            .unwrap()
            .updates
            .push((target.clone(), message.clone()));
        Ok(())
    }

    async fn delete(&self, _target: &MessageRef) -> Result<(), ChannelError> {
        Ok(())
    }

    async fn ephemeral(&self, channel: &str, user: &str, text: &str) -> Result<(), ChannelError> {
        self.state.lock().unwrap().ephemerals.push((
            channel.to_string(),
            user.to_string(),
            text.to_string(),
        ));
        Ok(())
    }

    async fn permalink(&self, origin: &Origin) -> Result<String, ChannelError> {
        if self.state.lock().unwrap().permalink_broken {
            return Err(ChannelError::Api {
                method: "chat.getPermalink".to_string(),
                error: "message_not_found".to_string(),
            });
        }
        Ok(format!("https://team.slack.com/archives/{}/p{}", origin.channel, origin.ts))
    }
}

// =============================================================================
// Event source
// =============================================================================

/// Replays a fixed list of envelopes, then ends.
pub struct FakeSource {
    queue: VecDeque<Envelope>,
    acked: Arc<Mutex<Vec<String>>>,
    hold_open: bool,
}

impl FakeSource {
    pub fn new(envelopes: Vec<Envelope>) -> (Self, Arc<Mutex<Vec<String>>>) {
        let acked = Arc::new(Mutex::new(Vec::new()));
        (
            Self {
                queue: envelopes.into(),
                acked: Arc::clone(&acked),
                hold_open: false,
            },
            acked,
        )
    }

    /// Wait forever instead of ending once the envelopes run out.
    #[must_use]
    pub fn hold_open(mut self) -> Self {
        self.hold_open = true;
        self
    }
}

#[async_trait]
impl EventSource for FakeSource {
    async fn next_envelope(&mut self) -> Option<Envelope> {
        match self.queue.pop_front() {
            Some(envelope) => Some(envelope),
            None if self.hold_open => std::future::pending().await,
            None => None,
        }
    }

    async fn ack(&mut self, envelope_id: &str) -> Result<(), ChannelError> {
        self.acked.lock().unwrap().push(envelope_id.to_string());
        Ok(())
    }
}

// =============================================================================
// Countdown observer
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Observed {
    Tick { remaining: u64 },
    Expired { priority: Priority, failed: bool },
}

/// Records countdown callbacks.
#[derive(Debug, Default)]
pub struct RecordingObserver {
    events: Mutex<Vec<Observed>>,
}

impl RecordingObserver {
    pub fn events(&self) -> Vec<Observed> {
        self.events.lock().unwrap().clone()
    }

    pub fn expirations(&self) -> usize {
        self.events()
            .iter()
            .filter(|event| matches!(event, Observed::Expired { .. }))
            .count()
    }
}

#[async_trait]
impl CountdownObserver for RecordingObserver {
    async fn tick(&self, _target: &MessageRef, _incident: &Incident, remaining: Duration) {
        self.events.lock().unwrap().push(Observed::Tick {
            remaining: remaining.as_secs(),
        });
    }

    async fn expired(&self, _target: &MessageRef, incident: &Incident, error: Option<&EngineError>) {
        self.events.lock().unwrap().push(Observed::Expired {
            priority: incident.priority,
            failed: error.is_some(),
        });
    }
}

// =============================================================================
// Wiring
// =============================================================================

pub fn settings(ladder: Option<Duration>) -> EngineSettings {
    EngineSettings {
        group: "devops".to_string(),
        schedule: "DevOps_schedule".to_string(),
        default_priority: Priority::P5,
        ladder,
    }
}

pub fn engine(
    backend: &Arc<FakeBackend>,
    chat: &Arc<FakeChat>,
    ladder: Option<Duration>,
) -> EscalationEngine {
    let roster = DutyRoster::new(backend.clone(), chat.clone());
    EscalationEngine::new(settings(ladder), backend.clone(), roster)
}

pub fn origin() -> Origin {
    Origin::new("C_OPS", "100.000100")
}

pub fn target() -> Option<MessageRef> {
    Some(MessageRef::new("C_OPS", "900.1"))
}
