//! Incident model.

use chrono::{DateTime, Utc};
use notify::Origin;
use paging::{IncidentId, Priority};
use std::fmt;
use std::str::FromStr;
use tokio::time::Instant;

/// Lifecycle state of an incident.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IncidentState {
    Open,
    Acknowledged,
    Closed,
}

impl fmt::Display for IncidentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Open => "open",
            Self::Acknowledged => "acknowledged",
            Self::Closed => "closed",
        })
    }
}

/// An incident the engine knows about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Incident {
    pub id: IncidentId,
    /// Never decreases over the incident's life
    pub priority: Priority,
    pub state: IncidentState,
    /// Chat identity that was on duty when the incident was opened
    pub assignee: Option<String>,
    /// Where help was requested
    pub origin: Option<Origin>,
    /// When the ladder expires; only set while the incident is open and a
    /// countdown is running
    pub escalation_deadline: Option<Instant>,
    pub created_at: DateTime<Utc>,
}

impl Incident {
    /// Token to embed into a rendered message.
    #[must_use]
    pub fn token(&self) -> IncidentToken {
        IncidentToken {
            id: self.id.clone(),
            priority: self.priority,
        }
    }
}

/// Operations on an incident.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    Create,
    Acknowledge,
    Close,
    Escalate,
}

/// Actions a user can trigger from the buttons of an incident message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ButtonAction {
    Acknowledge,
    Close,
    Increase,
}

impl ButtonAction {
    /// Map a clicked button value to its action.
    #[must_use]
    pub fn from_value(value: &str) -> Option<Self> {
        match value {
            "alert_acknowledge" => Some(Self::Acknowledge),
            "alert_close" => Some(Self::Close),
            "alert_increase_priority" => Some(Self::Increase),
            _ => None,
        }
    }

    /// Value carried by the button.
    #[must_use]
    pub const fn value(self) -> &'static str {
        match self {
            Self::Acknowledge => "alert_acknowledge",
            Self::Close => "alert_close",
            Self::Increase => "alert_increase_priority",
        }
    }
}

impl From<ButtonAction> for Action {
    fn from(button: ButtonAction) -> Self {
        match button {
            ButtonAction::Acknowledge => Self::Acknowledge,
            ButtonAction::Close => Self::Close,
            ButtonAction::Increase => Self::Escalate,
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Create => "create",
            Self::Acknowledge => "acknowledge",
            Self::Close => "close",
            Self::Escalate => "escalate",
        })
    }
}

/// Why an escalation happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EscalationReason {
    /// Somebody clicked the increase button
    Manual,
    /// Nobody acknowledged before the ladder ran out
    LadderExpired,
}

impl fmt::Display for EscalationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Manual => "manual",
            Self::LadderExpired => "ladder_expired",
        })
    }
}

/// Incident context carried by every interactive message, encoded as
/// `<incident id>;<priority>`.
///
/// The token lets a click be served even when the engine no longer tracks
/// the incident (it was closed, or the process restarted).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncidentToken {
    pub id: IncidentId,
    pub priority: Priority,
}

impl IncidentToken {
    #[must_use]
    pub fn new(id: IncidentId, priority: Priority) -> Self {
        Self { id, priority }
    }
}

impl fmt::Display for IncidentToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{};{}", self.id, self.priority)
    }
}

impl FromStr for IncidentToken {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (id, priority) = s
            .split_once(';')
            .ok_or_else(|| format!("Malformed incident token: {s}"))?;

        if id.is_empty() {
            return Err(format!("Incident token without id: {s}"));
        }

        Ok(Self {
            id: IncidentId::new(id),
            priority: priority.parse()?,
        })
    }
}
