//! On-call responder.
//!
//! Somebody mentions the bot in a chat channel, the bot opens an incident in
//! the paging backend for the schedule on duty and replies with buttons to
//! acknowledge, close or escalate it. Incidents nobody acknowledges are raised
//! to P1 once the escalation ladder runs out.
//!
//! # Architecture
//!
//! ```text
//! chat event ─► EventDispatcher ─► EscalationEngine ─► IncidentBackend
//!                     │                  │
//!                     │                  └─► countdown task (one per incident)
//!                     ▼                           │
//!                  Notifier ◄──── ChatRenderer ◄──┘
//! ```
//!
//! - [`roster::DutyRoster`] resolves who is on duty
//! - [`engine::EscalationEngine`] owns incident state and countdowns
//! - [`dispatcher::EventDispatcher`] turns chat events into engine calls
//! - [`render`] turns incident state into chat messages
//! - [`sync::GroupSync`] keeps chat user groups equal to the roster

#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod dispatcher;
pub mod engine;
pub mod error;
pub mod incident;
pub mod render;
pub mod roster;
pub mod sync;
pub mod telemetry;

#[cfg(test)]
mod testing;

pub use config::Config;
pub use dispatcher::EventDispatcher;
pub use engine::{CountdownObserver, EngineSettings, EscalationEngine};
pub use error::{ConfigError, EngineError};
pub use incident::{Action, ButtonAction, EscalationReason, Incident, IncidentState, IncidentToken};
pub use render::{ChatRenderer, Messages, Renderer};
pub use roster::DutyRoster;
pub use sync::{GroupSync, SyncReport, SyncTarget};
