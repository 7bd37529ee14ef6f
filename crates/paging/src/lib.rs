//! Paging backend for on-call incidents.
//!
//! The escalation engine never talks to a paging vendor directly. It goes
//! through the [`IncidentBackend`] trait, which covers the whole incident
//! lifecycle the engine needs:
//!
//! - open an incident routed to a schedule
//! - acknowledge / close it
//! - raise its priority
//! - look up who is currently on call for a schedule
//!
//! [`OpsgenieClient`] is the production implementation. It owns its own
//! retry policy so callers can treat every call as a single fallible step.

#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod backend;
pub mod error;
pub mod opsgenie;
pub mod priority;
pub mod retry;

pub use backend::{IncidentBackend, IncidentId, NewIncident};
pub use error::BackendError;
pub use opsgenie::{OpsgenieClient, OpsgenieConfig};
pub use priority::Priority;
pub use retry::RetryPolicy;
