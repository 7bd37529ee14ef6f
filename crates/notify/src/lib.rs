//! Chat transport for the on-call bot.
//!
//! This crate hides the chat platform behind three traits so the escalation
//! engine never talks to Slack directly:
//!
//! - [`Notifier`] posts, updates and deletes messages and resolves users
//! - [`UserGroups`] rewrites the membership of a user group
//! - [`EventSource`] yields inbound mentions, button clicks and slash commands
//!
//! # Usage
//!
//! ```no_run
//! use notify::{EventSource, SlackClient, SocketModeSource};
//!
//! # async fn run() -> Result<(), notify::ChannelError> {
//! let client = SlackClient::new("xoxb-...").with_app_token("xapp-...");
//! let mut events = SocketModeSource::new(client.clone());
//!
//! while let Some(envelope) = events.next_envelope().await {
//!     events.ack(&envelope.id).await?;
//! }
//! # Ok(())
//! # }
//! ```

#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod channels;
pub mod error;
pub mod events;
pub mod message;

pub use channels::slack::{SlackClient, SocketModeSource};
pub use channels::{Notifier, UserGroups};
pub use error::ChannelError;
pub use events::{ChatEvent, Envelope, EventSource};
pub use message::{Button, ButtonStyle, Color, Field, Message, MessageRef, Origin};
