//! Inbound chat events.

use async_trait::async_trait;

use crate::error::ChannelError;
use crate::message::{MessageRef, Origin};

/// Events a chat platform delivers to the bot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatEvent {
    /// Somebody mentioned the bot.
    Mention {
        origin: Origin,
        user: String,
        text: String,
        /// The mention arrived as an edit of an earlier message
        edited: bool,
    },

    /// A button on one of the bot's messages was clicked.
    ButtonClick {
        message: MessageRef,
        user: String,
        /// Value of the clicked button
        action: String,
        /// Context the message was rendered with
        callback_id: String,
    },

    /// A slash command addressed to the bot.
    SlashCommand {
        channel: String,
        user: String,
        command: String,
        text: String,
    },
}

impl ChatEvent {
    /// Short name used in logs.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Mention { .. } => "mention",
            Self::ButtonClick { .. } => "button_click",
            Self::SlashCommand { .. } => "slash_command",
        }
    }
}

/// One delivery from the transport.
///
/// Delivery is at-least-once; every envelope must be acknowledged as soon as
/// it is accepted, whether or not its event is one the bot understands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    pub id: String,
    /// `None` for payloads the bot does not handle
    pub event: Option<ChatEvent>,
}

/// An ordered stream of inbound envelopes.
#[async_trait]
pub trait EventSource: Send {
    /// Wait for the next envelope. `None` means the stream ended for good.
    async fn next_envelope(&mut self) -> Option<Envelope>;

    /// Acknowledge receipt of an envelope.
    async fn ack(&mut self, envelope_id: &str) -> Result<(), ChannelError>;
}
