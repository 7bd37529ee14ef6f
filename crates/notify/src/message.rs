//! Platform-neutral message model.
//!
//! The escalation engine renders incident state into a [`Message`]; a chat
//! channel implementation turns it into whatever its platform expects
//! (Slack attachments, Discord embeds, ...).

use serde::{Deserialize, Serialize};

/// Where a conversation happened: a channel plus the message timestamp and,
/// when the message was posted inside a thread, the thread root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Origin {
    pub channel: String,
    pub ts: String,
    pub thread_ts: Option<String>,
}

impl Origin {
    #[must_use]
    pub fn new(channel: impl Into<String>, ts: impl Into<String>) -> Self {
        Self {
            channel: channel.into(),
            ts: ts.into(),
            thread_ts: None,
        }
    }

    #[must_use]
    pub fn in_thread(mut self, thread_ts: impl Into<String>) -> Self {
        self.thread_ts = Some(thread_ts.into());
        self
    }

    /// Timestamp of the thread replies should go to.
    #[must_use]
    pub fn thread_root(&self) -> &str {
        self.thread_ts.as_deref().unwrap_or(&self.ts)
    }
}

/// Handle to a message that was posted and can be updated or deleted.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageRef {
    pub channel: String,
    pub ts: String,
}

impl MessageRef {
    #[must_use]
    pub fn new(channel: impl Into<String>, ts: impl Into<String>) -> Self {
        Self {
            channel: channel.into(),
            ts: ts.into(),
        }
    }
}

/// Side-bar colour of a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Color {
    Good,
    Warning,
    Danger,
    Hex(String),
}

impl Color {
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Good => "good",
            Self::Warning => "warning",
            Self::Danger => "danger",
            Self::Hex(hex) => hex,
        }
    }
}

/// A short labelled value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Field {
    pub title: String,
    pub value: String,
    pub short: bool,
}

impl Field {
    #[must_use]
    pub fn short(title: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            value: value.into(),
            short: true,
        }
    }
}

/// Visual weight of a button.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ButtonStyle {
    #[default]
    Default,
    Primary,
    Danger,
}

/// An interactive button. `value` comes back in the click event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Button {
    pub name: String,
    pub text: String,
    pub value: String,
    pub style: ButtonStyle,
    /// Confirmation prompt shown before the click is delivered
    pub confirm: Option<String>,
}

/// A complete rendered message.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Message {
    pub text: String,
    pub color: Option<Color>,
    pub fields: Vec<Field>,
    pub buttons: Vec<Button>,
    /// Opaque context echoed back with every button click
    pub callback_id: Option<String>,
}

impl Message {
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Self::default()
        }
    }

    /// Look up a field value by title.
    #[must_use]
    pub fn field(&self, title: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|f| f.title == title)
            .map(|f| f.value.as_str())
    }

    /// Whether a button with this value is present.
    #[must_use]
    pub fn has_button(&self, value: &str) -> bool {
        self.buttons.iter().any(|b| b.value == value)
    }
}
