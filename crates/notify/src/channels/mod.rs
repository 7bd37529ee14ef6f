//! Chat channel implementations.

pub mod slack;

use async_trait::async_trait;

use crate::error::ChannelError;
use crate::message::{Message, MessageRef, Origin};

/// Outbound side of a chat platform.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Translate a roster handle (an email address) into a chat user id.
    ///
    /// Returns `Ok(None)` when the platform has no such user.
    async fn resolve_identity(&self, handle: &str) -> Result<Option<String>, ChannelError>;

    /// Post a reply in the thread of `origin`.
    async fn post(&self, origin: &Origin, message: &Message) -> Result<MessageRef, ChannelError>;

    /// Overwrite a previously posted message.
    async fn update(&self, target: &MessageRef, message: &Message) -> Result<(), ChannelError>;

    /// Delete a previously posted message.
    async fn delete(&self, target: &MessageRef) -> Result<(), ChannelError>;

    /// Show `text` to a single user only.
    async fn ephemeral(&self, channel: &str, user: &str, text: &str) -> Result<(), ChannelError>;

    /// Permanent link to the message at `origin`.
    async fn permalink(&self, origin: &Origin) -> Result<String, ChannelError>;
}

/// Management of chat user groups (e.g. `@devops-duty`).
#[async_trait]
pub trait UserGroups: Send + Sync {
    /// Find a user group id by its handle.
    async fn group_id(&self, handle: &str) -> Result<Option<String>, ChannelError>;

    /// Replace the members of a user group.
    async fn replace_members(&self, group_id: &str, members: &[String]) -> Result<(), ChannelError>;
}
