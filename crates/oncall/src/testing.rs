//! Collaborator doubles shared by the unit tests.

use async_trait::async_trait;
use mockall::mock;
use notify::{ChannelError, Message, MessageRef, Notifier, Origin, UserGroups};
use paging::{BackendError, IncidentBackend, IncidentId, NewIncident, Priority};

mock! {
    pub Backend {}

    #[async_trait]
    impl IncidentBackend for Backend {
        async fn create(&self, incident: &NewIncident) -> Result<IncidentId, BackendError>;
        async fn close(&self, id: &IncidentId) -> Result<(), BackendError>;
        async fn acknowledge(&self, id: &IncidentId) -> Result<(), BackendError>;
        async fn update_priority(&self, id: &IncidentId, priority: Priority) -> Result<(), BackendError>;
        async fn on_call(&self, schedule: &str) -> Result<Vec<String>, BackendError>;
    }
}

mock! {
    pub Chat {}

    #[async_trait]
    impl Notifier for Chat {
        async fn resolve_identity(&self, handle: &str) -> Result<Option<String>, ChannelError>;
        async fn post(&self, origin: &Origin, message: &Message) -> Result<MessageRef, ChannelError>;
        async fn update(&self, target: &MessageRef, message: &Message) -> Result<(), ChannelError>;
        async fn delete(&self, target: &MessageRef) -> Result<(), ChannelError>;
        async fn ephemeral(&self, channel: &str, user: &str, text: &str) -> Result<(), ChannelError>;
        async fn permalink(&self, origin: &Origin) -> Result<String, ChannelError>;
    }
}

mock! {
    pub Groups {}

    #[async_trait]
    impl UserGroups for Groups {
        async fn group_id(&self, handle: &str) -> Result<Option<String>, ChannelError>;
        async fn replace_members(&self, group_id: &str, members: &[String]) -> Result<(), ChannelError>;
    }
}

/// Chat double that knows `alice`, `bob` and `carol` by email.
pub fn directory() -> MockChat {
    let mut chat = MockChat::new();
    chat.expect_resolve_identity().returning(|handle| {
        Ok(match handle {
            "alice@example.com" => Some("U_ALICE".to_string()),
            "bob@example.com" => Some("U_BOB".to_string()),
            "carol@example.com" => Some("U_CAROL".to_string()),
            _ => None,
        })
    });
    chat
}
