//! Rendering of incident state into chat messages.
//!
//! Every interactive message carries the priority and on-duty fields, an
//! optional countdown field and the buttons allowed in the incident's state:
//!
//! | state        | buttons                                |
//! |--------------|----------------------------------------|
//! | Open         | Increase priority (below P1), Ack, Close |
//! | Acknowledged | Close                                  |
//! | Closed       | none                                   |

use async_trait::async_trait;
use notify::{Button, ButtonStyle, Color, Field, Message, MessageRef, Notifier};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

use crate::engine::CountdownObserver;
use crate::error::EngineError;
use crate::incident::{ButtonAction, Incident, IncidentState};

/// Placeholder replaced by a user mention.
const USER_PLACEHOLDER: &str = "_user_";
/// Placeholder replaced by a `mm:ss` duration.
const TIME_PLACEHOLDER: &str = "_time_";

/// Colour of acknowledged incidents.
const ACKNOWLEDGED_COLOR: &str = "#039be5";

/// User-facing texts. Every entry can be overridden in the `messages`
/// section of the config file.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Messages {
    pub create_success: String,
    pub create_failure: String,
    pub acknowledge_success: String,
    pub acknowledge_failure: String,
    pub close_success: String,
    pub close_failure: String,
    pub increase_success: String,
    pub increase_failure: String,
    /// Confirmation prompt of the increase button
    pub increase_tip: String,
    pub command_on_duty: String,
    pub command_help: String,
    pub command_unknown: String,
    /// Shown in place of a user when nobody is on duty
    pub nobody_on_duty: String,
    pub field_priority: String,
    pub field_on_duty: String,
    pub field_escalates_after: String,
}

impl Default for Messages {
    fn default() -> Self {
        Self {
            create_success: "The engineer on duty has been notified and will be coming soon"
                .to_string(),
            create_failure: "I couldn't create an alert in Opsgenie :sob:".to_string(),
            acknowledge_success: "The engineer on duty has read the notification (_user_)"
                .to_string(),
            acknowledge_failure: "Failed to update alert status :sob:".to_string(),
            close_success: ":dizzy: The alert was closed".to_string(),
            close_failure: ":bangbang: Failed to close alert".to_string(),
            increase_success: ":fire: The alert priority has been increased".to_string(),
            increase_failure: ":bangbang: Failed to increase alert priority".to_string(),
            increase_tip: ":no_entry_sign: You can increase the priority of the notification, \
                           but be careful not to do this if it is not necessary"
                .to_string(),
            command_on_duty: "The engineer on duty - _user_".to_string(),
            command_help: "Available arguments for slash commands: *who*, *w*".to_string(),
            command_unknown: ":bangbang: Unknown command".to_string(),
            nobody_on_duty: "nobody".to_string(),
            field_priority: "Priority".to_string(),
            field_on_duty: "On duty".to_string(),
            field_escalates_after: "P1 after _time_".to_string(),
        }
    }
}

/// Chat mention of a user id.
#[must_use]
pub fn mention(user: &str) -> String {
    format!("<@{user}>")
}

/// `mm:ss` representation of a duration, rounded down to whole seconds.
#[must_use]
pub fn format_remaining(remaining: Duration) -> String {
    let secs = remaining.as_secs();
    format!("{:02}:{:02}", secs / 60, secs % 60)
}

/// Pure incident → message rendering.
#[derive(Debug, Clone)]
pub struct Renderer {
    messages: Messages,
    confirm_increase: bool,
}

impl Renderer {
    #[must_use]
    pub fn new(messages: Messages, confirm_increase: bool) -> Self {
        Self {
            messages,
            confirm_increase,
        }
    }

    #[must_use]
    pub fn messages(&self) -> &Messages {
        &self.messages
    }

    /// Render `incident` under the headline `text`.
    ///
    /// `remaining` adds the countdown field; pass `None` once no countdown
    /// is running.
    #[must_use]
    pub fn incident(&self, incident: &Incident, text: &str, remaining: Option<Duration>) -> Message {
        let on_duty = incident
            .assignee
            .as_deref()
            .map_or_else(|| self.messages.nobody_on_duty.clone(), mention);

        let mut fields = vec![
            Field::short(&self.messages.field_priority, incident.priority.as_str()),
            Field::short(&self.messages.field_on_duty, on_duty),
        ];

        if let Some(remaining) = remaining {
            let title = self
                .messages
                .field_escalates_after
                .replace(TIME_PLACEHOLDER, &format_remaining(remaining));
            fields.push(Field::short(title, ""));
        }

        Message {
            text: text.to_string(),
            color: Some(Self::color(incident)),
            fields,
            buttons: self.buttons(incident),
            callback_id: Some(incident.token().to_string()),
        }
    }

    /// Reply to a mention that opened `incident`.
    #[must_use]
    pub fn created(&self, incident: &Incident, requester: &str, ladder: Option<Duration>) -> Message {
        let text = with_user(&self.messages.create_success, requester);
        self.incident(incident, &text, ladder)
    }

    /// Reply to a mention when no incident could be opened: text only.
    #[must_use]
    pub fn create_failed(&self, requester: &str) -> Message {
        Message::text(with_user(&self.messages.create_failure, requester))
    }

    /// Result of a button click. On failure `incident` is the state the
    /// incident was left in.
    #[must_use]
    pub fn action(&self, action: ButtonAction, incident: &Incident, user: &str, succeeded: bool) -> Message {
        let m = &self.messages;
        let text = match (action, succeeded) {
            (ButtonAction::Acknowledge, true) => &m.acknowledge_success,
            (ButtonAction::Acknowledge, false) => &m.acknowledge_failure,
            (ButtonAction::Close, true) => &m.close_success,
            (ButtonAction::Close, false) => &m.close_failure,
            (ButtonAction::Increase, true) => &m.increase_success,
            (ButtonAction::Increase, false) => &m.increase_failure,
        };

        self.incident(incident, &with_user(text, user), None)
    }

    /// Periodic countdown refresh of a freshly opened incident.
    #[must_use]
    pub fn countdown(&self, incident: &Incident, remaining: Duration) -> Message {
        self.incident(incident, &self.messages.create_success, Some(remaining))
    }

    /// Final render once the ladder ran out.
    #[must_use]
    pub fn expired(&self, incident: &Incident, succeeded: bool) -> Message {
        let text = if succeeded {
            &self.messages.create_success
        } else {
            &self.messages.increase_failure
        };
        self.incident(incident, text, None)
    }

    #[must_use]
    pub fn on_duty(&self, user: Option<&str>) -> String {
        let who = user.map_or_else(|| self.messages.nobody_on_duty.clone(), mention);
        self.messages.command_on_duty.replace(USER_PLACEHOLDER, &who)
    }

    #[must_use]
    pub fn help(&self) -> String {
        self.messages.command_help.clone()
    }

    #[must_use]
    pub fn unknown_command(&self) -> String {
        self.messages.command_unknown.clone()
    }

    fn color(incident: &Incident) -> Color {
        match incident.state {
            IncidentState::Closed => Color::Good,
            IncidentState::Acknowledged => Color::Hex(ACKNOWLEDGED_COLOR.to_string()),
            IncidentState::Open if incident.priority.is_highest() => Color::Danger,
            IncidentState::Open => Color::Warning,
        }
    }

    fn buttons(&self, incident: &Incident) -> Vec<Button> {
        match incident.state {
            IncidentState::Open => {
                let mut buttons = Vec::with_capacity(3);
                if !incident.priority.is_highest() {
                    buttons.push(self.increase_button());
                }
                buttons.push(button(ButtonAction::Acknowledge, "Ack", ButtonStyle::Default));
                buttons.push(button(ButtonAction::Close, "Close", ButtonStyle::Primary));
                buttons
            }
            IncidentState::Acknowledged => {
                vec![button(ButtonAction::Close, "Close", ButtonStyle::Primary)]
            }
            IncidentState::Closed => Vec::new(),
        }
    }

    fn increase_button(&self) -> Button {
        let mut increase = button(ButtonAction::Increase, "Increase priority", ButtonStyle::Danger);
        if self.confirm_increase {
            increase.confirm = Some(self.messages.increase_tip.clone());
        }
        increase
    }
}

fn button(action: ButtonAction, text: &str, style: ButtonStyle) -> Button {
    Button {
        name: action.value().to_string(),
        text: text.to_string(),
        value: action.value().to_string(),
        style,
        confirm: None,
    }
}

fn with_user(template: &str, user: &str) -> String {
    template.replace(USER_PLACEHOLDER, &mention(user))
}

/// Pushes countdown updates into the chat message of an incident.
pub struct ChatRenderer {
    notifier: Arc<dyn Notifier>,
    renderer: Renderer,
}

impl ChatRenderer {
    #[must_use]
    pub fn new(notifier: Arc<dyn Notifier>, renderer: Renderer) -> Self {
        Self { notifier, renderer }
    }

    #[must_use]
    pub fn renderer(&self) -> &Renderer {
        &self.renderer
    }

    async fn update(&self, target: &MessageRef, message: &Message) {
        if let Err(e) = self.notifier.update(target, message).await {
            warn!(channel = %target.channel, ts = %target.ts, error = %e, "Failed to update incident message");
        }
    }
}

#[async_trait]
impl CountdownObserver for ChatRenderer {
    async fn tick(&self, target: &MessageRef, incident: &Incident, remaining: Duration) {
        self.update(target, &self.renderer.countdown(incident, remaining))
            .await;
    }

    async fn expired(&self, target: &MessageRef, incident: &Incident, error: Option<&EngineError>) {
        self.update(target, &self.renderer.expired(incident, error.is_none()))
            .await;
    }
}
