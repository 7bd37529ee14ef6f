//! Slack API types.

use serde::{Deserialize, Serialize};

use crate::message::{Button, ButtonStyle, Message};

#[derive(Debug, Serialize)]
pub(super) struct SlackAttachment {
    fallback: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    color: Option<String>,
    text: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    fields: Vec<SlackField>,
    actions: Vec<SlackAction>,
    #[serde(skip_serializing_if = "Option::is_none")]
    callback_id: Option<String>,
}

#[derive(Debug, Serialize)]
struct SlackField {
    title: String,
    value: String,
    short: bool,
}

#[derive(Debug, Serialize)]
struct SlackAction {
    name: String,
    text: String,
    #[serde(rename = "type")]
    kind: &'static str,
    value: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    style: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    confirm: Option<SlackConfirm>,
}

#[derive(Debug, Serialize)]
struct SlackConfirm {
    text: String,
}

#[derive(Debug, Deserialize)]
pub(super) struct UserGroup {
    pub id: String,
    pub handle: String,
}

impl From<&Message> for SlackAttachment {
    fn from(message: &Message) -> Self {
        Self {
            fallback: message.text.clone(),
            color: message.color.as_ref().map(|c| c.as_str().to_string()),
            text: message.text.clone(),
            fields: message
                .fields
                .iter()
                .map(|f| SlackField {
                    title: f.title.clone(),
                    value: f.value.clone(),
                    short: f.short,
                })
                .collect(),
            actions: message.buttons.iter().map(SlackAction::from).collect(),
            callback_id: message.callback_id.clone(),
        }
    }
}

impl From<&Button> for SlackAction {
    fn from(button: &Button) -> Self {
        Self {
            name: button.name.clone(),
            text: button.text.clone(),
            kind: "button",
            value: button.value.clone(),
            style: match button.style {
                ButtonStyle::Default => None,
                ButtonStyle::Primary => Some("primary"),
                ButtonStyle::Danger => Some("danger"),
            },
            confirm: button
                .confirm
                .as_ref()
                .map(|text| SlackConfirm { text: text.clone() }),
        }
    }
}
