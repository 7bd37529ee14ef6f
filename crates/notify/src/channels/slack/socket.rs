//! Slack Socket Mode event source.
//!
//! Slack pushes events over a WebSocket opened with an app-level token. Each
//! delivery carries an `envelope_id` that has to be echoed back on the same
//! socket, otherwise Slack redelivers the event.

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

use super::SlackClient;
use crate::error::ChannelError;
use crate::events::{ChatEvent, Envelope, EventSource};
use crate::message::{MessageRef, Origin};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Delay between two connection attempts.
const RECONNECT_DELAY: Duration = Duration::from_secs(5);

/// Socket Mode connection that reconnects transparently.
pub struct SocketModeSource {
    client: SlackClient,
    stream: Option<WsStream>,
}

impl SocketModeSource {
    /// Create a source; the connection is opened lazily on the first read.
    #[must_use]
    pub fn new(client: SlackClient) -> Self {
        Self {
            client,
            stream: None,
        }
    }

    async fn connect(&self) -> Result<WsStream, ChannelError> {
        let url = self.client.open_connection().await?;
        let (stream, _) = tokio_tungstenite::connect_async(url.as_str()).await?;
        info!(channel = "slack", "Socket Mode connected");
        Ok(stream)
    }
}

#[async_trait]
impl EventSource for SocketModeSource {
    async fn next_envelope(&mut self) -> Option<Envelope> {
        loop {
            if self.stream.is_none() {
                match self.connect().await {
                    Ok(stream) => self.stream = Some(stream),
                    Err(e) => {
                        warn!(channel = "slack", error = %e, "Socket Mode connection failed");
                        tokio::time::sleep(RECONNECT_DELAY).await;
                        continue;
                    }
                }
            }

            let Some(stream) = self.stream.as_mut() else {
                continue;
            };

            match stream.next().await {
                Some(Ok(WsMessage::Text(text))) => match parse_frame(&text) {
                    Frame::Envelope(envelope) => return Some(envelope),
                    Frame::Hello => debug!(channel = "slack", "Socket Mode hello"),
                    Frame::Disconnect(reason) => {
                        info!(channel = "slack", reason = %reason, "Socket Mode asked to reconnect");
                        self.stream = None;
                    }
                    Frame::Ignored => {}
                },
                Some(Ok(WsMessage::Close(_))) | None => {
                    info!(channel = "slack", "Socket Mode connection closed");
                    self.stream = None;
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    warn!(channel = "slack", error = %e, "Socket Mode read failed");
                    self.stream = None;
                }
            }
        }
    }

    async fn ack(&mut self, envelope_id: &str) -> Result<(), ChannelError> {
        let stream = self
            .stream
            .as_mut()
            .ok_or_else(|| ChannelError::NotConfigured("Socket Mode connection".to_string()))?;

        let body = serde_json::json!({ "envelope_id": envelope_id }).to_string();
        stream.send(WsMessage::Text(body)).await?;
        Ok(())
    }
}

// =============================================================================
// Frame parsing
// =============================================================================

#[derive(Debug, PartialEq, Eq)]
pub(crate) enum Frame {
    Hello,
    Disconnect(String),
    Envelope(Envelope),
    Ignored,
}

#[derive(Debug, Deserialize)]
struct RawFrame {
    #[serde(rename = "type")]
    kind: String,
    envelope_id: Option<String>,
    #[serde(default)]
    payload: Value,
    #[serde(default)]
    reason: String,
}

#[derive(Debug, Deserialize)]
struct EventsApiPayload {
    event: InnerEvent,
}

#[derive(Debug, Deserialize)]
struct InnerEvent {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    channel: String,
    #[serde(default)]
    user: String,
    #[serde(default)]
    text: String,
    #[serde(default)]
    ts: String,
    thread_ts: Option<String>,
    edited: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct InteractivePayload {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    callback_id: String,
    #[serde(default)]
    actions: Vec<InteractiveAction>,
    channel: Option<IdRef>,
    user: Option<IdRef>,
    message_ts: Option<String>,
    original_message: Option<OriginalMessage>,
}

#[derive(Debug, Deserialize)]
struct InteractiveAction {
    #[serde(default)]
    value: String,
}

#[derive(Debug, Deserialize)]
struct IdRef {
    id: String,
}

#[derive(Debug, Deserialize)]
struct OriginalMessage {
    ts: String,
}

#[derive(Debug, Deserialize)]
struct SlashPayload {
    command: String,
    #[serde(default)]
    text: String,
    user_id: String,
    channel_id: String,
}

pub(crate) fn parse_frame(text: &str) -> Frame {
    let raw: RawFrame = match serde_json::from_str(text) {
        Ok(raw) => raw,
        Err(e) => {
            warn!(channel = "slack", error = %e, "Unparsable Socket Mode frame");
            return Frame::Ignored;
        }
    };

    match (raw.kind.as_str(), raw.envelope_id) {
        ("hello", _) => Frame::Hello,
        ("disconnect", _) => Frame::Disconnect(raw.reason),
        (kind, Some(id)) => Frame::Envelope(Envelope {
            event: parse_event(kind, raw.payload),
            id,
        }),
        (kind, None) => {
            debug!(channel = "slack", kind, "Skipped Socket Mode frame");
            Frame::Ignored
        }
    }
}

fn parse_event(kind: &str, payload: Value) -> Option<ChatEvent> {
    match kind {
        "events_api" => {
            let payload: EventsApiPayload = serde_json::from_value(payload).ok()?;
            let event = payload.event;
            if event.kind != "app_mention" {
                return None;
            }

            Some(ChatEvent::Mention {
                origin: Origin {
                    channel: event.channel,
                    ts: event.ts,
                    thread_ts: event.thread_ts,
                },
                user: event.user,
                text: event.text,
                edited: event.edited.is_some(),
            })
        }
        "interactive" => {
            let payload: InteractivePayload = serde_json::from_value(payload).ok()?;
            if payload.kind != "interactive_message" {
                return None;
            }

            let ts = payload
                .message_ts
                .or_else(|| payload.original_message.map(|m| m.ts))?;

            Some(ChatEvent::ButtonClick {
                message: MessageRef::new(payload.channel?.id, ts),
                user: payload.user?.id,
                action: payload.actions.into_iter().next()?.value,
                callback_id: payload.callback_id,
            })
        }
        "slash_commands" => {
            let payload: SlashPayload = serde_json::from_value(payload).ok()?;
            Some(ChatEvent::SlashCommand {
                channel: payload.channel_id,
                user: payload.user_id,
                command: payload.command,
                text: payload.text.trim().to_string(),
            })
        }
        _ => None,
    }
}
