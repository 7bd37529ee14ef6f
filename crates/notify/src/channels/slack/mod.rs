//! Slack Web API channel.
//!
//! [`SlackClient`] implements [`Notifier`] and [`UserGroups`] on top of the
//! Slack Web API. Inbound events arrive through [`SocketModeSource`].

mod api;
mod socket;

pub use socket::SocketModeSource;

use async_trait::async_trait;
use reqwest::header::RETRY_AFTER;
use reqwest::{RequestBuilder, StatusCode};
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, warn};

use crate::channels::{Notifier, UserGroups};
use crate::error::ChannelError;
use crate::message::{Message, MessageRef, Origin};

use api::SlackAttachment;

/// Default Slack Web API endpoint.
pub const DEFAULT_API_URL: &str = "https://slack.com/api";

/// Default number of retries for rate-limited or failing calls.
pub const DEFAULT_RETRY_COUNT: u32 = 5;

/// Slack Web API client.
#[derive(Clone)]
pub struct SlackClient {
    client: reqwest::Client,
    api_url: String,
    bot_token: String,
    app_token: Option<String>,
    retry_count: u32,
    retry_delay: Duration,
}

impl SlackClient {
    /// Create a client authenticated with a bot (`xoxb-`) or user (`xoxp-`) token.
    #[must_use]
    pub fn new(bot_token: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_url: DEFAULT_API_URL.to_string(),
            bot_token: bot_token.into(),
            app_token: None,
            retry_count: DEFAULT_RETRY_COUNT,
            retry_delay: Duration::from_secs(1),
        }
    }

    /// App-level (`xapp-`) token, required for Socket Mode.
    #[must_use]
    pub fn with_app_token(mut self, app_token: impl Into<String>) -> Self {
        self.app_token = Some(app_token.into());
        self
    }

    #[must_use]
    pub fn with_api_url(mut self, api_url: impl Into<String>) -> Self {
        self.api_url = api_url.into().trim_end_matches('/').to_string();
        self
    }

    #[must_use]
    pub fn with_retry(mut self, retry_count: u32, retry_delay: Duration) -> Self {
        self.retry_count = retry_count;
        self.retry_delay = retry_delay;
        self
    }

    /// Verify the bot token and return the bot's user id.
    pub async fn auth_test(&self) -> Result<String, ChannelError> {
        let body = self.api_post("auth.test", &self.bot_token, &json!({})).await?;
        Ok(body["user_id"].as_str().unwrap_or_default().to_string())
    }

    /// Ask Slack for a fresh Socket Mode WebSocket URL.
    pub(crate) async fn open_connection(&self) -> Result<String, ChannelError> {
        let app_token = self
            .app_token
            .as_deref()
            .ok_or_else(|| ChannelError::NotConfigured("Slack app token".to_string()))?;

        let body = self.api_post("apps.connections.open", app_token, &json!({})).await?;
        body["url"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| ChannelError::Other("apps.connections.open returned no url".to_string()))
    }

    async fn api_post(&self, method: &str, token: &str, payload: &Value) -> Result<Value, ChannelError> {
        let url = format!("{}/{method}", self.api_url);
        self.execute(method, || self.client.post(&url).bearer_auth(token).json(payload))
            .await
    }

    async fn api_get(&self, method: &str, query: &[(&str, &str)]) -> Result<Value, ChannelError> {
        let url = format!("{}/{method}", self.api_url);
        self.execute(method, || {
            self.client
                .get(&url)
                .bearer_auth(&self.bot_token)
                .query(query)
        })
        .await
    }

    /// Send a request, retrying on rate limits and server errors, and unwrap
    /// Slack's `{"ok": false, "error": ...}` envelope.
    async fn execute<F>(&self, method: &str, build: F) -> Result<Value, ChannelError>
    where
        F: Fn() -> RequestBuilder,
    {
        let mut attempt = 0;

        loop {
            attempt += 1;
            let response = build().send().await?;
            let status = response.status();

            if status == StatusCode::TOO_MANY_REQUESTS {
                let retry_after_secs = response
                    .headers()
                    .get(RETRY_AFTER)
                    .and_then(|v| v.to_str().ok())
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(1);

                if attempt > self.retry_count {
                    return Err(ChannelError::RateLimited { retry_after_secs });
                }

                warn!(channel = "slack", method, attempt, retry_after_secs, "Rate limited");
                tokio::time::sleep(Duration::from_secs(retry_after_secs)).await;
                continue;
            }

            if status.is_server_error() && attempt <= self.retry_count {
                warn!(channel = "slack", method, attempt, status = %status, "Server error, retrying");
                tokio::time::sleep(self.retry_delay * attempt).await;
                continue;
            }

            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                return Err(ChannelError::Api {
                    method: method.to_string(),
                    error: format!("HTTP {status}: {body}"),
                });
            }

            let body: Value = response.json().await?;
            if body["ok"].as_bool() == Some(true) {
                debug!(channel = "slack", method, "Call succeeded");
                return Ok(body);
            }

            return Err(ChannelError::Api {
                method: method.to_string(),
                error: body["error"].as_str().unwrap_or("unknown_error").to_string(),
            });
        }
    }
}

#[async_trait]
impl Notifier for SlackClient {
    async fn resolve_identity(&self, handle: &str) -> Result<Option<String>, ChannelError> {
        match self.api_get("users.lookupByEmail", &[("email", handle)]).await {
            Ok(body) => Ok(body["user"]["id"].as_str().map(str::to_string)),
            Err(ChannelError::Api { error, .. }) if error == "users_not_found" => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn post(&self, origin: &Origin, message: &Message) -> Result<MessageRef, ChannelError> {
        let payload = json!({
            "channel": origin.channel,
            "thread_ts": origin.thread_root(),
            "attachments": [SlackAttachment::from(message)],
        });

        let body = self.api_post("chat.postMessage", &self.bot_token, &payload).await?;
        let ts = body["ts"].as_str().unwrap_or_default().to_string();
        let channel = body["channel"].as_str().unwrap_or(&origin.channel).to_string();

        Ok(MessageRef { channel, ts })
    }

    async fn update(&self, target: &MessageRef, message: &Message) -> Result<(), ChannelError> {
        let payload = json!({
            "channel": target.channel,
            "ts": target.ts,
            "attachments": [SlackAttachment::from(message)],
        });

        self.api_post("chat.update", &self.bot_token, &payload).await?;
        Ok(())
    }

    async fn delete(&self, target: &MessageRef) -> Result<(), ChannelError> {
        let payload = json!({ "channel": target.channel, "ts": target.ts });
        self.api_post("chat.delete", &self.bot_token, &payload).await?;
        Ok(())
    }

    async fn ephemeral(&self, channel: &str, user: &str, text: &str) -> Result<(), ChannelError> {
        let payload = json!({ "channel": channel, "user": user, "text": text });
        self.api_post("chat.postEphemeral", &self.bot_token, &payload).await?;
        Ok(())
    }

    async fn permalink(&self, origin: &Origin) -> Result<String, ChannelError> {
        let body = self
            .api_get(
                "chat.getPermalink",
                &[("channel", origin.channel.as_str()), ("message_ts", origin.ts.as_str())],
            )
            .await?;

        body["permalink"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| ChannelError::Other("chat.getPermalink returned no permalink".to_string()))
    }
}

#[async_trait]
impl UserGroups for SlackClient {
    async fn group_id(&self, handle: &str) -> Result<Option<String>, ChannelError> {
        let body = self.api_get("usergroups.list", &[]).await?;
        let groups: Vec<api::UserGroup> =
            serde_json::from_value(body["usergroups"].clone()).unwrap_or_default();

        debug!(channel = "slack", groups = groups.len(), "Loaded user groups");

        Ok(groups
            .into_iter()
            .find(|group| group.handle == handle)
            .map(|group| group.id))
    }

    async fn replace_members(&self, group_id: &str, members: &[String]) -> Result<(), ChannelError> {
        let payload = json!({ "usergroup": group_id, "users": members.join(",") });
        self.api_post("usergroups.users.update", &self.bot_token, &payload)
            .await?;
        Ok(())
    }
}
