//! Opsgenie REST client.
//!
//! Alerts are Opsgenie's incidents. Creating one is asynchronous: the API
//! answers with a request id and the alert id becomes available once the
//! request has been processed, so [`OpsgenieClient::create`] polls the
//! request status endpoint until it can return the alert id.

use async_trait::async_trait;
use reqwest::{Method, RequestBuilder, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

use crate::backend::{IncidentBackend, IncidentId, NewIncident};
use crate::error::BackendError;
use crate::priority::Priority;
use crate::retry::RetryPolicy;

/// Default Opsgenie API endpoint.
pub const DEFAULT_API_URL: &str = "https://api.opsgenie.com";

/// Opsgenie client configuration.
#[derive(Debug, Clone)]
pub struct OpsgenieConfig {
    /// API key of an Opsgenie API integration
    pub api_key: String,
    /// Base URL, overridable for EU instances and tests
    pub api_url: String,
    /// Retry policy applied to every call
    pub retry: RetryPolicy,
    /// How many times to poll a create request before giving up
    pub status_poll_attempts: u32,
    /// Delay between two polls of a create request
    pub status_poll_interval: Duration,
    /// Per-request timeout
    pub timeout: Duration,
}

impl OpsgenieConfig {
    #[must_use]
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            api_url: DEFAULT_API_URL.to_string(),
            retry: RetryPolicy::default(),
            status_poll_attempts: 10,
            status_poll_interval: Duration::from_millis(500),
            timeout: Duration::from_secs(15),
        }
    }
}

/// Opsgenie implementation of [`IncidentBackend`].
#[derive(Clone)]
pub struct OpsgenieClient {
    client: reqwest::Client,
    config: OpsgenieConfig,
}

impl OpsgenieClient {
    /// Create a client from configuration.
    pub fn new(config: OpsgenieConfig) -> Result<Self, BackendError> {
        let client = reqwest::Client::builder().timeout(config.timeout).build()?;
        Ok(Self { client, config })
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let url = format!("{}{path}", self.config.api_url.trim_end_matches('/'));
        self.client
            .request(method, url)
            .header("Authorization", format!("GenieKey {}", self.config.api_key))
    }

    /// Send a request built by `build`, retrying transient failures.
    async fn send<F>(&self, operation: &str, build: F) -> Result<reqwest::Response, BackendError>
    where
        F: Fn() -> RequestBuilder,
    {
        let build = &build;

        self.config
            .retry
            .run(operation, move || async move {
                let response = build().send().await?;
                let status = response.status();
                if status.is_success() {
                    Ok(response)
                } else {
                    let body = response.text().await.unwrap_or_default();
                    Err(BackendError::Api {
                        status: status.as_u16(),
                        body,
                    })
                }
            })
            .await
    }

    /// Poll a create request until Opsgenie reports the alert id.
    async fn wait_for_alert(&self, request_id: &str) -> Result<IncidentId, BackendError> {
        let path = format!("/v2/alerts/requests/{request_id}");

        for attempt in 1..=self.config.status_poll_attempts {
            match self.send("request_status", || self.request(Method::GET, &path)).await {
                Ok(response) => {
                    let status: RequestStatusResponse = response.json().await?;
                    if !status.data.is_success {
                        return Err(BackendError::Rejected {
                            request_id: request_id.to_string(),
                            status: status.data.status,
                        });
                    }
                    if let Some(alert_id) = status.data.alert_id.filter(|id| !id.is_empty()) {
                        return Ok(IncidentId::new(alert_id));
                    }
                }
                // Not processed yet.
                Err(BackendError::Api { status: 404, .. }) => {}
                Err(e) => return Err(e),
            }

            debug!(request_id, attempt, "Alert request still pending");
            tokio::time::sleep(self.config.status_poll_interval).await;
        }

        Err(BackendError::Pending(request_id.to_string()))
    }

    async fn alert_action(&self, id: &IncidentId, action: &str) -> Result<(), BackendError> {
        let path = format!("/v2/alerts/{id}/{action}?identifierType=id");
        let body = ActionRequest {
            source: "oncall",
            note: None,
        };

        self.send(action, || self.request(Method::POST, &path).json(&body))
            .await?;
        Ok(())
    }
}

#[async_trait]
impl IncidentBackend for OpsgenieClient {
    async fn create(&self, incident: &NewIncident) -> Result<IncidentId, BackendError> {
        let body = CreateAlertRequest {
            message: &incident.message,
            description: &incident.description,
            priority: incident.priority,
            responders: vec![Responder {
                name: &incident.schedule,
                kind: "schedule",
            }],
            tags: &incident.tags,
        };

        let response = self
            .send("create", || self.request(Method::POST, "/v2/alerts").json(&body))
            .await?;
        let accepted: AcceptedResponse = response.json().await?;

        debug!(request_id = %accepted.request_id, "Alert create request accepted");

        self.wait_for_alert(&accepted.request_id).await
    }

    async fn close(&self, id: &IncidentId) -> Result<(), BackendError> {
        self.alert_action(id, "close").await
    }

    async fn acknowledge(&self, id: &IncidentId) -> Result<(), BackendError> {
        self.alert_action(id, "acknowledge").await
    }

    async fn update_priority(&self, id: &IncidentId, priority: Priority) -> Result<(), BackendError> {
        let path = format!("/v2/alerts/{id}/priority?identifierType=id");
        let body = PriorityRequest { priority };

        self.send("update_priority", || self.request(Method::PUT, &path).json(&body))
            .await?;
        Ok(())
    }

    async fn on_call(&self, schedule: &str) -> Result<Vec<String>, BackendError> {
        let path = format!("/v2/schedules/{schedule}/on-calls?scheduleIdentifierType=name&flat=false");

        let response = match self.send("on_call", || self.request(Method::GET, &path)).await {
            Ok(response) => response,
            Err(BackendError::Api { status, .. }) if status == StatusCode::NOT_FOUND.as_u16() => {
                warn!(schedule, "Schedule not found");
                return Err(BackendError::UnknownSchedule(schedule.to_string()));
            }
            Err(e) => return Err(e),
        };

        let on_calls: OnCallResponse = response.json().await?;
        Ok(on_calls
            .data
            .on_call_participants
            .into_iter()
            .map(|participant| participant.name)
            .collect())
    }
}

// =============================================================================
// Opsgenie API types
// =============================================================================

#[derive(Debug, Serialize)]
struct CreateAlertRequest<'a> {
    message: &'a str,
    description: &'a str,
    priority: Priority,
    responders: Vec<Responder<'a>>,
    tags: &'a [String],
}

#[derive(Debug, Serialize)]
struct Responder<'a> {
    name: &'a str,
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Debug, Serialize)]
struct ActionRequest {
    source: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    note: Option<String>,
}

#[derive(Debug, Serialize)]
struct PriorityRequest {
    priority: Priority,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AcceptedResponse {
    request_id: String,
}

#[derive(Debug, Deserialize)]
struct RequestStatusResponse {
    data: RequestStatus,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RequestStatus {
    #[serde(default)]
    is_success: bool,
    #[serde(default)]
    status: String,
    alert_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OnCallResponse {
    data: OnCallData,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OnCallData {
    #[serde(default)]
    on_call_participants: Vec<Participant>,
}

#[derive(Debug, Deserialize)]
struct Participant {
    name: String,
}
