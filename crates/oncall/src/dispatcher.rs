//! Inbound chat event handling.
//!
//! One dispatcher runs per schedule. It consumes envelopes strictly in
//! arrival order, acknowledges each one to the transport as soon as it is
//! accepted and maps every event to at most one engine operation.

use notify::{ChatEvent, Envelope, EventSource, MessageRef, Notifier, Origin};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::engine::{CountdownObserver, EscalationEngine};
use crate::error::EngineError;
use crate::incident::{ButtonAction, EscalationReason, IncidentToken};
use crate::render::ChatRenderer;

/// Drives one schedule from its chat event stream.
pub struct EventDispatcher<S> {
    source: S,
    handler: Handler,
}

struct Handler {
    engine: EscalationEngine,
    notifier: Arc<dyn Notifier>,
    renderer: Arc<ChatRenderer>,
}

impl<S: EventSource> EventDispatcher<S> {
    #[must_use]
    pub fn new(
        source: S,
        engine: EscalationEngine,
        notifier: Arc<dyn Notifier>,
        renderer: Arc<ChatRenderer>,
    ) -> Self {
        Self {
            source,
            handler: Handler {
                engine,
                notifier,
                renderer,
            },
        }
    }

    /// Process events until the source ends or `shutdown` fires.
    pub async fn run(mut self, shutdown: CancellationToken) {
        let engine = self.handler.engine.clone();
        info!(schedule = %engine.settings().schedule, "Dispatcher started");

        loop {
            let envelope = tokio::select! {
                () = shutdown.cancelled() => break,
                envelope = self.source.next_envelope() => envelope,
            };

            let Some(envelope) = envelope else {
                warn!("Event stream ended");
                break;
            };

            self.handle(envelope).await;
        }

        engine.shutdown();
        info!(schedule = %engine.settings().schedule, "Dispatcher stopped");
    }

    async fn handle(&mut self, envelope: Envelope) {
        if let Err(e) = self.source.ack(&envelope.id).await {
            warn!(envelope_id = %envelope.id, error = %e, "Failed to acknowledge envelope");
        }

        let Some(event) = envelope.event else {
            debug!(envelope_id = %envelope.id, "Skipped unhandled envelope");
            return;
        };

        debug!(envelope_id = %envelope.id, kind = event.kind(), "Handling event");

        match event {
            ChatEvent::Mention {
                origin,
                user,
                text,
                edited,
            } => {
                if edited {
                    debug!(channel = %origin.channel, "Skipped edited mention");
                    return;
                }
                self.handler.on_mention(origin, &user, &text).await;
            }
            ChatEvent::ButtonClick {
                message,
                user,
                action,
                callback_id,
            } => {
                self.handler
                    .on_click(&message, &user, &action, &callback_id)
                    .await;
            }
            ChatEvent::SlashCommand {
                channel,
                user,
                text,
                ..
            } => self.handler.on_command(&channel, &user, &text).await,
        }
    }
}

impl Handler {
    async fn on_mention(&self, origin: Origin, user: &str, text: &str) {
        let description = match self.notifier.permalink(&origin).await {
            Ok(link) => format!("slack:{link}\n{text}"),
            Err(e) => {
                warn!(channel = %origin.channel, error = %e, "Failed to get permalink");
                text.to_string()
            }
        };

        let renderer = self.renderer.renderer();

        let incident = match self.engine.create(&description, origin.clone()).await {
            Ok(incident) => incident,
            Err(e) => {
                error!(channel = %origin.channel, error = %e, "Could not open incident");
                if let Err(e) = self.notifier.post(&origin, &renderer.create_failed(user)).await {
                    error!(channel = %origin.channel, error = %e, "Failed to post reply");
                }
                return;
            }
        };

        let reply = renderer.created(&incident, user, self.engine.ladder());
        let posted = match self.notifier.post(&origin, &reply).await {
            Ok(posted) => Some(posted),
            Err(e) => {
                // The incident is paged already; it still escalates, only
                // without countdown renders.
                error!(incident_id = %incident.id, error = %e, "Failed to post incident message");
                None
            }
        };

        let observer: Arc<dyn CountdownObserver> = self.renderer.clone();
        if self
            .engine
            .start_countdown(&incident.id, posted, observer)
            .await
        {
            debug!(incident_id = %incident.id, "Escalation countdown running");
        }
    }

    async fn on_click(&self, message: &MessageRef, user: &str, value: &str, callback_id: &str) {
        let Some(action) = ButtonAction::from_value(value) else {
            debug!(value, "Ignored unknown button");
            return;
        };

        let token: IncidentToken = match callback_id.parse() {
            Ok(token) => token,
            Err(e) => {
                warn!(callback_id, error = %e, "Ignored click with malformed token");
                return;
            }
        };

        let result = match action {
            ButtonAction::Acknowledge => self.engine.acknowledge(&token).await,
            ButtonAction::Close => self.engine.close(&token).await,
            ButtonAction::Increase => self.engine.escalate(&token, EscalationReason::Manual).await,
        };

        let renderer = self.renderer.renderer();
        let reply = match result {
            Ok(incident) => renderer.action(action, &incident, user, true),
            Err(EngineError::InvalidTransition { id, state, .. }) => {
                info!(incident_id = %id, %state, action = action.value(), "Ignored click past the incident state");
                return;
            }
            Err(e) => {
                error!(incident_id = %token.id, error = %e, "Action failed");
                let incident = self.engine.view(&token).await;
                renderer.action(action, &incident, user, false)
            }
        };

        if let Err(e) = self.notifier.update(message, &reply).await {
            error!(incident_id = %token.id, error = %e, "Failed to update incident message");
        }
    }

    async fn on_command(&self, channel: &str, user: &str, text: &str) {
        let renderer = self.renderer.renderer();

        let reply = match text.trim() {
            "w" | "who" => {
                let schedule = &self.engine.settings().schedule;
                let on_duty = match self.engine.roster().resolve_on_duty(schedule).await {
                    Ok(on_duty) => on_duty.into_iter().next(),
                    Err(e) => {
                        warn!(schedule = %schedule, error = %e, "Failed to resolve on-duty engineer");
                        None
                    }
                };
                renderer.on_duty(on_duty.as_deref())
            }
            "" | "help" => renderer.help(),
            _ => renderer.unknown_command(),
        };

        if let Err(e) = self.notifier.ephemeral(channel, user, &reply).await {
            error!(channel, error = %e, "Failed to send command reply");
        }
    }
}
