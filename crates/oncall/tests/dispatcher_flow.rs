//! Chat events in, backend calls and chat replies out.

mod common;

use common::{engine, AlertStatus, Call, FakeBackend, FakeChat, FakeSource};
use notify::{ChatEvent, Envelope, MessageRef, Notifier, Origin};
use oncall::{ChatRenderer, EscalationEngine, EventDispatcher, Messages, Renderer};
use paging::{IncidentId, Priority};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

const CHANNEL: &str = "C_OPS";

fn mention(id: &str, text: &str) -> Envelope {
    Envelope {
        id: id.to_string(),
        event: Some(ChatEvent::Mention {
            origin: Origin::new(CHANNEL, "100.000100"),
            user: "U_REQ".to_string(),
            text: text.to_string(),
            edited: false,
        }),
    }
}

fn click(id: &str, action: &str, callback_id: &str, user: &str) -> Envelope {
    Envelope {
        id: id.to_string(),
        event: Some(ChatEvent::ButtonClick {
            message: MessageRef::new(CHANNEL, "900.1"),
            user: user.to_string(),
            action: action.to_string(),
            callback_id: callback_id.to_string(),
        }),
    }
}

fn command(id: &str, text: &str) -> Envelope {
    Envelope {
        id: id.to_string(),
        event: Some(ChatEvent::SlashCommand {
            channel: CHANNEL.to_string(),
            user: "U_CAROL".to_string(),
            command: "/oncall".to_string(),
            text: text.to_string(),
        }),
    }
}

struct Harness {
    backend: Arc<FakeBackend>,
    chat: Arc<FakeChat>,
    engine: EscalationEngine,
}

impl Harness {
    fn new(ladder: Option<Duration>) -> Self {
        let backend = Arc::new(FakeBackend::with_on_call(&["alice@example.com"]));
        let chat = Arc::new(FakeChat::team());
        let engine = engine(&backend, &chat, ladder);
        Self {
            backend,
            chat,
            engine,
        }
    }

    fn dispatcher(&self, source: FakeSource) -> EventDispatcher<FakeSource> {
        let notifier: Arc<dyn Notifier> = self.chat.clone();
        let renderer = Arc::new(ChatRenderer::new(
            Arc::clone(&notifier),
            Renderer::new(Messages::default(), true),
        ));
        EventDispatcher::new(source, self.engine.clone(), notifier, renderer)
    }

    async fn replay(&self, envelopes: Vec<Envelope>) -> Vec<String> {
        let (source, acked) = FakeSource::new(envelopes);
        self.dispatcher(source).run(CancellationToken::new()).await;
        let acked = acked.lock().unwrap().clone();
        acked
    }
}

#[tokio::test]
async fn test_mention_click_and_command() {
    let harness = Harness::new(None);

    let acked = harness
        .replay(vec![
            mention("e1", "db is down"),
            click("e2", "alert_acknowledge", "alert-1;P5", "U_BOB"),
            command("e3", "who"),
            Envelope {
                id: "e4".to_string(),
                event: None,
            },
        ])
        .await;

    assert_eq!(acked, ["e1", "e2", "e3", "e4"]);

    let created = harness
        .backend
        .calls()
        .into_iter()
        .find_map(|call| match call {
            Call::Create(request) => Some(request),
            _ => None,
        })
        .unwrap();
    assert_eq!(
        created.description,
        "slack:https://team.slack.com/archives/C_OPS/p100.000100\ndb is down"
    );
    assert_eq!(created.schedule, "DevOps_schedule");

    let posts = harness.chat.posts();
    assert_eq!(posts.len(), 1);
    let (origin, reply) = &posts[0];
    assert_eq!(origin.ts, "100.000100");
    assert_eq!(reply.field("On duty"), Some("<@U_ALICE>"));
    assert_eq!(reply.field("Priority"), Some("P5"));
    assert_eq!(reply.callback_id.as_deref(), Some("alert-1;P5"));
    assert!(reply.has_button("alert_acknowledge"));
    assert!(reply.has_button("alert_close"));
    assert!(reply.has_button("alert_increase_priority"));

    let updates = harness.chat.updates();
    assert_eq!(updates.len(), 1);
    let (target, acked_reply) = &updates[0];
    assert_eq!(target, &MessageRef::new(CHANNEL, "900.1"));
    assert_eq!(
        acked_reply.text,
        "The engineer on duty has read the notification (<@U_BOB>)"
    );
    assert!(!acked_reply.has_button("alert_acknowledge"));
    assert!(acked_reply.has_button("alert_close"));

    assert_eq!(
        harness.chat.ephemerals(),
        [(
            CHANNEL.to_string(),
            "U_CAROL".to_string(),
            "The engineer on duty - <@U_ALICE>".to_string()
        )]
    );

    assert_eq!(
        harness.backend.alert(&IncidentId::new("alert-1")),
        Some((AlertStatus::Acknowledged, Priority::P5))
    );
}

#[tokio::test]
async fn test_failed_create_replies_without_buttons() {
    let harness = Harness::new(Some(Duration::from_secs(10)));
    harness.backend.fail("create");

    harness.replay(vec![mention("e1", "help")]).await;

    let posts = harness.chat.posts();
    assert_eq!(posts.len(), 1);
    assert_eq!(posts[0].1.text, "I couldn't create an alert in Opsgenie :sob:");
    assert!(posts[0].1.buttons.is_empty());
    assert_eq!(harness.engine.tracked().await, 0);
    assert_eq!(harness.engine.countdowns().await, 0);
}

#[tokio::test]
async fn test_edited_mention_is_acked_but_ignored() {
    let harness = Harness::new(None);

    let acked = harness
        .replay(vec![Envelope {
            id: "e1".to_string(),
            event: Some(ChatEvent::Mention {
                origin: Origin::new(CHANNEL, "100.000100"),
                user: "U_REQ".to_string(),
                text: "help".to_string(),
                edited: true,
            }),
        }])
        .await;

    assert_eq!(acked, ["e1"]);
    assert_eq!(harness.backend.count("create"), 0);
    assert!(harness.chat.posts().is_empty());
}

#[tokio::test]
async fn test_missing_permalink_keeps_plain_description() {
    let harness = Harness::new(None);
    harness.chat.break_permalinks();

    harness.replay(vec![mention("e1", "disk full")]).await;

    let descriptions: Vec<String> = harness
        .backend
        .calls()
        .into_iter()
        .filter_map(|call| match call {
            Call::Create(request) => Some(request.description),
            _ => None,
        })
        .collect();
    assert_eq!(descriptions, ["disk full"]);
}

#[tokio::test]
async fn test_bad_clicks_are_ignored() {
    let harness = Harness::new(None);

    harness
        .replay(vec![
            mention("e1", "help"),
            click("e2", "alert_dance", "alert-1;P5", "U_BOB"),
            click("e3", "alert_close", "no-priority-here", "U_BOB"),
        ])
        .await;

    assert!(harness.chat.updates().is_empty());
    assert_eq!(harness.backend.count("close"), 0);
}

#[tokio::test]
async fn test_repeated_acknowledge_is_ignored() {
    let harness = Harness::new(None);

    harness
        .replay(vec![
            mention("e1", "help"),
            click("e2", "alert_acknowledge", "alert-1;P5", "U_BOB"),
            click("e3", "alert_acknowledge", "alert-1;P5", "U_ALICE"),
        ])
        .await;

    assert_eq!(harness.chat.updates().len(), 1);
    assert_eq!(harness.backend.count("acknowledge"), 1);
}

#[tokio::test]
async fn test_clicks_after_close_are_ignored() {
    let harness = Harness::new(None);

    harness
        .replay(vec![
            mention("e1", "help"),
            click("e2", "alert_close", "alert-1;P5", "U_BOB"),
            click("e3", "alert_acknowledge", "alert-1;P5", "U_ALICE"),
            click("e4", "alert_increase_priority", "alert-1;P5", "U_ALICE"),
            click("e5", "alert_close", "alert-1;P5", "U_ALICE"),
        ])
        .await;

    let updates = harness.chat.updates();
    assert_eq!(updates.len(), 1);
    assert_eq!(updates[0].1.text, ":dizzy: The alert was closed");
    assert!(updates[0].1.buttons.is_empty());

    assert_eq!(harness.backend.count("close"), 1);
    assert_eq!(harness.backend.count("acknowledge"), 0);
    assert_eq!(harness.backend.count("update_priority"), 0);
}

#[tokio::test]
async fn test_failed_click_renders_failure() {
    let harness = Harness::new(None);
    harness.backend.fail("close");

    harness
        .replay(vec![
            mention("e1", "help"),
            click("e2", "alert_close", "alert-1;P5", "U_BOB"),
        ])
        .await;

    let updates = harness.chat.updates();
    assert_eq!(updates.len(), 1);
    assert_eq!(updates[0].1.text, ":bangbang: Failed to close alert");
    assert!(updates[0].1.has_button("alert_acknowledge"));
    assert_eq!(harness.engine.tracked().await, 1);
}

#[tokio::test]
async fn test_manual_increase_hides_button() {
    let harness = Harness::new(None);

    harness
        .replay(vec![
            mention("e1", "help"),
            click("e2", "alert_increase_priority", "alert-1;P5", "U_BOB"),
        ])
        .await;

    let updates = harness.chat.updates();
    let (_, reply) = &updates[0];
    assert_eq!(reply.text, ":fire: The alert priority has been increased");
    assert_eq!(reply.field("Priority"), Some("P1"));
    assert_eq!(reply.callback_id.as_deref(), Some("alert-1;P1"));
    assert!(!reply.has_button("alert_increase_priority"));
    assert!(reply.has_button("alert_acknowledge"));
}

#[tokio::test]
async fn test_help_and_unknown_commands() {
    let harness = Harness::new(None);

    harness
        .replay(vec![command("e1", ""), command("e2", "dance")])
        .await;

    let replies: Vec<String> = harness
        .chat
        .ephemerals()
        .into_iter()
        .map(|(_, _, text)| text)
        .collect();
    assert_eq!(
        replies,
        [
            "Available arguments for slash commands: *who*, *w*",
            ":bangbang: Unknown command"
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn test_countdown_updates_the_posted_message() {
    let harness = Harness::new(Some(Duration::from_secs(10)));
    let (source, _acked) = FakeSource::new(vec![mention("e1", "help")]);
    let source = source.hold_open();

    let shutdown = CancellationToken::new();
    let task = tokio::spawn(harness.dispatcher(source).run(shutdown.clone()));

    tokio::time::sleep(Duration::from_secs(12)).await;
    shutdown.cancel();
    task.await.unwrap();

    let updates = harness.chat.updates();
    assert_eq!(updates.len(), 2);

    let (target, tick) = &updates[0];
    assert_eq!(target, &MessageRef::new(CHANNEL, "900.1"));
    assert_eq!(tick.field("P1 after 00:05"), Some(""));

    let (_, expired) = &updates[1];
    assert_eq!(expired.field("Priority"), Some("P1"));
    assert!(!expired.has_button("alert_increase_priority"));
    assert_eq!(harness.backend.priorities(&IncidentId::new("alert-1")), [Priority::P1]);
}

#[tokio::test(start_paused = true)]
async fn test_unposted_incident_still_escalates() {
    let harness = Harness::new(Some(Duration::from_secs(10)));
    harness.chat.break_posts();
    let (source, _acked) = FakeSource::new(vec![mention("e1", "help")]);

    let shutdown = CancellationToken::new();
    let task = tokio::spawn(harness.dispatcher(source.hold_open()).run(shutdown.clone()));

    tokio::time::sleep(Duration::from_secs(12)).await;
    shutdown.cancel();
    task.await.unwrap();

    assert_eq!(harness.backend.priorities(&IncidentId::new("alert-1")), [Priority::P1]);
    assert!(harness.chat.updates().is_empty());
}
