//! Deterministic feed simulator implementation

use std::sync::atomic::{AtomicU64, Ordering};

use serde_json::json;
use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info};

use crate::dispatch::names;
use crate::dispatch::{CorrelationId, Event, EventCategory, Message};

/// Lifecycle of the simulated connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedStatus {
    Idle,
    Live,
    Stopped,
}

/// Errors for feed actions that are misused locally.
///
/// Scripted outcomes such as a denied authorization are not errors here; they
/// arrive as events, the way a remote session reports them.
#[derive(Debug, Error)]
pub enum FeedError {
    #[error("feed is not live")]
    NotLive,
    #[error("feed already started")]
    AlreadyStarted,
    #[error("event queue closed")]
    QueueClosed,
}

/// Scripted behavior for a simulated feed.
///
/// The default script starts cleanly, grants authorization, knows one
/// service and delivers four ticks per subscribed topic.
#[derive(Debug, Clone)]
pub struct FeedScript {
    /// Report a startup failure instead of coming up.
    pub fail_start: bool,
    /// Deny every authorization request.
    pub deny_authorization: bool,
    /// Services that open successfully; anything else fails to open.
    pub known_services: Vec<String>,
    /// Topics whose subscription is rejected outright.
    pub failing_topics: Vec<String>,
    /// Topics whose subscription terminates after its ticks are delivered.
    pub terminating_topics: Vec<String>,
    /// Number of data ticks queued per successful subscription.
    pub ticks_per_topic: usize,
}

impl Default for FeedScript {
    fn default() -> Self {
        Self {
            fail_start: false,
            deny_authorization: false,
            known_services: vec!["//sim/mktdata".to_string()],
            failing_topics: Vec::new(),
            terminating_topics: Vec::new(),
            ticks_per_topic: 4,
        }
    }
}

/// In-process stand-in for a remote market data session.
///
/// Every action queues the events the remote side would send for it before
/// returning, so tests and the demo loop see a deterministic sequence on the
/// receiver half. Actions that expect an answer mint a fresh correlation id
/// and attach it to the queued response messages.
pub struct SimulatedFeed {
    script: FeedScript,
    event_tx: mpsc::UnboundedSender<Event>,
    status_tx: watch::Sender<FeedStatus>,
    status_rx: watch::Receiver<FeedStatus>,
    tick_seq: AtomicU64,
}

impl SimulatedFeed {
    /// Creates a feed with the default script.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Event>) {
        Self::with_script(FeedScript::default())
    }

    /// Creates a feed following `script`.
    pub fn with_script(script: FeedScript) -> (Self, mpsc::UnboundedReceiver<Event>) {
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (status_tx, status_rx) = watch::channel(FeedStatus::Idle);
        let feed = Self {
            script,
            event_tx,
            status_tx,
            status_rx,
            tick_seq: AtomicU64::new(0),
        };
        (feed, event_rx)
    }

    pub fn status(&self) -> FeedStatus {
        *self.status_rx.borrow()
    }

    pub fn is_live(&self) -> bool {
        self.status() == FeedStatus::Live
    }

    /// Starts the feed, queueing the session status events of the outcome.
    ///
    /// A scripted startup failure is reported through the queue, not as an
    /// error, and leaves the feed idle.
    pub fn start(&self) -> Result<(), FeedError> {
        if self.status() != FeedStatus::Idle {
            return Err(FeedError::AlreadyStarted);
        }
        if self.script.fail_start {
            info!("feed start scripted to fail");
            return self.push(Event::new(
                EventCategory::SessionStatus,
                vec![
                    Message::new(names::SESSION_STARTUP_FAILURE)
                        .with_body(json!({ "reason": "scripted startup failure" })),
                ],
            ));
        }
        self.status_tx.send_replace(FeedStatus::Live);
        info!("feed started");
        self.push(Event::new(
            EventCategory::SessionStatus,
            vec![Message::new(names::SESSION_CONNECTION_UP)],
        ))?;
        self.push(Event::new(
            EventCategory::SessionStatus,
            vec![Message::new(names::SESSION_STARTED)],
        ))
    }

    /// Stops the feed. Only a live feed emits `SessionTerminated`; stopping
    /// an idle or already stopped feed just settles the status.
    pub fn stop(&self) -> Result<(), FeedError> {
        let was_live = self.is_live();
        self.status_tx.send_replace(FeedStatus::Stopped);
        if was_live {
            info!("feed stopping");
            self.push(Event::new(
                EventCategory::SessionStatus,
                vec![Message::new(names::SESSION_TERMINATED)],
            ))?;
        }
        Ok(())
    }

    /// Opens a service, queueing `ServiceOpened` or `ServiceOpenFailure`.
    pub fn open_service(&self, service: &str) -> Result<(), FeedError> {
        self.require_live()?;
        let name = if self.script.known_services.iter().any(|s| s == service) {
            names::SERVICE_OPENED
        } else {
            names::SERVICE_OPEN_FAILURE
        };
        debug!(service, outcome = name, "opening service");
        self.push(Event::new(
            EventCategory::ServiceStatus,
            vec![Message::new(name).with_body(json!({ "service": service }))],
        ))
    }

    /// Requests authorization for `principal` and returns the correlation id
    /// the outcome will carry.
    pub fn authorize(&self, principal: &str) -> Result<CorrelationId, FeedError> {
        self.require_live()?;
        let id = CorrelationId::generate();
        let message = if self.script.deny_authorization {
            Message::new(names::AUTHORIZATION_FAILURE)
                .with_correlation_id(id)
                .with_body(json!({ "principal": principal, "reason": "scripted denial" }))
        } else {
            Message::new(names::AUTHORIZATION_SUCCESS)
                .with_correlation_id(id)
                .with_body(json!({ "principal": principal }))
        };
        info!(principal, %id, "authorization requested");
        self.push(Event::new(EventCategory::AuthorizationStatus, vec![message]))?;
        Ok(id)
    }

    /// Subscribes to `topic`, returning the correlation id its messages will
    /// carry.
    ///
    /// A successful subscription queues `SubscriptionStarted` followed by the
    /// scripted number of data ticks; a failing topic queues only
    /// `SubscriptionFailure`.
    pub fn subscribe(
        &self,
        service: &str,
        topic: &str,
        fields: &[String],
    ) -> Result<CorrelationId, FeedError> {
        self.require_live()?;
        let id = CorrelationId::generate();
        if self.script.failing_topics.iter().any(|t| t == topic) {
            info!(topic, %id, "subscription scripted to fail");
            self.push(Event::new(
                EventCategory::SubscriptionStatus,
                vec![
                    Message::new(names::SUBSCRIPTION_FAILURE)
                        .with_correlation_id(id)
                        .with_body(json!({ "topic": topic, "reason": "unknown topic" })),
                ],
            ))?;
            return Ok(id);
        }

        info!(service, topic, %id, "subscribed");
        self.push(Event::new(
            EventCategory::SubscriptionStatus,
            vec![
                Message::new(names::SUBSCRIPTION_STARTED)
                    .with_correlation_id(id)
                    .with_body(json!({ "topic": topic })),
            ],
        ))?;
        for _ in 0..self.script.ticks_per_topic {
            let tick = self.tick_seq.fetch_add(1, Ordering::Relaxed);
            self.push(Event::new(
                EventCategory::SubscriptionData,
                vec![
                    Message::new(names::MARKET_DATA_EVENTS)
                        .with_correlation_id(id)
                        .with_body(tick_body(topic, fields, tick)),
                ],
            ))?;
        }
        if self.script.terminating_topics.iter().any(|t| t == topic) {
            self.push(Event::new(
                EventCategory::SubscriptionStatus,
                vec![
                    Message::new(names::SUBSCRIPTION_TERMINATED)
                        .with_correlation_id(id)
                        .with_body(json!({ "topic": topic, "reason": "scripted end of stream" })),
                ],
            ))?;
        }
        Ok(id)
    }

    /// Sends a one-shot request, queueing a partial and then a final response
    /// under the returned correlation id.
    pub fn send_request(
        &self,
        service: &str,
        operation: &str,
        topics: &[String],
    ) -> Result<CorrelationId, FeedError> {
        self.require_live()?;
        let id = CorrelationId::generate();
        info!(service, operation, %id, "request sent");

        let (head, tail) = topics.split_at(topics.len() / 2);
        self.push(Event::new(
            EventCategory::PartialResponse,
            vec![
                Message::new(names::REFERENCE_SNAPSHOT_RESPONSE)
                    .with_correlation_id(id)
                    .with_body(snapshot_body(operation, head)),
            ],
        ))?;
        self.push(Event::new(
            EventCategory::Response,
            vec![
                Message::new(names::REFERENCE_SNAPSHOT_RESPONSE)
                    .with_correlation_id(id)
                    .with_body(snapshot_body(operation, tail)),
            ],
        ))?;
        Ok(id)
    }

    fn require_live(&self) -> Result<(), FeedError> {
        if self.is_live() {
            Ok(())
        } else {
            Err(FeedError::NotLive)
        }
    }

    fn push(&self, event: Event) -> Result<(), FeedError> {
        debug!(category = %event.category(), "queueing event");
        self.event_tx.send(event).map_err(|_| FeedError::QueueClosed)
    }
}

/// Deterministic tick payload for `topic`.
///
/// Prices derive from the topic name and the global tick sequence so every
/// run of the same script produces the same numbers.
fn tick_body(topic: &str, fields: &[String], tick: u64) -> serde_json::Value {
    let base = 100.0 + f64::from(topic.bytes().fold(0u32, |acc, b| acc + u32::from(b)) % 100);
    let price = base + tick as f64 * 0.25;
    let mut values = serde_json::Map::new();
    for (index, field) in fields.iter().enumerate() {
        values.insert(field.clone(), json!(price + index as f64 * 0.05));
    }
    json!({ "topic": topic, "tick": tick, "fields": values })
}

fn snapshot_body(operation: &str, topics: &[String]) -> serde_json::Value {
    let rows: Vec<serde_json::Value> = topics
        .iter()
        .map(|topic| json!({ "topic": topic, "fields": tick_body(topic, &[], 0)["fields"] }))
        .collect();
    json!({ "operation": operation, "rows": rows })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drain(rx: &mut mpsc::UnboundedReceiver<Event>) -> Vec<Event> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    fn first_message_name(event: &Event) -> &str {
        event.messages()[0].message_type().as_str()
    }

    #[test]
    fn test_start_queues_connection_then_started() {
        let (feed, mut rx) = SimulatedFeed::new();
        feed.start().unwrap();

        assert_eq!(feed.status(), FeedStatus::Live);
        let events = drain(&mut rx);
        assert_eq!(events.len(), 2);
        assert!(
            events
                .iter()
                .all(|e| e.category() == EventCategory::SessionStatus)
        );
        assert_eq!(first_message_name(&events[0]), names::SESSION_CONNECTION_UP);
        assert_eq!(first_message_name(&events[1]), names::SESSION_STARTED);
    }

    #[test]
    fn test_double_start_is_rejected() {
        let (feed, _rx) = SimulatedFeed::new();
        feed.start().unwrap();
        assert!(matches!(feed.start(), Err(FeedError::AlreadyStarted)));
    }

    #[test]
    fn test_scripted_startup_failure() {
        let script = FeedScript {
            fail_start: true,
            ..FeedScript::default()
        };
        let (feed, mut rx) = SimulatedFeed::with_script(script);
        feed.start().unwrap();

        assert_eq!(feed.status(), FeedStatus::Idle, "a failed start must not go live");
        let events = drain(&mut rx);
        assert_eq!(events.len(), 1);
        assert_eq!(first_message_name(&events[0]), names::SESSION_STARTUP_FAILURE);
    }

    #[test]
    fn test_actions_require_a_live_feed() {
        let (feed, _rx) = SimulatedFeed::new();
        assert!(matches!(feed.open_service("//sim/mktdata"), Err(FeedError::NotLive)));
        assert!(matches!(feed.authorize("user"), Err(FeedError::NotLive)));
        assert!(matches!(
            feed.subscribe("//sim/mktdata", "AAPL", &[]),
            Err(FeedError::NotLive)
        ));
        assert!(matches!(
            feed.send_request("//sim/mktdata", "ReferenceDataRequest", &[]),
            Err(FeedError::NotLive)
        ));
    }

    #[test]
    fn test_subscription_delivers_ticks() {
        let (feed, mut rx) = SimulatedFeed::new();
        feed.start().unwrap();
        drain(&mut rx);

        let fields = vec!["LAST_PRICE".to_string(), "BID".to_string()];
        let id = feed.subscribe("//sim/mktdata", "AAPL", &fields).unwrap();

        let events = drain(&mut rx);
        assert_eq!(events.len(), 5, "one status event plus four default ticks");
        assert_eq!(events[0].category(), EventCategory::SubscriptionStatus);
        assert_eq!(first_message_name(&events[0]), names::SUBSCRIPTION_STARTED);
        for (index, event) in events[1..].iter().enumerate() {
            assert_eq!(event.category(), EventCategory::SubscriptionData);
            let message = &event.messages()[0];
            assert_eq!(message.correlation_ids(), &[id]);
            assert_eq!(message.body()["tick"], index as u64);
            assert_eq!(message.body()["topic"], "AAPL");
            assert!(message.body()["fields"]["LAST_PRICE"].is_f64());
        }
    }

    #[test]
    fn test_tick_prices_are_deterministic() {
        let fields = vec!["LAST_PRICE".to_string()];
        assert_eq!(tick_body("AAPL", &fields, 0), tick_body("AAPL", &fields, 0));
        assert_ne!(
            tick_body("AAPL", &fields, 0)["fields"]["LAST_PRICE"],
            tick_body("AAPL", &fields, 1)["fields"]["LAST_PRICE"],
        );
    }

    #[test]
    fn test_failing_topic() {
        let script = FeedScript {
            failing_topics: vec!["BAD".to_string()],
            ..FeedScript::default()
        };
        let (feed, mut rx) = SimulatedFeed::with_script(script);
        feed.start().unwrap();
        drain(&mut rx);

        let id = feed.subscribe("//sim/mktdata", "BAD", &[]).unwrap();
        let events = drain(&mut rx);
        assert_eq!(events.len(), 1);
        assert_eq!(first_message_name(&events[0]), names::SUBSCRIPTION_FAILURE);
        assert_eq!(events[0].messages()[0].correlation_ids(), &[id]);
    }

    #[test]
    fn test_terminating_topic() {
        let script = FeedScript {
            terminating_topics: vec!["AAPL".to_string()],
            ticks_per_topic: 2,
            ..FeedScript::default()
        };
        let (feed, mut rx) = SimulatedFeed::with_script(script);
        feed.start().unwrap();
        drain(&mut rx);

        feed.subscribe("//sim/mktdata", "AAPL", &[]).unwrap();
        let events = drain(&mut rx);
        assert_eq!(
            first_message_name(events.last().unwrap()),
            names::SUBSCRIPTION_TERMINATED
        );
    }

    #[test]
    fn test_request_partial_then_final() {
        let (feed, mut rx) = SimulatedFeed::new();
        feed.start().unwrap();
        drain(&mut rx);

        let topics = vec!["AAPL".to_string(), "MSFT".to_string()];
        let id = feed
            .send_request("//sim/mktdata", "ReferenceDataRequest", &topics)
            .unwrap();

        let events = drain(&mut rx);
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].category(), EventCategory::PartialResponse);
        assert_eq!(events[1].category(), EventCategory::Response);
        for event in &events {
            assert_eq!(event.messages()[0].correlation_ids(), &[id]);
            assert_eq!(first_message_name(event), names::REFERENCE_SNAPSHOT_RESPONSE);
        }
    }

    #[test]
    fn test_unknown_service_open_failure() {
        let (feed, mut rx) = SimulatedFeed::new();
        feed.start().unwrap();
        drain(&mut rx);

        feed.open_service("//sim/refdata").unwrap();
        let events = drain(&mut rx);
        assert_eq!(events[0].category(), EventCategory::ServiceStatus);
        assert_eq!(first_message_name(&events[0]), names::SERVICE_OPEN_FAILURE);
    }

    #[test]
    fn test_authorization_denial() {
        let script = FeedScript {
            deny_authorization: true,
            ..FeedScript::default()
        };
        let (feed, mut rx) = SimulatedFeed::with_script(script);
        feed.start().unwrap();
        drain(&mut rx);

        let id = feed.authorize("desk-user").unwrap();
        let events = drain(&mut rx);
        assert_eq!(first_message_name(&events[0]), names::AUTHORIZATION_FAILURE);
        assert_eq!(events[0].messages()[0].correlation_ids(), &[id]);
    }

    #[test]
    fn test_stop_emits_terminated_once() {
        let (feed, mut rx) = SimulatedFeed::new();
        feed.start().unwrap();
        drain(&mut rx);

        feed.stop().unwrap();
        let events = drain(&mut rx);
        assert_eq!(events.len(), 1);
        assert_eq!(first_message_name(&events[0]), names::SESSION_TERMINATED);

        feed.stop().unwrap();
        assert!(drain(&mut rx).is_empty(), "a second stop must not emit again");
        assert_eq!(feed.status(), FeedStatus::Stopped);
    }

    #[test]
    fn test_fresh_correlation_ids() {
        let (feed, _rx) = SimulatedFeed::new();
        feed.start().unwrap();

        let first = feed.subscribe("//sim/mktdata", "AAPL", &[]).unwrap();
        let second = feed.subscribe("//sim/mktdata", "MSFT", &[]).unwrap();
        let third = feed.authorize("user").unwrap();
        assert_ne!(first, second);
        assert_ne!(second, third);
    }
}
