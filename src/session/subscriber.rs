//! Subscriber session wiring and polling loop

use std::fmt::Write as _;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use colored::Colorize;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

use crate::dispatch::names;
use crate::dispatch::{
    CorrelationId, Event, EventCategory, EventRouter, HandlerRegistry, Message,
};
use crate::feed::SimulatedFeed;

use super::lifecycle::{Lifecycle, SessionPhase};

/// Consecutive empty polls before the session decides the feed is idle.
const IDLE_POLL_LIMIT: u64 = 3;

const SNAPSHOT_OPERATION: &str = "ReferenceDataRequest";

/// Settings for one subscriber session.
#[derive(Debug, Clone)]
pub struct SubscriberConfig {
    pub service: String,
    pub topics: Vec<String>,
    pub fields: Vec<String>,
    pub principal: String,
    pub poll_timeout: Duration,
    /// Ticks to print before the session stops itself.
    pub max_ticks: u64,
}

impl Default for SubscriberConfig {
    fn default() -> Self {
        Self {
            service: "//sim/mktdata".to_string(),
            topics: vec!["AAPL".to_string(), "MSFT".to_string()],
            fields: vec![
                "LAST_PRICE".to_string(),
                "BID".to_string(),
                "ASK".to_string(),
            ],
            principal: "demo-user".to_string(),
            poll_timeout: Duration::from_millis(500),
            max_ticks: 8,
        }
    }
}

/// Counters accumulated over one session run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SessionStats {
    /// Events delivered by the feed, timeouts excluded.
    pub events: u64,
    /// Market data ticks printed.
    pub ticks: u64,
    /// Empty polls that produced a timeout event.
    pub timeouts: u64,
    /// Handler failures delivered to the exception handler.
    pub raised: u64,
}

/// State shared between the polling loop and the registered handlers.
struct Shared {
    registry: Arc<HandlerRegistry<SimulatedFeed>>,
    lifecycle: Lifecycle,
    stats: Mutex<SessionStats>,
    idle_streak: AtomicU64,
    config: SubscriberConfig,
}

/// A market data subscriber over a simulated feed.
///
/// `initialize` registers the standing handlers and starts the feed; `run`
/// polls events and drives them through the router until the session
/// terminates. Everything that happens in between, authorization, service
/// opening, subscriptions and the reference snapshot, is reactions of
/// handlers to the events the feed delivers.
pub struct SubscriberSession {
    feed: SimulatedFeed,
    event_rx: mpsc::UnboundedReceiver<Event>,
    router: EventRouter<SimulatedFeed>,
    shared: Arc<Shared>,
    shutdown_tx: mpsc::Sender<()>,
    shutdown_rx: mpsc::Receiver<()>,
}

impl SubscriberSession {
    /// Creates a session over a feed with the default script.
    pub fn new(config: SubscriberConfig) -> Self {
        let (feed, event_rx) = SimulatedFeed::new();
        Self::with_feed(feed, event_rx, config)
    }

    /// Creates a session over a prepared feed, typically one with a script.
    pub fn with_feed(
        feed: SimulatedFeed,
        event_rx: mpsc::UnboundedReceiver<Event>,
        config: SubscriberConfig,
    ) -> Self {
        let registry = Arc::new(HandlerRegistry::new());
        let router = EventRouter::with_registry(registry.clone());
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);
        Self {
            feed,
            event_rx,
            router,
            shared: Arc::new(Shared {
                registry,
                lifecycle: Lifecycle::new(),
                stats: Mutex::new(SessionStats::default()),
                idle_streak: AtomicU64::new(0),
                config,
            }),
            shutdown_tx,
            shutdown_rx,
        }
    }

    /// Registers the standing handlers and starts the feed.
    pub fn initialize(&self) -> Result<()> {
        register_exception_handler(&self.shared);
        register_observers(&self.shared);
        register_session_handlers(&self.shared);
        self.feed.start().context("starting feed")?;
        Ok(())
    }

    /// Polls events until the session terminates, returning the final stats.
    pub async fn run(&mut self) -> SessionStats {
        let poll_timeout = self.shared.config.poll_timeout;
        loop {
            let event = tokio::select! {
                maybe_event = self.event_rx.recv() => match maybe_event {
                    Some(event) => event,
                    None => {
                        warn!("event queue closed before termination");
                        self.shared.lifecycle.advance(SessionPhase::Terminated);
                        break;
                    }
                },
                _ = sleep(poll_timeout) => Event::timeout(),
                _ = self.shutdown_rx.recv() => {
                    info!("shutdown requested");
                    if self.feed.is_live() {
                        let _ = self.feed.stop();
                        continue;
                    }
                    self.shared.lifecycle.advance(SessionPhase::Terminated);
                    break;
                }
            };

            if event.category() != EventCategory::Timeout {
                self.shared.stats.lock().events += 1;
                self.shared.idle_streak.store(0, Ordering::Relaxed);
            }

            if !self.router.process_event(&self.feed, &event) {
                break;
            }
            if self.shared.lifecycle.is_terminated() {
                break;
            }
        }

        let stats = self.stats();
        info!(
            events = stats.events,
            ticks = stats.ticks,
            timeouts = stats.timeouts,
            raised = stats.raised,
            "session finished"
        );
        stats
    }

    /// Handle for requesting a stop from outside the polling loop.
    pub fn shutdown_handle(&self) -> mpsc::Sender<()> {
        self.shutdown_tx.clone()
    }

    pub fn registry(&self) -> &Arc<HandlerRegistry<SimulatedFeed>> {
        &self.shared.registry
    }

    pub fn phase(&self) -> SessionPhase {
        self.shared.lifecycle.phase()
    }

    pub fn stats(&self) -> SessionStats {
        *self.shared.stats.lock()
    }

    pub fn feed(&self) -> &SimulatedFeed {
        &self.feed
    }
}

impl Drop for SubscriberSession {
    fn drop(&mut self) {
        if !self.shared.lifecycle.is_terminated() {
            warn!("subscriber session dropped before termination");
        }
    }
}

fn register_exception_handler(shared: &Arc<Shared>) {
    let ctx = Arc::clone(shared);
    shared.registry.set_exception_handler(move |feed, event, err| {
        error!(category = %event.category(), error = %err, "handler raised, stopping session");
        ctx.stats.lock().raised += 1;
        if feed.is_live() {
            let _ = feed.stop();
        } else {
            ctx.lifecycle.advance(SessionPhase::Terminated);
        }
    });
}

fn register_observers(shared: &Arc<Shared>) {
    shared
        .registry
        .register_event_handler(EventCategory::SessionStatus, |_feed, event| {
            for message in event.messages() {
                debug!(message_type = %message.message_type(), "session status");
            }
            Ok(())
        });
    shared
        .registry
        .register_for_category(EventCategory::Admin, |_feed, _event, message| {
            warn!(message_type = %message.message_type(), "admin warning");
            Ok(())
        });
    let ctx = Arc::clone(shared);
    shared
        .registry
        .register_event_handler(EventCategory::Timeout, move |feed, _event| {
            on_poll_timeout(&ctx, feed)
        });
}

fn register_session_handlers(shared: &Arc<Shared>) {
    let ctx = Arc::clone(shared);
    shared
        .registry
        .register_for_message_type(names::SESSION_STARTED, move |feed, _event, _message| {
            on_session_started(&ctx, feed)
        });
    let ctx = Arc::clone(shared);
    shared.registry.register_for_message_type(
        names::SESSION_STARTUP_FAILURE,
        move |_feed, _event, message| {
            error!(
                reason = message.body()["reason"].as_str().unwrap_or("unspecified"),
                "session failed to start"
            );
            ctx.lifecycle.advance(SessionPhase::Terminated);
            Ok(())
        },
    );
    let ctx = Arc::clone(shared);
    shared.registry.register_for_message_type(
        names::SESSION_TERMINATED,
        move |_feed, _event, _message| {
            info!("session terminated");
            ctx.lifecycle.advance(SessionPhase::Terminated);
            Ok(())
        },
    );
    shared
        .registry
        .register_for_message_type(names::SESSION_CONNECTION_UP, |_feed, _event, _message| {
            debug!("connection up");
            Ok(())
        });
    shared
        .registry
        .register_for_message_type(names::SERVICE_OPENED, |_feed, _event, message| {
            info!(
                service = message.body()["service"].as_str().unwrap_or("unknown"),
                "service opened"
            );
            Ok(())
        });
    shared
        .registry
        .register_for_message_type(names::SERVICE_OPEN_FAILURE, |_feed, _event, message| {
            bail!(
                "service failed to open: {}",
                message.body()["service"].as_str().unwrap_or("unknown")
            )
        });
}

/// Reacts to `SessionStarted`: registers the authorization outcome handlers,
/// then opens the service and requests authorization.
fn on_session_started(shared: &Arc<Shared>, feed: &SimulatedFeed) -> Result<()> {
    info!("session started, opening service");
    let ctx = Arc::clone(shared);
    shared.registry.register_for_message_type(
        names::AUTHORIZATION_SUCCESS,
        move |feed, _event, message| {
            debug!(
                principal = message.body()["principal"].as_str().unwrap_or("unknown"),
                "authorization granted"
            );
            on_authorized(&ctx, feed)
        },
    );
    shared.registry.register_for_message_type(
        names::AUTHORIZATION_FAILURE,
        |feed, _event, message| {
            warn!(
                principal = message.body()["principal"].as_str().unwrap_or("unknown"),
                reason = message.body()["reason"].as_str().unwrap_or("unspecified"),
                "authorization denied, stopping"
            );
            feed.stop()?;
            Ok(())
        },
    );
    feed.open_service(&shared.config.service)?;
    feed.authorize(&shared.config.principal)?;
    Ok(())
}

/// Subscribes to every configured topic and requests the reference snapshot.
fn on_authorized(shared: &Arc<Shared>, feed: &SimulatedFeed) -> Result<()> {
    shared.lifecycle.advance(SessionPhase::Started);
    info!(topics = shared.config.topics.len(), "authorized, subscribing");
    for topic in &shared.config.topics {
        subscribe_topic(shared, feed, topic)?;
    }
    request_snapshot(shared, feed)?;
    Ok(())
}

fn subscribe_topic(shared: &Arc<Shared>, feed: &SimulatedFeed, topic: &str) -> Result<()> {
    // Events queue until the polling loop drains them, so registering after
    // the action cannot miss anything.
    let id = feed
        .subscribe(&shared.config.service, topic, &shared.config.fields)
        .with_context(|| format!("subscribing to {topic}"))?;
    let ctx = Arc::clone(shared);
    let topic = topic.to_string();
    shared
        .registry
        .register_for_correlation(id, move |feed, _event, message| {
            on_topic_message(&ctx, feed, &topic, id, message)
        });
    Ok(())
}

fn on_topic_message(
    shared: &Arc<Shared>,
    feed: &SimulatedFeed,
    topic: &str,
    id: CorrelationId,
    message: &Message,
) -> Result<()> {
    match message.message_type().as_str() {
        names::MARKET_DATA_EVENTS => {
            let ticks = {
                let mut stats = shared.stats.lock();
                stats.ticks += 1;
                stats.ticks
            };
            print_tick(topic, message);
            if ticks >= shared.config.max_ticks {
                info!(ticks, "tick budget reached, stopping feed");
                feed.stop()?;
            }
        }
        names::SUBSCRIPTION_STARTED => debug!(topic, %id, "subscription live"),
        names::SUBSCRIPTION_FAILURE | names::SUBSCRIPTION_TERMINATED => {
            warn!(
                topic,
                reason = message.body()["reason"].as_str().unwrap_or("unspecified"),
                "subscription over"
            );
            shared.registry.deregister_for_correlation(id);
        }
        other => debug!(topic, message_type = other, "unhandled subscription message"),
    }
    Ok(())
}

fn request_snapshot(shared: &Arc<Shared>, feed: &SimulatedFeed) -> Result<()> {
    let id = feed.send_request(&shared.config.service, SNAPSHOT_OPERATION, &shared.config.topics)?;
    let ctx = Arc::clone(shared);
    shared
        .registry
        .register_for_correlation(id, move |_feed, event, message| {
            let rows = message.body()["rows"].as_array().map_or(0, Vec::len);
            debug!(rows, category = %event.category(), "snapshot slice");
            if event.category() == EventCategory::Response {
                ctx.registry.deregister_for_correlation(id);
                info!("snapshot complete");
            }
            Ok(())
        });
    Ok(())
}

fn on_poll_timeout(shared: &Arc<Shared>, feed: &SimulatedFeed) -> Result<()> {
    shared.stats.lock().timeouts += 1;
    let idle = shared.idle_streak.fetch_add(1, Ordering::Relaxed) + 1;
    if idle >= IDLE_POLL_LIMIT {
        info!(idle, "feed idle, shutting down");
        if feed.is_live() {
            feed.stop()?;
        } else {
            shared.lifecycle.advance(SessionPhase::Terminated);
        }
    }
    Ok(())
}

fn print_tick(topic: &str, message: &Message) {
    let body = message.body();
    let tick = body["tick"].as_u64().unwrap_or_default();
    let mut rendered = String::new();
    if let Some(fields) = body["fields"].as_object() {
        for (name, value) in fields {
            let _ = write!(rendered, " {}={}", name.dimmed(), value);
        }
    }
    println!("{} {}{}", topic.cyan().bold(), format!("#{tick}").yellow(), rendered);
}
