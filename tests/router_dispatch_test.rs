//! Event routing tests for TickRoute

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use anyhow::Result;
use parking_lot::Mutex;
use serde_json::json;
use tickroute::dispatch::{
    CorrelationId, Event, EventCategory, EventRouter, HandlerRegistry, Message,
};

type Trace = Arc<Mutex<Vec<String>>>;

fn trace_handler(
    trace: &Trace,
    label: &str,
) -> impl Fn(&(), &Event, &Message) -> Result<()> + Send + Sync + 'static {
    let trace = trace.clone();
    let label = label.to_string();
    move |_, _, _| {
        trace.lock().push(label.clone());
        Ok(())
    }
}

#[test]
fn test_full_event_walk_matches_delivery_order() {
    let router: EventRouter<()> = EventRouter::new();
    let registry = router.registry().clone();
    let trace: Trace = Arc::new(Mutex::new(Vec::new()));

    let whole_event = trace.clone();
    registry.register_event_handler(EventCategory::SubscriptionData, move |_, _| {
        whole_event.lock().push("event".to_string());
        Ok(())
    });
    let first = CorrelationId::new(100);
    let second = CorrelationId::new(200);
    registry.register_for_correlation(first, trace_handler(&trace, "key-first"));
    registry.register_for_correlation(second, trace_handler(&trace, "key-second"));
    registry.register_for_category(
        EventCategory::SubscriptionData,
        trace_handler(&trace, "category"),
    );
    registry.register_for_message_type("MarketDataEvents", trace_handler(&trace, "type"));

    // Two messages, each with its own correlation id.
    let event = Event::new(
        EventCategory::SubscriptionData,
        vec![
            Message::new("MarketDataEvents").with_correlation_id(first),
            Message::new("MarketDataEvents").with_correlation_id(second),
        ],
    );
    assert!(router.process_event(&(), &event));

    assert_eq!(
        *trace.lock(),
        vec![
            "event",
            "key-first",
            "category",
            "type",
            "key-second",
            "category",
            "type",
        ],
        "the whole-event handler runs once, then each message is walked in order"
    );
}

#[test]
fn test_failure_stops_current_event_only() {
    let router: EventRouter<()> = EventRouter::new();
    let registry = router.registry().clone();
    let seen_categories = Arc::new(Mutex::new(Vec::new()));
    let delivered = Arc::new(AtomicUsize::new(0));

    let failing = CorrelationId::new(300);
    registry.register_for_correlation(failing, |_, _, _| anyhow::bail!("tick handler broke"));
    let counter = delivered.clone();
    registry.register_for_category(EventCategory::SubscriptionData, move |_, _, _| {
        counter.fetch_add(1, Ordering::SeqCst);
        Ok(())
    });
    let categories = seen_categories.clone();
    registry.set_exception_handler(move |_, event, err| {
        categories.lock().push((event.category(), err.to_string()));
    });

    let poisoned = Event::new(
        EventCategory::SubscriptionData,
        vec![Message::new("MarketDataEvents").with_correlation_id(failing)],
    );
    let clean = Event::new(
        EventCategory::SubscriptionData,
        vec![Message::new("MarketDataEvents")],
    );
    assert!(router.process_event(&(), &poisoned));
    assert!(router.process_event(&(), &clean));

    assert_eq!(
        delivered.load(Ordering::SeqCst),
        1,
        "the category handler must still fire for the event after the failure"
    );
    let raised = seen_categories.lock();
    assert_eq!(raised.len(), 1, "exactly one failure should be raised");
    assert_eq!(raised[0].0, EventCategory::SubscriptionData);
    assert_eq!(raised[0].1, "tick handler broke");
}

#[test]
fn test_registry_handle_is_shared_with_the_router() {
    let registry: Arc<HandlerRegistry<()>> = Arc::new(HandlerRegistry::new());
    let router = EventRouter::with_registry(registry.clone());
    let hits = Arc::new(AtomicUsize::new(0));

    // Registration goes through the outer handle, dispatch through the router.
    let counter = hits.clone();
    registry.register_for_message_type("SessionStarted", move |_, _, _| {
        counter.fetch_add(1, Ordering::SeqCst);
        Ok(())
    });

    let event = Event::new(EventCategory::SessionStatus, vec![Message::new("SessionStarted")]);
    router.process_event(&(), &event);
    assert_eq!(hits.load(Ordering::SeqCst), 1, "both handles must see one registry");
}

#[test]
fn test_deregistration_applies_to_later_events() {
    let router: EventRouter<()> = EventRouter::new();
    let registry = router.registry().clone();
    let hits = Arc::new(AtomicUsize::new(0));

    let id = CorrelationId::new(400);
    let counter = hits.clone();
    registry.register_for_correlation(id, move |_, _, _| {
        counter.fetch_add(1, Ordering::SeqCst);
        Ok(())
    });

    let event = Event::new(
        EventCategory::Response,
        vec![Message::new("ReferenceSnapshotResponse").with_correlation_id(id)],
    );
    router.process_event(&(), &event);
    registry.deregister_for_correlation(id);
    router.process_event(&(), &event);

    assert_eq!(
        hits.load(Ordering::SeqCst),
        1,
        "a deregistered handler must not fire for later events"
    );
    assert_eq!(registry.counts().correlations, 0);
}

#[test]
fn test_exception_handler_sees_the_error_context() {
    use anyhow::Context;

    let router: EventRouter<()> = EventRouter::new();
    let registry = router.registry().clone();
    let rendered = Arc::new(Mutex::new(String::new()));

    registry.register_for_message_type("MarketDataEvents", |_, _, message| {
        let price = message
            .body()
            .get("price")
            .and_then(|value| value.as_f64())
            .context("tick without a price")?;
        anyhow::ensure!(price > 0.0, "non-positive price {price}");
        Ok(())
    });
    let sink = rendered.clone();
    registry.set_exception_handler(move |_, _, err| {
        *sink.lock() = format!("{err:#}");
    });

    let event = Event::new(
        EventCategory::SubscriptionData,
        vec![Message::new("MarketDataEvents").with_body(json!({ "topic": "AAPL" }))],
    );
    router.process_event(&(), &event);

    assert_eq!(
        *rendered.lock(),
        "tick without a price",
        "the handler error must arrive unchanged"
    );
}

#[test]
fn test_clearing_the_exception_handler_falls_back_to_logging() {
    let router: EventRouter<()> = EventRouter::new();
    let registry = router.registry().clone();
    let raised = Arc::new(AtomicUsize::new(0));

    registry.register_for_category(EventCategory::RequestStatus, |_, _, _| {
        anyhow::bail!("request failed")
    });
    let counter = raised.clone();
    registry.set_exception_handler(move |_, _, _| {
        counter.fetch_add(1, Ordering::SeqCst);
    });
    registry.clear_exception_handler();

    let event = Event::new(EventCategory::RequestStatus, vec![Message::new("RequestFailure")]);
    assert!(
        router.process_event(&(), &event),
        "an unhandled failure must still report continue"
    );
    assert_eq!(
        raised.load(Ordering::SeqCst),
        0,
        "a cleared exception handler must not be invoked"
    );
}

#[test]
fn test_lifecycle_handlers_fire_only_on_their_own_events() {
    let router: EventRouter<()> = EventRouter::new();
    let registry = router.registry().clone();
    let started = Arc::new(AtomicUsize::new(0));
    let authorized = Arc::new(AtomicUsize::new(0));

    let counter = started.clone();
    registry.register_for_message_type("SessionStarted", move |_, _, _| {
        counter.fetch_add(1, Ordering::SeqCst);
        Ok(())
    });
    let auth_key = CorrelationId::new(600);
    let counter = authorized.clone();
    registry.register_for_correlation(auth_key, move |_, _, _| {
        counter.fetch_add(1, Ordering::SeqCst);
        Ok(())
    });

    let session_up = Event::new(
        EventCategory::SessionStatus,
        vec![Message::new("SessionStarted")],
    );
    router.process_event(&(), &session_up);
    assert_eq!(started.load(Ordering::SeqCst), 1);
    assert_eq!(
        authorized.load(Ordering::SeqCst),
        0,
        "the keyed handler must wait for its own message"
    );

    let auth_granted = Event::new(
        EventCategory::AuthorizationStatus,
        vec![Message::new("AuthorizationSuccess").with_correlation_id(auth_key)],
    );
    router.process_event(&(), &auth_granted);
    assert_eq!(authorized.load(Ordering::SeqCst), 1);
    assert_eq!(
        started.load(Ordering::SeqCst),
        1,
        "the type handler must not fire for an unrelated event"
    );
}

#[test]
fn test_raising_category_handler_fires_once_per_event() {
    let router: EventRouter<()> = EventRouter::new();
    let registry = router.registry().clone();
    let attempts = Arc::new(AtomicUsize::new(0));
    let raised = Arc::new(AtomicUsize::new(0));

    let counter = attempts.clone();
    registry.register_for_category(EventCategory::RequestStatus, move |_, _, _| {
        counter.fetch_add(1, Ordering::SeqCst);
        anyhow::bail!("request rejected")
    });
    let counter = raised.clone();
    registry.set_exception_handler(move |_, _, _| {
        counter.fetch_add(1, Ordering::SeqCst);
    });

    let event = Event::new(
        EventCategory::RequestStatus,
        vec![Message::new("RequestFailure"), Message::new("RequestFailure")],
    );
    router.process_event(&(), &event);

    assert_eq!(
        attempts.load(Ordering::SeqCst),
        1,
        "the second message must never reach the failing handler"
    );
    assert_eq!(raised.load(Ordering::SeqCst), 1, "one failure, one delivery");
}

#[test]
fn test_aliased_handlers_fire_once_per_matching_key() {
    let router: EventRouter<()> = EventRouter::new();
    let registry = router.registry().clone();
    let hits = Arc::new(AtomicUsize::new(0));

    // The same closure body registered under two keys still fires per key.
    for raw in [500u64, 501] {
        let counter = hits.clone();
        registry.register_for_correlation(CorrelationId::new(raw), move |_, _, _| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });
    }

    let event = Event::new(
        EventCategory::Response,
        vec![
            Message::new("ReferenceSnapshotResponse")
                .with_correlation_id(CorrelationId::new(500))
                .with_correlation_id(CorrelationId::new(501)),
        ],
    );
    router.process_event(&(), &event);
    assert_eq!(hits.load(Ordering::SeqCst), 2);
}
