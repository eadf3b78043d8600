//! Event walk and handler dispatch

use std::sync::Arc;

use anyhow::Result;
use tracing::{error, trace};

use super::event::{Event, Message};
use super::registry::HandlerRegistry;

/// Routes incoming events to the handlers registered for them.
///
/// For each event the whole-event handler for its category runs first, then
/// every message is walked in delivery order. A message is offered to the
/// handler of each of its correlation ids in attachment order, then to the
/// category handler, then to the message type handler. The first handler
/// error aborts the rest of the current event and is passed to the exception
/// handler; the next event starts from a clean slate.
///
/// The router holds no state of its own besides the registry, so one router
/// can be driven from any number of events without reset.
pub struct EventRouter<S> {
    registry: Arc<HandlerRegistry<S>>,
}

impl<S> EventRouter<S> {
    pub fn new() -> Self {
        Self {
            registry: Arc::new(HandlerRegistry::new()),
        }
    }

    /// Builds a router over an existing registry, letting callers share the
    /// registry handle for registration while the router consumes events.
    pub fn with_registry(registry: Arc<HandlerRegistry<S>>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &Arc<HandlerRegistry<S>> {
        &self.registry
    }

    /// Dispatches one event and reports whether the caller should continue
    /// polling.
    ///
    /// Handler failures never escape: they are delivered to the exception
    /// handler if one is installed and logged otherwise, and the return value
    /// stays `true` either way. Stopping is the application's decision, taken
    /// inside a handler, not the router's.
    pub fn process_event(&self, session: &S, event: &Event) -> bool {
        trace!(
            category = %event.category(),
            messages = event.messages().len(),
            "dispatching event"
        );
        if let Err(err) = self.dispatch(session, event) {
            match self.registry.exception_handler() {
                Some(handler) => handler(session, event, &err),
                None => error!(
                    category = %event.category(),
                    error = %err,
                    "handler failed with no exception handler installed"
                ),
            }
        }
        true
    }

    fn dispatch(&self, session: &S, event: &Event) -> Result<()> {
        if let Some(handler) = self.registry.event_handler(event.category()) {
            handler(session, event)?;
        }
        for message in event.messages() {
            self.dispatch_message(session, event, message)?;
        }
        Ok(())
    }

    fn dispatch_message(&self, session: &S, event: &Event, message: &Message) -> Result<()> {
        for id in message.correlation_ids() {
            if let Some(handler) = self.registry.correlation_handler(*id) {
                trace!(%id, message_type = %message.message_type(), "matched correlation handler");
                handler(session, event, message)?;
            }
        }
        if let Some(handler) = self.registry.category_handler(event.category()) {
            handler(session, event, message)?;
        }
        if let Some(handler) = self.registry.message_type_handler(message.message_type()) {
            handler(session, event, message)?;
        }
        Ok(())
    }
}

impl<S> Default for EventRouter<S> {
    fn default() -> Self {
        Self::new()
    }
}
