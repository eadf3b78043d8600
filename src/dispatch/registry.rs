//! Handler registration tables consulted by the event router

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;
use parking_lot::Mutex;
use tracing::debug;

use super::correlation::CorrelationId;
use super::event::{Event, EventCategory, Message, MessageType};

/// Callback for one message, given the session handle it arrived on.
///
/// An `Err` return stops dispatch for the remainder of the current event and
/// is delivered to the exception handler.
pub type MessageHandler<S> = Arc<dyn Fn(&S, &Event, &Message) -> Result<()> + Send + Sync>;

/// Callback for a whole event, invoked once before its messages are walked.
pub type EventHandler<S> = Arc<dyn Fn(&S, &Event) -> Result<()> + Send + Sync>;

/// Callback receiving the error another handler returned, together with the
/// event that was being dispatched.
pub type ExceptionHandler<S> = Arc<dyn Fn(&S, &Event, &anyhow::Error) + Send + Sync>;

/// Entry counts per table, mainly for watching leaked per-action keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RegistryCounts {
    pub correlations: usize,
    pub categories: usize,
    pub message_types: usize,
    pub event_handlers: usize,
}

struct Tables<S> {
    by_correlation: HashMap<CorrelationId, MessageHandler<S>>,
    by_category: HashMap<EventCategory, MessageHandler<S>>,
    by_message_type: HashMap<MessageType, MessageHandler<S>>,
    event_handlers: HashMap<EventCategory, EventHandler<S>>,
    exception_handler: Option<ExceptionHandler<S>>,
}

impl<S> Default for Tables<S> {
    fn default() -> Self {
        Self {
            by_correlation: HashMap::new(),
            by_category: HashMap::new(),
            by_message_type: HashMap::new(),
            event_handlers: HashMap::new(),
            exception_handler: None,
        }
    }
}

/// Thread-safe registry mapping correlation ids, event categories and message
/// type names to handlers.
///
/// All five tables live behind one mutex. Every lookup clones the matched
/// handler out and releases the lock before returning, so callers never
/// invoke a handler while the lock is held and handlers are free to register
/// and deregister reentrantly. Registration is last-writer-wins per key;
/// deregistering an absent entry is a no-op.
pub struct HandlerRegistry<S> {
    tables: Mutex<Tables<S>>,
}

impl<S> HandlerRegistry<S> {
    pub fn new() -> Self {
        Self {
            tables: Mutex::new(Tables::default()),
        }
    }

    /// Registers `handler` for every message carrying `id`.
    pub fn register_for_correlation<F>(&self, id: CorrelationId, handler: F)
    where
        F: Fn(&S, &Event, &Message) -> Result<()> + Send + Sync + 'static,
    {
        debug!(%id, "registering correlation handler");
        self.tables.lock().by_correlation.insert(id, Arc::new(handler));
    }

    pub fn deregister_for_correlation(&self, id: CorrelationId) {
        debug!(%id, "deregistering correlation handler");
        self.tables.lock().by_correlation.remove(&id);
    }

    /// Registers `handler` for every message of every `category` event.
    pub fn register_for_category<F>(&self, category: EventCategory, handler: F)
    where
        F: Fn(&S, &Event, &Message) -> Result<()> + Send + Sync + 'static,
    {
        debug!(%category, "registering category handler");
        self.tables.lock().by_category.insert(category, Arc::new(handler));
    }

    pub fn deregister_for_category(&self, category: EventCategory) {
        debug!(%category, "deregistering category handler");
        self.tables.lock().by_category.remove(&category);
    }

    /// Registers `handler` for every message with the given type name.
    pub fn register_for_message_type<F>(&self, message_type: impl Into<MessageType>, handler: F)
    where
        F: Fn(&S, &Event, &Message) -> Result<()> + Send + Sync + 'static,
    {
        let message_type = message_type.into();
        debug!(%message_type, "registering message type handler");
        self.tables
            .lock()
            .by_message_type
            .insert(message_type, Arc::new(handler));
    }

    pub fn deregister_for_message_type(&self, message_type: impl Into<MessageType>) {
        let message_type = message_type.into();
        debug!(%message_type, "deregistering message type handler");
        self.tables.lock().by_message_type.remove(&message_type);
    }

    /// Registers the whole-event `handler` for `category`, invoked once per
    /// event before any per-message dispatch.
    pub fn register_event_handler<F>(&self, category: EventCategory, handler: F)
    where
        F: Fn(&S, &Event) -> Result<()> + Send + Sync + 'static,
    {
        debug!(%category, "registering whole-event handler");
        self.tables.lock().event_handlers.insert(category, Arc::new(handler));
    }

    pub fn deregister_event_handler(&self, category: EventCategory) {
        debug!(%category, "deregistering whole-event handler");
        self.tables.lock().event_handlers.remove(&category);
    }

    /// Installs the single global exception handler, replacing any prior one.
    pub fn set_exception_handler<F>(&self, handler: F)
    where
        F: Fn(&S, &Event, &anyhow::Error) + Send + Sync + 'static,
    {
        debug!("registering exception handler");
        self.tables.lock().exception_handler = Some(Arc::new(handler));
    }

    pub fn clear_exception_handler(&self) {
        debug!("deregistering exception handler");
        self.tables.lock().exception_handler = None;
    }

    pub fn correlation_handler(&self, id: CorrelationId) -> Option<MessageHandler<S>> {
        self.tables.lock().by_correlation.get(&id).cloned()
    }

    pub fn category_handler(&self, category: EventCategory) -> Option<MessageHandler<S>> {
        self.tables.lock().by_category.get(&category).cloned()
    }

    pub fn message_type_handler(&self, message_type: &MessageType) -> Option<MessageHandler<S>> {
        self.tables.lock().by_message_type.get(message_type).cloned()
    }

    pub fn event_handler(&self, category: EventCategory) -> Option<EventHandler<S>> {
        self.tables.lock().event_handlers.get(&category).cloned()
    }

    pub fn exception_handler(&self) -> Option<ExceptionHandler<S>> {
        self.tables.lock().exception_handler.clone()
    }

    /// Current entry counts per table.
    ///
    /// Correlation entries are registered per outbound action and only ever
    /// removed explicitly, so a steadily growing count is the signature of an
    /// application forgetting to deregister on terminal messages.
    pub fn counts(&self) -> RegistryCounts {
        let tables = self.tables.lock();
        RegistryCounts {
            correlations: tables.by_correlation.len(),
            categories: tables.by_category.len(),
            message_types: tables.by_message_type.len(),
            event_handlers: tables.event_handlers.len(),
        }
    }
}

impl<S> Default for HandlerRegistry<S> {
    fn default() -> Self {
        Self::new()
    }
}
