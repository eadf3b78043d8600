//! Correlation-keyed event dispatch
//!
//! This module provides the core routing components for session events,
//! including correlation ids, event and message types, the handler registry
//! and the event router that walks incoming events.

pub mod correlation;
pub mod event;
pub mod names;
pub mod registry;
pub mod router;

pub use correlation::CorrelationId;
pub use event::{Event, EventCategory, Message, MessageType};
pub use registry::{
    EventHandler, ExceptionHandler, HandlerRegistry, MessageHandler, RegistryCounts,
};
pub use router::EventRouter;
