//! Event and message model shared by the feed and the router

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::Value;

use super::correlation::CorrelationId;

/// Coarse kind of an inbound event, assigned by the remote session at
/// ingestion and never mutated afterwards.
///
/// The set is closed: anything the session cannot classify arrives as
/// `Unknown` and routes like every other category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventCategory {
    Admin,
    SessionStatus,
    SubscriptionStatus,
    RequestStatus,
    Response,
    PartialResponse,
    SubscriptionData,
    ServiceStatus,
    Timeout,
    AuthorizationStatus,
    ResolutionStatus,
    TopicStatus,
    TokenStatus,
    Request,
    Unknown,
}

impl EventCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventCategory::Admin => "ADMIN",
            EventCategory::SessionStatus => "SESSION_STATUS",
            EventCategory::SubscriptionStatus => "SUBSCRIPTION_STATUS",
            EventCategory::RequestStatus => "REQUEST_STATUS",
            EventCategory::Response => "RESPONSE",
            EventCategory::PartialResponse => "PARTIAL_RESPONSE",
            EventCategory::SubscriptionData => "SUBSCRIPTION_DATA",
            EventCategory::ServiceStatus => "SERVICE_STATUS",
            EventCategory::Timeout => "TIMEOUT",
            EventCategory::AuthorizationStatus => "AUTHORIZATION_STATUS",
            EventCategory::ResolutionStatus => "RESOLUTION_STATUS",
            EventCategory::TopicStatus => "TOPIC_STATUS",
            EventCategory::TokenStatus => "TOKEN_STATUS",
            EventCategory::Request => "REQUEST",
            EventCategory::Unknown => "UNKNOWN",
        }
    }
}

impl fmt::Display for EventCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Name identifying the semantic kind of one message, e.g. `SessionStarted`.
///
/// Backed by a shared string so messages and registry keys clone cheaply;
/// comparison and hashing are by value.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MessageType(Arc<str>);

impl MessageType {
    pub fn new(name: impl Into<Arc<str>>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for MessageType {
    fn from(name: &str) -> Self {
        Self(Arc::from(name))
    }
}

impl From<String> for MessageType {
    fn from(name: String) -> Self {
        Self(Arc::from(name))
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One logical record inside an event.
///
/// Carries exactly one type name, the correlation ids of the outbound
/// actions it answers (possibly none for broadcast traffic), and an opaque
/// body the router never inspects.
#[derive(Debug, Clone)]
pub struct Message {
    message_type: MessageType,
    correlation_ids: Vec<CorrelationId>,
    body: Value,
}

impl Message {
    pub fn new(message_type: impl Into<MessageType>) -> Self {
        Self {
            message_type: message_type.into(),
            correlation_ids: Vec::new(),
            body: Value::Null,
        }
    }

    pub fn with_correlation_id(mut self, id: CorrelationId) -> Self {
        self.correlation_ids.push(id);
        self
    }

    pub fn with_body(mut self, body: Value) -> Self {
        self.body = body;
        self
    }

    pub fn message_type(&self) -> &MessageType {
        &self.message_type
    }

    /// Correlation ids in the order the remote session attached them.
    pub fn correlation_ids(&self) -> &[CorrelationId] {
        &self.correlation_ids
    }

    pub fn body(&self) -> &Value {
        &self.body
    }

    /// Convenience accessor for a string field of the body.
    pub fn body_str(&self, field: &str) -> Option<&str> {
        self.body.get(field).and_then(Value::as_str)
    }

    /// Convenience accessor for a numeric field of the body.
    pub fn body_f64(&self, field: &str) -> Option<f64> {
        self.body.get(field).and_then(Value::as_f64)
    }
}

/// An immutable ordered batch of messages sharing one category.
///
/// Produced by the remote session, consumed exactly once by the router.
#[derive(Debug, Clone)]
pub struct Event {
    category: EventCategory,
    messages: Vec<Message>,
    received_at: DateTime<Utc>,
}

impl Event {
    pub fn new(category: EventCategory, messages: Vec<Message>) -> Self {
        Self {
            category,
            messages,
            received_at: Utc::now(),
        }
    }

    /// An empty event signalling that a poll window elapsed without traffic.
    pub fn timeout() -> Self {
        Self::new(EventCategory::Timeout, Vec::new())
    }

    pub fn category(&self) -> EventCategory {
        self.category
    }

    /// Messages in arrival order.
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn received_at(&self) -> DateTime<Utc> {
        self.received_at
    }
}
