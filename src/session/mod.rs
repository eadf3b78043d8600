//! Subscriber session management
//!
//! This module ties the feed, the handler registry and the polling loop
//! together into a runnable market data subscriber, and tracks where in its
//! lifecycle a session currently is.

pub mod lifecycle;
pub mod subscriber;

pub use lifecycle::{Lifecycle, SessionPhase};
pub use subscriber::{SessionStats, SubscriberConfig, SubscriberSession};
