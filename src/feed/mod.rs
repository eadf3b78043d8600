//! Simulated market data feed
//!
//! This module provides a deterministic in-process stand-in for a remote
//! market data session. Actions queue the events the remote side would send,
//! and the receiver half delivers them to the polling loop.

pub mod sim;

pub use sim::{FeedError, FeedScript, FeedStatus, SimulatedFeed};
