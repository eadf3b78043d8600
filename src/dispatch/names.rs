//! Well-known message type names in the session vocabulary
//!
//! Kept as constants so call sites never scatter string literals; the feed
//! and the subscriber both register and emit against these.

// Session lifecycle
pub const SESSION_STARTED: &str = "SessionStarted";
pub const SESSION_STARTUP_FAILURE: &str = "SessionStartupFailure";
pub const SESSION_TERMINATED: &str = "SessionTerminated";
pub const SESSION_CONNECTION_UP: &str = "SessionConnectionUp";
pub const SESSION_CONNECTION_DOWN: &str = "SessionConnectionDown";

// Service state
pub const SERVICE_OPENED: &str = "ServiceOpened";
pub const SERVICE_OPEN_FAILURE: &str = "ServiceOpenFailure";

// Subscription state
pub const SUBSCRIPTION_STARTED: &str = "SubscriptionStarted";
pub const SUBSCRIPTION_FAILURE: &str = "SubscriptionFailure";
pub const SUBSCRIPTION_TERMINATED: &str = "SubscriptionTerminated";

// Authorization
pub const AUTHORIZATION_SUCCESS: &str = "AuthorizationSuccess";
pub const AUTHORIZATION_FAILURE: &str = "AuthorizationFailure";
pub const AUTHORIZATION_REVOKED: &str = "AuthorizationRevoked";
pub const ENTITLEMENT_CHANGED: &str = "EntitlementChanged";

// Token generation
pub const TOKEN_GENERATION_SUCCESS: &str = "TokenGenerationSuccess";
pub const TOKEN_GENERATION_FAILURE: &str = "TokenGenerationFailure";

// Flow-control warnings on the admin channel
pub const SLOW_CONSUMER_WARNING: &str = "SlowConsumerWarning";
pub const SLOW_CONSUMER_WARNING_CLEARED: &str = "SlowConsumerWarningCleared";
pub const DATA_LOSS: &str = "DataLoss";

// Request/response
pub const REQUEST_FAILURE: &str = "RequestFailure";
pub const REFERENCE_SNAPSHOT_RESPONSE: &str = "ReferenceSnapshotResponse";

// Subscription data payloads
pub const MARKET_DATA_EVENTS: &str = "MarketDataEvents";
