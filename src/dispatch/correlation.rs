//! Correlation ids pairing outbound actions with their inbound messages

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

/// Process-wide id source, seeded well above zero so hand-picked test ids
/// never collide with generated ones.
static NEXT_ID: AtomicU64 = AtomicU64::new(10_000);

/// Opaque token minted by the application when it initiates an outbound
/// action (subscribe, send request, authorize).
///
/// Every message the remote session emits for that action carries the token
/// back. The router only ever compares and hashes ids; their numeric value
/// has no meaning beyond uniqueness.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CorrelationId(u64);

impl CorrelationId {
    /// Wraps an application-chosen value.
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    /// Mints a fresh process-unique id.
    pub fn generate() -> Self {
        Self(NEXT_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub const fn value(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "cid:{}", self.0)
    }
}

impl From<u64> for CorrelationId {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_generated_ids_are_unique() {
        let ids: HashSet<CorrelationId> = (0..1000).map(|_| CorrelationId::generate()).collect();
        assert_eq!(ids.len(), 1000, "every generated id should be distinct");
    }

    #[test]
    fn test_explicit_ids_compare_by_value() {
        assert_eq!(CorrelationId::new(7), CorrelationId::from(7));
        assert_ne!(CorrelationId::new(7), CorrelationId::new(8));
        assert_eq!(CorrelationId::new(42).value(), 42);
    }

    #[test]
    fn test_display_format() {
        assert_eq!(CorrelationId::new(123).to_string(), "cid:123");
    }
}
