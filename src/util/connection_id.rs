//! Per-connection identifiers for log correlation.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

static CONNECTION_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Process-unique connection identifier, formatted as `conn-{counter:016x}`.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Allocate the next identifier.
    pub fn next() -> Self {
        Self(CONNECTION_COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{:016x}", self.0)
    }
}
