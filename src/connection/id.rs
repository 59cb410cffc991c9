//! Process-unique connection identifiers.

use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// Identifier assigned to a connection.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ConnectionId(u64);

impl From<u64> for ConnectionId {
    fn from(value: u64) -> Self { Self(value) }
}

impl ConnectionId {
    /// Create a new [`ConnectionId`] with the provided value.
    #[must_use]
    pub fn new(id: u64) -> Self { Self(id) }

    /// Allocate the next identifier; identifiers increase monotonically.
    pub(crate) fn next() -> Self { Self(NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed)) }

    /// Return the inner `u64` representation.
    #[must_use]
    pub fn as_u64(&self) -> u64 { self.0 }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result { write!(f, "{}", self.0) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocated_ids_increase() {
        let first = ConnectionId::next();
        let second = ConnectionId::next();
        assert!(second > first);
        assert_eq!(ConnectionId::from(second.as_u64()), second);
    }
}
