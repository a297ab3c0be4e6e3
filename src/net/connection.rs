//! Accepted connection bookkeeping.
//!
//! A `TrackedConnection` lives as long as the task serving the socket. It
//! holds the listener permit, feeds the active-connections gauge and logs
//! how long the client stayed connected once dropped.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use crate::net::listener::ConnectionPermit;
use crate::observability::metrics;

static NEXT_CONNECTION: AtomicU64 = AtomicU64::new(1);

/// Process-unique connection number, rendered as `conn-N` in logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    fn next() -> Self {
        Self(NEXT_CONNECTION.fetch_add(1, Ordering::Relaxed))
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

#[derive(Debug)]
pub struct TrackedConnection {
    id: ConnectionId,
    peer: SocketAddr,
    opened: Instant,
    _permit: Option<ConnectionPermit>,
}

impl TrackedConnection {
    pub fn open(peer: SocketAddr, permit: Option<ConnectionPermit>) -> Self {
        metrics::icap_connection_opened();
        Self {
            id: ConnectionId::next(),
            peer,
            opened: Instant::now(),
            _permit: permit,
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }
}

impl Drop for TrackedConnection {
    fn drop(&mut self) {
        metrics::icap_connection_closed();
        tracing::debug!(
            conn = %self.id,
            peer = %self.peer,
            duration_ms = self.opened.elapsed().as_millis() as u64,
            "Connection closed"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connections_get_distinct_ids() {
        let peer: SocketAddr = "127.0.0.1:4000".parse().unwrap();
        let a = TrackedConnection::open(peer, None);
        let b = TrackedConnection::open(peer, None);
        assert_ne!(a.id(), b.id());
        assert!(a.id().to_string().starts_with("conn-"));
        assert_eq!(b.peer(), peer);
    }
}
