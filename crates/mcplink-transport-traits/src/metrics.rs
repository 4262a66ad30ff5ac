//! Transport metrics.
//!
//! Counters are lock-free atomics updated at send/receive sites; a
//! [`TransportMetrics`] snapshot is taken with relaxed loads.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

/// Lock-free counters owned by a transport.
#[derive(Debug, Default)]
pub struct AtomicMetrics {
    /// Messages sent
    pub messages_sent: AtomicU64,
    /// Messages received
    pub messages_received: AtomicU64,
    /// Payload bytes sent
    pub bytes_sent: AtomicU64,
    /// Payload bytes received
    pub bytes_received: AtomicU64,
    /// Successful connections
    pub connections: AtomicU64,
    /// Failed connection attempts
    pub failed_connections: AtomicU64,
}

impl AtomicMetrics {
    /// Record one sent message of `bytes` payload bytes.
    pub fn record_send(&self, bytes: usize) {
        self.messages_sent.fetch_add(1, Ordering::Relaxed);
        self.bytes_sent.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    /// Record one received message of `bytes` payload bytes.
    pub fn record_receive(&self, bytes: usize) {
        self.messages_received.fetch_add(1, Ordering::Relaxed);
        self.bytes_received
            .fetch_add(bytes as u64, Ordering::Relaxed);
    }

    /// Take a point-in-time snapshot.
    pub fn snapshot(&self) -> TransportMetrics {
        TransportMetrics {
            messages_sent: self.messages_sent.load(Ordering::Relaxed),
            messages_received: self.messages_received.load(Ordering::Relaxed),
            bytes_sent: self.bytes_sent.load(Ordering::Relaxed),
            bytes_received: self.bytes_received.load(Ordering::Relaxed),
            connections: self.connections.load(Ordering::Relaxed),
            failed_connections: self.failed_connections.load(Ordering::Relaxed),
        }
    }
}

/// A point-in-time copy of a transport's counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransportMetrics {
    /// Messages sent
    pub messages_sent: u64,
    /// Messages received
    pub messages_received: u64,
    /// Payload bytes sent
    pub bytes_sent: u64,
    /// Payload bytes received
    pub bytes_received: u64,
    /// Successful connections
    pub connections: u64,
    /// Failed connection attempts
    pub failed_connections: u64,
}
