//! Poll-driven network link for the NTP synchronizer
//!
//! The synchronizer never blocks on the network: it issues a request
//! (`query_dns`, `send_to`) and then repeatedly calls `poll` with a bounded
//! time budget, reacting to whatever `LinkEvent` comes back. This mirrors a
//! callback-style IP stack while still fitting an async executor.

use core::future::Future;
use core::net::{IpAddr, SocketAddr};

/// Largest datagram the link hands back to the caller
pub const DATAGRAM_CAPACITY: usize = 64;

/// Network link errors
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkError {
    /// Host name rejected before a query was issued
    InvalidHost,
    /// The datagram does not fit the socket's send buffer
    NoBuffer,
    /// The stack refused to send
    SendFailed,
}

impl core::fmt::Display for LinkError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::InvalidHost => write!(f, "Invalid host name"),
            Self::NoBuffer => write!(f, "No send buffer available"),
            Self::SendFailed => write!(f, "Send failed"),
        }
    }
}

impl core::error::Error for LinkError {}

/// A received UDP datagram, truncated to `DATAGRAM_CAPACITY`
#[derive(Debug, Clone, Copy)]
pub struct Datagram {
    /// Sender address and port
    pub from: SocketAddr,
    /// Bytes received on the wire (may exceed the stored data)
    pub len: usize,
    /// Stored payload
    pub data: [u8; DATAGRAM_CAPACITY],
}

impl Datagram {
    /// Build a datagram from a received buffer
    pub fn new(from: SocketAddr, bytes: &[u8]) -> Self {
        let mut data = [0u8; DATAGRAM_CAPACITY];
        let stored = bytes.len().min(DATAGRAM_CAPACITY);
        data[..stored].copy_from_slice(&bytes[..stored]);
        Self {
            from,
            len: bytes.len(),
            data,
        }
    }

    /// The stored part of the payload
    pub fn payload(&self) -> &[u8] {
        &self.data[..self.len.min(DATAGRAM_CAPACITY)]
    }
}

/// Completion reported by `NtpLink::poll`
#[derive(Debug, Clone, Copy)]
pub enum LinkEvent {
    /// An outstanding DNS query resolved
    Resolved(IpAddr),
    /// An outstanding DNS query failed
    ResolveFailed,
    /// A datagram arrived on the link's socket
    Datagram(Datagram),
}

/// DNS + UDP primitives needed for a single NTP exchange
pub trait NtpLink {
    /// Start resolving `host`; completion arrives through `poll`
    fn query_dns(&mut self, host: &str) -> Result<(), LinkError>;

    /// Send one datagram to `to`
    fn send_to(
        &mut self,
        to: SocketAddr,
        data: &[u8],
    ) -> impl Future<Output = Result<(), LinkError>>;

    /// Drive the stack for at most `budget_ms` and return the next event, if any
    ///
    /// A DNS query still pending when the budget runs out may be abandoned.
    fn poll(&mut self, budget_ms: u64) -> impl Future<Output = Option<LinkEvent>>;
}
