#![deny(unsafe_code)]
#![deny(warnings)]
//! Board network bring-up errors

use defmt::Format;

/// Errors raised while bringing the Ethernet link up
#[derive(Debug, Clone, Copy, Format)]
pub enum NetworkError {
    /// W5500 did not answer during initialization
    EthernetInit,
    /// UDP socket could not be bound
    SocketError,
}

impl core::fmt::Display for NetworkError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::EthernetInit => write!(f, "W5500 initialization failed"),
            Self::SocketError => write!(f, "Socket error"),
        }
    }
}

// Implement core::error::Error for no_std compatibility
impl core::error::Error for NetworkError {}
