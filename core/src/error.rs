//! Error types for the RTC emulator core

use rtcemul_hal::LinkError;

/// Command frame errors
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtocolError {
    /// Checksum word does not match header + payload
    ChecksumMismatch {
        command_id: u16,
        expected: u16,
        received: u16,
    },
    /// Declared payload exceeds the staging capacity
    PayloadTooLarge { command_id: u16, payload_size: u16 },
    /// Word stream ended before the checksum arrived
    Incomplete,
}

impl core::fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::ChecksumMismatch {
                command_id,
                expected,
                received,
            } => write!(
                f,
                "Checksum mismatch for command {:#06x}: expected {:#06x}, got {:#06x}",
                command_id, expected, received
            ),
            Self::PayloadTooLarge {
                command_id,
                payload_size,
            } => write!(
                f,
                "Payload of {} bytes too large for command {:#06x}",
                payload_size, command_id
            ),
            Self::Incomplete => write!(f, "Incomplete frame"),
        }
    }
}

impl core::error::Error for ProtocolError {}

/// Shared memory access errors
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayoutError {
    /// Shared variable index beyond the slot table
    SlotOutOfRange { index: u32 },
}

impl core::fmt::Display for LayoutError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::SlotOutOfRange { index } => {
                write!(f, "Shared variable slot {} out of range", index)
            }
        }
    }
}

impl core::error::Error for LayoutError {}

/// Why an NTP response was discarded
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    /// Not exactly 48 bytes
    Length,
    /// Sender is not the resolved server
    UnexpectedSource,
    /// Mode field is not "server"
    Mode,
    /// Stratum 0 (kiss-o'-death / unsynchronized)
    Stratum,
}

/// NTP acquisition errors
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NtpError {
    /// DNS resolution failed
    DnsError,
    /// Request could not be sent
    Link(LinkError),
    /// Response discarded
    InvalidResponse(Rejection),
    /// Deadline elapsed without a valid response
    Timeout,
    /// Hardware RTC refused the new time
    RtcWrite,
}

impl From<LinkError> for NtpError {
    fn from(e: LinkError) -> Self {
        NtpError::Link(e)
    }
}

impl core::fmt::Display for NtpError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::DnsError => write!(f, "DNS resolution failed"),
            Self::Link(e) => write!(f, "Link error: {}", e),
            Self::InvalidResponse(reason) => write!(f, "Invalid response: {:?}", reason),
            Self::Timeout => write!(f, "Timeout waiting for NTP server"),
            Self::RtcWrite => write!(f, "Cannot set internal RTC"),
        }
    }
}

impl core::error::Error for NtpError {}

/// Settings validation errors
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
    /// Empty value
    Empty,
    /// Host is not a syntactically valid domain name
    InvalidHost,
    /// Port not an integer in 1..=65535
    InvalidPort,
    /// Offset not a decimal number of hours in -12..=14
    InvalidUtcOffset,
    /// Unknown RTC type name
    InvalidRtcType,
}

impl core::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Empty => write!(f, "Empty value"),
            Self::InvalidHost => write!(f, "Invalid NTP server host"),
            Self::InvalidPort => write!(f, "Invalid NTP server port"),
            Self::InvalidUtcOffset => write!(f, "Invalid UTC offset"),
            Self::InvalidRtcType => write!(f, "Invalid RTC type"),
        }
    }
}

impl core::error::Error for ConfigError {}
