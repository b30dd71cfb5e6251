//! Platform-agnostic core of the cartridge RTC emulator
//!
//! This crate contains the logic shared by every board: the cartridge bus
//! command codec, the shared-memory window layout, the RTC command engine,
//! NTP acquisition and Dallas DS1216 emulation. It has NO hardware
//! dependencies; boards plug in through the traits in `rtcemul-hal`.

#![no_std]
#![deny(unsafe_code)]

#[macro_use]
mod fmt;

pub mod config;
pub mod dallas;
pub mod datetime;
pub mod dispatch;
pub mod engine;
pub mod error;
pub mod layout;
pub mod ntp;
pub mod protocol;

pub use config::{NtpConfig, RtcConfig, RtcType};
pub use dispatch::{Dispatcher, FrameSlot, ProbeQueue};
pub use engine::{Command, RtcEngine};
pub use error::{ConfigError, LayoutError, NtpError, ProtocolError};
pub use layout::{SharedMemory, WINDOW_LEN};
pub use protocol::CommandFrame;
