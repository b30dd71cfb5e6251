//! Hardware abstraction traits for the cartridge RTC emulator
//!
//! This crate defines traits that abstract over hardware differences
//! between boards. BSPs implement these traits; `rtcemul-core` consumes them.
//!
//! - **`rtc`**: calendar time (`ClockState`) and the hardware RTC it lands in
//! - **`net`**: poll-driven DNS + UDP link used by the NTP synchronizer
//! - **`time`**: millisecond monotonic clock for deadlines

#![no_std]
#![deny(unsafe_code)]

pub mod net;
pub mod rtc;
pub mod time;

pub use net::{Datagram, LinkError, LinkEvent, NtpLink};
pub use rtc::{ClockState, HardwareRtc};
pub use time::Monotonic;
