#![deny(warnings)]
//! Network module
//!
//! - **`config`**: Configuration structs with `Default` implementations
//! - **`error`**: Bring-up error enum
//! - **`link`**: `NtpLink` implementation over embassy-net DNS + UDP
//! - **`manager`**: W5500/embassy-net stack initialization
//!
//! The NTP exchange itself lives in `rtcemul-core`; this module only
//! provides the transport it polls.

pub mod config;
pub mod error;
pub mod link;
pub mod manager;

pub use config::{NetworkConfig, UdpConfig};
pub use link::EmbassyLink;
