#![deny(unsafe_code)]
#![deny(warnings)]
//! Build-time settings
//!
//! Values come from environment variables at build time, e.g.
//!
//! ```text
//! RTC_NTP_SERVER_HOST=time.cloudflare.com RTC_UTC_OFFSET=1 cargo run --release
//! ```
//!
//! Unset keys are left out so the core falls back to its defaults.

use heapless::Vec;
use rtcemul_core::config::{
    RtcConfig, RTC_NTP_SERVER_HOST, RTC_NTP_SERVER_PORT, RTC_TYPE, RTC_UTC_OFFSET, RTC_Y2K_PATCH,
};

const ENTRIES: [(&str, Option<&str>); 5] = [
    (RTC_NTP_SERVER_HOST, option_env!("RTC_NTP_SERVER_HOST")),
    (RTC_NTP_SERVER_PORT, option_env!("RTC_NTP_SERVER_PORT")),
    (RTC_UTC_OFFSET, option_env!("RTC_UTC_OFFSET")),
    (RTC_Y2K_PATCH, option_env!("RTC_Y2K_PATCH")),
    (RTC_TYPE, option_env!("RTC_TYPE")),
];

/// Parse the build-time settings
pub fn rtc_config() -> RtcConfig {
    let mut entries: Vec<(&str, &str), 5> = Vec::new();
    for (key, value) in ENTRIES {
        if let Some(value) = value {
            // Capacity matches ENTRIES
            let _ = entries.push((key, value));
        }
    }
    RtcConfig::from_entries(&entries)
}
