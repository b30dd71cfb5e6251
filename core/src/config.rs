//! RTC emulator configuration
//!
//! Settings arrive as key/value string pairs. Each key is validated on its
//! own; an invalid or missing value falls back to the default for that key.

use heapless::String;

use crate::error::ConfigError;

pub const RTC_NTP_SERVER_HOST: &str = "RTC_NTP_SERVER_HOST";
pub const RTC_NTP_SERVER_PORT: &str = "RTC_NTP_SERVER_PORT";
pub const RTC_UTC_OFFSET: &str = "RTC_UTC_OFFSET";
pub const RTC_Y2K_PATCH: &str = "RTC_Y2K_PATCH";
pub const RTC_TYPE: &str = "RTC_TYPE";

pub const DEFAULT_NTP_HOST: &str = "pool.ntp.org";
pub const DEFAULT_NTP_PORT: u16 = 123;

/// Longest accepted host name
pub const MAX_HOST_LEN: usize = 255;

const MAX_LABEL_LEN: usize = 63;
const MIN_UTC_OFFSET_HOURS: f64 = -12.0;
const MAX_UTC_OFFSET_HOURS: f64 = 14.0;

/// Which clock chip the host expects
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RtcType {
    /// Shared-memory driver on the cartridge port
    Sidecart,
    /// DS1216 SmartWatch emulation
    Dallas,
    /// Not configured or not recognised; no Dallas emulation is set up
    #[default]
    Unknown,
}

impl RtcType {
    /// Exact, case-sensitive match on `SIDECART` or `DALLAS`
    pub fn parse(value: &str) -> Result<Self, ConfigError> {
        match value {
            "" => Err(ConfigError::Empty),
            "SIDECART" => Ok(RtcType::Sidecart),
            "DALLAS" => Ok(RtcType::Dallas),
            _ => Err(ConfigError::InvalidRtcType),
        }
    }
}

/// NTP client configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NtpConfig {
    /// Server host name
    pub host: String<MAX_HOST_LEN>,
    /// Server UDP port
    pub port: u16,
    /// Seconds added to UTC before the clock is set
    pub utc_offset_secs: i32,
}

impl Default for NtpConfig {
    fn default() -> Self {
        let mut host = String::new();
        // Fits: the default is far below MAX_HOST_LEN
        let _ = host.push_str(DEFAULT_NTP_HOST);
        Self {
            host,
            port: DEFAULT_NTP_PORT,
            utc_offset_secs: 0,
        }
    }
}

/// RTC application configuration
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RtcConfig {
    pub ntp: NtpConfig,
    /// Store the year with the fixed Y2K compensation
    pub y2k_patch: bool,
    pub rtc_type: RtcType,
}

impl RtcConfig {
    /// Build a configuration from key/value settings
    ///
    /// Unknown keys are ignored. Invalid values are logged and replaced by
    /// the default for that key.
    pub fn from_entries(entries: &[(&str, &str)]) -> Self {
        let mut config = Self::default();

        for (key, value) in entries {
            match *key {
                RTC_NTP_SERVER_HOST => match parse_host(value) {
                    Ok(host) => config.ntp.host = host,
                    Err(e) => warn!("{}: {}, using {}", RTC_NTP_SERVER_HOST, e, DEFAULT_NTP_HOST),
                },
                RTC_NTP_SERVER_PORT => match parse_port(value) {
                    Ok(port) => config.ntp.port = port,
                    Err(e) => warn!("{}: {}, using {}", RTC_NTP_SERVER_PORT, e, DEFAULT_NTP_PORT),
                },
                RTC_UTC_OFFSET => match parse_utc_offset(value) {
                    Ok(secs) => config.ntp.utc_offset_secs = secs,
                    Err(e) => warn!("{}: {}, using 0", RTC_UTC_OFFSET, e),
                },
                RTC_Y2K_PATCH => config.y2k_patch = parse_bool_like(value),
                RTC_TYPE => match RtcType::parse(value) {
                    Ok(rtc_type) => config.rtc_type = rtc_type,
                    Err(e) => {
                        warn!("{}: {}, RTC type unknown", RTC_TYPE, e);
                        config.rtc_type = RtcType::Unknown;
                    }
                },
                _ => {}
            }
        }

        config
    }
}

/// Whether `host` is a syntactically valid domain name
pub fn is_valid_domain(host: &str) -> bool {
    if host.is_empty() || host.len() > MAX_HOST_LEN || host.ends_with('-') {
        return false;
    }

    host.split('.').all(|label| {
        !label.is_empty()
            && label.len() <= MAX_LABEL_LEN
            && !label.starts_with('-')
            && label.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'-')
    })
}

fn parse_host(value: &str) -> Result<String<MAX_HOST_LEN>, ConfigError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(ConfigError::Empty);
    }
    if !is_valid_domain(value) {
        return Err(ConfigError::InvalidHost);
    }
    let mut host = String::new();
    host.push_str(value).map_err(|_| ConfigError::InvalidHost)?;
    Ok(host)
}

/// Parse a UDP port in 1..=65535
pub fn parse_port(value: &str) -> Result<u16, ConfigError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(ConfigError::Empty);
    }
    match value.parse::<u16>() {
        Ok(0) | Err(_) => Err(ConfigError::InvalidPort),
        Ok(port) => Ok(port),
    }
}

/// Parse a UTC offset in decimal hours (-12..=14) into whole seconds
///
/// Fractional seconds are truncated toward zero.
pub fn parse_utc_offset(value: &str) -> Result<i32, ConfigError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(ConfigError::Empty);
    }
    let hours: f64 = value.parse().map_err(|_| ConfigError::InvalidUtcOffset)?;
    if !(MIN_UTC_OFFSET_HOURS..=MAX_UTC_OFFSET_HOURS).contains(&hours) {
        return Err(ConfigError::InvalidUtcOffset);
    }
    Ok((hours * 3600.0) as i32)
}

/// `true` when the value starts with `t`, `y` or `1` (any case)
pub fn parse_bool_like(value: &str) -> bool {
    matches!(
        value.trim_start().bytes().next(),
        Some(b't' | b'T' | b'y' | b'Y' | b'1')
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = RtcConfig::default();
        assert_eq!(config.ntp.host.as_str(), "pool.ntp.org");
        assert_eq!(config.ntp.port, 123);
        assert_eq!(config.ntp.utc_offset_secs, 0);
        assert!(!config.y2k_patch);
        assert_eq!(config.rtc_type, RtcType::Unknown);
    }

    #[test]
    fn test_rtc_type_is_case_sensitive() {
        assert_eq!(RtcType::parse("SIDECART"), Ok(RtcType::Sidecart));
        assert_eq!(RtcType::parse("DALLAS"), Ok(RtcType::Dallas));
        assert_eq!(RtcType::parse("dallas"), Err(ConfigError::InvalidRtcType));
        assert_eq!(RtcType::parse(" DALLAS"), Err(ConfigError::InvalidRtcType));
        assert_eq!(RtcType::parse(""), Err(ConfigError::Empty));

        let config = RtcConfig::from_entries(&[(RTC_TYPE, "DALLAS"), (RTC_TYPE, "Sidecart")]);
        assert_eq!(config.rtc_type, RtcType::Unknown);
    }

    #[test]
    fn test_valid_domains() {
        assert!(is_valid_domain("pool.ntp.org"));
        assert!(is_valid_domain("time-a.nist.gov"));
        assert!(is_valid_domain("localhost"));
        assert!(is_valid_domain("0.europe.pool.ntp.org"));
    }

    #[test]
    fn test_invalid_domains() {
        assert!(!is_valid_domain(""));
        assert!(!is_valid_domain("pool..ntp.org"));
        assert!(!is_valid_domain(".pool.ntp.org"));
        assert!(!is_valid_domain("-pool.ntp.org"));
        assert!(!is_valid_domain("pool.-ntp.org"));
        assert!(!is_valid_domain("pool.ntp.org-"));
        assert!(!is_valid_domain("pool.ntp.org."));
        assert!(!is_valid_domain("pool_ntp.org"));
        assert!(!is_valid_domain("pool ntp.org"));

        let long_label = [b'a'; 64];
        assert!(!is_valid_domain(core::str::from_utf8(&long_label).unwrap()));
        let max_label = [b'a'; 63];
        assert!(is_valid_domain(core::str::from_utf8(&max_label).unwrap()));
    }

    #[test]
    fn test_port_range() {
        assert_eq!(parse_port("123"), Ok(123));
        assert_eq!(parse_port("65535"), Ok(65535));
        assert_eq!(parse_port("1"), Ok(1));
        assert_eq!(parse_port("0"), Err(ConfigError::InvalidPort));
        assert_eq!(parse_port("65536"), Err(ConfigError::InvalidPort));
        assert_eq!(parse_port("-1"), Err(ConfigError::InvalidPort));
        assert_eq!(parse_port("ntp"), Err(ConfigError::InvalidPort));
        assert_eq!(parse_port(""), Err(ConfigError::Empty));
    }

    #[test]
    fn test_utc_offset_truncates_to_seconds() {
        assert_eq!(parse_utc_offset("0"), Ok(0));
        assert_eq!(parse_utc_offset("1"), Ok(3600));
        assert_eq!(parse_utc_offset("-3.5"), Ok(-12_600));
        assert_eq!(parse_utc_offset("5.75"), Ok(20_700));
        assert_eq!(parse_utc_offset("14"), Ok(50_400));
        assert_eq!(parse_utc_offset("-12"), Ok(-43_200));
        assert_eq!(parse_utc_offset("14.5"), Err(ConfigError::InvalidUtcOffset));
        assert_eq!(parse_utc_offset("-13"), Err(ConfigError::InvalidUtcOffset));
        assert_eq!(parse_utc_offset("CET"), Err(ConfigError::InvalidUtcOffset));
    }

    #[test]
    fn test_bool_like() {
        for value in ["true", "T", "yes", "Y", "1"] {
            assert!(parse_bool_like(value), "{}", value);
        }
        for value in ["false", "no", "0", "", "x"] {
            assert!(!parse_bool_like(value), "{}", value);
        }
    }

    #[test]
    fn test_from_entries() {
        let config = RtcConfig::from_entries(&[
            (RTC_NTP_SERVER_HOST, "time.cloudflare.com"),
            (RTC_NTP_SERVER_PORT, "1123"),
            (RTC_UTC_OFFSET, "2"),
            (RTC_Y2K_PATCH, "true"),
            (RTC_TYPE, "DALLAS"),
            ("UNRELATED_KEY", "whatever"),
        ]);
        assert_eq!(config.ntp.host.as_str(), "time.cloudflare.com");
        assert_eq!(config.ntp.port, 1123);
        assert_eq!(config.ntp.utc_offset_secs, 7200);
        assert!(config.y2k_patch);
        assert_eq!(config.rtc_type, RtcType::Dallas);
    }

    #[test]
    fn test_invalid_entries_fall_back_per_key() {
        let config = RtcConfig::from_entries(&[
            (RTC_NTP_SERVER_HOST, "bad host!"),
            (RTC_NTP_SERVER_PORT, "0"),
            (RTC_UTC_OFFSET, "99"),
            (RTC_TYPE, "DS1287"),
        ]);
        assert_eq!(config, RtcConfig::default());
    }
}
