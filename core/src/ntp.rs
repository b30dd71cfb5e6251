//! One-shot NTP time acquisition
//!
//! Resolves the configured server, sends a single 48-byte client request and
//! commits the first acceptable answer to the hardware RTC. Any DNS failure
//! resets the exchange back to a fresh lookup; the whole attempt is bounded
//! by `ACQUIRE_TIMEOUT_MS`.
//!
//! ```text
//!   Idle --query--> DnsPending --resolved--> ServerFound --sent--> RequestSent
//!    ^                  |                        |  ^                  |
//!    |               failed                 send |  | failed        accepted
//!    |                  v                        +--+                  v
//!    +----reset----- Error                                         Completed
//! ```

use core::net::SocketAddr;

use rtcemul_hal::{ClockState, Datagram, HardwareRtc, LinkEvent, Monotonic, NtpLink};

use crate::config::NtpConfig;
use crate::datetime::civil_from_unix;
use crate::error::{NtpError, Rejection};

/// Size of an NTP packet without extensions
pub const NTP_PACKET_LEN: usize = 48;

/// Seconds between 1900-01-01 and 1970-01-01
pub const NTP_DELTA: i64 = 2_208_988_800;

/// Upper bound for one acquisition
pub const ACQUIRE_TIMEOUT_MS: u64 = 5_000;

/// Budget of each network poll
pub const POLL_INTERVAL_MS: u64 = 200;

/// LI = 0, VN = 3, Mode = 3 (client)
const CLIENT_REQUEST_HEADER: u8 = 0x1B;
const MODE_SERVER: u8 = 4;
const TRANSMIT_TIMESTAMP_OFFSET: usize = 40;
/// Length of one NTP era in seconds
const ERA_SECONDS: i64 = 1 << 32;

/// Synchronizer state
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NtpState {
    Idle,
    DnsPending,
    ServerFound,
    RequestSent,
    Completed,
    Error,
}

/// Inputs that drive `NtpState::next`
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NtpInput {
    DnsIssued,
    DnsFailed,
    Resolved,
    RequestSent,
    SendFailed,
    ResponseAccepted,
    Reset,
}

impl NtpState {
    /// Transition function; inputs that do not apply leave the state unchanged
    pub fn next(self, input: NtpInput) -> NtpState {
        use NtpInput as I;
        use NtpState as S;

        match (self, input) {
            (S::Completed, _) => S::Completed,
            (_, I::DnsFailed) => S::Error,
            (S::Idle, I::DnsIssued) => S::DnsPending,
            (S::DnsPending, I::Resolved) => S::ServerFound,
            (S::ServerFound, I::RequestSent) => S::RequestSent,
            (S::ServerFound, I::SendFailed) => S::ServerFound,
            (S::RequestSent, I::ResponseAccepted) => S::Completed,
            (S::Error, I::Reset) => S::Idle,
            (state, _) => state,
        }
    }
}

/// Client request: header byte followed by zeros
pub fn request_packet() -> [u8; NTP_PACKET_LEN] {
    let mut packet = [0u8; NTP_PACKET_LEN];
    packet[0] = CLIENT_REQUEST_HEADER;
    packet
}

/// Check a response and extract its transmit timestamp seconds
pub fn validate_response(datagram: &Datagram, server: SocketAddr) -> Result<u32, NtpError> {
    if datagram.len != NTP_PACKET_LEN {
        return Err(NtpError::InvalidResponse(Rejection::Length));
    }
    if datagram.from != server {
        return Err(NtpError::InvalidResponse(Rejection::UnexpectedSource));
    }

    let packet = datagram.payload();
    if packet[0] & 0x07 != MODE_SERVER {
        return Err(NtpError::InvalidResponse(Rejection::Mode));
    }
    if packet[1] == 0 {
        return Err(NtpError::InvalidResponse(Rejection::Stratum));
    }

    let ts = &packet[TRANSMIT_TIMESTAMP_OFFSET..TRANSMIT_TIMESTAMP_OFFSET + 4];
    Ok(u32::from_be_bytes([ts[0], ts[1], ts[2], ts[3]]))
}

/// NTP seconds to Unix seconds, plus `utc_offset_secs`
///
/// With the most significant bit clear the timestamp belongs to era 1
/// (after 2036-02-07 06:28:16 UTC), RFC 4330 section 3.
pub fn ntp_to_unix(ntp_secs: u32, utc_offset_secs: i32) -> i64 {
    let mut secs = ntp_secs as i64;
    if ntp_secs & 0x8000_0000 == 0 {
        secs += ERA_SECONDS;
    }
    secs - NTP_DELTA + utc_offset_secs as i64
}

/// Calendar time for an NTP transmit timestamp
pub fn clock_from_ntp(ntp_secs: u32, utc_offset_secs: i32) -> ClockState {
    civil_from_unix(ntp_to_unix(ntp_secs, utc_offset_secs))
}

/// Book-keeping for one acquisition attempt
pub struct NtpSession {
    state: NtpState,
    server: Option<SocketAddr>,
    port: u16,
}

impl NtpSession {
    pub fn new(port: u16) -> Self {
        Self {
            state: NtpState::Idle,
            server: None,
            port,
        }
    }

    pub fn state(&self) -> NtpState {
        self.state
    }

    pub fn server(&self) -> Option<SocketAddr> {
        self.server
    }

    fn advance(&mut self, input: NtpInput) {
        let next = self.state.next(input);
        if next != self.state {
            debug!("NTP {} -> {}", self.state, next);
        }
        self.state = next;
        if self.state == NtpState::Idle {
            self.server = None;
        }
    }

    fn on_event(&mut self, event: LinkEvent, config: &NtpConfig) -> Option<ClockState> {
        match event {
            LinkEvent::Resolved(ip) if self.state == NtpState::DnsPending => {
                if self.server.is_none() {
                    let server = SocketAddr::new(ip, self.port);
                    info!("NTP server {} resolved", config.host.as_str());
                    self.server = Some(server);
                }
                self.advance(NtpInput::Resolved);
                None
            }
            LinkEvent::ResolveFailed => {
                warn!("DNS lookup for {} failed", config.host.as_str());
                self.advance(NtpInput::DnsFailed);
                None
            }
            LinkEvent::Datagram(datagram) if self.state == NtpState::RequestSent => {
                let server = self.server?;
                match validate_response(&datagram, server) {
                    Ok(ntp_secs) => {
                        self.advance(NtpInput::ResponseAccepted);
                        Some(clock_from_ntp(ntp_secs, config.utc_offset_secs))
                    }
                    Err(e) => {
                        warn!("Discarding NTP response: {}", e);
                        None
                    }
                }
            }
            _ => {
                trace!("Ignoring link event in state {}", self.state);
                None
            }
        }
    }
}

/// Acquire the time from the configured server and commit it to `rtc`
///
/// Returns the committed time, or `NtpError::Timeout` when no acceptable
/// response arrived within `ACQUIRE_TIMEOUT_MS`.
pub async fn acquire<L, M, R>(
    config: &NtpConfig,
    link: &mut L,
    monotonic: &M,
    rtc: &mut R,
) -> Result<ClockState, NtpError>
where
    L: NtpLink,
    M: Monotonic,
    R: HardwareRtc,
{
    let deadline = monotonic.now_ms().saturating_add(ACQUIRE_TIMEOUT_MS);
    let mut session = NtpSession::new(config.port);
    let mut last_error = NtpError::Timeout;
    let mut committed = ClockState::UNSET;

    info!("Acquiring time from {}:{}", config.host.as_str(), config.port);

    while !committed.is_set() {
        let now = monotonic.now_ms();
        if now >= deadline {
            break;
        }

        match session.state {
            NtpState::Idle => match link.query_dns(config.host.as_str()) {
                Ok(()) => session.advance(NtpInput::DnsIssued),
                Err(e) => {
                    warn!("Cannot start DNS lookup: {}", e);
                    last_error = NtpError::DnsError;
                    session.advance(NtpInput::DnsFailed);
                }
            },
            NtpState::ServerFound => {
                if let Some(server) = session.server {
                    match link.send_to(server, &request_packet()).await {
                        Ok(()) => session.advance(NtpInput::RequestSent),
                        Err(e) => {
                            warn!("NTP request not sent: {}", e);
                            last_error = e.into();
                            session.advance(NtpInput::SendFailed);
                        }
                    }
                }
            }
            NtpState::Error => {
                last_error = NtpError::DnsError;
                session.advance(NtpInput::Reset);
                continue;
            }
            NtpState::DnsPending | NtpState::RequestSent | NtpState::Completed => {}
        }

        // A lookup in flight keeps running until the deadline; cutting it
        // at the poll interval would restart it on every pass
        let budget = if session.state == NtpState::DnsPending {
            deadline - now
        } else {
            POLL_INTERVAL_MS.min(deadline - now)
        };
        if let Some(event) = link.poll(budget).await {
            if let Some(time) = session.on_event(event, config) {
                rtc.set_datetime(&time).map_err(|_| {
                    error!("Cannot set internal RTC");
                    NtpError::RtcWrite
                })?;
                info!(
                    "RTC set to {}-{}-{} {}:{}:{}",
                    time.year,
                    time.month,
                    time.day,
                    time.hour,
                    time.min,
                    time.sec
                );
                committed = time;
            }
        }
    }

    if committed.is_set() {
        return Ok(committed);
    }

    error!("NTP acquisition timed out in state {}", session.state);
    if last_error != NtpError::Timeout {
        debug!("Last NTP error: {}", last_error);
    }
    Err(NtpError::Timeout)
}
