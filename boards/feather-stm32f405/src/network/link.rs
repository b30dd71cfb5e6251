#![deny(unsafe_code)]
#![deny(warnings)]
//! `NtpLink` over embassy-net
//!
//! DNS and receive are bounded by the poll budget with `select` against an
//! embassy-time `Timer`. Dropping the `dns_query` future cancels the lookup,
//! so the synchronizer hands a pending lookup the rest of its deadline as the
//! budget instead of the receive interval.

use core::net::{IpAddr, SocketAddr};

use defmt::{debug, warn, Debug2Format};
use embassy_futures::select::{select, Either};
use embassy_net::dns::DnsQueryType;
use embassy_net::udp::{SendError, UdpSocket};
use embassy_net::{IpAddress, IpEndpoint, Stack};
use embassy_time::Timer;
use heapless::String;
use rtcemul_core::config::MAX_HOST_LEN;
use rtcemul_hal::net::DATAGRAM_CAPACITY;
use rtcemul_hal::{Datagram, LinkError, LinkEvent, NtpLink};

use super::config::UdpConfig;
use super::error::NetworkError;

pub struct EmbassyLink<'a> {
    stack: Stack<'a>,
    socket: UdpSocket<'a>,
    pending_dns: Option<String<MAX_HOST_LEN>>,
}

impl<'a> EmbassyLink<'a> {
    /// Bind `socket` and wrap it
    pub fn new(
        stack: Stack<'a>,
        mut socket: UdpSocket<'a>,
        config: UdpConfig,
    ) -> Result<Self, NetworkError> {
        socket.bind(config.local_port).map_err(|e| {
            warn!("UDP bind to port {} failed: {:?}", config.local_port, e);
            NetworkError::SocketError
        })?;
        Ok(Self {
            stack,
            socket,
            pending_dns: None,
        })
    }

    async fn poll_dns(&mut self, budget_ms: u64) -> Option<LinkEvent> {
        let host = self.pending_dns.as_ref()?;
        let query = self.stack.dns_query(host.as_str(), DnsQueryType::A);

        let result = select(query, Timer::after_millis(budget_ms)).await;

        match result {
            Either::First(Ok(addrs)) => {
                self.pending_dns = None;
                match addrs.first() {
                    Some(addr) => Some(LinkEvent::Resolved(to_ip(*addr))),
                    None => Some(LinkEvent::ResolveFailed),
                }
            }
            Either::First(Err(e)) => {
                debug!("DNS query failed: {:?}", Debug2Format(&e));
                self.pending_dns = None;
                Some(LinkEvent::ResolveFailed)
            }
            Either::Second(()) => None,
        }
    }
}

fn to_ip(addr: IpAddress) -> IpAddr {
    match addr {
        IpAddress::Ipv4(v4) => IpAddr::V4(v4),
    }
}

impl NtpLink for EmbassyLink<'_> {
    fn query_dns(&mut self, host: &str) -> Result<(), LinkError> {
        let mut pending = String::new();
        pending
            .push_str(host)
            .map_err(|_| LinkError::InvalidHost)?;
        self.pending_dns = Some(pending);
        Ok(())
    }

    async fn send_to(&mut self, to: SocketAddr, data: &[u8]) -> Result<(), LinkError> {
        let addr = match to.ip() {
            IpAddr::V4(v4) => IpAddress::Ipv4(v4),
            IpAddr::V6(_) => return Err(LinkError::SendFailed),
        };
        self.socket
            .send_to(data, IpEndpoint::new(addr, to.port()))
            .await
            .map_err(|e| {
                warn!("UDP send failed: {:?}", e);
                match e {
                    SendError::PacketTooLarge => LinkError::NoBuffer,
                    _ => LinkError::SendFailed,
                }
            })
    }

    async fn poll(&mut self, budget_ms: u64) -> Option<LinkEvent> {
        if self.pending_dns.is_some() {
            return self.poll_dns(budget_ms).await;
        }

        let mut buf = [0u8; DATAGRAM_CAPACITY];
        let received = select(self.socket.recv_from(&mut buf), Timer::after_millis(budget_ms)).await;

        match received {
            Either::First(Ok((len, meta))) => {
                let from = SocketAddr::new(to_ip(meta.endpoint.addr), meta.endpoint.port);
                Some(LinkEvent::Datagram(Datagram::new(from, &buf[..len])))
            }
            Either::First(Err(e)) => {
                // Truncated datagrams land here
                debug!("UDP receive failed: {:?}", e);
                None
            }
            Either::Second(()) => None,
        }
    }
}
