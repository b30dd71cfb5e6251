#![deny(unsafe_code)]
#![deny(warnings)]
//! Network configuration structures

/// Network stack configuration
#[derive(Debug, Clone)]
pub struct NetworkConfig {
    /// MAC address for Ethernet
    pub mac_addr: [u8; 6],
    /// Random seed for network stack
    pub seed: u64,
    /// SPI clock for the W5500 in Hz
    pub spi_frequency_hz: u32,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            mac_addr: [0x02, 0x00, 0x00, 0x52, 0x54, 0x43],
            seed: 0x5254_4345_4d55_4c00_u64,
            spi_frequency_hz: 10_000_000,
        }
    }
}

/// UDP socket settings for the NTP link
#[derive(Debug, Clone, Copy)]
pub struct UdpConfig {
    /// Local port, 0 for ephemeral
    pub local_port: u16,
}

impl Default for UdpConfig {
    fn default() -> Self {
        Self { local_port: 0 }
    }
}
