//! Pipeline configuration
//!
//! Loaded from a TOML file. Every field has a default, so an empty file (or
//! `Config::default()`) describes a working setup: the stack answers on
//! 192.168.100.60 and streams a synthetic 800x600 frame to
//! 192.168.100.100:9000.

use crate::error::{Error, Result};
use crate::link::device::MAX_FRAME_LEN;
use crate::link::ethernet::{MacAddress, ETH_HEADER_LEN};
use crate::network::ipv4::IPV4_HEADER_LEN;
use crate::transport::rtp::RTP_HEADER_LEN;
use crate::transport::udp::UDP_HEADER_LEN;
use serde::{Deserialize, Serialize};
use std::fs;
use std::net::Ipv4Addr;
use std::path::Path;

/// Smallest MTU every IPv4 host must accept
pub const MIN_MTU: usize = 68;
/// Largest MTU whose frames fit the link receive buffer
pub const MAX_MTU: usize = MAX_FRAME_LEN - ETH_HEADER_LEN - 4;

/// Top-level configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    pub interface: InterfaceConfig,
    pub stream: StreamConfig,
    pub source: SourceConfig,
    pub services: ServicesConfig,
    pub arp: ArpConfig,
}

/// Local link and IP identity
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct InterfaceConfig {
    /// TAP device name
    pub tap_name: String,
    /// Hardware address used as the Ethernet source
    pub mac_address: MacAddress,
    /// Local IPv4 address
    pub ip_address: Ipv4Addr,
    pub netmask: Ipv4Addr,
    /// Largest IPv4 packet (header included) the stack will emit
    pub mtu: usize,
    /// Depth of each queue crossing into the link domain
    pub link_queue_depth: usize,
}

impl Default for InterfaceConfig {
    fn default() -> Self {
        Self {
            tap_name: "tap0".to_string(),
            mac_address: MacAddress([0x10, 0xe2, 0xd5, 0x00, 0x00, 0x01]),
            ip_address: Ipv4Addr::new(192, 168, 100, 60),
            netmask: Ipv4Addr::new(255, 255, 255, 0),
            mtu: 1500,
            link_queue_depth: 64,
        }
    }
}

/// RTP transmit stream
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct StreamConfig {
    pub target_ip: Ipv4Addr,
    pub target_port: u16,
    /// Local UDP port the stream is sent from
    pub source_port: u16,
    /// RTP payload bytes per packet
    pub chunk_size: usize,
    /// RTP synchronization source identifier
    pub ssrc: u32,
    /// Depth of the source → packetizer queue, in beats
    pub queue_depth: usize,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            target_ip: Ipv4Addr::new(192, 168, 100, 100),
            target_port: 9000,
            source_port: 9000,
            chunk_size: 1024,
            ssrc: 0x4652_4d43,
            queue_depth: 256,
        }
    }
}

/// Which stage feeds the packetizer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    /// Synthetic frame generator
    Generator,
    /// Frame-buffer reader over a device file
    Dma,
}

/// Byte order of 32-bit words in frame memory
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum WordOrder {
    /// Words are stored byte-reversed; the reader swaps them back
    Swapped,
    /// Words are already in stream byte order
    Native,
}

/// Frame source
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SourceConfig {
    pub kind: SourceKind,
    pub width: u32,
    pub height: u32,
    pub bytes_per_pixel: u32,
    /// Device file holding the frame buffers (DMA source only)
    pub device: String,
    /// Frame buffer window index within the device
    pub buffer_index: u32,
    pub word_order: WordOrder,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            kind: SourceKind::Generator,
            width: 800,
            height: 600,
            bytes_per_pixel: 2,
            device: "/dev/netv20".to_string(),
            buffer_index: 0,
            word_order: WordOrder::Swapped,
        }
    }
}

impl SourceConfig {
    /// Bytes in one frame
    pub fn frame_bytes(&self) -> usize {
        self.width as usize * self.height as usize * self.bytes_per_pixel as usize
    }
}

/// Fixed UDP services
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServicesConfig {
    /// UDP echo service port
    pub loopback_port: u16,
    /// Datagrams buffered for the loopback consumer
    pub loopback_depth: usize,
    /// Depth of the shared outbound datagram queue into the stack
    pub outbound_depth: usize,
}

impl Default for ServicesConfig {
    fn default() -> Self {
        Self {
            loopback_port: 9001,
            loopback_depth: 2048,
            outbound_depth: 64,
        }
    }
}

/// Address resolution timers and limits
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ArpConfig {
    /// Interval between repeated requests for a peer that has not answered
    pub retry_interval_ms: u64,
    /// Requests sent before pending packets for a peer are dropped
    pub max_retries: u32,
    /// Packets held per unresolved peer
    pub pending_depth: usize,
}

impl Default for ArpConfig {
    fn default() -> Self {
        Self {
            retry_interval_ms: 100,
            max_retries: 8,
            pending_depth: 64,
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Parse and validate configuration from a TOML string
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Check cross-field constraints
    pub fn validate(&self) -> Result<()> {
        if !(MIN_MTU..=MAX_MTU).contains(&self.interface.mtu) {
            return Err(Error::InvalidParameter(format!(
                "mtu {} outside {}..={}",
                self.interface.mtu, MIN_MTU, MAX_MTU
            )));
        }
        let max_chunk = self
            .interface
            .mtu
            .saturating_sub(IPV4_HEADER_LEN + UDP_HEADER_LEN + RTP_HEADER_LEN);
        if self.stream.chunk_size == 0 || self.stream.chunk_size > max_chunk {
            return Err(Error::InvalidParameter(format!(
                "chunk_size must be in 1..={} for MTU {}",
                max_chunk, self.interface.mtu
            )));
        }
        if self.source.frame_bytes() == 0 {
            return Err(Error::InvalidParameter(
                "frame dimensions must be non-zero".to_string(),
            ));
        }
        if self.source.kind == SourceKind::Dma && self.source.frame_bytes() % 4 != 0 {
            return Err(Error::Unaligned(self.source.frame_bytes()));
        }
        if self.services.loopback_port == self.stream.source_port {
            return Err(Error::InvalidParameter(format!(
                "loopback and stream both use UDP port {}",
                self.stream.source_port
            )));
        }
        if self.stream.queue_depth == 0
            || self.services.loopback_depth == 0
            || self.services.outbound_depth == 0
            || self.interface.link_queue_depth == 0
            || self.arp.pending_depth == 0
        {
            return Err(Error::InvalidParameter(
                "queue depths must be non-zero".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.services.loopback_port, 9001);
        assert_eq!(config.stream.target_port, 9000);
        assert_eq!(config.source.frame_bytes(), 800 * 600 * 2);
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = Config::from_toml(
            r#"
            [interface]
            ip_address = "10.0.0.2"
            mac_address = "02:00:00:aa:bb:cc"

            [source]
            kind = "dma"
            width = 4
            height = 4
            "#,
        )
        .unwrap();

        assert_eq!(config.interface.ip_address, Ipv4Addr::new(10, 0, 0, 2));
        assert_eq!(
            config.interface.mac_address,
            MacAddress([0x02, 0x00, 0x00, 0xaa, 0xbb, 0xcc])
        );
        assert_eq!(config.source.kind, SourceKind::Dma);
        assert_eq!(config.source.frame_bytes(), 32);
        assert_eq!(config.stream.chunk_size, 1024);
    }

    #[test]
    fn test_rejects_oversized_chunk() {
        let result = Config::from_toml("[stream]\nchunk_size = 1480\n");
        assert!(matches!(result, Err(Error::InvalidParameter(_))));
    }

    #[test]
    fn test_rejects_oversized_mtu() {
        let result = Config::from_toml("[interface]\nmtu = 70000\n[stream]\nchunk_size = 66000\n");
        assert!(matches!(result, Err(Error::InvalidParameter(_))));
        let result = Config::from_toml("[interface]\nmtu = 1501\n");
        assert!(matches!(result, Err(Error::InvalidParameter(_))));
        let result = Config::from_toml("[interface]\nmtu = 67\n[stream]\nchunk_size = 8\n");
        assert!(matches!(result, Err(Error::InvalidParameter(_))));

        let config = Config::from_toml("[interface]\nmtu = 576\n[stream]\nchunk_size = 536\n").unwrap();
        assert_eq!(config.interface.mtu, 576);
        assert_eq!(MAX_MTU, 1500);
    }

    #[test]
    fn test_rejects_port_collision() {
        let result = Config::from_toml("[stream]\nsource_port = 9001\n");
        assert!(matches!(result, Err(Error::InvalidParameter(_))));
    }

    #[test]
    fn test_rejects_unaligned_dma_frame() {
        let result = Config::from_toml("[source]\nkind = \"dma\"\nwidth = 3\nheight = 1\n");
        assert!(matches!(result, Err(Error::Unaligned(6))));
    }

    #[test]
    fn test_shipped_config_matches_defaults() {
        let config = Config::load(concat!(env!("CARGO_MANIFEST_DIR"), "/framecast.toml")).unwrap();
        let defaults = Config::default();
        assert_eq!(config.interface.mac_address, defaults.interface.mac_address);
        assert_eq!(config.stream.ssrc, defaults.stream.ssrc);
        assert_eq!(config.source.word_order, WordOrder::Swapped);
        assert_eq!(config.services.loopback_depth, 2048);
    }

    #[test]
    fn test_rejects_bad_mac() {
        let result = Config::from_toml("[interface]\nmac_address = \"10:e2:d5\"\n");
        assert!(matches!(result, Err(Error::Config(_))));
    }
}
