//! Frame-buffer to RTP streaming over a small ARP/IPv4/ICMP/UDP stack
//!
//! This library provides:
//! - Ethernet framing and a TAP link device running in its own threads
//! - ARP resolution, IPv4 validation, ICMP echo replies
//! - UDP with a per-port crossbar feeding bounded consumer queues
//! - Frame sources (frame buffer reader, synthetic generator) and an RTP
//!   packetizer
//! - Host-side frame buffer transfer helpers

pub mod config;
pub mod error;
pub mod framebuf;
pub mod iface;
pub mod link;
pub mod network;
pub mod pipeline;
pub mod stream;
pub mod transport;

// Re-export commonly used types
pub use config::Config;
pub use error::{Error, Result};
pub use iface::interface::{InterfaceStats, NetworkInterface};
pub use link::{LinkDevice, MacAddress};
pub use network::ipv4::Ipv4Header;
pub use network::icmp::{IcmpHeader, ICMP_TYPE_ECHO_REPLY, ICMP_TYPE_ECHO_REQUEST};
pub use pipeline::Pipeline;
pub use stream::{DmaReader, FrameGenerator, RtpPacketizer, StreamBeat};
pub use transport::{PortCrossbar, RtpHeader, UdpPort};
