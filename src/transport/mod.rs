//! Transport layer protocols implementation
//!
//! This module contains implementations for transport layer protocols:
//! - UDP: User Datagram Protocol
//! - Crossbar: per-port routing of UDP datagrams
//! - RTP: real-time transport header carried over UDP

pub mod crossbar;
pub mod rtp;
pub mod udp;

// Re-export commonly used items
pub use crossbar::{Delivery, PortCrossbar, UdpPort, UdpTransmitter};
pub use rtp::RtpHeader;
pub use udp::{InboundDatagram, OutboundDatagram, UdpHeader, UdpUtils};
