//! Network layer protocols implementation
//!
//! This module contains implementations for network layer protocols:
//! - ARP: address resolution and the resolver cache
//! - IPv4: Internet Protocol version 4
//! - ICMP: echo request/reply

pub mod arp;
pub mod icmp;
pub mod ipv4;

// Re-export commonly used items
pub use arp::{AddressResolver, ArpPacket, Resolution};
pub use icmp::{IcmpHeader, ICMP_TYPE_ECHO_REPLY, ICMP_TYPE_ECHO_REQUEST};
pub use ipv4::{protocol, Ipv4Header};

/// IPv4 address as carried on the wire
pub type Ipv4Address = [u8; 4];

/// Calculate Internet checksum
///
/// Algorithm: Sum data in 16-bit chunks, add carry bits to the sum,
/// and return the one's complement of the result.
/// This is used for IP, ICMP and UDP checksums. Running it over data that
/// already contains a correct checksum yields zero.
pub fn checksum(data: &[u8]) -> u16 {
    let mut sum = 0u32;

    for chunk in data.chunks_exact(2) {
        sum += u16::from_be_bytes([chunk[0], chunk[1]]) as u32;
    }

    // Odd trailing byte is padded with zero
    if data.len() % 2 != 0 {
        if let Some(&last_byte) = data.last() {
            sum += (last_byte as u32) << 8;
        }
    }

    while (sum >> 16) > 0 {
        sum = (sum & 0xFFFF) + (sum >> 16);
    }

    !sum as u16
}
