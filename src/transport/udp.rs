//! UDP (User Datagram Protocol) implementation
//!
//! This module provides UDP header parsing, checksum handling and the
//! datagram types exchanged between the stack and its consumers.

use crate::network::ipv4::protocol;
use crate::network::{checksum, Ipv4Address};
use byteorder::{BigEndian, ByteOrder};

/// UDP header length in bytes
pub const UDP_HEADER_LEN: usize = 8;

/// UDP packet header structure
///
/// Represents the standard 8-byte UDP header as defined in RFC 768
#[derive(Debug, Clone, Copy)]
pub struct UdpHeader {
    pub src_port: u16,
    pub dst_port: u16,
    pub length: u16, // Length of UDP header and data
    pub checksum: u16,
}

impl UdpHeader {
    /// Parse UDP header from byte slice
    ///
    /// Returns None if the data is too short to contain a valid UDP header
    pub fn from_bytes(data: &[u8]) -> Option<Self> {
        if data.len() < UDP_HEADER_LEN {
            return None;
        }

        Some(UdpHeader {
            src_port: BigEndian::read_u16(&data[0..2]),
            dst_port: BigEndian::read_u16(&data[2..4]),
            length: BigEndian::read_u16(&data[4..6]),
            checksum: BigEndian::read_u16(&data[6..8]),
        })
    }

    /// Convert UDP header to bytes
    pub fn to_bytes(&self) -> [u8; UDP_HEADER_LEN] {
        let mut bytes = [0u8; UDP_HEADER_LEN];
        BigEndian::write_u16(&mut bytes[0..2], self.src_port);
        BigEndian::write_u16(&mut bytes[2..4], self.dst_port);
        BigEndian::write_u16(&mut bytes[4..6], self.length);
        BigEndian::write_u16(&mut bytes[6..8], self.checksum);
        bytes
    }
}

/// A datagram delivered to a bound consumer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundDatagram {
    pub src_addr: Ipv4Address,
    pub src_port: u16,
    pub dst_port: u16,
    pub payload: Vec<u8>,
}

/// A datagram handed to the stack for transmission
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundDatagram {
    pub src_port: u16,
    pub dst_addr: Ipv4Address,
    pub dst_port: u16,
    pub payload: Vec<u8>,
}

pub struct UdpUtils {}

impl UdpUtils {
    /// Calculate UDP checksum with pseudo header
    pub fn calculate_udp_checksum(
        src_ip: &Ipv4Address,
        dst_ip: &Ipv4Address,
        udp_packet: &[u8],
    ) -> u16 {
        let udp_len = udp_packet.len() as u16;

        // src_ip(4) + dst_ip(4) + zero(1) + protocol(1) + udp_len(2)
        let mut pseudo_header = Vec::with_capacity(12 + udp_packet.len());
        pseudo_header.extend_from_slice(src_ip);
        pseudo_header.extend_from_slice(dst_ip);
        pseudo_header.push(0);
        pseudo_header.push(protocol::UDP);
        pseudo_header.extend_from_slice(&udp_len.to_be_bytes());
        pseudo_header.extend_from_slice(udp_packet);

        checksum(&pseudo_header)
    }

    /// Validate a received UDP packet
    ///
    /// Checks the length field against the IP payload and, when the sender
    /// computed one, the checksum. Returns the header of a valid packet.
    pub fn validate_udp_packet(
        src_ip: &Ipv4Address,
        dst_ip: &Ipv4Address,
        packet: &[u8],
    ) -> Option<UdpHeader> {
        let header = UdpHeader::from_bytes(packet)?;

        if (header.length as usize) < UDP_HEADER_LEN || header.length as usize > packet.len() {
            return None;
        }
        let packet = &packet[..header.length as usize];

        if header.checksum != 0 && Self::calculate_udp_checksum(src_ip, dst_ip, packet) != 0 {
            return None;
        }

        Some(header)
    }

    /// Creates a new UDP packet with the specified ports and payload.
    pub fn create_raw_udp_packet(src_port: u16, dst_port: u16, payload: &[u8]) -> Vec<u8> {
        let total_udp_len = UDP_HEADER_LEN + payload.len();

        let udp_header = UdpHeader {
            src_port,
            dst_port,
            length: total_udp_len as u16,
            checksum: 0,
        };

        let mut udp_packet = Vec::with_capacity(total_udp_len);
        udp_packet.extend_from_slice(&udp_header.to_bytes());
        udp_packet.extend_from_slice(payload);

        udp_packet
    }

    /// Creates a complete UDP packet with proper checksum
    pub fn create_udp_packet_with_checksum(
        src_ip: &Ipv4Address,
        dst_ip: &Ipv4Address,
        src_port: u16,
        dst_port: u16,
        payload: &[u8],
    ) -> Vec<u8> {
        let mut packet = Self::create_raw_udp_packet(src_port, dst_port, payload);

        // A computed zero goes out as all ones; zero means "no checksum"
        let checksum = match Self::calculate_udp_checksum(src_ip, dst_ip, &packet) {
            0 => 0xFFFF,
            sum => sum,
        };
        BigEndian::write_u16(&mut packet[6..8], checksum);

        packet
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SRC: Ipv4Address = [192, 168, 1, 1];
    const DST: Ipv4Address = [192, 168, 1, 2];

    #[test]
    fn test_packet_with_checksum_validates() {
        let packet = UdpUtils::create_udp_packet_with_checksum(&SRC, &DST, 8080, 9090, b"Hello, UDP!");
        assert_eq!(packet.len(), UDP_HEADER_LEN + 11);

        let header = UdpUtils::validate_udp_packet(&SRC, &DST, &packet).unwrap();
        assert_eq!(header.src_port, 8080);
        assert_eq!(header.dst_port, 9090);
        assert_eq!(header.length as usize, packet.len());
        assert_ne!(header.checksum, 0);
    }

    #[test]
    fn test_wrong_pseudo_header_rejected() {
        let packet = UdpUtils::create_udp_packet_with_checksum(&SRC, &DST, 1, 2, b"data");
        assert!(UdpUtils::validate_udp_packet(&SRC, &[192, 168, 1, 3], &packet).is_none());
    }

    #[test]
    fn test_zero_checksum_accepted() {
        let packet = UdpUtils::create_raw_udp_packet(1, 2, b"no checksum");
        assert!(UdpUtils::validate_udp_packet(&SRC, &DST, &packet).is_some());
    }

    #[test]
    fn test_length_field_checked() {
        let mut packet = UdpUtils::create_raw_udp_packet(1, 2, b"abc");
        BigEndian::write_u16(&mut packet[4..6], 64);
        assert!(UdpUtils::validate_udp_packet(&SRC, &DST, &packet).is_none());
        BigEndian::write_u16(&mut packet[4..6], 4);
        assert!(UdpUtils::validate_udp_packet(&SRC, &DST, &packet).is_none());
    }
}
