//! IPv4 protocol implementation
//!
//! This module provides IPv4 header parsing, validation, and packet
//! construction. Fragmentation is not supported: fragments are rejected on
//! input and the stack never emits them.

use crate::network::{checksum, Ipv4Address};
use byteorder::{BigEndian, ByteOrder};

pub const IPV4_HEADER_LEN: usize = 20;
const IPV4_VERSION: u8 = 4;
const DEFAULT_IHL: u8 = 5; // 5 * 4 = 20 bytes (standard header length)
pub const DEFAULT_TTL: u8 = 64;

/// IPv4 packet header structure
///
/// Represents the standard 20-byte IPv4 header as defined in RFC 791
#[derive(Debug, Clone)]
pub struct Ipv4Header {
    pub version: u8,
    pub ihl: u8, // Internet Header Length
    pub tos: u8, // Type of Service
    pub total_len: u16,
    pub id: u16,
    pub flags_frag_offset: u16,
    pub ttl: u8,
    pub protocol: u8,
    pub checksum: u16,
    pub src_addr: Ipv4Address,
    pub dst_addr: Ipv4Address,
}

/// Reason an inbound header was refused
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaderError {
    HeaderLength,
    TotalLength,
    Ttl,
    Checksum,
    Fragmented,
}

impl Ipv4Header {
    /// Create a header for an outbound packet
    ///
    /// Sets Don't Fragment and the default TTL. The checksum is filled in by
    /// `Ipv4Utils::create_packet_with_payload`.
    pub fn new_simple(
        protocol: u8,
        id: u16,
        src_addr: Ipv4Address,
        dst_addr: Ipv4Address,
        payload_len: u16,
    ) -> Self {
        Ipv4Header {
            version: IPV4_VERSION,
            ihl: DEFAULT_IHL,
            tos: 0,
            total_len: IPV4_HEADER_LEN as u16 + payload_len,
            id,
            flags_frag_offset: flags::DONT_FRAGMENT,
            ttl: DEFAULT_TTL,
            protocol,
            checksum: 0,
            src_addr,
            dst_addr,
        }
    }

    /// Parse IPv4 header from byte slice
    ///
    /// Returns None if the data is too short or if the version field is not 4
    pub fn from_bytes(data: &[u8]) -> Option<Self> {
        if data.len() < IPV4_HEADER_LEN {
            return None;
        }

        let version = (data[0] & 0xF0) >> 4;
        if version != IPV4_VERSION {
            return None;
        }

        Some(Ipv4Header {
            version,
            ihl: data[0] & 0x0F,
            tos: data[1],
            total_len: BigEndian::read_u16(&data[2..4]),
            id: BigEndian::read_u16(&data[4..6]),
            flags_frag_offset: BigEndian::read_u16(&data[6..8]),
            ttl: data[8],
            protocol: data[9],
            checksum: BigEndian::read_u16(&data[10..12]),
            src_addr: data[12..16].try_into().ok()?,
            dst_addr: data[16..20].try_into().ok()?,
        })
    }

    /// Convert IPv4 header to bytes
    pub fn to_bytes(&self) -> [u8; IPV4_HEADER_LEN] {
        let mut bytes = [0u8; IPV4_HEADER_LEN];
        bytes[0] = (self.version << 4) | self.ihl;
        bytes[1] = self.tos;
        BigEndian::write_u16(&mut bytes[2..4], self.total_len);
        BigEndian::write_u16(&mut bytes[4..6], self.id);
        BigEndian::write_u16(&mut bytes[6..8], self.flags_frag_offset);
        bytes[8] = self.ttl;
        bytes[9] = self.protocol;
        BigEndian::write_u16(&mut bytes[10..12], self.checksum);
        bytes[12..16].copy_from_slice(&self.src_addr);
        bytes[16..20].copy_from_slice(&self.dst_addr);

        bytes
    }

    /// Get the header length in bytes
    pub fn header_len(&self) -> usize {
        (self.ihl as usize) * 4
    }

    /// Get payload length
    pub fn payload_len(&self) -> usize {
        (self.total_len as usize).saturating_sub(self.header_len())
    }

    pub fn is_fragment(&self) -> bool {
        self.flags_frag_offset & (flags::MORE_FRAGMENTS | flags::FRAGMENT_OFFSET_MASK) != 0
    }

    /// Validate a received header against the raw packet it came from
    ///
    /// The checksum is verified over the raw header bytes, options included.
    pub fn validate(&self, packet: &[u8]) -> Result<(), HeaderError> {
        let header_len = self.header_len();
        if self.ihl < DEFAULT_IHL || header_len > packet.len() {
            return Err(HeaderError::HeaderLength);
        }
        if (self.total_len as usize) < header_len || self.total_len as usize > packet.len() {
            return Err(HeaderError::TotalLength);
        }
        if self.ttl == 0 {
            return Err(HeaderError::Ttl);
        }
        if checksum(&packet[..header_len]) != 0 {
            return Err(HeaderError::Checksum);
        }
        if self.is_fragment() {
            return Err(HeaderError::Fragmented);
        }
        Ok(())
    }
}

/// IPv4 protocol constants
pub mod protocol {
    pub const ICMP: u8 = 1;
    pub const UDP: u8 = 17;
}

/// IPv4 flags constants
pub mod flags {
    pub const DONT_FRAGMENT: u16 = 0x4000;
    pub const MORE_FRAGMENTS: u16 = 0x2000;
    pub const FRAGMENT_OFFSET_MASK: u16 = 0x1FFF;
}

pub struct Ipv4Utils {}

impl Ipv4Utils {
    /// Calculate IPv4 header checksum
    ///
    /// The checksum field is treated as zero during calculation.
    pub fn calculate_checksum(header: &Ipv4Header) -> u16 {
        let mut header_bytes = header.to_bytes();
        header_bytes[10] = 0;
        header_bytes[11] = 0;
        checksum(&header_bytes)
    }

    /// Create a complete IPv4 packet with payload
    ///
    /// The total length and checksum fields are recomputed for the payload.
    pub fn create_packet_with_payload(header: &Ipv4Header, payload: &[u8]) -> Vec<u8> {
        let mut header = header.clone();
        header.total_len = IPV4_HEADER_LEN as u16 + payload.len() as u16;
        header.checksum = Self::calculate_checksum(&header);
        let mut packet = Vec::with_capacity(header.total_len as usize);
        packet.extend_from_slice(&header.to_bytes());
        packet.extend_from_slice(payload);
        packet
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_packet() -> Vec<u8> {
        let header = Ipv4Header::new_simple(protocol::UDP, 7, [10, 0, 0, 1], [10, 0, 0, 2], 4);
        Ipv4Utils::create_packet_with_payload(&header, &[1, 2, 3, 4])
    }

    #[test]
    fn test_built_packet_validates() {
        let packet = sample_packet();
        let header = Ipv4Header::from_bytes(&packet).unwrap();
        assert_eq!(header.total_len, 24);
        assert_eq!(header.payload_len(), 4);
        assert_eq!(header.protocol, protocol::UDP);
        assert_eq!(header.ttl, DEFAULT_TTL);
        assert_eq!(header.validate(&packet), Ok(()));
        assert_eq!(Ipv4Utils::calculate_checksum(&header), header.checksum);
    }

    #[test]
    fn test_corrupted_checksum_rejected() {
        let mut packet = sample_packet();
        packet[11] ^= 0x01;
        let header = Ipv4Header::from_bytes(&packet).unwrap();
        assert_eq!(header.validate(&packet), Err(HeaderError::Checksum));
    }

    #[test]
    fn test_truncated_packet_rejected() {
        let packet = sample_packet();
        let header = Ipv4Header::from_bytes(&packet).unwrap();
        assert_eq!(header.validate(&packet[..22]), Err(HeaderError::TotalLength));
    }

    #[test]
    fn test_fragment_rejected() {
        let mut header = Ipv4Header::new_simple(protocol::UDP, 1, [10, 0, 0, 1], [10, 0, 0, 2], 0);
        header.flags_frag_offset = flags::MORE_FRAGMENTS;
        let packet = Ipv4Utils::create_packet_with_payload(&header, &[]);
        let parsed = Ipv4Header::from_bytes(&packet).unwrap();
        assert_eq!(parsed.validate(&packet), Err(HeaderError::Fragmented));
    }

    #[test]
    fn test_wrong_version_not_parsed() {
        let mut packet = sample_packet();
        packet[0] = 0x65;
        assert!(Ipv4Header::from_bytes(&packet).is_none());
    }
}
