//! ICMP (Internet Control Message Protocol) implementation
//!
//! Only echo request/reply is handled. The responder is stateless: each
//! valid echo request produces exactly one reply message, which the caller
//! encapsulates back towards the requester.

use crate::network::checksum;
use byteorder::{BigEndian, ByteOrder};

/// Minimum ICMP header length in bytes
pub const ICMP_HEADER_LEN: usize = 8;

/// ICMP message types
pub const ICMP_TYPE_ECHO_REPLY: u8 = 0;
pub const ICMP_TYPE_ECHO_REQUEST: u8 = 8;

/// ICMP packet header structure
///
/// Represents the standard 8-byte ICMP header as defined in RFC 792
#[derive(Debug, Clone, Copy)]
pub struct IcmpHeader {
    pub msg_type: u8,
    pub msg_code: u8,
    pub checksum: u16,
    pub rest: [u8; 4], // Type-specific data (identifier and sequence for echo)
}

impl IcmpHeader {
    /// Parse ICMP header from byte slice
    ///
    /// Returns None if the data is too short to contain a valid ICMP header
    pub fn from_bytes(data: &[u8]) -> Option<Self> {
        if data.len() < ICMP_HEADER_LEN {
            return None;
        }

        Some(IcmpHeader {
            msg_type: data[0],
            msg_code: data[1],
            checksum: BigEndian::read_u16(&data[2..4]),
            rest: data[4..8].try_into().ok()?,
        })
    }

    /// Convert ICMP header to bytes
    pub fn to_bytes(&self) -> [u8; ICMP_HEADER_LEN] {
        let mut bytes = [0u8; ICMP_HEADER_LEN];
        bytes[0] = self.msg_type;
        bytes[1] = self.msg_code;
        BigEndian::write_u16(&mut bytes[2..4], self.checksum);
        bytes[4..8].copy_from_slice(&self.rest);
        bytes
    }

    /// Check if this is an Echo Request message
    pub fn is_echo_request(&self) -> bool {
        self.msg_type == ICMP_TYPE_ECHO_REQUEST
    }

    /// Get the identifier field for Echo Request/Reply messages
    pub fn identifier(&self) -> u16 {
        BigEndian::read_u16(&self.rest[0..2])
    }

    /// Get the sequence number field for Echo Request/Reply messages
    pub fn sequence(&self) -> u16 {
        BigEndian::read_u16(&self.rest[2..4])
    }
}

pub struct IcmpUtils {}

impl IcmpUtils {
    /// Build a complete ICMP message (header + data) with its checksum
    pub fn create_message(msg_type: u8, msg_code: u8, rest: [u8; 4], data: &[u8]) -> Vec<u8> {
        let header = IcmpHeader {
            msg_type,
            msg_code,
            checksum: 0,
            rest,
        };
        let mut message = Vec::with_capacity(ICMP_HEADER_LEN + data.len());
        message.extend_from_slice(&header.to_bytes());
        message.extend_from_slice(data);

        let sum = checksum(&message);
        BigEndian::write_u16(&mut message[2..4], sum);
        message
    }

    /// Answer an ICMP message
    ///
    /// Returns the echo reply for a well-formed echo request, keeping the
    /// identifier, sequence and data. Anything else (bad checksum, other
    /// message types) yields None.
    pub fn create_echo_reply(message: &[u8]) -> Option<Vec<u8>> {
        let header = IcmpHeader::from_bytes(message)?;
        if checksum(message) != 0 {
            log::debug!("ICMP checksum mismatch, dropping");
            return None;
        }
        if !header.is_echo_request() {
            log::debug!("Unsupported ICMP type: {}", header.msg_type);
            return None;
        }

        log::debug!(
            "ICMP echo request id={} seq={}",
            header.identifier(),
            header.sequence()
        );
        Some(Self::create_message(
            ICMP_TYPE_ECHO_REPLY,
            0,
            header.rest,
            &message[ICMP_HEADER_LEN..],
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn echo_request(id: u16, seq: u16, data: &[u8]) -> Vec<u8> {
        let mut rest = [0u8; 4];
        BigEndian::write_u16(&mut rest[0..2], id);
        BigEndian::write_u16(&mut rest[2..4], seq);
        IcmpUtils::create_message(ICMP_TYPE_ECHO_REQUEST, 0, rest, data)
    }

    #[test]
    fn test_echo_reply_mirrors_request() {
        let request = echo_request(0x1234, 7, b"abcdefgh");
        let reply = IcmpUtils::create_echo_reply(&request).unwrap();

        let header = IcmpHeader::from_bytes(&reply).unwrap();
        assert_eq!(header.msg_type, ICMP_TYPE_ECHO_REPLY);
        assert_eq!(header.identifier(), 0x1234);
        assert_eq!(header.sequence(), 7);
        assert_eq!(&reply[ICMP_HEADER_LEN..], b"abcdefgh");
        assert_eq!(checksum(&reply), 0);
    }

    #[test]
    fn test_corrupted_request_ignored() {
        let mut request = echo_request(1, 1, b"ping");
        request[9] ^= 0xff;
        assert!(IcmpUtils::create_echo_reply(&request).is_none());
    }

    #[test]
    fn test_reply_is_not_answered() {
        let reply = IcmpUtils::create_message(ICMP_TYPE_ECHO_REPLY, 0, [0; 4], b"pong");
        assert!(IcmpUtils::create_echo_reply(&reply).is_none());
    }
}
