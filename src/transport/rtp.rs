//! RTP fixed header (RFC 3550)
//!
//! Only the 12-byte fixed header is used: no CSRC list, no extension, no
//! padding.

use byteorder::{BigEndian, ByteOrder};

pub const RTP_HEADER_LEN: usize = 12;
pub const RTP_VERSION: u8 = 2;
/// First dynamic payload type
pub const RTP_PAYLOAD_TYPE: u8 = 96;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RtpHeader {
    /// Set on the packet that ends a frame
    pub marker: bool,
    pub payload_type: u8,
    pub sequence: u16,
    pub timestamp: u32,
    pub ssrc: u32,
}

impl RtpHeader {
    pub fn from_bytes(data: &[u8]) -> Option<Self> {
        if data.len() < RTP_HEADER_LEN || data[0] >> 6 != RTP_VERSION {
            return None;
        }
        Some(RtpHeader {
            marker: data[1] & 0x80 != 0,
            payload_type: data[1] & 0x7F,
            sequence: BigEndian::read_u16(&data[2..4]),
            timestamp: BigEndian::read_u32(&data[4..8]),
            ssrc: BigEndian::read_u32(&data[8..12]),
        })
    }

    pub fn to_bytes(&self) -> [u8; RTP_HEADER_LEN] {
        let mut bytes = [0u8; RTP_HEADER_LEN];
        bytes[0] = RTP_VERSION << 6;
        bytes[1] = ((self.marker as u8) << 7) | (self.payload_type & 0x7F);
        BigEndian::write_u16(&mut bytes[2..4], self.sequence);
        BigEndian::write_u32(&mut bytes[4..8], self.timestamp);
        BigEndian::write_u32(&mut bytes[8..12], self.ssrc);
        bytes
    }
}
