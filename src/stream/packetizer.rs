//! RTP packetizer
//!
//! Cuts a frame stream into fixed-size chunks and wraps each chunk in an
//! RTP header. A chunk closes when it reaches the configured size or when
//! the frame ends, so a frame of N bytes always yields ceil(N / size)
//! packets and only the last of them carries the marker bit.

use crate::config::StreamConfig;
use crate::error::{Error, Result};
use crate::network::Ipv4Address;
use crate::stream::StreamBeat;
use crate::transport::crossbar::UdpTransmitter;
use crate::transport::rtp::{RtpHeader, RTP_HEADER_LEN, RTP_PAYLOAD_TYPE};
use crossbeam_channel::Receiver;
use std::mem;

/// Session parameters and running counters
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RtpSession {
    pub destination_ip: Ipv4Address,
    pub destination_port: u16,
    /// Payload bytes per packet
    pub packet_size: usize,
    pub sequence: u16,
    /// Frame counter
    pub timestamp: u32,
    pub ssrc: u32,
}

impl RtpSession {
    pub fn from_config(config: &StreamConfig) -> Self {
        RtpSession {
            destination_ip: config.target_ip.octets(),
            destination_port: config.target_port,
            packet_size: config.chunk_size,
            sequence: 0,
            timestamp: 0,
            ssrc: config.ssrc,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RtpPacket {
    pub header: RtpHeader,
    pub payload: Vec<u8>,
}

impl RtpPacket {
    /// Whether this packet ends a frame
    pub fn is_last(&self) -> bool {
        self.header.marker
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(RTP_HEADER_LEN + self.payload.len());
        bytes.extend_from_slice(&self.header.to_bytes());
        bytes.extend_from_slice(&self.payload);
        bytes
    }
}

pub struct RtpPacketizer {
    session: RtpSession,
    chunk: Vec<u8>,
}

impl RtpPacketizer {
    pub fn new(session: RtpSession) -> Result<Self> {
        if session.packet_size == 0 {
            return Err(Error::InvalidParameter("packet size must be non-zero".to_string()));
        }
        let chunk = Vec::with_capacity(session.packet_size);
        Ok(RtpPacketizer { session, chunk })
    }

    pub fn session(&self) -> &RtpSession {
        &self.session
    }

    /// Bytes collected towards the next packet
    pub fn buffered(&self) -> usize {
        self.chunk.len()
    }

    /// Feed one beat, handing every completed packet to `emit`
    pub fn push<F>(&mut self, beat: &StreamBeat, mut emit: F) -> Result<()>
    where
        F: FnMut(RtpPacket) -> Result<()>,
    {
        let bytes = beat.bytes();
        for (i, &byte) in bytes.iter().enumerate() {
            self.chunk.push(byte);
            let end_of_frame = beat.last && i + 1 == bytes.len();
            if end_of_frame || self.chunk.len() == self.session.packet_size {
                emit(self.close_chunk(end_of_frame))?;
            }
        }
        Ok(())
    }

    /// Emit a partially filled chunk
    ///
    /// The frame it belongs to never ended, so the packet carries no marker
    /// and the timestamp stays on that frame.
    pub fn flush<F>(&mut self, mut emit: F) -> Result<()>
    where
        F: FnMut(RtpPacket) -> Result<()>,
    {
        if !self.chunk.is_empty() {
            emit(self.close_chunk(false))?;
        }
        Ok(())
    }

    fn close_chunk(&mut self, end_of_frame: bool) -> RtpPacket {
        let header = RtpHeader {
            marker: end_of_frame,
            payload_type: RTP_PAYLOAD_TYPE,
            sequence: self.session.sequence,
            timestamp: self.session.timestamp,
            ssrc: self.session.ssrc,
        };
        self.session.sequence = self.session.sequence.wrapping_add(1);
        if end_of_frame {
            self.session.timestamp = self.session.timestamp.wrapping_add(1);
        }
        let payload = mem::replace(
            &mut self.chunk,
            Vec::with_capacity(self.session.packet_size),
        );
        RtpPacket { header, payload }
    }

    /// Packetize beats from `beats` onto `transmitter` until either side
    /// closes
    pub fn run(mut self, beats: Receiver<StreamBeat>, transmitter: UdpTransmitter) -> Result<()> {
        let destination = self.session.destination_ip;
        let port = self.session.destination_port;
        log::info!(
            "RTP stream {:#010x} from port {} -> {:?}:{}, {} bytes per packet",
            self.session.ssrc,
            transmitter.src_port(),
            destination,
            port,
            self.session.packet_size
        );

        let mut send = |packet: RtpPacket| transmitter.send(destination, port, packet.to_bytes());
        for beat in beats.iter() {
            if let Err(e) = self.push(&beat, &mut send) {
                log::debug!("RTP packetizer stopping: {}", e);
                return Ok(());
            }
        }
        if let Err(e) = self.flush(&mut send) {
            log::debug!("Final RTP packet not sent: {}", e);
        }
        log::info!(
            "RTP stream stopped at frame {}, sequence {}",
            self.session.timestamp,
            self.session.sequence
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::FrameGenerator;
    use crossbeam_channel::bounded;

    fn session(packet_size: usize) -> RtpSession {
        RtpSession {
            destination_ip: [192, 168, 100, 100],
            destination_port: 9000,
            packet_size,
            sequence: 0,
            timestamp: 0,
            ssrc: 0x1234,
        }
    }

    fn packetize(packet_size: usize, beats: &[StreamBeat]) -> Vec<RtpPacket> {
        let mut packetizer = RtpPacketizer::new(session(packet_size)).unwrap();
        let mut packets = Vec::new();
        for beat in beats {
            packetizer
                .push(beat, |p| {
                    packets.push(p);
                    Ok(())
                })
                .unwrap();
        }
        packets
    }

    fn frame_of_bytes(len: usize) -> Vec<StreamBeat> {
        (0..len)
            .map(|i| StreamBeat::byte(i as u8, i + 1 == len))
            .collect()
    }

    #[test]
    fn test_generated_frame_split_in_two() {
        let mut generator = FrameGenerator::new();
        generator.start(4, 4, 2).unwrap();
        let beats: Vec<_> = (0..32).map(|_| generator.step().unwrap()).collect();

        let packets = packetize(16, &beats);
        assert_eq!(packets.len(), 2);
        assert!(!packets[0].is_last());
        assert!(packets[1].is_last());
        assert!(packets.iter().all(|p| p.payload.len() == 16));
    }

    #[test]
    fn test_packet_count_and_reassembly() {
        for (len, size) in [(100, 16), (64, 16), (1, 8), (7, 1)] {
            let packets = packetize(size, &frame_of_bytes(len));
            assert_eq!(packets.len(), (len + size - 1) / size, "len {} size {}", len, size);
            assert!(packets.last().unwrap().is_last());
            assert_eq!(packets.iter().filter(|p| p.is_last()).count(), 1);

            let joined: Vec<u8> = packets.iter().flat_map(|p| p.payload.clone()).collect();
            let expected: Vec<u8> = (0..len).map(|i| i as u8).collect();
            assert_eq!(joined, expected);
        }
    }

    #[test]
    fn test_word_beats_split_across_packets() {
        let beats = vec![
            StreamBeat::word([1, 2, 3, 4], false),
            StreamBeat::word([5, 6, 7, 8], false),
            StreamBeat::word([9, 10, 11, 12], true),
        ];
        let packets = packetize(5, &beats);
        assert_eq!(packets.len(), 3);
        assert_eq!(packets[0].payload, vec![1, 2, 3, 4, 5]);
        assert_eq!(packets[1].payload, vec![6, 7, 8, 9, 10]);
        assert_eq!(packets[2].payload, vec![11, 12]);
        assert!(packets[2].is_last());
    }

    #[test]
    fn test_sequence_and_timestamp() {
        let mut beats = frame_of_bytes(20);
        beats.extend(frame_of_bytes(20));
        let packets = packetize(16, &beats);

        let sequences: Vec<u16> = packets.iter().map(|p| p.header.sequence).collect();
        assert_eq!(sequences, vec![0, 1, 2, 3]);
        let timestamps: Vec<u32> = packets.iter().map(|p| p.header.timestamp).collect();
        assert_eq!(timestamps, vec![0, 0, 1, 1]);
        assert!(packets.iter().all(|p| p.header.ssrc == 0x1234));
    }

    #[test]
    fn test_sequence_wraps() {
        let mut session = session(1);
        session.sequence = u16::MAX;
        let mut packetizer = RtpPacketizer::new(session).unwrap();
        let mut sequences = Vec::new();
        for beat in frame_of_bytes(2) {
            packetizer
                .push(&beat, |p| {
                    sequences.push(p.header.sequence);
                    Ok(())
                })
                .unwrap();
        }
        assert_eq!(sequences, vec![u16::MAX, 0]);
    }

    #[test]
    fn test_flush_leaves_partial_frame_unmarked() {
        let mut packetizer = RtpPacketizer::new(session(16)).unwrap();
        packetizer
            .push(&StreamBeat::word([1, 2, 3, 4], false), |_| Ok(()))
            .unwrap();
        assert_eq!(packetizer.buffered(), 4);

        let mut packets = Vec::new();
        packetizer
            .flush(|p| {
                packets.push(p);
                Ok(())
            })
            .unwrap();
        assert_eq!(packets.len(), 1);
        assert!(!packets[0].is_last());
        assert_eq!(packets[0].payload, vec![1, 2, 3, 4]);
        assert_eq!(packets[0].header.timestamp, 0);
        assert_eq!(packetizer.session().timestamp, 0);
        assert_eq!(packetizer.session().sequence, 1);
        assert_eq!(packetizer.buffered(), 0);
    }

    #[test]
    fn test_run_sends_through_transmitter() {
        let (out_tx, out_rx) = bounded(8);
        let crossbar = crate::transport::PortCrossbar::new(out_tx);
        let transmitter = crossbar.transmitter(9000);

        let (beat_tx, beat_rx) = bounded(64);
        for beat in frame_of_bytes(24) {
            beat_tx.send(beat).unwrap();
        }
        // Stream stops partway into the next frame
        beat_tx.send(StreamBeat::word([7, 7, 7, 7], false)).unwrap();
        drop(beat_tx);

        RtpPacketizer::new(session(16))
            .unwrap()
            .run(beat_rx, transmitter)
            .unwrap();

        let datagrams: Vec<_> = out_rx.try_iter().collect();
        assert_eq!(datagrams.len(), 3);
        assert_eq!(datagrams[0].src_port, 9000);
        assert_eq!(datagrams[0].dst_port, 9000);
        assert_eq!(datagrams[0].dst_addr, [192, 168, 100, 100]);
        assert_eq!(datagrams[0].payload.len(), RTP_HEADER_LEN + 16);
        let header = RtpHeader::from_bytes(&datagrams[1].payload).unwrap();
        assert!(header.marker);
        assert_eq!(header.sequence, 1);
        assert_eq!(&datagrams[1].payload[RTP_HEADER_LEN..], &(16u8..24).collect::<Vec<_>>()[..]);

        let tail = RtpHeader::from_bytes(&datagrams[2].payload).unwrap();
        assert!(!tail.marker);
        assert_eq!(tail.timestamp, header.timestamp + 1);
        assert_eq!(&datagrams[2].payload[RTP_HEADER_LEN..], &[7, 7, 7, 7]);
    }

    #[test]
    fn test_zero_packet_size_rejected() {
        assert!(RtpPacketizer::new(session(0)).is_err());
    }
}
