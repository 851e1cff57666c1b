use crate::iface::interface::NetworkInterface;
use crate::network::icmp::IcmpUtils;
use crate::network::ipv4::{protocol, Ipv4Header};
use crate::transport::udp::{InboundDatagram, UdpUtils, UDP_HEADER_LEN};
use std::time::Instant;

impl NetworkInterface {
    /// Validate an inbound IPv4 packet and dispatch it by protocol
    ///
    /// Everything that fails validation is dropped without a reply.
    pub(crate) fn process_ipv4_packet(&mut self, packet: &[u8], now: Instant) {
        let ip_header = match Ipv4Header::from_bytes(packet) {
            Some(ip_header) => ip_header,
            None => {
                self.stats.ipv4_dropped += 1;
                return;
            }
        };

        if let Err(reason) = ip_header.validate(packet) {
            log::debug!("Dropping IPv4 packet: {:?}", reason);
            self.stats.ipv4_dropped += 1;
            return;
        }
        if !self.is_for_us(&ip_header.dst_addr) {
            self.stats.ipv4_dropped += 1;
            return;
        }

        // Ethernet padding may follow the datagram
        let payload = &packet[ip_header.header_len()..ip_header.total_len as usize];

        match ip_header.protocol {
            protocol::ICMP => self.process_icmpv4(payload, &ip_header, now),
            protocol::UDP => self.process_udp(payload, &ip_header),
            _ => {
                log::debug!("Unsupported protocol: {}", ip_header.protocol);
                self.stats.ipv4_dropped += 1;
            }
        }
    }

    fn process_icmpv4(&mut self, payload: &[u8], ip_header: &Ipv4Header, now: Instant) {
        // Echo is answered for our unicast address only
        if ip_header.dst_addr != self.local_addr {
            return;
        }
        let Some(reply) = IcmpUtils::create_echo_reply(payload) else {
            return;
        };
        match self.encapsulate(&reply, ip_header.src_addr, protocol::ICMP, now) {
            Ok(()) => self.stats.icmp_replies += 1,
            Err(e) => log::debug!("ICMP reply not sent: {}", e),
        }
    }

    fn process_udp(&mut self, payload: &[u8], ip_header: &Ipv4Header) {
        let Some(udp_header) =
            UdpUtils::validate_udp_packet(&ip_header.src_addr, &ip_header.dst_addr, payload)
        else {
            log::debug!("Invalid UDP packet from {:?}", ip_header.src_addr);
            self.stats.udp_dropped += 1;
            return;
        };

        let datagram = InboundDatagram {
            src_addr: ip_header.src_addr,
            src_port: udp_header.src_port,
            dst_port: udp_header.dst_port,
            payload: payload[UDP_HEADER_LEN..udp_header.length as usize].to_vec(),
        };
        self.deliver_udp(datagram);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::iface::interface::tests::{arp_reply, test_interface, PEER_IP, PEER_MAC};
    use crate::link::ethernet::{build_frame, ethertype, EthernetHeader};
    use crate::network::icmp::{IcmpHeader, ICMP_TYPE_ECHO_REPLY, ICMP_TYPE_ECHO_REQUEST};
    use crate::network::ipv4::Ipv4Utils;
    use crate::network::Ipv4Address;
    use crate::transport::crossbar::PortCrossbar;
    use crate::transport::udp::UdpHeader;
    use crossbeam_channel::bounded;

    fn udp_header_of(ip_packet: &[u8]) -> Option<UdpHeader> {
        let header = Ipv4Header::from_bytes(ip_packet)?;
        UdpHeader::from_bytes(&ip_packet[header.header_len()..])
    }

    fn ip_frame(iface: &NetworkInterface, protocol: u8, dst: Ipv4Address, payload: &[u8]) -> Vec<u8> {
        let header = Ipv4Header::new_simple(protocol, 1, PEER_IP, dst, payload.len() as u16);
        let packet = Ipv4Utils::create_packet_with_payload(&header, payload);
        build_frame(iface.local_mac, PEER_MAC, ethertype::IPV4, &packet)
    }

    fn udp_frame(iface: &NetworkInterface, dst_port: u16, payload: &[u8]) -> Vec<u8> {
        let udp = UdpUtils::create_udp_packet_with_checksum(
            &PEER_IP,
            &iface.local_addr,
            5000,
            dst_port,
            payload,
        );
        ip_frame(iface, protocol::UDP, iface.local_addr, &udp)
    }

    fn interface_with_port(port: u16, depth: usize) -> (NetworkInterface, crate::transport::UdpPort) {
        let (tx, _rx) = bounded(4);
        let mut crossbar = PortCrossbar::new(tx);
        let bound = crossbar.register(port, depth).unwrap();
        (NetworkInterface::new(&Config::default(), crossbar), bound)
    }

    #[test]
    fn test_valid_udp_delivered_once() {
        let (mut iface, port) = interface_with_port(9001, 8);
        let frame = udp_frame(&iface, 9001, b"hello");
        iface.process_frame(&frame, Instant::now());

        let received: Vec<_> = port.rx.try_iter().collect();
        assert_eq!(received.len(), 1);
        assert_eq!(received[0].payload, b"hello");
        assert_eq!(received[0].src_addr, PEER_IP);
        assert_eq!(received[0].src_port, 5000);
        assert_eq!(iface.stats.udp_delivered, 1);
    }

    #[test]
    fn test_corrupted_ip_checksum_delivers_nothing() {
        let (mut iface, port) = interface_with_port(9001, 8);
        let mut frame = udp_frame(&iface, 9001, b"hello");
        // IPv4 checksum sits at bytes 10..12 of the IP header
        frame[14 + 10] ^= 0x5a;
        iface.process_frame(&frame, Instant::now());

        assert!(port.rx.try_recv().is_err());
        assert_eq!(iface.stats.ipv4_dropped, 1);
        assert!(iface.dequeue_output().is_none());
    }

    #[test]
    fn test_unbound_port_dropped() {
        let (mut iface, port) = interface_with_port(9001, 8);
        iface.process_frame(&udp_frame(&iface, 9002, b"x"), Instant::now());
        assert!(port.rx.try_recv().is_err());
        assert_eq!(iface.stats.udp_dropped, 1);
    }

    #[test]
    fn test_unknown_protocol_dropped() {
        let mut iface = test_interface();
        let frame = ip_frame(&iface, 6, iface.local_addr, &[0u8; 20]);
        iface.process_frame(&frame, Instant::now());
        assert_eq!(iface.stats.ipv4_dropped, 1);
        assert!(iface.dequeue_output().is_none());
    }

    #[test]
    fn test_ethernet_padding_ignored() {
        let (mut iface, port) = interface_with_port(9001, 8);
        let mut frame = udp_frame(&iface, 9001, b"hi");
        frame.extend_from_slice(&[0u8; 16]);
        iface.process_frame(&frame, Instant::now());
        assert_eq!(port.rx.try_recv().unwrap().payload, b"hi");
    }

    #[test]
    fn test_full_consumer_stalls_until_drained() {
        let (mut iface, port) = interface_with_port(9001, 1);
        let now = Instant::now();

        iface.process_frame(&udp_frame(&iface, 9001, b"one"), now);
        iface.process_frame(&udp_frame(&iface, 9001, b"two"), now);
        assert!(iface.is_stalled());
        assert!(!iface.retry_stalled());

        assert_eq!(port.recv().unwrap().payload, b"one");
        assert!(iface.retry_stalled());
        assert!(!iface.is_stalled());
        assert_eq!(port.recv().unwrap().payload, b"two");
        assert_eq!(iface.stats.udp_delivered, 2);
    }

    #[test]
    fn test_echo_request_answered() {
        let mut iface = test_interface();
        let now = Instant::now();
        iface.process_frame(&arp_reply(&iface), now);

        let request = IcmpUtils::create_message(ICMP_TYPE_ECHO_REQUEST, 0, [0, 1, 0, 2], b"ping!");
        let frame = ip_frame(&iface, protocol::ICMP, iface.local_addr, &request);
        iface.process_frame(&frame, now);

        let out = iface.dequeue_output().unwrap();
        assert!(iface.dequeue_output().is_none());
        let (eth, ip) = EthernetHeader::from_bytes(&out).unwrap();
        assert_eq!(eth.dst, PEER_MAC);
        let header = Ipv4Header::from_bytes(ip).unwrap();
        assert_eq!(header.src_addr, iface.local_addr);
        assert_eq!(header.dst_addr, PEER_IP);
        assert_eq!(header.protocol, protocol::ICMP);

        let icmp = &ip[header.header_len()..];
        let icmp_header = IcmpHeader::from_bytes(icmp).unwrap();
        assert_eq!(icmp_header.msg_type, ICMP_TYPE_ECHO_REPLY);
        assert_eq!(icmp_header.sequence(), 2);
        assert_eq!(&icmp[8..], b"ping!");
        assert_eq!(iface.stats.icmp_replies, 1);
    }

    #[test]
    fn test_echo_reply_dropped_while_peer_queue_full() {
        let mut config = Config::default();
        config.arp.pending_depth = 1;
        let (tx, _rx) = bounded(4);
        let mut iface = NetworkInterface::new(&config, PortCrossbar::new(tx));
        let now = Instant::now();

        iface
            .send_udp(
                &crate::transport::OutboundDatagram {
                    src_port: 9000,
                    dst_addr: PEER_IP,
                    dst_port: 9000,
                    payload: b"held".to_vec(),
                },
                now,
            )
            .unwrap();

        let request = IcmpUtils::create_message(ICMP_TYPE_ECHO_REQUEST, 0, [0, 1, 0, 3], b"ping");
        let frame = ip_frame(&iface, protocol::ICMP, iface.local_addr, &request);
        iface.process_frame(&frame, now);

        let out: Vec<_> = std::iter::from_fn(|| iface.dequeue_output()).collect();
        assert!(out.iter().all(|frame| {
            EthernetHeader::from_bytes(frame).unwrap().0.ethertype == ethertype::ARP
        }));
        assert_eq!(iface.stats.pending_dropped, 1);
        assert_eq!(iface.stats.icmp_replies, 0);
        assert_eq!(iface.resolver().pending_packets(), 1);
    }

    #[test]
    fn test_echo_to_broadcast_not_answered() {
        let mut iface = test_interface();
        let request = IcmpUtils::create_message(ICMP_TYPE_ECHO_REQUEST, 0, [0; 4], b"x");
        let frame = ip_frame(&iface, protocol::ICMP, [192, 168, 100, 255], &request);
        iface.process_frame(&frame, Instant::now());
        assert!(iface.dequeue_output().is_none());
        assert_eq!(iface.stats.icmp_replies, 0);
    }

    #[test]
    fn test_outbound_udp_header() {
        let mut iface = test_interface();
        let now = Instant::now();
        iface.process_frame(&arp_reply(&iface), now);
        iface
            .send_udp(
                &crate::transport::OutboundDatagram {
                    src_port: 9000,
                    dst_addr: PEER_IP,
                    dst_port: 9000,
                    payload: vec![0xab; 32],
                },
                now,
            )
            .unwrap();

        let out = iface.dequeue_output().unwrap();
        let (_, ip) = EthernetHeader::from_bytes(&out).unwrap();
        let udp = udp_header_of(ip).unwrap();
        assert_eq!(udp.src_port, 9000);
        assert_eq!(udp.dst_port, 9000);
        assert_eq!(udp.length, 40);
    }
}
