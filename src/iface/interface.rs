//! Network interface abstraction and packet processing
//!
//! This module provides the main interface for packet processing, including:
//! - Ethernet reception and EtherType dispatch (ARP, IPv4)
//! - Outbound encapsulation through the address resolver
//! - Local/broadcast address checks
//!
//! Inbound IPv4 handling lives in `iface::ipv4`.

use crate::config::Config;
use crate::error::{Error, Result};
use crate::link::ethernet::{build_frame, ethertype, EthernetHeader, MacAddress};
use crate::network::arp::{AddressResolver, Resolution};
use crate::network::ipv4::{protocol, Ipv4Header, Ipv4Utils, IPV4_HEADER_LEN};
use crate::network::Ipv4Address;
use crate::transport::crossbar::{Delivery, PortCrossbar};
use crate::transport::udp::{InboundDatagram, OutboundDatagram, UdpUtils};
use std::collections::VecDeque;
use std::net::Ipv4Addr;
use std::time::{Duration, Instant};

/// Packet counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InterfaceStats {
    pub frames_received: u64,
    pub frames_dropped: u64,
    pub ipv4_dropped: u64,
    pub icmp_replies: u64,
    pub udp_delivered: u64,
    pub udp_dropped: u64,
    pub packets_sent: u64,
    pub pending_dropped: u64,
}

/// Network interface for packet processing
pub struct NetworkInterface {
    /// Local hardware address
    pub local_mac: MacAddress,
    /// Local IPv4 address
    pub local_addr: Ipv4Address,
    /// Network mask
    pub netmask: Ipv4Address,
    mtu: usize,
    resolver: AddressResolver,
    pub(crate) crossbar: PortCrossbar,
    output_queue: VecDeque<Vec<u8>>,
    /// Datagram waiting for room in its consumer's queue
    pub(crate) stalled: Option<InboundDatagram>,
    next_ip_id: u16,
    pub stats: InterfaceStats,
}

impl NetworkInterface {
    /// Create an interface from configuration, taking ownership of the
    /// already-populated crossbar
    pub fn new(config: &Config, crossbar: PortCrossbar) -> Self {
        let local_addr = config.interface.ip_address.octets();
        let netmask = config.interface.netmask.octets();
        let local_mac = config.interface.mac_address;
        NetworkInterface {
            local_mac,
            local_addr,
            netmask,
            mtu: config.interface.mtu,
            resolver: AddressResolver::new(
                local_mac,
                local_addr,
                netmask,
                Duration::from_millis(config.arp.retry_interval_ms),
                config.arp.max_retries,
                config.arp.pending_depth,
            ),
            crossbar,
            output_queue: VecDeque::new(),
            stalled: None,
            next_ip_id: 0,
            stats: InterfaceStats::default(),
        }
    }

    pub fn resolver(&self) -> &AddressResolver {
        &self.resolver
    }

    /// Process one received Ethernet frame
    ///
    /// Must not be called while a delivery is stalled; the caller retries
    /// the stalled datagram first.
    pub fn process_frame(&mut self, frame: &[u8], now: Instant) {
        self.stats.frames_received += 1;

        let Some((eth, payload)) = EthernetHeader::from_bytes(frame) else {
            self.stats.frames_dropped += 1;
            return;
        };
        if eth.dst != self.local_mac && !eth.dst.is_broadcast() {
            self.stats.frames_dropped += 1;
            return;
        }

        match eth.ethertype {
            ethertype::ARP => {
                if let Some((mac, released)) = self.resolver.process(payload, &mut self.output_queue)
                {
                    for packet in released {
                        self.push_frame(mac, packet);
                    }
                }
            }
            ethertype::IPV4 => self.process_ipv4_packet(payload, now),
            other => {
                log::trace!("Ignoring EtherType {:#06x}", other);
                self.stats.frames_dropped += 1;
            }
        }
    }

    /// Send a UDP datagram
    pub fn send_udp(&mut self, datagram: &OutboundDatagram, now: Instant) -> Result<()> {
        let udp_packet = UdpUtils::create_udp_packet_with_checksum(
            &self.local_addr,
            &datagram.dst_addr,
            datagram.src_port,
            datagram.dst_port,
            &datagram.payload,
        );
        self.encapsulate(&udp_packet, datagram.dst_addr, protocol::UDP, now)
    }

    /// Wrap `payload` in an IPv4 header and queue it for the link
    ///
    /// The packet leaves only once `dst_addr` resolves; until then it waits
    /// in the resolver. Payloads that do not fit the MTU, or the 16-bit IPv4
    /// length field, are refused. A packet that finds its peer's pending
    /// queue full is dropped and reported as `PendingQueueFull`.
    pub fn encapsulate(
        &mut self,
        payload: &[u8],
        dst_addr: Ipv4Address,
        protocol: u8,
        now: Instant,
    ) -> Result<()> {
        let limit = self.mtu.min(u16::MAX as usize);
        if IPV4_HEADER_LEN + payload.len() > limit {
            return Err(Error::PayloadTooLarge {
                len: IPV4_HEADER_LEN + payload.len(),
                mtu: limit,
            });
        }

        let header = Ipv4Header::new_simple(
            protocol,
            self.next_ip_id,
            self.local_addr,
            dst_addr,
            payload.len() as u16,
        );
        self.next_ip_id = self.next_ip_id.wrapping_add(1);
        let packet = Ipv4Utils::create_packet_with_payload(&header, payload);

        match self.resolver.resolve(dst_addr, now, &mut self.output_queue) {
            Resolution::Resolved(mac) => self.push_frame(mac, packet),
            Resolution::Pending => {
                if self.resolver.hold(dst_addr, packet).is_err() {
                    self.stats.pending_dropped += 1;
                    return Err(Error::PendingQueueFull(Ipv4Addr::from(dst_addr)));
                }
            }
        }
        Ok(())
    }

    /// Run resolver timers
    pub fn poll(&mut self, now: Instant) {
        let dropped = self.resolver.poll(now, &mut self.output_queue);
        self.stats.pending_dropped += dropped as u64;
    }

    /// Whether another outbound datagram can be taken without overflowing
    /// a pending-resolution queue
    pub fn can_accept_outbound(&self) -> bool {
        !self.resolver.is_congested()
    }

    pub fn is_stalled(&self) -> bool {
        self.stalled.is_some()
    }

    /// Retry a stalled delivery; returns true once the stall has cleared
    pub fn retry_stalled(&mut self) -> bool {
        match self.stalled.take() {
            Some(datagram) => self.deliver_udp(datagram),
            None => true,
        }
    }

    /// Hand a datagram to the crossbar; false if it stalled
    pub(crate) fn deliver_udp(&mut self, datagram: InboundDatagram) -> bool {
        match self.crossbar.deliver(datagram) {
            Delivery::Delivered => {
                self.stats.udp_delivered += 1;
                true
            }
            Delivery::Full(datagram) => {
                log::trace!("UDP port {} consumer full, stalling", datagram.dst_port);
                self.stalled = Some(datagram);
                false
            }
            Delivery::Unbound | Delivery::Closed => {
                self.stats.udp_dropped += 1;
                true
            }
        }
    }

    /// Get the next frame from the output queue
    pub fn dequeue_output(&mut self) -> Option<Vec<u8>> {
        self.output_queue.pop_front()
    }

    /// Check if packet is destined for this interface
    pub(crate) fn is_for_us(&self, dst_addr: &Ipv4Address) -> bool {
        dst_addr == &self.local_addr || self.is_broadcast_address(dst_addr)
    }

    /// Check if address is a broadcast address
    fn is_broadcast_address(&self, addr: &Ipv4Address) -> bool {
        // Limited broadcast (255.255.255.255)
        if addr == &[255, 255, 255, 255] {
            return true;
        }

        // Directed broadcast for our network
        let mut broadcast_addr = [0u8; 4];
        for i in 0..4 {
            broadcast_addr[i] = self.local_addr[i] | (!self.netmask[i]);
        }

        addr == &broadcast_addr
    }

    fn push_frame(&mut self, dst: MacAddress, ip_packet: Vec<u8>) {
        self.output_queue
            .push_back(build_frame(dst, self.local_mac, ethertype::IPV4, &ip_packet));
        self.stats.packets_sent += 1;
    }
}
