//! ARP (Address Resolution Protocol) and the resolver cache
//!
//! The resolver keeps one entry per peer, overwritten by each fresh reply
//! (last writer wins, no expiry). A miss broadcasts a request and the
//! caller parks the outbound packet with `hold`; the reply releases every
//! parked packet for that peer in the order it was held.
//!
//! Misses are not throttled: every `resolve` miss emits a request, so a
//! burst of sends to a silent peer produces a burst of requests. Peers
//! that stay silent are re-requested by `poll` and eventually given up on.

use crate::link::ethernet::{build_frame, ethertype, MacAddress};
use crate::network::Ipv4Address;
use byteorder::{BigEndian, ByteOrder};
use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

pub const ARP_PACKET_LEN: usize = 28;

const HW_TYPE_ETHERNET: u16 = 0x0001;
const PROTO_TYPE_IPV4: u16 = 0x0800;

/// ARP operation codes
pub mod operation {
    pub const REQUEST: u16 = 1;
    pub const REPLY: u16 = 2;
}

/// ARP packet for Ethernet/IPv4
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArpPacket {
    pub operation: u16,
    pub sender_mac: MacAddress,
    pub sender_ip: Ipv4Address,
    pub target_mac: MacAddress,
    pub target_ip: Ipv4Address,
}

impl ArpPacket {
    /// Parse an ARP packet
    ///
    /// Returns None unless it is a complete Ethernet/IPv4 ARP packet
    pub fn from_bytes(data: &[u8]) -> Option<Self> {
        if data.len() < ARP_PACKET_LEN {
            return None;
        }
        if BigEndian::read_u16(&data[0..2]) != HW_TYPE_ETHERNET
            || BigEndian::read_u16(&data[2..4]) != PROTO_TYPE_IPV4
            || data[4] != 6
            || data[5] != 4
        {
            return None;
        }

        Some(ArpPacket {
            operation: BigEndian::read_u16(&data[6..8]),
            sender_mac: MacAddress(data[8..14].try_into().ok()?),
            sender_ip: data[14..18].try_into().ok()?,
            target_mac: MacAddress(data[18..24].try_into().ok()?),
            target_ip: data[24..28].try_into().ok()?,
        })
    }

    pub fn to_bytes(&self) -> [u8; ARP_PACKET_LEN] {
        let mut bytes = [0u8; ARP_PACKET_LEN];
        BigEndian::write_u16(&mut bytes[0..2], HW_TYPE_ETHERNET);
        BigEndian::write_u16(&mut bytes[2..4], PROTO_TYPE_IPV4);
        bytes[4] = 6;
        bytes[5] = 4;
        BigEndian::write_u16(&mut bytes[6..8], self.operation);
        bytes[8..14].copy_from_slice(&self.sender_mac.0);
        bytes[14..18].copy_from_slice(&self.sender_ip);
        bytes[18..24].copy_from_slice(&self.target_mac.0);
        bytes[24..28].copy_from_slice(&self.target_ip);
        bytes
    }
}

/// One cached binding
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolutionEntry {
    pub ip_address: Ipv4Address,
    pub hardware_address: MacAddress,
    pub valid: bool,
}

/// Outcome of a lookup
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    Resolved(MacAddress),
    /// A request is outstanding; hold the packet until the reply arrives
    Pending,
}

struct PendingPeer {
    packets: VecDeque<Vec<u8>>,
    requests_sent: u32,
    last_request: Instant,
}

/// IP → hardware address cache with request/reply semantics
pub struct AddressResolver {
    local_mac: MacAddress,
    local_ip: Ipv4Address,
    netmask: Ipv4Address,
    entries: HashMap<Ipv4Address, ResolutionEntry>,
    pending: HashMap<Ipv4Address, PendingPeer>,
    retry_interval: Duration,
    max_retries: u32,
    pending_depth: usize,
    requests_sent: u64,
}

impl AddressResolver {
    pub fn new(
        local_mac: MacAddress,
        local_ip: Ipv4Address,
        netmask: Ipv4Address,
        retry_interval: Duration,
        max_retries: u32,
        pending_depth: usize,
    ) -> Self {
        AddressResolver {
            local_mac,
            local_ip,
            netmask,
            entries: HashMap::new(),
            pending: HashMap::new(),
            retry_interval,
            max_retries,
            pending_depth,
            requests_sent: 0,
        }
    }

    /// Look up `ip`, broadcasting a request into `out` on a miss
    pub fn resolve(
        &mut self,
        ip: Ipv4Address,
        now: Instant,
        out: &mut VecDeque<Vec<u8>>,
    ) -> Resolution {
        if self.is_broadcast(&ip) {
            return Resolution::Resolved(MacAddress::BROADCAST);
        }
        if let Some(mac) = self.lookup(&ip) {
            return Resolution::Resolved(mac);
        }

        // Only timer retries count towards giving up on the peer
        let peer = self.pending.entry(ip).or_insert_with(|| PendingPeer {
            packets: VecDeque::new(),
            requests_sent: 1,
            last_request: now,
        });
        peer.last_request = now;
        out.push_back(Self::request_frame(self.local_mac, self.local_ip, ip));
        self.requests_sent += 1;
        log::debug!("ARP miss for {:?}, request sent", ip);
        Resolution::Pending
    }

    /// Cached hardware address for `ip`, if the entry is valid
    pub fn lookup(&self, ip: &Ipv4Address) -> Option<MacAddress> {
        self.entries
            .get(ip)
            .filter(|entry| entry.valid)
            .map(|entry| entry.hardware_address)
    }

    pub fn entry(&self, ip: &Ipv4Address) -> Option<&ResolutionEntry> {
        self.entries.get(ip)
    }

    /// Park an IP packet until `ip` resolves
    ///
    /// Hands the packet back if that peer's queue is full.
    pub fn hold(&mut self, ip: Ipv4Address, packet: Vec<u8>) -> Result<(), Vec<u8>> {
        match self.pending.get_mut(&ip) {
            Some(peer) if peer.packets.len() < self.pending_depth => {
                peer.packets.push_back(packet);
                Ok(())
            }
            _ => Err(packet),
        }
    }

    /// True while any peer's pending queue has no room left
    pub fn is_congested(&self) -> bool {
        self.pending
            .values()
            .any(|peer| peer.packets.len() >= self.pending_depth)
    }

    pub fn pending_packets(&self) -> usize {
        self.pending.values().map(|peer| peer.packets.len()).sum()
    }

    /// Total requests broadcast since creation
    pub fn requests_sent(&self) -> u64 {
        self.requests_sent
    }

    /// Handle a received ARP packet
    ///
    /// Requests for the local address are answered into `out`. A reply
    /// installs its binding and returns the packets released for that
    /// peer, with the hardware address to send them to.
    pub fn process(
        &mut self,
        data: &[u8],
        out: &mut VecDeque<Vec<u8>>,
    ) -> Option<(MacAddress, Vec<Vec<u8>>)> {
        let packet = ArpPacket::from_bytes(data)?;

        match packet.operation {
            operation::REQUEST if packet.target_ip == self.local_ip => {
                log::debug!("ARP request from {:?}, replying", packet.sender_ip);
                let reply = ArpPacket {
                    operation: operation::REPLY,
                    sender_mac: self.local_mac,
                    sender_ip: self.local_ip,
                    target_mac: packet.sender_mac,
                    target_ip: packet.sender_ip,
                };
                out.push_back(build_frame(
                    packet.sender_mac,
                    self.local_mac,
                    ethertype::ARP,
                    &reply.to_bytes(),
                ));
                None
            }
            operation::REPLY if packet.target_ip == self.local_ip => {
                self.entries.insert(
                    packet.sender_ip,
                    ResolutionEntry {
                        ip_address: packet.sender_ip,
                        hardware_address: packet.sender_mac,
                        valid: true,
                    },
                );
                log::debug!(
                    "ARP resolved {:?} -> {}",
                    packet.sender_ip,
                    packet.sender_mac
                );
                let released = self
                    .pending
                    .remove(&packet.sender_ip)
                    .map(|peer| peer.packets.into_iter().collect())
                    .unwrap_or_default();
                Some((packet.sender_mac, released))
            }
            _ => None,
        }
    }

    /// Re-request peers whose requests went unanswered
    ///
    /// Gives up on a peer after `max_retries` requests, dropping its
    /// pending packets. Returns the number of packets dropped.
    pub fn poll(&mut self, now: Instant, out: &mut VecDeque<Vec<u8>>) -> usize {
        let mut dropped = 0;
        let mut expired = Vec::new();

        for (ip, peer) in self.pending.iter_mut() {
            if now.duration_since(peer.last_request) < self.retry_interval {
                continue;
            }
            if peer.requests_sent >= self.max_retries {
                expired.push(*ip);
                continue;
            }
            peer.requests_sent += 1;
            peer.last_request = now;
            out.push_back(Self::request_frame(self.local_mac, self.local_ip, *ip));
            self.requests_sent += 1;
        }

        for ip in expired {
            if let Some(peer) = self.pending.remove(&ip) {
                log::warn!(
                    "No ARP reply from {:?} after {} requests, dropping {} packets",
                    ip,
                    peer.requests_sent,
                    peer.packets.len()
                );
                dropped += peer.packets.len();
            }
        }
        dropped
    }

    fn is_broadcast(&self, ip: &Ipv4Address) -> bool {
        if ip == &[255, 255, 255, 255] {
            return true;
        }
        let mut directed = [0u8; 4];
        for i in 0..4 {
            directed[i] = self.local_ip[i] | !self.netmask[i];
        }
        ip == &directed
    }

    fn request_frame(local_mac: MacAddress, local_ip: Ipv4Address, target: Ipv4Address) -> Vec<u8> {
        let request = ArpPacket {
            operation: operation::REQUEST,
            sender_mac: local_mac,
            sender_ip: local_ip,
            target_mac: MacAddress::ZERO,
            target_ip: target,
        };
        build_frame(
            MacAddress::BROADCAST,
            local_mac,
            ethertype::ARP,
            &request.to_bytes(),
        )
    }
}
