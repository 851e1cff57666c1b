//! UDP port crossbar
//!
//! Routes inbound datagrams to the single consumer bound on their
//! destination port, and gives producers a shared path into the stack for
//! outbound datagrams. Bindings are made at setup; once the crossbar is
//! handed to the interface the table is only read.

use crate::error::{Error, Result};
use crate::network::Ipv4Address;
use crate::transport::udp::{InboundDatagram, OutboundDatagram};
use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use std::collections::HashMap;

/// Result of handing a datagram to the crossbar
#[derive(Debug, PartialEq, Eq)]
pub enum Delivery {
    Delivered,
    /// No consumer on that port; the datagram was dropped
    Unbound,
    /// Consumer queue is full; retry with the returned datagram
    Full(InboundDatagram),
    /// Consumer went away; the datagram was dropped
    Closed,
}

/// Send side of a UDP service
///
/// Sends block while the stack's outbound queue is full.
#[derive(Debug, Clone)]
pub struct UdpTransmitter {
    src_port: u16,
    outbound: Sender<OutboundDatagram>,
}

impl UdpTransmitter {
    pub fn src_port(&self) -> u16 {
        self.src_port
    }

    pub fn send(&self, dst_addr: Ipv4Address, dst_port: u16, payload: Vec<u8>) -> Result<()> {
        self.outbound
            .send(OutboundDatagram {
                src_port: self.src_port,
                dst_addr,
                dst_port,
                payload,
            })
            .map_err(|_| Error::ChannelClosed("udp outbound"))
    }
}

/// A bound UDP service: its inbound queue plus a transmitter on its port
#[derive(Debug)]
pub struct UdpPort {
    pub port: u16,
    pub rx: Receiver<InboundDatagram>,
    pub tx: UdpTransmitter,
}

impl UdpPort {
    /// Blocks until a datagram arrives; errors once the stack is gone
    pub fn recv(&self) -> Result<InboundDatagram> {
        self.rx
            .recv()
            .map_err(|_| Error::ChannelClosed("udp inbound"))
    }

    pub fn send(&self, dst_addr: Ipv4Address, dst_port: u16, payload: Vec<u8>) -> Result<()> {
        self.tx.send(dst_addr, dst_port, payload)
    }
}

pub struct PortCrossbar {
    bindings: HashMap<u16, Sender<InboundDatagram>>,
    outbound: Sender<OutboundDatagram>,
}

impl PortCrossbar {
    /// `outbound` is the stack's shared transmit queue
    pub fn new(outbound: Sender<OutboundDatagram>) -> Self {
        PortCrossbar {
            bindings: HashMap::new(),
            outbound,
        }
    }

    /// Bind a consumer to `port` with a queue of `depth` datagrams
    pub fn register(&mut self, port: u16, depth: usize) -> Result<UdpPort> {
        if port == 0 {
            return Err(Error::InvalidParameter("UDP port 0".to_string()));
        }
        if self.bindings.contains_key(&port) {
            return Err(Error::PortInUse(port));
        }
        let (tx, rx) = bounded(depth);
        self.bindings.insert(port, tx);
        log::debug!("UDP port {} bound (queue depth {})", port, depth);
        Ok(UdpPort {
            port,
            rx,
            tx: self.transmitter(port),
        })
    }

    /// Send-only access for a producer that receives nothing
    pub fn transmitter(&self, src_port: u16) -> UdpTransmitter {
        UdpTransmitter {
            src_port,
            outbound: self.outbound.clone(),
        }
    }

    pub fn is_bound(&self, port: u16) -> bool {
        self.bindings.contains_key(&port)
    }

    /// Route a datagram to the consumer bound on its destination port
    pub fn deliver(&self, datagram: InboundDatagram) -> Delivery {
        let Some(consumer) = self.bindings.get(&datagram.dst_port) else {
            log::debug!("No consumer bound to UDP port {}", datagram.dst_port);
            return Delivery::Unbound;
        };
        match consumer.try_send(datagram) {
            Ok(()) => Delivery::Delivered,
            Err(TrySendError::Full(datagram)) => Delivery::Full(datagram),
            Err(TrySendError::Disconnected(datagram)) => {
                log::debug!("Consumer on UDP port {} is gone", datagram.dst_port);
                Delivery::Closed
            }
        }
    }
}
