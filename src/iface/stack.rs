//! The stack thread
//!
//! Owns the `NetworkInterface` and services three inputs: frames from the
//! link domain, datagrams from UDP producers and resolver timers. Each
//! input is only read while the interface has room for what it produces:
//! link frames pause while a consumer delivery is stalled, producer
//! datagrams pause while a pending-resolution queue is full.

use crate::error::{Error, Result};
use crate::iface::interface::{InterfaceStats, NetworkInterface};
use crate::link::device::DomainCrossing;
use crate::transport::udp::OutboundDatagram;
use crossbeam_channel::{never, select, Receiver, Sender};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Upper bound on how long the loop sleeps without work
const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Run the stack until `running` clears or the link side hangs up,
/// returning the final counters
pub fn run_stack(
    mut iface: NetworkInterface,
    link: DomainCrossing,
    outbound: Receiver<OutboundDatagram>,
    running: Arc<AtomicBool>,
) -> Result<InterfaceStats> {
    log::info!(
        "Stack up: {} / {:?}",
        iface.local_mac,
        iface.local_addr
    );

    let no_frames = never::<Vec<u8>>();
    let no_datagrams = never::<OutboundDatagram>();
    let mut producers_open = true;

    while running.load(Ordering::Relaxed) {
        let now = Instant::now();
        iface.poll(now);
        if iface.is_stalled() {
            iface.retry_stalled();
        }
        flush(&mut iface, &link.tx)?;

        let frames = if iface.is_stalled() {
            &no_frames
        } else {
            &link.rx
        };
        let datagrams = if producers_open && iface.can_accept_outbound() {
            &outbound
        } else {
            &no_datagrams
        };

        select! {
            recv(frames) -> msg => match msg {
                Ok(frame) => iface.process_frame(&frame, now),
                Err(_) => {
                    log::info!("Link receive side closed");
                    break;
                }
            },
            recv(datagrams) -> msg => match msg {
                Ok(datagram) => {
                    if let Err(e) = iface.send_udp(&datagram, now) {
                        log::warn!(
                            "Dropping datagram {} -> {:?}:{}: {}",
                            datagram.src_port,
                            datagram.dst_addr,
                            datagram.dst_port,
                            e
                        );
                    }
                }
                Err(_) => producers_open = false,
            },
            default(POLL_INTERVAL) => {}
        }
    }

    flush(&mut iface, &link.tx)?;
    log::info!("Stack stopped: {:?}", iface.stats);
    Ok(iface.stats)
}

/// Move queued frames across to the link domain
fn flush(iface: &mut NetworkInterface, tx: &Sender<Vec<u8>>) -> Result<()> {
    while let Some(frame) = iface.dequeue_output() {
        tx.send(frame)
            .map_err(|_| Error::ChannelClosed("link transmit"))?;
    }
    Ok(())
}
