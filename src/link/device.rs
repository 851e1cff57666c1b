//! Link device and the link-domain threads
//!
//! The link device runs in its own timing domain. Frames cross between it
//! and the stack only through a pair of bounded single-producer /
//! single-consumer channels; the stack never touches the device directly.

use crate::error::{Error, Result};
use crossbeam_channel::{bounded, Receiver, Sender};
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Largest frame read from the device (MTU plus Ethernet header and slack)
pub const MAX_FRAME_LEN: usize = 1518;

const IDLE_POLL: Duration = Duration::from_millis(1);

/// A device that moves whole Ethernet frames
///
/// `recv` may return `WouldBlock` when no frame is waiting; the receive
/// thread then polls again after a short sleep.
pub trait LinkDevice: Send + Sync {
    fn send(&self, frame: &[u8]) -> io::Result<usize>;
    fn recv(&self, buf: &mut [u8]) -> io::Result<usize>;
}

impl LinkDevice for tun_tap::Iface {
    fn send(&self, frame: &[u8]) -> io::Result<usize> {
        tun_tap::Iface::send(self, frame)
    }

    fn recv(&self, buf: &mut [u8]) -> io::Result<usize> {
        tun_tap::Iface::recv(self, buf)
    }
}

/// Stack-side ends of the domain crossing
pub struct DomainCrossing {
    /// Frames received from the link
    pub rx: Receiver<Vec<u8>>,
    /// Frames to transmit on the link
    pub tx: Sender<Vec<u8>>,
}

/// Spawn the `link-rx` and `link-tx` threads around `device`
///
/// The transmit thread exits once every `DomainCrossing::tx` sender is
/// dropped; the receive thread exits when `running` clears or the stack
/// drops its receiver.
pub fn spawn_link<D: LinkDevice + 'static>(
    device: Arc<D>,
    depth: usize,
    running: Arc<AtomicBool>,
) -> Result<(DomainCrossing, Vec<JoinHandle<()>>)> {
    let (rx_tx, rx_rx) = bounded::<Vec<u8>>(depth);
    let (tx_tx, tx_rx) = bounded::<Vec<u8>>(depth);

    let rx_device = Arc::clone(&device);
    let rx_running = Arc::clone(&running);
    let rx_handle = thread::Builder::new()
        .name("link-rx".to_string())
        .spawn(move || receive_loop(rx_device.as_ref(), rx_tx, rx_running))
        .map_err(|_| Error::ThreadSpawn("link-rx"))?;

    let tx_handle = match thread::Builder::new()
        .name("link-tx".to_string())
        .spawn(move || transmit_loop(device.as_ref(), tx_rx))
    {
        Ok(handle) => handle,
        Err(_) => {
            running.store(false, Ordering::Relaxed);
            drop(rx_rx);
            if rx_handle.join().is_err() {
                log::error!("Link thread panicked");
            }
            return Err(Error::ThreadSpawn("link-tx"));
        }
    };

    Ok((
        DomainCrossing {
            rx: rx_rx,
            tx: tx_tx,
        },
        vec![rx_handle, tx_handle],
    ))
}

fn receive_loop<D: LinkDevice + ?Sized>(
    device: &D,
    frames: Sender<Vec<u8>>,
    running: Arc<AtomicBool>,
) {
    let mut buf = [0u8; MAX_FRAME_LEN];
    while running.load(Ordering::Relaxed) {
        match device.recv(&mut buf) {
            Ok(0) => thread::sleep(IDLE_POLL),
            Ok(nbytes) => {
                log::trace!("link-rx: {} bytes", nbytes);
                // Blocks while the stack is stalled on a full consumer
                if frames.send(buf[..nbytes].to_vec()).is_err() {
                    break;
                }
            }
            Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => thread::sleep(IDLE_POLL),
            Err(ref e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => {
                log::error!("Link receive failed: {}", e);
                break;
            }
        }
    }
    log::debug!("link-rx stopped");
}

fn transmit_loop<D: LinkDevice + ?Sized>(device: &D, frames: Receiver<Vec<u8>>) {
    for frame in frames.iter() {
        if let Err(e) = device.send(&frame) {
            // Best effort: no link-level retransmission
            log::warn!("Link transmit of {} bytes failed: {}", frame.len(), e);
        }
    }
    log::debug!("link-tx stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    #[derive(Default)]
    struct ScriptedLink {
        inbound: Mutex<VecDeque<Vec<u8>>>,
        sent: Mutex<Vec<Vec<u8>>>,
    }

    impl LinkDevice for ScriptedLink {
        fn send(&self, frame: &[u8]) -> io::Result<usize> {
            self.sent.lock().unwrap().push(frame.to_vec());
            Ok(frame.len())
        }

        fn recv(&self, buf: &mut [u8]) -> io::Result<usize> {
            match self.inbound.lock().unwrap().pop_front() {
                Some(frame) => {
                    buf[..frame.len()].copy_from_slice(&frame);
                    Ok(frame.len())
                }
                None => Err(io::ErrorKind::WouldBlock.into()),
            }
        }
    }

    #[test]
    fn test_frames_cross_both_directions() {
        let device = Arc::new(ScriptedLink::default());
        device.inbound.lock().unwrap().push_back(vec![1, 2, 3]);
        let running = Arc::new(AtomicBool::new(true));

        let (crossing, handles) =
            spawn_link(Arc::clone(&device), 4, Arc::clone(&running)).unwrap();

        let frame = crossing.rx.recv_timeout(Duration::from_secs(2)).unwrap();
        assert_eq!(frame, vec![1, 2, 3]);

        crossing.tx.send(vec![9, 9]).unwrap();
        running.store(false, Ordering::Relaxed);
        drop(crossing);
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(*device.sent.lock().unwrap(), vec![vec![9, 9]]);
    }
}
