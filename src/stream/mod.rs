//! Frame streaming
//!
//! Sources (frame-buffer reader, synthetic generator) produce a stream of
//! `StreamBeat`s; the packetizer cuts that stream into RTP packets. Beats
//! travel over bounded channels, and a blocked `send` is the only form of
//! flow control: a source produces its next beat only after the previous
//! one was accepted.

pub mod dma;
pub mod generator;
pub mod packetizer;

pub use dma::{DeviceMemory, DmaReader, FrameMemory};
pub use generator::FrameGenerator;
pub use packetizer::{RtpPacket, RtpPacketizer, RtpSession};

use crate::error::{Error, Result};
use crossbeam_channel::Sender;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// One transfer unit of a frame stream: a byte or a 32-bit word
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamBeat {
    data: [u8; 4],
    len: u8,
    /// Final unit of a frame
    pub last: bool,
}

impl StreamBeat {
    pub fn byte(value: u8, last: bool) -> Self {
        StreamBeat {
            data: [value, 0, 0, 0],
            len: 1,
            last,
        }
    }

    pub fn word(bytes: [u8; 4], last: bool) -> Self {
        StreamBeat {
            data: bytes,
            len: 4,
            last,
        }
    }

    /// Payload bytes in stream order
    pub fn bytes(&self) -> &[u8] {
        &self.data[..self.len as usize]
    }
}

/// Position within one frame, counted in transfer units
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamCursor {
    offset: usize,
    length: usize,
}

impl StreamCursor {
    pub fn new(length: usize) -> Result<Self> {
        if length == 0 {
            return Err(Error::InvalidParameter("empty frame".to_string()));
        }
        Ok(StreamCursor { offset: 0, length })
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn length(&self) -> usize {
        self.length
    }

    /// The current unit is the last of the frame
    pub fn is_last(&self) -> bool {
        self.offset == self.length - 1
    }

    /// Step past the current unit; returns true when the frame wrapped
    pub fn advance(&mut self) -> bool {
        if self.is_last() {
            self.offset = 0;
            true
        } else {
            self.offset += 1;
            false
        }
    }
}

/// A producer of frame beats
pub trait StreamSource: Send {
    fn next_beat(&mut self) -> Result<StreamBeat>;
}

/// Drive `source` into `beats` until stopped or the consumer hangs up
pub fn run_source<S: StreamSource + ?Sized>(
    source: &mut S,
    beats: Sender<StreamBeat>,
    running: Arc<AtomicBool>,
) -> Result<()> {
    let mut frames = 0u64;
    while running.load(Ordering::Relaxed) {
        let beat = source.next_beat()?;
        if beats.send(beat).is_err() {
            break;
        }
        if beat.last {
            frames += 1;
            log::trace!("Source finished frame {}", frames);
        }
    }
    log::debug!("Source stopped after {} frames", frames);
    Ok(())
}
