//! Frame buffer reader
//!
//! Walks one frame of memory a 32-bit word at a time, starting at a base
//! address, and wraps back to the base after the last word so the same
//! buffer is streamed continuously.

use crate::config::WordOrder;
use crate::error::{Error, Result};
use crate::stream::{StreamBeat, StreamCursor, StreamSource};
use byteorder::{BigEndian, ByteOrder, LittleEndian};
use std::fs::{File, OpenOptions};
use std::io;
use std::os::unix::fs::FileExt;
use std::path::Path;

pub const WORD_LEN: usize = 4;

/// Word-addressable memory a frame is read from
pub trait FrameMemory: Send {
    fn read_word(&mut self, address: u64) -> io::Result<[u8; WORD_LEN]>;
}

impl FrameMemory for Vec<u8> {
    fn read_word(&mut self, address: u64) -> io::Result<[u8; WORD_LEN]> {
        let start = usize::try_from(address)
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "address out of range"))?;
        let bytes = start
            .checked_add(WORD_LEN)
            .and_then(|end| self.get(start..end))
            .ok_or_else(|| io::Error::from(io::ErrorKind::UnexpectedEof))?;
        let mut word = [0u8; WORD_LEN];
        word.copy_from_slice(bytes);
        Ok(word)
    }
}

/// Bytes fetched from the device per positioned read
pub const DEVICE_BLOCK_LEN: usize = 4096;

/// Frame memory behind a device file
///
/// Sequential words are served from a block buffer filled with one
/// positioned read. Any non-sequential address, such as the jump back to
/// the base after a frame, refills the buffer so a new pass sees fresh
/// memory.
#[derive(Debug)]
pub struct DeviceMemory {
    file: File,
    block: Vec<u8>,
    /// Device address of `block[0]`
    block_start: u64,
    /// Offset of the next sequential word within `block`
    position: usize,
    blocks_read: u64,
}

impl DeviceMemory {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = OpenOptions::new().read(true).open(path)?;
        Ok(DeviceMemory {
            file,
            block: Vec::with_capacity(DEVICE_BLOCK_LEN),
            block_start: 0,
            position: 0,
            blocks_read: 0,
        })
    }

    /// Positioned reads issued so far
    pub fn blocks_read(&self) -> u64 {
        self.blocks_read
    }

    fn fill(&mut self, address: u64) -> io::Result<()> {
        self.block.resize(DEVICE_BLOCK_LEN, 0);
        let mut filled = 0;
        while filled < DEVICE_BLOCK_LEN {
            match self.file.read_at(&mut self.block[filled..], address + filled as u64) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => {
                    self.block.clear();
                    return Err(e);
                }
            }
        }
        self.blocks_read += 1;
        self.block.truncate(filled - filled % WORD_LEN);
        self.block_start = address;
        self.position = 0;
        if self.block.is_empty() {
            return Err(io::Error::from(io::ErrorKind::UnexpectedEof));
        }
        Ok(())
    }
}

impl FrameMemory for DeviceMemory {
    fn read_word(&mut self, address: u64) -> io::Result<[u8; WORD_LEN]> {
        let sequential = address == self.block_start + self.position as u64
            && self.position + WORD_LEN <= self.block.len();
        if !sequential {
            self.fill(address)?;
        }
        let mut word = [0u8; WORD_LEN];
        word.copy_from_slice(&self.block[self.position..self.position + WORD_LEN]);
        self.position += WORD_LEN;
        Ok(word)
    }
}

pub struct DmaReader<M: FrameMemory> {
    memory: M,
    word_order: WordOrder,
    base_address: u64,
    cursor: Option<StreamCursor>,
}

impl<M: FrameMemory> DmaReader<M> {
    pub fn new(memory: M, word_order: WordOrder) -> Self {
        DmaReader {
            memory,
            word_order,
            base_address: 0,
            cursor: None,
        }
    }

    /// Point the reader at a frame; may be called again to restart
    pub fn start(&mut self, base_address: u64, frame_byte_length: usize) -> Result<()> {
        if frame_byte_length % WORD_LEN != 0 {
            return Err(Error::Unaligned(frame_byte_length));
        }
        self.cursor = Some(StreamCursor::new(frame_byte_length / WORD_LEN)?);
        self.base_address = base_address;
        log::debug!(
            "DMA reader started at {:#x}, {} bytes per frame",
            base_address,
            frame_byte_length
        );
        Ok(())
    }

    pub fn cursor(&self) -> Option<&StreamCursor> {
        self.cursor.as_ref()
    }

    /// Read the word under the cursor and advance
    pub fn step(&mut self) -> Result<StreamBeat> {
        let cursor = self
            .cursor
            .as_mut()
            .ok_or_else(|| Error::InvalidParameter("DMA reader not started".to_string()))?;

        let address = self.base_address + (cursor.offset() * WORD_LEN) as u64;
        let raw = self.memory.read_word(address)?;
        let word = match self.word_order {
            WordOrder::Swapped => {
                let mut word = [0u8; WORD_LEN];
                BigEndian::write_u32(&mut word, LittleEndian::read_u32(&raw));
                word
            }
            WordOrder::Native => raw,
        };

        let last = cursor.is_last();
        cursor.advance();
        Ok(StreamBeat::word(word, last))
    }
}

impl<M: FrameMemory> StreamSource for DmaReader<M> {
    fn next_beat(&mut self) -> Result<StreamBeat> {
        self.step()
    }
}
