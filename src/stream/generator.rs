//! Synthetic frame source
//!
//! Produces a frame-sized byte stream where every byte of a frame holds the
//! same value, and the value moves up by `PATTERN_STEP` from one frame to
//! the next. Used to exercise the network path without a frame buffer.

use crate::error::{Error, Result};
use crate::stream::{StreamBeat, StreamCursor, StreamSource};

/// Pattern increment per frame
pub const PATTERN_STEP: u8 = 16;

#[derive(Debug, Default)]
pub struct FrameGenerator {
    cursor: Option<StreamCursor>,
    value: u8,
    frames: u64,
}

impl FrameGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    /// (Re)start with the given geometry; the pattern restarts at zero
    pub fn start(&mut self, width: u32, height: u32, bytes_per_pixel: u32) -> Result<()> {
        let frame_bytes = width as usize * height as usize * bytes_per_pixel as usize;
        if frame_bytes == 0 {
            return Err(Error::InvalidParameter(format!(
                "empty frame {}x{}x{}",
                width, height, bytes_per_pixel
            )));
        }
        self.cursor = Some(StreamCursor::new(frame_bytes)?);
        self.value = 0;
        self.frames = 0;
        Ok(())
    }

    /// Frames completed since the last start
    pub fn frames(&self) -> u64 {
        self.frames
    }

    pub fn step(&mut self) -> Result<StreamBeat> {
        let cursor = self
            .cursor
            .as_mut()
            .ok_or_else(|| Error::InvalidParameter("generator not started".to_string()))?;

        let beat = StreamBeat::byte(self.value, cursor.is_last());
        if cursor.advance() {
            self.value = self.value.wrapping_add(PATTERN_STEP);
            self.frames += 1;
        }
        Ok(beat)
    }
}

impl StreamSource for FrameGenerator {
    fn next_beat(&mut self) -> Result<StreamBeat> {
        self.step()
    }
}
