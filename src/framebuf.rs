//! Host-side frame buffer access
//!
//! The device exposes four 4 MiB frame buffer windows starting 16 MiB into
//! its address space. Images are stored as 16-bit pixels with the bytes of
//! every 32-bit word reversed relative to the file on the host.

use crate::error::{Error, Result};
use byteorder::{BigEndian, ByteOrder, LittleEndian};
use std::io::{Read, Seek, SeekFrom, Write};

/// Device address of the first window
pub const BUFFER_BASE: u64 = 0x100_0000;
/// Size of one window
pub const BUFFER_SIZE: u64 = 0x40_0000;
/// Number of windows
pub const BUFFER_COUNT: u32 = 4;
/// Bytes per pixel of a transferred image
pub const BYTES_PER_PIXEL: usize = 2;

/// Device offset of window `index`
pub fn window_offset(index: u32) -> Result<u64> {
    if index >= BUFFER_COUNT {
        return Err(Error::WindowOutOfRange {
            index,
            max: BUFFER_COUNT - 1,
        });
    }
    Ok(BUFFER_BASE + index as u64 * BUFFER_SIZE)
}

/// Bytes in a `width` x `height` image
pub fn image_len(width: u32, height: u32) -> usize {
    width as usize * height as usize * BYTES_PER_PIXEL
}

/// Reverse the bytes of every 32-bit word in place
///
/// Applying it twice restores the input.
pub fn reverse_words(buf: &mut [u8]) -> Result<()> {
    if buf.len() % 4 != 0 {
        return Err(Error::Unaligned(buf.len()));
    }
    for word in buf.chunks_exact_mut(4) {
        let value = BigEndian::read_u32(word);
        LittleEndian::write_u32(word, value);
    }
    Ok(())
}

fn check_fits(len: usize) -> Result<()> {
    if len as u64 > BUFFER_SIZE {
        return Err(Error::InvalidParameter(format!(
            "image of {} bytes does not fit a {} byte window",
            len, BUFFER_SIZE
        )));
    }
    Ok(())
}

/// Read `len` bytes from window `index`, returned in host byte order
pub fn read_image<D: Read + Seek>(device: &mut D, index: u32, len: usize) -> Result<Vec<u8>> {
    check_fits(len)?;
    let offset = window_offset(index)?;
    device.seek(SeekFrom::Start(offset))?;

    let mut image = vec![0u8; len];
    device.read_exact(&mut image)?;
    reverse_words(&mut image)?;
    Ok(image)
}

/// Write `image` (host byte order) into window `index`
pub fn write_image<D: Write + Seek>(device: &mut D, index: u32, image: &[u8]) -> Result<()> {
    check_fits(image.len())?;
    let offset = window_offset(index)?;

    let mut words = image.to_vec();
    reverse_words(&mut words)?;
    device.seek(SeekFrom::Start(offset))?;
    device.write_all(&words)?;
    device.flush()?;
    Ok(())
}
