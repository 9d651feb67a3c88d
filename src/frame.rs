//! Raw snapshot representation.
//!
//! A `RawFrame` is one discrete capture of the display at a point in time.
//! It borrows the source's scratch buffer, so a frame is only usable for the
//! loop iteration that captured it: the next `capture()` call reclaims the
//! buffer, and the borrow checker rejects any attempt to retain the pixels
//! past that point. Frames are encoded immediately and then discarded.

/// Bytes per pixel of the fixed capture format (RGBA, alpha ignored on encode).
pub const BYTES_PER_PIXEL: usize = 4;

/// One raw RGBA snapshot, borrowed from the capture source's scratch buffer.
#[derive(Debug)]
pub struct RawFrame<'a> {
    /// Frame width in pixels.
    pub width: u32,
    /// Frame height in pixels.
    pub height: u32,
    /// Bytes per row. At least `width * BYTES_PER_PIXEL`; rows may be padded.
    pub stride: usize,
    /// Pixel data, `stride * height` bytes.
    pub data: &'a [u8],
}

impl<'a> RawFrame<'a> {
    /// Byte length a well-formed frame of these dimensions must have.
    pub fn expected_len(&self) -> usize {
        self.stride * self.height as usize
    }

    /// One row of pixels, without any stride padding.
    ///
    /// Returns `None` when `row` is out of bounds or the buffer is short.
    pub fn row(&self, row: u32) -> Option<&'a [u8]> {
        if row >= self.height {
            return None;
        }
        let start = row as usize * self.stride;
        let end = start + self.width as usize * BYTES_PER_PIXEL;
        self.data.get(start..end)
    }
}
