//! Video frames.

use std::sync::Arc;

use glimpse_common::error::{GlimpseError, GlimpseResult};

/// Bytes per pixel of the RGBA layout every frame uses.
pub const BYTES_PER_PIXEL: usize = 4;

/// A single RGBA video frame.
///
/// Pixel storage is shared, so cloning a frame to hand it to several
/// consumers does not copy the image.
#[derive(Debug, Clone)]
pub struct VideoFrame {
    width: u32,
    height: u32,
    /// Presentation timestamp relative to the producing stream's epoch.
    timestamp_ns: u64,
    data: Arc<[u8]>,
}

impl VideoFrame {
    /// Create a frame from tightly packed RGBA rows.
    pub fn new(width: u32, height: u32, timestamp_ns: u64, data: Vec<u8>) -> GlimpseResult<Self> {
        let expected = frame_len(width, height);
        if data.len() != expected {
            return Err(GlimpseError::media(format!(
                "Frame {width}x{height} needs {expected} bytes, got {}",
                data.len()
            )));
        }
        Ok(Self {
            width,
            height,
            timestamp_ns,
            data: data.into(),
        })
    }

    /// A frame filled with a single colour.
    pub fn solid(width: u32, height: u32, timestamp_ns: u64, rgba: [u8; 4]) -> Self {
        let data: Vec<u8> = rgba
            .iter()
            .copied()
            .cycle()
            .take(frame_len(width, height))
            .collect();
        Self {
            width,
            height,
            timestamp_ns,
            data: data.into(),
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn timestamp_ns(&self) -> u64 {
        self.timestamp_ns
    }

    /// Packed RGBA pixels, `width * 4` bytes per row.
    pub fn pixels(&self) -> &[u8] {
        &self.data
    }

    /// Row `y` of the frame.
    pub fn row(&self, y: u32) -> &[u8] {
        let stride = self.width as usize * BYTES_PER_PIXEL;
        let start = y as usize * stride;
        &self.data[start..start + stride]
    }

    /// Release this handle's share of the pixel buffer.
    pub fn close(self) {
        drop(self);
    }
}

/// Byte length of a packed RGBA frame.
pub fn frame_len(width: u32, height: u32) -> usize {
    width as usize * height as usize * BYTES_PER_PIXEL
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_mismatched_buffer() {
        let err = VideoFrame::new(2, 2, 0, vec![0; 15]).unwrap_err();
        assert!(err.to_string().contains("needs 16 bytes"));
    }

    #[test]
    fn solid_frame_repeats_colour() {
        let frame = VideoFrame::solid(3, 2, 42, [1, 2, 3, 255]);
        assert_eq!(frame.pixels().len(), 24);
        assert_eq!(frame.row(1), &[1, 2, 3, 255, 1, 2, 3, 255, 1, 2, 3, 255]);
        assert_eq!(frame.timestamp_ns(), 42);
    }
}
