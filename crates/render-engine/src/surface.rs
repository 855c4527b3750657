//! Off-screen RGBA drawing surface.

use glimpse_common::error::GlimpseResult;
use glimpse_media_model::{frame_len, VideoFrame, BYTES_PER_PIXEL};

/// An off-screen surface frames are drawn onto.
///
/// The surface follows the size of the frames drawn on it: a frame with
/// different dimensions resizes (and clears) the surface first, so a frame
/// is never clipped or down-sampled.
#[derive(Debug, Default)]
pub struct Surface {
    width: u32,
    height: u32,
    pixels: Vec<u8>,
}

impl Surface {
    /// An empty 0x0 surface.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    /// Resize to `width` x `height`. Contents are cleared to transparent.
    pub fn resize(&mut self, width: u32, height: u32) {
        self.width = width;
        self.height = height;
        self.pixels.clear();
        self.pixels.resize(frame_len(width, height), 0);
    }

    /// Draw `frame` at (0, 0). Returns true if the surface was resized.
    pub fn draw(&mut self, frame: &VideoFrame) -> bool {
        let resized = frame.dimensions() != self.dimensions();
        if resized {
            self.resize(frame.width(), frame.height());
        }

        let cols = frame.width().min(self.width) as usize * BYTES_PER_PIXEL;
        let stride = self.width as usize * BYTES_PER_PIXEL;
        for y in 0..frame.height().min(self.height) {
            let dst = y as usize * stride;
            self.pixels[dst..dst + cols].copy_from_slice(&frame.row(y)[..cols]);
        }
        resized
    }

    /// Copy the surface out as a frame. `None` while nothing has been drawn.
    pub fn snapshot(&self, timestamp_ns: u64) -> GlimpseResult<Option<VideoFrame>> {
        if self.is_empty() {
            return Ok(None);
        }
        VideoFrame::new(self.width, self.height, timestamp_ns, self.pixels.clone()).map(Some)
    }
}
