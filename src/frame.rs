//! Frame container handed from the capture context to the inference worker.
//!
//! - `Frame`: immutable RGB8 pixel buffer plus dimensions, capture instant and
//!   sequence number. Cloning a frame shares the buffer; nothing can mutate it.
//!
//! A frame lives for one inference round-trip. The controller drops its copy
//! after dispatch; the backend may hold its own clone while inference runs.

use anyhow::{anyhow, Result};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Bytes per pixel for the only supported layout (packed RGB8).
pub const RGB_CHANNELS: usize = 3;

/// Immutable captured frame.
#[derive(Clone)]
pub struct Frame {
    /// Shared pixel data. There is no mutable accessor.
    data: Arc<[u8]>,

    pub width: u32,
    pub height: u32,

    /// Monotonic position in the source stream.
    pub sequence: u64,

    /// Acquisition instant, used for latency reporting only.
    captured_at: Instant,
}

impl Frame {
    /// Wrap a packed RGB8 buffer. Fails when the length does not match the dimensions.
    pub fn rgb(data: Vec<u8>, width: u32, height: u32, sequence: u64) -> Result<Self> {
        let expected = expected_rgb_len(width, height)?;
        if data.len() != expected {
            return Err(anyhow!(
                "frame {} expected {} RGB bytes for {}x{}, received {}",
                sequence,
                expected,
                width,
                height,
                data.len()
            ));
        }
        Ok(Self {
            data: data.into(),
            width,
            height,
            sequence,
            captured_at: Instant::now(),
        })
    }

    /// Read-only pixel access for detector backends.
    pub fn pixels(&self) -> &[u8] {
        &self.data
    }

    /// RGB triple at `(x, y)` with the origin at the top-left of the image.
    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 3]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let idx = (y as usize * self.width as usize + x as usize) * RGB_CHANNELS;
        Some([self.data[idx], self.data[idx + 1], self.data[idx + 2]])
    }

    pub fn captured_at(&self) -> Instant {
        self.captured_at
    }

    /// Time elapsed since acquisition.
    pub fn age(&self) -> Duration {
        self.captured_at.elapsed()
    }

    pub fn byte_len(&self) -> usize {
        self.data.len()
    }
}

impl std::fmt::Debug for Frame {
    // Pixel content is never formatted.
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Frame")
            .field("sequence", &self.sequence)
            .field("width", &self.width)
            .field("height", &self.height)
            .field("bytes", &self.data.len())
            .finish()
    }
}

pub(crate) fn expected_rgb_len(width: u32, height: u32) -> Result<usize> {
    (width as usize)
        .checked_mul(height as usize)
        .and_then(|v| v.checked_mul(RGB_CHANNELS))
        .ok_or_else(|| anyhow!("frame dimensions {}x{} overflow", width, height))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_mismatched_buffer() {
        let err = Frame::rgb(vec![0u8; 10], 4, 4, 1).unwrap_err();
        assert!(err.to_string().contains("expected 48 RGB bytes"));
    }

    #[test]
    fn clones_share_pixels() {
        let frame = Frame::rgb(vec![7u8; 2 * 2 * 3], 2, 2, 9).unwrap();
        let held_by_detector = frame.clone();
        drop(frame);
        assert_eq!(held_by_detector.pixels().len(), 12);
        assert_eq!(held_by_detector.sequence, 9);
    }

    #[test]
    fn pixel_lookup_is_row_major_top_left() {
        let mut data = vec![0u8; 3 * 2 * 3];
        // (x=2, y=1) -> index (1 * 3 + 2) * 3 = 15
        data[15] = 200;
        data[16] = 100;
        data[17] = 50;
        let frame = Frame::rgb(data, 3, 2, 0).unwrap();
        assert_eq!(frame.pixel(2, 1), Some([200, 100, 50]));
        assert_eq!(frame.pixel(3, 0), None);
    }

    #[test]
    fn debug_omits_pixels() {
        let frame = Frame::rgb(vec![1u8; 3], 1, 1, 4).unwrap();
        let rendered = format!("{:?}", frame);
        assert!(rendered.contains("sequence: 4"));
        assert!(!rendered.contains("data"));
    }
}
