//! Synthetic frame source for `stub://` URLs.
//!
//! Renders a bright square sliding across a dark background, which the stub
//! detector backend picks up as a single object. Optional sensor noise and
//! periodic viewport rotation exercise the filter and resize paths.

use anyhow::{anyhow, Result};
use rand::Rng;

use super::{FrameSource, SourceFrame, SourceStats};
use crate::frame::{expected_rgb_len, Frame, RGB_CHANNELS};
use crate::geometry::ViewportGeometry;

const BACKGROUND: u8 = 16;
const FOREGROUND: u8 = 250;

/// Configuration for a synthetic source.
#[derive(Clone, Debug)]
pub struct SyntheticConfig {
    /// Must start with `stub://`.
    pub url: String,
    pub width: u32,
    pub height: u32,
    /// Edge of the moving square in pixels.
    pub square: u32,
    /// Horizontal pixels moved per frame.
    pub speed: u32,
    /// Maximum amplitude of per-pixel noise added to the background.
    pub noise: u8,
    pub viewport: ViewportGeometry,
    /// Swap viewport width and height every N frames. Zero disables rotation.
    pub rotate_every: u64,
}

impl SyntheticConfig {
    pub fn new(url: &str, width: u32, height: u32, viewport: ViewportGeometry) -> Self {
        Self {
            url: url.to_string(),
            width,
            height,
            square: (width.min(height) / 4).max(1),
            speed: (width / 32).max(1),
            noise: 0,
            viewport,
            rotate_every: 0,
        }
    }
}

/// Synthetic moving-square source.
pub struct SyntheticSource {
    config: SyntheticConfig,
    viewport: ViewportGeometry,
    frame_count: u64,
    connected: bool,
}

impl SyntheticSource {
    pub fn new(config: SyntheticConfig) -> Result<Self> {
        if !config.url.starts_with("stub://") {
            return Err(anyhow!(
                "synthetic source requires a stub:// url, got {}",
                config.url
            ));
        }
        if config.width == 0 || config.height == 0 {
            return Err(anyhow!("synthetic source dimensions must be non-zero"));
        }
        expected_rgb_len(config.width, config.height)?;
        Ok(Self {
            viewport: config.viewport,
            config,
            frame_count: 0,
            connected: false,
        })
    }

    /// Top-left corner of the square for the current frame.
    fn square_origin(&self) -> (u32, u32) {
        let span = self.config.width.saturating_sub(self.config.square).max(1);
        let x = ((self.frame_count * self.config.speed as u64) % span as u64) as u32;
        let y = (self.config.height.saturating_sub(self.config.square)) / 2;
        (x, y)
    }

    fn generate_pixels(&self) -> Vec<u8> {
        let (w, h) = (self.config.width as usize, self.config.height as usize);
        let mut pixels = vec![BACKGROUND; w * h * RGB_CHANNELS];
        if self.config.noise > 0 {
            let mut rng = rand::thread_rng();
            for p in pixels.iter_mut() {
                *p = p.saturating_add(rng.gen_range(0..=self.config.noise));
            }
        }

        let (x0, y0) = self.square_origin();
        let x1 = (x0 + self.config.square).min(self.config.width) as usize;
        let y1 = (y0 + self.config.square).min(self.config.height) as usize;
        for y in y0 as usize..y1 {
            let row = y * w * RGB_CHANNELS;
            pixels[row + x0 as usize * RGB_CHANNELS..row + x1 * RGB_CHANNELS].fill(FOREGROUND);
        }
        pixels
    }
}

impl FrameSource for SyntheticSource {
    fn connect(&mut self) -> Result<()> {
        self.connected = true;
        log::info!(
            "SyntheticSource: connected to {} ({}x{})",
            self.config.url,
            self.config.width,
            self.config.height
        );
        Ok(())
    }

    fn next_frame(&mut self) -> Result<SourceFrame> {
        if !self.connected {
            return Err(anyhow!("source {} not connected", self.config.url));
        }
        self.frame_count += 1;
        if self.config.rotate_every > 0 && self.frame_count % self.config.rotate_every == 0 {
            self.viewport = self.viewport.rotated();
            log::debug!(
                "SyntheticSource: viewport rotated to {}x{}",
                self.viewport.width(),
                self.viewport.height()
            );
        }
        let frame = Frame::rgb(
            self.generate_pixels(),
            self.config.width,
            self.config.height,
            self.frame_count,
        )?;
        Ok(SourceFrame {
            frame,
            viewport: self.viewport,
        })
    }

    fn is_healthy(&self) -> bool {
        self.connected
    }

    fn stats(&self) -> SourceStats {
        SourceStats {
            frames_captured: self.frame_count,
            url: self.config.url.clone(),
        }
    }
}
