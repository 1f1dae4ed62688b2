//! Frame sources.
//!
//! Camera drivers live outside this crate. A source only has to hand the
//! pipeline `(Frame, ViewportGeometry)` pairs, as fast as it likes: the
//! controller drops whatever it cannot process.
//!
//! - Synthetic source (`stub://` URLs) for demos and tests
//!
//! Sources MUST NOT:
//! - Block on the render context
//! - Retain frames beyond handoff to the controller

use anyhow::Result;

pub mod synthetic;

pub use synthetic::{SyntheticConfig, SyntheticSource};

use crate::frame::Frame;
use crate::geometry::ViewportGeometry;

/// One captured frame plus the surface geometry at capture time.
#[derive(Clone, Debug)]
pub struct SourceFrame {
    pub frame: Frame,
    pub viewport: ViewportGeometry,
}

/// Statistics for a frame source.
#[derive(Clone, Debug)]
pub struct SourceStats {
    pub frames_captured: u64,
    pub url: String,
}

/// Anything that yields frames for the pipeline.
pub trait FrameSource: Send {
    fn connect(&mut self) -> Result<()>;

    /// Capture the next frame.
    fn next_frame(&mut self) -> Result<SourceFrame>;

    fn is_healthy(&self) -> bool;

    fn stats(&self) -> SourceStats;
}
