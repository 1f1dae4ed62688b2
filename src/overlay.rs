//! Overlay layer reconciliation.
//!
//! `OverlayRenderer` owns the only copy of the current layer set. Each
//! `render` builds a complete replacement set and swaps it in whole, so a
//! surface never observes layers from two different frames at once. There is
//! no cross-frame identity: every layer is rebuilt every time.
//!
//! The renderer must only be driven from the render context. The pipeline
//! keeps it inside [`RenderContext`](crate::RenderContext) for that reason.

use serde::Serialize;

use crate::filter::AcceptedDetection;
use crate::geometry::{self, ScreenRect, ViewportGeometry};

/// One visual element drawn over the video feed.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum OverlayLayer {
    /// Bordered rectangle around a detection.
    Box {
        frame: ScreenRect,
        border_width: f32,
        corner_radius: f32,
    },
    /// Text badge naming the detection.
    Label {
        frame: ScreenRect,
        text: String,
        font_size: f32,
    },
}

impl OverlayLayer {
    pub fn frame(&self) -> ScreenRect {
        match self {
            OverlayLayer::Box { frame, .. } | OverlayLayer::Label { frame, .. } => *frame,
        }
    }

    pub fn is_box(&self) -> bool {
        matches!(self, OverlayLayer::Box { .. })
    }

    pub fn text(&self) -> Option<&str> {
        match self {
            OverlayLayer::Label { text, .. } => Some(text),
            OverlayLayer::Box { .. } => None,
        }
    }
}

/// Fixed visual parameters for box and label layers.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct OverlayStyle {
    pub border_width: f32,
    pub corner_radius: f32,
    pub label_width: f32,
    pub label_height: f32,
    /// Downward shift of the label from the box's top edge.
    pub label_offset: f32,
    pub font_size: f32,
}

impl Default for OverlayStyle {
    fn default() -> Self {
        Self {
            border_width: 3.0,
            corner_radius: 4.0,
            label_width: 200.0,
            label_height: 18.0,
            label_offset: 10.0,
            font_size: 12.0,
        }
    }
}

/// Destination for overlay commands. The core never composites; it only
/// tells the surface which layers to draw and how large the container is.
pub trait OverlaySurface {
    /// Reposition the overlay container.
    fn set_bounds(&mut self, bounds: ScreenRect);

    /// Replace the entire layer set.
    fn replace_layers(&mut self, layers: &[OverlayLayer]);
}

/// Surface that discards every command. Useful when only the renderer's own
/// layer set is inspected.
#[derive(Clone, Copy, Debug, Default)]
pub struct NullSurface;

impl OverlaySurface for NullSurface {
    fn set_bounds(&mut self, _bounds: ScreenRect) {}

    fn replace_layers(&mut self, _layers: &[OverlayLayer]) {}
}

/// Owner of the current frame's overlay layers.
pub struct OverlayRenderer<S: OverlaySurface = NullSurface> {
    surface: S,
    style: OverlayStyle,
    viewport: ViewportGeometry,
    layers: Vec<OverlayLayer>,
    renders: u64,
}

impl<S: OverlaySurface> OverlayRenderer<S> {
    pub fn new(mut surface: S, viewport: ViewportGeometry, style: OverlayStyle) -> Self {
        surface.set_bounds(viewport.bounds());
        Self {
            surface,
            style,
            viewport,
            layers: Vec::new(),
            renders: 0,
        }
    }

    /// Discard the previous layers and draw one box and one label per detection.
    pub fn render(&mut self, detections: &[AcceptedDetection], viewport: ViewportGeometry) {
        if viewport != self.viewport {
            self.resize(viewport);
        }
        let mut next = Vec::with_capacity(detections.len() * 2);
        for detection in detections {
            let rect = geometry::map(detection, viewport);
            next.push(OverlayLayer::Box {
                frame: rect,
                border_width: self.style.border_width,
                corner_radius: self.style.corner_radius,
            });
            next.push(OverlayLayer::Label {
                frame: self.label_frame(rect),
                text: detection.label.clone(),
                font_size: self.style.font_size,
            });
        }
        self.layers = next;
        self.renders += 1;
        self.surface.replace_layers(&self.layers);
    }

    /// Reposition the overlay container without waiting for new detections.
    pub fn resize(&mut self, viewport: ViewportGeometry) {
        self.viewport = viewport;
        self.surface.set_bounds(viewport.bounds());
    }

    /// Label badge anchored at the box's left edge, just below its top.
    fn label_frame(&self, rect: ScreenRect) -> ScreenRect {
        ScreenRect {
            x: rect.x,
            y: rect.y + self.style.label_offset,
            width: self.style.label_width,
            height: self.style.label_height,
        }
    }

    pub fn layers(&self) -> &[OverlayLayer] {
        &self.layers
    }

    pub fn box_count(&self) -> usize {
        self.layers.iter().filter(|l| l.is_box()).count()
    }

    pub fn viewport(&self) -> ViewportGeometry {
        self.viewport
    }

    /// Number of completed `render` calls.
    pub fn renders(&self) -> u64 {
        self.renders
    }

    pub fn surface(&self) -> &S {
        &self.surface
    }

    pub fn surface_mut(&mut self) -> &mut S {
        &mut self.surface
    }
}
