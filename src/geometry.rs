//! Coordinate spaces shared by the detector and the overlay.
//!
//! Detector output is normalized with the origin at the bottom-left and y
//! increasing upward. The overlay draws in pixels with the origin at the
//! top-left and y increasing downward. `map` is the only place that crosses
//! between the two.

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::filter::AcceptedDetection;

/// Size of the rendering surface in pixels.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "ViewportRepr")]
pub struct ViewportGeometry {
    width: f32,
    height: f32,
}

impl ViewportGeometry {
    pub fn new(width: f32, height: f32) -> Result<Self, ConfigError> {
        if !width.is_finite() || !height.is_finite() || width < 0.0 || height < 0.0 {
            return Err(ConfigError::InvalidViewport { width, height });
        }
        Ok(Self { width, height })
    }

    pub fn width(&self) -> f32 {
        self.width
    }

    pub fn height(&self) -> f32 {
        self.height
    }

    /// Same surface after a quarter turn (device rotation).
    pub fn rotated(self) -> Self {
        Self {
            width: self.height,
            height: self.width,
        }
    }

    /// Full-surface rectangle the overlay container occupies.
    pub fn bounds(&self) -> ScreenRect {
        ScreenRect {
            x: 0.0,
            y: 0.0,
            width: self.width,
            height: self.height,
        }
    }
}

#[derive(Deserialize)]
struct ViewportRepr {
    width: f32,
    height: f32,
}

impl TryFrom<ViewportRepr> for ViewportGeometry {
    type Error = ConfigError;

    fn try_from(repr: ViewportRepr) -> Result<Self, Self::Error> {
        Self::new(repr.width, repr.height)
    }
}

/// Normalized box, bottom-left origin.
///
/// Corners are only reachable through `new`, so `min <= max` always holds on
/// both axes and mapped rects never have a negative size.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RectRepr")]
pub struct NormalizedRect {
    min_x: f32,
    min_y: f32,
    max_x: f32,
    max_y: f32,
}

#[derive(Deserialize)]
struct RectRepr {
    min_x: f32,
    min_y: f32,
    max_x: f32,
    max_y: f32,
}

impl TryFrom<RectRepr> for NormalizedRect {
    type Error = String;

    fn try_from(repr: RectRepr) -> Result<Self, Self::Error> {
        Self::new(repr.min_x, repr.min_y, repr.max_x, repr.max_y).ok_or_else(|| {
            format!(
                "invalid normalized rect ({}, {}, {}, {})",
                repr.min_x, repr.min_y, repr.max_x, repr.max_y
            )
        })
    }
}

impl NormalizedRect {
    /// Returns `None` for non-finite or inverted corners.
    pub fn new(min_x: f32, min_y: f32, max_x: f32, max_y: f32) -> Option<Self> {
        let finite = [min_x, min_y, max_x, max_y].iter().all(|v| v.is_finite());
        if !finite || min_x > max_x || min_y > max_y {
            return None;
        }
        Some(Self {
            min_x,
            min_y,
            max_x,
            max_y,
        })
    }

    /// Build from a top-left-origin normalized box (the layout most ONNX
    /// detectors emit) by flipping the vertical axis.
    pub fn from_top_left(min_x: f32, top: f32, max_x: f32, bottom: f32) -> Option<Self> {
        Self::new(min_x, 1.0 - bottom, max_x, 1.0 - top)
    }

    /// Clamp every corner into the unit square.
    pub fn clamped(self) -> Self {
        Self {
            min_x: self.min_x.clamp(0.0, 1.0),
            min_y: self.min_y.clamp(0.0, 1.0),
            max_x: self.max_x.clamp(0.0, 1.0),
            max_y: self.max_y.clamp(0.0, 1.0),
        }
    }

    pub fn min_x(&self) -> f32 {
        self.min_x
    }

    pub fn min_y(&self) -> f32 {
        self.min_y
    }

    pub fn max_x(&self) -> f32 {
        self.max_x
    }

    pub fn max_y(&self) -> f32 {
        self.max_y
    }

    pub fn width(&self) -> f32 {
        self.max_x - self.min_x
    }

    pub fn height(&self) -> f32 {
        self.max_y - self.min_y
    }

    pub fn area(&self) -> f32 {
        self.width() * self.height()
    }

    /// Intersection over union with another box in the same space.
    pub fn iou(&self, other: &Self) -> f32 {
        let ix = (self.max_x.min(other.max_x) - self.min_x.max(other.min_x)).max(0.0);
        let iy = (self.max_y.min(other.max_y) - self.min_y.max(other.min_y)).max(0.0);
        let inter = ix * iy;
        let union = self.area() + other.area() - inter;
        if union <= f32::EPSILON {
            return 0.0;
        }
        inter / union
    }
}

/// Pixel rectangle in overlay space: origin top-left, y down.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ScreenRect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl ScreenRect {
    pub fn max_x(&self) -> f32 {
        self.x + self.width
    }

    pub fn max_y(&self) -> f32 {
        self.y + self.height
    }
}

/// Pixel bounds in detector convention (origin bottom-left, y up).
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PixelBounds {
    pub min_x: f32,
    pub min_y: f32,
    pub max_x: f32,
    pub max_y: f32,
}

/// Scale a normalized box against the viewport without changing the origin.
pub fn denormalize(rect: &NormalizedRect, viewport: ViewportGeometry) -> PixelBounds {
    PixelBounds {
        min_x: rect.min_x * viewport.width,
        min_y: rect.min_y * viewport.height,
        max_x: rect.max_x * viewport.width,
        max_y: rect.max_y * viewport.height,
    }
}

/// Flip detector pixel bounds into overlay space.
pub fn flip_to_screen(bounds: PixelBounds, viewport: ViewportGeometry) -> ScreenRect {
    ScreenRect {
        x: bounds.min_x,
        y: viewport.height - bounds.max_y,
        width: bounds.max_x - bounds.min_x,
        height: bounds.max_y - bounds.min_y,
    }
}

pub fn map_rect(rect: &NormalizedRect, viewport: ViewportGeometry) -> ScreenRect {
    flip_to_screen(denormalize(rect, viewport), viewport)
}

/// Place an accepted detection on the overlay surface.
pub fn map(detection: &AcceptedDetection, viewport: ViewportGeometry) -> ScreenRect {
    map_rect(&detection.bounds, viewport)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn viewport(w: f32, h: f32) -> ViewportGeometry {
        ViewportGeometry::new(w, h).unwrap()
    }

    #[test]
    fn maps_reference_box_with_axis_flip() {
        let rect = NormalizedRect::new(0.1, 0.1, 0.3, 0.4).unwrap();
        let vp = viewport(1000.0, 2000.0);

        let bounds = denormalize(&rect, vp);
        assert_eq!(bounds.min_x, 100.0);
        assert_eq!(bounds.min_y, 200.0);
        assert_eq!(bounds.max_x, 300.0);
        assert_eq!(bounds.max_y, 800.0);

        let screen = map_rect(&rect, vp);
        assert_eq!(
            screen,
            ScreenRect {
                x: 100.0,
                y: 1200.0,
                width: 200.0,
                height: 600.0
            }
        );
    }

    #[test]
    fn y_is_viewport_height_minus_max_y() {
        let vp = viewport(640.0, 480.0);
        for (min_y, max_y) in [(0.0, 0.25), (0.25, 0.5), (0.5, 1.0), (0.0, 1.0)] {
            let rect = NormalizedRect::new(0.25, min_y, 0.75, max_y).unwrap();
            let screen = map_rect(&rect, vp);
            assert_eq!(screen.y, 480.0 - max_y * 480.0);
            assert_eq!(screen.height, (max_y - min_y) * 480.0);
            assert_eq!(screen.width, 320.0);
        }
    }

    #[test]
    fn box_touching_bottom_edge_lands_at_screen_bottom() {
        let vp = viewport(100.0, 200.0);
        let rect = NormalizedRect::new(0.0, 0.0, 0.5, 0.25).unwrap();
        let screen = map_rect(&rect, vp);
        assert_eq!(screen.y, 150.0);
        assert_eq!(screen.max_y(), 200.0);
    }

    #[test]
    fn zero_sized_viewport_maps_to_empty_rect() {
        let vp = viewport(0.0, 0.0);
        let rect = NormalizedRect::new(0.1, 0.2, 0.3, 0.4).unwrap();
        assert_eq!(map_rect(&rect, vp), ScreenRect::default());
    }

    #[test]
    fn rejects_invalid_viewport() {
        assert!(ViewportGeometry::new(-1.0, 10.0).is_err());
        assert!(ViewportGeometry::new(f32::NAN, 10.0).is_err());
        assert!(ViewportGeometry::new(10.0, f32::INFINITY).is_err());
    }

    #[test]
    fn rejects_inverted_rect() {
        assert!(NormalizedRect::new(0.5, 0.1, 0.2, 0.4).is_none());
        assert!(NormalizedRect::new(0.1, 0.1, f32::NAN, 0.4).is_none());
    }

    #[test]
    fn deserialized_rects_and_viewports_are_validated() {
        let inverted = r#"{"min_x":0.6,"min_y":0.1,"max_x":0.2,"max_y":0.4}"#;
        assert!(serde_json::from_str::<NormalizedRect>(inverted).is_err());

        let ok = r#"{"min_x":0.1,"min_y":0.1,"max_x":0.3,"max_y":0.4}"#;
        let rect: NormalizedRect = serde_json::from_str(ok).unwrap();
        assert_eq!(rect, NormalizedRect::new(0.1, 0.1, 0.3, 0.4).unwrap());
        assert!(map_rect(&rect, viewport(1000.0, 2000.0)).width > 0.0);

        assert!(serde_json::from_str::<ViewportGeometry>(r#"{"width":-5.0,"height":10.0}"#).is_err());
    }

    #[test]
    fn top_left_conversion_flips_vertical_axis() {
        let rect = NormalizedRect::from_top_left(0.25, 0.0, 0.5, 0.25).unwrap();
        assert_eq!(rect.min_y(), 0.75);
        assert_eq!(rect.max_y(), 1.0);
        // Top of the image stays at the top of the screen after mapping.
        let screen = map_rect(&rect, viewport(400.0, 400.0));
        assert_eq!(screen.y, 0.0);
        assert_eq!(screen.height, 100.0);
    }

    #[test]
    fn iou_of_identical_and_disjoint_boxes() {
        let a = NormalizedRect::new(0.0, 0.0, 0.5, 0.5).unwrap();
        let b = NormalizedRect::new(0.5, 0.5, 1.0, 1.0).unwrap();
        assert_eq!(a.iou(&a), 1.0);
        assert_eq!(a.iou(&b), 0.0);
    }

    #[test]
    fn rotation_swaps_dimensions() {
        let vp = viewport(390.0, 844.0).rotated();
        assert_eq!(vp.width(), 844.0);
        assert_eq!(vp.height(), 390.0);
    }
}
