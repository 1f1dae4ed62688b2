#![cfg(feature = "raster")]

//! Software overlay surface backed by an RGBA image.

use std::path::Path;

use anyhow::{Context, Result};
use image::{Rgba, RgbaImage};

use crate::geometry::ScreenRect;
use crate::overlay::{OverlayLayer, OverlaySurface};

const BOX_COLOR: Rgba<u8> = Rgba([0, 0, 0, 255]);
const LABEL_BACKGROUND: Rgba<u8> = Rgba([255, 255, 255, 255]);

/// Draws box borders and label backgrounds onto a transparent canvas sized
/// to the overlay bounds. Text glyphs are not rasterized.
pub struct ImageSurface {
    image: RgbaImage,
    layers: Vec<OverlayLayer>,
}

impl ImageSurface {
    pub fn new() -> Self {
        Self {
            image: RgbaImage::new(0, 0),
            layers: Vec::new(),
        }
    }

    pub fn image(&self) -> &RgbaImage {
        &self.image
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        self.image
            .save(path)
            .with_context(|| format!("failed to write overlay snapshot {}", path.display()))
    }

    fn redraw(&mut self) {
        for px in self.image.pixels_mut() {
            *px = Rgba([0, 0, 0, 0]);
        }
        for layer in &self.layers {
            match layer {
                OverlayLayer::Box {
                    frame,
                    border_width,
                    ..
                } => {
                    let thickness = border_width.round().max(1.0) as u32;
                    if let Some(px) = to_pixels(frame, &self.image) {
                        draw_rect(&mut self.image, px, BOX_COLOR, thickness);
                    }
                }
                OverlayLayer::Label { frame, .. } => {
                    if let Some(px) = to_pixels(frame, &self.image) {
                        fill_rect(&mut self.image, px, LABEL_BACKGROUND);
                    }
                }
            }
        }
    }
}

impl Default for ImageSurface {
    fn default() -> Self {
        Self::new()
    }
}

impl OverlaySurface for ImageSurface {
    fn set_bounds(&mut self, bounds: ScreenRect) {
        let w = bounds.width.round().max(0.0) as u32;
        let h = bounds.height.round().max(0.0) as u32;
        if self.image.dimensions() != (w, h) {
            self.image = RgbaImage::new(w, h);
        }
        self.redraw();
    }

    fn replace_layers(&mut self, layers: &[OverlayLayer]) {
        self.layers = layers.to_vec();
        self.redraw();
    }
}

/// Clip a screen rect to inclusive pixel bounds `[x0, y0, x1, y1]`.
fn to_pixels(rect: &ScreenRect, img: &RgbaImage) -> Option<[u32; 4]> {
    let (w, h) = img.dimensions();
    if w == 0 || h == 0 || rect.width <= 0.0 || rect.height <= 0.0 {
        return None;
    }
    let clamp = |v: f32, max: u32| -> u32 { v.max(0.0).min((max - 1) as f32) as u32 };
    let x0 = clamp(rect.x, w);
    let y0 = clamp(rect.y, h);
    let x1 = clamp(rect.max_x() - 1.0, w);
    let y1 = clamp(rect.max_y() - 1.0, h);
    if rect.x >= w as f32 || rect.y >= h as f32 || x0 > x1 || y0 > y1 {
        return None;
    }
    Some([x0, y0, x1, y1])
}

/// Draw a rectangle border with given thickness.
fn draw_rect(img: &mut RgbaImage, bbox_px: [u32; 4], color: Rgba<u8>, thickness: u32) {
    let [x0, y0, x1, y1] = bbox_px;
    for t in 0..thickness {
        let xx0 = x0.saturating_add(t);
        let yy0 = y0.saturating_add(t);
        let xx1 = x1.saturating_sub(t);
        let yy1 = y1.saturating_sub(t);
        if xx0 > xx1 || yy0 > yy1 {
            break;
        }
        for x in xx0..=xx1 {
            img.put_pixel(x, yy0, color);
            img.put_pixel(x, yy1, color);
        }
        for y in yy0..=yy1 {
            img.put_pixel(xx0, y, color);
            img.put_pixel(xx1, y, color);
        }
    }
}

fn fill_rect(img: &mut RgbaImage, bbox_px: [u32; 4], color: Rgba<u8>) {
    let [x0, y0, x1, y1] = bbox_px;
    for y in y0..=y1 {
        for x in x0..=x1 {
            img.put_pixel(x, y, color);
        }
    }
}
