//! Surface geometry.
//!
//! Bounds are derived from the host content area with fractional formulas so
//! they scale on resize. All arithmetic saturates: a rectangle never has a
//! negative extent and never leaves the content area.

use serde::{Deserialize, Serialize};

/// Size of the host window's content area, in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentSize {
    pub width: u32,
    pub height: u32,
}

impl ContentSize {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

/// A rectangle relative to the host content area.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Rect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Rect {
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Whether this rectangle lies entirely within `size`.
    pub fn fits(&self, size: ContentSize) -> bool {
        u64::from(self.x) + u64::from(self.width) <= u64::from(size.width)
            && u64::from(self.y) + u64::from(self.height) <= u64::from(size.height)
    }
}

/// Layout parameters for the embedded surfaces.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Layout {
    external_width: f64,
    external_height: f64,
    overlay_width: f64,
    header_px: u32,
    footer_px: u32,
}

impl Default for Layout {
    fn default() -> Self {
        Self {
            external_width: 0.8,
            external_height: 0.8,
            overlay_width: 1.0,
            header_px: 64,
            footer_px: 64,
        }
    }
}

impl Layout {
    /// Create a layout, rejecting fractions outside `(0, 1]`.
    pub fn new(
        external_width: f64,
        external_height: f64,
        overlay_width: f64,
        header_px: u32,
        footer_px: u32,
    ) -> Result<Self, LayoutError> {
        for (field, value) in [
            ("external_width", external_width),
            ("external_height", external_height),
            ("overlay_width", overlay_width),
        ] {
            if !(value > 0.0 && value <= 1.0) {
                return Err(LayoutError::Fraction { field, value });
            }
        }

        Ok(Self {
            external_width,
            external_height,
            overlay_width,
            header_px,
            footer_px,
        })
    }

    /// The external content surface: a centered fraction of the content area.
    pub fn external_bounds(&self, size: ContentSize) -> Rect {
        let width = scale(size.width, self.external_width);
        let height = scale(size.height, self.external_height);
        Rect::new(
            (size.width - width) / 2,
            (size.height - height) / 2,
            width,
            height,
        )
    }

    /// The overlay: the band between the reserved header and footer,
    /// horizontally centered at `overlay_width`.
    pub fn overlay_bounds(&self, size: ContentSize) -> Rect {
        let y = self.header_px.min(size.height);
        let height = size
            .height
            .saturating_sub(self.header_px)
            .saturating_sub(self.footer_px);
        let width = scale(size.width, self.overlay_width);
        Rect::new((size.width - width) / 2, y, width, height)
    }
}

fn scale(extent: u32, fraction: f64) -> u32 {
    let scaled = (f64::from(extent) * fraction).round();
    (scaled as u32).min(extent)
}

/// Invalid layout parameter.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum LayoutError {
    #[error("{field} must be a fraction in (0, 1], got {value}")]
    Fraction { field: &'static str, value: f64 },
}
