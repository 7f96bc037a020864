//! Visible tile computation.
//!
//! The canvas footprint is mapped back into level-image space through the
//! inverse transform, intersected with the image, and snapped outward to tile
//! boundaries. The resulting rectangle drives both the render pass (which tiles
//! to draw or request) and cache eviction (which tiles to keep).

use serde::Serialize;

use crate::pyramid::ZoomLevel;

use super::viewport::Viewport;

/// Integer rectangle of tile indices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct TileRect {
    /// First tile column
    pub x: u32,

    /// First tile row
    pub y: u32,

    /// Number of tile columns
    pub width: u32,

    /// Number of tile rows
    pub height: u32,
}

impl TileRect {
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Whether the tile `(x, y)` lies inside the rectangle.
    pub fn contains(&self, x: u32, y: u32) -> bool {
        x >= self.x && x < self.x + self.width && y >= self.y && y < self.y + self.height
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Number of tiles covered.
    pub fn len(&self) -> usize {
        self.width as usize * self.height as usize
    }

    /// Tiles in row-major order.
    pub fn iter(&self) -> impl Iterator<Item = (u32, u32)> {
        let rect = *self;
        (rect.y..rect.y + rect.height)
            .flat_map(move |y| (rect.x..rect.x + rect.width).map(move |x| (x, y)))
    }
}

/// Tiles of `level` intersecting the canvas for the current transform.
///
/// The rectangle is clamped to the level's tile grid; when the image is
/// entirely off-canvas it is empty.
pub fn visible_tiles(viewport: &Viewport, level: &ZoomLevel, tile_size: u32) -> TileRect {
    if viewport.scale <= 0.0 || tile_size == 0 {
        return TileRect::default();
    }

    let image_w = level.image_width as f64;
    let image_h = level.image_height as f64;
    let tile = tile_size as f64;

    let x0 = (-viewport.offset.x / viewport.scale).max(0.0);
    let y0 = (-viewport.offset.y / viewport.scale).max(0.0);
    let x1 = (x0 + (viewport.width / viewport.scale).min(image_w)).min(image_w);
    let y1 = (y0 + (viewport.height / viewport.scale).min(image_h)).min(image_h);

    // Canvas lies completely to the right of / below the image
    if x0 >= image_w || y0 >= image_h || x1 <= x0 || y1 <= y0 {
        return TileRect::default();
    }

    let tile_x = (x0 / tile).floor() as u32;
    let tile_y = (y0 / tile).floor() as u32;
    let end_x = ((x1 / tile).ceil() as u32).min(level.tiles_x);
    let end_y = ((y1 / tile).ceil() as u32).min(level.tiles_y);

    TileRect::new(
        tile_x,
        tile_y,
        end_x.saturating_sub(tile_x),
        end_y.saturating_sub(tile_y),
    )
}
