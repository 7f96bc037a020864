//! Zoomify tile pyramid.
//!
//! A Zoomify tile set stores one raster per zoom level. Levels are derived
//! purely from the full-resolution dimensions and the tile size: starting at
//! full resolution, both dimensions are halved (floor division) until the image
//! fits in a single tile. The resulting sequence is stored coarsest-first:
//!
//! ```text
//! level 0      250 x 187     1 tile       (thumbnail)
//! level 1      500 x 375     2 x 2 tiles
//! level 2     1000 x 750     4 x 3 tiles
//! level 3     2000 x 1500    8 x 6 tiles
//! level 4     4000 x 3000   16 x 12 tiles  (full resolution)
//! ```
//!
//! # Tile Groups
//!
//! Tiles are stored in `TileGroup{n}` folders holding at most 256 files each.
//! Group ids are assigned by a single counter walking every level from
//! coarsest to finest, row-major within a level, and never reset between
//! levels. Each level only records where the counter stood when the level
//! began; [`ZoomLevel::tile_group`] derives the id from that.

mod properties;

use serde::Serialize;
use tracing::debug;

use crate::error::MetadataError;

pub use properties::{parse_image_properties, ImageProperties};

/// Number of tiles stored per `TileGroup` folder.
pub const TILES_PER_GROUP: usize = 256;

// =============================================================================
// ZoomLevel
// =============================================================================

/// One discrete resolution tier of the pyramid.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ZoomLevel {
    /// Level number (0 = coarsest)
    pub level: usize,

    /// Image width at this level in pixels
    pub image_width: u32,

    /// Image height at this level in pixels
    pub image_height: u32,

    /// Number of tile columns
    pub tiles_x: u32,

    /// Number of tile rows
    pub tiles_y: u32,

    /// Running tile counter at this level's first tile
    #[serde(skip)]
    first_tile: usize,
}

impl ZoomLevel {
    fn new(image_width: u32, image_height: u32, tile_size: u32) -> Self {
        Self {
            level: 0,
            image_width,
            image_height,
            tiles_x: image_width.div_ceil(tile_size),
            tiles_y: image_height.div_ceil(tile_size),
            first_tile: 0,
        }
    }

    /// Total number of tiles at this level.
    pub fn tile_count(&self) -> usize {
        self.tiles_x as usize * self.tiles_y as usize
    }

    /// Row-major index of a tile, or `None` if the coordinates are outside the level.
    pub fn tile_index(&self, tile_x: u32, tile_y: u32) -> Option<usize> {
        if tile_x >= self.tiles_x || tile_y >= self.tiles_y {
            return None;
        }
        Some(tile_y as usize * self.tiles_x as usize + tile_x as usize)
    }

    /// Tile group of a tile.
    pub fn tile_group(&self, tile_x: u32, tile_y: u32) -> Option<u32> {
        self.tile_index(tile_x, tile_y)
            .and_then(|idx| self.tile_group_of(idx))
    }

    /// Tile group of a row-major tile index.
    pub fn tile_group_of(&self, index: usize) -> Option<u32> {
        if index >= self.tile_count() {
            return None;
        }
        // Bounded at build time, see `Pyramid::build`
        u32::try_from((self.first_tile + index) / TILES_PER_GROUP).ok()
    }
}

// =============================================================================
// Pyramid
// =============================================================================

/// Immutable sequence of zoom levels for one image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Pyramid {
    /// Tile edge length in pixels
    tile_size: u32,

    /// Levels, coarsest first
    levels: Vec<ZoomLevel>,
}

impl Pyramid {
    /// Build the pyramid for an image.
    ///
    /// Fails with [`MetadataError::ZeroDimension`] if any input is zero and
    /// with [`MetadataError::TooManyTiles`] if the tile set would need more
    /// tile groups than a `u32` can number. The result always has at least one level, level 0 fits in a single tile and
    /// the last level has the full input dimensions.
    pub fn build(image_width: u32, image_height: u32, tile_size: u32) -> Result<Self, MetadataError> {
        if image_width == 0 {
            return Err(MetadataError::ZeroDimension { name: "WIDTH" });
        }
        if image_height == 0 {
            return Err(MetadataError::ZeroDimension { name: "HEIGHT" });
        }
        if tile_size == 0 {
            return Err(MetadataError::ZeroDimension { name: "TILESIZE" });
        }

        let mut levels = Vec::new();
        let (mut w, mut h) = (image_width, image_height);
        loop {
            levels.push(ZoomLevel::new(w, h, tile_size));
            if w.max(h) <= tile_size {
                break;
            }
            w /= 2;
            h /= 2;
        }
        levels.reverse();

        // The counter runs across levels so groups stay contiguous
        let mut counter = 0usize;
        for (number, level) in levels.iter_mut().enumerate() {
            level.level = number;
            level.first_tile = counter;
            counter = (level.tiles_x as usize)
                .checked_mul(level.tiles_y as usize)
                .and_then(|count| counter.checked_add(count))
                .ok_or(MetadataError::TooManyTiles {
                    width: image_width,
                    height: image_height,
                    tile_size,
                })?;
        }
        if counter.div_ceil(TILES_PER_GROUP) > u32::MAX as usize {
            return Err(MetadataError::TooManyTiles {
                width: image_width,
                height: image_height,
                tile_size,
            });
        }

        debug!(
            image_width,
            image_height,
            tile_size,
            levels = levels.len(),
            tiles = counter,
            "Built tile pyramid"
        );

        Ok(Self { tile_size, levels })
    }

    /// Build the pyramid described by parsed image properties.
    pub fn from_properties(props: &ImageProperties) -> Result<Self, MetadataError> {
        Self::build(props.width, props.height, props.tile_size)
    }

    /// Tile edge length in pixels.
    pub fn tile_size(&self) -> u32 {
        self.tile_size
    }

    /// Number of levels.
    pub fn level_count(&self) -> usize {
        self.levels.len()
    }

    /// All levels, coarsest first.
    pub fn levels(&self) -> &[ZoomLevel] {
        &self.levels
    }

    /// A level by number.
    pub fn level(&self, level: usize) -> Option<&ZoomLevel> {
        self.levels.get(level)
    }

    /// The coarsest (single tile) level.
    pub fn coarsest(&self) -> &ZoomLevel {
        &self.levels[0]
    }

    /// The full resolution level.
    pub fn finest(&self) -> &ZoomLevel {
        &self.levels[self.levels.len() - 1]
    }

    /// Index of the full resolution level.
    pub fn finest_level(&self) -> usize {
        self.levels.len() - 1
    }

    /// Total number of tiles across all levels.
    pub fn total_tiles(&self) -> usize {
        self.levels.iter().map(ZoomLevel::tile_count).sum()
    }

    /// Number of `TileGroup` folders used by the tile set.
    pub fn tile_group_count(&self) -> usize {
        self.total_tiles().div_ceil(TILES_PER_GROUP)
    }

    /// Representable scale range `(min, max)` while `level` is active.
    ///
    /// The minimum renders the level no smaller than the thumbnail, the maximum
    /// no larger than native resolution.
    pub fn scale_bounds(&self, level: usize) -> (f64, f64) {
        let width = self
            .level(level)
            .map(|l| l.image_width)
            .unwrap_or_else(|| self.finest().image_width) as f64;
        (
            self.coarsest().image_width as f64 / width,
            self.finest().image_width as f64 / width,
        )
    }
}

// =============================================================================
// Tests
// =============================================================================
