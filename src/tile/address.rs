//! Zoomify tile addressing.
//!
//! Tiles live at `{base}/TileGroup{g}/{level}-{x}-{y}.{ext}` where `g` is the
//! precomputed tile group of the slot. The naming scheme must match existing
//! tile sets exactly.

use crate::pyramid::Pyramid;

/// Default tile file extension.
pub const DEFAULT_TILE_EXTENSION: &str = "jpg";

/// Name of the metadata document at the root of a tile set.
pub const PROPERTIES_FILE: &str = "ImageProperties.xml";

/// Identifies one tile slot in the pyramid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TileKey {
    /// Zoom level (0 = coarsest)
    pub level: usize,

    /// Tile column
    pub x: u32,

    /// Tile row
    pub y: u32,
}

impl TileKey {
    pub fn new(level: usize, x: u32, y: u32) -> Self {
        Self { level, x, y }
    }
}

/// Resolved storage address of a tile.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TileAddress {
    /// Tile group folder number
    pub tile_group: u32,

    /// Full resource identifier
    pub url: String,
}

/// Maps tile slots to resource identifiers under a base source.
///
/// Stateless apart from the base and extension; nothing is cached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TileAddressing {
    base: String,
    extension: String,
}

impl TileAddressing {
    /// Create addressing for a base source with the default `jpg` extension.
    pub fn new(base: impl Into<String>) -> Self {
        Self::with_extension(base, DEFAULT_TILE_EXTENSION)
    }

    /// Create addressing with a custom tile extension.
    pub fn with_extension(base: impl Into<String>, extension: impl Into<String>) -> Self {
        let base = base.into();
        Self {
            base: base.trim_end_matches('/').to_string(),
            extension: extension.into(),
        }
    }

    /// The base source, without trailing slash.
    pub fn base(&self) -> &str {
        &self.base
    }

    /// Address of a tile, or `None` if the slot is outside the pyramid.
    pub fn address(&self, pyramid: &Pyramid, key: TileKey) -> Option<TileAddress> {
        let tile_group = pyramid.level(key.level)?.tile_group(key.x, key.y)?;
        Some(TileAddress {
            tile_group,
            url: self.tile_url(tile_group, key),
        })
    }

    /// Resource identifier for a tile in a known group.
    pub fn tile_url(&self, tile_group: u32, key: TileKey) -> String {
        format!(
            "{}/TileGroup{}/{}-{}-{}.{}",
            self.base, tile_group, key.level, key.x, key.y, self.extension
        )
    }

    /// The single tile of level 0, used as a low-resolution placeholder.
    pub fn thumbnail_url(&self) -> String {
        self.tile_url(0, TileKey::new(0, 0, 0))
    }

    /// Location of the `ImageProperties.xml` document.
    pub fn properties_url(&self) -> String {
        format!("{}/{}", self.base, PROPERTIES_FILE)
    }
}
