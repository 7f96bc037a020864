//! # Zoomify Viewer
//!
//! A pan-and-zoom viewport engine for images sliced into a Zoomify tile
//! pyramid.
//!
//! Only the tiles intersecting the canvas are fetched, and only those of the
//! active level are kept in memory. Zooming is continuous; the discrete pyramid
//! level follows the scale once input goes quiet.
//!
//! ## Features
//!
//! - **Pyramid derivation**: zoom levels and tile groups computed from image
//!   width, height and tile size, bit-exact with existing tile sets
//! - **Anchored zoom**: the point under the cursor or pinch stays in place,
//!   with scale clamped between thumbnail and native resolution
//! - **Visible-set cache**: per-level store with soft cancellation of stale
//!   loads and eviction outside the view
//! - **Coalesced repaints**: debounced and next-frame triggers merge into one
//!   render pass
//! - **HTTP and filesystem sources**: tiles fetched with reqwest or read from
//!   an unpacked directory
//!
//! ## Architecture
//!
//! - [`pyramid`] - Zoom levels, tile groups, `ImageProperties.xml` parsing
//! - [`tile`] - Tile addressing, sources and the per-level cache
//! - [`view`] - Viewport, transform controller and visible tile rectangle
//! - [`render`] - Display surface and repaint scheduling
//! - [`engine`] - The [`Viewer`] tying everything together
//! - [`config`] - Viewer options and CLI types
//!
//! ## Example
//!
//! ```rust,no_run
//! use zoomify_viewer::{AnyTileSource, InputEvent, RasterSurface, Viewer, ViewerOptions};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let source = AnyTileSource::from_location("https://example.com/tiles/map");
//!     let surface = RasterSurface::new(800, 600);
//!     let mut viewer = Viewer::open(ViewerOptions::default(), source, surface).await?;
//!
//!     viewer.handle_event(InputEvent::zoom_at(2.0, 400.0, 300.0));
//!     viewer.settle().await;
//!     viewer.surface().save_png("view.png")?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod engine;
pub mod error;
pub mod pyramid;
pub mod render;
pub mod tile;
pub mod view;

// Re-export commonly used types
pub use config::{Cli, Command, InspectConfig, RenderConfig, ViewerOptions};
pub use engine::{fetch_pyramid, RenderStats, Viewer, ViewerStats};
pub use error::{LoadError, MetadataError, ViewerError};
pub use pyramid::{parse_image_properties, ImageProperties, Pyramid, ZoomLevel, TILES_PER_GROUP};
pub use render::{Color, Debounce, RasterSurface, Rect, RepaintScheduler, Surface};
pub use tile::{
    AnyTileSource, FsTileSource, HttpTileSource, LoadOutcome, SlotState, TileAddressing,
    TileCache, TileImage, TileKey, TileSource,
};
pub use view::{
    visible_tiles, InputEvent, PendingGesture, Point, TileRect, TransformController, Viewport,
};
