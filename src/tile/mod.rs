//! Tile addressing, loading and caching.
//!
//! ```text
//! ┌──────────────────────────────┐
//! │         Viewer engine        │
//! └──────────────┬───────────────┘
//!                │ request / complete / evict
//!                ▼
//! ┌──────────────────────────────┐      ┌──────────────────────┐
//! │          TileCache           │─────▶│    TileAddressing    │
//! │  per-level resident/loading  │      │ TileGroup{g}/L-X-Y   │
//! └──────────────┬───────────────┘      └──────────────────────┘
//!                │ spawned loads
//!                ▼
//! ┌──────────────────────────────┐
//! │    TileSource (HTTP / fs)    │
//! └──────────────────────────────┘
//! ```
//!
//! # Components
//!
//! - [`TileAddressing`]: maps a [`TileKey`] to its tile-group bucket and URL
//! - [`TileCache`]: per-level sparse store with ticketed loads and eviction
//! - [`TileSource`]: asynchronous image loader, implemented by
//!   [`HttpTileSource`] and [`FsTileSource`]

mod address;
mod cache;
mod source;

pub use address::{
    TileAddress, TileAddressing, TileKey, DEFAULT_TILE_EXTENSION, PROPERTIES_FILE,
};
pub use cache::{LoadOutcome, LoadTicket, SlotState, TileCache, TileLoadResult};
pub use source::{
    decode_image, AnyTileSource, FsTileSource, HttpTileSource, TileImage, TileSource,
};
