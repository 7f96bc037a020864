//! Continuous view transform over the discrete pyramid.
//!
//! - [`Viewport`] holds scale, offset and canvas size in device pixels
//! - [`TransformController`] applies pan, zoom and pinch input, enforces the
//!   scale bounds and renormalizes the active level
//! - [`visible_tiles`] turns the transform into the rectangle of tiles to draw

mod event;
mod transform;
mod viewport;
mod visible;

pub use event::InputEvent;
pub use transform::{
    zoom_about, GestureKind, PendingGesture, TransformController, COARSER_LEVEL_THRESHOLD,
    FINER_LEVEL_THRESHOLD, ZOOM_EPSILON,
};
pub use viewport::{Point, Viewport};
pub use visible::{visible_tiles, TileRect};
