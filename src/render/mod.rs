//! Drawing: the display surface and repaint scheduling.

mod scheduler;
mod surface;

pub use scheduler::{
    Debounce, RepaintScheduler, DEFAULT_FRAME_INTERVAL, DEFAULT_LEVEL_CHECK_DELAY,
    DEFAULT_REPAINT_DELAY,
};
pub use surface::{Color, RasterSurface, Rect, Surface};
