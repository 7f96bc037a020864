//! Configuration for the viewer engine and the command-line tool.
//!
//! [`ViewerOptions`] configures one viewer instance. The CLI types wrap it for
//! the `zoomify-viewer` binary, which supports:
//! - Command-line arguments via clap
//! - Environment variables with the `ZOOMIFY_` prefix
//! - Defaults matching the interactive viewer's behaviour
//!
//! # Example
//!
//! ```
//! use zoomify_viewer::config::ViewerOptions;
//! use zoomify_viewer::render::Color;
//!
//! let options = ViewerOptions::default()
//!     .with_thumbnail(true)
//!     .with_background(Color::BLACK)
//!     .with_image_size(4000, 3000, 256);
//! assert!(options.validate().is_ok());
//! assert!(options.has_metadata());
//! ```
//!
//! # Environment Variables
//!
//! - `ZOOMIFY_WIDTH` / `ZOOMIFY_HEIGHT` - Canvas size for `render`
//! - `ZOOMIFY_BACKGROUND` - Fill color instead of clearing
//! - `ZOOMIFY_THUMBNAIL` - Preload and draw the thumbnail
//! - `ZOOMIFY_DEVICE_RATIO` - Device pixels per CSS pixel
//! - `ZOOMIFY_DEBUG` - Draw the diagnostic overlay
//! - `ZOOMIFY_SETTLE_TIMEOUT` - Seconds to wait for tile loads

use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};

use crate::render::{
    Color, DEFAULT_FRAME_INTERVAL, DEFAULT_LEVEL_CHECK_DELAY, DEFAULT_REPAINT_DELAY,
};
use crate::tile::DEFAULT_TILE_EXTENSION;

// =============================================================================
// Default Values
// =============================================================================

/// Default canvas width for `render`.
pub const DEFAULT_CANVAS_WIDTH: u32 = 800;

/// Default canvas height for `render`.
pub const DEFAULT_CANVAS_HEIGHT: u32 = 600;

/// Default seconds to wait for outstanding loads before rendering.
pub const DEFAULT_SETTLE_TIMEOUT: u64 = 30;

/// Zoom step of the mouse wheel and keyboard.
pub const ZOOM_STEP: f64 = 1.1;

/// Zoom step of the toolbar buttons.
pub const TOOLBAR_ZOOM_STEP: f64 = 1.2;

/// Zoom factor of a double tap.
pub const DOUBLE_TAP_ZOOM: f64 = 2.0;

// =============================================================================
// Viewer Options
// =============================================================================

/// Options recognised by a viewer instance.
#[derive(Debug, Clone, PartialEq)]
pub struct ViewerOptions {
    /// Use the surface's device pixel ratio (otherwise 1).
    pub auto_ratio: bool,

    /// Eagerly load the thumbnail and draw it under the tiles.
    pub thumbnail: bool,

    /// Full-resolution width; metadata fetch is skipped when width, height and
    /// tile size are all given.
    pub image_width: Option<u32>,

    pub image_height: Option<u32>,

    pub tile_size: Option<u32>,

    /// Fill color for the canvas; cleared to transparent when `None`.
    pub background: Option<Color>,

    /// Stroke tile outlines on the surface. The per-render status line goes to
    /// the `tracing` log only; nothing textual is drawn.
    pub debug: bool,

    /// Quiet window before the level check runs.
    pub level_check_delay: Duration,

    /// Quiet window before a debounced repaint.
    pub repaint_delay: Duration,

    /// Display frame interval for immediate-frame repaints.
    pub frame_interval: Duration,

    /// Tile file extension.
    pub tile_extension: String,
}

impl Default for ViewerOptions {
    fn default() -> Self {
        Self {
            auto_ratio: true,
            thumbnail: false,
            image_width: None,
            image_height: None,
            tile_size: None,
            background: None,
            debug: false,
            level_check_delay: DEFAULT_LEVEL_CHECK_DELAY,
            repaint_delay: DEFAULT_REPAINT_DELAY,
            frame_interval: DEFAULT_FRAME_INTERVAL,
            tile_extension: DEFAULT_TILE_EXTENSION.to_string(),
        }
    }
}

impl ViewerOptions {
    pub fn with_auto_ratio(mut self, auto_ratio: bool) -> Self {
        self.auto_ratio = auto_ratio;
        self
    }

    pub fn with_thumbnail(mut self, thumbnail: bool) -> Self {
        self.thumbnail = thumbnail;
        self
    }

    /// Supply the image metadata up front instead of fetching it.
    pub fn with_image_size(mut self, width: u32, height: u32, tile_size: u32) -> Self {
        self.image_width = Some(width);
        self.image_height = Some(height);
        self.tile_size = Some(tile_size);
        self
    }

    pub fn with_background(mut self, color: Color) -> Self {
        self.background = Some(color);
        self
    }

    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    pub fn with_level_check_delay(mut self, delay: Duration) -> Self {
        self.level_check_delay = delay;
        self
    }

    pub fn with_repaint_delay(mut self, delay: Duration) -> Self {
        self.repaint_delay = delay;
        self
    }

    pub fn with_frame_interval(mut self, interval: Duration) -> Self {
        self.frame_interval = interval;
        self
    }

    pub fn with_tile_extension(mut self, extension: impl Into<String>) -> Self {
        self.tile_extension = extension.into();
        self
    }

    /// Whether all three metadata values were supplied.
    pub fn has_metadata(&self) -> bool {
        self.metadata().is_some()
    }

    /// `(width, height, tile_size)` when all are supplied.
    pub fn metadata(&self) -> Option<(u32, u32, u32)> {
        Some((self.image_width?, self.image_height?, self.tile_size?))
    }

    /// Validate the options and return an error message if invalid.
    pub fn validate(&self) -> Result<(), String> {
        for (name, value) in [
            ("image_width", self.image_width),
            ("image_height", self.image_height),
            ("tile_size", self.tile_size),
        ] {
            if value == Some(0) {
                return Err(format!("{} must be greater than 0", name));
            }
        }

        if self.frame_interval.is_zero() {
            return Err("frame_interval must be greater than 0".to_string());
        }

        let ext = &self.tile_extension;
        if ext.is_empty() || ext.starts_with('.') || ext.contains('/') {
            return Err(format!(
                "tile_extension '{}' must be a bare extension such as 'jpg'",
                ext
            ));
        }

        Ok(())
    }
}

// =============================================================================
// CLI Arguments
// =============================================================================

/// Zoomify Viewer - pan and zoom over Zoomify tile pyramids.
///
/// Reads `ImageProperties.xml` and tiles from an HTTP(S) base URL or a local
/// directory.
#[derive(Parser, Debug, Clone)]
#[command(name = "zoomify-viewer")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    pub fn into_command(self) -> Command {
        self.command
    }
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Print the pyramid levels and tile groups of a tile set.
    Inspect(InspectConfig),

    /// Render a view of a tile set to a PNG file.
    Render(RenderConfig),
}

/// Arguments of `inspect`.
#[derive(Parser, Debug, Clone)]
pub struct InspectConfig {
    /// Tile set base URL or directory.
    pub source: String,

    /// Print JSON instead of a table.
    #[arg(long, default_value_t = false)]
    pub json: bool,

    /// Enable verbose logging (debug level).
    #[arg(short, long, default_value_t = false)]
    pub verbose: bool,
}

/// Arguments of `render`.
#[derive(Parser, Debug, Clone)]
pub struct RenderConfig {
    /// Tile set base URL or directory.
    pub source: String,

    // =========================================================================
    // Canvas
    // =========================================================================
    /// Canvas width in device pixels.
    #[arg(long, default_value_t = DEFAULT_CANVAS_WIDTH, env = "ZOOMIFY_WIDTH")]
    pub width: u32,

    /// Canvas height in device pixels.
    #[arg(long, default_value_t = DEFAULT_CANVAS_HEIGHT, env = "ZOOMIFY_HEIGHT")]
    pub height: u32,

    /// Device pixels per CSS pixel; pan deltas and anchors are scaled by it.
    #[arg(long, default_value_t = 1.0, env = "ZOOMIFY_DEVICE_RATIO")]
    pub device_ratio: f64,

    /// Fill color (#rgb, #rrggbb, #rrggbbaa) instead of a transparent clear.
    #[arg(long, env = "ZOOMIFY_BACKGROUND")]
    pub background: Option<Color>,

    // =========================================================================
    // View
    // =========================================================================
    /// Zoom factor to apply; repeat for several steps.
    #[arg(long = "zoom")]
    pub zooms: Vec<f64>,

    /// Pan delta `DX,DY` in CSS pixels, applied after zooming; repeatable.
    #[arg(long = "pan", value_parser = parse_pair, allow_hyphen_values = true)]
    pub pans: Vec<(f64, f64)>,

    /// Zoom anchor `X,Y` in CSS pixels (default: canvas centre).
    #[arg(long, value_parser = parse_pair)]
    pub anchor: Option<(f64, f64)>,

    // =========================================================================
    // Metadata Override
    // =========================================================================
    /// Full-resolution width; with --image-height and --tile-size skips the
    /// metadata fetch.
    #[arg(long, requires_all = ["image_height", "tile_size"])]
    pub image_width: Option<u32>,

    #[arg(long, requires_all = ["image_width", "tile_size"])]
    pub image_height: Option<u32>,

    #[arg(long, requires_all = ["image_width", "image_height"])]
    pub tile_size: Option<u32>,

    // =========================================================================
    // Behaviour
    // =========================================================================
    /// Preload the thumbnail and draw it under the tiles.
    #[arg(long, default_value_t = false, env = "ZOOMIFY_THUMBNAIL")]
    pub thumbnail: bool,

    /// Draw tile outlines; the status line per render is logged, not drawn.
    #[arg(long, default_value_t = false, env = "ZOOMIFY_DEBUG")]
    pub debug: bool,

    /// Seconds to wait for tile loads to settle.
    #[arg(long, default_value_t = DEFAULT_SETTLE_TIMEOUT, env = "ZOOMIFY_SETTLE_TIMEOUT")]
    pub settle_timeout: u64,

    /// Output PNG file.
    #[arg(short, long)]
    pub output: PathBuf,

    /// Enable verbose logging (debug level).
    #[arg(short, long, default_value_t = false)]
    pub verbose: bool,
}

impl RenderConfig {
    /// Validate the configuration and return an error message if invalid.
    pub fn validate(&self) -> Result<(), String> {
        if self.width == 0 || self.height == 0 {
            return Err("width and height must be greater than 0".to_string());
        }

        if !self.device_ratio.is_finite() || self.device_ratio <= 0.0 {
            return Err("device_ratio must be a positive number".to_string());
        }

        if let Some(zoom) = self.zooms.iter().find(|z| !z.is_finite() || **z <= 0.0) {
            return Err(format!("zoom factor {} must be a positive number", zoom));
        }

        if self.settle_timeout == 0 {
            return Err("settle_timeout must be greater than 0".to_string());
        }

        self.viewer_options().validate()
    }

    /// Viewer options for a headless render.
    pub fn viewer_options(&self) -> ViewerOptions {
        let mut options = ViewerOptions::default()
            .with_thumbnail(self.thumbnail)
            .with_debug(self.debug);
        if let Some(color) = self.background {
            options = options.with_background(color);
        }
        if let (Some(w), Some(h), Some(ts)) = (self.image_width, self.image_height, self.tile_size)
        {
            options = options.with_image_size(w, h, ts);
        }
        options
    }

    pub fn settle_timeout(&self) -> Duration {
        Duration::from_secs(self.settle_timeout)
    }
}

/// Parse `A,B` into a pair of numbers.
fn parse_pair(s: &str) -> Result<(f64, f64), String> {
    let (a, b) = s
        .split_once(',')
        .ok_or_else(|| format!("expected 'X,Y', got '{}'", s))?;
    let num = |v: &str| {
        v.trim()
            .parse::<f64>()
            .map_err(|_| format!("invalid number '{}' in '{}'", v.trim(), s))
    };
    Ok((num(a)?, num(b)?))
}

// =============================================================================
// Tests
// =============================================================================
