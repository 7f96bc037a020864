//! Display surface abstraction and a software implementation.

use std::path::Path;
use std::str::FromStr;

use image::{imageops, Rgba, RgbaImage};
use serde::Serialize;

// =============================================================================
// Geometry and Color
// =============================================================================

/// Axis-aligned rectangle in pixel space.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn right(&self) -> f64 {
        self.x + self.width
    }

    pub fn bottom(&self) -> f64 {
        self.y + self.height
    }

    /// Overlap with `other`, or `None` if the rectangles do not overlap.
    pub fn intersect(&self, other: &Rect) -> Option<Rect> {
        let x0 = self.x.max(other.x);
        let y0 = self.y.max(other.y);
        let x1 = self.right().min(other.right());
        let y1 = self.bottom().min(other.bottom());
        if x1 <= x0 || y1 <= y0 {
            None
        } else {
            Some(Rect::new(x0, y0, x1 - x0, y1 - y0))
        }
    }

    /// Integer pixel bounds `(x0, y0, x1, y1)` with edges rounded to the
    /// nearest pixel, clamped to `width` x `height`.
    ///
    /// Rounding both edges keeps neighbouring rectangles seamless.
    fn pixel_bounds(&self, width: u32, height: u32) -> Option<(u32, u32, u32, u32)> {
        let clamp = |v: f64, max: u32| v.round().clamp(0.0, max as f64) as u32;
        let x0 = clamp(self.x, width);
        let y0 = clamp(self.y, height);
        let x1 = clamp(self.right(), width);
        let y1 = clamp(self.bottom(), height);
        (x1 > x0 && y1 > y0).then_some((x0, y0, x1, y1))
    }
}

/// RGBA color.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Color {
    pub const TRANSPARENT: Color = Color::rgba(0, 0, 0, 0);
    pub const BLACK: Color = Color::rgba(0, 0, 0, 255);

    /// Outline color of the diagnostic overlay.
    pub const DEBUG_OUTLINE: Color = Color::rgba(255, 0, 0, 255);

    pub const fn rgba(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    /// Parse `#rgb`, `#rrggbb` or `#rrggbbaa` (the `#` is optional).
    pub fn parse(s: &str) -> Result<Color, String> {
        let hex = s.trim().trim_start_matches('#');
        let invalid = || format!("invalid color '{}': expected #rgb, #rrggbb or #rrggbbaa", s);

        if !hex.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(invalid());
        }
        let byte = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16).map_err(|_| invalid());
        let nibble = |i: usize| {
            u8::from_str_radix(&hex[i..i + 1], 16)
                .map(|v| v * 17)
                .map_err(|_| invalid())
        };

        match hex.len() {
            3 => Ok(Color::rgba(nibble(0)?, nibble(1)?, nibble(2)?, 255)),
            6 => Ok(Color::rgba(byte(0)?, byte(2)?, byte(4)?, 255)),
            8 => Ok(Color::rgba(byte(0)?, byte(2)?, byte(4)?, byte(6)?)),
            _ => Err(invalid()),
        }
    }

    pub fn to_rgba(self) -> Rgba<u8> {
        Rgba([self.r, self.g, self.b, self.a])
    }
}

impl FromStr for Color {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Color::parse(s)
    }
}

// =============================================================================
// Surface Trait
// =============================================================================

/// Drawing target for the viewer, in device pixels.
///
/// Generic over the image type so that a surface only accepts images its
/// tile source produces.
pub trait Surface<I> {
    /// Canvas size in device pixels.
    fn size(&self) -> (u32, u32);

    /// Whether 2D drawing is available. The viewer refuses to start otherwise.
    fn supports_2d(&self) -> bool {
        true
    }

    /// Device pixels per CSS pixel.
    fn device_pixel_ratio(&self) -> f64 {
        1.0
    }

    /// Draw the `src` part of `image` scaled into `dest`.
    fn draw_image(&mut self, image: &I, src: Rect, dest: Rect);

    fn fill_rect(&mut self, rect: Rect, color: Color);

    /// Reset `rect` to transparent.
    fn clear_rect(&mut self, rect: Rect);

    /// Draw a one-pixel outline.
    fn stroke_rect(&mut self, rect: Rect, color: Color);
}

// =============================================================================
// RasterSurface
// =============================================================================

/// Software canvas backed by an [`RgbaImage`].
#[derive(Debug, Clone)]
pub struct RasterSurface {
    canvas: RgbaImage,
    device_ratio: f64,
}

impl RasterSurface {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            canvas: RgbaImage::new(width, height),
            device_ratio: 1.0,
        }
    }

    pub fn with_device_ratio(mut self, ratio: f64) -> Self {
        self.device_ratio = ratio;
        self
    }

    pub fn image(&self) -> &RgbaImage {
        &self.canvas
    }

    pub fn into_image(self) -> RgbaImage {
        self.canvas
    }

    /// Color of one canvas pixel.
    pub fn pixel(&self, x: u32, y: u32) -> Option<Color> {
        if x >= self.canvas.width() || y >= self.canvas.height() {
            return None;
        }
        let Rgba([r, g, b, a]) = *self.canvas.get_pixel(x, y);
        Some(Color::rgba(r, g, b, a))
    }

    /// Write the canvas to a PNG file.
    pub fn save_png(&self, path: impl AsRef<Path>) -> image::ImageResult<()> {
        self.canvas
            .save_with_format(path, image::ImageFormat::Png)
    }

    fn fill(&mut self, rect: Rect, value: Rgba<u8>) {
        let (w, h) = self.canvas.dimensions();
        let Some((x0, y0, x1, y1)) = rect.pixel_bounds(w, h) else {
            return;
        };
        for y in y0..y1 {
            for x in x0..x1 {
                self.canvas.put_pixel(x, y, value);
            }
        }
    }
}

impl Surface<RgbaImage> for RasterSurface {
    fn size(&self) -> (u32, u32) {
        self.canvas.dimensions()
    }

    fn supports_2d(&self) -> bool {
        self.canvas.width() > 0 && self.canvas.height() > 0
    }

    fn device_pixel_ratio(&self) -> f64 {
        self.device_ratio
    }

    fn draw_image(&mut self, image: &RgbaImage, src: Rect, dest: Rect) {
        if src.width <= 0.0 || src.height <= 0.0 || dest.width <= 0.0 || dest.height <= 0.0 {
            return;
        }
        let (cw, ch) = self.canvas.dimensions();
        let canvas = Rect::new(0.0, 0.0, cw as f64, ch as f64);
        let Some(clip) = dest.intersect(&canvas) else {
            return;
        };
        let Some((dx0, dy0, dx1, dy1)) = clip.pixel_bounds(cw, ch) else {
            return;
        };

        // Source region that maps onto the clipped destination
        let sx = src.width / dest.width;
        let sy = src.height / dest.height;
        let (iw, ih) = image.dimensions();
        let sx0 = (src.x + (clip.x - dest.x) * sx).floor().clamp(0.0, iw as f64) as u32;
        let sy0 = (src.y + (clip.y - dest.y) * sy).floor().clamp(0.0, ih as f64) as u32;
        let sx1 = (src.x + (clip.right() - dest.x) * sx)
            .ceil()
            .clamp(sx0 as f64, iw as f64) as u32;
        let sy1 = (src.y + (clip.bottom() - dest.y) * sy)
            .ceil()
            .clamp(sy0 as f64, ih as f64) as u32;
        if sx1 <= sx0 || sy1 <= sy0 {
            return;
        }

        let region = imageops::crop_imm(image, sx0, sy0, sx1 - sx0, sy1 - sy0).to_image();
        let (w, h) = (dx1 - dx0, dy1 - dy0);
        let scaled = if region.dimensions() == (w, h) {
            region
        } else {
            imageops::resize(&region, w, h, imageops::FilterType::Triangle)
        };
        imageops::overlay(&mut self.canvas, &scaled, dx0 as i64, dy0 as i64);
    }

    fn fill_rect(&mut self, rect: Rect, color: Color) {
        self.fill(rect, color.to_rgba());
    }

    fn clear_rect(&mut self, rect: Rect) {
        self.fill(rect, Color::TRANSPARENT.to_rgba());
    }

    fn stroke_rect(&mut self, rect: Rect, color: Color) {
        let (w, h) = self.canvas.dimensions();
        let Some((x0, y0, x1, y1)) = rect.pixel_bounds(w, h) else {
            return;
        };
        let value = color.to_rgba();
        for x in x0..x1 {
            self.canvas.put_pixel(x, y0, value);
            self.canvas.put_pixel(x, y1 - 1, value);
        }
        for y in y0..y1 {
            self.canvas.put_pixel(x0, y, value);
            self.canvas.put_pixel(x1 - 1, y, value);
        }
    }
}
