use serde::Serialize;

/// A position in canvas space.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Scale both coordinates.
    pub fn scaled(self, factor: f64) -> Self {
        Self::new(self.x * factor, self.y * factor)
    }
}

/// Continuous view transform over the active pyramid level.
///
/// A level-image pixel `p` lands on the canvas at `offset + p * scale`; all
/// canvas quantities are device pixels.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Viewport {
    /// Canvas pixels per level-image pixel (always > 0)
    pub scale: f64,

    /// Canvas position of the level image's top-left corner
    pub offset: Point,

    /// Canvas width in device pixels
    pub width: f64,

    /// Canvas height in device pixels
    pub height: f64,

    /// Device pixels per CSS pixel
    pub device_ratio: f64,
}

impl Viewport {
    /// A viewport at scale 1 with no offset.
    pub fn new(width: u32, height: u32, device_ratio: f64) -> Self {
        Self {
            scale: 1.0,
            offset: Point::default(),
            width: width as f64,
            height: height as f64,
            device_ratio,
        }
    }

    /// Canvas centre in device pixels.
    pub fn center(&self) -> Point {
        Point::new(self.width / 2.0, self.height / 2.0)
    }

    /// Convert an input location in CSS pixels to device pixels.
    pub fn to_device(&self, css: Point) -> Point {
        css.scaled(self.device_ratio)
    }

    /// Canvas position of a level-image point.
    pub fn image_to_canvas(&self, image: Point) -> Point {
        Point::new(
            self.offset.x + image.x * self.scale,
            self.offset.y + image.y * self.scale,
        )
    }

    /// Level-image position under a canvas point.
    pub fn canvas_to_image(&self, canvas: Point) -> Point {
        Point::new(
            (canvas.x - self.offset.x) / self.scale,
            (canvas.y - self.offset.y) / self.scale,
        )
    }
}
