//! Test utilities for integration tests.
//!
//! This module provides a mock tile source with gated completions and release
//! tracking, a surface that records draw calls, and helpers for writing
//! Zoomify tile sets to disk.

use async_trait::async_trait;
use image::codecs::jpeg::JpegEncoder;
use image::{Rgb, RgbImage};
use std::collections::HashSet;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Semaphore;

use zoomify_viewer::error::LoadError;
use zoomify_viewer::render::{Color, Rect, Surface};
use zoomify_viewer::tile::{TileImage, TileSource};
use zoomify_viewer::{Pyramid, TileAddressing, TileKey};

pub const MOCK_BASE: &str = "mock://tiles/image";

/// `ImageProperties.xml` as written by Zoomify converters.
pub fn properties_xml(width: u32, height: u32, tile_size: u32) -> String {
    format!(
        r#"<IMAGE_PROPERTIES WIDTH="{}" HEIGHT="{}" NUMTILES="0" NUMIMAGES="1" VERSION="1.8" TILESIZE="{}" />"#,
        width, height, tile_size
    )
}

// =============================================================================
// Mock Tile Source
// =============================================================================

/// Image handed out by [`MockTileSource`]; remembers where it came from.
#[derive(Debug, Clone, PartialEq)]
pub struct MockImage {
    pub url: String,
    pub width: u32,
    pub height: u32,
}

impl TileImage for MockImage {
    fn width(&self) -> u32 {
        self.width
    }

    fn height(&self) -> u32 {
        self.height
    }
}

/// Shared observation handles of a [`MockTileSource`].
///
/// The source itself moves into the viewer, so tests keep a clone of these.
#[derive(Clone)]
pub struct MockHandles {
    gate: Arc<Semaphore>,
    failing: Arc<Mutex<HashSet<String>>>,
    loads: Arc<Mutex<Vec<String>>>,
    released: Arc<AtomicUsize>,
}

impl MockHandles {
    /// Let `n` more gated loads complete.
    pub fn open_gate(&self, n: usize) {
        self.gate.add_permits(n);
    }

    /// Let every pending and future load complete.
    pub fn open_gate_fully(&self) {
        self.gate.add_permits(10_000);
    }

    pub fn fail_url(&self, url: impl Into<String>) {
        self.failing.lock().unwrap().insert(url.into());
    }

    pub fn heal_url(&self, url: &str) {
        self.failing.lock().unwrap().remove(url);
    }

    /// URLs passed to `load_image`, in call order.
    pub fn loads(&self) -> Vec<String> {
        self.loads.lock().unwrap().clone()
    }

    pub fn load_count(&self, url: &str) -> usize {
        self.loads.lock().unwrap().iter().filter(|u| *u == url).count()
    }

    pub fn released(&self) -> usize {
        self.released.load(Ordering::SeqCst)
    }
}

/// In-memory tile source.
///
/// Loads block on a semaphore until the test opens the gate (ungated sources
/// start with plenty of permits). URLs registered as failing return a
/// connection error.
pub struct MockTileSource {
    properties: Option<String>,
    tile_size: u32,
    handles: MockHandles,
}

impl MockTileSource {
    /// Source serving metadata for an image, loads complete immediately.
    pub fn new(width: u32, height: u32, tile_size: u32) -> Self {
        Self::build(Some(properties_xml(width, height, tile_size)), tile_size, 10_000)
    }

    /// Source serving metadata for an image, loads wait for the gate.
    pub fn gated(width: u32, height: u32, tile_size: u32) -> Self {
        Self::build(Some(properties_xml(width, height, tile_size)), tile_size, 0)
    }

    /// Source serving an arbitrary metadata document.
    pub fn with_properties(xml: impl Into<String>) -> Self {
        Self::build(Some(xml.into()), 256, 10_000)
    }

    /// Source without a metadata document.
    pub fn without_properties(tile_size: u32) -> Self {
        Self::build(None, tile_size, 10_000)
    }

    fn build(properties: Option<String>, tile_size: u32, permits: usize) -> Self {
        Self {
            properties,
            tile_size,
            handles: MockHandles {
                gate: Arc::new(Semaphore::new(permits)),
                failing: Arc::new(Mutex::new(HashSet::new())),
                loads: Arc::new(Mutex::new(Vec::new())),
                released: Arc::new(AtomicUsize::new(0)),
            },
        }
    }

    pub fn handles(&self) -> MockHandles {
        self.handles.clone()
    }
}

#[async_trait]
impl TileSource for MockTileSource {
    type Image = MockImage;

    fn base(&self) -> &str {
        MOCK_BASE
    }

    async fn fetch_text(&self, url: &str) -> Result<String, LoadError> {
        self.properties
            .clone()
            .ok_or_else(|| LoadError::NotFound(url.to_string()))
    }

    async fn load_image(&self, url: &str) -> Result<MockImage, LoadError> {
        self.handles.loads.lock().unwrap().push(url.to_string());

        let permit = self
            .handles
            .gate
            .acquire()
            .await
            .map_err(|_| LoadError::Connection("gate closed".into()))?;
        permit.forget();

        if self.handles.failing.lock().unwrap().contains(url) {
            return Err(LoadError::Connection(format!("refused: {}", url)));
        }
        Ok(MockImage {
            url: url.to_string(),
            width: self.tile_size,
            height: self.tile_size,
        })
    }

    fn release_image(&self, _image: MockImage) {
        self.handles.released.fetch_add(1, Ordering::SeqCst);
    }
}

/// URL the viewer uses for a tile of `pyramid`.
pub fn tile_url(pyramid: &Pyramid, level: usize, x: u32, y: u32) -> String {
    TileAddressing::new(MOCK_BASE)
        .address(pyramid, TileKey::new(level, x, y))
        .map(|a| a.url)
        .unwrap_or_default()
}

// =============================================================================
// Recording Surface
// =============================================================================

/// One recorded surface call.
#[derive(Debug, Clone, PartialEq)]
pub enum DrawOp {
    Clear(Rect),
    Fill(Rect, Color),
    Image { url: String, dest: Rect },
    Stroke(Rect),
}

/// Surface that records draw calls instead of rasterizing.
pub struct RecordingSurface {
    width: u32,
    height: u32,
    ratio: f64,
    has_2d: bool,
    ops: Vec<DrawOp>,
}

impl RecordingSurface {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            ratio: 1.0,
            has_2d: true,
            ops: Vec::new(),
        }
    }

    /// A surface without a 2D context.
    pub fn without_2d(width: u32, height: u32) -> Self {
        Self {
            has_2d: false,
            ..Self::new(width, height)
        }
    }

    pub fn with_ratio(mut self, ratio: f64) -> Self {
        self.ratio = ratio;
        self
    }

    pub fn ops(&self) -> &[DrawOp] {
        &self.ops
    }

    pub fn take_ops(&mut self) -> Vec<DrawOp> {
        std::mem::take(&mut self.ops)
    }

    /// URLs of images drawn, in order.
    pub fn drawn_urls(&self) -> Vec<String> {
        self.ops
            .iter()
            .filter_map(|op| match op {
                DrawOp::Image { url, .. } => Some(url.clone()),
                _ => None,
            })
            .collect()
    }
}

impl Surface<MockImage> for RecordingSurface {
    fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn supports_2d(&self) -> bool {
        self.has_2d
    }

    fn device_pixel_ratio(&self) -> f64 {
        self.ratio
    }

    fn draw_image(&mut self, image: &MockImage, _src: Rect, dest: Rect) {
        self.ops.push(DrawOp::Image {
            url: image.url.clone(),
            dest,
        });
    }

    fn fill_rect(&mut self, rect: Rect, color: Color) {
        self.ops.push(DrawOp::Fill(rect, color));
    }

    fn clear_rect(&mut self, rect: Rect) {
        self.ops.push(DrawOp::Clear(rect));
    }

    fn stroke_rect(&mut self, rect: Rect, _color: Color) {
        self.ops.push(DrawOp::Stroke(rect));
    }
}

// =============================================================================
// On-disk Tile Sets
// =============================================================================

/// Color used for tile `(level, x, y)` in generated tile sets.
pub fn tile_color(level: usize, x: u32, y: u32) -> Rgb<u8> {
    Rgb([
        (40 + level * 40).min(255) as u8,
        (x * 60 + 20).min(255) as u8,
        (y * 60 + 20).min(255) as u8,
    ])
}

/// Write a complete Zoomify tile set for an image of the given size,
/// each tile a solid [`tile_color`].
pub fn write_tile_set(dir: &Path, width: u32, height: u32, tile_size: u32) -> Pyramid {
    let pyramid = Pyramid::build(width, height, tile_size).unwrap();
    std::fs::write(
        dir.join("ImageProperties.xml"),
        properties_xml(width, height, tile_size),
    )
    .unwrap();

    for level in pyramid.levels() {
        for y in 0..level.tiles_y {
            for x in 0..level.tiles_x {
                let group = level.tile_group(x, y).unwrap();
                let group_dir = dir.join(format!("TileGroup{}", group));
                std::fs::create_dir_all(&group_dir).unwrap();

                let w = tile_size.min(level.image_width - x * tile_size);
                let h = tile_size.min(level.image_height - y * tile_size);
                let img = RgbImage::from_pixel(w, h, tile_color(level.level, x, y));
                let mut out = Vec::new();
                JpegEncoder::new_with_quality(&mut out, 95)
                    .encode_image(&img)
                    .unwrap();
                std::fs::write(
                    group_dir.join(format!("{}-{}-{}.jpg", level.level, x, y)),
                    out,
                )
                .unwrap();
            }
        }
    }
    pyramid
}

/// Whether two colors are within `tolerance` per channel (JPEG is lossy).
pub fn color_close(actual: Color, expected: Rgb<u8>, tolerance: u8) -> bool {
    let diff = |a: u8, b: u8| a.abs_diff(b) <= tolerance;
    diff(actual.r, expected[0]) && diff(actual.g, expected[1]) && diff(actual.b, expected[2])
}
