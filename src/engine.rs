//! The viewer engine.
//!
//! A [`Viewer`] owns the pyramid, the view transform, the tile cache and the
//! display surface. Everything runs on one task: input events, tile-load
//! completions, the debounced level check and repaints are multiplexed in
//! [`Viewer::run`], so cache and transform mutations never interleave.
//!
//! # Render Pass
//!
//! ```text
//! clear / fill background
//!   → centre or clamp offset
//!   → visible tile rectangle
//!   → thumbnail under the tiles
//!   → draw resident tiles, request absent ones
//!   → diagnostic overlay
//!   → evict tiles outside the rectangle
//! ```

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::mpsc;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::config::ViewerOptions;
use crate::error::{MetadataError, ViewerError};
use crate::pyramid::{parse_image_properties, Pyramid};
use crate::render::{Color, Debounce, Rect, RepaintScheduler, Surface};
use crate::tile::{
    LoadOutcome, TileAddressing, TileCache, TileImage, TileKey, TileLoadResult, TileSource,
};
use crate::view::{
    visible_tiles, GestureKind, InputEvent, Point, TileRect, TransformController, Viewport,
};

// =============================================================================
// Stats
// =============================================================================

/// What one render pass did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RenderStats {
    /// Resident tiles drawn
    pub drawn: usize,

    /// Loads issued for absent tiles
    pub requested: usize,

    /// Slots released outside the visible rectangle
    pub evicted: usize,
}

/// Snapshot of the viewer state, the data behind the diagnostic overlay.
#[derive(Debug, Clone, Serialize)]
pub struct ViewerStats {
    pub level: usize,
    pub level_count: usize,
    pub scale: f64,
    pub offset: Point,
    pub canvas_width: f64,
    pub canvas_height: f64,

    /// Rectangle computed by the last render
    pub visible: TileRect,

    /// Resident tiles on the active level
    pub resident: usize,

    /// Loading tiles on the active level
    pub loading: usize,

    /// Spawned loads not yet delivered
    pub in_flight: usize,

    pub renders: u64,
}

// =============================================================================
// Viewer
// =============================================================================

/// Pan-and-zoom viewer over one Zoomify tile set.
pub struct Viewer<S: TileSource, D: Surface<S::Image>> {
    options: ViewerOptions,
    source: Arc<S>,
    surface: D,
    pyramid: Arc<Pyramid>,
    cache: TileCache<S>,
    transform: TransformController,
    level_check: Debounce,
    repaint: RepaintScheduler,
    thumbnail: Option<S::Image>,
    visible: TileRect,
}

impl<S: TileSource, D: Surface<S::Image>> Viewer<S, D> {
    /// Open a viewer.
    ///
    /// Fails with [`ViewerError::UnsupportedSurface`] if the surface cannot draw
    /// and with [`ViewerError::InvalidMetadata`] if the image properties are
    /// missing or malformed. Metadata is fetched from
    /// `{base}/ImageProperties.xml` unless the options carry all of width,
    /// height and tile size.
    pub async fn open(options: ViewerOptions, source: S, surface: D) -> Result<Self, ViewerError> {
        options.validate().map_err(ViewerError::InvalidOptions)?;

        if !surface.supports_2d() {
            return Err(ViewerError::UnsupportedSurface {
                reason: "surface has no 2D drawing context".to_string(),
            });
        }

        let source = Arc::new(source);
        let addressing = TileAddressing::with_extension(source.base(), &options.tile_extension);

        let pyramid = match options.metadata() {
            Some((width, height, tile_size)) => Pyramid::build(width, height, tile_size)?,
            None => fetch_pyramid(source.as_ref(), &addressing).await?,
        };
        let pyramid = Arc::new(pyramid);

        let device_ratio = if options.auto_ratio {
            let ratio = surface.device_pixel_ratio();
            if ratio.is_finite() && ratio > 0.0 {
                ratio
            } else {
                1.0
            }
        } else {
            1.0
        };
        let (width, height) = surface.size();
        let transform = TransformController::new(Viewport::new(width, height, device_ratio));

        let cache = TileCache::new(Arc::clone(&source), addressing, Arc::clone(&pyramid));

        info!(
            base = source.base(),
            width = pyramid.finest().image_width,
            height = pyramid.finest().image_height,
            tile_size = pyramid.tile_size(),
            levels = pyramid.level_count(),
            "Opened tile set"
        );

        let mut viewer = Self {
            level_check: Debounce::new(options.level_check_delay),
            repaint: RepaintScheduler::new(options.repaint_delay),
            options,
            source,
            surface,
            pyramid,
            cache,
            transform,
            thumbnail: None,
            visible: TileRect::default(),
        };

        viewer.load_thumbnail().await;
        viewer.reset();
        Ok(viewer)
    }

    async fn load_thumbnail(&mut self) {
        if !self.options.thumbnail {
            return;
        }
        let url = self.cache.addressing().thumbnail_url();
        match self.source.load_image(&url).await {
            Ok(image) => {
                debug!(url = %url, "Loaded thumbnail");
                self.thumbnail = Some(image);
            }
            Err(e) => warn!(url = %url, error = %e, "Thumbnail load failed"),
        }
    }

    fn release_thumbnail(&mut self) {
        if let Some(image) = self.thumbnail.take() {
            self.source.release_image(image);
        }
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    pub fn options(&self) -> &ViewerOptions {
        &self.options
    }

    pub fn pyramid(&self) -> &Pyramid {
        &self.pyramid
    }

    pub fn viewport(&self) -> &Viewport {
        self.transform.viewport()
    }

    /// Active pyramid level.
    pub fn level(&self) -> usize {
        self.transform.level()
    }

    pub fn cache(&self) -> &TileCache<S> {
        &self.cache
    }

    pub fn surface(&self) -> &D {
        &self.surface
    }

    pub fn surface_mut(&mut self) -> &mut D {
        &mut self.surface
    }

    pub fn has_thumbnail(&self) -> bool {
        self.thumbnail.is_some()
    }

    /// Whether a level check is waiting for its quiet window.
    pub fn level_check_pending(&self) -> bool {
        self.level_check.is_pending()
    }

    /// Whether a render is waiting, debounced or for the next frame.
    pub fn repaint_pending(&self) -> bool {
        !self.repaint.is_idle()
    }

    pub fn stats(&self) -> ViewerStats {
        let level = self.level();
        let vp = self.viewport();
        ViewerStats {
            level,
            level_count: self.pyramid.level_count(),
            scale: vp.scale,
            offset: vp.offset,
            canvas_width: vp.width,
            canvas_height: vp.height,
            visible: self.visible,
            resident: self.cache.resident_count(level),
            loading: self.cache.loading_count(level),
            in_flight: self.cache.in_flight(),
            renders: self.repaint.renders(),
        }
    }

    // =========================================================================
    // Input
    // =========================================================================

    /// Apply one input event.
    pub fn handle_event(&mut self, event: InputEvent) {
        match event {
            InputEvent::Pan { dx, dy } => {
                self.transform.apply_pan(dx, dy);
                self.repaint.request_frame();
            }
            InputEvent::DragStart { x, y } => self.transform.begin_drag(Point::new(x, y)),
            InputEvent::Drag { dx, dy } => {
                if self.transform.apply_drag(dx, dy) {
                    self.repaint.request_frame();
                }
            }
            InputEvent::Zoom { factor, anchor } => {
                self.zoom(factor, anchor);
            }
            InputEvent::PinchStart { x, y } => self.transform.begin_pinch(Point::new(x, y)),
            InputEvent::Pinch { ratio } => {
                if self.transform.apply_pinch(&self.pyramid, ratio) {
                    self.repaint.request_frame();
                }
            }
            InputEvent::Release => {
                if self.transform.end_gesture() == Some(GestureKind::Pinch) {
                    self.level_check.schedule(Instant::now());
                    self.repaint.request_frame();
                }
            }
            InputEvent::Reset => self.reset(),
            InputEvent::Resize { width, height } => {
                self.transform.resize(width, height);
                self.reset();
            }
        }
    }

    /// Zoom by `factor` around `anchor` (CSS pixels, canvas centre if `None`).
    ///
    /// Returns `false` when the scale bounds absorbed the whole change; nothing
    /// is scheduled in that case.
    pub fn zoom(&mut self, factor: f64, anchor: Option<Point>) -> bool {
        if !self.transform.apply_zoom(&self.pyramid, factor, anchor) {
            return false;
        }
        self.level_check.schedule(Instant::now());
        self.repaint.request_frame();
        true
    }

    pub fn zoom_in(&mut self, step: f64) -> bool {
        self.zoom(step, None)
    }

    pub fn zoom_out(&mut self, step: f64) -> bool {
        self.zoom(1.0 / step, None)
    }

    /// Return to the initial fitted view and drop every cached tile.
    ///
    /// Loads for the fitted view start right away; the first render follows
    /// on the debounced repaint.
    pub fn reset(&mut self) {
        self.cache.clear_all();
        self.level_check.cancel();
        self.transform.fit(&self.pyramid);
        self.transform.center_or_clamp_offset(&self.pyramid);
        let requested = self.request_visible();
        self.repaint.schedule_repaint(Instant::now());
        debug!(
            level = self.level(),
            scale = self.viewport().scale,
            requested,
            "Reset view"
        );
    }

    /// Rebuild for new image metadata.
    ///
    /// The cache and the thumbnail are released and the view is reset. On
    /// error the current pyramid stays in place.
    pub async fn reload(
        &mut self,
        image_width: u32,
        image_height: u32,
        tile_size: u32,
    ) -> Result<(), ViewerError> {
        let pyramid = Arc::new(Pyramid::build(image_width, image_height, tile_size)?);
        self.release_thumbnail();
        self.cache.reset(Arc::clone(&pyramid));
        self.pyramid = pyramid;
        info!(
            width = image_width,
            height = image_height,
            tile_size,
            levels = self.pyramid.level_count(),
            "Reloaded tile set"
        );
        self.load_thumbnail().await;
        self.reset();
        Ok(())
    }

    // =========================================================================
    // Loads and Timers
    // =========================================================================

    /// Apply a finished tile load.
    pub fn on_tile_loaded(&mut self, done: TileLoadResult<S::Image>) -> LoadOutcome {
        let key = done.key;
        let outcome = self.cache.complete(done, self.level());
        match &outcome {
            LoadOutcome::Stored => self.repaint.schedule_repaint(Instant::now()),
            LoadOutcome::Failed(e) => warn!(
                level = key.level,
                x = key.x,
                y = key.y,
                error = %e,
                "Tile load failed"
            ),
            LoadOutcome::Stale => debug!(
                level = key.level,
                x = key.x,
                y = key.y,
                "Released tile for inactive level"
            ),
            LoadOutcome::Discarded => debug!(
                level = key.level,
                x = key.x,
                y = key.y,
                "Dropped tile for released slot"
            ),
        }
        outcome
    }

    /// Move to the level matching the current scale.
    ///
    /// When the level changes the old level is cleared, loads for the new
    /// level's visible tiles are issued and a frame is requested.
    fn check_level(&mut self) -> bool {
        let Some(previous) = self.transform.renormalize_level(&self.pyramid) else {
            return false;
        };
        let released = self.cache.clear_level(previous);
        let requested = self.request_visible();

        debug!(from = previous, to = self.level(), released, requested, "Level changed");
        self.repaint.request_frame();
        true
    }

    /// Issue loads for the absent tiles of the current view.
    fn request_visible(&mut self) -> usize {
        let level = self.level();
        let rect = match self.pyramid.level(level) {
            Some(zoom_level) => visible_tiles(self.viewport(), zoom_level, self.pyramid.tile_size()),
            None => TileRect::default(),
        };
        self.visible = rect;
        rect.iter()
            .filter(|&(x, y)| self.cache.request(TileKey::new(level, x, y)))
            .count()
    }

    /// Run a pending level check now instead of waiting for its quiet window.
    ///
    /// Returns whether the level changed.
    pub fn flush_level_check(&mut self) -> bool {
        if !self.level_check.is_pending() {
            return false;
        }
        self.level_check.cancel();
        self.check_level()
    }

    /// Run whatever timers are due at `now`; render if a repaint is due.
    fn tick(&mut self, now: Instant, at_frame: bool) -> Option<RenderStats> {
        if self.level_check.fire_if_due(now) {
            self.check_level();
        }
        self.repaint
            .is_due(now, at_frame)
            .then(|| self.render())
    }

    fn next_deadline(&self) -> Option<Instant> {
        match (self.level_check.deadline(), self.repaint.deadline()) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    /// Drive the viewer until the input channel closes.
    pub async fn run(&mut self, mut events: mpsc::Receiver<InputEvent>) {
        let mut frames = time::interval(self.options.frame_interval);
        frames.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            let deadline = self.next_deadline();
            let frame_wanted = self.repaint.frame_requested();

            tokio::select! {
                event = events.recv() => match event {
                    Some(event) => self.handle_event(event),
                    None => break,
                },
                Some(done) = self.cache.next_completion() => {
                    self.on_tile_loaded(done);
                }
                _ = time::sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                    self.tick(Instant::now(), false);
                }
                _ = frames.tick(), if frame_wanted => {
                    self.tick(Instant::now(), true);
                }
            }
        }
        debug!("Input closed, viewer loop finished");
    }

    /// Process loads and timers until nothing is pending.
    ///
    /// Frame requests are rendered immediately. Returns once no load is in
    /// flight, no timer is armed and no frame is requested.
    pub async fn settle(&mut self) {
        loop {
            while let Some(done) = self.cache.try_next_completion() {
                self.on_tile_loaded(done);
            }
            if self.repaint.frame_requested() {
                self.render();
                continue;
            }

            let deadline = self.next_deadline();
            let loading = self.cache.in_flight() > 0;
            if !loading && deadline.is_none() {
                break;
            }

            tokio::select! {
                Some(done) = self.cache.next_completion(), if loading => {
                    self.on_tile_loaded(done);
                }
                _ = time::sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                    self.tick(Instant::now(), false);
                }
                else => break,
            }
        }
    }

    // =========================================================================
    // Rendering
    // =========================================================================

    /// Run one render pass.
    pub fn render(&mut self) -> RenderStats {
        let pyramid = Arc::clone(&self.pyramid);
        let mut stats = RenderStats::default();

        {
            let vp = self.transform.viewport();
            let canvas = Rect::new(0.0, 0.0, vp.width, vp.height);
            match self.options.background {
                Some(color) => self.surface.fill_rect(canvas, color),
                None => self.surface.clear_rect(canvas),
            }
        }

        self.transform.center_or_clamp_offset(&pyramid);
        let level = self.level();
        let Some(zoom_level) = pyramid.level(level) else {
            self.repaint.rendered();
            return stats;
        };
        let vp = *self.transform.viewport();
        let tile_size = pyramid.tile_size();
        let rect = visible_tiles(&vp, zoom_level, tile_size);
        self.visible = rect;

        if let Some(thumbnail) = &self.thumbnail {
            let src = Rect::new(
                0.0,
                0.0,
                thumbnail.width() as f64,
                thumbnail.height() as f64,
            );
            let dest = Rect::new(
                vp.offset.x,
                vp.offset.y,
                zoom_level.image_width as f64 * vp.scale,
                zoom_level.image_height as f64 * vp.scale,
            );
            self.surface.draw_image(thumbnail, src, dest);
        }

        for (x, y) in rect.iter() {
            let key = TileKey::new(level, x, y);
            if let Some(image) = self.cache.get(key) {
                let src = Rect::new(0.0, 0.0, image.width() as f64, image.height() as f64);
                let dest = tile_dest(&vp, zoom_level.image_width, zoom_level.image_height, tile_size, x, y);
                self.surface.draw_image(image, src, dest);
                stats.drawn += 1;
            } else if self.cache.request(key) {
                stats.requested += 1;
            }
        }

        if self.options.debug {
            for (x, y) in rect.iter() {
                let dest = tile_dest(&vp, zoom_level.image_width, zoom_level.image_height, tile_size, x, y);
                self.surface.stroke_rect(dest, Color::DEBUG_OUTLINE);
            }
            info!(
                width = vp.width,
                height = vp.height,
                scale = vp.scale,
                level,
                tiles = ?rect,
                cached = self.cache.resident_count(level),
                loading = self.cache.loading_count(level),
                "Viewer status"
            );
        }

        stats.evicted = self.cache.evict_outside(level, &rect);
        self.repaint.rendered();
        stats
    }
}

impl<S: TileSource, D: Surface<S::Image>> Drop for Viewer<S, D> {
    fn drop(&mut self) {
        self.release_thumbnail();
    }
}

/// Fetch `ImageProperties.xml` and build the pyramid it describes.
pub async fn fetch_pyramid<S: TileSource>(
    source: &S,
    addressing: &TileAddressing,
) -> Result<Pyramid, MetadataError> {
    let url = addressing.properties_url();
    debug!(url = %url, "Fetching image properties");
    let xml = source.fetch_text(&url).await?;
    let props = parse_image_properties(&xml)?;
    Pyramid::from_properties(&props)
}

/// Canvas rectangle of tile `(x, y)`; edge tiles are cut to the image size.
fn tile_dest(
    vp: &Viewport,
    image_width: u32,
    image_height: u32,
    tile_size: u32,
    x: u32,
    y: u32,
) -> Rect {
    let left = x * tile_size;
    let top = y * tile_size;
    let w = tile_size.min(image_width.saturating_sub(left));
    let h = tile_size.min(image_height.saturating_sub(top));
    Rect::new(
        vp.offset.x + left as f64 * vp.scale,
        vp.offset.y + top as f64 * vp.scale,
        w as f64 * vp.scale,
        h as f64 * vp.scale,
    )
}
