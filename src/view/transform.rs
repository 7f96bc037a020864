//! Pan, zoom and pinch on top of the discrete pyramid.
//!
//! The continuous `scale` is relative to the *active* level's image. Zooming
//! changes only the scale; a separate, debounced renormalization step moves to
//! a finer level when the scale grows past 1 and to a coarser one when it drops
//! under 0.5, rescaling so that the on-screen size of the image is unchanged.
//! This keeps the scale close to 1 while the level tracks the resolution tier.
//!
//! Every zoom keeps the image point under the anchor stationary on screen:
//!
//! ```text
//! offset' = anchor - (anchor - offset) * factor
//! ```

use tracing::debug;

use crate::pyramid::Pyramid;

use super::viewport::{Point, Viewport};

/// Zoom factors closer to 1 than this are treated as no change.
pub const ZOOM_EPSILON: f64 = 0.001;

/// Above this scale the next finer level is used.
pub const FINER_LEVEL_THRESHOLD: f64 = 1.01;

/// Below this scale the next coarser level is used.
pub const COARSER_LEVEL_THRESHOLD: f64 = 0.5;

// =============================================================================
// Gestures
// =============================================================================

/// Kind of a multi-event gesture.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GestureKind {
    Drag,
    Pinch,
}

/// State captured when a gesture starts.
///
/// Drag and pinch events carry cumulative deltas, so they are applied relative
/// to this snapshot rather than to the current transform.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PendingGesture {
    pub kind: GestureKind,

    /// Scale at gesture start
    pub start_scale: f64,

    /// Offset at gesture start
    pub start_offset: Point,

    /// Pointer (or pinch centre) at gesture start, device pixels
    pub start_pointer: Point,
}

// =============================================================================
// TransformController
// =============================================================================

/// Owns the viewport and the active level and applies input to them.
#[derive(Debug, Clone)]
pub struct TransformController {
    viewport: Viewport,
    level: usize,
    gesture: Option<PendingGesture>,
}

impl TransformController {
    pub fn new(viewport: Viewport) -> Self {
        Self {
            viewport,
            level: 0,
            gesture: None,
        }
    }

    pub fn viewport(&self) -> &Viewport {
        &self.viewport
    }

    /// Active pyramid level.
    pub fn level(&self) -> usize {
        self.level
    }

    /// Gesture in progress, if any.
    pub fn gesture(&self) -> Option<&PendingGesture> {
        self.gesture.as_ref()
    }

    /// Set the level and scale directly, then enforce the scale bounds.
    pub fn set_view(&mut self, pyramid: &Pyramid, level: usize, scale: f64, offset: Point) {
        self.level = level.min(pyramid.finest_level());
        self.viewport.scale = scale;
        self.viewport.offset = offset;
        self.adjust_scale_to_bounds(pyramid);
    }

    /// Change the canvas size in device pixels.
    pub fn resize(&mut self, width: u32, height: u32) {
        self.viewport.width = width as f64;
        self.viewport.height = height as f64;
    }

    fn anchor_point(&self, anchor: Option<Point>) -> Point {
        match anchor {
            Some(css) => self.viewport.to_device(css),
            None => self.viewport.center(),
        }
    }

    /// Move the image by a CSS-pixel delta.
    pub fn apply_pan(&mut self, dx: f64, dy: f64) {
        let ratio = self.viewport.device_ratio;
        self.viewport.offset.x += dx * ratio;
        self.viewport.offset.y += dy * ratio;
    }

    /// Multiply the scale by `factor` around `anchor` (CSS pixels; canvas
    /// centre when `None`).
    ///
    /// The scale is clamped to the active level's bounds first, and the offset
    /// follows the factor that was actually applied. Returns `false`, leaving
    /// the transform untouched, when clamping absorbed the whole change.
    pub fn apply_zoom(&mut self, pyramid: &Pyramid, factor: f64, anchor: Option<Point>) -> bool {
        if !factor.is_finite() || factor <= 0.0 {
            return false;
        }
        let anchor = self.anchor_point(anchor);
        let previous = self.viewport.scale;

        self.viewport.scale *= factor;
        self.adjust_scale_to_bounds(pyramid);

        let effective = self.viewport.scale / previous;
        if (effective - 1.0).abs() < ZOOM_EPSILON {
            self.viewport.scale = previous;
            return false;
        }

        self.viewport.offset = zoom_about(anchor, self.viewport.offset, effective);
        true
    }

    /// Record the start of a drag.
    pub fn begin_drag(&mut self, pointer: Point) {
        self.gesture = Some(PendingGesture {
            kind: GestureKind::Drag,
            start_scale: self.viewport.scale,
            start_offset: self.viewport.offset,
            start_pointer: self.viewport.to_device(pointer),
        });
    }

    /// Apply a cumulative drag delta (CSS pixels) since [`begin_drag`].
    ///
    /// Ignored while a pinch is in progress. Without a recorded start the
    /// delta is applied as an incremental pan.
    ///
    /// [`begin_drag`]: Self::begin_drag
    pub fn apply_drag(&mut self, dx: f64, dy: f64) -> bool {
        match self.gesture {
            Some(g) if g.kind == GestureKind::Pinch => false,
            Some(g) => {
                let ratio = self.viewport.device_ratio;
                self.viewport.offset =
                    Point::new(g.start_offset.x + dx * ratio, g.start_offset.y + dy * ratio);
                true
            }
            None => {
                self.apply_pan(dx, dy);
                true
            }
        }
    }

    /// Record the start of a pinch centred at `center` (CSS pixels).
    pub fn begin_pinch(&mut self, center: Point) {
        self.gesture = Some(PendingGesture {
            kind: GestureKind::Pinch,
            start_scale: self.viewport.scale,
            start_offset: self.viewport.offset,
            start_pointer: self.viewport.to_device(center),
        });
    }

    /// Apply a cumulative pinch ratio relative to the recorded gesture start.
    ///
    /// A pinch event without a preceding start records one from the current
    /// transform, centred on the canvas.
    pub fn apply_pinch(&mut self, pyramid: &Pyramid, ratio: f64) -> bool {
        let gesture = match self.gesture {
            Some(g) if g.kind == GestureKind::Pinch => g,
            _ => {
                let started = PendingGesture {
                    kind: GestureKind::Pinch,
                    start_scale: self.viewport.scale,
                    start_offset: self.viewport.offset,
                    start_pointer: self.viewport.center(),
                };
                self.gesture = Some(started);
                started
            }
        };
        self.pinch_from(
            pyramid,
            gesture.start_scale,
            gesture.start_offset,
            ratio,
            gesture.start_pointer,
        )
    }

    /// Set the transform to `start_scale * ratio` around `anchor` (device
    /// pixels), computed from the gesture start state.
    ///
    /// Safe to call repeatedly with cumulative ratios: the start offset is
    /// applied once per call, never accumulated. Returns whether the transform
    /// changed.
    pub fn pinch_from(
        &mut self,
        pyramid: &Pyramid,
        start_scale: f64,
        start_offset: Point,
        ratio: f64,
        anchor: Point,
    ) -> bool {
        if !ratio.is_finite() || ratio <= 0.0 || start_scale <= 0.0 {
            return false;
        }
        let before = self.viewport;

        self.viewport.scale = start_scale * ratio;
        self.adjust_scale_to_bounds(pyramid);
        let effective = self.viewport.scale / start_scale;
        self.viewport.offset = zoom_about(anchor, start_offset, effective);

        self.viewport != before
    }

    /// Finish the current gesture, returning its kind.
    pub fn end_gesture(&mut self) -> Option<GestureKind> {
        self.gesture.take().map(|g| g.kind)
    }

    /// Clamp the scale so the active level is rendered no smaller than the
    /// thumbnail and no larger than native resolution.
    ///
    /// Returns whether a clamp occurred. Idempotent.
    pub fn adjust_scale_to_bounds(&mut self, pyramid: &Pyramid) -> bool {
        let (min, max) = pyramid.scale_bounds(self.level);
        if self.viewport.scale < min {
            self.viewport.scale = min;
            true
        } else if self.viewport.scale > max {
            self.viewport.scale = max;
            true
        } else {
            false
        }
    }

    /// Centre the image on any axis where it is smaller than the canvas;
    /// otherwise keep it covering the canvas edge to edge.
    pub fn center_or_clamp_offset(&mut self, pyramid: &Pyramid) {
        let Some(level) = pyramid.level(self.level) else {
            return;
        };
        let vp = &mut self.viewport;
        vp.offset.x = clamp_axis(vp.offset.x, level.image_width as f64 * vp.scale, vp.width);
        vp.offset.y = clamp_axis(vp.offset.y, level.image_height as f64 * vp.scale, vp.height);
    }

    /// Move to the level matching the current scale.
    ///
    /// Steps finer while the scale exceeds [`FINER_LEVEL_THRESHOLD`] and
    /// coarser while it is under [`COARSER_LEVEL_THRESHOLD`]. Each step rescales
    /// by the ratio of the two levels' widths (a factor of two for even
    /// dimensions), so the on-screen image size is preserved, then re-applies
    /// the scale bounds. When the level changed the offset is re-clamped in the
    /// same step and the previous level is returned.
    pub fn renormalize_level(&mut self, pyramid: &Pyramid) -> Option<usize> {
        let previous = self.level;
        let finest = pyramid.finest_level();

        while self.viewport.scale > FINER_LEVEL_THRESHOLD && self.level < finest {
            self.step_level(pyramid, self.level + 1);
        }
        while self.viewport.scale < COARSER_LEVEL_THRESHOLD && self.level > 0 {
            self.step_level(pyramid, self.level - 1);
        }

        if self.level == previous {
            return None;
        }
        self.center_or_clamp_offset(pyramid);
        debug!(
            from = previous,
            to = self.level,
            scale = self.viewport.scale,
            "Switched zoom level"
        );
        Some(previous)
    }

    fn step_level(&mut self, pyramid: &Pyramid, to: usize) {
        let width_of = |level: usize| pyramid.level(level).map_or(1.0, |l| l.image_width as f64);
        let ratio = width_of(self.level) / width_of(to);
        self.viewport.scale *= ratio;
        // A gesture in progress keeps its start in the new level's units;
        // the start offset is in canvas pixels and does not change
        if let Some(gesture) = self.gesture.as_mut() {
            gesture.start_scale *= ratio;
        }
        self.level = to;
        self.adjust_scale_to_bounds(pyramid);
    }

    /// Reset to the initial view: the coarsest level that reaches the canvas
    /// size in either dimension, scaled down (never up) to fit, at the origin.
    pub fn fit(&mut self, pyramid: &Pyramid) {
        let vp = &self.viewport;
        let mut level = 0;
        while level < pyramid.finest_level() {
            let l = &pyramid.levels()[level];
            if (l.image_width as f64) < vp.width && (l.image_height as f64) < vp.height {
                level += 1;
            } else {
                break;
            }
        }

        let l = &pyramid.levels()[level];
        let scale = 1.0_f64
            .min(vp.width / l.image_width as f64)
            .min(vp.height / l.image_height as f64);

        self.gesture = None;
        self.set_view(pyramid, level, scale, Point::default());
    }
}

/// Offset that keeps the image point under `anchor` fixed when scaling by `factor`.
pub fn zoom_about(anchor: Point, offset: Point, factor: f64) -> Point {
    Point::new(
        anchor.x - (anchor.x - offset.x) * factor,
        anchor.y - (anchor.y - offset.y) * factor,
    )
}

fn clamp_axis(offset: f64, scaled: f64, canvas: f64) -> f64 {
    let slack = canvas - scaled;
    if slack > 0.0 {
        slack / 2.0
    } else if offset > 0.0 {
        0.0
    } else if offset + scaled < canvas {
        canvas - scaled
    } else {
        offset
    }
}

// =============================================================================
// Tests
// =============================================================================
