use super::viewport::Point;

/// Input delivered to the viewer by the host's gesture source.
///
/// Locations and deltas are CSS pixels; the viewer converts them with the
/// viewport's device ratio.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum InputEvent {
    /// Incremental pan (mouse wheel scroll, keyboard arrows).
    Pan { dx: f64, dy: f64 },

    /// Pointer pressed at a location; starts a drag.
    DragStart { x: f64, y: f64 },

    /// Cumulative movement since the matching `DragStart`.
    Drag { dx: f64, dy: f64 },

    /// Multiply the scale by `factor` around `anchor` (canvas centre if `None`).
    Zoom { factor: f64, anchor: Option<Point> },

    /// Two-finger gesture started, centred at a location.
    PinchStart { x: f64, y: f64 },

    /// Cumulative scale ratio since the matching `PinchStart`.
    Pinch { ratio: f64 },

    /// Pointer(s) lifted; ends the current gesture.
    Release,

    /// Return to the initial fitted view.
    Reset,

    /// Canvas resized to the given device-pixel size.
    Resize { width: u32, height: u32 },
}

impl InputEvent {
    /// Zoom around the canvas centre.
    pub fn zoom(factor: f64) -> Self {
        Self::Zoom {
            factor,
            anchor: None,
        }
    }

    /// Zoom around a CSS-pixel location.
    pub fn zoom_at(factor: f64, x: f64, y: f64) -> Self {
        Self::Zoom {
            factor,
            anchor: Some(Point::new(x, y)),
        }
    }
}
