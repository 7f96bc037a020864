//! Repaint coalescing.
//!
//! Two triggers can ask for a render:
//!
//! - a **debounced** repaint, rescheduled on every call and fired once the
//!   quiet window has elapsed (tile completions, reset)
//! - an **immediate frame**, a flag serviced at the next display frame
//!   (drag and pinch)
//!
//! Both collapse into one render: rendering clears the frame flag and cancels
//! the pending debounce.

use std::time::Duration;

use tokio::time::Instant;

/// Default quiet window before a debounced repaint.
pub const DEFAULT_REPAINT_DELAY: Duration = Duration::from_millis(100);

/// Default quiet window before the level check.
pub const DEFAULT_LEVEL_CHECK_DELAY: Duration = Duration::from_millis(200);

/// Default display frame interval (~60 Hz).
pub const DEFAULT_FRAME_INTERVAL: Duration = Duration::from_millis(16);

// =============================================================================
// Debounce
// =============================================================================

/// Single-slot cancellable timer.
///
/// At most one deadline is pending; scheduling again replaces it.
#[derive(Debug, Clone)]
pub struct Debounce {
    delay: Duration,
    deadline: Option<Instant>,
}

impl Debounce {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            deadline: None,
        }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// (Re)arm the timer to fire `delay` after `now`.
    pub fn schedule(&mut self, now: Instant) {
        self.deadline = Some(now + self.delay);
    }

    pub fn cancel(&mut self) {
        self.deadline = None;
    }

    pub fn is_pending(&self) -> bool {
        self.deadline.is_some()
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Disarm and return `true` if the deadline has passed.
    pub fn fire_if_due(&mut self, now: Instant) -> bool {
        match self.deadline {
            Some(deadline) if deadline <= now => {
                self.deadline = None;
                true
            }
            _ => false,
        }
    }
}

// =============================================================================
// RepaintScheduler
// =============================================================================

/// Coalesces debounced and next-frame repaint requests.
#[derive(Debug, Clone)]
pub struct RepaintScheduler {
    debounced: Debounce,
    frame_requested: bool,
    renders: u64,
}

impl RepaintScheduler {
    pub fn new(delay: Duration) -> Self {
        Self {
            debounced: Debounce::new(delay),
            frame_requested: false,
            renders: 0,
        }
    }

    /// Replace any pending debounced repaint with one firing after the delay.
    pub fn schedule_repaint(&mut self, now: Instant) {
        self.debounced.schedule(now);
    }

    /// Ask for a render at the next display frame. Repeated requests before
    /// that frame are merged.
    pub fn request_frame(&mut self) {
        self.frame_requested = true;
    }

    pub fn frame_requested(&self) -> bool {
        self.frame_requested
    }

    /// Deadline of the pending debounced repaint.
    pub fn deadline(&self) -> Option<Instant> {
        self.debounced.deadline()
    }

    pub fn is_idle(&self) -> bool {
        !self.frame_requested && !self.debounced.is_pending()
    }

    /// Whether a render is due at `now`, either because a frame was requested
    /// and this is a frame tick, or because the debounce window elapsed.
    pub fn is_due(&self, now: Instant, at_frame: bool) -> bool {
        let debounced = self.debounced.deadline().is_some_and(|d| d <= now);
        debounced || (at_frame && self.frame_requested)
    }

    /// Record that a render happened; clears both triggers.
    pub fn rendered(&mut self) {
        self.frame_requested = false;
        self.debounced.cancel();
        self.renders += 1;
    }

    /// Number of renders performed.
    pub fn renders(&self) -> u64 {
        self.renders
    }
}

impl Default for RepaintScheduler {
    fn default() -> Self {
        Self::new(DEFAULT_REPAINT_DELAY)
    }
}
