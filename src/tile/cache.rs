//! Per-level tile cache.
//!
//! Each zoom level owns two sparse maps keyed by row-major tile index:
//! resident images and in-flight loads. A slot is always in exactly one of
//! three states:
//!
//! ```text
//!            request()             load ok, level active
//!   Absent ────────────▶ Loading ───────────────────────▶ Resident
//!     ▲                    │                                 │
//!     └────────────────────┴──── failure / evict / clear ────┘
//! ```
//!
//! # Stale Completions
//!
//! Loads run as detached tasks and report back through a channel. Every load
//! carries a [`LoadTicket`]; a completion is only accepted if its ticket is
//! still the one recorded for the slot. A slot that was evicted (or re-requested)
//! while the load was in flight therefore never gets repopulated, and an image
//! that arrives for a level that is no longer active is released immediately.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::debug;

use crate::error::LoadError;
use crate::pyramid::Pyramid;
use crate::view::TileRect;

use super::address::{TileAddressing, TileKey};
use super::source::TileSource;

// =============================================================================
// Load Bookkeeping
// =============================================================================

/// Identity of one issued load.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LoadTicket(u64);

/// Result of a finished load, delivered back to the cache owner.
#[derive(Debug)]
pub struct TileLoadResult<I> {
    /// Slot the load was issued for
    pub key: TileKey,

    /// Ticket recorded when the load was issued
    pub ticket: LoadTicket,

    /// Decoded image or the failure
    pub result: Result<I, LoadError>,
}

/// What the cache did with a finished load.
#[derive(Debug, Clone)]
pub enum LoadOutcome {
    /// Image became resident
    Stored,

    /// Load failed; the slot is absent again and may be re-requested
    Failed(LoadError),

    /// Image arrived for a level that is no longer active and was released
    Stale,

    /// Slot was released while the load was in flight; result dropped
    Discarded,
}

/// Observable state of a tile slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotState {
    Absent,
    Loading,
    Resident,
}

struct LevelSlots<I> {
    tiles_x: u32,
    resident: HashMap<usize, I>,
    loading: HashMap<usize, LoadTicket>,
}

impl<I> LevelSlots<I> {
    fn new(tiles_x: u32) -> Self {
        Self {
            tiles_x,
            resident: HashMap::new(),
            loading: HashMap::new(),
        }
    }

    fn coords(&self, index: usize) -> (u32, u32) {
        let tiles_x = self.tiles_x.max(1) as usize;
        ((index % tiles_x) as u32, (index / tiles_x) as u32)
    }
}

// =============================================================================
// Tile Cache
// =============================================================================

/// Sparse store of resident and loading tiles for every pyramid level.
pub struct TileCache<S: TileSource> {
    /// Source issuing the loads and receiving released images
    source: Arc<S>,

    /// Resource naming for tiles
    addressing: TileAddressing,

    /// Pyramid the slots are laid out for
    pyramid: Arc<Pyramid>,

    /// Slots per level, indexed by level number
    levels: Vec<LevelSlots<S::Image>>,

    /// Next ticket number
    next_ticket: u64,

    /// Loads spawned whose result has not been processed yet
    in_flight: usize,

    completions_tx: mpsc::UnboundedSender<TileLoadResult<S::Image>>,
    completions_rx: mpsc::UnboundedReceiver<TileLoadResult<S::Image>>,
}

impl<S: TileSource> TileCache<S> {
    /// Create an empty cache for a pyramid.
    pub fn new(source: Arc<S>, addressing: TileAddressing, pyramid: Arc<Pyramid>) -> Self {
        let (completions_tx, completions_rx) = mpsc::unbounded_channel();
        let levels = Self::slots_for(&pyramid);
        Self {
            source,
            addressing,
            pyramid,
            levels,
            next_ticket: 0,
            in_flight: 0,
            completions_tx,
            completions_rx,
        }
    }

    fn slots_for(pyramid: &Pyramid) -> Vec<LevelSlots<S::Image>> {
        pyramid
            .levels()
            .iter()
            .map(|l| LevelSlots::new(l.tiles_x))
            .collect()
    }

    /// Release everything and lay the cache out for a new pyramid.
    ///
    /// Loads still in flight for the old pyramid are discarded on arrival.
    pub fn reset(&mut self, pyramid: Arc<Pyramid>) {
        self.clear_all();
        self.levels = Self::slots_for(&pyramid);
        self.pyramid = pyramid;
    }

    /// The pyramid this cache is laid out for.
    pub fn pyramid(&self) -> &Arc<Pyramid> {
        &self.pyramid
    }

    /// The addressing used for tile requests.
    pub fn addressing(&self) -> &TileAddressing {
        &self.addressing
    }

    fn index_of(&self, key: TileKey) -> Option<usize> {
        self.pyramid.level(key.level)?.tile_index(key.x, key.y)
    }

    /// Start loading a tile.
    ///
    /// No-op (returns `false`) when the slot is already loading or resident, or
    /// lies outside the pyramid. At most one load is outstanding per slot.
    pub fn request(&mut self, key: TileKey) -> bool {
        let Some(index) = self.index_of(key) else {
            return false;
        };
        let Some(address) = self.addressing.address(&self.pyramid, key) else {
            return false;
        };
        let slots = &mut self.levels[key.level];
        if slots.loading.contains_key(&index) || slots.resident.contains_key(&index) {
            return false;
        }

        let ticket = LoadTicket(self.next_ticket);
        self.next_ticket += 1;
        slots.loading.insert(index, ticket);
        self.in_flight += 1;

        let source = Arc::clone(&self.source);
        let tx = self.completions_tx.clone();
        tokio::spawn(async move {
            let result = source.load_image(&address.url).await;
            if let Err(unsent) = tx.send(TileLoadResult {
                key,
                ticket,
                result,
            }) {
                // Cache is gone; nothing will pick the image up
                if let Ok(image) = unsent.0.result {
                    source.release_image(image);
                }
            }
        });
        true
    }

    /// Wait for the next finished load.
    pub async fn next_completion(&mut self) -> Option<TileLoadResult<S::Image>> {
        self.completions_rx.recv().await
    }

    /// Take a finished load without waiting, if one is queued.
    pub fn try_next_completion(&mut self) -> Option<TileLoadResult<S::Image>> {
        self.completions_rx.try_recv().ok()
    }

    /// Apply a finished load to the cache.
    ///
    /// The image only becomes resident if the slot still holds the same ticket
    /// and `active_level` is the load's level.
    pub fn complete(
        &mut self,
        done: TileLoadResult<S::Image>,
        active_level: usize,
    ) -> LoadOutcome {
        let TileLoadResult {
            key,
            ticket,
            result,
        } = done;
        self.in_flight = self.in_flight.saturating_sub(1);

        let index = self.index_of(key).filter(|index| {
            self.levels
                .get(key.level)
                .and_then(|slots| slots.loading.get(index))
                == Some(&ticket)
        });
        let Some(index) = index else {
            if let Ok(image) = result {
                self.source.release_image(image);
            }
            return LoadOutcome::Discarded;
        };

        let slots = &mut self.levels[key.level];
        slots.loading.remove(&index);

        match result {
            Err(e) => LoadOutcome::Failed(e),
            Ok(image) if key.level != active_level => {
                self.source.release_image(image);
                LoadOutcome::Stale
            }
            Ok(image) => {
                slots.resident.insert(index, image);
                LoadOutcome::Stored
            }
        }
    }

    /// Release every slot of `level` that lies outside `rect`.
    ///
    /// Afterwards the level holds no resident or loading slot outside the
    /// rectangle. Slots inside it are untouched. Returns the number of slots
    /// released.
    pub fn evict_outside(&mut self, level: usize, rect: &TileRect) -> usize {
        let Some(slots) = self.levels.get_mut(level) else {
            return 0;
        };
        let source = &self.source;
        let tiles_x = slots.tiles_x.max(1) as usize;
        let outside = |index: &usize| {
            let (x, y) = ((index % tiles_x) as u32, (index / tiles_x) as u32);
            !rect.contains(x, y)
        };

        let evict: Vec<usize> = slots.resident.keys().copied().filter(outside).collect();
        for index in &evict {
            if let Some(image) = slots.resident.remove(index) {
                source.release_image(image);
            }
        }

        let before = slots.loading.len();
        slots.loading.retain(|index, _| !outside(index));
        let released = evict.len() + (before - slots.loading.len());

        if released > 0 {
            debug!(level, released, "Evicted tiles outside the visible rectangle");
        }
        released
    }

    /// Release every resident and loading slot of a level.
    pub fn clear_level(&mut self, level: usize) -> usize {
        let Some(slots) = self.levels.get_mut(level) else {
            return 0;
        };
        let released = slots.resident.len() + slots.loading.len();
        for (_, image) in slots.resident.drain() {
            self.source.release_image(image);
        }
        slots.loading.clear();
        released
    }

    /// Release every slot on every level.
    pub fn clear_all(&mut self) {
        for level in 0..self.levels.len() {
            self.clear_level(level);
        }
    }

    /// Resident image of a tile.
    pub fn get(&self, key: TileKey) -> Option<&S::Image> {
        let index = self.index_of(key)?;
        self.levels.get(key.level)?.resident.get(&index)
    }

    /// State of a tile slot.
    pub fn state(&self, key: TileKey) -> SlotState {
        let Some(index) = self.index_of(key) else {
            return SlotState::Absent;
        };
        let slots = &self.levels[key.level];
        if slots.resident.contains_key(&index) {
            SlotState::Resident
        } else if slots.loading.contains_key(&index) {
            SlotState::Loading
        } else {
            SlotState::Absent
        }
    }

    /// Number of resident tiles on a level.
    pub fn resident_count(&self, level: usize) -> usize {
        self.levels.get(level).map_or(0, |s| s.resident.len())
    }

    /// Number of tiles loading on a level.
    pub fn loading_count(&self, level: usize) -> usize {
        self.levels.get(level).map_or(0, |s| s.loading.len())
    }

    /// Loads spawned whose completion has not been applied yet, including
    /// loads whose slot was already released.
    pub fn in_flight(&self) -> usize {
        self.in_flight
    }

    /// Coordinates of every resident or loading slot of a level.
    pub fn occupied(&self, level: usize) -> Vec<(u32, u32)> {
        let Some(slots) = self.levels.get(level) else {
            return Vec::new();
        };
        let mut coords: Vec<(u32, u32)> = slots
            .resident
            .keys()
            .chain(slots.loading.keys())
            .map(|&index| slots.coords(index))
            .collect();
        coords.sort_unstable();
        coords
    }
}

impl<S: TileSource> Drop for TileCache<S> {
    fn drop(&mut self) {
        self.clear_all();
    }
}

// =============================================================================
// Tests
// =============================================================================
