// SPDX-License-Identifier: GPL-3.0-only

//! Filter selection
//!
//! [`SelectionState`] is the shared truth about which filter is committed
//! and whether the 3x3 comparison grid is showing; the renderer and the
//! session both read it. [`TouchSelector`] turns raw touch gestures into
//! commits: a filter changes only when the finger goes down and comes up on
//! the same tile.

use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};
use std::sync::{Arc, Mutex};

use tracing::{debug, info};

use super::luts::FilterSet;
use crate::backends::camera::types::Dimension;
use crate::constants::filters::{GRID_DIM, NO_FILTER_ID};

/// Shared selection state.
///
/// Cheap to read from the render loop every frame; the filter set itself
/// changes rarely and sits behind a mutex.
#[derive(Default)]
pub struct SelectionState {
    grid_visible: AtomicBool,
    committed_id: AtomicI32,
    filters: Mutex<Option<Arc<FilterSet>>>,
}

impl SelectionState {
    pub fn new() -> Self {
        Self {
            grid_visible: AtomicBool::new(false),
            committed_id: AtomicI32::new(NO_FILTER_ID),
            filters: Mutex::new(None),
        }
    }

    pub fn set_filters(&self, filters: Arc<FilterSet>) {
        if let Ok(mut slot) = self.filters.lock() {
            *slot = Some(filters);
        }
    }

    pub fn filters(&self) -> Option<Arc<FilterSet>> {
        self.filters.lock().ok().and_then(|slot| slot.clone())
    }

    pub fn grid_visible(&self) -> bool {
        self.grid_visible.load(Ordering::Relaxed)
    }

    pub fn set_grid_visible(&self, visible: bool) {
        self.grid_visible.store(visible, Ordering::Relaxed);
    }

    /// Committed filter id, or the no-filter sentinel.
    pub fn committed_id(&self) -> i32 {
        self.committed_id.load(Ordering::Relaxed)
    }

    /// Committed filter as an option, for capture requests.
    pub fn committed_filter(&self) -> Option<i32> {
        let id = self.committed_id();
        (id != NO_FILTER_ID).then_some(id)
    }

    /// Grid slot of the committed filter, if it maps to one.
    pub fn committed_slot(&self) -> Option<usize> {
        let id = self.committed_id();
        if id == NO_FILTER_ID {
            return None;
        }
        self.filters().and_then(|set| set.slot_of_id(id))
    }

    fn commit_slot(&self, slot: usize) -> i32 {
        let id = self
            .filters()
            .and_then(|set| set.entries().get(slot).map(|e| e.id))
            .unwrap_or(NO_FILTER_ID);
        self.committed_id.store(id, Ordering::Relaxed);
        id
    }

    /// Commit a filter by id, bypassing the touch grid.
    ///
    /// Returns whether the id was found in the loaded set; an unknown id
    /// leaves the current commit unchanged.
    pub fn commit_filter(&self, id: i32) -> bool {
        let known = self
            .filters()
            .map(|set| set.slot_of_id(id).is_some())
            .unwrap_or(false);
        if known {
            self.committed_id.store(id, Ordering::Relaxed);
        }
        known
    }

    pub fn clear_filter(&self) {
        self.committed_id.store(NO_FILTER_ID, Ordering::Relaxed);
    }
}

/// Phase of a pointer gesture as delivered by the windowing layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GesturePhase {
    Down,
    Up,
    /// Movement, cancellation, leaving the surface
    Other,
}

/// Turns touch gestures over the preview into filter commits.
#[derive(Debug, Default)]
pub struct TouchSelector {
    down_index: Option<usize>,
}

impl TouchSelector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Tile under a point, with the bottom-left tile as index 0.
    ///
    /// The grid is addressed bottom-up while window coordinates grow
    /// downward, so the row comes from the distance to the bottom edge.
    /// Returns `None` for a degenerate view.
    pub fn grid_index(view: Dimension, x: f32, y: f32) -> Option<usize> {
        if view.width == 0 || view.height == 0 {
            return None;
        }
        let dim = GRID_DIM as f32;
        let max = (GRID_DIM - 1) as i64;
        let col = ((dim * x) / view.width as f32).floor() as i64;
        let row = ((dim * (view.height as f32 - y)) / view.height as f32).floor() as i64;
        let col = col.clamp(0, max) as usize;
        let row = row.clamp(0, max) as usize;
        Some(col + GRID_DIM as usize * row)
    }

    /// Feed one gesture event. Returns the newly committed filter id when
    /// the gesture completed a selection.
    ///
    /// Selections only happen while the grid is visible, and only when the
    /// finger lifts on the tile it went down on. A successful selection
    /// hides the grid.
    pub fn handle_touch(
        &mut self,
        selection: &SelectionState,
        view: Dimension,
        phase: GesturePhase,
        x: f32,
        y: f32,
    ) -> Option<i32> {
        if !selection.grid_visible() {
            self.down_index = None;
            return None;
        }
        let index = Self::grid_index(view, x, y)?;

        match phase {
            GesturePhase::Down => {
                debug!(index, "touch down on filter tile");
                self.down_index = Some(index);
                None
            }
            GesturePhase::Up => {
                let started_on = self.down_index.take();
                if started_on == Some(index) {
                    let id = selection.commit_slot(index);
                    selection.set_grid_visible(false);
                    info!(slot = index, filter_id = id, "filter committed");
                    Some(id)
                } else {
                    debug!(?started_on, ended_on = index, "gesture crossed tiles, ignoring");
                    None
                }
            }
            GesturePhase::Other => {
                self.down_index = None;
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::luts::{FilterEntry, FilterSet, identity_lut};

    fn three_filters() -> Arc<FilterSet> {
        let entries = vec![
            FilterEntry {
                name: "a".to_string(),
                id: 10,
                is_grayscale: false,
            },
            FilterEntry {
                name: "b".to_string(),
                id: 20,
                is_grayscale: false,
            },
            FilterEntry {
                name: "c".to_string(),
                id: 30,
                is_grayscale: true,
            },
        ];
        let luts = vec![identity_lut(), identity_lut(), identity_lut()];
        Arc::new(FilterSet::from_luts(entries, luts).unwrap())
    }

    #[test]
    fn test_grid_index_bottom_origin() {
        let view = Dimension::new(300, 300);
        // Bottom-left corner area is tile 0
        assert_eq!(TouchSelector::grid_index(view, 50.0, 250.0), Some(0));
        // Top-left is tile 6
        assert_eq!(TouchSelector::grid_index(view, 10.0, 10.0), Some(6));
        // Bottom-right is tile 2
        assert_eq!(TouchSelector::grid_index(view, 290.0, 290.0), Some(2));
        // Center is tile 4
        assert_eq!(TouchSelector::grid_index(view, 150.0, 150.0), Some(4));
    }

    #[test]
    fn test_grid_index_clamps_overshoot() {
        let view = Dimension::new(300, 300);
        assert_eq!(TouchSelector::grid_index(view, 299.9, 0.0), Some(8));
        assert_eq!(TouchSelector::grid_index(view, 10_000.0, -50.0), Some(8));
        assert_eq!(TouchSelector::grid_index(view, -10.0, 10_000.0), Some(0));
    }

    #[test]
    fn test_grid_index_degenerate_view() {
        assert_eq!(TouchSelector::grid_index(Dimension::new(0, 300), 1.0, 1.0), None);
        assert_eq!(TouchSelector::grid_index(Dimension::new(300, 0), 1.0, 1.0), None);
    }

    #[test]
    fn test_down_up_same_tile_commits() {
        let selection = SelectionState::new();
        selection.set_filters(three_filters());
        selection.set_grid_visible(true);
        let view = Dimension::new(300, 300);
        let mut selector = TouchSelector::new();

        // Tile 1 (bottom middle) holds filter id 20
        assert_eq!(
            selector.handle_touch(&selection, view, GesturePhase::Down, 150.0, 280.0),
            None
        );
        assert_eq!(
            selector.handle_touch(&selection, view, GesturePhase::Up, 160.0, 290.0),
            Some(20)
        );
        assert_eq!(selection.committed_id(), 20);
        assert!(!selection.grid_visible());
    }

    #[test]
    fn test_crossing_tiles_does_not_commit() {
        let selection = SelectionState::new();
        selection.set_filters(three_filters());
        selection.set_grid_visible(true);
        let view = Dimension::new(300, 300);
        let mut selector = TouchSelector::new();

        selector.handle_touch(&selection, view, GesturePhase::Down, 10.0, 290.0);
        let committed = selector.handle_touch(&selection, view, GesturePhase::Up, 290.0, 10.0);
        assert_eq!(committed, None);
        assert_eq!(selection.committed_id(), NO_FILTER_ID);
        assert!(selection.grid_visible());
    }

    #[test]
    fn test_hidden_grid_ignores_touches() {
        let selection = SelectionState::new();
        selection.set_filters(three_filters());
        let view = Dimension::new(300, 300);
        let mut selector = TouchSelector::new();

        selector.handle_touch(&selection, view, GesturePhase::Down, 150.0, 150.0);
        let committed = selector.handle_touch(&selection, view, GesturePhase::Up, 150.0, 150.0);
        assert_eq!(committed, None);
        assert_eq!(selection.committed_id(), NO_FILTER_ID);
    }

    #[test]
    fn test_empty_tile_commits_no_filter() {
        let selection = SelectionState::new();
        selection.set_filters(three_filters());
        selection.set_grid_visible(true);
        let view = Dimension::new(300, 300);
        let mut selector = TouchSelector::new();

        // Tile 4 has no filter (only 3 filters exist)
        selector.handle_touch(&selection, view, GesturePhase::Down, 150.0, 150.0);
        let committed = selector.handle_touch(&selection, view, GesturePhase::Up, 150.0, 150.0);
        assert_eq!(committed, Some(NO_FILTER_ID));
        assert_eq!(selection.committed_filter(), None);
    }

    #[test]
    fn test_committed_slot_lookup() {
        let selection = SelectionState::new();
        selection.set_filters(three_filters());
        assert_eq!(selection.committed_slot(), None);
        selection.set_grid_visible(true);
        let mut selector = TouchSelector::new();
        let view = Dimension::new(300, 300);
        selector.handle_touch(&selection, view, GesturePhase::Down, 280.0, 280.0);
        selector.handle_touch(&selection, view, GesturePhase::Up, 280.0, 280.0);
        assert_eq!(selection.committed_id(), 30);
        assert_eq!(selection.committed_slot(), Some(2));
        selection.clear_filter();
        assert_eq!(selection.committed_slot(), None);
    }

    #[test]
    fn test_commit_filter_by_id() {
        let selection = SelectionState::new();
        selection.set_filters(three_filters());

        assert!(selection.commit_filter(20));
        assert_eq!(selection.committed_id(), 20);

        // Unknown ids are rejected and leave the commit alone
        assert!(!selection.commit_filter(99));
        assert_eq!(selection.committed_id(), 20);
    }

    #[test]
    fn test_commit_filter_without_catalog() {
        let selection = SelectionState::new();
        assert!(!selection.commit_filter(10));
        assert_eq!(selection.committed_id(), NO_FILTER_ID);
    }
}
