// SPDX-License-Identifier: GPL-3.0-only

//! Preview rendering: LUT filter sets, grid selection state and the
//! offscreen wgpu renderer.

pub mod luts;
pub mod preview;
pub mod selection;

pub use luts::{FilterEntry, FilterSet};
pub use preview::PreviewRenderer;
pub use selection::{GesturePhase, SelectionState, TouchSelector};
