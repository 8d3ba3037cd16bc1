// SPDX-License-Identifier: GPL-3.0-only

//! Lutcam - a camera engine with live LUT color-filter preview and capture
//!
//! This library provides the core functionality behind the `lutcam` binary:
//! opening cameras, negotiating stream sizes, rendering a filtered preview,
//! and persisting plain or filtered still captures.
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - [`backends`]: Camera hardware abstraction and the session state machine
//! - [`render`]: LUT filter sets, grid selection and the wgpu preview renderer
//! - [`providers`]: Filter catalog providers and CPU filter application
//! - [`capture`]: Still capture persistence
//! - [`config`]: User configuration handling
//! - [`storage`]: Output directories and file naming

pub mod backends;
pub mod capture;
pub mod config;
pub mod constants;
pub mod errors;
pub mod providers;
pub mod render;
pub mod storage;

// Re-export commonly used types
pub use backends::camera::{CameraSessionManager, SessionNotice};
pub use capture::{ImageCaptureSink, SavedCapture};
pub use config::Config;
pub use errors::{AppError, AppResult};
pub use providers::{BakedFilterProvider, FilterProvider};
pub use render::{FilterSet, PreviewRenderer, SelectionState, TouchSelector};
