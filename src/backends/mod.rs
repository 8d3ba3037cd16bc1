// SPDX-License-Identifier: GPL-3.0-only

//! Backend abstraction layer for camera hardware
//!
//! Everything device-specific lives below this module; the rest of the crate
//! only sees the [`camera::CameraHardware`] trait and the session manager
//! that drives it.

pub mod camera;
