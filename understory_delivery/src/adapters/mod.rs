// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Adapters to integrate with other Understory crates.
//!
//! Each adapter is gated behind a feature flag so the core engine stays
//! lightweight and `no_std` by default.
//!
//! ## Available Adapters
//!
//! - [`scene`] (`scene_adapter` feature): implements [`ItemTree`](crate::host::ItemTree)
//!   for [`understory_scene::Scene`], so a scene can be handed to the agent directly.

#[cfg(feature = "scene_adapter")]
pub mod scene;
