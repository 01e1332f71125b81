// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

// After you edit the crate's doc comment, run this command, then check README.md for any missing links
// cargo rdme --workspace-project=understory_scene --heading-base-level=0

//! Understory Scene: a Kurbo-native item tree for input delivery.
//!
//! - Represents a hierarchy of items with local bounds, transforms, z-order, and flags.
//! - Maps points between scene space and item-local space.
//! - Lists children in paint order, which is what pointer hit testing walks (in reverse).
//!
//! Items are stored in a generational arena. An [`ItemId`] stays valid until its
//! item is removed; afterwards [`Scene::is_alive`] reports `false` and every query
//! returns `None` (or an empty result) instead of touching a reused slot. Input
//! delivery relies on that property: callbacks may remove items while an event is
//! being delivered, and the delivery engine checks liveness before reading again.
//!
//! ## Where this fits
//!
//! `understory_delivery` consumes a scene through its `ItemTree` trait and
//! implements that trait for [`Scene`] behind its `scene_adapter` feature.
//! Acceptance policy (touch, mouse buttons, hover) lives with the delivery host,
//! not here: this crate only answers structural and geometric questions.
//!
//! ## API overview
//!
//! - [`Scene`]: container managing items.
//! - [`LocalItem`]: per-item local data (bounds, transform, z, flags).
//! - [`ItemFlags`]: visible, enabled, clips-children, culled, and sub-scene markers.
//! - [`ItemId`]: generational handle of an item.
//!
//! Key operations:
//! - [`Scene::insert`] / [`Scene::remove`] / [`Scene::reparent`]
//! - [`Scene::set_transform`] / [`Scene::set_bounds`] / [`Scene::set_z_index`] / [`Scene::set_flags`]
//! - [`Scene::children_in_paint_order`] for back-to-front child order.
//! - [`Scene::map_from_scene`] / [`Scene::map_to_scene`] / [`Scene::contains`].
//!
//! This crate is `no_std` and uses `alloc`.

#![no_std]

extern crate alloc;

mod tree;
mod types;

pub use tree::Scene;
pub use types::{ItemFlags, ItemId, LocalItem};
