// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Public types for the scene: item identifiers, flags, and local geometry.

use kurbo::{Affine, Rect};

/// Identifier for an item in the scene (generational).
///
/// Removing an item makes every copy of its id stale; a reused slot gets a
/// higher generation, so stale ids never alias a new item.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, PartialOrd, Ord)]
pub struct ItemId(pub(crate) u32, pub(crate) u32);

impl ItemId {
    pub(crate) const fn new(idx: u32, generation: u32) -> Self {
        Self(idx, generation)
    }

    pub(crate) const fn idx(self) -> usize {
        self.0 as usize
    }

    /// Slot index of this id.
    pub const fn index(self) -> u32 {
        self.0
    }

    /// Generation of this id.
    pub const fn generation(self) -> u32 {
        self.1
    }
}

bitflags::bitflags! {
    /// Item flags controlling visibility, input eligibility, and clipping.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub struct ItemFlags: u8 {
        /// Item is visible. Invisible items and their subtrees receive no pointer input.
        const VISIBLE        = 0b0000_0001;
        /// Item is enabled. Disabled items and their subtrees receive no pointer input.
        const ENABLED        = 0b0000_0010;
        /// Item clips its children to its own bounds, for painting and for hit testing.
        const CLIPS_CHILDREN = 0b0000_0100;
        /// Item was culled by the renderer and is skipped by hit testing.
        const CULLED         = 0b0000_1000;
        /// Item hosts a nested scene with its own delivery agent.
        const SUBSCENE       = 0b0001_0000;
    }
}

impl Default for ItemFlags {
    fn default() -> Self {
        Self::VISIBLE | Self::ENABLED
    }
}

/// Local geometry for an item.
#[derive(Clone, Debug)]
pub struct LocalItem {
    /// Local (untransformed) bounds.
    pub bounds: Rect,
    /// Transform from this item's space into its parent's space.
    pub transform: Affine,
    /// Z-order among siblings. Higher paints on top; negative paints below the parent.
    pub z_index: i32,
    /// Visibility, input and clip flags.
    pub flags: ItemFlags,
}

impl Default for LocalItem {
    fn default() -> Self {
        Self {
            bounds: Rect::ZERO,
            transform: Affine::IDENTITY,
            z_index: 0,
            flags: ItemFlags::default(),
        }
    }
}

impl LocalItem {
    /// An item covering `bounds` in its parent's coordinate space.
    ///
    /// The rectangle's origin becomes a translation so the local bounds start
    /// at the origin, the way most scene graphs position children.
    pub fn at(bounds: Rect) -> Self {
        Self {
            bounds: Rect::from_origin_size(kurbo::Point::ZERO, bounds.size()),
            transform: Affine::translate(bounds.origin().to_vec2()),
            ..Self::default()
        }
    }

    /// Builder-style z-index override.
    pub fn with_z(mut self, z_index: i32) -> Self {
        self.z_index = z_index;
        self
    }

    /// Builder-style transform override.
    pub fn with_transform(mut self, transform: Affine) -> Self {
        self.transform = transform;
        self
    }

    /// Builder-style flag override.
    pub fn with_flags(mut self, flags: ItemFlags) -> Self {
        self.flags = flags;
        self
    }
}
