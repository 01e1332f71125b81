// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Core scene implementation: structure, updates, queries.

use alloc::vec::Vec;
use kurbo::{Affine, Point, Rect};

use crate::types::{ItemFlags, ItemId, LocalItem};

/// Arena of items forming one or more trees.
///
/// Unlike a batched spatial index, every query reads the current local data:
/// mutations made while input is being delivered are visible to the very next
/// query. Scene-space transforms are derived on demand by walking ancestors.
///
/// ## Example
///
/// ```rust
/// use kurbo::{Point, Rect};
/// use understory_scene::{LocalItem, Scene};
///
/// let mut scene = Scene::new();
/// let root = scene.insert(None, LocalItem::at(Rect::new(0.0, 0.0, 100.0, 100.0)));
/// let child = scene.insert(Some(root), LocalItem::at(Rect::new(25.0, 25.0, 75.0, 75.0)));
///
/// assert_eq!(scene.map_from_scene(child, Point::new(50.0, 50.0)), Some(Point::new(25.0, 25.0)));
/// assert!(scene.contains(child, Point::new(25.0, 25.0)));
/// ```
#[derive(Clone, Default)]
pub struct Scene {
    /// slots
    items: Vec<Option<Item>>,
    /// last generation per slot (persists across frees)
    generations: Vec<u32>,
    free_list: Vec<usize>,
}

impl core::fmt::Debug for Scene {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let total = self.items.len();
        let alive = self.items.iter().filter(|n| n.is_some()).count();
        f.debug_struct("Scene")
            .field("items_total", &total)
            .field("items_alive", &alive)
            .field("free_list", &self.free_list.len())
            .finish_non_exhaustive()
    }
}

#[derive(Clone, Debug)]
struct Item {
    generation: u32,
    parent: Option<ItemId>,
    children: Vec<ItemId>,
    local: LocalItem,
}

impl Scene {
    /// Create an empty scene.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a new item as the last child of `parent` (or as a root if `None`).
    ///
    /// Later siblings paint above earlier ones when their z-index is equal.
    pub fn insert(&mut self, parent: Option<ItemId>, local: LocalItem) -> ItemId {
        let (idx, generation) = if let Some(idx) = self.free_list.pop() {
            let generation = self.generations[idx].saturating_add(1);
            self.generations[idx] = generation;
            self.items[idx] = Some(Item {
                generation,
                parent: None,
                children: Vec::new(),
                local,
            });
            #[allow(
                clippy::cast_possible_truncation,
                reason = "ItemId uses 32-bit indices by design."
            )]
            (idx as u32, generation)
        } else {
            let generation = 1_u32;
            self.items.push(Some(Item {
                generation,
                parent: None,
                children: Vec::new(),
                local,
            }));
            self.generations.push(generation);
            #[allow(
                clippy::cast_possible_truncation,
                reason = "ItemId uses 32-bit indices by design."
            )]
            ((self.items.len() - 1) as u32, generation)
        };
        let id = ItemId::new(idx, generation);
        if let Some(p) = parent
            && self.is_alive(p)
        {
            self.link_parent(id, p);
        }
        id
    }

    /// Remove an item and its subtree. Every removed id becomes stale immediately.
    pub fn remove(&mut self, id: ItemId) {
        if !self.is_alive(id) {
            return;
        }
        if let Some(parent) = self.parent_of(id) {
            self.unlink_parent(id, parent);
        }
        let mut stack = alloc::vec![id];
        while let Some(next) = stack.pop() {
            if let Some(item) = self.items[next.idx()].take() {
                stack.extend(item.children);
                self.free_list.push(next.idx());
            }
        }
    }

    /// Reparent `id` under `new_parent` (or detach it as a root).
    ///
    /// Reparenting an item under its own descendant is ignored.
    pub fn reparent(&mut self, id: ItemId, new_parent: Option<ItemId>) {
        if !self.is_alive(id) {
            return;
        }
        if let Some(p) = new_parent
            && (!self.is_alive(p) || self.is_ancestor_or_self(id, p))
        {
            return;
        }
        if let Some(parent) = self.parent_of(id) {
            self.unlink_parent(id, parent);
        }
        if let Some(p) = new_parent {
            self.link_parent(id, p);
        }
    }

    /// Update local transform.
    pub fn set_transform(&mut self, id: ItemId, tf: Affine) {
        if let Some(n) = self.item_opt_mut(id) {
            n.local.transform = tf;
        }
    }

    /// Update z index.
    pub fn set_z_index(&mut self, id: ItemId, z: i32) {
        if let Some(n) = self.item_opt_mut(id) {
            n.local.z_index = z;
        }
    }

    /// Update local bounds.
    pub fn set_bounds(&mut self, id: ItemId, bounds: Rect) {
        if let Some(n) = self.item_opt_mut(id) {
            n.local.bounds = bounds;
        }
    }

    /// Update item flags.
    pub fn set_flags(&mut self, id: ItemId, flags: ItemFlags) {
        if let Some(n) = self.item_opt_mut(id) {
            n.local.flags = flags;
        }
    }

    /// Set or clear a subset of the item's flags.
    pub fn set_flag(&mut self, id: ItemId, flag: ItemFlags, on: bool) {
        if let Some(n) = self.item_opt_mut(id) {
            n.local.flags.set(flag, on);
        }
    }

    /// Returns true if `id` refers to a live item.
    ///
    /// An `ItemId` is live if its slot is occupied and the generation matches.
    pub fn is_alive(&self, id: ItemId) -> bool {
        self.items
            .get(id.idx())
            .and_then(|n| n.as_ref())
            .is_some_and(|n| n.generation == id.1)
    }

    /// The first live root in insertion order.
    pub fn root(&self) -> Option<ItemId> {
        self.items.iter().enumerate().find_map(|(i, n)| match n {
            Some(n) if n.parent.is_none() => {
                #[allow(
                    clippy::cast_possible_truncation,
                    reason = "ItemId uses 32-bit indices by design."
                )]
                Some(ItemId::new(i as u32, n.generation))
            }
            _ => None,
        })
    }

    /// Returns the parent of an item if live, or `None` for roots or stale ids.
    pub fn parent_of(&self, id: ItemId) -> Option<ItemId> {
        self.item_opt(id).and_then(|n| n.parent)
    }

    /// Get the children of an item in insertion order, or an empty slice if stale.
    pub fn children_of(&self, id: ItemId) -> &[ItemId] {
        self.item_opt(id).map_or(&[], |n| &n.children)
    }

    /// Children ordered back to front: ascending z-index, insertion order among equals.
    pub fn children_in_paint_order(&self, id: ItemId) -> Vec<ItemId> {
        let mut children = self.children_of(id).to_vec();
        // Stable sort keeps insertion order for equal z.
        children.sort_by_key(|c| self.z_index(*c).unwrap_or(0));
        children
    }

    /// Returns the local data of a live item.
    pub fn local(&self, id: ItemId) -> Option<&LocalItem> {
        self.item_opt(id).map(|n| &n.local)
    }

    /// Returns the z-index of a live item.
    pub fn z_index(&self, id: ItemId) -> Option<i32> {
        self.item_opt(id).map(|n| n.local.z_index)
    }

    /// Returns the flags of a live item.
    pub fn flags(&self, id: ItemId) -> Option<ItemFlags> {
        self.item_opt(id).map(|n| n.local.flags)
    }

    /// Returns the local bounds of a live item.
    pub fn bounds(&self, id: ItemId) -> Option<Rect> {
        self.item_opt(id).map(|n| n.local.bounds)
    }

    /// Transform from the item's local space into scene space.
    ///
    /// Derived by composing the transforms of all ancestors. Returns `None`
    /// for stale identifiers.
    pub fn world_transform(&self, id: ItemId) -> Option<Affine> {
        let mut current = Some(id);
        let mut tf = Affine::IDENTITY;
        while let Some(c) = current {
            let item = self.item_opt(c)?;
            tf = item.local.transform * tf;
            current = item.parent;
        }
        Some(tf)
    }

    /// Scene-space axis-aligned bounding box of a live item.
    pub fn world_bounds(&self, id: ItemId) -> Option<Rect> {
        let tf = self.world_transform(id)?;
        let bounds = self.item_opt(id)?.local.bounds;
        Some(tf.transform_rect_bbox(bounds))
    }

    /// Map a scene-space point into the item's local space.
    pub fn map_from_scene(&self, id: ItemId, point: Point) -> Option<Point> {
        self.world_transform(id).map(|tf| tf.inverse() * point)
    }

    /// Map a point in the item's local space into scene space.
    pub fn map_to_scene(&self, id: ItemId, point: Point) -> Option<Point> {
        self.world_transform(id).map(|tf| tf * point)
    }

    /// Whether a local-space point lies inside the item's bounds.
    ///
    /// Stale ids contain nothing.
    pub fn contains(&self, id: ItemId, local: Point) -> bool {
        self.item_opt(id)
            .is_some_and(|n| n.local.bounds.contains(local))
    }

    /// Whether `ancestor` is `id` or one of its ancestors.
    pub fn is_ancestor_or_self(&self, ancestor: ItemId, id: ItemId) -> bool {
        let mut current = Some(id);
        while let Some(c) = current {
            if c == ancestor {
                return true;
            }
            current = self.parent_of(c);
        }
        false
    }

    // --- internals ---

    fn item_opt(&self, id: ItemId) -> Option<&Item> {
        let n = self.items.get(id.idx())?.as_ref()?;
        (n.generation == id.1).then_some(n)
    }

    fn item_opt_mut(&mut self, id: ItemId) -> Option<&mut Item> {
        let n = self.items.get_mut(id.idx())?.as_mut()?;
        if n.generation != id.1 {
            return None;
        }
        Some(n)
    }

    fn link_parent(&mut self, id: ItemId, parent: ItemId) {
        if let Some(p) = self.item_opt_mut(parent) {
            p.children.push(id);
        }
        if let Some(n) = self.item_opt_mut(id) {
            n.parent = Some(parent);
        }
    }

    fn unlink_parent(&mut self, id: ItemId, parent: ItemId) {
        if let Some(p) = self.item_opt_mut(parent) {
            p.children.retain(|c| *c != id);
        }
        if let Some(n) = self.item_opt_mut(id) {
            n.parent = None;
        }
    }
}
