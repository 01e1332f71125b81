// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! [`ItemTree`] for Understory Scene.
//!
//! ## Feature
//!
//! Enable with `scene_adapter`.
//!
//! ## Notes
//!
//! Queries on stale ids answer conservatively: no children, z 0, empty bounds,
//! identity mapping, and every flag cleared, so a removed item is invisible,
//! disabled, and contains nothing.

use alloc::vec::Vec;

use kurbo::{Point, Rect};
use understory_scene::{ItemFlags, ItemId, Scene};

use crate::host::ItemTree;

fn has_flag(scene: &Scene, item: ItemId, flag: ItemFlags) -> bool {
    scene.flags(item).is_some_and(|f| f.contains(flag))
}

impl ItemTree<ItemId> for Scene {
    fn root(&self) -> Option<ItemId> {
        Self::root(self)
    }

    fn is_alive(&self, item: ItemId) -> bool {
        Self::is_alive(self, item)
    }

    fn parent_of(&self, item: ItemId) -> Option<ItemId> {
        Self::parent_of(self, item)
    }

    fn children_in_paint_order(&self, item: ItemId) -> Vec<ItemId> {
        Self::children_in_paint_order(self, item)
    }

    fn z_index(&self, item: ItemId) -> i32 {
        Self::z_index(self, item).unwrap_or(0)
    }

    fn bounds(&self, item: ItemId) -> Rect {
        Self::bounds(self, item).unwrap_or(Rect::ZERO)
    }

    fn contains(&self, item: ItemId, local: Point) -> bool {
        Self::contains(self, item, local)
    }

    fn map_from_scene(&self, item: ItemId, scene: Point) -> Point {
        Self::map_from_scene(self, item, scene).unwrap_or(scene)
    }

    fn map_to_scene(&self, item: ItemId, local: Point) -> Point {
        Self::map_to_scene(self, item, local).unwrap_or(local)
    }

    fn is_visible(&self, item: ItemId) -> bool {
        has_flag(self, item, ItemFlags::VISIBLE)
    }

    fn is_enabled(&self, item: ItemId) -> bool {
        has_flag(self, item, ItemFlags::ENABLED)
    }

    fn clips_children(&self, item: ItemId) -> bool {
        has_flag(self, item, ItemFlags::CLIPS_CHILDREN)
    }

    fn is_culled(&self, item: ItemId) -> bool {
        has_flag(self, item, ItemFlags::CULLED)
    }

    fn is_subscene(&self, item: ItemId) -> bool {
        has_flag(self, item, ItemFlags::SUBSCENE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kurbo::Affine;
    use understory_scene::LocalItem;

    #[test]
    fn scene_answers_tree_queries() {
        let mut scene = Scene::new();
        let root = scene.insert(None, LocalItem::at(Rect::new(0.0, 0.0, 200.0, 200.0)));
        let child = scene.insert(
            Some(root),
            LocalItem::at(Rect::new(0.0, 0.0, 10.0, 10.0))
                .with_transform(Affine::translate((50.0, 20.0))),
        );
        let tree: &dyn ItemTree<ItemId> = &scene;
        assert_eq!(tree.root(), Some(root));
        assert_eq!(tree.parent_of(child), Some(root));
        assert_eq!(tree.map_from_scene(child, Point::new(55.0, 25.0)), Point::new(5.0, 5.0));
        assert_eq!(tree.map_to_scene(child, Point::new(5.0, 5.0)), Point::new(55.0, 25.0));
        assert!(tree.is_visible(child) && tree.is_enabled(child));
        assert!(!tree.clips_children(child));
    }

    #[test]
    fn stale_ids_are_inert() {
        let mut scene = Scene::new();
        let root = scene.insert(None, LocalItem::at(Rect::new(0.0, 0.0, 100.0, 100.0)));
        let gone = scene.insert(Some(root), LocalItem::at(Rect::new(0.0, 0.0, 10.0, 10.0)));
        scene.remove(gone);
        let tree: &dyn ItemTree<ItemId> = &scene;
        assert!(!tree.is_alive(gone));
        assert!(!tree.is_visible(gone));
        assert!(!tree.is_enabled(gone));
        assert!(!tree.contains(gone, Point::new(1.0, 1.0)));
        assert_eq!(tree.bounds(gone), Rect::ZERO);
        assert!(tree.children_in_paint_order(gone).is_empty());
        assert_eq!(tree.map_from_scene(gone, Point::new(3.0, 4.0)), Point::new(3.0, 4.0));
    }
}
