// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Collaborator traits: the item tree and the host that owns the items.
//!
//! ## Overview
//!
//! The engine knows nothing about widgets. It reads geometry through
//! [`ItemTree`] and asks everything else (what an item accepts, which handlers
//! it has, and what happens when something is delivered to it) through
//! [`Host`]. Items and handlers are plain copyable keys; the engine never holds
//! anything but keys, and checks liveness through these traits before reading
//! anything about a target after a callback has run.
//!
//! Most [`Host`] methods have inert defaults, so a host that only cares about
//! items implements [`Host::tree`], [`Host::accepts_touch`],
//! [`Host::accepted_mouse_buttons`] and [`Host::deliver`].

use alloc::vec::Vec;

use kurbo::{Point, Rect};
use smallvec::SmallVec;

use crate::context::{EventCx, LocalEvent, LocalPoint};
use crate::drag::DragEvent;
use crate::focus::{FocusNotification, KeyEvent};
use crate::grab::GrabChange;
use crate::hover::HoverEvent;
use crate::types::{Key, MouseButtons, Target};

/// Spatial queries on the item tree.
///
/// Every query on a dead item must answer conservatively (not visible, no
/// children, identity mapping) rather than panic.
pub trait ItemTree<K> {
    /// The root item, if the tree is not empty.
    fn root(&self) -> Option<K>;

    /// Whether `item` still exists.
    fn is_alive(&self, item: K) -> bool;

    /// Parent of `item`.
    fn parent_of(&self, item: K) -> Option<K>;

    /// Children of `item`, back to front.
    fn children_in_paint_order(&self, item: K) -> Vec<K>;

    /// Stacking order among siblings.
    fn z_index(&self, item: K) -> i32;

    /// Bounds in local coordinates.
    fn bounds(&self, item: K) -> Rect;

    /// Whether a local position is inside `item`.
    fn contains(&self, item: K, local: Point) -> bool {
        self.bounds(item).contains(local)
    }

    /// Map a scene position into `item`'s local space.
    fn map_from_scene(&self, item: K, scene: Point) -> Point;

    /// Map a local position of `item` into the scene.
    fn map_to_scene(&self, item: K, local: Point) -> Point;

    /// Visibility flag.
    fn is_visible(&self, item: K) -> bool;

    /// Enabled flag.
    fn is_enabled(&self, item: K) -> bool;

    /// Whether `item` clips hit testing of its descendants to its bounds.
    fn clips_children(&self, item: K) -> bool;

    /// Culled items are skipped by hit testing.
    fn is_culled(&self, _item: K) -> bool {
        false
    }

    /// Roots of nested scenes with their own agent are skipped by this agent.
    fn is_subscene(&self, _item: K) -> bool {
        false
    }
}

/// Kind of ungrab notification sent to a plain item.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum UngrabKind {
    /// The item lost the mouse (or a touch point acting as the mouse).
    Mouse,
    /// The item lost its last touch point.
    Touch,
}

/// The owner of the items: capability queries and dispatch.
pub trait Host {
    /// Item key.
    type Item: Key;
    /// Handler key.
    type Handler: Key;
    /// Item tree type.
    type Tree: ItemTree<Self::Item>;

    /// The item tree.
    fn tree(&self) -> &Self::Tree;

    /// Whether `item` handles touch events itself.
    fn accepts_touch(&self, item: Self::Item) -> bool;

    /// Mouse buttons `item` reacts to.
    fn accepted_mouse_buttons(&self, item: Self::Item) -> MouseButtons;

    /// Whether `item` wants hover events.
    fn hover_enabled(&self, _item: Self::Item) -> bool {
        false
    }

    /// Whether `item` wants to see its descendants' pointer events first.
    fn filters_child_events(&self, _item: Self::Item) -> bool {
        false
    }

    /// Whether `item` is a drop target.
    fn accepts_drops(&self, _item: Self::Item) -> bool {
        false
    }

    /// Whether `item` is a focus scope.
    fn is_focus_scope(&self, _item: Self::Item) -> bool {
        false
    }

    /// Pointer handlers attached to `item`.
    fn handlers(&self, _item: Self::Item) -> SmallVec<[Self::Handler; 2]> {
        SmallVec::new()
    }

    /// The item `handler` is attached to, or `None` if the handler is gone.
    fn handler_item(&self, _handler: Self::Handler) -> Option<Self::Item> {
        None
    }

    /// Whether `handler` tracks hover.
    fn handler_hover_enabled(&self, _handler: Self::Handler) -> bool {
        false
    }

    /// Extra margin around the parent item's bounds used for handler hover.
    fn handler_margin(&self, _handler: Self::Handler) -> f64 {
        0.0
    }

    /// Deliver a pointer event to an item; return whether it consumed it.
    fn deliver(
        &mut self,
        item: Self::Item,
        event: &LocalEvent<'_>,
        cx: &mut EventCx<'_, Self::Item, Self::Handler>,
    ) -> bool;

    /// Whether `handler` wants `point`.
    fn wants_point(
        &self,
        _handler: Self::Handler,
        _event: &LocalEvent<'_>,
        _point: &LocalPoint<'_>,
    ) -> bool {
        false
    }

    /// Deliver a pointer event to a handler.
    ///
    /// Handlers take points by accepting or grabbing them through `cx`.
    fn handle(
        &mut self,
        _handler: Self::Handler,
        _event: &LocalEvent<'_>,
        _cx: &mut EventCx<'_, Self::Item, Self::Handler>,
    ) {
    }

    /// Offer a descendant's event to a filtering ancestor; `true` intercepts it.
    fn child_event_filter(
        &mut self,
        _filter: Self::Item,
        _child: Self::Item,
        _event: &LocalEvent<'_>,
        _cx: &mut EventCx<'_, Self::Item, Self::Handler>,
    ) -> bool {
        false
    }

    /// A grab transition concerning `change.target`.
    fn grab_changed(&mut self, _change: &GrabChange<Target<Self::Item, Self::Handler>>) {}

    /// A plain item no longer receives the points it was handling.
    fn item_ungrabbed(&mut self, _item: Self::Item, _kind: UngrabKind) {}

    /// Deliver a hover event to an item; return whether it accepted it.
    fn deliver_hover(&mut self, _item: Self::Item, _event: &HoverEvent) -> bool {
        false
    }

    /// Deliver a hover event to a handler.
    fn hover_handler(&mut self, _handler: Self::Handler, _event: &HoverEvent) {}

    /// Deliver a drag event to a drop target; return whether it accepted it.
    fn deliver_drag(&mut self, _item: Self::Item, _event: &DragEvent) -> bool {
        false
    }

    /// Deliver a key event; return whether it was consumed.
    fn deliver_key(&mut self, _item: Self::Item, _event: &KeyEvent) -> bool {
        false
    }

    /// Focus change notification.
    fn focus_notify(&mut self, _notification: FocusNotification<Self::Item>) {}
}
