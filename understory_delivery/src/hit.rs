// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Candidate resolution for one point.
//!
//! ## Ordering
//!
//! [`pointer_targets`] walks the tree from an item and returns the items that
//! may receive a point, deepest and topmost first: children before their
//! parent, and among siblings, higher z before lower z. An item is placed among
//! its own children just before the first child with a non-negative z, so
//! negative-z children end up behind (after) their parent.
//!
//! ## Relevance
//!
//! - A clipping item that does not contain the point prunes itself and its
//!   whole subtree.
//! - An item is relevant if it contains the point, or if one of its handlers
//!   wants the point (handlers may claim points outside the item).
//! - Without handlers, [`TargetFilter`] can additionally require accepted mouse
//!   buttons, or touch (or any mouse button) acceptance.
//! - Invisible, disabled, culled, and sub-scene children are not visited.

use alloc::vec::Vec;

use crate::context::LocalEvent;
use crate::event::{EventPoint, PointerEvent};
use crate::host::{Host, ItemTree};

/// Acceptance checks applied while collecting candidates.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct TargetFilter {
    /// Require at least one accepted mouse button.
    pub mouse_buttons: bool,
    /// Require touch acceptance or at least one accepted mouse button.
    pub accepts_touch: bool,
}

impl TargetFilter {
    /// No acceptance checks; geometry and handlers only.
    pub const NONE: Self = Self {
        mouse_buttons: false,
        accepts_touch: false,
    };
}

/// Candidates for `point` under `item`, deepest and topmost first.
pub fn pointer_targets<H: Host + ?Sized>(
    host: &H,
    item: H::Item,
    event: &PointerEvent,
    point: &EventPoint,
    filter: TargetFilter,
) -> Vec<H::Item> {
    let mut out = Vec::new();
    collect(host, item, event, point, filter, &mut out);
    tracing::trace!(
        target: "understory::delivery::hit",
        point = %point.id,
        candidates = out.len(),
        "resolved pointer targets"
    );
    out
}

fn collect<H: Host + ?Sized>(
    host: &H,
    item: H::Item,
    event: &PointerEvent,
    point: &EventPoint,
    filter: TargetFilter,
    out: &mut Vec<H::Item>,
) {
    let tree = host.tree();
    let local = tree.map_from_scene(item, point.scene_position);
    let contains = tree.contains(item, local);
    if !contains && tree.clips_children(item) {
        return;
    }

    let mut relevant = contains;
    let handlers = host.handlers(item);
    if !handlers.is_empty() {
        if !relevant {
            let view = LocalEvent::new(tree, item, event, |p| p.id == point.id);
            relevant = view
                .first()
                .is_some_and(|lp| handlers.iter().any(|&h| host.wants_point(h, &view, lp)));
        }
    } else {
        let buttons = host.accepted_mouse_buttons(item);
        if relevant && filter.mouse_buttons && buttons.is_empty() {
            relevant = false;
        }
        if relevant && filter.accepts_touch && !host.accepts_touch(item) && buttons.is_empty() {
            relevant = false;
        }
    }

    let children = tree.children_in_paint_order(item);
    let split = children.partition_point(|&c| tree.z_index(c) < 0);
    for &child in children[split..].iter().rev() {
        visit_child(host, child, event, point, filter, out);
    }
    if relevant {
        out.push(item);
    }
    for &child in children[..split].iter().rev() {
        visit_child(host, child, event, point, filter, out);
    }
}

fn visit_child<H: Host + ?Sized>(
    host: &H,
    child: H::Item,
    event: &PointerEvent,
    point: &EventPoint,
    filter: TargetFilter,
    out: &mut Vec<H::Item>,
) {
    let tree = host.tree();
    if !tree.is_visible(child)
        || !tree.is_enabled(child)
        || tree.is_culled(child)
        || tree.is_subscene(child)
    {
        return;
    }
    collect(host, child, event, point, filter, out);
}

/// Merge the candidates of another point into `list`.
///
/// Both relative orders are preserved; items already present are not
/// duplicated, and new items are inserted just before the nearest item they
/// precede in `other`.
pub fn merge_targets<K: Copy + PartialEq>(list: &mut Vec<K>, other: &[K]) {
    if list.is_empty() {
        list.extend_from_slice(other);
        return;
    }
    let mut insert = list.len();
    for &item in other.iter().rev() {
        let end = insert.min(list.len() - 1);
        if let Some(found) = list[..=end].iter().rposition(|&x| x == item) {
            insert = found;
        }
        if insert == list.len() || list[insert] != item {
            list.insert(insert, item);
        }
    }
}
