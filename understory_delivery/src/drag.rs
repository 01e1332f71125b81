// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Drag and drop delivery.
//!
//! Drag events form their own small protocol next to pointer delivery. The
//! first `Enter` (or `Move`) searches the tree for a drop target under the
//! pointer; the first one that accepts the `Enter` is remembered as grabbed
//! and receives the following moves. Moving off it sends `Leave` and searches
//! again; `Drop` is offered to the grabbed targets until one accepts it.
//!
//! The search visits non-negative-z children front to back before the item
//! itself, and negative-z children after it, the same order as pointer hit
//! testing.

use kurbo::Point;
use smallvec::SmallVec;

use crate::agent::DeliveryAgent;
use crate::host::{Host, ItemTree};
use crate::types::{Key, Modifiers};

/// Phase of a drag event.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum DragKind {
    /// A drag entered the scene (or a target).
    Enter,
    /// A drag moved.
    Move,
    /// A drag left the scene (or a target).
    Leave,
    /// The payload was dropped.
    Drop,
}

/// A drag event, positioned in the receiving item's local space.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct DragEvent {
    /// Phase.
    pub kind: DragKind,
    /// Position in the receiver's local coordinates.
    pub position: Point,
    /// Position in scene coordinates.
    pub scene_position: Point,
    /// Keyboard modifiers.
    pub modifiers: Modifiers,
}

#[derive(Clone, Debug)]
pub(crate) struct DragState<K> {
    grabbed: SmallVec<[K; 4]>,
}

impl<K> Default for DragState<K> {
    fn default() -> Self {
        Self {
            grabbed: SmallVec::new(),
        }
    }
}

impl<K: PartialEq> DragState<K> {
    pub(crate) fn forget(&mut self, item: K) {
        self.grabbed.retain(|k| *k != item);
    }
}

#[derive(Copy, Clone)]
struct DragPass {
    scene: Point,
    modifiers: Modifiers,
}

impl<K: Key, H: Key> DeliveryAgent<K, H> {
    /// Deliver one drag event at `scene_position`.
    ///
    /// Returns whether a drop target accepted it.
    pub fn handle_drag_event<T: Host<Item = K, Handler = H>>(
        &mut self,
        host: &mut T,
        kind: DragKind,
        scene_position: Point,
        modifiers: Modifiers,
    ) -> bool {
        let pass = DragPass {
            scene: scene_position,
            modifiers,
        };
        if self.drag.grabbed.is_empty() {
            let root = host.tree().root();
            return match (kind, root) {
                (DragKind::Enter | DragKind::Move, Some(root)) => {
                    self.drag_enter(host, root, &pass, &[])
                }
                _ => false,
            };
        }

        let previous = core::mem::take(&mut self.drag.grabbed);
        match kind {
            DragKind::Drop => {
                let mut accepted = false;
                for item in previous {
                    if !host.tree().is_alive(item) {
                        continue;
                    }
                    let kind = if accepted {
                        DragKind::Leave
                    } else {
                        DragKind::Drop
                    };
                    let took = self.send_drag(host, item, kind, &pass);
                    accepted |= kind == DragKind::Drop && took;
                }
                tracing::debug!(target: "understory::delivery::drag", accepted, "drop");
                accepted
            }
            DragKind::Leave => {
                for item in previous {
                    if host.tree().is_alive(item) {
                        self.send_drag(host, item, DragKind::Leave, &pass);
                    }
                }
                false
            }
            DragKind::Enter | DragKind::Move => {
                if let Some(root) = host.tree().root() {
                    self.drag_enter(host, root, &pass, &previous);
                }
                for item in previous {
                    if !host.tree().is_alive(item) {
                        continue;
                    }
                    if self.drag.grabbed.contains(&item) {
                        self.send_drag(host, item, DragKind::Move, &pass);
                    } else {
                        self.send_drag(host, item, DragKind::Leave, &pass);
                    }
                }
                !self.drag.grabbed.is_empty()
            }
        }
    }

    /// Items currently receiving the drag.
    pub fn drag_targets(&self) -> &[K] {
        &self.drag.grabbed
    }

    fn drag_enter<T: Host<Item = K, Handler = H>>(
        &mut self,
        host: &mut T,
        item: K,
        pass: &DragPass,
        previous: &[K],
    ) -> bool {
        let (contains, children, split) = {
            let tree = host.tree();
            if !tree.is_alive(item)
                || !tree.is_visible(item)
                || !tree.is_enabled(item)
                || tree.is_culled(item)
            {
                return false;
            }
            let contains = tree.contains(item, tree.map_from_scene(item, pass.scene));
            if !contains && tree.clips_children(item) {
                return false;
            }
            let children = tree.children_in_paint_order(item);
            let split = children.partition_point(|&c| tree.z_index(c) < 0);
            (contains, children, split)
        };

        for &child in children[split..].iter().rev() {
            if self.drag_enter(host, child, pass, previous) {
                return true;
            }
        }
        if contains && host.accepts_drops(item) {
            if previous.contains(&item) {
                self.drag.grabbed.push(item);
                return true;
            }
            let accepted = self.send_drag(host, item, DragKind::Enter, pass);
            if accepted && host.tree().is_alive(item) {
                self.drag.grabbed.push(item);
                return true;
            }
        }
        for &child in children[..split].iter().rev() {
            if self.drag_enter(host, child, pass, previous) {
                return true;
            }
        }
        false
    }

    fn send_drag<T: Host<Item = K, Handler = H>>(
        &mut self,
        host: &mut T,
        item: K,
        kind: DragKind,
        pass: &DragPass,
    ) -> bool {
        let event = DragEvent {
            kind,
            position: host.tree().map_from_scene(item, pass.scene),
            scene_position: pass.scene,
            modifiers: pass.modifiers,
        };
        let accepted = host.deliver_drag(item, &event);
        tracing::debug!(
            target: "understory::delivery::drag",
            ?item,
            ?kind,
            accepted,
            "drag delivered"
        );
        if !host.tree().is_alive(item) {
            self.forget_target(crate::types::Target::Item(item));
        }
        accepted
    }
}
