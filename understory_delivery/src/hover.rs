// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Hover tracking.
//!
//! Hover is recomputed from scratch for every pointer position: the tree is
//! walked topmost first and every hover-enabled item under the pointer, plus
//! every hover-enabled handler whose item (inflated by the handler's margin)
//! is under it, is marked with the current generation. Targets that were
//! hovered before but were not marked this time get a leave event.
//!
//! Hover is idempotent: re-running it at the same position delivers `Move` to
//! items that are already hovered and never a second `Enter`.
//!
//! Once a hover-enabled item accepts a hover event, items beneath it in the
//! stacking order are not offered the event, but its ancestors stay hovered.

use alloc::vec::Vec;

use kurbo::Point;

use crate::agent::DeliveryAgent;
use crate::host::{Host, ItemTree};
use crate::types::{Key, Modifiers, Target};

/// Phase of a hover event.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum HoverKind {
    /// The pointer moved onto the target.
    Enter,
    /// The pointer moved while over the target.
    Move,
    /// The pointer left the target.
    Leave,
}

/// A hover event, positioned in the receiving item's local space.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct HoverEvent {
    /// Phase.
    pub kind: HoverKind,
    /// Position in the item's local coordinates (for handlers, their item's).
    pub position: Point,
    /// Position in scene coordinates.
    pub scene_position: Point,
    /// Previous position in scene coordinates.
    pub last_scene_position: Point,
    /// Keyboard modifiers.
    pub modifiers: Modifiers,
    /// Timestamp in milliseconds.
    pub timestamp: u64,
}

/// Hovered targets, each tagged with the generation that last saw it.
///
/// Kept in insertion order so leave events go out in the order the targets
/// were entered.
#[derive(Clone, Debug)]
pub(crate) struct HoverState<T> {
    generation: u64,
    entries: Vec<(T, u64)>,
}

impl<T: PartialEq + Copy> HoverState<T> {
    pub(crate) fn new() -> Self {
        Self {
            generation: 0,
            entries: Vec::new(),
        }
    }

    pub(crate) fn is_hovered(&self, target: T) -> bool {
        self.entries.iter().any(|(t, _)| *t == target)
    }

    pub(crate) fn next_generation(&mut self) -> u64 {
        self.generation = self.generation.wrapping_add(1);
        self.generation
    }

    /// Tag `target` with `generation`; returns whether it was newly entered.
    pub(crate) fn mark(&mut self, target: T, generation: u64) -> bool {
        match self.entries.iter_mut().find(|(t, _)| *t == target) {
            Some(entry) => {
                entry.1 = generation;
                false
            }
            None => {
                self.entries.push((target, generation));
                true
            }
        }
    }

    /// Remove and return every target not tagged with `generation`.
    pub(crate) fn take_stale(&mut self, generation: u64) -> Vec<T> {
        let mut stale = Vec::new();
        self.entries.retain(|&(t, g)| {
            if g == generation {
                true
            } else {
                stale.push(t);
                false
            }
        });
        stale
    }

    pub(crate) fn take_all(&mut self) -> Vec<T> {
        self.entries.drain(..).map(|(t, _)| t).collect()
    }

    pub(crate) fn forget(&mut self, target: T) {
        self.entries.retain(|(t, _)| *t != target);
    }
}

#[derive(Copy, Clone)]
struct HoverPass {
    generation: u64,
    scene: Point,
    last: Point,
    modifiers: Modifiers,
    timestamp: u64,
}

impl HoverPass {
    fn event(&self, kind: HoverKind, position: Point) -> HoverEvent {
        HoverEvent {
            kind,
            position,
            scene_position: self.scene,
            last_scene_position: self.last,
            modifiers: self.modifiers,
            timestamp: self.timestamp,
        }
    }
}

impl<K: Key, H: Key> DeliveryAgent<K, H> {
    /// Recompute hover for a pointer at `scene`.
    ///
    /// Returns whether a hover-enabled item accepted the event.
    pub(crate) fn deliver_hover<T: Host<Item = K, Handler = H>>(
        &mut self,
        host: &mut T,
        scene: Point,
        last: Point,
        modifiers: Modifiers,
        timestamp: u64,
    ) -> bool {
        let pass = HoverPass {
            generation: self.hover.next_generation(),
            scene,
            last,
            modifiers,
            timestamp,
        };
        let accepted = match host.tree().root() {
            Some(root) => self.hover_item(host, root, &pass),
            None => false,
        };
        for target in self.hover.take_stale(pass.generation) {
            self.send_leave(host, target, &pass);
        }
        accepted
    }

    /// Send a leave event to every hovered target and forget them all.
    pub fn clear_hover<T: Host<Item = K, Handler = H>>(&mut self, host: &mut T) {
        let at = self.last_mouse_position().unwrap_or(Point::ZERO);
        let pass = HoverPass {
            generation: self.hover.next_generation(),
            scene: at,
            last: at,
            modifiers: Modifiers::empty(),
            timestamp: 0,
        };
        for target in self.hover.take_all() {
            self.send_leave(host, target, &pass);
        }
    }

    /// Whether `target` is currently hovered.
    pub fn is_hovered(&self, target: Target<K, H>) -> bool {
        self.hover.is_hovered(target)
    }

    fn hover_item<T: Host<Item = K, Handler = H>>(
        &mut self,
        host: &mut T,
        item: K,
        pass: &HoverPass,
    ) -> bool {
        let (contains, children) = {
            let tree = host.tree();
            let local = tree.map_from_scene(item, pass.scene);
            let contains = tree.contains(item, local);
            if !contains && tree.clips_children(item) {
                return false;
            }
            (contains, tree.children_in_paint_order(item))
        };

        let mut accepted = false;
        for &child in children.iter().rev() {
            let skip = {
                let tree = host.tree();
                !tree.is_alive(child)
                    || !tree.is_visible(child)
                    || !tree.is_enabled(child)
                    || tree.is_culled(child)
                    || tree.is_subscene(child)
            };
            if skip {
                continue;
            }
            if self.hover_item(host, child, pass) {
                accepted = true;
                break;
            }
        }
        if !host.tree().is_alive(item) {
            self.forget_target(Target::Item(item));
            return accepted;
        }

        self.hover_handlers(host, item, pass);
        if !contains || !host.hover_enabled(item) || !host.tree().is_alive(item) {
            return accepted;
        }
        let target = Target::Item(item);
        let entered = self.hover.mark(target, pass.generation);
        if accepted {
            // Something above took the event; only make sure we count as hovered.
            if entered {
                let position = host.tree().map_from_scene(item, pass.scene);
                host.deliver_hover(item, &pass.event(HoverKind::Enter, position));
            }
            return true;
        }
        let kind = if entered {
            HoverKind::Enter
        } else {
            HoverKind::Move
        };
        let position = host.tree().map_from_scene(item, pass.scene);
        let took = host.deliver_hover(item, &pass.event(kind, position));
        tracing::trace!(
            target: "understory::delivery::hover",
            ?item,
            ?kind,
            accepted = took,
            "hover"
        );
        if !host.tree().is_alive(item) {
            self.forget_target(target);
        }
        took
    }

    fn hover_handlers<T: Host<Item = K, Handler = H>>(
        &mut self,
        host: &mut T,
        item: K,
        pass: &HoverPass,
    ) {
        for handler in host.handlers(item) {
            if !host.handler_hover_enabled(handler) {
                continue;
            }
            let (inside, position) = {
                let tree = host.tree();
                let position = tree.map_from_scene(item, pass.scene);
                let margin = host.handler_margin(handler);
                let inside = tree.bounds(item).inflate(margin, margin).contains(position);
                (inside, position)
            };
            if !inside {
                continue;
            }
            let kind = if self.hover.mark(Target::Handler(handler), pass.generation) {
                HoverKind::Enter
            } else {
                HoverKind::Move
            };
            host.hover_handler(handler, &pass.event(kind, position));
            if !host.tree().is_alive(item) {
                return;
            }
        }
    }

    fn send_leave<T: Host<Item = K, Handler = H>>(
        &mut self,
        host: &mut T,
        target: Target<K, H>,
        pass: &HoverPass,
    ) {
        if !self.target_alive(host, target) {
            return;
        }
        tracing::trace!(target: "understory::delivery::hover", ?target, "hover leave");
        match target {
            Target::Item(item) => {
                let position = host.tree().map_from_scene(item, pass.scene);
                host.deliver_hover(item, &pass.event(HoverKind::Leave, position));
            }
            Target::Handler(handler) => {
                let Some(item) = host.handler_item(handler) else {
                    return;
                };
                let position = host.tree().map_from_scene(item, pass.scene);
                host.hover_handler(handler, &pass.event(HoverKind::Leave, position));
            }
        }
    }
}
