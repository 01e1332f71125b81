// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Keyboard focus and key routing.
//!
//! ## Model
//!
//! Every focus scope remembers one *scoped focus* item. The root acts as the
//! outermost scope and is always considered active. The *active focus* item is
//! found by starting from a scope's focus item and descending through nested
//! scopes to their own focus items, as long as those are enabled.
//!
//! Each item carries two flags, `focus` (it is its scope's focus item) and
//! `active_focus` (it is the active focus item or one of its ancestors). A
//! change first clears `active_focus` along the path from the old target up to
//! the scope, then sets it along the path from the new target. Once all state
//! is settled, the host receives `FocusOut` for the old target, `FocusIn` for
//! the new one, and then a property notification for every touched item whose
//! last notified value differs from its current one. Repeating a change is
//! therefore silent.
//!
//! Key events go to the active focus item and bubble up to its ancestors until
//! one of them consumes the event.

use hashbrown::HashMap;
use smallvec::SmallVec;

use crate::agent::DeliveryAgent;
use crate::host::{Host, ItemTree};
use crate::types::{Key, Modifiers};

/// Focus change notification.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum FocusNotification<K> {
    /// The item lost active focus.
    FocusOut(K),
    /// The item gained active focus.
    FocusIn(K),
    /// The item's `focus` flag changed.
    FocusChanged(K, bool),
    /// The item's `active_focus` flag changed.
    ActiveFocusChanged(K, bool),
}

/// A key press or release.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct KeyEvent {
    /// Platform key code.
    pub code: u32,
    /// Press (`true`) or release.
    pub pressed: bool,
    /// Auto-repeat.
    pub repeat: bool,
    /// Keyboard modifiers.
    pub modifiers: Modifiers,
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
struct FocusFlags {
    focus: bool,
    active: bool,
    notified_focus: bool,
    notified_active: bool,
}

#[derive(Clone, Debug)]
pub(crate) struct FocusState<K> {
    scoped: HashMap<K, K>,
    active: Option<K>,
    flags: HashMap<K, FocusFlags>,
}

impl<K: Key> FocusState<K> {
    pub(crate) fn new() -> Self {
        Self {
            scoped: HashMap::new(),
            active: None,
            flags: HashMap::new(),
        }
    }

    fn flags(&self, item: K) -> FocusFlags {
        self.flags.get(&item).copied().unwrap_or_default()
    }

    fn flags_mut(&mut self, item: K) -> &mut FocusFlags {
        self.flags.entry(item).or_default()
    }

    /// Set `active_focus`, recording the item if the flag changed.
    fn set_active(&mut self, item: K, active: bool, changed: &mut SmallVec<[K; 8]>) {
        let flags = self.flags_mut(item);
        if flags.active != active {
            flags.active = active;
            changed.push(item);
        }
    }

    pub(crate) fn forget(&mut self, item: K) {
        self.flags.remove(&item);
        self.scoped.remove(&item);
        self.scoped.retain(|_, v| *v != item);
        if self.active == Some(item) {
            self.active = None;
        }
    }
}

impl<K: Key, H: Key> DeliveryAgent<K, H> {
    /// The item currently receiving key events.
    pub fn active_focus_item(&self) -> Option<K> {
        self.focus.active
    }

    /// Whether `item` is its scope's focus item.
    pub fn has_focus(&self, item: K) -> bool {
        self.focus.flags(item).focus
    }

    /// Whether `item` is the active focus item or one of its ancestors.
    pub fn has_active_focus(&self, item: K) -> bool {
        self.focus.flags(item).active
    }

    /// The focus item remembered by `scope`.
    pub fn scoped_focus_item(&self, scope: K) -> Option<K> {
        self.focus.scoped.get(&scope).copied()
    }

    /// Nearest focus scope enclosing `item`; the root if there is none.
    pub fn focus_scope_of<T: Host<Item = K, Handler = H>>(&self, host: &T, item: K) -> Option<K> {
        let tree = host.tree();
        let mut next = tree.parent_of(item);
        while let Some(parent) = next {
            if host.is_focus_scope(parent) {
                return Some(parent);
            }
            next = tree.parent_of(parent);
        }
        tree.root()
    }

    /// Give focus to `item` within its enclosing scope.
    pub fn set_focus<T: Host<Item = K, Handler = H>>(&mut self, host: &mut T, item: K) {
        if let Some(scope) = self.focus_scope_of(host, item) {
            self.set_focus_in_scope(host, scope, item);
        }
    }

    /// Make `item` the focus item of `scope`.
    ///
    /// If `scope` is on the active focus path, the active focus item moves to
    /// `item` (or, when `item` is a scope itself, to the focus item found by
    /// descending into it).
    pub fn set_focus_in_scope<T: Host<Item = K, Handler = H>>(
        &mut self,
        host: &mut T,
        scope: K,
        item: K,
    ) {
        if !host.tree().is_alive(item) || !host.tree().is_alive(scope) {
            return;
        }
        let root = host.tree().root();
        let mut changed: SmallVec<[K; 8]> = SmallVec::new();
        let old_active = self.focus.active;
        let mut new_active = None;

        if self.scope_is_active(scope, item, root) {
            new_active = Some(if host.tree().is_enabled(item) {
                self.descend_scopes(host, item)
            } else {
                scope
            });
            if let Some(old) = old_active {
                self.focus.active = None;
                self.clear_active_path(host, old, scope, &mut changed);
            }
        }

        if Some(item) != root {
            if let Some(previous) = self.focus.scoped.insert(scope, item) {
                if previous != item {
                    self.focus.flags_mut(previous).focus = false;
                    changed.push(previous);
                }
            }
        }
        self.focus.flags_mut(item).focus = true;
        changed.push(item);

        if let Some(target) = new_active {
            self.focus.active = Some(target);
            let mut next = Some(target);
            while let Some(node) = next {
                self.focus.set_active(node, true, &mut changed);
                next = host.tree().parent_of(node);
            }
        }

        tracing::debug!(
            target: "understory::delivery::focus",
            ?scope,
            ?item,
            old = ?old_active,
            new = ?self.focus.active,
            "focus set in scope"
        );
        self.emit_focus_changes(host, old_active, new_active, &changed);
    }

    /// Remove `item` as the focus item of `scope`.
    ///
    /// If the scope was on the active focus path, active focus falls back to
    /// the scope itself.
    pub fn clear_focus_in_scope<T: Host<Item = K, Handler = H>>(
        &mut self,
        host: &mut T,
        scope: K,
        item: K,
    ) {
        let root = host.tree().root();
        if Some(item) != root && !self.focus.scoped.contains_key(&scope) {
            return;
        }
        let mut changed: SmallVec<[K; 8]> = SmallVec::new();
        let old_active = self.focus.active;
        let mut new_active = None;

        if self.scope_is_active(scope, item, root) {
            new_active = Some(scope);
            self.focus.active = None;
            if let Some(old) = old_active {
                self.clear_active_path(host, old, scope, &mut changed);
            }
        }

        if Some(item) != root {
            if let Some(previous) = self.focus.scoped.remove(&scope) {
                self.focus.flags_mut(previous).focus = false;
                changed.push(previous);
            }
        } else {
            self.focus.flags_mut(item).focus = false;
            changed.push(item);
        }

        if let Some(scope) = new_active {
            self.focus.active = Some(scope);
            self.focus.set_active(scope, true, &mut changed);
        }

        tracing::debug!(
            target: "understory::delivery::focus",
            ?scope,
            ?item,
            old = ?old_active,
            new = ?self.focus.active,
            "focus cleared in scope"
        );
        self.emit_focus_changes(host, old_active, new_active, &changed);
    }

    /// Deliver a key event to the active focus item, bubbling to ancestors.
    ///
    /// Returns whether an item consumed it.
    pub fn deliver_key_event<T: Host<Item = K, Handler = H>>(
        &mut self,
        host: &mut T,
        event: &KeyEvent,
    ) -> bool {
        let mut next = self.focus.active;
        if next.is_some_and(|item| !host.tree().is_alive(item)) {
            tracing::warn!(
                target: "understory::delivery::focus",
                "active focus item was removed"
            );
            if let Some(item) = next {
                self.focus.forget(item);
            }
            return false;
        }
        while let Some(item) = next {
            if host.deliver_key(item, event) {
                tracing::trace!(target: "understory::delivery::focus", ?item, "key consumed");
                return true;
            }
            if !host.tree().is_alive(item) {
                self.focus.forget(item);
                return false;
            }
            next = host.tree().parent_of(item);
        }
        false
    }

    fn scope_is_active(&self, scope: K, item: K, root: Option<K>) -> bool {
        Some(item) == root || Some(scope) == root || self.focus.flags(scope).active
    }

    fn descend_scopes<T: Host<Item = K, Handler = H>>(&self, host: &T, item: K) -> K {
        let mut target = item;
        while host.is_focus_scope(target) {
            match self.focus.scoped.get(&target) {
                Some(&inner) if inner != target && host.tree().is_enabled(inner) => {
                    target = inner;
                }
                _ => break,
            }
        }
        target
    }

    fn clear_active_path<T: Host<Item = K, Handler = H>>(
        &mut self,
        host: &T,
        from: K,
        scope: K,
        changed: &mut SmallVec<[K; 8]>,
    ) {
        let mut next = Some(from);
        while let Some(node) = next {
            if node == scope {
                break;
            }
            self.focus.set_active(node, false, changed);
            next = host.tree().parent_of(node);
        }
    }

    fn emit_focus_changes<T: Host<Item = K, Handler = H>>(
        &mut self,
        host: &mut T,
        old_active: Option<K>,
        new_active: Option<K>,
        changed: &[K],
    ) {
        let moved = new_active.is_some() && old_active != new_active;
        if let Some(old) = old_active {
            if moved && host.tree().is_alive(old) {
                host.focus_notify(FocusNotification::FocusOut(old));
            }
        }
        // The focus-out callback may have moved focus again.
        if let Some(new) = new_active {
            if moved && self.focus.active == Some(new) && host.tree().is_alive(new) {
                host.focus_notify(FocusNotification::FocusIn(new));
            }
        }
        for &item in changed {
            if !host.tree().is_alive(item) {
                self.focus.forget(item);
                continue;
            }
            let flags = self.focus.flags(item);
            if flags.notified_focus != flags.focus {
                self.focus.flags_mut(item).notified_focus = flags.focus;
                host.focus_notify(FocusNotification::FocusChanged(item, flags.focus));
            }
            let flags = self.focus.flags(item);
            if flags.notified_active != flags.active {
                self.focus.flags_mut(item).notified_active = flags.active;
                host.focus_notify(FocusNotification::ActiveFocusChanged(item, flags.active));
            }
        }
    }
}
