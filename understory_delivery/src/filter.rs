// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Child event filtering.
//!
//! An ancestor for which [`Host::filters_child_events`] is true sees each
//! pointer event meant for a descendant before the descendant does, localized to
//! the ancestor. If it intercepts the event, the descendant is skipped for the
//! rest of the pass and the ancestor takes the grab of the points it stole,
//! unless it asked for a different grab while filtering.
//!
//! Touch events offered to an ancestor that does not handle touch are turned
//! into a synthesized mouse event, the same way delivery to the item itself
//! would be.
//!
//! Each ancestor is offered a given event at most once per delivery pass, and
//! the walk stops at the first ancestor that intercepts.

use smallvec::SmallVec;

use crate::agent::DeliveryAgent;
use crate::context::{EventCx, LocalEvent};
use crate::event::{EventType, PointerEvent};
use crate::host::{Host, ItemTree};
use crate::types::{
    DeviceCapabilities, DeviceKind, Key, MouseButtons, PointId, PointState, Target,
};

impl<K: Key, H: Key> DeliveryAgent<K, H> {
    /// Offer `event` to the filtering ancestors of `receiver`.
    ///
    /// `handler` is set when the event is on its way to one of `receiver`'s
    /// handlers rather than to the item itself. Returns whether an ancestor
    /// intercepted the event, or the receiver disappeared while filtering.
    pub(crate) fn send_filtered_pointer_event<T: Host<Item = K, Handler = H>>(
        &mut self,
        host: &mut T,
        event: &PointerEvent,
        receiver: K,
        handler: Option<H>,
    ) -> bool {
        if !self.config.child_event_filtering {
            return false;
        }
        let mut next = host.tree().parent_of(receiver);
        while let Some(parent) = next {
            next = host.tree().parent_of(parent);
            if !host.filters_child_events(parent) || self.pass.has_filtered.contains(&parent) {
                continue;
            }
            self.pass.has_filtered.push(parent);
            let intercepted = self.filter_through(host, event, parent, receiver, handler);
            if !host.tree().is_alive(receiver) {
                return true;
            }
            if intercepted {
                tracing::debug!(
                    target: "understory::delivery::filter",
                    filter = ?parent,
                    child = ?receiver,
                    kind = ?event.kind(),
                    "event intercepted"
                );
                return true;
            }
        }
        false
    }

    fn filter_through<T: Host<Item = K, Handler = H>>(
        &mut self,
        host: &mut T,
        event: &PointerEvent,
        parent: K,
        receiver: K,
        handler: Option<H>,
    ) -> bool {
        let kind = event.kind();
        let device = *event.device();
        if kind.is_mouse() {
            if handler.is_none() && host.accepted_mouse_buttons(receiver).is_empty() {
                return false;
            }
            let Some(point) = event.points().first() else {
                return false;
            };
            let before = self.grabs.exclusive_grabber(device.id, point.id);
            let view = LocalEvent::all(host.tree(), parent, event);
            if !self.offer_to_filter(host, parent, receiver, &view) {
                return false;
            }
            self.pass.skip_delivery.push(parent);
            self.sink.accept(point.id);
            if event.is_begin_event()
                && self.grabs.exclusive_grabber(device.id, point.id) == before
                && host.tree().is_alive(parent)
            {
                self.set_exclusive(host, device.id, point.id, Some(Target::Item(parent)), false);
            }
            return true;
        }
        if !kind.is_touch() {
            return false;
        }
        if device.kind == DeviceKind::TouchPad
            && device
                .capabilities
                .contains(DeviceCapabilities::MOUSE_EMULATION)
        {
            return false;
        }
        let buttons = host.accepted_mouse_buttons(receiver);
        if !host.accepts_touch(receiver) && handler.is_none() && buttons.is_empty() {
            return false;
        }

        let ids: SmallVec<[PointId; 4]> = {
            let tree = host.tree();
            let host_ref = &*host;
            event
                .points()
                .iter()
                .filter(|p| {
                    let grabbed = match self.grabs.exclusive_grabber(device.id, p.id) {
                        Some(Target::Item(i)) => i == receiver,
                        Some(Target::Handler(h)) => {
                            Some(h) == handler || host_ref.handler_item(h) == Some(receiver)
                        }
                        None => false,
                    };
                    grabbed
                        || (p.state == PointState::Pressed
                            && tree.contains(receiver, tree.map_from_scene(receiver, p.scene_position)))
                })
                .map(|p| p.id)
                .collect()
        };
        if ids.is_empty() {
            return false;
        }

        let before: SmallVec<[Option<Target<K, H>>; 4]> = ids
            .iter()
            .map(|&id| self.grabs.exclusive_grabber(device.id, id))
            .collect();
        let view = LocalEvent::new(host.tree(), parent, event, |p| ids.contains(&p.id));
        if self.offer_to_filter(host, parent, receiver, &view) {
            self.pass.skip_delivery.push(parent);
            for (&id, &was) in ids.iter().zip(before.iter()) {
                self.sink.accept(id);
                let released = event
                    .point_by_id(id)
                    .is_some_and(|p| p.state == PointState::Released);
                if !released
                    && self.grabs.exclusive_grabber(device.id, id) == was
                    && host.tree().is_alive(parent)
                {
                    self.set_exclusive(host, device.id, id, Some(Target::Item(parent)), false);
                }
            }
            return true;
        }
        if !host.tree().is_alive(parent)
            || !self.config.synthesize_mouse_for_unhandled_touch
            || host.accepts_touch(parent)
        {
            return false;
        }

        for &id in &ids {
            let Some(point) = event.point_by_id(id) else {
                continue;
            };
            let (mouse_kind, button, held) = match point.state {
                PointState::Pressed => {
                    (EventType::MousePress, MouseButtons::LEFT, MouseButtons::LEFT)
                }
                PointState::Released => (
                    EventType::MouseRelease,
                    MouseButtons::LEFT,
                    MouseButtons::empty(),
                ),
                PointState::Updated => {
                    (EventType::MouseMove, MouseButtons::empty(), MouseButtons::LEFT)
                }
                PointState::Stationary => continue,
            };
            let was_unset = !self.touch_mouse.is_active();
            if !was_unset && !self.touch_mouse.is_point(device.id, id) {
                continue;
            }
            if was_unset {
                self.touch_mouse.start(device.id, id);
            }
            let view = LocalEvent::synthesized_mouse(
                host.tree(),
                parent,
                event,
                point,
                mouse_kind,
                button,
                held,
            );
            if self.offer_to_filter(host, parent, receiver, &view) {
                self.pass.skip_delivery.push(parent);
                self.sink.accept(id);
                if mouse_kind != EventType::MouseRelease && host.tree().is_alive(parent) {
                    self.set_exclusive(host, device.id, id, Some(Target::Item(parent)), false);
                } else if was_unset {
                    self.touch_mouse.cancel();
                }
                return true;
            }
            if was_unset {
                self.touch_mouse.cancel();
            }
            break;
        }
        false
    }

    /// Call the filter callback of `parent` and apply what it requested.
    fn offer_to_filter<T: Host<Item = K, Handler = H>>(
        &mut self,
        host: &mut T,
        parent: K,
        receiver: K,
        view: &LocalEvent<'_>,
    ) -> bool {
        let intercepted = {
            let mut cx = EventCx::new(
                &self.grabs,
                self.id,
                view.device().id,
                Target::Item(parent),
                &mut self.sink,
            );
            host.child_event_filter(parent, receiver, view, &mut cx)
        };
        self.apply_requests(host);
        if !host.tree().is_alive(parent) {
            self.forget_target(Target::Item(parent));
        }
        intercepted
    }
}
