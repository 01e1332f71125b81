// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Mouse synthesis for items that do not handle touch.
//!
//! The first touch point pressed on a touch-unaware item that accepts the left
//! button becomes the *touch-mouse* of its device. Until that point is released
//! (or taken by a handler, or cancelled), its press, moves, and release are also
//! delivered as single-point mouse events. Only one point per agent acts as the
//! mouse at a time; a point that was already down when synthesis ended never
//! takes over, only a newly pressed one can.
//!
//! Two synthesized presses close enough in time and space are promoted to a
//! double click, using the thresholds in
//! [`DeliveryConfig`](crate::config::DeliveryConfig).

use kurbo::Point;
use smallvec::SmallVec;

use crate::agent::DeliveryAgent;
use crate::config::DeliveryConfig;
use crate::context::LocalEvent;
use crate::event::{EventType, PointerEvent};
use crate::host::{Host, ItemTree};
use crate::types::{
    DeviceCapabilities, DeviceId, DeviceKind, Key, MouseButtons, PointId, PointState, Target,
};

/// Which touch point, if any, currently acts as the mouse.
#[derive(Clone, Debug, Default)]
pub(crate) struct TouchMouse {
    active: Option<(DeviceId, PointId)>,
    last_press: Option<(u64, Point)>,
}

impl TouchMouse {
    pub(crate) fn is_active(&self) -> bool {
        self.active.is_some()
    }

    pub(crate) fn is_point(&self, device: DeviceId, point: PointId) -> bool {
        self.active == Some((device, point))
    }

    pub(crate) fn point_of(&self, device: DeviceId) -> Option<PointId> {
        self.active.filter(|(d, _)| *d == device).map(|(_, p)| p)
    }

    pub(crate) fn start(&mut self, device: DeviceId, point: PointId) {
        self.active = Some((device, point));
    }

    pub(crate) fn cancel(&mut self) {
        if let Some((device, point)) = self.active.take() {
            tracing::debug!(
                target: "understory::delivery::touch",
                ?device,
                %point,
                "touch-mouse synthesis cancelled"
            );
        }
    }

    /// Record a press and report whether it completes a double tap.
    ///
    /// A completed double tap resets the record, so a third tap starts over.
    pub(crate) fn check_double_tap(
        &mut self,
        timestamp: u64,
        position: Point,
        config: &DeliveryConfig,
    ) -> bool {
        let double = self.last_press.is_some_and(|(then, at)| {
            let d = position - at;
            d.x.abs() <= config.double_tap_distance
                && d.y.abs() <= config.double_tap_distance
                && timestamp.saturating_sub(then) < config.double_click_interval_ms
        });
        self.last_press = if double {
            None
        } else {
            Some((timestamp, position))
        };
        double
    }

    /// Forget the last press once the point has wandered too far for a double tap.
    pub(crate) fn moved_to(&mut self, position: Point, config: &DeliveryConfig) {
        if let Some((_, at)) = self.last_press {
            let d = position - at;
            if d.x.abs() > config.double_tap_distance || d.y.abs() > config.double_tap_distance {
                self.last_press = None;
            }
        }
    }
}

impl<K: Key, H: Key> DeliveryAgent<K, H> {
    /// Deliver the touch-mouse point among `matching` to `item` as a mouse event.
    ///
    /// Returns whether the synthesized event was consumed.
    pub(crate) fn deliver_touch_as_mouse<T: Host<Item = K, Handler = H>>(
        &mut self,
        host: &mut T,
        item: K,
        event: &PointerEvent,
        matching: &SmallVec<[PointId; 4]>,
    ) -> bool {
        let device = *event.device();
        if device.kind == DeviceKind::TouchPad
            && device
                .capabilities
                .contains(DeviceCapabilities::MOUSE_EMULATION)
        {
            return false;
        }
        for &id in matching {
            let Some(point) = event.point_by_id(id) else {
                continue;
            };
            if !self.touch_mouse.is_active() && point.state == PointState::Pressed {
                {
                    let tree = host.tree();
                    let local = tree.map_from_scene(item, point.scene_position);
                    if !tree.contains(item, local) {
                        break;
                    }
                }
                let press = LocalEvent::synthesized_mouse(
                    host.tree(),
                    item,
                    event,
                    point,
                    EventType::MousePress,
                    MouseButtons::LEFT,
                    MouseButtons::LEFT,
                );
                let Some(consumed) = self.dispatch_to_item(host, item, &press) else {
                    return false;
                };
                if !consumed {
                    continue;
                }
                self.touch_mouse.start(device.id, id);
                tracing::debug!(
                    target: "understory::delivery::touch",
                    point = %id,
                    ?item,
                    "touch point now acts as the mouse"
                );
                self.set_exclusive(host, device.id, id, Some(Target::Item(item)), false);
                if self.touch_mouse.check_double_tap(
                    point.timestamp,
                    point.global_position,
                    &self.config,
                ) {
                    let double = LocalEvent::synthesized_mouse(
                        host.tree(),
                        item,
                        event,
                        point,
                        EventType::MouseDoubleClick,
                        MouseButtons::LEFT,
                        MouseButtons::LEFT,
                    );
                    if self.dispatch_to_item(host, item, &double) == Some(false) {
                        self.touch_mouse.cancel();
                    }
                }
                return true;
            } else if self.touch_mouse.is_point(device.id, id) {
                let grabber = self.grabs.exclusive_grabber(device.id, id);
                match point.state {
                    PointState::Updated => {
                        self.touch_mouse
                            .moved_to(point.global_position, &self.config);
                        if matches!(grabber, Some(Target::Item(_))) {
                            let moved = LocalEvent::synthesized_mouse(
                                host.tree(),
                                item,
                                event,
                                point,
                                EventType::MouseMove,
                                MouseButtons::empty(),
                                MouseButtons::LEFT,
                            );
                            return self.dispatch_to_item(host, item, &moved).unwrap_or(false);
                        }
                        let last = self.last_mouse_position().unwrap_or(point.scene_position);
                        self.deliver_hover(
                            host,
                            point.scene_position,
                            last,
                            event.modifiers,
                            event.timestamp,
                        );
                        self.remember_mouse_position(device.id, point.scene_position, event);
                    }
                    PointState::Released => {
                        if matches!(grabber, Some(Target::Item(_))) {
                            let release = LocalEvent::synthesized_mouse(
                                host.tree(),
                                item,
                                event,
                                point,
                                EventType::MouseRelease,
                                MouseButtons::LEFT,
                                MouseButtons::empty(),
                            );
                            let consumed =
                                self.dispatch_to_item(host, item, &release).unwrap_or(false);
                            self.set_exclusive(host, device.id, id, None, false);
                            self.touch_mouse.cancel();
                            return consumed;
                        }
                        self.touch_mouse.cancel();
                    }
                    PointState::Pressed | PointState::Stationary => {}
                }
                break;
            }
        }
        false
    }
}
