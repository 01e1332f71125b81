// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Localized event views and the delivery context handed to callbacks.
//!
//! ## Localized views
//!
//! A destination never sees the raw [`PointerEvent`]. It gets a [`LocalEvent`],
//! which borrows the event and carries the subset of points meant for that
//! destination, each with its position mapped into the destination's local
//! space. Building a view is one small vector of `(point, position)` pairs; the
//! underlying event is never cloned. A synthesized mouse view over a touch point
//! overrides the event type and buttons in the same way.
//!
//! ## Delivery context
//!
//! [`EventCx`] is the only channel through which a callback touches engine
//! state. Acceptance and grab changes are *requests*: they are recorded while
//! the callback runs and applied by the agent, with notifications, as soon as
//! it returns. Queries made through the context already see the requests made
//! earlier in the same callback.

use alloc::vec::Vec;

use kurbo::Point;
use smallvec::SmallVec;

use crate::event::{EventPoint, EventType, PointerEvent};
use crate::grab::GrabRegistry;
use crate::host::ItemTree;
use crate::types::{
    AgentId, DeviceId, Key, Modifiers, MouseButtons, PointId, PointState, PointingDevice, Target,
};

/// One point of a [`LocalEvent`], positioned in the destination's local space.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct LocalPoint<'a> {
    /// The point as the device reported it.
    pub point: &'a EventPoint,
    /// Position in the destination's local coordinates.
    pub position: Point,
}

impl LocalPoint<'_> {
    /// Point id.
    pub fn id(&self) -> PointId {
        self.point.id
    }

    /// Point state.
    pub fn state(&self) -> PointState {
        self.point.state
    }

    /// Position in scene coordinates.
    pub fn scene_position(&self) -> Point {
        self.point.scene_position
    }
}

/// A [`PointerEvent`] as seen by one destination.
#[derive(Clone, Debug)]
pub struct LocalEvent<'a> {
    event: &'a PointerEvent,
    kind: EventType,
    button: MouseButtons,
    buttons: MouseButtons,
    synthesized: bool,
    points: SmallVec<[LocalPoint<'a>; 4]>,
}

impl<'a> LocalEvent<'a> {
    /// View of the points of `event` selected by `keep`, localized to `item`.
    pub(crate) fn new<K: Copy, T: ItemTree<K> + ?Sized>(
        tree: &T,
        item: K,
        event: &'a PointerEvent,
        mut keep: impl FnMut(&EventPoint) -> bool,
    ) -> Self {
        let points = event
            .points()
            .iter()
            .filter(|p| keep(p))
            .map(|p| LocalPoint {
                point: p,
                position: tree.map_from_scene(item, p.scene_position),
            })
            .collect();
        Self {
            event,
            kind: event.kind(),
            button: event.button,
            buttons: event.buttons,
            synthesized: false,
            points,
        }
    }

    /// View of every point of `event`, localized to `item`.
    pub(crate) fn all<K: Copy, T: ItemTree<K> + ?Sized>(
        tree: &T,
        item: K,
        event: &'a PointerEvent,
    ) -> Self {
        Self::new(tree, item, event, |_| true)
    }

    /// A single-point mouse view synthesized from a touch point.
    pub(crate) fn synthesized_mouse<K: Copy, T: ItemTree<K> + ?Sized>(
        tree: &T,
        item: K,
        event: &'a PointerEvent,
        point: &'a EventPoint,
        kind: EventType,
        button: MouseButtons,
        buttons: MouseButtons,
    ) -> Self {
        let mut points = SmallVec::new();
        points.push(LocalPoint {
            point,
            position: tree.map_from_scene(item, point.scene_position),
        });
        Self {
            event,
            kind,
            button,
            buttons,
            synthesized: true,
            points,
        }
    }

    /// The event type seen by this destination.
    ///
    /// For a synthesized mouse view this is the mouse type, not the touch type
    /// of the underlying event.
    pub fn kind(&self) -> EventType {
        self.kind
    }

    /// The underlying event.
    pub fn event(&self) -> &'a PointerEvent {
        self.event
    }

    /// Originating device.
    pub fn device(&self) -> &'a PointingDevice {
        self.event.device()
    }

    /// Keyboard modifiers.
    pub fn modifiers(&self) -> Modifiers {
        self.event.modifiers
    }

    /// Button that changed.
    pub fn button(&self) -> MouseButtons {
        self.button
    }

    /// Buttons held.
    pub fn buttons(&self) -> MouseButtons {
        self.buttons
    }

    /// Timestamp in milliseconds.
    pub fn timestamp(&self) -> u64 {
        self.event.timestamp
    }

    /// Whether this is a mouse view synthesized from touch.
    pub fn is_synthesized(&self) -> bool {
        self.synthesized
    }

    /// Points meant for this destination.
    pub fn points(&self) -> &[LocalPoint<'a>] {
        &self.points
    }

    /// Look up one of this view's points by id.
    pub fn point(&self, id: PointId) -> Option<&LocalPoint<'a>> {
        self.points.iter().find(|p| p.id() == id)
    }

    /// The first point, if any.
    pub fn first(&self) -> Option<&LocalPoint<'a>> {
        self.points.first()
    }
}

/// A grab change requested from inside a callback.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(crate) enum GrabRequest<K, H> {
    Exclusive(DeviceId, PointId, Option<Target<K, H>>),
    AddPassive(DeviceId, PointId, Target<K, H>),
    RemovePassive(DeviceId, PointId, Target<K, H>),
}

/// Side effects collected from callbacks during one delivery.
#[derive(Debug)]
pub(crate) struct CxSink<K, H> {
    pub(crate) accepted: SmallVec<[PointId; 4]>,
    pub(crate) requests: Vec<GrabRequest<K, H>>,
    pub(crate) posted: Vec<PointerEvent>,
}

impl<K, H> Default for CxSink<K, H> {
    fn default() -> Self {
        Self {
            accepted: SmallVec::new(),
            requests: Vec::new(),
            posted: Vec::new(),
        }
    }
}

impl<K, H> CxSink<K, H> {
    pub(crate) fn accept(&mut self, id: PointId) {
        if !self.accepted.contains(&id) {
            self.accepted.push(id);
        }
    }

    pub(crate) fn is_accepted(&self, id: PointId) -> bool {
        self.accepted.contains(&id)
    }
}

/// Context passed to every pointer callback.
///
/// The receiver is the item or handler currently being called. Methods that
/// change grabs record a request; the agent applies it after the callback
/// returns and notifies everyone involved through
/// [`Host::grab_changed`](crate::host::Host::grab_changed).
pub struct EventCx<'a, K, H> {
    grabs: &'a GrabRegistry<Target<K, H>>,
    context: AgentId,
    device: DeviceId,
    receiver: Target<K, H>,
    sink: &'a mut CxSink<K, H>,
}

impl<K: Key, H: Key> core::fmt::Debug for EventCx<'_, K, H> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("EventCx")
            .field("context", &self.context)
            .field("device", &self.device)
            .field("receiver", &self.receiver)
            .field("accepted", &self.sink.accepted)
            .field("pending_requests", &self.sink.requests.len())
            .finish_non_exhaustive()
    }
}

impl<'a, K: Key, H: Key> EventCx<'a, K, H> {
    pub(crate) fn new(
        grabs: &'a GrabRegistry<Target<K, H>>,
        context: AgentId,
        device: DeviceId,
        receiver: Target<K, H>,
        sink: &'a mut CxSink<K, H>,
    ) -> Self {
        Self {
            grabs,
            context,
            device,
            receiver,
            sink,
        }
    }

    /// The item or handler being called.
    pub fn receiver(&self) -> Target<K, H> {
        self.receiver
    }

    /// Device of the event being delivered.
    pub fn device(&self) -> DeviceId {
        self.device
    }

    /// Id of the agent delivering the event.
    pub fn agent(&self) -> AgentId {
        self.context
    }

    /// Mark a point as handled so later candidates do not get it.
    pub fn accept_point(&mut self, id: PointId) {
        self.sink.accept(id);
    }

    /// Mark every point of `event` as handled.
    pub fn accept_all(&mut self, event: &LocalEvent<'_>) {
        for p in event.points() {
            self.sink.accept(p.id());
        }
    }

    /// Whether a point has been accepted during this delivery.
    pub fn is_accepted(&self, id: PointId) -> bool {
        self.sink.is_accepted(id)
    }

    /// Take the exclusive grab of a point for the receiver, and accept it.
    pub fn grab(&mut self, id: PointId) {
        self.sink.accept(id);
        self.set_exclusive_grabber(id, Some(self.receiver));
    }

    /// Request a new exclusive grabber for a point; `None` releases it.
    pub fn set_exclusive_grabber(&mut self, id: PointId, target: Option<Target<K, H>>) {
        self.sink
            .requests
            .push(GrabRequest::Exclusive(self.device, id, target));
    }

    /// Release the receiver's exclusive grab of a point, if it holds it.
    pub fn ungrab(&mut self, id: PointId) {
        if self.exclusive_grabber(id) == Some(self.receiver) {
            self.set_exclusive_grabber(id, None);
        }
    }

    /// Observe a point passively.
    pub fn add_passive_grab(&mut self, id: PointId) {
        self.sink
            .requests
            .push(GrabRequest::AddPassive(self.device, id, self.receiver));
    }

    /// Stop observing a point passively.
    pub fn remove_passive_grab(&mut self, id: PointId) {
        self.sink
            .requests
            .push(GrabRequest::RemovePassive(self.device, id, self.receiver));
    }

    /// Current exclusive grabber of a point, including requests made so far.
    pub fn exclusive_grabber(&self, id: PointId) -> Option<Target<K, H>> {
        let pending = self.sink.requests.iter().rev().find_map(|r| match *r {
            GrabRequest::Exclusive(d, p, t) if d == self.device && p == id => Some(t),
            _ => None,
        });
        match pending {
            Some(t) => t,
            None => self.grabs.exclusive_grabber(self.device, id),
        }
    }

    /// Whether the receiver holds any grab on a point, including requests made so far.
    pub fn is_grabbing(&self, id: PointId) -> bool {
        if self.exclusive_grabber(id) == Some(self.receiver) {
            return true;
        }
        let mut passive = self
            .grabs
            .passive_grabbers(self.device, id)
            .iter()
            .any(|g| g.target == self.receiver);
        for r in &self.sink.requests {
            match *r {
                GrabRequest::AddPassive(d, p, t)
                    if d == self.device && p == id && t == self.receiver =>
                {
                    passive = true;
                }
                GrabRequest::RemovePassive(d, p, t)
                    if d == self.device && p == id && t == self.receiver =>
                {
                    passive = false;
                }
                _ => {}
            }
        }
        passive
    }

    /// Queue an event for delivery once the current one has completed.
    ///
    /// Posted events skip touch coalescing.
    pub fn post(&mut self, event: PointerEvent) {
        self.sink.posted.push(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grab::Grabber;
    use crate::types::{DeviceKind, PointState};

    type T = Target<u32, u8>;

    #[test]
    fn requests_are_visible_to_later_queries() {
        let dev = DeviceId(3);
        let mut grabs: GrabRegistry<T> = GrabRegistry::new();
        grabs.set_exclusive(
            dev,
            PointId(1),
            Some(Grabber::new(Target::Item(9), AgentId(0))),
            false,
        );
        let mut sink = CxSink::default();
        let mut cx = EventCx::new(&grabs, AgentId(0), dev, Target::Item(4), &mut sink);

        assert_eq!(cx.exclusive_grabber(PointId(1)), Some(Target::Item(9)));
        assert!(!cx.is_grabbing(PointId(1)));
        // Not ours to release.
        cx.ungrab(PointId(1));
        assert_eq!(cx.exclusive_grabber(PointId(1)), Some(Target::Item(9)));

        cx.grab(PointId(1));
        assert!(cx.is_grabbing(PointId(1)));
        assert!(cx.is_accepted(PointId(1)));
        cx.ungrab(PointId(1));
        assert_eq!(cx.exclusive_grabber(PointId(1)), None);

        cx.add_passive_grab(PointId(2));
        assert!(cx.is_grabbing(PointId(2)));
        cx.remove_passive_grab(PointId(2));
        assert!(!cx.is_grabbing(PointId(2)));
        assert_eq!(sink.requests.len(), 4);
    }

    struct Offset;

    impl ItemTree<u32> for Offset {
        fn root(&self) -> Option<u32> {
            Some(0)
        }
        fn is_alive(&self, _: u32) -> bool {
            true
        }
        fn parent_of(&self, _: u32) -> Option<u32> {
            None
        }
        fn children_in_paint_order(&self, _: u32) -> Vec<u32> {
            Vec::new()
        }
        fn z_index(&self, _: u32) -> i32 {
            0
        }
        fn bounds(&self, _: u32) -> kurbo::Rect {
            kurbo::Rect::new(0.0, 0.0, 10.0, 10.0)
        }
        fn map_from_scene(&self, item: u32, scene: Point) -> Point {
            scene - kurbo::Vec2::new(f64::from(item), 0.0)
        }
        fn map_to_scene(&self, item: u32, local: Point) -> Point {
            local + kurbo::Vec2::new(f64::from(item), 0.0)
        }
        fn is_visible(&self, _: u32) -> bool {
            true
        }
        fn is_enabled(&self, _: u32) -> bool {
            true
        }
        fn clips_children(&self, _: u32) -> bool {
            false
        }
    }

    #[test]
    fn views_localize_without_copying_points() {
        let screen = PointingDevice::new(DeviceId(1), DeviceKind::TouchScreen);
        let ev = PointerEvent::touch(
            screen,
            [
                EventPoint::new(PointId(1), PointState::Pressed, Point::new(30.0, 5.0)),
                EventPoint::new(PointId(2), PointState::Stationary, Point::new(50.0, 5.0)),
            ],
        )
        .unwrap();

        let view = LocalEvent::new(&Offset, 20, &ev, |p| p.state == PointState::Pressed);
        assert_eq!(view.points().len(), 1);
        assert_eq!(view.points()[0].position, Point::new(10.0, 5.0));
        assert!(core::ptr::eq(view.points()[0].point, &ev.points()[0]));

        let mouse = LocalEvent::synthesized_mouse(
            &Offset,
            20,
            &ev,
            &ev.points()[1],
            EventType::MousePress,
            MouseButtons::LEFT,
            MouseButtons::LEFT,
        );
        assert_eq!(mouse.kind(), EventType::MousePress);
        assert!(mouse.is_synthesized());
        assert_eq!(mouse.first().map(|p| p.id()), Some(PointId(2)));
        assert_eq!(mouse.event().kind(), EventType::TouchUpdate);
    }
}
