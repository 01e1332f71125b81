// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Pointer event model: points, event types, and validated events.
//!
//! A [`PointerEvent`] is built once per platform event and lives only for the
//! duration of one delivery. Destinations never receive it directly; they get a
//! [`LocalEvent`](crate::context::LocalEvent) view whose positions were mapped
//! into their own coordinate space.
//!
//! ```
//! use kurbo::Point;
//! use understory_delivery::event::{EventPoint, PointerEvent};
//! use understory_delivery::types::{DeviceId, DeviceKind, PointId, PointState, PointingDevice};
//!
//! let screen = PointingDevice::new(DeviceId(1), DeviceKind::TouchScreen);
//! let ev = PointerEvent::touch(
//!     screen,
//!     [
//!         EventPoint::new(PointId(1), PointState::Pressed, Point::new(10.0, 10.0)),
//!         EventPoint::new(PointId(2), PointState::Stationary, Point::new(50.0, 50.0)),
//!     ],
//! )
//! .unwrap();
//! assert!(ev.is_begin_event());
//! assert!(ev.is_update_event());
//! assert!(!ev.is_end_event());
//!
//! // Point ids must be unique within one event.
//! let dup = PointerEvent::touch(
//!     screen,
//!     [
//!         EventPoint::new(PointId(1), PointState::Pressed, Point::ZERO),
//!         EventPoint::new(PointId(1), PointState::Pressed, Point::ZERO),
//!     ],
//! );
//! assert!(dup.is_err());
//! ```

use kurbo::{Point, Vec2};
use smallvec::SmallVec;

use crate::error::{Error, Result};
use crate::types::{MouseButtons, Modifiers, PointId, PointState, PointingDevice};

/// One contact within an event.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct EventPoint {
    /// Stable id of the contact.
    pub id: PointId,
    /// State of the contact in this event.
    pub state: PointState,
    /// Position in scene coordinates.
    pub scene_position: Point,
    /// Position in global (screen) coordinates.
    pub global_position: Point,
    /// Velocity in scene units per second, if the device reports it.
    pub velocity: Vec2,
    /// Timestamp in milliseconds.
    pub timestamp: u64,
}

impl EventPoint {
    /// A point whose global position equals its scene position.
    pub fn new(id: PointId, state: PointState, scene_position: Point) -> Self {
        Self {
            id,
            state,
            scene_position,
            global_position: scene_position,
            velocity: Vec2::ZERO,
            timestamp: 0,
        }
    }

    /// Builder-style global position override.
    pub fn with_global_position(mut self, global: Point) -> Self {
        self.global_position = global;
        self
    }

    /// Builder-style velocity override.
    pub fn with_velocity(mut self, velocity: Vec2) -> Self {
        self.velocity = velocity;
        self
    }

    /// Builder-style timestamp override.
    pub fn with_timestamp(mut self, timestamp: u64) -> Self {
        self.timestamp = timestamp;
        self
    }
}

/// Logical event type.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum EventType {
    /// Mouse button pressed.
    MousePress,
    /// Mouse button released.
    MouseRelease,
    /// Mouse moved.
    MouseMove,
    /// Second press of a double click.
    MouseDoubleClick,
    /// First touch event of a gesture (all points pressed).
    TouchBegin,
    /// Any touch event in the middle of a gesture.
    TouchUpdate,
    /// Last touch event of a gesture (all points released).
    TouchEnd,
    /// The platform aborted the touch sequence.
    TouchCancel,
    /// Stylus touched the tablet.
    TabletPress,
    /// Stylus moved.
    TabletMove,
    /// Stylus left the tablet surface.
    TabletRelease,
    /// Scroll wheel.
    Wheel,
}

impl EventType {
    /// Mouse event types (including synthesized ones).
    pub const fn is_mouse(self) -> bool {
        matches!(
            self,
            Self::MousePress | Self::MouseRelease | Self::MouseMove | Self::MouseDoubleClick
        )
    }

    /// Touch event types, cancel included.
    pub const fn is_touch(self) -> bool {
        matches!(
            self,
            Self::TouchBegin | Self::TouchUpdate | Self::TouchEnd | Self::TouchCancel
        )
    }

    /// Tablet event types.
    pub const fn is_tablet(self) -> bool {
        matches!(
            self,
            Self::TabletPress | Self::TabletMove | Self::TabletRelease
        )
    }
}

/// A validated, non-empty set of points from one device.
#[derive(Clone, Debug, PartialEq)]
pub struct PointerEvent {
    kind: EventType,
    device: PointingDevice,
    points: SmallVec<[EventPoint; 4]>,
    /// Keyboard modifiers held.
    pub modifiers: Modifiers,
    /// Button that changed (mouse press/release), empty otherwise.
    pub button: MouseButtons,
    /// Buttons held after this event.
    pub buttons: MouseButtons,
    /// Timestamp in milliseconds.
    pub timestamp: u64,
    /// Wheel delta in scene units.
    pub delta: Vec2,
}

impl PointerEvent {
    /// Build an event from arbitrary points.
    ///
    /// Fails if `points` is empty (unless `kind` is [`EventType::TouchCancel`])
    /// or contains a repeated id.
    pub fn new(
        kind: EventType,
        device: PointingDevice,
        points: impl IntoIterator<Item = EventPoint>,
    ) -> Result<Self> {
        let points: SmallVec<[EventPoint; 4]> = points.into_iter().collect();
        if points.is_empty() && kind != EventType::TouchCancel {
            return Err(Error::NoPoints);
        }
        for (i, p) in points.iter().enumerate() {
            if points[..i].iter().any(|q| q.id == p.id) {
                return Err(Error::DuplicatePoint(p.id));
            }
        }
        let timestamp = points.iter().map(|p| p.timestamp).max().unwrap_or(0);
        Ok(Self {
            kind,
            device,
            points,
            modifiers: Modifiers::empty(),
            button: MouseButtons::empty(),
            buttons: MouseButtons::empty(),
            timestamp,
            delta: Vec2::ZERO,
        })
    }

    /// A single-point mouse event.
    ///
    /// The point state follows the event type: press and double click are
    /// `Pressed`, release is `Released`, move is `Updated`.
    pub fn mouse(
        kind: EventType,
        device: PointingDevice,
        scene_position: Point,
        button: MouseButtons,
        buttons: MouseButtons,
    ) -> Self {
        let state = match kind {
            EventType::MousePress | EventType::MouseDoubleClick | EventType::TabletPress => {
                PointState::Pressed
            }
            EventType::MouseRelease | EventType::TabletRelease => PointState::Released,
            _ => PointState::Updated,
        };
        let mut points = SmallVec::new();
        points.push(EventPoint::new(PointId::PRIMARY, state, scene_position));
        Self {
            kind,
            device,
            points,
            modifiers: Modifiers::empty(),
            button,
            buttons,
            timestamp: 0,
            delta: Vec2::ZERO,
        }
    }

    /// A touch event; the type is derived from the point states.
    ///
    /// All points pressed gives [`EventType::TouchBegin`], all released gives
    /// [`EventType::TouchEnd`], anything else is [`EventType::TouchUpdate`].
    pub fn touch(
        device: PointingDevice,
        points: impl IntoIterator<Item = EventPoint>,
    ) -> Result<Self> {
        let mut ev = Self::new(EventType::TouchUpdate, device, points)?;
        if ev.points.iter().all(|p| p.state == PointState::Pressed) {
            ev.kind = EventType::TouchBegin;
        } else if ev.points.iter().all(|p| p.state == PointState::Released) {
            ev.kind = EventType::TouchEnd;
        }
        Ok(ev)
    }

    /// A touch cancel for every point of `device`.
    pub fn touch_cancel(device: PointingDevice) -> Self {
        Self {
            kind: EventType::TouchCancel,
            device,
            points: SmallVec::new(),
            modifiers: Modifiers::empty(),
            button: MouseButtons::empty(),
            buttons: MouseButtons::empty(),
            timestamp: 0,
            delta: Vec2::ZERO,
        }
    }

    /// A wheel event at `scene_position`.
    pub fn wheel(device: PointingDevice, scene_position: Point, delta: Vec2) -> Self {
        let mut ev = Self::mouse(
            EventType::Wheel,
            device,
            scene_position,
            MouseButtons::empty(),
            MouseButtons::empty(),
        );
        ev.delta = delta;
        ev
    }

    /// Builder-style modifiers override.
    pub fn with_modifiers(mut self, modifiers: Modifiers) -> Self {
        self.modifiers = modifiers;
        self
    }

    /// Builder-style timestamp override; also stamps every point.
    pub fn with_timestamp(mut self, timestamp: u64) -> Self {
        self.timestamp = timestamp;
        for p in &mut self.points {
            p.timestamp = timestamp;
        }
        self
    }

    /// Event type.
    pub fn kind(&self) -> EventType {
        self.kind
    }

    /// Originating device.
    pub fn device(&self) -> &PointingDevice {
        &self.device
    }

    /// Points in event order.
    pub fn points(&self) -> &[EventPoint] {
        &self.points
    }

    /// Mutable access for in-place coalescing.
    pub(crate) fn points_mut(&mut self) -> &mut [EventPoint] {
        &mut self.points
    }

    /// Number of points.
    pub fn point_count(&self) -> usize {
        self.points.len()
    }

    /// Look up a point by id.
    pub fn point_by_id(&self, id: PointId) -> Option<&EventPoint> {
        self.points.iter().find(|p| p.id == id)
    }

    /// Press-like: a mouse press or double click, or any point pressed.
    pub fn is_begin_event(&self) -> bool {
        match self.kind {
            EventType::MousePress | EventType::MouseDoubleClick => true,
            EventType::MouseMove | EventType::MouseRelease | EventType::Wheel => false,
            _ => self.points.iter().any(|p| p.state == PointState::Pressed),
        }
    }

    /// Move-like: a mouse move, or any point updated or stationary.
    pub fn is_update_event(&self) -> bool {
        match self.kind {
            EventType::MouseMove => true,
            EventType::MousePress
            | EventType::MouseDoubleClick
            | EventType::MouseRelease
            | EventType::Wheel => false,
            _ => self
                .points
                .iter()
                .any(|p| matches!(p.state, PointState::Updated | PointState::Stationary)),
        }
    }

    /// Release-like: a mouse release, or any point released.
    pub fn is_end_event(&self) -> bool {
        match self.kind {
            EventType::MouseRelease => true,
            EventType::MousePress
            | EventType::MouseDoubleClick
            | EventType::MouseMove
            | EventType::Wheel => false,
            _ => self.points.iter().any(|p| p.state == PointState::Released),
        }
    }

    /// Whether this event may be merged with another pending one.
    pub fn is_compressible(&self) -> bool {
        self.kind == EventType::TouchUpdate
            && self
                .points
                .iter()
                .all(|p| matches!(p.state, PointState::Updated | PointState::Stationary))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{DeviceId, DeviceKind};

    fn screen() -> PointingDevice {
        PointingDevice::new(DeviceId(7), DeviceKind::TouchScreen)
    }

    fn pt(id: u32, state: PointState) -> EventPoint {
        EventPoint::new(PointId(id), state, Point::new(f64::from(id), 0.0))
    }

    #[test]
    fn empty_events_are_rejected_except_cancel() {
        assert_eq!(
            PointerEvent::touch(screen(), []).unwrap_err(),
            Error::NoPoints
        );
        let cancel = PointerEvent::new(EventType::TouchCancel, screen(), []).unwrap();
        assert_eq!(cancel.point_count(), 0);
    }

    #[test]
    fn duplicate_ids_are_rejected() {
        let err = PointerEvent::touch(
            screen(),
            [
                pt(1, PointState::Pressed),
                pt(2, PointState::Pressed),
                pt(1, PointState::Updated),
            ],
        )
        .unwrap_err();
        assert_eq!(err, Error::DuplicatePoint(PointId(1)));
    }

    #[test]
    fn touch_type_follows_point_states() {
        let begin = PointerEvent::touch(screen(), [pt(1, PointState::Pressed)]).unwrap();
        assert_eq!(begin.kind(), EventType::TouchBegin);

        let mixed = PointerEvent::touch(
            screen(),
            [pt(1, PointState::Released), pt(2, PointState::Stationary)],
        )
        .unwrap();
        assert_eq!(mixed.kind(), EventType::TouchUpdate);
        assert!(mixed.is_end_event());
        assert!(mixed.is_update_event());
        assert!(!mixed.is_begin_event());

        let end = PointerEvent::touch(screen(), [pt(1, PointState::Released)]).unwrap();
        assert_eq!(end.kind(), EventType::TouchEnd);
    }

    #[test]
    fn mouse_point_state_follows_type() {
        let mouse = PointingDevice::new(DeviceId(0), DeviceKind::Mouse);
        let press = PointerEvent::mouse(
            EventType::MousePress,
            mouse,
            Point::ZERO,
            MouseButtons::LEFT,
            MouseButtons::LEFT,
        );
        assert_eq!(press.points()[0].state, PointState::Pressed);
        assert!(press.is_begin_event());

        let release = PointerEvent::mouse(
            EventType::MouseRelease,
            mouse,
            Point::ZERO,
            MouseButtons::LEFT,
            MouseButtons::empty(),
        );
        assert_eq!(release.points()[0].state, PointState::Released);
        assert!(release.is_end_event());
        assert!(!release.is_update_event());
    }

    #[test]
    fn only_pure_updates_are_compressible() {
        let update = PointerEvent::touch(
            screen(),
            [pt(1, PointState::Updated), pt(2, PointState::Stationary)],
        )
        .unwrap();
        assert!(update.is_compressible());

        let with_press = PointerEvent::touch(
            screen(),
            [pt(1, PointState::Updated), pt(2, PointState::Pressed)],
        )
        .unwrap();
        assert!(!with_press.is_compressible());
    }
}
