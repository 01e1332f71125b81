// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Core types: devices, point identity, buttons, modifiers, and delivery targets.

use core::fmt;
use core::hash::Hash;

/// Bound shared by item and handler keys.
///
/// Keys are small copyable handles (arena indices, generational ids). The
/// engine never dereferences them itself; it only asks the host about them.
pub trait Key: Copy + Eq + Hash + fmt::Debug {}

impl<T: Copy + Eq + Hash + fmt::Debug> Key for T {}

/// Identity of a physical input device.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DeviceId(pub u32);

/// Kind of pointing device.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum DeviceKind {
    /// A mouse or any indirect single-point device with buttons.
    Mouse,
    /// A direct multi-touch surface.
    TouchScreen,
    /// An indirect multi-touch surface.
    TouchPad,
    /// A graphics tablet puck.
    Tablet,
    /// A pen or stylus.
    Stylus,
}

bitflags::bitflags! {
    /// Capabilities reported by a pointing device.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct DeviceCapabilities: u8 {
        /// Points carry a meaningful velocity.
        const VELOCITY        = 0b0000_0001;
        /// The platform already emulates mouse events for this device.
        const MOUSE_EMULATION = 0b0000_0010;
        /// The device reports hover (proximity without contact).
        const HOVER           = 0b0000_0100;
        /// Points carry pressure.
        const PRESSURE        = 0b0000_1000;
    }
}

/// A pointing device: identity, kind, and capabilities.
///
/// Devices own no points; [`EventPoint`](crate::event::EventPoint)s are always
/// delivered inside an event that names their device.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct PointingDevice {
    /// Device identity.
    pub id: DeviceId,
    /// Kind of device.
    pub kind: DeviceKind,
    /// Capability flags.
    pub capabilities: DeviceCapabilities,
}

impl PointingDevice {
    /// A device with no special capabilities.
    pub const fn new(id: DeviceId, kind: DeviceKind) -> Self {
        Self {
            id,
            kind,
            capabilities: DeviceCapabilities::empty(),
        }
    }

    /// Builder-style capability override.
    pub const fn with_capabilities(mut self, capabilities: DeviceCapabilities) -> Self {
        self.capabilities = capabilities;
        self
    }

    /// Whether this device produces touch points.
    pub const fn is_touch(&self) -> bool {
        matches!(self.kind, DeviceKind::TouchScreen | DeviceKind::TouchPad)
    }
}

/// Identity of one contact, unique among the active points of its device.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PointId(pub u32);

impl PointId {
    /// The single point of a mouse, wheel, or tablet event.
    pub const PRIMARY: Self = Self(0);
}

impl fmt::Display for PointId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Lifecycle state of a point within one event.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum PointState {
    /// The contact started in this event.
    Pressed,
    /// The contact moved (or changed pressure).
    Updated,
    /// The contact is still down but did not change.
    Stationary,
    /// The contact ended in this event.
    Released,
}

bitflags::bitflags! {
    /// A set of mouse buttons.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct MouseButtons: u8 {
        /// Primary (usually left) button.
        const LEFT    = 0b0000_0001;
        /// Secondary (usually right) button.
        const RIGHT   = 0b0000_0010;
        /// Middle button or wheel click.
        const MIDDLE  = 0b0000_0100;
        /// Back navigation button.
        const BACK    = 0b0000_1000;
        /// Forward navigation button.
        const FORWARD = 0b0001_0000;
    }
}

bitflags::bitflags! {
    /// Keyboard modifiers held during an event.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct Modifiers: u8 {
        /// Shift.
        const SHIFT   = 0b0000_0001;
        /// Control.
        const CONTROL = 0b0000_0010;
        /// Alt / Option.
        const ALT     = 0b0000_0100;
        /// Meta / Command / Super.
        const META    = 0b0000_1000;
    }
}

/// Something that can hold a grab: an item, or a handler attached to an item.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Target<K, H> {
    /// A plain item.
    Item(K),
    /// A pointer handler.
    Handler(H),
}

impl<K: Copy, H: Copy> Target<K, H> {
    /// The item, if this target is one.
    pub fn item(self) -> Option<K> {
        match self {
            Self::Item(k) => Some(k),
            Self::Handler(_) => None,
        }
    }

    /// The handler, if this target is one.
    pub fn handler(self) -> Option<H> {
        match self {
            Self::Item(_) => None,
            Self::Handler(h) => Some(h),
        }
    }
}

/// Identity of a delivery agent, used to tag the grabs it registers.
///
/// A scene nested inside another scene gets its own agent; tagging keeps a
/// point grabbed inside the nested scene from being redelivered by the outer one.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Default)]
pub struct AgentId(pub u32);
