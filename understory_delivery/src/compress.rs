// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Touch update coalescing.
//!
//! Touch screens report faster than most scenes render. Pure touch updates
//! (only `Updated` and `Stationary` points) that arrive before the next frame
//! are merged into one pending event, which is delivered at the frame boundary
//! or as soon as something that cannot be merged arrives.
//!
//! Two updates merge when they come from the same device with the same
//! modifiers and exactly the same set of point ids. Anything else flushes the
//! pending event first, so the order of deliveries always matches the order of
//! arrival.
//!
//! ```
//! use kurbo::Point;
//! use understory_delivery::compress::{Offer, TouchCompressor};
//! use understory_delivery::event::{EventPoint, PointerEvent};
//! use understory_delivery::types::{DeviceId, DeviceKind, PointId, PointState, PointingDevice};
//!
//! let screen = PointingDevice::new(DeviceId(1), DeviceKind::TouchScreen);
//! let moved = |x: f64| {
//!     PointerEvent::touch(
//!         screen,
//!         [EventPoint::new(PointId(1), PointState::Updated, Point::new(x, 0.0))],
//!     )
//!     .unwrap()
//! };
//!
//! let mut compressor = TouchCompressor::new();
//! assert!(matches!(compressor.offer(moved(1.0)), Offer::Held));
//! assert!(matches!(compressor.offer(moved(2.0)), Offer::Held));
//! let merged = compressor.take_pending().unwrap();
//! assert_eq!(merged.points()[0].scene_position, Point::new(2.0, 0.0));
//! ```

use crate::event::PointerEvent;
use crate::types::PointState;

/// What the caller must deliver after offering an event.
#[derive(Debug)]
pub enum Offer {
    /// The event was merged or parked; nothing to deliver yet.
    Held,
    /// The event could not be merged with the pending one. Deliver the
    /// returned previous event now; the offered event is pending.
    Flushed(PointerEvent),
    /// The event is not compressible. Deliver `flushed` (if any), then `event`.
    Deliver {
        /// Previously pending event.
        flushed: Option<PointerEvent>,
        /// The offered event, returned unchanged.
        event: PointerEvent,
    },
}

/// Holds at most one pending touch update.
#[derive(Clone, Debug, Default)]
pub struct TouchCompressor {
    pending: Option<PointerEvent>,
}

impl TouchCompressor {
    /// An empty compressor.
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether an event is waiting for the next flush.
    pub fn has_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// Take the pending event, if any.
    pub fn take_pending(&mut self) -> Option<PointerEvent> {
        self.pending.take()
    }

    /// Offer an incoming event.
    pub fn offer(&mut self, event: PointerEvent) -> Offer {
        if !event.is_compressible() {
            return Offer::Deliver {
                flushed: self.pending.take(),
                event,
            };
        }
        match self.pending.take() {
            None => {
                self.pending = Some(event);
                Offer::Held
            }
            Some(mut pending) if mergeable(&pending, &event) => {
                merge(&mut pending, &event);
                tracing::trace!(
                    target: "understory::delivery::compress",
                    points = pending.point_count(),
                    "merged touch update"
                );
                self.pending = Some(pending);
                Offer::Held
            }
            Some(previous) => {
                tracing::trace!(
                    target: "understory::delivery::compress",
                    "touch update shape changed; flushing"
                );
                self.pending = Some(event);
                Offer::Flushed(previous)
            }
        }
    }
}

fn mergeable(pending: &PointerEvent, incoming: &PointerEvent) -> bool {
    pending.device().id == incoming.device().id
        && pending.modifiers == incoming.modifiers
        && pending.point_count() == incoming.point_count()
        && incoming
            .points()
            .iter()
            .all(|p| pending.point_by_id(p.id).is_some())
}

fn merge(pending: &mut PointerEvent, incoming: &PointerEvent) {
    for new in incoming.points() {
        if let Some(old) = pending.points_mut().iter_mut().find(|p| p.id == new.id) {
            let moved_before = old.state == PointState::Updated;
            *old = *new;
            if moved_before && new.state == PointState::Stationary {
                old.state = PointState::Updated;
            }
        }
    }
    pending.timestamp = incoming.timestamp;
    pending.buttons = incoming.buttons;
}
