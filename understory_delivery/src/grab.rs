// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Grab registry: who owns which point of which device.
//!
//! ## Overview
//!
//! Each active `(device, point)` pair has at most one *exclusive* grabber, which
//! receives every further update of that point, and any number of *passive*
//! grabbers, which observe updates without blocking anyone.
//!
//! The registry does not call anybody. Every mutation returns the ordered list of
//! [`GrabChange`]s it caused, and the caller delivers them. When an exclusive grab
//! moves, the previous owner's loss always precedes the new owner's gain.
//!
//! ```
//! use understory_delivery::grab::{GrabRegistry, GrabTransition, Grabber};
//! use understory_delivery::types::{AgentId, DeviceId, PointId};
//!
//! let (dev, pt, cx) = (DeviceId(0), PointId(1), AgentId(0));
//! let mut grabs: GrabRegistry<u32> = GrabRegistry::new();
//! grabs.set_exclusive(dev, pt, Some(Grabber::new(10, cx)), false);
//! let changes = grabs.set_exclusive(dev, pt, Some(Grabber::new(20, cx)), false);
//! let order: Vec<_> = changes.iter().map(|c| (c.target, c.transition)).collect();
//! assert_eq!(
//!     order,
//!     [(10, GrabTransition::LostExclusive), (20, GrabTransition::GainedExclusive)]
//! );
//! assert_eq!(grabs.exclusive_grabber(dev, pt), Some(20));
//! // Unknown pairs are simply ungrabbed.
//! assert_eq!(grabs.exclusive_grabber(dev, PointId(99)), None);
//! ```

use alloc::vec::Vec;
use hashbrown::HashMap;
use smallvec::SmallVec;

use crate::types::{AgentId, DeviceId, Key, PointId};

/// Kind of grab transition delivered to a target.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum GrabTransition {
    /// The target became the exclusive grabber.
    GainedExclusive,
    /// The target lost its exclusive grab (released or taken over).
    LostExclusive,
    /// The target's exclusive grab was cancelled (cancel event, deactivation, removal).
    CancelledExclusive,
    /// The target became a passive grabber.
    GainedPassive,
    /// The target stopped being a passive grabber.
    LostPassive,
    /// The target's passive grab was cancelled.
    CancelledPassive,
}

impl GrabTransition {
    /// Whether this transition concerns an exclusive grab.
    pub const fn is_exclusive(self) -> bool {
        matches!(
            self,
            Self::GainedExclusive | Self::LostExclusive | Self::CancelledExclusive
        )
    }

    /// Whether the target no longer holds the grab after this transition.
    pub const fn is_loss(self) -> bool {
        !matches!(self, Self::GainedExclusive | Self::GainedPassive)
    }
}

/// A grab holder tagged with the agent that registered it.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct Grabber<T> {
    /// The grabbing target.
    pub target: T,
    /// Agent context that registered the grab.
    pub context: AgentId,
}

impl<T> Grabber<T> {
    /// Pair a target with its registering context.
    pub const fn new(target: T, context: AgentId) -> Self {
        Self { target, context }
    }
}

/// One grab transition for one target.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct GrabChange<T> {
    /// Target being notified.
    pub target: T,
    /// What happened.
    pub transition: GrabTransition,
    /// Device of the point.
    pub device: DeviceId,
    /// The point.
    pub point: PointId,
}

/// Changes produced by a single registry mutation.
pub type GrabChanges<T> = SmallVec<[GrabChange<T>; 2]>;

#[derive(Clone, Debug)]
struct PointGrabs<T> {
    id: PointId,
    exclusive: Option<Grabber<T>>,
    passive: SmallVec<[Grabber<T>; 2]>,
}

impl<T> PointGrabs<T> {
    fn new(id: PointId) -> Self {
        Self {
            id,
            exclusive: None,
            passive: SmallVec::new(),
        }
    }

    fn is_empty(&self) -> bool {
        self.exclusive.is_none() && self.passive.is_empty()
    }
}

/// Per-device, per-point grab bookkeeping.
#[derive(Clone)]
pub struct GrabRegistry<T> {
    // Points stay in first-seen order so notifications are deterministic.
    devices: HashMap<DeviceId, Vec<PointGrabs<T>>>,
}

impl<T: Key> core::fmt::Debug for GrabRegistry<T> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let points: usize = self.devices.values().map(Vec::len).sum();
        f.debug_struct("GrabRegistry")
            .field("devices", &self.devices.len())
            .field("points", &points)
            .finish_non_exhaustive()
    }
}

impl<T: Key> Default for GrabRegistry<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Key> GrabRegistry<T> {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            devices: HashMap::new(),
        }
    }

    fn record(&self, device: DeviceId, point: PointId) -> Option<&PointGrabs<T>> {
        self.devices.get(&device)?.iter().find(|p| p.id == point)
    }

    fn record_mut(&mut self, device: DeviceId, point: PointId) -> &mut PointGrabs<T> {
        let points = self.devices.entry(device).or_default();
        let pos = match points.iter().position(|p| p.id == point) {
            Some(pos) => pos,
            None => {
                points.push(PointGrabs::new(point));
                points.len() - 1
            }
        };
        &mut points[pos]
    }

    /// Exclusive grabber of a point, or `None` (also for unknown pairs).
    pub fn exclusive_grabber(&self, device: DeviceId, point: PointId) -> Option<T> {
        self.exclusive(device, point).map(|g| g.target)
    }

    /// Exclusive grab record of a point, including its context tag.
    pub fn exclusive(&self, device: DeviceId, point: PointId) -> Option<Grabber<T>> {
        self.record(device, point).and_then(|r| r.exclusive)
    }

    /// Passive grabbers of a point in registration order.
    pub fn passive_grabbers(&self, device: DeviceId, point: PointId) -> &[Grabber<T>] {
        self.record(device, point).map_or(&[], |r| &r.passive)
    }

    /// Whether `target` holds an exclusive or passive grab on the point.
    pub fn is_grabbing(&self, target: T, device: DeviceId, point: PointId) -> bool {
        self.record(device, point).is_some_and(|r| {
            r.exclusive.is_some_and(|g| g.target == target)
                || r.passive.iter().any(|g| g.target == target)
        })
    }

    /// Install (or with `None`, release) the exclusive grabber of a point.
    ///
    /// Setting the current grabber again is a no-op. Otherwise the previous
    /// grabber is notified first (`CancelledExclusive` when `cancel` is set,
    /// `LostExclusive` otherwise), then the new one gets `GainedExclusive`.
    pub fn set_exclusive(
        &mut self,
        device: DeviceId,
        point: PointId,
        grabber: Option<Grabber<T>>,
        cancel: bool,
    ) -> GrabChanges<T> {
        let mut changes = GrabChanges::new();
        if grabber.is_none() && self.record(device, point).is_none() {
            return changes;
        }
        let record = self.record_mut(device, point);
        if record.exclusive.map(|g| g.target) == grabber.map(|g| g.target) {
            return changes;
        }
        let old = core::mem::replace(&mut record.exclusive, grabber);
        if let Some(old) = old {
            changes.push(GrabChange {
                target: old.target,
                transition: if cancel {
                    GrabTransition::CancelledExclusive
                } else {
                    GrabTransition::LostExclusive
                },
                device,
                point,
            });
        }
        if let Some(new) = grabber {
            changes.push(GrabChange {
                target: new.target,
                transition: GrabTransition::GainedExclusive,
                device,
                point,
            });
        }
        tracing::debug!(
            target: "understory::delivery::grab",
            ?device,
            %point,
            old = ?old.map(|g| g.target),
            new = ?grabber.map(|g| g.target),
            cancel,
            "exclusive grab changed"
        );
        changes
    }

    /// Add a passive grabber. Duplicates are ignored and produce no change.
    pub fn add_passive(
        &mut self,
        device: DeviceId,
        point: PointId,
        grabber: Grabber<T>,
    ) -> Option<GrabChange<T>> {
        let record = self.record_mut(device, point);
        if record.passive.iter().any(|g| g.target == grabber.target) {
            return None;
        }
        record.passive.push(grabber);
        tracing::debug!(
            target: "understory::delivery::grab",
            ?device,
            %point,
            target_key = ?grabber.target,
            "passive grab added"
        );
        Some(GrabChange {
            target: grabber.target,
            transition: GrabTransition::GainedPassive,
            device,
            point,
        })
    }

    /// Remove a passive grabber, if present.
    pub fn remove_passive(
        &mut self,
        device: DeviceId,
        point: PointId,
        target: T,
    ) -> Option<GrabChange<T>> {
        let points = self.devices.get_mut(&device)?;
        let record = points.iter_mut().find(|p| p.id == point)?;
        let pos = record.passive.iter().position(|g| g.target == target)?;
        record.passive.remove(pos);
        Some(GrabChange {
            target,
            transition: GrabTransition::LostPassive,
            device,
            point,
        })
    }

    /// Drop every passive grabber of a point.
    pub fn clear_passive(
        &mut self,
        device: DeviceId,
        point: PointId,
        cancel: bool,
    ) -> GrabChanges<T> {
        let Some(record) = self
            .devices
            .get_mut(&device)
            .and_then(|pts| pts.iter_mut().find(|p| p.id == point))
        else {
            return GrabChanges::new();
        };
        let transition = if cancel {
            GrabTransition::CancelledPassive
        } else {
            GrabTransition::LostPassive
        };
        record
            .passive
            .drain(..)
            .map(|g| GrabChange {
                target: g.target,
                transition,
                device,
                point,
            })
            .collect()
    }

    /// Cancel every grab `target` holds, across all devices and points.
    pub fn clear_all_for(&mut self, target: T) -> Vec<GrabChange<T>> {
        let mut changes = Vec::new();
        let mut devices: Vec<DeviceId> = self.devices.keys().copied().collect();
        devices.sort_unstable();
        for device in devices {
            let Some(points) = self.devices.get_mut(&device) else {
                continue;
            };
            for record in points.iter_mut() {
                if record.exclusive.is_some_and(|g| g.target == target) {
                    record.exclusive = None;
                    changes.push(GrabChange {
                        target,
                        transition: GrabTransition::CancelledExclusive,
                        device,
                        point: record.id,
                    });
                }
                let before = record.passive.len();
                record.passive.retain(|g| g.target != target);
                if record.passive.len() != before {
                    changes.push(GrabChange {
                        target,
                        transition: GrabTransition::CancelledPassive,
                        device,
                        point: record.id,
                    });
                }
            }
            points.retain(|p| !p.is_empty());
        }
        self.devices.retain(|_, pts| !pts.is_empty());
        changes
    }

    /// Cancel every grab on a device and forget its points.
    ///
    /// Exclusive losses come first for each point, then passive ones.
    pub fn cancel_device(&mut self, device: DeviceId) -> Vec<GrabChange<T>> {
        let Some(points) = self.devices.remove(&device) else {
            return Vec::new();
        };
        let mut changes = Vec::new();
        for record in points {
            if let Some(g) = record.exclusive {
                changes.push(GrabChange {
                    target: g.target,
                    transition: GrabTransition::CancelledExclusive,
                    device,
                    point: record.id,
                });
            }
            for g in record.passive {
                changes.push(GrabChange {
                    target: g.target,
                    transition: GrabTransition::CancelledPassive,
                    device,
                    point: record.id,
                });
            }
        }
        changes
    }

    /// Cancel every exclusive grab registered by `context`; passive grabs stay.
    pub fn cancel_exclusive_in(&mut self, context: AgentId) -> Vec<GrabChange<T>> {
        let mut changes = Vec::new();
        let mut devices: Vec<DeviceId> = self.devices.keys().copied().collect();
        devices.sort_unstable();
        for device in devices {
            let Some(points) = self.devices.get_mut(&device) else {
                continue;
            };
            for record in points.iter_mut() {
                if let Some(g) = record.exclusive
                    && g.context == context
                {
                    record.exclusive = None;
                    changes.push(GrabChange {
                        target: g.target,
                        transition: GrabTransition::CancelledExclusive,
                        device,
                        point: record.id,
                    });
                }
            }
            points.retain(|p| !p.is_empty());
        }
        self.devices.retain(|_, pts| !pts.is_empty());
        changes
    }

    /// Silently drop every grab held by `target`, without notifications.
    ///
    /// Used when the target no longer exists and cannot be notified.
    pub fn forget(&mut self, target: T) {
        for points in self.devices.values_mut() {
            for record in points.iter_mut() {
                if record.exclusive.is_some_and(|g| g.target == target) {
                    record.exclusive = None;
                }
                record.passive.retain(|g| g.target != target);
            }
            points.retain(|p| !p.is_empty());
        }
        self.devices.retain(|_, pts| !pts.is_empty());
    }

    /// Forget a point once it is released and its grabs were cleared.
    pub fn remove_point(&mut self, device: DeviceId, point: PointId) {
        if let Some(points) = self.devices.get_mut(&device) {
            points.retain(|p| p.id != point);
            if points.is_empty() {
                self.devices.remove(&device);
            }
        }
    }

    /// Points of `device` that currently have any grab, in first-seen order.
    pub fn grabbed_points(&self, device: DeviceId) -> SmallVec<[PointId; 4]> {
        self.devices
            .get(&device)
            .map(|pts| {
                pts.iter()
                    .filter(|p| !p.is_empty())
                    .map(|p| p.id)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Points of `device` exclusively grabbed by `target`.
    pub fn points_grabbed_by(&self, target: T, device: DeviceId) -> SmallVec<[PointId; 4]> {
        self.devices
            .get(&device)
            .map(|pts| {
                pts.iter()
                    .filter(|p| p.exclusive.is_some_and(|g| g.target == target))
                    .map(|p| p.id)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Whether no point of any device is grabbed.
    pub fn is_empty(&self) -> bool {
        self.devices.values().all(|pts| pts.iter().all(PointGrabs::is_empty))
    }
}
