// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The delivery agent: one event in, callbacks out.
//!
//! ## Phases
//!
//! Every pointer event is processed to completion by one call:
//!
//! 1. **Press.** Points that were pressed are hit tested; candidates are offered
//!    the event deepest first, each after its filtering ancestors had a chance
//!    to intercept it. A candidate that consumes a point becomes its exclusive
//!    grabber, and the point is not offered further. Once every point is
//!    accepted, the remaining candidates only run their handlers.
//! 2. **Update.** Points that were already down go straight to their exclusive
//!    grabber, then to passive grabbers. Ungrabbed points are hit tested again,
//!    but only handlers see them, so movement alone never captures an item.
//! 3. **Release.** Released points reach their grabber during the update phase;
//!    handlers along the hit test path then see the release, and finally every
//!    grab on a released point is cleared.
//!
//! Touch cancel is forced: every target holding any grab on the device is told,
//! whatever it answers, and then the device's grabs are dropped.
//!
//! ## Liveness
//!
//! Callbacks may remove items from the tree. After each callback the agent checks
//! that the target still exists before reading anything about it; a removed
//! target is dropped from the grab registry and hover set without notifications.

use alloc::rc::Rc;
use alloc::vec::Vec;
use core::cell::Cell;
use core::fmt;

use hashbrown::HashMap;
use kurbo::Point;
use smallvec::SmallVec;

use crate::compress::{Offer, TouchCompressor};
use crate::config::DeliveryConfig;
use crate::context::{CxSink, EventCx, GrabRequest, LocalEvent};
use crate::drag::DragState;
use crate::error::Result;
use crate::event::{EventType, PointerEvent};
use crate::focus::FocusState;
use crate::grab::{GrabChange, GrabRegistry, GrabTransition, Grabber};
use crate::hit::{TargetFilter, merge_targets, pointer_targets};
use crate::host::{Host, ItemTree, UngrabKind};
use crate::hover::HoverState;
use crate::touch_mouse::TouchMouse;
use crate::types::{
    AgentId, DeviceId, Key, Modifiers, MouseButtons, PointId, PointState, PointingDevice, Target,
};

/// Per-pass bookkeeping, reset at the start of each delivery.
#[derive(Debug)]
pub(crate) struct PassState<K, H> {
    /// Ancestors already offered the current event.
    pub(crate) has_filtered: SmallVec<[K; 8]>,
    /// Items that must not be delivered to again in this pass.
    pub(crate) skip_delivery: SmallVec<[K; 8]>,
    /// Handlers that already saw the current event.
    pub(crate) delivered_handlers: SmallVec<[H; 4]>,
}

impl<K, H> Default for PassState<K, H> {
    fn default() -> Self {
        Self {
            has_filtered: SmallVec::new(),
            skip_delivery: SmallVec::new(),
            delivered_handlers: SmallVec::new(),
        }
    }
}

impl<K, H> PassState<K, H> {
    fn clear(&mut self) {
        self.has_filtered.clear();
        self.skip_delivery.clear();
        self.delivered_handlers.clear();
    }
}

#[derive(Copy, Clone, Debug)]
struct LastMouse {
    device: DeviceId,
    position: Point,
    modifiers: Modifiers,
    timestamp: u64,
}

/// Increments the delivery depth for as long as it lives.
struct DepthGuard(Rc<Cell<u32>>);

impl DepthGuard {
    fn enter(depth: &Rc<Cell<u32>>) -> Self {
        depth.set(depth.get() + 1);
        Self(Rc::clone(depth))
    }
}

impl Drop for DepthGuard {
    fn drop(&mut self) {
        self.0.set(self.0.get().saturating_sub(1));
    }
}

/// Routes pointer, hover, drag and key input to the items of one scene.
///
/// `K` is the item key and `H` the handler key of the [`Host`] the agent is
/// used with. The agent owns grab, hover, focus and drag state; the host is
/// borrowed mutably for each entry point so callbacks may change the scene.
pub struct DeliveryAgent<K, H> {
    pub(crate) id: AgentId,
    pub(crate) config: DeliveryConfig,
    pub(crate) grabs: GrabRegistry<Target<K, H>>,
    pub(crate) hover: HoverState<Target<K, H>>,
    pub(crate) touch_mouse: TouchMouse,
    pub(crate) compressor: TouchCompressor,
    pub(crate) focus: FocusState<K>,
    pub(crate) drag: DragState<K>,
    pub(crate) pass: PassState<K, H>,
    pub(crate) sink: CxSink<K, H>,
    devices: HashMap<DeviceId, PointingDevice>,
    depth: Rc<Cell<u32>>,
    last_mouse: Option<LastMouse>,
    last_ungrabbed: Option<K>,
    allow_double_click: bool,
}

impl<K: Key, H: Key> fmt::Debug for DeliveryAgent<K, H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeliveryAgent")
            .field("id", &self.id)
            .field("config", &self.config)
            .field("grabs", &self.grabs)
            .field("hover", &self.hover)
            .field("touch_mouse", &self.touch_mouse)
            .field("pending_touch", &self.compressor.has_pending())
            .field("depth", &self.depth.get())
            .finish_non_exhaustive()
    }
}

impl<K: Key, H: Key> Default for DeliveryAgent<K, H> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Key, H: Key> DeliveryAgent<K, H> {
    /// An agent with the default configuration and [`AgentId`] 0.
    pub fn new() -> Self {
        Self {
            id: AgentId::default(),
            config: DeliveryConfig::default(),
            grabs: GrabRegistry::new(),
            hover: HoverState::new(),
            touch_mouse: TouchMouse::default(),
            compressor: TouchCompressor::new(),
            focus: FocusState::new(),
            drag: DragState::default(),
            pass: PassState::default(),
            sink: CxSink::default(),
            devices: HashMap::new(),
            depth: Rc::new(Cell::new(0)),
            last_mouse: None,
            last_ungrabbed: None,
            allow_double_click: true,
        }
    }

    /// An agent with its own id and a validated configuration.
    pub fn with_config(id: AgentId, config: DeliveryConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            id,
            config,
            ..Self::new()
        })
    }

    /// This agent's id; every grab it registers is tagged with it.
    pub fn id(&self) -> AgentId {
        self.id
    }

    /// Current configuration.
    pub fn config(&self) -> &DeliveryConfig {
        &self.config
    }

    /// Replace the configuration.
    pub fn set_config(&mut self, config: DeliveryConfig) -> Result<()> {
        config.validate()?;
        self.config = config;
        Ok(())
    }

    /// Whether a delivery is in progress on this agent.
    pub fn is_delivering(&self) -> bool {
        self.depth.get() > 0
    }

    /// Read access to the grab registry.
    pub fn grabs(&self) -> &GrabRegistry<Target<K, H>> {
        &self.grabs
    }

    /// Exclusive grabber of a point.
    pub fn exclusive_grabber(&self, device: DeviceId, point: PointId) -> Option<Target<K, H>> {
        self.grabs.exclusive_grabber(device, point)
    }

    /// Passive grabbers of a point, in registration order.
    pub fn passive_grabbers(
        &self,
        device: DeviceId,
        point: PointId,
    ) -> impl Iterator<Item = Target<K, H>> + '_ {
        self.grabs
            .passive_grabbers(device, point)
            .iter()
            .map(|g| g.target)
    }

    /// Whether `target` holds any grab on a point.
    pub fn is_grabbing(&self, target: Target<K, H>, device: DeviceId, point: PointId) -> bool {
        self.grabs.is_grabbing(target, device, point)
    }

    /// Give `target` the exclusive grab of a point.
    pub fn grab_exclusive<T: Host<Item = K, Handler = H>>(
        &mut self,
        host: &mut T,
        target: Target<K, H>,
        device: DeviceId,
        point: PointId,
    ) {
        if self.target_alive(host, target) {
            self.set_exclusive(host, device, point, Some(target), false);
        }
    }

    /// Release whatever grab `target` holds on a point.
    pub fn ungrab<T: Host<Item = K, Handler = H>>(
        &mut self,
        host: &mut T,
        target: Target<K, H>,
        device: DeviceId,
        point: PointId,
    ) {
        if self.grabs.exclusive_grabber(device, point) == Some(target) {
            self.set_exclusive(host, device, point, None, false);
        }
        if let Some(change) = self.grabs.remove_passive(device, point, target) {
            self.notify(host, [change]);
        }
    }

    /// Let `target` observe a point passively.
    pub fn add_passive_grab<T: Host<Item = K, Handler = H>>(
        &mut self,
        host: &mut T,
        target: Target<K, H>,
        device: DeviceId,
        point: PointId,
    ) {
        if !self.target_alive(host, target) {
            return;
        }
        if let Some(change) = self
            .grabs
            .add_passive(device, point, Grabber::new(target, self.id))
        {
            self.notify(host, [change]);
        }
    }

    /// Drop every grab `target` holds, with cancel notifications.
    ///
    /// Call this when an item is disabled, hidden, or about to be removed.
    pub fn remove_grabber<T: Host<Item = K, Handler = H>>(
        &mut self,
        host: &mut T,
        target: Target<K, H>,
    ) {
        if let Some((device, point)) = self.touch_mouse_point() {
            if self.grabs.exclusive_grabber(device, point) == Some(target) {
                self.touch_mouse.cancel();
            }
        }
        let changes = self.grabs.clear_all_for(target);
        self.notify(host, changes);
    }

    /// Entry point for every pointer event.
    ///
    /// Touch updates may be held back until
    /// [`flush_frame_synchronous_events`](Self::flush_frame_synchronous_events);
    /// everything else is delivered before this returns.
    pub fn handle_pointer_event<T: Host<Item = K, Handler = H>>(
        &mut self,
        host: &mut T,
        event: PointerEvent,
    ) {
        self.devices.insert(event.device().id, *event.device());
        match event.kind() {
            EventType::TouchCancel => {
                if let Some(pending) = self.compressor.take_pending() {
                    self.deliver_pointer_event(host, &pending);
                }
                self.deliver_cancel(host, &event);
            }
            kind if kind.is_touch() => self.handle_touch_event(host, event),
            EventType::MouseMove => self.handle_mouse_move(host, &event),
            EventType::MouseDoubleClick => {
                if self.allow_double_click {
                    self.deliver_pointer_event(host, &event);
                } else {
                    tracing::trace!(
                        target: "understory::delivery::mouse",
                        "double click suppressed; the press went to a handler"
                    );
                }
            }
            EventType::Wheel => {
                self.deliver_single_point_until_accepted(host, &event);
            }
            _ => {
                if event.kind().is_mouse() {
                    if let Some(p) = event.points().first() {
                        self.remember_mouse_position(event.device().id, p.scene_position, &event);
                    }
                }
                self.deliver_pointer_event(host, &event);
            }
        }
    }

    /// Deliver the pending coalesced touch update, and refresh hover if the
    /// scene changed under a resting mouse.
    ///
    /// Call once per frame, before rendering.
    pub fn flush_frame_synchronous_events<T: Host<Item = K, Handler = H>>(
        &mut self,
        host: &mut T,
        scene_changed: bool,
    ) {
        if let Some(pending) = self.compressor.take_pending() {
            self.deliver_pointer_event(host, &pending);
        }
        if !scene_changed {
            return;
        }
        if let Some(last) = self.last_mouse {
            if self
                .grabs
                .exclusive_grabber(last.device, PointId::PRIMARY)
                .is_none()
            {
                self.deliver_hover(
                    host,
                    last.position,
                    last.position,
                    last.modifiers,
                    last.timestamp,
                );
            }
        }
    }

    /// The window lost activation: cancel every exclusive grab of this agent.
    ///
    /// Passive grabs are kept.
    pub fn handle_window_deactivate<T: Host<Item = K, Handler = H>>(&mut self, host: &mut T) {
        tracing::debug!(
            target: "understory::delivery::focus",
            agent = ?self.id,
            "window deactivated; cancelling exclusive grabs"
        );
        let changes = self.grabs.cancel_exclusive_in(self.id);
        self.notify(host, changes);
        self.touch_mouse.cancel();
    }

    /// The window was hidden: cancel exclusive grabs and leave every hovered target.
    pub fn handle_window_hidden<T: Host<Item = K, Handler = H>>(&mut self, host: &mut T) {
        self.handle_window_deactivate(host);
        self.clear_hover(host);
        self.last_mouse = None;
    }

    fn handle_touch_event<T: Host<Item = K, Handler = H>>(
        &mut self,
        host: &mut T,
        event: PointerEvent,
    ) {
        if self.is_delivering() || !self.config.touch_compression {
            if let Some(pending) = self.compressor.take_pending() {
                self.deliver_pointer_event(host, &pending);
            }
            self.deliver_pointer_event(host, &event);
            return;
        }
        match self.compressor.offer(event) {
            Offer::Held => {}
            Offer::Flushed(previous) => self.deliver_pointer_event(host, &previous),
            Offer::Deliver { flushed, event } => {
                if let Some(previous) = flushed {
                    self.deliver_pointer_event(host, &previous);
                }
                self.deliver_pointer_event(host, &event);
            }
        }
    }

    fn handle_mouse_move<T: Host<Item = K, Handler = H>>(
        &mut self,
        host: &mut T,
        event: &PointerEvent,
    ) {
        let Some(point) = event.points().first() else {
            return;
        };
        let device = event.device().id;
        let last = self.last_mouse_position().unwrap_or(point.scene_position);
        self.remember_mouse_position(device, point.scene_position, event);
        if self.grabs.exclusive_grabber(device, point.id).is_none() {
            self.deliver_hover(
                host,
                point.scene_position,
                last,
                event.modifiers,
                event.timestamp,
            );
        }
        self.deliver_pointer_event(host, event);
    }

    pub(crate) fn last_mouse_position(&self) -> Option<Point> {
        self.last_mouse.map(|m| m.position)
    }

    pub(crate) fn remember_mouse_position(
        &mut self,
        device: DeviceId,
        position: Point,
        event: &PointerEvent,
    ) {
        self.last_mouse = Some(LastMouse {
            device,
            position,
            modifiers: event.modifiers,
            timestamp: event.timestamp,
        });
    }

    /// Process one event through the press, update and release phases.
    pub(crate) fn deliver_pointer_event<T: Host<Item = K, Handler = H>>(
        &mut self,
        host: &mut T,
        event: &PointerEvent,
    ) {
        let _guard = DepthGuard::enter(&self.depth);
        self.pass.clear();
        self.sink.accepted.clear();
        if event.kind() == EventType::MousePress {
            self.allow_double_click = true;
        }

        if event.is_begin_event() {
            self.deliver_press_or_release(host, event, false);
        }
        if !self.all_updated_points_accepted(event) {
            self.deliver_updated_points(host, event);
        }
        if event.is_end_event() {
            self.deliver_press_or_release(host, event, true);
        }
        self.clear_released_points(host, event);
        self.deliver_posted(host);
    }

    fn deliver_posted<T: Host<Item = K, Handler = H>>(&mut self, host: &mut T) {
        while !self.sink.posted.is_empty() {
            let posted = core::mem::take(&mut self.sink.posted);
            for event in posted {
                self.handle_pointer_event(host, event);
            }
        }
    }

    /// Offer pressed points to their candidates; with `handlers_only`, only
    /// the candidates' handlers run (used for the release phase).
    ///
    /// Returns whether every point of the event was accepted.
    fn deliver_press_or_release<T: Host<Item = K, Handler = H>>(
        &mut self,
        host: &mut T,
        event: &PointerEvent,
        mut handlers_only: bool,
    ) -> bool {
        let device = event.device().id;
        let is_touch = event.kind().is_touch();
        if is_touch && event.is_begin_event() {
            if let Some(point) = self.touch_mouse.point_of(device) {
                if matches!(
                    self.grabs.exclusive_grabber(device, point),
                    Some(Target::Handler(_))
                ) {
                    self.touch_mouse.cancel();
                }
            }
        }
        let Some(root) = host.tree().root() else {
            return false;
        };
        let filter = TargetFilter {
            mouse_buttons: !is_touch,
            accepts_touch: is_touch,
        };
        let mut targets = Vec::new();
        for point in event.points() {
            if point.state == PointState::Pressed && !handlers_only {
                let changes = self.grabs.clear_passive(device, point.id, false);
                self.notify(host, changes);
            }
            let found = pointer_targets(&*host, root, event, point, filter);
            merge_targets(&mut targets, &found);
        }

        for item in targets {
            if !host.tree().is_alive(item) {
                continue;
            }
            if !handlers_only && self.send_filtered_pointer_event(host, event, item, None) {
                if self.all_points_accepted(event) {
                    return true;
                }
                self.pass.skip_delivery.push(item);
            }
            if self.pass.skip_delivery.contains(&item) {
                continue;
            }
            self.deliver_matching_points_to_item(host, item, false, event, handlers_only);
            if self.all_points_accepted(event) {
                handlers_only = true;
            }
        }
        self.all_points_accepted(event)
    }

    /// Deliver points that were already down to their grabbers.
    fn deliver_updated_points<T: Host<Item = K, Handler = H>>(
        &mut self,
        host: &mut T,
        event: &PointerEvent,
    ) {
        let device = event.device().id;
        let mut grabbers: SmallVec<[Target<K, H>; 4]> = SmallVec::new();
        for point in event.points() {
            if point.state == PointState::Pressed {
                continue;
            }
            if let Some(g) = self.grabs.exclusive(device, point.id) {
                if g.context == self.id && !grabbers.contains(&g.target) {
                    grabbers.push(g.target);
                }
            }
        }

        let mut done = false;
        for grabber in grabbers {
            if !self.target_alive(host, grabber) {
                tracing::warn!(
                    target: "understory::delivery::grab",
                    ?grabber,
                    "dropping grabs of a removed target"
                );
                self.forget_target(grabber);
                continue;
            }
            let receiver = match grabber {
                Target::Item(item) => item,
                Target::Handler(handler) => {
                    let Some(item) = host.handler_item(handler) else {
                        continue;
                    };
                    if self.send_filtered_pointer_event(host, event, item, Some(handler)) {
                        done = true;
                    } else if host.tree().is_alive(item) {
                        let ids: SmallVec<[PointId; 4]> = event
                            .points()
                            .iter()
                            .filter(|p| {
                                p.state != PointState::Pressed
                                    && self.grabs.exclusive_grabber(device, p.id) == Some(grabber)
                            })
                            .map(|p| p.id)
                            .collect();
                        let view =
                            LocalEvent::new(host.tree(), item, event, |p| ids.contains(&p.id));
                        self.dispatch_to_handler(host, handler, &view);
                        if ids.iter().all(|&id| self.sink.is_accepted(id)) {
                            continue;
                        }
                    }
                    item
                }
            };
            if done {
                break;
            }
            if !host.tree().is_alive(receiver) {
                continue;
            }
            self.deliver_matching_points_to_item(host, receiver, true, event, false);
        }

        // Passive grabbers see every point they observe, once per pass.
        let mut filtered: SmallVec<[(K, bool); 4]> = SmallVec::new();
        for point in event.points() {
            let passive: SmallVec<[Target<K, H>; 4]> = self
                .grabs
                .passive_grabbers(device, point.id)
                .iter()
                .filter(|g| g.context == self.id)
                .map(|g| g.target)
                .collect();
            for target in passive {
                if !self.target_alive(host, target) {
                    self.forget_target(target);
                    continue;
                }
                let (item, handler) = match target {
                    Target::Handler(h) => {
                        if self.pass.delivered_handlers.contains(&h) {
                            continue;
                        }
                        let Some(item) = host.handler_item(h) else {
                            continue;
                        };
                        (item, Some(h))
                    }
                    Target::Item(item) => (item, None),
                };
                let already = filtered.iter().find(|(k, _)| *k == item).map(|(_, f)| *f);
                let intercepted = match already {
                    Some(f) => f,
                    None => {
                        let f = self.send_filtered_pointer_event(host, event, item, handler);
                        filtered.push((item, f));
                        f
                    }
                };
                if intercepted || !host.tree().is_alive(item) {
                    continue;
                }
                let view = LocalEvent::new(host.tree(), item, event, |p| {
                    self.grabs
                        .passive_grabbers(device, p.id)
                        .iter()
                        .any(|g| g.target == target)
                });
                match handler {
                    Some(h) => self.dispatch_to_handler(host, h, &view),
                    None => {
                        self.dispatch_to_item(host, item, &view);
                    }
                }
            }
        }

        if done || self.all_points_grabbed(event) {
            return;
        }
        // Ungrabbed points: handlers only.
        let Some(root) = host.tree().root() else {
            return;
        };
        let mut targets = Vec::new();
        for point in event.points() {
            if point.state == PointState::Pressed
                || matches!(
                    self.grabs.exclusive_grabber(device, point.id),
                    Some(Target::Item(_))
                )
            {
                continue;
            }
            let found = pointer_targets(&*host, root, event, point, TargetFilter::NONE);
            merge_targets(&mut targets, &found);
        }
        for item in targets {
            if grabbers_contain_item(&self.grabs, device, event, item) {
                continue;
            }
            if !host.tree().is_alive(item) {
                continue;
            }
            self.deliver_to_item_handlers(host, item, event, true);
            if self.all_points_grabbed(event) {
                break;
            }
        }
    }

    /// Deliver to one candidate: its handlers first, then the item itself.
    pub(crate) fn deliver_matching_points_to_item<T: Host<Item = K, Handler = H>>(
        &mut self,
        host: &mut T,
        item: K,
        is_grabber: bool,
        event: &PointerEvent,
        handlers_only: bool,
    ) {
        let kind = event.kind();
        if kind != EventType::MouseDoubleClick {
            let was_accepted = self.all_points_accepted(event);
            self.deliver_to_item_handlers(host, item, event, is_grabber);
            if event.is_begin_event() && !was_accepted && self.all_points_accepted(event) {
                self.allow_double_click = false;
            }
        }
        if handlers_only || self.all_points_accepted(event) || !host.tree().is_alive(item) {
            return;
        }
        // A plain release only reaches the item that holds the grab.
        if event.is_end_event() && !event.is_update_event() && !self.holds_exclusive(item, event) {
            return;
        }
        if self.send_filtered_pointer_event(host, event, item, None) {
            return;
        }
        if kind.is_mouse() {
            self.deliver_mouse_to_item(host, item, is_grabber, event);
        } else if kind.is_touch() {
            self.deliver_touch_to_item(host, item, is_grabber, event);
        }
    }

    fn deliver_mouse_to_item<T: Host<Item = K, Handler = H>>(
        &mut self,
        host: &mut T,
        item: K,
        is_grabber: bool,
        event: &PointerEvent,
    ) {
        let Some(point) = event.points().first() else {
            return;
        };
        let device = event.device().id;
        let target = Target::Item(item);
        let buttons = host.accepted_mouse_buttons(item);
        if !((is_grabber && event.button.is_empty()) || buttons.intersects(event.button)) {
            return;
        }
        let old = self.grabs.exclusive_grabber(device, point.id);
        let view = LocalEvent::all(host.tree(), item, event);
        let Some(consumed) = self.dispatch_to_item(host, item, &view) else {
            return;
        };
        if !consumed {
            return;
        }
        let grabber = self.grabs.exclusive_grabber(device, point.id);
        if grabber.is_some() && grabber != Some(target) && grabber != old {
            // Accepted, but someone else took the grab during the callback.
            if self.last_ungrabbed != Some(item) {
                self.last_ungrabbed = Some(item);
                host.item_ungrabbed(item, UngrabKind::Mouse);
            }
        } else if point.state != PointState::Released
            && host.tree().is_enabled(item)
            && host.tree().is_visible(item)
        {
            self.set_exclusive(host, device, point.id, Some(target), false);
        }
        self.sink.accept(point.id);
    }

    fn deliver_touch_to_item<T: Host<Item = K, Handler = H>>(
        &mut self,
        host: &mut T,
        item: K,
        is_grabber: bool,
        event: &PointerEvent,
    ) {
        let device = event.device().id;
        let target = Target::Item(item);
        let matching: SmallVec<[PointId; 4]> = {
            let tree = host.tree();
            let host_ref = &*host;
            event
                .points()
                .iter()
                .filter(|p| {
                    if self.sink.is_accepted(p.id) {
                        return false;
                    }
                    if is_grabber {
                        p.state != PointState::Pressed
                            && match self.grabs.exclusive_grabber(device, p.id) {
                                Some(Target::Item(i)) => i == item,
                                Some(Target::Handler(h)) => host_ref.handler_item(h) == Some(item),
                                None => false,
                            }
                    } else {
                        p.state == PointState::Pressed
                            && tree.contains(item, tree.map_from_scene(item, p.scene_position))
                    }
                })
                .map(|p| p.id)
                .collect()
        };
        if matching.is_empty() {
            return;
        }

        let consumed = if host.accepts_touch(item) {
            let view = LocalEvent::new(host.tree(), item, event, |p| matching.contains(&p.id));
            match self.dispatch_to_item(host, item, &view) {
                Some(consumed) => consumed,
                None => return,
            }
        } else if self.config.synthesize_mouse_for_unhandled_touch
            && host
                .accepted_mouse_buttons(item)
                .contains(MouseButtons::LEFT)
        {
            let consumed = self.deliver_touch_as_mouse(host, item, event, &matching);
            if !host.tree().is_alive(item) {
                return;
            }
            consumed
        } else {
            false
        };

        for &id in &matching {
            let pressed = event
                .point_by_id(id)
                .is_some_and(|p| p.state == PointState::Pressed);
            if consumed {
                self.sink.accept(id);
                if pressed && self.grabs.exclusive_grabber(device, id) != Some(target) {
                    self.set_exclusive(host, device, id, Some(target), false);
                }
            } else if pressed && self.grabs.exclusive_grabber(device, id) == Some(target) {
                // The item declined the press; it will not want the rest either.
                self.set_exclusive(host, device, id, None, false);
            }
        }
    }

    /// Run the handlers attached to `item`.
    ///
    /// With `avoid_grabbers`, handlers that already grab one of the points are
    /// skipped; they were served directly.
    pub(crate) fn deliver_to_item_handlers<T: Host<Item = K, Handler = H>>(
        &mut self,
        host: &mut T,
        item: K,
        event: &PointerEvent,
        avoid_grabbers: bool,
    ) {
        let device = event.device().id;
        for handler in host.handlers(item) {
            if self.pass.delivered_handlers.contains(&handler) {
                continue;
            }
            let target = Target::Handler(handler);
            if avoid_grabbers
                && event
                    .points()
                    .iter()
                    .any(|p| self.grabs.is_grabbing(target, device, p.id))
            {
                continue;
            }
            if !host.tree().is_alive(item) {
                return;
            }
            let view = LocalEvent::all(host.tree(), item, event);
            if !view
                .points()
                .iter()
                .any(|p| host.wants_point(handler, &view, p))
            {
                continue;
            }
            self.dispatch_to_handler(host, handler, &view);
        }
    }

    /// Wheel and other single-point events: handlers, then the item, until
    /// something consumes the point.
    pub(crate) fn deliver_single_point_until_accepted<T: Host<Item = K, Handler = H>>(
        &mut self,
        host: &mut T,
        event: &PointerEvent,
    ) -> bool {
        let _guard = DepthGuard::enter(&self.depth);
        self.pass.clear();
        self.sink.accepted.clear();
        let Some(point) = event.points().first() else {
            return false;
        };
        let Some(root) = host.tree().root() else {
            return false;
        };
        let targets = pointer_targets(&*host, root, event, point, TargetFilter::NONE);
        let mut accepted = false;
        for item in targets {
            if !host.tree().is_alive(item) {
                continue;
            }
            self.deliver_to_item_handlers(host, item, event, false);
            if self.sink.is_accepted(point.id) {
                accepted = true;
                break;
            }
            if !host.tree().is_alive(item) {
                continue;
            }
            let view = LocalEvent::all(host.tree(), item, event);
            if self.dispatch_to_item(host, item, &view) == Some(true) {
                self.sink.accept(point.id);
                accepted = true;
                break;
            }
        }
        self.deliver_posted(host);
        accepted
    }

    /// Forced cancel: every grabber on the device hears about it, then all of
    /// the device's grabs are dropped.
    fn deliver_cancel<T: Host<Item = K, Handler = H>>(
        &mut self,
        host: &mut T,
        event: &PointerEvent,
    ) {
        let _guard = DepthGuard::enter(&self.depth);
        self.pass.clear();
        self.sink.accepted.clear();
        let device = event.device().id;
        let mut targets: SmallVec<[Target<K, H>; 4]> = SmallVec::new();
        for point in self.grabs.grabbed_points(device) {
            let exclusive = self.grabs.exclusive(device, point);
            let passive = self.grabs.passive_grabbers(device, point).iter();
            for g in exclusive.iter().chain(passive) {
                if g.context == self.id && !targets.contains(&g.target) {
                    targets.push(g.target);
                }
            }
        }
        tracing::debug!(
            target: "understory::delivery::touch",
            ?device,
            targets = targets.len(),
            "delivering cancel"
        );
        for target in targets {
            if !self.target_alive(host, target) {
                continue;
            }
            match target {
                Target::Item(item) => {
                    let view = LocalEvent::all(host.tree(), item, event);
                    let mut cx = EventCx::new(&self.grabs, self.id, device, target, &mut self.sink);
                    host.deliver(item, &view, &mut cx);
                }
                Target::Handler(handler) => {
                    let Some(item) = host.handler_item(handler) else {
                        continue;
                    };
                    let view = LocalEvent::all(host.tree(), item, event);
                    let mut cx = EventCx::new(&self.grabs, self.id, device, target, &mut self.sink);
                    host.handle(handler, &view, &mut cx);
                }
            }
        }
        // Nothing a target asks for can keep its grab past a cancel.
        self.sink.requests.clear();
        let changes = self.grabs.cancel_device(device);
        self.notify(host, changes);
        if self.touch_mouse.point_of(device).is_some() {
            self.touch_mouse.cancel();
        }
        self.deliver_posted(host);
    }

    /// Clear grabs on released points once the event has been delivered.
    fn clear_released_points<T: Host<Item = K, Handler = H>>(
        &mut self,
        host: &mut T,
        event: &PointerEvent,
    ) {
        if !event.is_end_event() {
            return;
        }
        // A mouse keeps its grab while other buttons are still held.
        if !event.kind().is_touch() && !event.buttons.is_empty() {
            return;
        }
        let device = event.device().id;
        for point in event.points() {
            if point.state != PointState::Released {
                continue;
            }
            self.set_exclusive(host, device, point.id, None, false);
            let changes = self.grabs.clear_passive(device, point.id, false);
            self.notify(host, changes);
            self.grabs.remove_point(device, point.id);
            if self.touch_mouse.is_point(device, point.id) {
                self.touch_mouse.cancel();
            }
        }
    }

    /// Call `item`'s delivery callback and apply what it requested.
    ///
    /// Returns `None` when the item did not survive its own callback.
    pub(crate) fn dispatch_to_item<T: Host<Item = K, Handler = H>>(
        &mut self,
        host: &mut T,
        item: K,
        event: &LocalEvent<'_>,
    ) -> Option<bool> {
        let device = event.device().id;
        let consumed = {
            let mut cx = EventCx::new(
                &self.grabs,
                self.id,
                device,
                Target::Item(item),
                &mut self.sink,
            );
            host.deliver(item, event, &mut cx)
        };
        if event.kind().is_touch() {
            tracing::debug!(
                target: "understory::delivery::touch_target",
                ?item,
                kind = ?event.kind(),
                points = event.points().len(),
                consumed,
                "delivered"
            );
        } else {
            tracing::debug!(
                target: "understory::delivery::mouse",
                ?item,
                kind = ?event.kind(),
                synthesized = event.is_synthesized(),
                consumed,
                "delivered"
            );
        }
        self.apply_requests(host);
        if !host.tree().is_alive(item) {
            tracing::warn!(
                target: "understory::delivery::grab",
                ?item,
                "item removed during its own delivery"
            );
            self.forget_target(Target::Item(item));
            return None;
        }
        Some(consumed)
    }

    /// Call a handler and apply what it requested.
    pub(crate) fn dispatch_to_handler<T: Host<Item = K, Handler = H>>(
        &mut self,
        host: &mut T,
        handler: H,
        event: &LocalEvent<'_>,
    ) {
        let device = event.device().id;
        {
            let mut cx = EventCx::new(
                &self.grabs,
                self.id,
                device,
                Target::Handler(handler),
                &mut self.sink,
            );
            host.handle(handler, event, &mut cx);
        }
        if !self.pass.delivered_handlers.contains(&handler) {
            self.pass.delivered_handlers.push(handler);
        }
        self.apply_requests(host);
        let target = Target::Handler(handler);
        if !self.target_alive(host, target) {
            self.forget_target(target);
        }
    }

    pub(crate) fn apply_requests<T: Host<Item = K, Handler = H>>(&mut self, host: &mut T) {
        let requests = core::mem::take(&mut self.sink.requests);
        for request in requests {
            match request {
                GrabRequest::Exclusive(device, point, target) => {
                    if target.is_some_and(|t| !self.target_alive(host, t)) {
                        continue;
                    }
                    self.set_exclusive(host, device, point, target, false);
                }
                GrabRequest::AddPassive(device, point, target) => {
                    if !self.target_alive(host, target) {
                        continue;
                    }
                    if let Some(change) =
                        self.grabs
                            .add_passive(device, point, Grabber::new(target, self.id))
                    {
                        self.notify(host, [change]);
                    }
                }
                GrabRequest::RemovePassive(device, point, target) => {
                    if let Some(change) = self.grabs.remove_passive(device, point, target) {
                        self.notify(host, [change]);
                    }
                }
            }
        }
    }

    /// Change an exclusive grab and deliver the resulting notifications.
    pub(crate) fn set_exclusive<T: Host<Item = K, Handler = H>>(
        &mut self,
        host: &mut T,
        device: DeviceId,
        point: PointId,
        target: Option<Target<K, H>>,
        cancel: bool,
    ) {
        let changes = self.grabs.set_exclusive(
            device,
            point,
            target.map(|t| Grabber::new(t, self.id)),
            cancel,
        );
        let lost = changes
            .iter()
            .any(|c| c.transition.is_exclusive() && c.transition.is_loss());
        self.notify(host, changes);
        // An item taking over keeps the synthesized mouse going; a handler
        // or a plain release ends it.
        if lost
            && self.touch_mouse.is_point(device, point)
            && !matches!(target, Some(Target::Item(_)))
        {
            self.touch_mouse.cancel();
        }
    }

    /// Deliver grab notifications, skipping targets that no longer exist.
    pub(crate) fn notify<T: Host<Item = K, Handler = H>>(
        &mut self,
        host: &mut T,
        changes: impl IntoIterator<Item = GrabChange<Target<K, H>>>,
    ) {
        let mut touch_ungrabbed: SmallVec<[K; 4]> = SmallVec::new();
        for change in changes {
            if !self.target_alive(host, change.target) {
                continue;
            }
            host.grab_changed(&change);
            let Target::Item(item) = change.target else {
                continue;
            };
            match change.transition {
                GrabTransition::GainedExclusive => {
                    if self.last_ungrabbed == Some(item) {
                        self.last_ungrabbed = None;
                    }
                }
                GrabTransition::LostExclusive | GrabTransition::CancelledExclusive => {
                    let touch = self
                        .devices
                        .get(&change.device)
                        .is_some_and(PointingDevice::is_touch);
                    let as_mouse = self.touch_mouse.is_point(change.device, change.point);
                    if touch && !as_mouse {
                        if !touch_ungrabbed.contains(&item)
                            && self
                                .grabs
                                .points_grabbed_by(change.target, change.device)
                                .is_empty()
                        {
                            touch_ungrabbed.push(item);
                            host.item_ungrabbed(item, UngrabKind::Touch);
                        }
                    } else if self.last_ungrabbed != Some(item) {
                        self.last_ungrabbed = Some(item);
                        host.item_ungrabbed(item, UngrabKind::Mouse);
                    }
                }
                _ => {}
            }
        }
    }

    pub(crate) fn target_alive<T: Host<Item = K, Handler = H>>(
        &self,
        host: &T,
        target: Target<K, H>,
    ) -> bool {
        match target {
            Target::Item(item) => host.tree().is_alive(item),
            Target::Handler(handler) => host
                .handler_item(handler)
                .is_some_and(|item| host.tree().is_alive(item)),
        }
    }

    /// Drop every trace of a target that no longer exists, silently.
    pub(crate) fn forget_target(&mut self, target: Target<K, H>) {
        if let Some((device, point)) = self.touch_mouse_point() {
            if self.grabs.exclusive_grabber(device, point) == Some(target) {
                self.touch_mouse.cancel();
            }
        }
        self.grabs.forget(target);
        self.hover.forget(target);
        if let Target::Item(item) = target {
            self.drag.forget(item);
            self.focus.forget(item);
            if self.last_ungrabbed == Some(item) {
                self.last_ungrabbed = None;
            }
        }
    }

    fn touch_mouse_point(&self) -> Option<(DeviceId, PointId)> {
        self.devices
            .keys()
            .find_map(|&d| self.touch_mouse.point_of(d).map(|p| (d, p)))
    }

    pub(crate) fn all_points_accepted(&self, event: &PointerEvent) -> bool {
        event.points().iter().all(|p| self.sink.is_accepted(p.id))
    }

    fn all_updated_points_accepted(&self, event: &PointerEvent) -> bool {
        event
            .points()
            .iter()
            .filter(|p| p.state != PointState::Pressed)
            .all(|p| self.sink.is_accepted(p.id))
    }

    fn all_points_grabbed(&self, event: &PointerEvent) -> bool {
        let device = event.device().id;
        event.points().iter().all(|p| {
            self.grabs.exclusive_grabber(device, p.id).is_some()
                || !self.grabs.passive_grabbers(device, p.id).is_empty()
        })
    }

    fn holds_exclusive(&self, item: K, event: &PointerEvent) -> bool {
        let device = event.device().id;
        event
            .points()
            .iter()
            .any(|p| self.grabs.exclusive_grabber(device, p.id) == Some(Target::Item(item)))
    }
}

fn grabbers_contain_item<K: Key, H: Key>(
    grabs: &GrabRegistry<Target<K, H>>,
    device: DeviceId,
    event: &PointerEvent,
    item: K,
) -> bool {
    event
        .points()
        .iter()
        .any(|p| grabs.exclusive_grabber(device, p.id) == Some(Target::Item(item)))
}

#[cfg(all(test, feature = "scene_adapter"))]
mod tests {
    use super::*;
    use crate::event::EventPoint;
    use crate::hover::HoverKind;
    use crate::testing::{Call, HandlerId, HandlerPolicy, TestHost, mouse, touch_screen};
    use alloc::vec;
    use kurbo::{Rect, Vec2};
    use understory_scene::ItemId;

    type Agent = DeliveryAgent<ItemId, HandlerId>;

    fn mouse_event(kind: EventType, x: f64, y: f64, button: MouseButtons) -> PointerEvent {
        let buttons = match kind {
            EventType::MouseRelease => MouseButtons::empty(),
            _ => MouseButtons::LEFT,
        };
        PointerEvent::mouse(kind, mouse(), Point::new(x, y), button, buttons)
    }

    fn press(x: f64, y: f64) -> PointerEvent {
        mouse_event(EventType::MousePress, x, y, MouseButtons::LEFT)
    }

    fn release(x: f64, y: f64) -> PointerEvent {
        mouse_event(EventType::MouseRelease, x, y, MouseButtons::LEFT)
    }

    fn drag_to(x: f64, y: f64) -> PointerEvent {
        mouse_event(EventType::MouseMove, x, y, MouseButtons::empty())
    }

    fn hover_to(x: f64, y: f64) -> PointerEvent {
        PointerEvent::mouse(
            EventType::MouseMove,
            mouse(),
            Point::new(x, y),
            MouseButtons::empty(),
            MouseButtons::empty(),
        )
    }

    fn pt(id: u32, state: PointState, x: f64, y: f64) -> EventPoint {
        EventPoint::new(PointId(id), state, Point::new(x, y))
    }

    fn touch(points: impl IntoIterator<Item = EventPoint>) -> PointerEvent {
        PointerEvent::touch(touch_screen(), points).unwrap()
    }

    fn touch_deliveries(host: &TestHost, item: ItemId) -> Vec<(EventType, Vec<PointId>)> {
        host.log
            .iter()
            .filter_map(|c| match c {
                Call::Deliver {
                    item: i,
                    kind,
                    points,
                    ..
                } if *i == item => Some((*kind, points.clone())),
                _ => None,
            })
            .collect()
    }

    /// Host whose root accepts no mouse buttons, so it never takes presses.
    fn host() -> TestHost {
        let mut host = TestHost::new();
        let root = host.root();
        host.set_buttons(root, MouseButtons::empty());
        host
    }

    #[test]
    fn rejected_press_falls_through_to_parent() {
        let mut host = host();
        let a = host.add(host.root(), Rect::new(0.0, 0.0, 100.0, 100.0));
        let b = host.add(a, Rect::new(25.0, 25.0, 75.0, 75.0));
        host.reject(b);
        let mut agent = Agent::new();

        agent.handle_pointer_event(&mut host, press(50.0, 50.0));
        assert_eq!(
            host.deliveries(),
            [(b, EventType::MousePress), (a, EventType::MousePress)]
        );
        assert_eq!(
            agent.exclusive_grabber(mouse().id, PointId::PRIMARY),
            Some(Target::Item(a))
        );

        host.take_log();
        agent.handle_pointer_event(&mut host, drag_to(10.0, 10.0));
        assert_eq!(host.deliveries(), [(a, EventType::MouseMove)]);

        agent.handle_pointer_event(&mut host, release(10.0, 10.0));
        assert_eq!(agent.exclusive_grabber(mouse().id, PointId::PRIMARY), None);
        assert!(host.log.contains(&Call::Ungrabbed(a, UngrabKind::Mouse)));
    }

    #[test]
    fn touch_cancel_reaches_every_grabber() {
        let mut host = host();
        let root = host.root();
        let x = host.add(root, Rect::new(0.0, 0.0, 100.0, 100.0));
        let y = host.add(root, Rect::new(200.0, 0.0, 300.0, 100.0));
        host.set_touch(x, true);
        host.set_touch(y, true);
        let h = host.add_handler(x, 0.0);
        host.set_handler_policy(h, HandlerPolicy::Passive);
        let mut agent = Agent::new();

        agent.handle_pointer_event(
            &mut host,
            touch([
                pt(1, PointState::Pressed, 50.0, 50.0),
                pt(2, PointState::Pressed, 250.0, 50.0),
            ]),
        );
        let dev = touch_screen().id;
        assert_eq!(agent.exclusive_grabber(dev, PointId(1)), Some(Target::Item(x)));
        assert_eq!(agent.exclusive_grabber(dev, PointId(2)), Some(Target::Item(y)));
        assert_eq!(
            agent.passive_grabbers(dev, PointId(1)).collect::<Vec<_>>(),
            [Target::Handler(h)]
        );

        host.take_log();
        agent.handle_pointer_event(&mut host, PointerEvent::touch_cancel(touch_screen()));
        let cancels: Vec<Call> = host
            .log
            .iter()
            .filter(|c| {
                matches!(
                    c,
                    Call::Deliver {
                        kind: EventType::TouchCancel,
                        ..
                    } | Call::Handle {
                        kind: EventType::TouchCancel,
                        ..
                    }
                )
            })
            .cloned()
            .collect();
        assert_eq!(
            cancels,
            [
                Call::Deliver {
                    item: x,
                    kind: EventType::TouchCancel,
                    points: vec![],
                    synthesized: false,
                },
                Call::Handle {
                    handler: h,
                    kind: EventType::TouchCancel,
                },
                Call::Deliver {
                    item: y,
                    kind: EventType::TouchCancel,
                    points: vec![],
                    synthesized: false,
                },
            ]
        );
        assert!(agent.grabs().is_empty());
        assert!(host.log.contains(&Call::Ungrabbed(x, UngrabKind::Touch)));
        assert!(host.log.contains(&Call::Ungrabbed(y, UngrabKind::Touch)));
    }

    #[test]
    fn grabber_removed_during_delivery_is_forgotten_silently() {
        let mut host = host();
        let x = host.add(host.root(), Rect::new(0.0, 0.0, 100.0, 100.0));
        let mut agent = Agent::new();

        agent.handle_pointer_event(&mut host, press(50.0, 50.0));
        host.take_log();
        host.remove_on_deliver(x);
        agent.handle_pointer_event(&mut host, drag_to(60.0, 60.0));

        assert_eq!(host.deliveries(), [(x, EventType::MouseMove)]);
        assert!(host.grab_log().is_empty());
        assert!(!host.log.iter().any(|c| matches!(c, Call::Ungrabbed(..))));
        assert_eq!(agent.exclusive_grabber(mouse().id, PointId::PRIMARY), None);
        assert!(agent.grabs().is_empty());
    }

    #[test]
    fn hover_follows_the_mouse_and_frame_flushes() {
        let mut host = host();
        let x = host.add(host.root(), Rect::new(0.0, 0.0, 100.0, 100.0));
        host.set_hover(x);
        let mut agent = Agent::new();

        agent.handle_pointer_event(&mut host, hover_to(10.0, 10.0));
        agent.handle_pointer_event(&mut host, hover_to(20.0, 20.0));
        assert!(agent.is_hovered(Target::Item(x)));
        agent.flush_frame_synchronous_events(&mut host, true);
        agent.handle_pointer_event(&mut host, hover_to(500.0, 500.0));

        let t = Target::Item(x);
        assert_eq!(
            host.hover_log(),
            [
                (t, HoverKind::Enter),
                (t, HoverKind::Move),
                (t, HoverKind::Move),
                (t, HoverKind::Leave),
            ]
        );
        assert!(!agent.is_hovered(t));
    }

    #[test]
    fn repeated_hover_at_one_position_enters_once() {
        let mut host = host();
        let x = host.add(host.root(), Rect::new(0.0, 0.0, 100.0, 100.0));
        host.set_hover(x);
        let mut agent = Agent::new();

        agent.handle_pointer_event(&mut host, hover_to(30.0, 30.0));
        agent.handle_pointer_event(&mut host, hover_to(30.0, 30.0));

        let t = Target::Item(x);
        assert_eq!(
            host.hover_log(),
            [(t, HoverKind::Enter), (t, HoverKind::Move)]
        );
        assert!(agent.is_hovered(t));
    }

    #[test]
    fn touch_on_mouse_only_item_is_synthesized() {
        let mut host = host();
        let m = host.add(host.root(), Rect::new(0.0, 0.0, 100.0, 100.0));
        let mut agent = Agent::new();
        let dev = touch_screen().id;

        agent.handle_pointer_event(
            &mut host,
            touch([
                pt(1, PointState::Pressed, 10.0, 10.0),
                pt(2, PointState::Pressed, 20.0, 20.0),
                pt(3, PointState::Pressed, 30.0, 30.0),
            ]),
        );
        assert_eq!(host.synthesized(), [EventType::MousePress]);
        for id in 1..=3 {
            assert_eq!(agent.exclusive_grabber(dev, PointId(id)), Some(Target::Item(m)));
        }
        assert!(agent.touch_mouse.is_point(dev, PointId(1)));

        for step in 1..=3 {
            let x = 10.0 + f64::from(step);
            agent.handle_pointer_event(
                &mut host,
                touch([
                    pt(1, PointState::Updated, x, 10.0),
                    pt(2, PointState::Stationary, 20.0, 20.0),
                    pt(3, PointState::Stationary, 30.0, 30.0),
                ]),
            );
        }
        assert_eq!(host.synthesized(), [EventType::MousePress]);
        agent.flush_frame_synchronous_events(&mut host, false);
        assert_eq!(
            host.synthesized(),
            [EventType::MousePress, EventType::MouseMove]
        );

        agent.handle_pointer_event(
            &mut host,
            touch([
                pt(1, PointState::Released, 13.0, 10.0),
                pt(2, PointState::Released, 20.0, 20.0),
                pt(3, PointState::Released, 30.0, 30.0),
            ]),
        );
        assert_eq!(
            host.synthesized(),
            [
                EventType::MousePress,
                EventType::MouseMove,
                EventType::MouseRelease
            ]
        );
        assert!(!agent.touch_mouse.is_active());
        assert!(agent.grabs().is_empty());
    }

    #[test]
    fn released_touch_mouse_passes_to_the_next_new_press_only() {
        let mut host = host();
        let m = host.add(host.root(), Rect::new(0.0, 0.0, 100.0, 100.0));
        let mut agent = Agent::new();
        let dev = touch_screen().id;

        agent.handle_pointer_event(
            &mut host,
            touch([
                pt(1, PointState::Pressed, 10.0, 10.0),
                pt(2, PointState::Pressed, 20.0, 20.0),
                pt(3, PointState::Pressed, 30.0, 30.0),
            ]),
        );
        agent.handle_pointer_event(
            &mut host,
            touch([
                pt(1, PointState::Released, 10.0, 10.0),
                pt(2, PointState::Stationary, 20.0, 20.0),
                pt(3, PointState::Stationary, 30.0, 30.0),
            ]),
        );
        assert!(!agent.touch_mouse.is_active());
        assert!(host.log.contains(&Call::Ungrabbed(m, UngrabKind::Mouse)));

        // Points that were already down never take over.
        agent.handle_pointer_event(
            &mut host,
            touch([
                pt(2, PointState::Updated, 25.0, 20.0),
                pt(3, PointState::Stationary, 30.0, 30.0),
            ]),
        );
        agent.flush_frame_synchronous_events(&mut host, false);
        assert_eq!(
            host.synthesized(),
            [EventType::MousePress, EventType::MouseRelease]
        );
        assert!(!agent.touch_mouse.is_active());

        agent.handle_pointer_event(
            &mut host,
            touch([
                pt(2, PointState::Stationary, 25.0, 20.0),
                pt(3, PointState::Stationary, 30.0, 30.0),
                pt(4, PointState::Pressed, 40.0, 40.0),
            ]),
        );
        assert_eq!(
            host.synthesized(),
            [
                EventType::MousePress,
                EventType::MouseRelease,
                EventType::MousePress
            ]
        );
        assert!(agent.touch_mouse.is_point(dev, PointId(4)));
        assert_eq!(agent.exclusive_grabber(dev, PointId(4)), Some(Target::Item(m)));
    }

    #[test]
    fn cancelled_touch_mouse_passes_to_the_next_new_press_only() {
        let mut host = host();
        let m = host.add(host.root(), Rect::new(0.0, 0.0, 100.0, 100.0));
        let mut agent = Agent::new();
        let dev = touch_screen().id;

        agent.handle_pointer_event(
            &mut host,
            touch([
                pt(1, PointState::Pressed, 10.0, 10.0),
                pt(2, PointState::Pressed, 20.0, 20.0),
                pt(3, PointState::Pressed, 30.0, 30.0),
            ]),
        );
        assert!(agent.touch_mouse.is_point(dev, PointId(1)));
        agent.handle_pointer_event(&mut host, PointerEvent::touch_cancel(touch_screen()));
        assert!(!agent.touch_mouse.is_active());
        assert!(agent.grabs().is_empty());

        agent.handle_pointer_event(
            &mut host,
            touch([
                pt(2, PointState::Updated, 25.0, 20.0),
                pt(3, PointState::Stationary, 30.0, 30.0),
            ]),
        );
        agent.flush_frame_synchronous_events(&mut host, false);
        assert_eq!(host.synthesized(), [EventType::MousePress]);
        assert!(!agent.touch_mouse.is_active());

        agent.handle_pointer_event(
            &mut host,
            touch([
                pt(2, PointState::Stationary, 25.0, 20.0),
                pt(3, PointState::Stationary, 30.0, 30.0),
                pt(4, PointState::Pressed, 60.0, 60.0),
            ]),
        );
        assert_eq!(
            host.synthesized(),
            [EventType::MousePress, EventType::MousePress]
        );
        assert!(agent.touch_mouse.is_point(dev, PointId(4)));
        assert_eq!(agent.exclusive_grabber(dev, PointId(4)), Some(Target::Item(m)));
    }

    #[test]
    fn item_grabbed_points_skip_handlers_beneath() {
        let mut host = host();
        let root = host.root();
        let c = host.add(root, Rect::new(0.0, 0.0, 100.0, 100.0));
        let h = host.add_handler(c, 0.0);
        let a = host.add(root, Rect::new(0.0, 0.0, 100.0, 100.0));
        host.set_touch(a, true);
        let mut agent = Agent::new();
        let dev = touch_screen().id;

        agent.handle_pointer_event(&mut host, touch([pt(1, PointState::Pressed, 50.0, 50.0)]));
        assert_eq!(agent.exclusive_grabber(dev, PointId(1)), Some(Target::Item(a)));
        agent.handle_pointer_event(
            &mut host,
            touch([
                pt(1, PointState::Stationary, 50.0, 50.0),
                pt(2, PointState::Pressed, 500.0, 500.0),
            ]),
        );
        assert_eq!(agent.exclusive_grabber(dev, PointId(2)), None);

        host.take_log();
        agent.handle_pointer_event(
            &mut host,
            touch([
                pt(1, PointState::Updated, 55.0, 50.0),
                pt(2, PointState::Updated, 505.0, 500.0),
            ]),
        );
        agent.flush_frame_synchronous_events(&mut host, false);

        assert!(!host.log.contains(&Call::Handle {
            handler: h,
            kind: EventType::TouchUpdate
        }));
        assert_eq!(
            touch_deliveries(&host, a),
            [(EventType::TouchUpdate, vec![PointId(1)])]
        );
        assert_eq!(agent.exclusive_grabber(dev, PointId(1)), Some(Target::Item(a)));
    }

    #[test]
    fn new_press_flushes_pending_update_first() {
        let mut host = host();
        let t = host.add(host.root(), Rect::new(0.0, 0.0, 100.0, 100.0));
        host.set_touch(t, true);
        let mut agent = Agent::new();

        agent.handle_pointer_event(&mut host, touch([pt(1, PointState::Pressed, 10.0, 10.0)]));
        agent.handle_pointer_event(&mut host, touch([pt(1, PointState::Updated, 15.0, 10.0)]));
        assert_eq!(touch_deliveries(&host, t).len(), 1);
        agent.handle_pointer_event(
            &mut host,
            touch([
                pt(1, PointState::Stationary, 15.0, 10.0),
                pt(2, PointState::Pressed, 30.0, 30.0),
            ]),
        );

        assert_eq!(
            touch_deliveries(&host, t),
            [
                (EventType::TouchBegin, vec![PointId(1)]),
                (EventType::TouchUpdate, vec![PointId(1)]),
                (EventType::TouchUpdate, vec![PointId(2)]),
                (EventType::TouchUpdate, vec![PointId(1)]),
            ]
        );
    }

    #[test]
    fn old_grabber_hears_loss_before_new_one_gains() {
        let mut host = host();
        let root = host.root();
        let a = host.add(root, Rect::new(0.0, 0.0, 100.0, 100.0));
        let b = host.add(root, Rect::new(200.0, 0.0, 300.0, 100.0));
        let mut agent = Agent::new();

        agent.handle_pointer_event(&mut host, press(50.0, 50.0));
        host.take_log();
        agent.grab_exclusive(&mut host, Target::Item(b), mouse().id, PointId::PRIMARY);

        assert_eq!(
            host.take_log(),
            [
                Call::Grab(
                    Target::Item(a),
                    GrabTransition::LostExclusive,
                    PointId::PRIMARY
                ),
                Call::Ungrabbed(a, UngrabKind::Mouse),
                Call::Grab(
                    Target::Item(b),
                    GrabTransition::GainedExclusive,
                    PointId::PRIMARY
                ),
            ]
        );
    }

    #[test]
    fn quick_second_tap_is_a_double_click() {
        let mut host = host();
        host.add(host.root(), Rect::new(0.0, 0.0, 100.0, 100.0));
        let mut agent = Agent::new();

        let tap = |state, x, ts| touch([pt(1, state, x, x)]).with_timestamp(ts);
        agent.handle_pointer_event(&mut host, tap(PointState::Pressed, 10.0, 1000));
        agent.handle_pointer_event(&mut host, tap(PointState::Released, 10.0, 1050));
        agent.handle_pointer_event(&mut host, tap(PointState::Pressed, 12.0, 1200));

        assert_eq!(
            host.synthesized(),
            [
                EventType::MousePress,
                EventType::MouseRelease,
                EventType::MousePress,
                EventType::MouseDoubleClick,
            ]
        );
    }

    #[test]
    fn posted_event_runs_after_the_current_one() {
        let mut host = host();
        let p = host.add(host.root(), Rect::new(0.0, 0.0, 100.0, 100.0));
        host.post_on_deliver(p, release(50.0, 50.0));
        let mut agent = Agent::new();

        agent.handle_pointer_event(&mut host, press(50.0, 50.0));

        assert_eq!(
            host.deliveries(),
            [(p, EventType::MousePress), (p, EventType::MouseRelease)]
        );
        assert!(!agent.is_delivering());
        assert_eq!(agent.exclusive_grabber(mouse().id, PointId::PRIMARY), None);
    }

    #[test]
    fn event_posted_during_cancel_runs_before_it_returns() {
        let mut host = host();
        let x = host.add(host.root(), Rect::new(0.0, 0.0, 100.0, 100.0));
        host.set_touch(x, true);
        let mut agent = Agent::new();
        let dev = touch_screen().id;

        agent.handle_pointer_event(&mut host, touch([pt(1, PointState::Pressed, 50.0, 50.0)]));
        host.post_on_deliver(x, touch([pt(2, PointState::Pressed, 60.0, 60.0)]));
        host.take_log();
        agent.handle_pointer_event(&mut host, PointerEvent::touch_cancel(touch_screen()));

        assert_eq!(
            host.deliveries(),
            [(x, EventType::TouchCancel), (x, EventType::TouchBegin)]
        );
        assert_eq!(agent.exclusive_grabber(dev, PointId(1)), None);
        assert_eq!(agent.exclusive_grabber(dev, PointId(2)), Some(Target::Item(x)));
        assert!(!agent.is_delivering());
    }

    #[test]
    fn deactivation_cancels_exclusive_grabs_only() {
        let mut host = host();
        let root = host.root();
        let a = host.add(root, Rect::new(0.0, 0.0, 100.0, 100.0));
        let mut agent = Agent::new();
        let dev = mouse().id;

        agent.handle_pointer_event(&mut host, press(50.0, 50.0));
        agent.add_passive_grab(&mut host, Target::Item(root), dev, PointId::PRIMARY);
        host.take_log();
        agent.handle_window_deactivate(&mut host);

        assert_eq!(
            host.take_log(),
            [
                Call::Grab(
                    Target::Item(a),
                    GrabTransition::CancelledExclusive,
                    PointId::PRIMARY
                ),
                Call::Ungrabbed(a, UngrabKind::Mouse),
            ]
        );
        assert_eq!(agent.exclusive_grabber(dev, PointId::PRIMARY), None);
        assert_eq!(
            agent.passive_grabbers(dev, PointId::PRIMARY).collect::<Vec<_>>(),
            [Target::Item(root)]
        );
    }

    #[test]
    fn wheel_stops_at_first_consumer() {
        let mut host = host();
        let a = host.add(host.root(), Rect::new(0.0, 0.0, 100.0, 100.0));
        let w = host.add(a, Rect::new(10.0, 10.0, 60.0, 60.0));
        let mut agent = Agent::new();
        let wheel = || PointerEvent::wheel(mouse(), Point::new(20.0, 20.0), Vec2::new(0.0, -3.0));

        agent.handle_pointer_event(&mut host, wheel());
        assert_eq!(host.deliveries(), [(w, EventType::Wheel)]);

        host.take_log();
        host.reject(w);
        agent.handle_pointer_event(&mut host, wheel());
        assert_eq!(
            host.deliveries(),
            [(w, EventType::Wheel), (a, EventType::Wheel)]
        );
    }

    #[test]
    fn grabbing_handler_shadows_its_item() {
        let mut host = host();
        let k = host.add(host.root(), Rect::new(0.0, 0.0, 100.0, 100.0));
        let h = host.add_handler(k, 0.0);
        host.set_handler_policy(h, HandlerPolicy::Grab);
        let mut agent = Agent::new();

        agent.handle_pointer_event(&mut host, press(50.0, 50.0));
        assert_eq!(
            agent.exclusive_grabber(mouse().id, PointId::PRIMARY),
            Some(Target::Handler(h))
        );
        agent.handle_pointer_event(&mut host, drag_to(60.0, 60.0));
        let double = mouse_event(EventType::MouseDoubleClick, 60.0, 60.0, MouseButtons::LEFT);
        agent.handle_pointer_event(&mut host, double);

        assert!(host.deliveries().is_empty());
        assert_eq!(
            host.log
                .iter()
                .filter(|c| matches!(c, Call::Handle { .. }))
                .cloned()
                .collect::<Vec<_>>(),
            [
                Call::Handle {
                    handler: h,
                    kind: EventType::MousePress,
                },
                Call::Handle {
                    handler: h,
                    kind: EventType::MouseMove,
                },
            ]
        );
    }

    #[test]
    fn invalid_config_is_rejected() {
        let config = DeliveryConfig {
            double_tap_distance: f64::NAN,
            ..DeliveryConfig::default()
        };
        assert!(Agent::with_config(AgentId(3), config).is_err());
        let agent = Agent::with_config(AgentId(3), DeliveryConfig::default()).unwrap();
        assert_eq!(agent.id(), AgentId(3));
    }
}
