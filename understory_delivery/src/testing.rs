// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! A recording host over an `understory_scene::Scene`, for tests.

use alloc::vec::Vec;

use hashbrown::{HashMap, HashSet};
use kurbo::Rect;
use smallvec::SmallVec;
use understory_scene::{ItemId, LocalItem, Scene};

use crate::context::{EventCx, LocalEvent, LocalPoint};
use crate::drag::{DragEvent, DragKind};
use crate::event::{EventType, PointerEvent};
use crate::focus::{FocusNotification, KeyEvent};
use crate::grab::{GrabChange, GrabTransition};
use crate::host::{Host, UngrabKind};
use crate::hover::{HoverEvent, HoverKind};
use crate::types::{DeviceId, DeviceKind, MouseButtons, PointId, PointState, PointingDevice, Target};

pub(crate) type HandlerId = u32;
pub(crate) type TestTarget = Target<ItemId, HandlerId>;

pub(crate) fn mouse() -> PointingDevice {
    PointingDevice::new(DeviceId(1), DeviceKind::Mouse)
}

pub(crate) fn touch_screen() -> PointingDevice {
    PointingDevice::new(DeviceId(2), DeviceKind::TouchScreen)
}

/// One recorded callback.
#[derive(Clone, Debug, PartialEq)]
pub(crate) enum Call {
    Deliver {
        item: ItemId,
        kind: EventType,
        points: Vec<PointId>,
        synthesized: bool,
    },
    Handle {
        handler: HandlerId,
        kind: EventType,
    },
    Filter {
        filter: ItemId,
        child: ItemId,
        kind: EventType,
    },
    Grab(TestTarget, GrabTransition, PointId),
    Ungrabbed(ItemId, UngrabKind),
    Hover(TestTarget, HoverKind),
    Drag(ItemId, DragKind),
    Key(ItemId),
    Focus(FocusNotification<ItemId>),
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(crate) enum FilterPolicy {
    PassThrough,
    Intercept,
    InterceptMouse,
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub(crate) enum HandlerPolicy {
    /// Observe only.
    #[default]
    Observe,
    /// Grab pressed points and accept the points it grabs.
    Grab,
    /// Passively grab pressed points.
    Passive,
}

#[derive(Clone, Debug)]
struct TestHandler {
    item: ItemId,
    margin: f64,
    policy: HandlerPolicy,
    hover: bool,
    removed: bool,
}

#[derive(Debug)]
pub(crate) struct TestHost {
    pub(crate) scene: Scene,
    root: ItemId,
    buttons: HashMap<ItemId, MouseButtons>,
    touch: HashSet<ItemId>,
    hover: HashSet<ItemId>,
    filters: HashMap<ItemId, FilterPolicy>,
    drops: HashSet<ItemId>,
    scopes: HashSet<ItemId>,
    reject: HashSet<ItemId>,
    remove_on_deliver: HashSet<ItemId>,
    keys: HashSet<ItemId>,
    handlers: Vec<TestHandler>,
    post_on_deliver: Option<(ItemId, PointerEvent)>,
    pub(crate) log: Vec<Call>,
}

impl TestHost {
    pub(crate) fn new() -> Self {
        let mut scene = Scene::new();
        let root = scene.insert(None, LocalItem::at(Rect::new(0.0, 0.0, 1000.0, 1000.0)));
        Self {
            scene,
            root,
            buttons: HashMap::new(),
            touch: HashSet::new(),
            hover: HashSet::new(),
            filters: HashMap::new(),
            drops: HashSet::new(),
            scopes: HashSet::new(),
            reject: HashSet::new(),
            remove_on_deliver: HashSet::new(),
            keys: HashSet::new(),
            handlers: Vec::new(),
            post_on_deliver: None,
            log: Vec::new(),
        }
    }

    pub(crate) fn root(&self) -> ItemId {
        self.root
    }

    /// Add an item covering `rect` in its parent's space.
    pub(crate) fn add(&mut self, parent: ItemId, rect: Rect) -> ItemId {
        self.add_local(parent, LocalItem::at(rect))
    }

    pub(crate) fn add_local(&mut self, parent: ItemId, local: LocalItem) -> ItemId {
        self.scene.insert(Some(parent), local)
    }

    pub(crate) fn set_buttons(&mut self, item: ItemId, buttons: MouseButtons) {
        self.buttons.insert(item, buttons);
    }

    pub(crate) fn set_touch(&mut self, item: ItemId, on: bool) {
        if on {
            self.touch.insert(item);
        } else {
            self.touch.remove(&item);
        }
    }

    pub(crate) fn set_hover(&mut self, item: ItemId) {
        self.hover.insert(item);
    }

    pub(crate) fn set_filter(&mut self, item: ItemId, policy: FilterPolicy) {
        self.filters.insert(item, policy);
    }

    pub(crate) fn set_drops(&mut self, item: ItemId) {
        self.drops.insert(item);
    }

    pub(crate) fn set_scope(&mut self, item: ItemId) {
        self.scopes.insert(item);
    }

    /// The item will not consume pointer events.
    pub(crate) fn reject(&mut self, item: ItemId) {
        self.reject.insert(item);
    }

    /// The item removes itself from the scene when it next receives a pointer event.
    pub(crate) fn remove_on_deliver(&mut self, item: ItemId) {
        self.remove_on_deliver.insert(item);
    }

    pub(crate) fn consume_keys(&mut self, item: ItemId) {
        self.keys.insert(item);
    }

    pub(crate) fn post_on_deliver(&mut self, item: ItemId, event: PointerEvent) {
        self.post_on_deliver = Some((item, event));
    }

    pub(crate) fn add_handler(&mut self, item: ItemId, margin: f64) -> HandlerId {
        self.handlers.push(TestHandler {
            item,
            margin,
            policy: HandlerPolicy::Observe,
            hover: false,
            removed: false,
        });
        #[allow(clippy::cast_possible_truncation, reason = "tests use few handlers")]
        let id = (self.handlers.len() - 1) as HandlerId;
        id
    }

    pub(crate) fn set_handler_policy(&mut self, handler: HandlerId, policy: HandlerPolicy) {
        self.handlers[handler as usize].policy = policy;
    }

    pub(crate) fn set_handler_hover(&mut self, handler: HandlerId) {
        self.handlers[handler as usize].hover = true;
    }

    pub(crate) fn take_log(&mut self) -> Vec<Call> {
        core::mem::take(&mut self.log)
    }

    /// `(item, kind)` of every pointer delivery so far.
    pub(crate) fn deliveries(&self) -> Vec<(ItemId, EventType)> {
        self.log
            .iter()
            .filter_map(|c| match c {
                Call::Deliver { item, kind, .. } => Some((*item, *kind)),
                _ => None,
            })
            .collect()
    }

    /// Kinds of the synthesized mouse deliveries so far.
    pub(crate) fn synthesized(&self) -> Vec<EventType> {
        self.log
            .iter()
            .filter_map(|c| match c {
                Call::Deliver {
                    kind,
                    synthesized: true,
                    ..
                } => Some(*kind),
                _ => None,
            })
            .collect()
    }

    pub(crate) fn grab_log(&self) -> Vec<(TestTarget, GrabTransition)> {
        self.log
            .iter()
            .filter_map(|c| match c {
                Call::Grab(t, tr, _) => Some((*t, *tr)),
                _ => None,
            })
            .collect()
    }

    pub(crate) fn hover_log(&self) -> Vec<(TestTarget, HoverKind)> {
        self.log
            .iter()
            .filter_map(|c| match c {
                Call::Hover(t, k) => Some((*t, *k)),
                _ => None,
            })
            .collect()
    }

    fn handler(&self, handler: HandlerId) -> Option<&TestHandler> {
        self.handlers
            .get(handler as usize)
            .filter(|h| !h.removed && self.scene.is_alive(h.item))
    }
}

impl Host for TestHost {
    type Item = ItemId;
    type Handler = HandlerId;
    type Tree = Scene;

    fn tree(&self) -> &Scene {
        &self.scene
    }

    fn accepts_touch(&self, item: ItemId) -> bool {
        self.touch.contains(&item)
    }

    fn accepted_mouse_buttons(&self, item: ItemId) -> MouseButtons {
        self.buttons
            .get(&item)
            .copied()
            .unwrap_or(MouseButtons::LEFT)
    }

    fn hover_enabled(&self, item: ItemId) -> bool {
        self.hover.contains(&item)
    }

    fn filters_child_events(&self, item: ItemId) -> bool {
        self.filters.contains_key(&item)
    }

    fn accepts_drops(&self, item: ItemId) -> bool {
        self.drops.contains(&item)
    }

    fn is_focus_scope(&self, item: ItemId) -> bool {
        self.scopes.contains(&item)
    }

    fn handlers(&self, item: ItemId) -> SmallVec<[HandlerId; 2]> {
        self.handlers
            .iter()
            .enumerate()
            .filter(|(_, h)| h.item == item && !h.removed)
            .map(|(i, _)| {
                #[allow(clippy::cast_possible_truncation, reason = "tests use few handlers")]
                let id = i as HandlerId;
                id
            })
            .collect()
    }

    fn handler_item(&self, handler: HandlerId) -> Option<ItemId> {
        self.handler(handler).map(|h| h.item)
    }

    fn handler_hover_enabled(&self, handler: HandlerId) -> bool {
        self.handler(handler).is_some_and(|h| h.hover)
    }

    fn handler_margin(&self, handler: HandlerId) -> f64 {
        self.handler(handler).map_or(0.0, |h| h.margin)
    }

    fn deliver(
        &mut self,
        item: ItemId,
        event: &LocalEvent<'_>,
        cx: &mut EventCx<'_, ItemId, HandlerId>,
    ) -> bool {
        self.log.push(Call::Deliver {
            item,
            kind: event.kind(),
            points: event.points().iter().map(LocalPoint::id).collect(),
            synthesized: event.is_synthesized(),
        });
        if self.post_on_deliver.as_ref().is_some_and(|(i, _)| *i == item) {
            if let Some((_, posted)) = self.post_on_deliver.take() {
                cx.post(posted);
            }
        }
        if self.remove_on_deliver.contains(&item) {
            self.scene.remove(item);
        }
        !self.reject.contains(&item)
    }

    fn wants_point(
        &self,
        handler: HandlerId,
        _event: &LocalEvent<'_>,
        point: &LocalPoint<'_>,
    ) -> bool {
        self.handler(handler).is_some_and(|h| {
            self.scene
                .bounds(h.item)
                .is_some_and(|b| b.inflate(h.margin, h.margin).contains(point.position))
        })
    }

    fn handle(
        &mut self,
        handler: HandlerId,
        event: &LocalEvent<'_>,
        cx: &mut EventCx<'_, ItemId, HandlerId>,
    ) {
        self.log.push(Call::Handle {
            handler,
            kind: event.kind(),
        });
        let policy = match self.handler(handler) {
            Some(h) => h.policy,
            None => return,
        };
        for p in event.points() {
            let inside = self.wants_point(handler, event, p);
            match policy {
                HandlerPolicy::Observe => {}
                HandlerPolicy::Grab => {
                    if p.state() == PointState::Pressed && inside {
                        cx.grab(p.id());
                    } else if cx.is_grabbing(p.id()) {
                        cx.accept_point(p.id());
                    }
                }
                HandlerPolicy::Passive => {
                    if p.state() == PointState::Pressed && inside {
                        cx.add_passive_grab(p.id());
                    }
                }
            }
        }
    }

    fn child_event_filter(
        &mut self,
        filter: ItemId,
        child: ItemId,
        event: &LocalEvent<'_>,
        _cx: &mut EventCx<'_, ItemId, HandlerId>,
    ) -> bool {
        self.log.push(Call::Filter {
            filter,
            child,
            kind: event.kind(),
        });
        match self.filters.get(&filter) {
            Some(FilterPolicy::Intercept) => true,
            Some(FilterPolicy::InterceptMouse) => event.kind().is_mouse(),
            _ => false,
        }
    }

    fn grab_changed(&mut self, change: &GrabChange<TestTarget>) {
        self.log
            .push(Call::Grab(change.target, change.transition, change.point));
    }

    fn item_ungrabbed(&mut self, item: ItemId, kind: UngrabKind) {
        self.log.push(Call::Ungrabbed(item, kind));
    }

    fn deliver_hover(&mut self, item: ItemId, event: &HoverEvent) -> bool {
        self.log.push(Call::Hover(Target::Item(item), event.kind));
        true
    }

    fn hover_handler(&mut self, handler: HandlerId, event: &HoverEvent) {
        self.log
            .push(Call::Hover(Target::Handler(handler), event.kind));
    }

    fn deliver_drag(&mut self, item: ItemId, event: &DragEvent) -> bool {
        self.log.push(Call::Drag(item, event.kind));
        true
    }

    fn deliver_key(&mut self, item: ItemId, _event: &KeyEvent) -> bool {
        self.log.push(Call::Key(item));
        self.keys.contains(&item)
    }

    fn focus_notify(&mut self, notification: FocusNotification<ItemId>) {
        self.log.push(Call::Focus(notification));
    }
}
