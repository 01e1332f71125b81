// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! A flickable list with a button in it, driven by mouse and touch input.
//!
//! This example shows:
//! - a plain mouse click on a button,
//! - a touch tap on the same, mouse-only button (delivered as synthesized mouse events),
//! - a touch drag that starts on the button and is stolen by the flickable
//!   once it travels past the drag threshold,
//! - a two-finger touch on a touch-aware canvas,
//! - hover enter and leave.
//!
//! Run:
//! - `cargo run -p understory_demos --example delivery_trace`
//! - `RUST_LOG=understory::delivery=debug cargo run -p understory_demos --example delivery_trace`

use std::collections::HashMap;

use kurbo::{Point, Rect};
use tracing_subscriber::EnvFilter;
use understory_delivery::DeliveryAgent;
use understory_delivery::config::DeliveryConfig;
use understory_delivery::context::{EventCx, LocalEvent};
use understory_delivery::event::{EventPoint, EventType, PointerEvent};
use understory_delivery::grab::GrabChange;
use understory_delivery::host::{Host, UngrabKind};
use understory_delivery::hover::HoverEvent;
use understory_delivery::types::{
    DeviceId, DeviceKind, MouseButtons, PointId, PointState, PointingDevice, Target,
};
use understory_scene::{ItemId, LocalItem, Scene};

struct Demo {
    scene: Scene,
    names: HashMap<ItemId, &'static str>,
    flickable: ItemId,
    button: ItemId,
    canvas: ItemId,
    config: DeliveryConfig,
    /// Scene position where the flickable saw the current press.
    press_at: Option<Point>,
}

impl Demo {
    fn new() -> Self {
        let mut scene = Scene::new();
        let root = scene.insert(None, LocalItem::at(Rect::new(0.0, 0.0, 400.0, 300.0)));
        let flickable = scene.insert(Some(root), LocalItem::at(Rect::new(0.0, 0.0, 200.0, 300.0)));
        let button = scene.insert(
            Some(flickable),
            LocalItem::at(Rect::new(20.0, 20.0, 180.0, 60.0)),
        );
        let canvas = scene.insert(Some(root), LocalItem::at(Rect::new(220.0, 0.0, 400.0, 300.0)));
        let names = HashMap::from([
            (root, "root"),
            (flickable, "flickable"),
            (button, "button"),
            (canvas, "canvas"),
        ]);
        Self {
            scene,
            names,
            flickable,
            button,
            canvas,
            config: DeliveryConfig::default(),
            press_at: None,
        }
    }

    fn name(&self, item: ItemId) -> &'static str {
        self.names.get(&item).copied().unwrap_or("?")
    }
}

impl Host for Demo {
    type Item = ItemId;
    type Handler = u32;
    type Tree = Scene;

    fn tree(&self) -> &Scene {
        &self.scene
    }

    fn accepts_touch(&self, item: ItemId) -> bool {
        item == self.canvas
    }

    fn accepted_mouse_buttons(&self, item: ItemId) -> MouseButtons {
        if item == self.button || item == self.flickable {
            MouseButtons::LEFT
        } else {
            MouseButtons::empty()
        }
    }

    fn hover_enabled(&self, item: ItemId) -> bool {
        item == self.button
    }

    fn filters_child_events(&self, item: ItemId) -> bool {
        item == self.flickable
    }

    fn deliver(
        &mut self,
        item: ItemId,
        event: &LocalEvent<'_>,
        _cx: &mut EventCx<'_, ItemId, u32>,
    ) -> bool {
        let points: Vec<String> = event
            .points()
            .iter()
            .map(|p| format!("{}@({:.0}, {:.0})", p.id(), p.position.x, p.position.y))
            .collect();
        println!(
            "  {:<9} <- {:?}{} [{}]",
            self.name(item),
            event.kind(),
            if event.is_synthesized() { " (synthesized)" } else { "" },
            points.join(", ")
        );
        if item == self.button && event.kind() == EventType::MouseRelease {
            println!("  button clicked");
        }
        true
    }

    fn child_event_filter(
        &mut self,
        _filter: ItemId,
        child: ItemId,
        event: &LocalEvent<'_>,
        _cx: &mut EventCx<'_, ItemId, u32>,
    ) -> bool {
        let Some(point) = event.first() else {
            return false;
        };
        match point.state() {
            PointState::Pressed => {
                self.press_at = Some(point.scene_position());
                false
            }
            PointState::Updated => {
                let Some(start) = self.press_at else {
                    return false;
                };
                let travel = point.scene_position() - start;
                let steal = self.config.drag_over_threshold(travel.y, 0.0);
                if steal {
                    println!(
                        "  flickable steals {:?} from {} after {:.0} px",
                        event.kind(),
                        self.name(child),
                        travel.y
                    );
                }
                steal
            }
            _ => false,
        }
    }

    fn grab_changed(&mut self, change: &GrabChange<Target<ItemId, u32>>) {
        if let Target::Item(item) = change.target {
            println!(
                "  grab: {} {:?} on {}",
                self.name(item),
                change.transition,
                change.point
            );
        }
    }

    fn item_ungrabbed(&mut self, item: ItemId, kind: UngrabKind) {
        println!("  {} ungrabbed ({kind:?})", self.name(item));
    }

    fn deliver_hover(&mut self, item: ItemId, event: &HoverEvent) -> bool {
        println!("  {:<9} <- hover {:?}", self.name(item), event.kind);
        true
    }
}

fn mouse_event(kind: EventType, at: (f64, f64), button: MouseButtons, held: MouseButtons) -> PointerEvent {
    let mouse = PointingDevice::new(DeviceId(0), DeviceKind::Mouse);
    PointerEvent::mouse(kind, mouse, Point::new(at.0, at.1), button, held)
}

fn touch_event(points: &[(u32, PointState, f64, f64)]) -> PointerEvent {
    let screen = PointingDevice::new(DeviceId(1), DeviceKind::TouchScreen);
    let points = points
        .iter()
        .map(|&(id, state, x, y)| EventPoint::new(PointId(id), state, Point::new(x, y)));
    PointerEvent::touch(screen, points).expect("demo touch events are well formed")
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("understory::delivery=info")),
        )
        .init();

    let mut demo = Demo::new();
    let mut agent = DeliveryAgent::new();
    let none = MouseButtons::empty();
    let left = MouseButtons::LEFT;

    println!("mouse hovers over the button and leaves");
    agent.handle_pointer_event(&mut demo, mouse_event(EventType::MouseMove, (100.0, 40.0), none, none));
    agent.handle_pointer_event(&mut demo, mouse_event(EventType::MouseMove, (100.0, 150.0), none, none));

    println!("mouse clicks the button");
    agent.handle_pointer_event(&mut demo, mouse_event(EventType::MousePress, (100.0, 40.0), left, left));
    agent.handle_pointer_event(&mut demo, mouse_event(EventType::MouseRelease, (100.0, 40.0), left, none));

    println!("finger taps the button");
    agent.handle_pointer_event(&mut demo, touch_event(&[(1, PointState::Pressed, 100.0, 40.0)]));
    agent.handle_pointer_event(&mut demo, touch_event(&[(1, PointState::Released, 100.0, 40.0)]));

    println!("finger drags from the button; the flickable takes over");
    agent.handle_pointer_event(&mut demo, touch_event(&[(2, PointState::Pressed, 100.0, 40.0)]));
    for y in [44.0, 48.0, 60.0, 80.0] {
        agent.handle_pointer_event(&mut demo, touch_event(&[(2, PointState::Updated, 100.0, y)]));
        // One frame per update, so every step is delivered.
        agent.flush_frame_synchronous_events(&mut demo, false);
    }
    agent.handle_pointer_event(&mut demo, touch_event(&[(2, PointState::Released, 100.0, 80.0)]));

    println!("two fingers on the canvas");
    agent.handle_pointer_event(
        &mut demo,
        touch_event(&[
            (3, PointState::Pressed, 250.0, 50.0),
            (4, PointState::Pressed, 300.0, 120.0),
        ]),
    );
    agent.handle_pointer_event(
        &mut demo,
        touch_event(&[
            (3, PointState::Released, 250.0, 50.0),
            (4, PointState::Released, 300.0, 120.0),
        ]),
    );

    assert!(agent.grabs().is_empty());
}
