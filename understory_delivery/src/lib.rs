// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

// After you edit the crate's doc comment, run this command, then check README.md for any missing links
// cargo rdme --workspace-project=understory_delivery --heading-base-level=0

//! Understory Delivery: deterministic, `no_std` pointer and touch delivery.
//!
//! ## Overview
//!
//! This crate takes low-level pointer input (mouse, touch, tablet, wheel) and
//! routes it to a tree of overlapping items. It resolves which items are
//! offered which points, tracks exclusive and passive grabs per point and
//! device, lets ancestors filter their descendants' events, synthesizes mouse
//! input from touch for items that only understand the mouse, coalesces bursts
//! of touch updates, and keeps hover, drag-and-drop and keyboard focus state.
//!
//! The engine never owns items. It reads the tree through
//! [`ItemTree`](crate::host::ItemTree) and calls into the application through
//! [`Host`](crate::host::Host). Callbacks receive an
//! [`EventCx`](crate::context::EventCx) to accept points and request grabs, and
//! may freely mutate the scene: the agent checks liveness before it reads
//! anything about a target again.
//!
//! ## Delivery
//!
//! [`DeliveryAgent::handle_pointer_event`](crate::agent::DeliveryAgent::handle_pointer_event)
//! is the single entry point for pointer input. Pressed points go to the
//! deepest, topmost candidate first; the item that consumes a press becomes the
//! point's exclusive grabber and receives its updates and release. See the
//! [`agent`] module for the phases and [`hit`] for the candidate order.
//!
//! ```
//! use kurbo::{Point, Rect};
//! use understory_delivery::agent::DeliveryAgent;
//! use understory_delivery::context::{EventCx, LocalEvent};
//! use understory_delivery::event::{EventType, PointerEvent};
//! use understory_delivery::host::Host;
//! use understory_delivery::types::{
//!     DeviceId, DeviceKind, MouseButtons, PointId, PointingDevice, Target,
//! };
//! use understory_scene::{ItemId, LocalItem, Scene};
//!
//! struct App {
//!     scene: Scene,
//!     pressed: Vec<ItemId>,
//! }
//!
//! impl Host for App {
//!     type Item = ItemId;
//!     type Handler = ();
//!     type Tree = Scene;
//!
//!     fn tree(&self) -> &Scene {
//!         &self.scene
//!     }
//!     fn accepts_touch(&self, _: ItemId) -> bool {
//!         false
//!     }
//!     fn accepted_mouse_buttons(&self, _: ItemId) -> MouseButtons {
//!         MouseButtons::LEFT
//!     }
//!     fn deliver(
//!         &mut self,
//!         item: ItemId,
//!         event: &LocalEvent<'_>,
//!         _: &mut EventCx<'_, ItemId, ()>,
//!     ) -> bool {
//!         if event.kind() == EventType::MousePress {
//!             self.pressed.push(item);
//!         }
//!         true
//!     }
//! }
//!
//! let mut scene = Scene::new();
//! let root = scene.insert(None, LocalItem::at(Rect::new(0.0, 0.0, 200.0, 200.0)));
//! let button = scene.insert(Some(root), LocalItem::at(Rect::new(10.0, 10.0, 60.0, 40.0)));
//! let mut app = App { scene, pressed: Vec::new() };
//!
//! let mouse = PointingDevice::new(DeviceId(0), DeviceKind::Mouse);
//! let mut agent = DeliveryAgent::new();
//! let press = PointerEvent::mouse(
//!     EventType::MousePress,
//!     mouse,
//!     Point::new(20.0, 20.0),
//!     MouseButtons::LEFT,
//!     MouseButtons::LEFT,
//! );
//! agent.handle_pointer_event(&mut app, press);
//!
//! assert_eq!(app.pressed, [button]);
//! assert_eq!(
//!     agent.exclusive_grabber(mouse.id, PointId::PRIMARY),
//!     Some(Target::Item(button))
//! );
//! ```
//!
//! ## Parallel protocols
//!
//! - [`hover`]: enter/move/leave computed per position with a generation counter.
//! - [`drag`]: drag enter/move/leave/drop against drop targets.
//! - [`focus`]: focus scopes, active focus, and key event bubbling.
//!
//! ## Adapters
//!
//! The [`adapters`] module provides integration with other Understory crates:
//!
//! - **Scene Adapter** (`scene_adapter` feature): implements
//!   [`ItemTree`](host::ItemTree) for [`understory_scene::Scene`].
//!
//! ## Logging
//!
//! Decisions are reported through `tracing` under the `understory::delivery::*`
//! targets (`grab`, `touch`, `touch_target`, `mouse`, `hover`, `focus`,
//! `filter`, `drag`, `compress`, `hit`).
//!
//! This crate is `no_std` and uses `alloc`.

#![no_std]

extern crate alloc;

pub mod adapters;
pub mod agent;
pub mod compress;
pub mod config;
pub mod context;
pub mod drag;
pub mod error;
pub mod event;
pub mod focus;
pub mod grab;
pub mod hit;
pub mod host;
pub mod hover;
pub mod types;

mod filter;
mod touch_mouse;

#[cfg(all(test, feature = "scene_adapter"))]
mod testing;

pub use agent::DeliveryAgent;
pub use error::{Error, Result};
