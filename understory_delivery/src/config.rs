// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Delivery policy knobs.
//!
//! Distances are in scene units and times in milliseconds. The double-tap and
//! drag thresholds are platform policy, so they are configuration rather than
//! constants baked into the engine.
//!
//! ```
//! use understory_delivery::config::DeliveryConfig;
//!
//! let config = DeliveryConfig {
//!     double_tap_distance: 24.0,
//!     ..DeliveryConfig::default()
//! };
//! assert!(config.validate().is_ok());
//! assert!(config.drag_over_threshold(12.0, 0.0));
//! ```

use crate::error::{Error, Result};

/// Policy configuration for a [`DeliveryAgent`](crate::agent::DeliveryAgent).
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct DeliveryConfig {
    /// Synthesize mouse events for touch points that reach items which do not accept touch.
    pub synthesize_mouse_for_unhandled_touch: bool,
    /// Merge bursts of touch updates until the next frame boundary.
    pub touch_compression: bool,
    /// Offer events to ancestors that filter their children's events.
    pub child_event_filtering: bool,
    /// Maximum per-axis distance between two taps promoted to a double click.
    pub double_tap_distance: f64,
    /// Maximum time between two presses promoted to a double click.
    pub double_click_interval_ms: u64,
    /// Distance a point must travel before a drag starts.
    pub start_drag_distance: f64,
    /// Velocity that starts a drag regardless of distance; zero disables it.
    pub start_drag_velocity: f64,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            synthesize_mouse_for_unhandled_touch: true,
            touch_compression: true,
            child_event_filtering: true,
            double_tap_distance: 10.0,
            double_click_interval_ms: 400,
            start_drag_distance: 10.0,
            start_drag_velocity: 0.0,
        }
    }
}

impl DeliveryConfig {
    /// Reject negative or non-finite distances and velocities.
    pub fn validate(&self) -> Result<()> {
        for (field, value) in [
            ("double_tap_distance", self.double_tap_distance),
            ("start_drag_distance", self.start_drag_distance),
            ("start_drag_velocity", self.start_drag_velocity),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(Error::InvalidConfig { field, value });
            }
        }
        Ok(())
    }

    /// Whether movement along one axis is enough to start a drag.
    ///
    /// `distance` is the travelled distance on that axis; `velocity` is the
    /// point's speed on that axis (pass zero when the device reports none).
    pub fn drag_over_threshold(&self, distance: f64, velocity: f64) -> bool {
        let over_velocity =
            self.start_drag_velocity > 0.0 && velocity.abs() > self.start_drag_velocity;
        distance.abs() > self.start_drag_distance || over_velocity
    }
}
