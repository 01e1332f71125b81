// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Construction and configuration errors.
//!
//! Delivery itself never fails: an unclaimed point, an unknown grab, or a target
//! removed mid-delivery are ordinary outcomes. Errors only come from building
//! malformed events or configurations.

use thiserror::Error;

use crate::types::PointId;

/// Errors produced when building events or validating configuration.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    /// A pointer event must carry at least one point.
    #[error("pointer event has no points")]
    NoPoints,
    /// Two points in one event share an id.
    #[error("duplicate point id {0} in one event")]
    DuplicatePoint(PointId),
    /// A configuration value is out of range.
    #[error("invalid configuration value for {field}: {value}")]
    InvalidConfig {
        /// Name of the offending field.
        field: &'static str,
        /// The rejected value.
        value: f64,
    },
}

/// Result alias for fallible constructors in this crate.
pub type Result<T> = core::result::Result<T, Error>;
