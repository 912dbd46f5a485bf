//! Domain layer for the battery usage engine.
//!
//! This crate contains:
//! - Domain models (history samples, level series, usage diff entries)
//! - Services that reconstruct sparse history and aggregate usage per slot
//! - Domain error types

pub mod error;
pub mod models;
pub mod services;

pub use error::BatteryError;
