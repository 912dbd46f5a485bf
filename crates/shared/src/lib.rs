//! Shared utilities and common types for the battery usage workspace.
//!
//! This crate provides common functionality used across all other crates:
//! - Calendar-slot arithmetic over UTC millisecond timestamps
//! - Common validation logic for stored battery samples

pub mod time_slots;
pub mod validation;
