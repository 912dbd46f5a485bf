//! HTTP route handlers.

pub mod battery;
pub mod health;
pub mod locale;
