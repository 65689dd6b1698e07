//! Latch Services Layer
//!
//! Platform abstraction for saves, settings, input, telemetry, etc.

pub mod input;
pub mod save;
pub mod settings;

/// Service initialization (placeholder)
pub fn init_services() {
    // Platform detection and service setup
}
