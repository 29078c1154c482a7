//! Cross-platform helpers shared by the update and plugin subsystems.

pub mod fs;
pub mod progress;
