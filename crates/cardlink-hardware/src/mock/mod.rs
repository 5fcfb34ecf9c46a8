//! Simulated card reader for testing and development.
//!
//! This module provides a simulated peripheral that reproduces the latencies
//! and responses of a real reader without requiring physical hardware.

pub mod backend;
pub mod config;

// Re-export commonly used types
pub use backend::{SimulatedBackend, is_declined_amount};
pub use config::{Latencies, MockConfig, SessionConfig};
