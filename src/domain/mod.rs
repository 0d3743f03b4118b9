//! Domain layer - Port definitions
//!
//! Defines the engine contract the caching front-end depends on,
//! following hexagonal architecture principles.

pub mod ports;

pub use ports::*;
