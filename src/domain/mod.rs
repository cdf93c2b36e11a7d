//! Domain layer - Core port definitions
//!
//! This module defines the traits (ports) that the provisioner implements
//! and consumes, following hexagonal architecture principles.

pub mod ports;

pub use ports::*;
