//! Testing utilities for the cascades engine.
//!
//! This crate provides deterministic model fakes, instrumented pipeline steps,
//! mocks, seeded test data generators and assertion helpers.

pub mod assertions;
pub mod data_generators;
pub mod implementations;
pub mod mocks;

/// Re-export commonly used types for convenience
pub use mockall;

pub use assertions::*;
pub use data_generators::*;
pub use implementations::*;
pub use mocks::*;
