//! Test data generators for the cascades engine.
//!
//! Every generator is either fully deterministic or seeded, so tests that use
//! them are reproducible.

mod datasets;
mod scenario;

// Re-export all data generators for easy access
pub use datasets::*;
pub use scenario::*;
