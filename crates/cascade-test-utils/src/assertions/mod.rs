//! Assertion utilities for cascades test results.
//!
//! Helpers panic with a descriptive message, making tests more concise.

mod partition;

// Re-export all assertion helpers for easy access
pub use partition::*;
