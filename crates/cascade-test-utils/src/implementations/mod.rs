//! Test implementations (fakes) of the cascades interfaces.
//!
//! The models are deterministic and cheap, so selector and dispatcher
//! behaviour can be asserted exactly. The steps record how often and on how
//! many rows they ran.

pub mod centroid_model;
pub mod lookup_model;
pub mod steps;

// Re-export all implementations for easy access
pub use centroid_model::*;
pub use lookup_model::*;
pub use steps::*;
