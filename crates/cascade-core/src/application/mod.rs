/// Graph execution plans and step observers
pub mod executor;

/// Step cost profiling
pub mod profiler;

/// Holdout splitting and checked model callbacks
pub mod evaluation;

/// Feature block importance estimation
pub mod importance;

/// Cascade configuration search
pub mod selector;

/// Two-tier inference dispatcher
pub mod dispatcher;

/// Training and inference entry points
pub mod cascades;
