/// Pipeline steps and their computations
pub mod step;

/// Pipeline graph model and validation
pub mod graph;

/// Feature blocks and their binding to a graph
pub mod feature_block;

/// Cascade artifact produced by training
pub mod artifact;
