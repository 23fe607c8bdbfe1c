//! Master-side scheduling and dependency-resolution engine: turns
//! persisted lifecycle commands into executable workflow units, walks
//! workflow DAG topology, orders cross-workflow dispatch, and evaluates
//! inter-workflow dependencies against run history.

pub mod config;
pub mod dependency;
pub mod graph;
pub mod handlers;
pub mod queue;
