//! Shared data model and collaborator contracts for the weaver
//! workflow-orchestration master.

pub mod command;
pub mod dependent;
pub mod error;
pub mod event;
pub mod store;
pub mod task;
pub mod workflow;
