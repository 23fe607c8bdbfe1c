use std::fmt::Debug;

/// Error taxonomy for the scheduling core.
///
/// Variants in the "not found" / "invalid" families are fatal for the
/// single command being handled: the handler aborts and returns no
/// partial graph. Dispatch failures are transient and never surface
/// through this enum; they go back onto the failed-dispatch retry
/// queue. A WAITING or FAILED dependency outcome is not an error at all
/// (see `DependResult`).
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("Workflow Definition Not Found: code {code} version {version}")]
    DefinitionNotFound { code: i64, version: i32 },

    #[error("Workflow Instance Not Found: id {0}")]
    InstanceNotFound(i32),

    #[error("Invalid Command Params: {0}")]
    InvalidCommandParams(String),

    #[error("Start Node Not In Graph: {0}")]
    StartNodeNotInGraph(String),

    #[error("Cyclic Workflow Graph: definition code {0}")]
    CyclicGraph(i64),

    #[error("Serialization Error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Storage Error: {0}")]
    Storage(String),

    #[error("State Transition Error: {0}")]
    StateTransition(String),

    #[error("Conflict Error: {0}")]
    Conflict(String),

    #[error("Internal Error: {0}")]
    Internal(String),
}

impl Error {
    /// True when retrying the same command can never succeed.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Error::DefinitionNotFound { .. }
                | Error::InstanceNotFound(_)
                | Error::InvalidCommandParams(_)
                | Error::StartNodeNotInGraph(_)
                | Error::CyclicGraph(_)
        )
    }
}
