use thiserror::Error;

#[derive(Error, Debug)]
pub enum GateError {
    #[error("Coordinator unavailable: event channel closed")]
    CoordinatorUnavailable,

    #[error("Decision abandoned without a reply")]
    DecisionAbandoned,

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, GateError>;
