use thiserror::Error;

use crate::production::LifecycleState;

#[derive(Debug, Error)]
pub enum ProductionError {
    #[error("No formula selected")]
    NoFormulaSelected,

    #[error("Formula not found: {0}")]
    FormulaNotFound(String),

    #[error("History entry not found: {0}")]
    HistoryEntryNotFound(String),

    #[error("Nothing to resume: no pending snapshot")]
    NothingToResume,

    #[error("Action `{action}` is not valid while the run is {state}")]
    InvalidTransition {
        action: &'static str,
        state: LifecycleState,
    },

    #[error("A production run is already active")]
    RunAlreadyActive,

    #[error("Persistence failure: {0}")]
    Persistence(#[from] StoreError),
}

impl ProductionError {
    /// User-facing conditions that the operator can fix by retrying with
    /// different input. Persistence failures are retried through
    /// `ProductionMachine::retry_commit` instead.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, ProductionError::Persistence(_))
    }
}

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("Pigment not found: {0}")]
    NotFound(String),
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Write rejected: {0}")]
    Rejected(String),
}
