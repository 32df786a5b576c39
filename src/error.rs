//! Engine-facing error type and its mapping from state and service failures.

use thiserror::Error;
use validator::ValidationErrors;

use crate::{
    dao::storage::StorageError,
    state::{AbortError, ApplyError, PlanError, board::BoardRejection},
};

/// Errors that can occur in service layer operations.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// A collaborator (catalog, score service or key-value store) failed.
    #[error("collaborator unavailable")]
    Unavailable(#[source] StorageError),
    /// The catalog returned no item for the active categories.
    #[error("no playable content for the active categories")]
    PoolExhausted,
    /// The action is not valid in the current phase.
    #[error("invalid transition: {0}")]
    InvalidTransition(String),
    /// Another action is still being applied.
    #[error("another action is still in progress")]
    Busy,
    /// Invalid input provided by the operator.
    #[error("invalid input: {0}")]
    InvalidInput(String),
    /// Requested resource was not found.
    #[error("not found: {0}")]
    NotFound(String),
    /// Operation exceeded its timeout limit.
    #[error("operation timed out")]
    Timeout,
}

impl ServiceError {
    /// Whether the error only means the action was refused, with nothing changed.
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            ServiceError::InvalidTransition(_) | ServiceError::Busy | ServiceError::InvalidInput(_)
        )
    }
}

impl From<StorageError> for ServiceError {
    fn from(err: StorageError) -> Self {
        ServiceError::Unavailable(err)
    }
}

impl From<BoardRejection> for ServiceError {
    fn from(rejection: BoardRejection) -> Self {
        ServiceError::InvalidInput(rejection.to_string())
    }
}

impl From<ValidationErrors> for ServiceError {
    fn from(err: ValidationErrors) -> Self {
        ServiceError::InvalidInput(format!("validation failed: {err}"))
    }
}

impl From<PlanError> for ServiceError {
    fn from(err: PlanError) -> Self {
        match err {
            PlanError::AlreadyPending => ServiceError::Busy,
            PlanError::InvalidTransition(invalid) => ServiceError::InvalidTransition(format!(
                "{} cannot be applied while in {}",
                invalid.event, invalid.from
            )),
        }
    }
}

impl From<ApplyError> for ServiceError {
    fn from(err: ApplyError) -> Self {
        match err {
            ApplyError::NoPending => {
                ServiceError::InvalidTransition("no transition is pending".into())
            }
            ApplyError::IdMismatch { .. } => {
                ServiceError::InvalidTransition("pending transition does not match".into())
            }
            ApplyError::PhaseMismatch { expected, actual } => {
                ServiceError::InvalidTransition(format!(
                    "state changed during transition (expected {expected:?}, got {actual:?})"
                ))
            }
            ApplyError::VersionMismatch { expected, actual } => {
                ServiceError::InvalidTransition(format!(
                    "state version mismatch during transition (expected {expected}, got {actual})"
                ))
            }
        }
    }
}

impl From<AbortError> for ServiceError {
    fn from(err: AbortError) -> Self {
        match err {
            AbortError::NoPending => ServiceError::InvalidTransition("no pending transition".into()),
            AbortError::IdMismatch { .. } => {
                ServiceError::InvalidTransition("transition plan does not match".into())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::state_machine::InvalidTransition;

    #[test]
    fn pending_plan_maps_to_busy() {
        let err: ServiceError = PlanError::AlreadyPending.into();
        assert!(matches!(err, ServiceError::Busy));
        assert!(err.is_rejection());
    }

    #[test]
    fn invalid_transition_keeps_context() {
        let err: ServiceError = PlanError::InvalidTransition(InvalidTransition {
            from: "Idle".into(),
            event: "TimeUp".into(),
        })
        .into();
        assert_eq!(
            err.to_string(),
            "invalid transition: TimeUp cannot be applied while in Idle"
        );
    }

    #[test]
    fn collaborator_failures_are_not_rejections() {
        let err: ServiceError = StorageError::rejected("scores", "HTTP 500").into();
        assert!(!err.is_rejection());
        assert!(!ServiceError::PoolExhausted.is_rejection());
    }
}
