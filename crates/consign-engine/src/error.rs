//! # Engine Error Type
//!
//! What callers of the settlement engine see when an operation fails.
//!
//! ## Error Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Error Flow in consign-engine                       │
//! │                                                                         │
//! │  ValidationError ──► CoreError ──┐                                      │
//! │                                  ├──► EngineError { kind, message }     │
//! │  sqlx::Error ──► DbError ────────┤                                      │
//! │                                  │                                      │
//! │  serde_json::Error ──────────────┘                                      │
//! │                                                                         │
//! │  kind ∈ InvalidArgument | NotFound | FailedPrecondition | Internal      │
//! │  A transport maps kinds to its own codes (400 / 404 / 409 / 500).       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The transaction of a failed operation is dropped, so nothing it wrote
//! survives.

use std::fmt;

use serde::Serialize;
use tracing::error;

use crate::config::ConfigError;
use consign_core::CoreError;
use consign_db::DbError;

/// Machine-readable error category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    /// Malformed input or an amount/quantity rule violation.
    InvalidArgument,

    /// Absent, or owned by someone else.
    NotFound,

    /// The target is in the wrong state for the operation.
    FailedPrecondition,

    /// Persistence or serialization failure.
    Internal,
}

/// Error returned from every engine operation.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineError {
    pub kind: ErrorKind,
    pub message: String,
}

impl EngineError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        EngineError {
            kind,
            message: message.into(),
        }
    }

    pub fn not_found(entity: &str, id: &str) -> Self {
        EngineError::new(ErrorKind::NotFound, format!("{} not found: {}", entity, id))
    }

    pub fn failed_precondition(message: impl Into<String>) -> Self {
        EngineError::new(ErrorKind::FailedPrecondition, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        EngineError::new(ErrorKind::Internal, message)
    }
}

pub type EngineResult<T> = Result<T, EngineError>;

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{:?}] {}", self.kind, self.message)
    }
}

impl std::error::Error for EngineError {}

impl From<CoreError> for EngineError {
    fn from(err: CoreError) -> Self {
        let kind = match &err {
            CoreError::UnbalancedQuantities { .. }
            | CoreError::CommissionExceedsPrice { .. }
            | CoreError::OverReconciled { .. }
            | CoreError::OverAllocation { .. }
            | CoreError::AllocationExceedsPayment { .. }
            | CoreError::VendorMismatch { .. }
            | CoreError::Validation(_) => ErrorKind::InvalidArgument,

            CoreError::NothingToClaim
            | CoreError::InvalidClaimStatus { .. }
            | CoreError::InvalidSessionStatus { .. }
            | CoreError::InvalidSalePrice { .. }
            | CoreError::NoOutstandingBalance => ErrorKind::FailedPrecondition,
        };
        EngineError::new(kind, err.to_string())
    }
}

impl From<consign_core::ValidationError> for EngineError {
    fn from(err: consign_core::ValidationError) -> Self {
        EngineError::from(CoreError::from(err))
    }
}

impl From<DbError> for EngineError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::NotFound { entity, id } => EngineError::not_found(&entity, &id),
            other => {
                // The cause is logged; callers get a generic message.
                error!(error = %other, "Database operation failed");
                EngineError::internal("Database operation failed")
            }
        }
    }
}

impl From<serde_json::Error> for EngineError {
    fn from(err: serde_json::Error) -> Self {
        error!(error = %err, "Event serialization failed");
        EngineError::internal("Event serialization failed")
    }
}

impl From<ConfigError> for EngineError {
    fn from(err: ConfigError) -> Self {
        EngineError::internal(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use consign_core::{ClaimStatus, Money, ValidationError};
    use rstest::rstest;

    #[rstest]
    #[case(CoreError::NothingToClaim, ErrorKind::FailedPrecondition)]
    #[case(CoreError::NoOutstandingBalance, ErrorKind::FailedPrecondition)]
    #[case(
        CoreError::InvalidClaimStatus {
            claim_id: "c-1".to_string(),
            current: ClaimStatus::Approved,
            operation: "reject",
        },
        ErrorKind::FailedPrecondition
    )]
    #[case(
        CoreError::OverAllocation {
            target: "claim c-1".to_string(),
            requested: Money::from_cents(600),
            balance: Money::from_cents(500),
        },
        ErrorKind::InvalidArgument
    )]
    #[case(
        CoreError::Validation(ValidationError::Required { field: "delivery_ids".to_string() }),
        ErrorKind::InvalidArgument
    )]
    fn test_core_error_kinds(#[case] err: CoreError, #[case] kind: ErrorKind) {
        assert_eq!(EngineError::from(err).kind, kind);
    }

    #[test]
    fn test_db_not_found_keeps_message() {
        let err = EngineError::from(DbError::not_found("Claim", "c-9"));
        assert_eq!(err.kind, ErrorKind::NotFound);
        assert_eq!(err.message, "Claim not found: c-9");
    }

    #[test]
    fn test_db_failure_is_internal() {
        let err = EngineError::from(DbError::QueryFailed("disk I/O error".to_string()));
        assert_eq!(err.kind, ErrorKind::Internal);
        assert!(!err.message.contains("disk"));
    }

    #[test]
    fn test_serializes_for_transport() {
        let err = EngineError::failed_precondition("Claim c-1 is draft, cannot approve");
        let json = serde_json::to_value(&err).unwrap();
        assert_eq!(json["kind"], "FAILED_PRECONDITION");
    }
}
