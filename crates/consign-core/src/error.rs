//! # Error Types
//!
//! Domain-specific error types for consign-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  consign-core errors (this file)                                        │
//! │  ├── CoreError        - Settlement rule violations                      │
//! │  └── ValidationError  - Input validation failures                       │
//! │                                                                         │
//! │  consign-db errors                                                      │
//! │  └── DbError          - Database operation failures                     │
//! │                                                                         │
//! │  consign-engine errors                                                  │
//! │  └── EngineError      - What callers see, with an ErrorKind             │
//! │                                                                         │
//! │  Flow: ValidationError → CoreError ─┐                                   │
//! │                          DbError ───┴─► EngineError → caller            │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use thiserror::Error;

use crate::money::{Money, Quantity};
use crate::types::{ClaimStatus, SessionStatus};

// =============================================================================
// Core Error
// =============================================================================

/// Settlement rule violations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Reconciled quantities do not add up to what was delivered.
    ///
    /// ## User Workflow
    /// ```text
    /// Delivered: 50
    /// Sold 30 + Unsold 15 + Expired 0 + Damaged 2 = 47
    ///      │
    ///      ▼
    /// UnbalancedQuantities { item: "Sourdough", delivered: 50, accounted: 47 }
    /// ```
    #[error("Quantities for {item} do not balance: delivered {delivered}, accounted for {accounted}")]
    UnbalancedQuantities {
        item: String,
        delivered: Quantity,
        accounted: Quantity,
    },

    /// No line has a positive sold quantity.
    #[error("No items with sold quantity to claim")]
    NothingToClaim,

    #[error("Claim {claim_id} is {current}, cannot {operation}")]
    InvalidClaimStatus {
        claim_id: String,
        current: ClaimStatus,
        operation: &'static str,
    },

    #[error("Session {session_id} is {current}, cannot {operation}")]
    InvalidSessionStatus {
        session_id: String,
        current: SessionStatus,
        operation: &'static str,
    },

    /// Product has no usable sale price to base commission on.
    #[error("Product {product_id} has no valid sale price")]
    InvalidSalePrice { product_id: String },

    #[error("Commission {commission} exceeds price {price} for product {product_id}")]
    CommissionExceedsPrice {
        product_id: String,
        commission: Money,
        price: Money,
    },

    /// Sold plus returned is more than was sent.
    #[error("Item {item_id}: sold {sold} + returned {returned} exceeds sent {sent}")]
    OverReconciled {
        item_id: String,
        sent: Quantity,
        sold: Quantity,
        returned: Quantity,
    },

    /// More was allocated to a claim (or claim item) than it owes.
    #[error("Allocation of {requested} to {target} exceeds its balance of {balance}")]
    OverAllocation {
        target: String,
        requested: Money,
        balance: Money,
    },

    #[error("Allocations total {allocated} exceeds payment amount {total}")]
    AllocationExceedsPayment { allocated: Money, total: Money },

    #[error("No outstanding balance to allocate")]
    NoOutstandingBalance,

    /// A referenced record belongs to another vendor.
    #[error("{entity} {id} does not belong to vendor {vendor_id}")]
    VendorMismatch {
        entity: &'static str,
        id: String,
        vendor_id: String,
    },

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}

// =============================================================================
// Validation Error
// =============================================================================

/// Input validation errors.
///
/// Raised before any business rule runs.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// A required field or list is missing or empty.
    #[error("{field} is required")]
    Required { field: String },

    #[error("{field} must be at most {max} characters")]
    TooLong { field: String, max: usize },

    #[error("{field} must be between {min} and {max}")]
    OutOfRange { field: String, min: i64, max: i64 },

    #[error("{field} must be positive")]
    MustBePositive { field: String },

    #[error("{field} must not be negative")]
    MustNotBeNegative { field: String },

    /// Above the largest value the engine accepts, e.g. a quantity that
    /// could not be summed safely.
    #[error("{field} must be at most {max}")]
    TooLarge { field: String, max: String },

    /// Invalid format (e.g., invalid UUID).
    #[error("{field} has invalid format: {reason}")]
    InvalidFormat { field: String, reason: String },

    /// Field is missing for the chosen option, e.g. `claim_id` for per_claim.
    #[error("{field} is required when {context}")]
    RequiredFor { field: String, context: String },
}

// =============================================================================
// Result Type Alias
// =============================================================================

pub type CoreResult<T> = Result<T, CoreError>;

// =============================================================================
// Unit Tests
// =============================================================================
