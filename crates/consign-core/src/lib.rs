//! # consign-core: Pure Settlement Logic
//!
//! Business rules for consignment settlement as pure functions with zero I/O.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  consign-engine   ── transactions, locks, events                        │
//! │        │                                                                │
//! │        ▼                                                                │
//! │  consign-db       ── SQLite repositories                                │
//! │        │                                                                │
//! │        ▼                                                                │
//! │  consign-core     ── THIS CRATE: money, claim math, allocation plans    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`money`] - Money, Quantity and half-away-from-zero rounding
//! - [`types`] - Domain types (Claim, Payment, ConsignmentSession, ...)
//! - [`claim`] - Quantity balance, claim lines, totals, status transitions
//! - [`session`] - Commission pricing, reconciliation, session metrics
//! - [`allocation`] - Payment strategies and item distribution
//! - [`balance`] - Outstanding balance aggregation
//! - [`numbering`] - Claim, payment and session numbers
//! - [`error`] - Domain error types
//! - [`validation`] - Input validation
//!
//! ## Example Usage
//!
//! ```rust
//! use consign_core::claim::LineAmounts;
//! use consign_core::money::{Money, Quantity};
//! use consign_core::types::CommissionRate;
//!
//! // 30 sold at $4.99 with a 15% vendor commission
//! let line = LineAmounts::for_delivery(
//!     Quantity::from_units(30),
//!     Money::from_cents(499),
//!     CommissionRate::from_bps(1500),
//! );
//! assert_eq!(line.net.cents(), 12_724);
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod allocation;
pub mod balance;
pub mod claim;
pub mod error;
pub mod money;
pub mod numbering;
pub mod session;
pub mod types;
pub mod validation;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use error::{CoreError, CoreResult, ValidationError};
pub use money::{Money, Quantity};
pub use types::*;

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Maximum length of free-text notes and references.
pub const MAX_NOTES_LENGTH: usize = 1000;

/// Maximum entries in one list input (delivery ids, session items,
/// reconciliation updates, allocations).
pub const MAX_LIST_INPUT: usize = 500;
