//! # Repository Module
//!
//! Owner-scoped repositories over a single open transaction.
//!
//! ## Repository Pattern
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  engine ──► tx.claims().get(&owner, id) ──► SQL ──► Claim               │
//! │                                                                         │
//! │  • every method takes the OwnerId; rows owned by someone else are       │
//! │    invisible (child tables are joined to their owned parent)            │
//! │  • repositories borrow the transaction's connection, so everything      │
//! │    they write commits or rolls back together                            │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Available Repositories
//!
//! - [`VendorRepository`](vendor::VendorRepository) - Vendor lookup
//! - [`ProductRepository`](product::ProductRepository) - Product lookup
//! - [`DeliveryRepository`](delivery::DeliveryRepository) - Deliveries and reconciled items
//! - [`SessionRepository`](session::SessionRepository) - Consignment sessions and items
//! - [`HistoryRepository`](history::HistoryRepository) - Session history log
//! - [`ClaimRepository`](claim::ClaimRepository) - Claims, claim items, listings
//! - [`PaymentRepository`](payment::PaymentRepository) - Payments and allocations
//! - [`OutboxRepository`](outbox::OutboxRepository) - Event outbox

pub mod claim;
pub mod delivery;
pub mod history;
pub mod outbox;
pub mod payment;
pub mod product;
pub mod session;
pub mod vendor;

use sqlx::{QueryBuilder, Sqlite};

/// Appends `(?, ?, ...)` binding every id.
pub(crate) fn push_id_list(qb: &mut QueryBuilder<'_, Sqlite>, ids: &[String]) {
    qb.push("(");
    let mut separated = qb.separated(", ");
    for id in ids {
        separated.push_bind(id.clone());
    }
    separated.push_unseparated(")");
}
