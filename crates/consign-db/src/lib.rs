//! # consign-db: Database Layer for Consignment Settlement
//!
//! SQLite persistence for vendors, deliveries, consignment sessions, claims,
//! payments and the event outbox, built on sqlx.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Consign Data Flow                                  │
//! │                                                                         │
//! │  SettlementEngine (consign-engine)                                      │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐    │
//! │  │                    consign-db (THIS CRATE)                      │    │
//! │  │                                                                 │    │
//! │  │   ┌───────────────┐    ┌────────────────┐    ┌──────────────┐   │    │
//! │  │   │   Database    │    │  Repositories  │    │  Migrations  │   │    │
//! │  │   │   (pool.rs)   │    │  (owner-scoped)│    │  (embedded)  │   │    │
//! │  │   │               │    │                │    │              │   │    │
//! │  │   │ SqlitePool    │    │ ClaimRepo      │    │ 001_initial_ │   │    │
//! │  │   │ DbTransaction │◄───│ PaymentRepo    │    │   schema.sql │   │    │
//! │  │   │               │    │ SessionRepo .. │    │              │   │    │
//! │  │   └───────────────┘    └────────────────┘    └──────────────┘   │    │
//! │  │                                                                 │    │
//! │  └─────────────────────────────────────────────────────────────────┘    │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  SQLite database file (WAL)                                             │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`pool`] - Connection pool, configuration, transaction handles
//! - [`migrations`] - Embedded database migrations
//! - [`error`] - Database error types
//! - [`repository`] - Owner-scoped repositories
//!
//! ## Usage
//!
//! ```rust,ignore
//! use consign_db::{Database, DbConfig};
//!
//! let db = Database::new(DbConfig::new("consign.db")).await?;
//!
//! let mut tx = db.begin().await?;
//! let claim = tx.claims().require(&owner, &claim_id).await?;
//! tx.commit().await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod migrations;
pub mod pool;
pub mod repository;

// =============================================================================
// Re-exports
// =============================================================================

pub use error::{DbError, DbResult};
pub use pool::{Database, DbConfig, DbTransaction};

pub use repository::claim::{ClaimFilter, ClaimRepository};
pub use repository::delivery::DeliveryRepository;
pub use repository::history::HistoryRepository;
pub use repository::outbox::OutboxRepository;
pub use repository::payment::{PaymentFilter, PaymentRepository};
pub use repository::product::ProductRepository;
pub use repository::session::SessionRepository;
pub use repository::vendor::VendorRepository;
