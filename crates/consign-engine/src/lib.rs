//! # consign-engine: Settlement Services
//!
//! Consignment sessions, vendor claims, payment allocation and outstanding
//! balances, on top of [`consign_core`] rules and [`consign_db`] storage.
//!
//! ## Operation Anatomy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  1. validate input                 (pure, no locks held)                │
//! │  2. acquire aggregate locks        (LockRegistry, sorted keys)          │
//! │  3. BEGIN                                                               │
//! │  4. read, check state, write       (owner-scoped repositories)          │
//! │  5. stage events in the outbox                                          │
//! │  6. COMMIT                         (any error before: rolled back)      │
//! │  7. publish staged events          (failures stay pending)              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`sessions`] - Session tracker and session claims
//! - [`claims`] - Delivery claims and the claim ledger
//! - [`payments`] - Payment recording and allocation
//! - [`balances`] - Outstanding vendor balance
//! - [`events`] - Settlement events and publishers
//! - [`locks`] - Per-aggregate lock registry
//! - [`config`] - Environment configuration
//! - [`error`] - Engine error type
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use consign_engine::{EngineConfig, LogPublisher, SettlementEngine};
//!
//! # async fn run() -> Result<(), consign_engine::EngineError> {
//! let config = EngineConfig::load()?;
//! let engine = SettlementEngine::connect(config, Arc::new(LogPublisher)).await?;
//! let pending = engine.flush_outbox(100).await?;
//! println!("replayed {} events", pending.published);
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info, warn};

use consign_core::validation::validate_limit;
use consign_core::OwnerId;
use consign_db::{Database, DbTransaction};

pub mod balances;
pub mod claims;
pub mod config;
pub mod error;
pub mod events;
pub mod locks;
pub mod payments;
pub mod sessions;

pub use claims::{CreateClaimRequest, ListClaimsRequest, RejectClaimRequest, UpdateItemQuantitiesRequest};
pub use config::{ConfigError, EngineConfig};
pub use error::{EngineError, EngineResult, ErrorKind};
pub use events::{ChannelPublisher, EventEnvelope, EventPublisher, LogPublisher, PublishError, SettlementEvent};
pub use locks::LockRegistry;
pub use payments::{AllocateRequest, CreatePaymentRequest, ListPaymentsRequest};
pub use sessions::{
    CreateSessionRequest, GeneratedClaim, ReconcileRequest, ReconcileUpdate, SessionDetail, SessionItemInput,
};

/// Outcome of an outbox replay.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FlushReport {
    pub published: usize,
    pub failed: usize,
}

/// Entry point for every settlement operation.
///
/// Cheap to clone; clones share the pool, the lock registry and the publisher.
#[derive(Clone)]
pub struct SettlementEngine {
    db: Database,
    locks: LockRegistry,
    publisher: Arc<dyn EventPublisher>,
    config: EngineConfig,
}

impl SettlementEngine {
    pub fn new(db: Database, config: EngineConfig, publisher: Arc<dyn EventPublisher>) -> EngineResult<Self> {
        config.validate()?;
        Ok(SettlementEngine {
            db,
            locks: LockRegistry::new(),
            publisher,
            config,
        })
    }

    /// Opens the configured database (running migrations) and builds the engine.
    pub async fn connect(config: EngineConfig, publisher: Arc<dyn EventPublisher>) -> EngineResult<Self> {
        config.validate()?;
        let db = Database::new(config.db_config()).await?;
        info!(path = %config.database_path.display(), "Settlement engine ready");
        SettlementEngine::new(db, config, publisher)
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Replays events whose hand-off failed or never happened.
    pub async fn flush_outbox(&self, limit: u32) -> EngineResult<FlushReport> {
        let mut tx = self.db.begin().await?;
        let pending = tx.outbox().get_pending(limit).await?;

        let mut report = FlushReport::default();
        for entry in &pending {
            let envelope = match EventEnvelope::from_outbox(entry) {
                Ok(envelope) => envelope,
                Err(e) => {
                    warn!(event_id = %entry.id, error = %e, "Unreadable outbox payload");
                    tx.outbox().mark_failed(&entry.id, &e.to_string()).await?;
                    report.failed += 1;
                    continue;
                }
            };

            match self.publisher.publish(&envelope) {
                Ok(()) => {
                    tx.outbox().mark_published(&entry.id).await?;
                    report.published += 1;
                }
                Err(e) => {
                    warn!(event_id = %entry.id, topic = %entry.topic, error = %e, "Event replay failed");
                    tx.outbox().mark_failed(&entry.id, &e.to_string()).await?;
                    report.failed += 1;
                }
            }
        }

        tx.commit().await?;

        if !pending.is_empty() {
            info!(published = report.published, failed = report.failed, "Outbox flushed");
        }
        Ok(report)
    }

    /// Number of events not yet handed to the publisher.
    pub async fn pending_events(&self) -> EngineResult<i64> {
        let mut tx = self.db.begin().await?;
        Ok(tx.outbox().count_pending().await?)
    }

    /// Deletes published events older than `days_old` days.
    pub async fn purge_published_events(&self, days_old: u32) -> EngineResult<u64> {
        let mut tx = self.db.begin().await?;
        let removed = tx.outbox().cleanup_old_entries(days_old).await?;
        tx.commit().await?;
        Ok(removed)
    }

    // =========================================================================
    // Shared Plumbing
    // =========================================================================

    /// Hands committed events to the publisher and records the outcome.
    ///
    /// The operation already succeeded; failures here are only logged and the
    /// events stay pending for [`flush_outbox`](Self::flush_outbox).
    pub(crate) async fn dispatch(&self, envelopes: Vec<EventEnvelope>) {
        if envelopes.is_empty() {
            return;
        }

        let mut tx = match self.db.begin().await {
            Ok(tx) => tx,
            Err(e) => {
                warn!(error = %e, "Could not record event delivery");
                return;
            }
        };

        for envelope in &envelopes {
            let outcome = match self.publisher.publish(envelope) {
                Ok(()) => tx.outbox().mark_published(&envelope.event_id).await,
                Err(e) => {
                    warn!(event_id = %envelope.event_id, topic = %envelope.topic, error = %e, "Event hand-off failed");
                    tx.outbox().mark_failed(&envelope.event_id, &e.to_string()).await
                }
            };
            if let Err(e) = outcome {
                warn!(event_id = %envelope.event_id, error = %e, "Could not record event delivery");
            }
        }

        if let Err(e) = tx.commit().await {
            warn!(error = %e, "Could not record event delivery");
        }
    }

    /// Resolves a requested page size: default when absent, capped at the
    /// configured maximum, zero rejected.
    pub(crate) fn page_limit(&self, requested: Option<u32>) -> EngineResult<u32> {
        let limit = requested
            .unwrap_or(self.config.default_page_size)
            .min(self.config.max_page_size);
        validate_limit(limit, self.config.max_page_size)?;
        Ok(limit)
    }
}

/// Writes an event to the outbox inside the operation's transaction.
pub(crate) async fn stage(
    tx: &mut DbTransaction,
    owner: &OwnerId,
    event: SettlementEvent,
    staged: &mut Vec<EventEnvelope>,
) -> EngineResult<()> {
    let envelope = EventEnvelope::new(owner, event);
    let payload = serde_json::to_string(&envelope.event)?;
    tx.outbox()
        .enqueue(owner, &envelope.event_id, &envelope.topic, &envelope.aggregate_id, &payload)
        .await?;
    debug!(topic = %envelope.topic, aggregate_id = %envelope.aggregate_id, "Event staged");
    staged.push(envelope);
    Ok(())
}

/// `offset + returned < total`.
pub(crate) fn has_more(offset: u32, returned: usize, total: i64) -> bool {
    (offset as i64 + returned as i64) < total
}

#[cfg(test)]
pub(crate) mod testing {
    //! Fixtures shared by the engine's unit tests.

    use std::sync::Arc;

    use chrono::{NaiveDate, Utc};
    use tokio::sync::mpsc;
    use uuid::Uuid;

    use consign_core::money::Quantity;
    use consign_core::{Delivery, DeliveryItem, OwnerId, Product, ReconciledQuantities, Vendor};
    use consign_db::{Database, DbConfig};

    use crate::events::{ChannelPublisher, EventEnvelope};
    use crate::{EngineConfig, SettlementEngine};

    pub struct Harness {
        pub engine: SettlementEngine,
        pub events: mpsc::Receiver<EventEnvelope>,
        pub owner: OwnerId,
    }

    impl Harness {
        pub async fn new() -> Self {
            let db = Database::new(DbConfig::in_memory()).await.unwrap();
            let (publisher, events) = ChannelPublisher::channel(64);
            let engine = SettlementEngine::new(db, EngineConfig::default(), Arc::new(publisher)).unwrap();
            Harness {
                engine,
                events,
                owner: OwnerId::new("owner-a"),
            }
        }

        /// Topics received so far, in order.
        pub fn drain_topics(&mut self) -> Vec<String> {
            let mut topics = Vec::new();
            while let Ok(envelope) = self.events.try_recv() {
                topics.push(envelope.topic);
            }
            topics
        }

        pub async fn vendor(&self, owner: &OwnerId, rate_bps: Option<u32>) -> Vendor {
            let vendor = Vendor {
                id: Uuid::new_v4().to_string(),
                owner_id: owner.as_str().to_string(),
                name: "Corner Deli".to_string(),
                commission_rate_bps: rate_bps,
                created_at: Utc::now(),
            };
            let mut tx = self.engine.database().begin().await.unwrap();
            tx.vendors().insert(&vendor).await.unwrap();
            tx.commit().await.unwrap();
            vendor
        }

        pub async fn product(&self, owner: &OwnerId, name: &str, price_cents: i64) -> Product {
            let product = Product {
                id: Uuid::new_v4().to_string(),
                owner_id: owner.as_str().to_string(),
                name: name.to_string(),
                sale_price_cents: price_cents,
                created_at: Utc::now(),
            };
            let mut tx = self.engine.database().begin().await.unwrap();
            tx.products().insert(&product).await.unwrap();
            tx.commit().await.unwrap();
            product
        }

        /// A delivery with one reconciled line per `(product, price, quantities)`.
        pub async fn delivery(
            &self,
            vendor: &Vendor,
            number: &str,
            lines: &[(&Product, i64, ReconciledQuantities)],
        ) -> Delivery {
            let delivery = Delivery {
                id: Uuid::new_v4().to_string(),
                owner_id: vendor.owner_id.clone(),
                vendor_id: vendor.id.clone(),
                delivery_number: number.to_string(),
                delivery_date: NaiveDate::from_ymd_opt(2024, 3, 10).unwrap(),
                created_at: Utc::now(),
            };
            let owner = OwnerId::new(vendor.owner_id.clone());

            let mut tx = self.engine.database().begin().await.unwrap();
            tx.deliveries().insert_delivery(&delivery).await.unwrap();
            for (position, (product, price, quantities)) in lines.iter().enumerate() {
                let item = DeliveryItem {
                    id: Uuid::new_v4().to_string(),
                    delivery_id: delivery.id.clone(),
                    product_id: product.id.clone(),
                    product_name: product.name.clone(),
                    unit_price_cents: *price,
                    quantity_delivered_milli: quantities.delivered.milli(),
                    quantity_sold_milli: None,
                    quantity_unsold_milli: None,
                    quantity_expired_milli: None,
                    quantity_damaged_milli: None,
                };
                tx.deliveries().insert_item(&item, position as i64).await.unwrap();
                tx.deliveries()
                    .record_reconciliation(&owner, &item.id, quantities)
                    .await
                    .unwrap();
            }
            tx.commit().await.unwrap();
            delivery
        }
    }

    pub fn qty(delivered: i64, sold: i64, unsold: i64, expired: i64, damaged: i64) -> ReconciledQuantities {
        ReconciledQuantities {
            delivered: Quantity::from_units(delivered),
            sold: Quantity::from_units(sold),
            unsold: Quantity::from_units(unsold),
            expired: Quantity::from_units(expired),
            damaged: Quantity::from_units(damaged),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::Harness;

    #[tokio::test]
    async fn test_page_limit() {
        let h = Harness::new().await;
        assert_eq!(h.engine.page_limit(None).unwrap(), 20);
        assert_eq!(h.engine.page_limit(Some(5)).unwrap(), 5);
        assert_eq!(h.engine.page_limit(Some(10_000)).unwrap(), 100);
        assert_eq!(h.engine.page_limit(Some(0)).unwrap_err().kind, ErrorKind::InvalidArgument);
    }

    #[test]
    fn test_has_more() {
        assert!(has_more(0, 20, 21));
        assert!(!has_more(20, 1, 21));
        assert!(!has_more(0, 0, 0));
    }

    #[tokio::test]
    async fn test_rejects_inconsistent_config() {
        let db = Database::new(consign_db::DbConfig::in_memory()).await.unwrap();
        let config = EngineConfig {
            default_page_size: 500,
            ..EngineConfig::default()
        };
        let err = SettlementEngine::new(db, config, Arc::new(LogPublisher)).err().unwrap();
        assert_eq!(err.kind, ErrorKind::Internal);
    }

    #[tokio::test]
    async fn test_flush_replays_failed_events() {
        let db = Database::new(consign_db::DbConfig::in_memory()).await.unwrap();
        let (publisher, rx) = ChannelPublisher::channel(4);
        let engine = SettlementEngine::new(db, EngineConfig::default(), Arc::new(publisher)).unwrap();
        let owner = OwnerId::new("owner-a");

        // Stage and commit without dispatching, as if the process died after commit.
        let mut staged = Vec::new();
        let mut tx = engine.database().begin().await.unwrap();
        stage(
            &mut tx,
            &owner,
            SettlementEvent::ClaimSubmitted {
                claim_id: "c-1".to_string(),
            },
            &mut staged,
        )
        .await
        .unwrap();
        tx.commit().await.unwrap();
        assert_eq!(engine.pending_events().await.unwrap(), 1);

        drop(rx);
        let report = engine.flush_outbox(10).await.unwrap();
        assert_eq!(report, FlushReport { published: 0, failed: 1 });
        assert_eq!(engine.pending_events().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_flush_publishes_pending() {
        let mut h = Harness::new().await;
        let mut staged = Vec::new();
        let mut tx = h.engine.database().begin().await.unwrap();
        stage(
            &mut tx,
            &h.owner,
            SettlementEvent::ClaimSubmitted {
                claim_id: "c-1".to_string(),
            },
            &mut staged,
        )
        .await
        .unwrap();
        tx.commit().await.unwrap();

        let report = h.engine.flush_outbox(10).await.unwrap();
        assert_eq!(report.published, 1);
        assert_eq!(h.engine.pending_events().await.unwrap(), 0);

        let envelope = h.events.try_recv().unwrap();
        assert_eq!(envelope.event_id, staged[0].event_id);
    }

    #[tokio::test]
    async fn test_purge_keeps_recent_events() {
        let h = Harness::new().await;
        let mut staged = Vec::new();
        let mut tx = h.engine.database().begin().await.unwrap();
        stage(
            &mut tx,
            &h.owner,
            SettlementEvent::ClaimApproved {
                claim_id: "c-1".to_string(),
                balance_amount_cents: 500,
            },
            &mut staged,
        )
        .await
        .unwrap();
        tx.commit().await.unwrap();
        h.engine.dispatch(staged).await;

        assert_eq!(h.engine.purge_published_events(30).await.unwrap(), 0);

        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        assert_eq!(h.engine.purge_published_events(0).await.unwrap(), 1);
    }
}
