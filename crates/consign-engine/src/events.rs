//! # Settlement Events
//!
//! Milestone events and the publishers that carry them out of the engine.
//!
//! ## Delivery Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  operation tx:  state change + outbox.enqueue(event)  ──► COMMIT        │
//! │                                                                         │
//! │  after commit:  publisher.publish(&envelope)                            │
//! │                      │                                                  │
//! │            ┌─────────┴──────────┐                                       │
//! │            ▼                    ▼                                       │
//! │     mark_published        mark_failed (attempts += 1)                   │
//! │                                 │                                       │
//! │                                 ▼                                       │
//! │                     flush_outbox() replays it later                     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Delivery is at-least-once. Every envelope carries an `event_id` (also the
//! outbox row id) that consumers use to drop duplicates.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::info;
use uuid::Uuid;

use consign_core::{AllocationState, OutboxEntry, OwnerId, PaymentMethod};

// =============================================================================
// Events
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SettlementEvent {
    SessionCreated {
        session_id: String,
        vendor_id: String,
        reference: String,
        total_items_milli: i64,
        total_value_cents: i64,
    },
    SessionReconciled {
        session_id: String,
        updated_items: usize,
        total_value_cents: i64,
    },
    ClaimGenerated {
        claim_id: String,
        session_id: String,
        vendor_id: String,
        claim_number: String,
        net_amount_cents: i64,
    },
    ClaimCreated {
        claim_id: String,
        vendor_id: String,
        claim_number: String,
        delivery_ids: Vec<String>,
        net_amount_cents: i64,
    },
    ClaimSubmitted {
        claim_id: String,
    },
    ClaimApproved {
        claim_id: String,
        balance_amount_cents: i64,
    },
    ClaimRejected {
        claim_id: String,
        reason: String,
    },
    ClaimSettled {
        claim_id: String,
        paid_amount_cents: i64,
    },
    PaymentRecorded {
        payment_id: String,
        vendor_id: String,
        payment_number: String,
        method: PaymentMethod,
        total_amount_cents: i64,
        allocation_state: AllocationState,
    },
    PaymentAllocated {
        payment_id: String,
        claim_ids: Vec<String>,
        allocated_amount_cents: i64,
    },
}

impl SettlementEvent {
    /// Topic the event is published on.
    pub const fn topic(&self) -> &'static str {
        match self {
            SettlementEvent::SessionCreated { .. } => "consignment-session-created",
            SettlementEvent::SessionReconciled { .. } => "consignment-session-reconciled",
            SettlementEvent::ClaimGenerated { .. } => "consignment-claim-generated",
            SettlementEvent::ClaimCreated { .. } => "consignment-claim-created",
            SettlementEvent::ClaimSubmitted { .. } => "consignment-claim-submitted",
            SettlementEvent::ClaimApproved { .. } => "consignment-claim-approved",
            SettlementEvent::ClaimRejected { .. } => "consignment-claim-rejected",
            SettlementEvent::ClaimSettled { .. } => "consignment-claim-settled",
            SettlementEvent::PaymentRecorded { .. } => "consignment-payment-recorded",
            SettlementEvent::PaymentAllocated { .. } => "consignment-payment-allocated",
        }
    }

    /// Id of the session, claim or payment the event is about.
    pub fn aggregate_id(&self) -> &str {
        match self {
            SettlementEvent::SessionCreated { session_id, .. }
            | SettlementEvent::SessionReconciled { session_id, .. } => session_id,
            SettlementEvent::ClaimGenerated { claim_id, .. }
            | SettlementEvent::ClaimCreated { claim_id, .. }
            | SettlementEvent::ClaimSubmitted { claim_id }
            | SettlementEvent::ClaimApproved { claim_id, .. }
            | SettlementEvent::ClaimRejected { claim_id, .. }
            | SettlementEvent::ClaimSettled { claim_id, .. } => claim_id,
            SettlementEvent::PaymentRecorded { payment_id, .. }
            | SettlementEvent::PaymentAllocated { payment_id, .. } => payment_id,
        }
    }
}

/// An event with the metadata consumers need.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventEnvelope {
    pub event_id: String,
    pub owner_id: String,
    pub topic: String,
    pub aggregate_id: String,
    pub occurred_at: DateTime<Utc>,
    pub event: SettlementEvent,
}

impl EventEnvelope {
    pub fn new(owner: &OwnerId, event: SettlementEvent) -> Self {
        EventEnvelope {
            event_id: Uuid::new_v4().to_string(),
            owner_id: owner.as_str().to_string(),
            topic: event.topic().to_string(),
            aggregate_id: event.aggregate_id().to_string(),
            occurred_at: Utc::now(),
            event,
        }
    }

    /// Rebuilds the envelope stored in an outbox row.
    pub fn from_outbox(entry: &OutboxEntry) -> Result<Self, serde_json::Error> {
        Ok(EventEnvelope {
            event_id: entry.id.clone(),
            owner_id: entry.owner_id.clone(),
            topic: entry.topic.clone(),
            aggregate_id: entry.aggregate_id.clone(),
            occurred_at: entry.created_at,
            event: serde_json::from_str(&entry.payload)?,
        })
    }
}

// =============================================================================
// Publishers
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PublishError {
    #[error("Event channel is full")]
    ChannelFull,

    #[error("Event channel is closed")]
    ChannelClosed,

    #[error("Publisher rejected event: {0}")]
    Rejected(String),
}

/// Hands committed events to whatever transport the host wires in.
///
/// Called after commit, never while a transaction is open; must not block.
pub trait EventPublisher: Send + Sync {
    fn publish(&self, envelope: &EventEnvelope) -> Result<(), PublishError>;
}

/// Publishes onto a bounded tokio channel.
#[derive(Debug, Clone)]
pub struct ChannelPublisher {
    tx: mpsc::Sender<EventEnvelope>,
}

impl ChannelPublisher {
    /// Creates the publisher and the receiving end for the consumer.
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<EventEnvelope>) {
        let (tx, rx) = mpsc::channel(capacity);
        (ChannelPublisher { tx }, rx)
    }
}

impl EventPublisher for ChannelPublisher {
    fn publish(&self, envelope: &EventEnvelope) -> Result<(), PublishError> {
        self.tx.try_send(envelope.clone()).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => PublishError::ChannelFull,
            mpsc::error::TrySendError::Closed(_) => PublishError::ChannelClosed,
        })
    }
}

/// Only logs events. Useful when nothing consumes them.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogPublisher;

impl EventPublisher for LogPublisher {
    fn publish(&self, envelope: &EventEnvelope) -> Result<(), PublishError> {
        info!(
            event_id = %envelope.event_id,
            topic = %envelope.topic,
            aggregate_id = %envelope.aggregate_id,
            "Settlement event"
        );
        Ok(())
    }
}
