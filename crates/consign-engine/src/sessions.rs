//! # Consignment Sessions
//!
//! Goods placed with a vendor, reconciled as they sell, and finally turned
//! into a claim.
//!
//! ```text
//! create_session ──► open ──submit──► submitted
//!                     │                   │
//!                     └─── reconcile ─────┤   (any number of times)
//!                                         ▼
//!                            generate_claim ──► claimed ──close──► closed
//! ```
//!
//! Pricing is frozen when the session is created; reconciling only moves
//! quantities. Every state change is written to the session history.

use std::collections::HashMap;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use consign_core::claim::ClaimTotals;
use consign_core::money::Quantity;
use consign_core::numbering::{claim_number, daily_prefix, session_reference, CLAIM_PREFIX, SESSION_PREFIX};
use consign_core::session::{
    check_reconcile, ensure_reconcilable, item_total_value, price_item, session_claim_lines, session_transition,
    Commission, SessionAction, SessionMetrics, SessionTotals,
};
use consign_core::validation::{validate_not_empty, validate_notes, validate_positive_quantity};
use consign_core::{
    Claim, ClaimDetail, ClaimSource, ClaimStatus, ConsignmentItem, ConsignmentSession, HistoryEventType, OwnerId,
    SessionHistoryEntry, SessionStatus,
};
use consign_db::{DbError, DbTransaction};

use crate::claims::{claim_items_from_drafts, load_claim_detail};
use crate::error::EngineResult;
use crate::events::SettlementEvent;
use crate::locks::{numbering_key, session_key};
use crate::{stage, SettlementEngine};

// =============================================================================
// Requests & Responses
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionItemInput {
    pub product_id: String,
    pub quantity: Quantity,
    pub commission: Commission,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSessionRequest {
    pub vendor_id: String,
    #[serde(default)]
    pub note: Option<String>,
    pub items: Vec<SessionItemInput>,
}

/// New sold/returned counts for one item.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconcileUpdate {
    pub item_id: String,
    pub qty_sold: Quantity,
    pub qty_returned: Quantity,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconcileRequest {
    pub updates: Vec<ReconcileUpdate>,
}

/// A session as shown to the operator.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionDetail {
    pub session: ConsignmentSession,
    pub vendor_name: String,
    pub items: Vec<ConsignmentItem>,
    pub metrics: SessionMetrics,
}

/// Result of [`SettlementEngine::generate_claim`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneratedClaim {
    pub claim: Claim,
    /// `false` when the session had already been claimed.
    pub created: bool,
}

// =============================================================================
// Operations
// =============================================================================

impl SettlementEngine {
    /// Opens a session, pricing every item from its product's sale price.
    #[instrument(skip(self, request), fields(owner = %owner, vendor_id = %request.vendor_id))]
    pub async fn create_session(&self, owner: &OwnerId, request: CreateSessionRequest) -> EngineResult<SessionDetail> {
        validate_not_empty("items", &request.items)?;
        let note = validate_notes("note", request.note.as_deref())?;
        for item in &request.items {
            validate_positive_quantity("quantity", item.quantity)?;
            item.commission.validate()?;
        }

        let _locks = self.locks.acquire([numbering_key(owner, SESSION_PREFIX)]).await;
        let mut tx = self.db.begin().await?;

        let vendor = tx.vendors().require(owner, &request.vendor_id).await?;

        let product_ids: Vec<String> = request.items.iter().map(|i| i.product_id.clone()).collect();
        let products: HashMap<String, _> = tx
            .products()
            .get_many(owner, &product_ids)
            .await?
            .into_iter()
            .map(|p| (p.id.clone(), p))
            .collect();

        let now = Utc::now();
        let today = now.date_naive();
        let sequence = tx
            .sessions()
            .count_references_with_prefix(owner, &daily_prefix(SESSION_PREFIX, today))
            .await?
            + 1;
        let session_id = Uuid::new_v4().to_string();

        let mut items = Vec::with_capacity(request.items.len());
        for (position, input) in request.items.iter().enumerate() {
            let product = products
                .get(&input.product_id)
                .ok_or_else(|| DbError::not_found("Product", input.product_id.as_str()))?;
            let pricing = price_item(&product.id, product.sale_price(), input.commission)?;

            items.push(ConsignmentItem {
                id: Uuid::new_v4().to_string(),
                session_id: session_id.clone(),
                product_id: product.id.clone(),
                product_name: product.name.clone(),
                qty_sent_milli: input.quantity.milli(),
                qty_sold_milli: 0,
                qty_returned_milli: 0,
                list_price_cents: pricing.list_price.cents(),
                unit_price_cents: pricing.unit_price.cents(),
                commission_type: input.commission.commission_type(),
                commission_rate_bps: input.commission.rate_bps(),
                commission_amount_cents: pricing.commission_per_unit.cents(),
                total_value_cents: item_total_value(input.quantity, pricing.unit_price).cents(),
                position: position as i64,
                created_at: now,
                updated_at: now,
            });
        }

        let totals = SessionTotals::from_items(&items);
        let session = ConsignmentSession {
            id: session_id,
            owner_id: owner.as_str().to_string(),
            vendor_id: vendor.id.clone(),
            reference: session_reference(today, sequence as u32),
            status: SessionStatus::Open,
            note,
            total_items_milli: totals.total_items.milli(),
            total_value_cents: totals.total_value.cents(),
            created_at: now,
            updated_at: now,
        };

        tx.sessions().insert_session(&session).await?;
        for item in &items {
            tx.sessions().insert_item(item).await?;
        }

        tx.history()
            .record(
                owner,
                &session.id,
                HistoryEventType::SessionCreated,
                &json!({
                    "reference": session.reference,
                    "items": items.len(),
                    "totalItemsMilli": session.total_items_milli,
                    "totalValueCents": session.total_value_cents,
                }),
            )
            .await?;

        let mut staged = Vec::new();
        stage(
            &mut tx,
            owner,
            SettlementEvent::SessionCreated {
                session_id: session.id.clone(),
                vendor_id: vendor.id.clone(),
                reference: session.reference.clone(),
                total_items_milli: session.total_items_milli,
                total_value_cents: session.total_value_cents,
            },
            &mut staged,
        )
        .await?;

        tx.commit().await?;
        self.dispatch(staged).await;

        info!(
            session_id = %session.id,
            reference = %session.reference,
            items = items.len(),
            total_value = session.total_value_cents,
            "Session created"
        );

        let metrics = SessionMetrics::from_items(&items);
        Ok(SessionDetail {
            session,
            vendor_name: vendor.name,
            items,
            metrics,
        })
    }

    /// Records sold and returned counts. Every update is checked before any
    /// is written.
    #[instrument(skip(self, request), fields(owner = %owner, updates = request.updates.len()))]
    pub async fn reconcile(
        &self,
        owner: &OwnerId,
        session_id: &str,
        request: ReconcileRequest,
    ) -> EngineResult<SessionDetail> {
        validate_not_empty("updates", &request.updates)?;

        let _locks = self.locks.acquire([session_key(owner, session_id)]).await;
        let mut tx = self.db.begin().await?;

        let session = tx.sessions().require(owner, session_id).await?;
        if let Err(e) = ensure_reconcilable(&session) {
            warn!(session_id = %session_id, status = %session.status, "Session can no longer be reconciled");
            return Err(e.into());
        }

        let mut items = tx.sessions().items(owner, session_id).await?;
        let index: HashMap<String, usize> = items
            .iter()
            .enumerate()
            .map(|(i, item)| (item.id.clone(), i))
            .collect();

        let mut targets = Vec::with_capacity(request.updates.len());
        for update in &request.updates {
            let i = *index
                .get(&update.item_id)
                .ok_or_else(|| DbError::not_found("Consignment item", update.item_id.as_str()))?;
            check_reconcile(&items[i], update.qty_sold, update.qty_returned)?;
            targets.push(i);
        }

        let now = Utc::now();
        for (update, i) in request.updates.iter().zip(targets) {
            tx.sessions()
                .update_item_quantities(owner, &update.item_id, update.qty_sold, update.qty_returned, now)
                .await?;
            items[i].qty_sold_milli = update.qty_sold.milli();
            items[i].qty_returned_milli = update.qty_returned.milli();
            items[i].updated_at = now;
        }

        let totals = SessionTotals::from_items(&items);
        tx.sessions().update_totals(owner, session_id, &totals, now).await?;

        tx.history()
            .record(
                owner,
                session_id,
                HistoryEventType::SessionReconciled,
                &json!({
                    "updates": request
                        .updates
                        .iter()
                        .map(|u| json!({
                            "itemId": u.item_id,
                            "qtySoldMilli": u.qty_sold.milli(),
                            "qtyReturnedMilli": u.qty_returned.milli(),
                        }))
                        .collect::<Vec<_>>(),
                }),
            )
            .await?;

        let mut staged = Vec::new();
        stage(
            &mut tx,
            owner,
            SettlementEvent::SessionReconciled {
                session_id: session_id.to_string(),
                updated_items: request.updates.len(),
                total_value_cents: totals.total_value.cents(),
            },
            &mut staged,
        )
        .await?;

        let detail = load_session_detail(&mut tx, owner, session_id).await?;
        tx.commit().await?;
        self.dispatch(staged).await;

        info!(session_id = %session_id, updates = request.updates.len(), "Session reconciled");
        Ok(detail)
    }

    /// Turns a reconciled session into a submitted claim.
    ///
    /// Idempotent: a session that already has a claim returns it unchanged
    /// with `created == false`.
    #[instrument(skip(self), fields(owner = %owner))]
    pub async fn generate_claim(&self, owner: &OwnerId, session_id: &str) -> EngineResult<GeneratedClaim> {
        let _locks = self
            .locks
            .acquire([session_key(owner, session_id), numbering_key(owner, CLAIM_PREFIX)])
            .await;
        let mut tx = self.db.begin().await?;

        let session = tx.sessions().require(owner, session_id).await?;
        if let Some(claim) = tx.claims().find_by_session(owner, session_id).await? {
            debug!(session_id = %session_id, claim_id = %claim.id, "Session already claimed");
            return Ok(GeneratedClaim { claim, created: false });
        }

        let items = tx.sessions().items(owner, session_id).await?;
        let lines = session_claim_lines(&items)?;
        let totals = ClaimTotals::from_drafts(&lines);

        let now = Utc::now();
        let today = now.date_naive();
        let sequence = tx
            .claims()
            .count_numbers_with_prefix(owner, &daily_prefix(CLAIM_PREFIX, today))
            .await?
            + 1;

        let claim = Claim {
            id: Uuid::new_v4().to_string(),
            owner_id: owner.as_str().to_string(),
            vendor_id: session.vendor_id.clone(),
            claim_number: claim_number(today, sequence as u32),
            claim_date: today,
            status: ClaimStatus::Submitted,
            source: ClaimSource::Session,
            session_id: Some(session.id.clone()),
            gross_amount_cents: totals.gross.cents(),
            commission_rate_bps: None,
            commission_amount_cents: totals.commission.cents(),
            net_amount_cents: totals.net.cents(),
            paid_amount_cents: 0,
            balance_amount_cents: totals.balance.cents(),
            notes: session.note.clone(),
            submitted_at: Some(now),
            approved_at: None,
            settled_at: None,
            created_at: now,
            updated_at: now,
        };

        tx.claims().insert_claim(&claim).await?;
        for item in claim_items_from_drafts(&claim.id, &lines, now) {
            tx.claims().insert_item(&item).await?;
        }
        tx.sessions()
            .set_status(owner, session_id, SessionStatus::Claimed, now)
            .await?;

        tx.history()
            .record(
                owner,
                session_id,
                HistoryEventType::ClaimGenerated,
                &json!({
                    "claimId": claim.id,
                    "claimNumber": claim.claim_number,
                    "soldValueCents": claim.gross_amount_cents,
                    "commissionCents": claim.commission_amount_cents,
                    "payoutCents": claim.net_amount_cents,
                }),
            )
            .await?;

        let mut staged = Vec::new();
        stage(
            &mut tx,
            owner,
            SettlementEvent::ClaimGenerated {
                claim_id: claim.id.clone(),
                session_id: session.id.clone(),
                vendor_id: claim.vendor_id.clone(),
                claim_number: claim.claim_number.clone(),
                net_amount_cents: claim.net_amount_cents,
            },
            &mut staged,
        )
        .await?;

        tx.commit().await?;
        self.dispatch(staged).await;

        info!(
            session_id = %session_id,
            claim_id = %claim.id,
            claim_number = %claim.claim_number,
            payout = claim.net_amount_cents,
            "Claim generated from session"
        );

        Ok(GeneratedClaim { claim, created: true })
    }

    pub async fn get_session(&self, owner: &OwnerId, session_id: &str) -> EngineResult<SessionDetail> {
        let mut tx = self.db.begin().await?;
        load_session_detail(&mut tx, owner, session_id).await
    }

    /// Newest first.
    pub async fn list_sessions(&self, owner: &OwnerId) -> EngineResult<Vec<ConsignmentSession>> {
        let mut tx = self.db.begin().await?;
        Ok(tx.sessions().list(owner).await?)
    }

    /// `open → submitted`.
    #[instrument(skip(self), fields(owner = %owner))]
    pub async fn submit_session(&self, owner: &OwnerId, session_id: &str) -> EngineResult<ConsignmentSession> {
        self.move_session(owner, session_id, SessionAction::Submit, HistoryEventType::SessionSubmitted)
            .await
    }

    /// `claimed → closed`.
    #[instrument(skip(self), fields(owner = %owner))]
    pub async fn close_session(&self, owner: &OwnerId, session_id: &str) -> EngineResult<ConsignmentSession> {
        self.move_session(owner, session_id, SessionAction::Close, HistoryEventType::SessionClosed)
            .await
    }

    /// Newest first.
    pub async fn session_history(&self, owner: &OwnerId, session_id: &str) -> EngineResult<Vec<SessionHistoryEntry>> {
        let mut tx = self.db.begin().await?;
        tx.sessions().require(owner, session_id).await?;
        Ok(tx.history().list(owner, session_id).await?)
    }

    /// The claim generated for a session.
    pub async fn get_session_claim(&self, owner: &OwnerId, session_id: &str) -> EngineResult<ClaimDetail> {
        let mut tx = self.db.begin().await?;
        tx.sessions().require(owner, session_id).await?;
        let claim = tx
            .claims()
            .find_by_session(owner, session_id)
            .await?
            .ok_or_else(|| DbError::not_found("Claim for session", session_id))?;
        load_claim_detail(&mut tx, owner, claim).await
    }

    async fn move_session(
        &self,
        owner: &OwnerId,
        session_id: &str,
        action: SessionAction,
        history: HistoryEventType,
    ) -> EngineResult<ConsignmentSession> {
        let _locks = self.locks.acquire([session_key(owner, session_id)]).await;
        let mut tx = self.db.begin().await?;

        let session = tx.sessions().require(owner, session_id).await?;
        let next = session_transition(&session.id, session.status, action)?;

        let now = Utc::now();
        tx.sessions().set_status(owner, session_id, next, now).await?;
        tx.history()
            .record(owner, session_id, history, &json!({ "from": session.status, "to": next }))
            .await?;

        let session = tx.sessions().require(owner, session_id).await?;
        tx.commit().await?;

        info!(session_id = %session_id, status = %session.status, "Session status changed");
        Ok(session)
    }
}

async fn load_session_detail(
    tx: &mut DbTransaction,
    owner: &OwnerId,
    session_id: &str,
) -> EngineResult<SessionDetail> {
    let session = tx.sessions().require(owner, session_id).await?;
    let vendor = tx.vendors().require(owner, &session.vendor_id).await?;
    let items = tx.sessions().items(owner, session_id).await?;
    let metrics = SessionMetrics::from_items(&items);

    Ok(SessionDetail {
        session,
        vendor_name: vendor.name,
        items,
        metrics,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::testing::Harness;
    use consign_core::types::CommissionRate;
    use consign_core::{Money, Product, Vendor};

    fn percent(pct: u32) -> Commission {
        Commission::Percent(CommissionRate::from_percent(pct))
    }

    fn item(product: &Product, units: i64, commission: Commission) -> SessionItemInput {
        SessionItemInput {
            product_id: product.id.clone(),
            quantity: Quantity::from_units(units),
            commission,
        }
    }

    fn reconcile_one(item_id: &str, sold: i64, returned: i64) -> ReconcileRequest {
        ReconcileRequest {
            updates: vec![ReconcileUpdate {
                item_id: item_id.to_string(),
                qty_sold: Quantity::from_units(sold),
                qty_returned: Quantity::from_units(returned),
            }],
        }
    }

    /// 10 units of a $20.00 product at 10% commission.
    async fn open_session(h: &Harness) -> (Vendor, SessionDetail) {
        let vendor = h.vendor(&h.owner, None).await;
        let scarf = h.product(&h.owner, "Wool Scarf", 2_000).await;
        let detail = h
            .engine
            .create_session(
                &h.owner,
                CreateSessionRequest {
                    vendor_id: vendor.id.clone(),
                    note: Some("Spring market".to_string()),
                    items: vec![item(&scarf, 10, percent(10))],
                },
            )
            .await
            .unwrap();
        (vendor, detail)
    }

    #[tokio::test]
    async fn test_create_session_prices_items() {
        let mut h = Harness::new().await;
        let (_, detail) = open_session(&h).await;

        assert_eq!(detail.session.status, SessionStatus::Open);
        assert!(detail.session.reference.starts_with("CONS-"));
        assert!(detail.session.reference.ends_with("-001"));

        let line = &detail.items[0];
        assert_eq!(line.list_price_cents, 2_000);
        assert_eq!(line.commission_amount_cents, 200);
        assert_eq!(line.unit_price_cents, 1_800);
        assert_eq!(line.total_value_cents, 18_000);
        assert_eq!(detail.session.total_items_milli, 10_000);
        assert_eq!(detail.session.total_value_cents, 18_000);
        assert_eq!(detail.metrics.gross_potential, Money::from_cents(20_000));

        assert_eq!(h.drain_topics(), vec!["consignment-session-created"]);
    }

    #[tokio::test]
    async fn test_create_session_rejections() {
        let h = Harness::new().await;
        let vendor = h.vendor(&h.owner, None).await;
        let cheap = h.product(&h.owner, "Pin", 100).await;
        let free = h.product(&h.owner, "Sticker", 0).await;

        let attempt = |items: Vec<SessionItemInput>| CreateSessionRequest {
            vendor_id: vendor.id.clone(),
            note: None,
            items,
        };

        let err = h.engine.create_session(&h.owner, attempt(vec![])).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidArgument);

        let err = h
            .engine
            .create_session(&h.owner, attempt(vec![item(&cheap, 0, percent(10))]))
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidArgument);

        let err = h
            .engine
            .create_session(&h.owner, attempt(vec![item(&cheap, 1, percent(101))]))
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidArgument);

        let err = h
            .engine
            .create_session(&h.owner, attempt(vec![item(&cheap, 1, Commission::Fixed(Money::from_cents(150)))]))
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidArgument);

        let err = h
            .engine
            .create_session(&h.owner, attempt(vec![item(&free, 1, percent(10))]))
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::FailedPrecondition);

        let mut ghost = item(&cheap, 1, percent(10));
        ghost.product_id = "no-such-product".to_string();
        let err = h.engine.create_session(&h.owner, attempt(vec![ghost])).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::NotFound);

        let stranger = OwnerId::new("owner-b");
        let err = h
            .engine
            .create_session(&stranger, attempt(vec![item(&cheap, 1, percent(10))]))
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::NotFound);

        assert!(h.engine.list_sessions(&h.owner).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_reconcile_validates_before_writing() {
        let h = Harness::new().await;
        let (_, detail) = open_session(&h).await;
        let item_id = detail.items[0].id.clone();

        let request = ReconcileRequest {
            updates: vec![
                ReconcileUpdate {
                    item_id: item_id.clone(),
                    qty_sold: Quantity::from_units(4),
                    qty_returned: Quantity::zero(),
                },
                ReconcileUpdate {
                    item_id: "no-such-item".to_string(),
                    qty_sold: Quantity::from_units(1),
                    qty_returned: Quantity::zero(),
                },
            ],
        };
        let err = h.engine.reconcile(&h.owner, &detail.session.id, request).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::NotFound);

        let err = h
            .engine
            .reconcile(&h.owner, &detail.session.id, reconcile_one(&item_id, 8, 3))
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidArgument);

        let err = h
            .engine
            .reconcile(&h.owner, &detail.session.id, reconcile_one(&item_id, -1, 0))
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidArgument);

        let unchanged = h.engine.get_session(&h.owner, &detail.session.id).await.unwrap();
        assert_eq!(unchanged.items[0].qty_sold_milli, 0);
    }

    #[tokio::test]
    async fn test_reconcile_at_i64_edge() {
        let h = Harness::new().await;
        let (_, detail) = open_session(&h).await;
        let item_id = detail.items[0].id.clone();

        for (sold, returned) in [(i64::MAX, 1_000), (1_000, i64::MAX), (i64::MAX, i64::MAX)] {
            let request = ReconcileRequest {
                updates: vec![ReconcileUpdate {
                    item_id: item_id.clone(),
                    qty_sold: Quantity::from_milli(sold),
                    qty_returned: Quantity::from_milli(returned),
                }],
            };
            let err = h.engine.reconcile(&h.owner, &detail.session.id, request).await.unwrap_err();
            assert_eq!(err.kind, ErrorKind::InvalidArgument);
        }

        let unchanged = h.engine.get_session(&h.owner, &detail.session.id).await.unwrap();
        assert_eq!(unchanged.items[0].qty_sold_milli, 0);
        assert_eq!(unchanged.items[0].qty_returned_milli, 0);
    }

    #[tokio::test]
    async fn test_create_session_rejects_oversized_quantity() {
        let h = Harness::new().await;
        let vendor = h.vendor(&h.owner, None).await;
        let scarf = h.product(&h.owner, "Wool Scarf", 2_000).await;

        let mut huge = item(&scarf, 1, percent(10));
        huge.quantity = Quantity::from_milli(i64::MAX);
        let err = h
            .engine
            .create_session(
                &h.owner,
                CreateSessionRequest {
                    vendor_id: vendor.id.clone(),
                    note: None,
                    items: vec![huge],
                },
            )
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidArgument);
        assert!(h.engine.list_sessions(&h.owner).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_reconcile_and_generate_claim() {
        let mut h = Harness::new().await;
        let (_, detail) = open_session(&h).await;
        let session_id = detail.session.id.clone();

        let reconciled = h
            .engine
            .reconcile(&h.owner, &session_id, reconcile_one(&detail.items[0].id, 7, 3))
            .await
            .unwrap();
        assert_eq!(reconciled.session.status, SessionStatus::Open);
        assert_eq!(reconciled.metrics.gross_sold, Money::from_cents(14_000));
        assert_eq!(reconciled.metrics.total_payout, Money::from_cents(12_600));
        assert_eq!(reconciled.metrics.remaining_qty, Quantity::zero());

        let generated = h.engine.generate_claim(&h.owner, &session_id).await.unwrap();
        assert!(generated.created);
        let claim = &generated.claim;
        assert_eq!(claim.status, ClaimStatus::Submitted);
        assert_eq!(claim.source, ClaimSource::Session);
        assert_eq!(claim.gross_amount_cents, 14_000);
        assert_eq!(claim.commission_amount_cents, 1_400);
        assert_eq!(claim.net_amount_cents, 12_600);
        assert_eq!(claim.balance_amount_cents, 12_600);

        let session = h.engine.get_session(&h.owner, &session_id).await.unwrap();
        assert_eq!(session.session.status, SessionStatus::Claimed);

        let again = h.engine.generate_claim(&h.owner, &session_id).await.unwrap();
        assert!(!again.created);
        assert_eq!(again.claim.id, claim.id);
        assert_eq!(again.claim.claim_number, claim.claim_number);

        let err = h
            .engine
            .reconcile(&h.owner, &session_id, reconcile_one(&detail.items[0].id, 8, 2))
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::FailedPrecondition);

        let from_session = h.engine.get_session_claim(&h.owner, &session_id).await.unwrap();
        assert_eq!(from_session.claim.id, claim.id);
        assert_eq!(from_session.items.len(), 1);
        assert_eq!(from_session.items[0].item.quantity_unsold_milli, 3_000);
        assert!(from_session.items[0].delivery_number.is_none());

        assert_eq!(
            h.drain_topics(),
            vec![
                "consignment-session-created",
                "consignment-session-reconciled",
                "consignment-claim-generated",
            ]
        );
    }

    #[tokio::test]
    async fn test_generate_claim_needs_sales() {
        let h = Harness::new().await;
        let (_, detail) = open_session(&h).await;

        let err = h.engine.generate_claim(&h.owner, &detail.session.id).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::FailedPrecondition);

        let err = h.engine.get_session_claim(&h.owner, &detail.session.id).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_status_transitions_and_history() {
        let h = Harness::new().await;
        let (_, detail) = open_session(&h).await;
        let session_id = detail.session.id.as_str();

        let err = h.engine.close_session(&h.owner, session_id).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::FailedPrecondition);

        let submitted = h.engine.submit_session(&h.owner, session_id).await.unwrap();
        assert_eq!(submitted.status, SessionStatus::Submitted);

        let err = h.engine.submit_session(&h.owner, session_id).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::FailedPrecondition);

        h.engine
            .reconcile(&h.owner, session_id, reconcile_one(&detail.items[0].id, 5, 0))
            .await
            .unwrap();
        h.engine.generate_claim(&h.owner, session_id).await.unwrap();

        let closed = h.engine.close_session(&h.owner, session_id).await.unwrap();
        assert_eq!(closed.status, SessionStatus::Closed);

        let history = h.engine.session_history(&h.owner, session_id).await.unwrap();
        let kinds: Vec<HistoryEventType> = history.iter().map(|e| e.event_type).collect();
        assert_eq!(kinds.len(), 5);
        assert_eq!(kinds[0], HistoryEventType::SessionClosed);
        assert_eq!(kinds[4], HistoryEventType::SessionCreated);
        assert!(kinds.contains(&HistoryEventType::ClaimGenerated));
    }
}
