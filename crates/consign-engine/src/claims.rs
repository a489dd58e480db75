//! # Claim Ledger
//!
//! Delivery-based claims and the lifecycle shared by every claim.
//!
//! ## Lifecycle
//! ```text
//! create_claim ──► draft ──submit──► submitted ──approve──► approved
//!                    │                   │                      │ balance 0
//!                    └──────reject───────┴──► rejected          ▼
//!                                                            settled
//! ```
//!
//! Quantities can only be corrected while a claim is a draft. Paid and
//! balance amounts are never edited directly; [`recompute_claim`] derives
//! them from the recorded allocations.

use std::collections::{BTreeSet, HashMap};

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};
use uuid::Uuid;

use consign_core::allocation::{distribute_to_items, ItemCapacity, RecordedAllocation};
use consign_core::claim::{
    delivery_claim_lines, recompute_delivery_line, settlement_status, transition, ClaimAction, ClaimLineDraft,
    ClaimTotals, LineSource,
};
use consign_core::money::Quantity;
use consign_core::numbering::{claim_number, daily_prefix, CLAIM_PREFIX};
use consign_core::validation::{
    validate_date_range, validate_non_negative_quantity, validate_not_empty, validate_notes, validate_required,
};
use consign_core::{
    Claim, ClaimDetail, ClaimItem, ClaimLine, ClaimPage, ClaimSource, ClaimStatus, CoreError, OwnerId,
    ReconciledQuantities,
};
use consign_db::{ClaimFilter, DbError, DbTransaction};

use crate::error::EngineResult;
use crate::events::{EventEnvelope, SettlementEvent};
use crate::locks::{claim_key, numbering_key};
use crate::{has_more, stage, SettlementEngine};

// =============================================================================
// Requests
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateClaimRequest {
    pub vendor_id: String,
    pub delivery_ids: Vec<String>,
    pub claim_date: NaiveDate,
    #[serde(default)]
    pub notes: Option<String>,
}

/// Corrected quantities for one line of a draft claim.
///
/// The delivered quantity is fixed; the four parts must still add up to it.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateItemQuantitiesRequest {
    pub sold: Quantity,
    pub unsold: Quantity,
    pub expired: Quantity,
    pub damaged: Quantity,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RejectClaimRequest {
    pub reason: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListClaimsRequest {
    pub vendor_id: Option<String>,
    pub status: Option<ClaimStatus>,
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

// =============================================================================
// Operations
// =============================================================================

impl SettlementEngine {
    /// Creates a draft claim from reconciled deliveries of one vendor.
    #[instrument(skip(self, request), fields(owner = %owner, vendor_id = %request.vendor_id))]
    pub async fn create_claim(&self, owner: &OwnerId, request: CreateClaimRequest) -> EngineResult<ClaimDetail> {
        validate_not_empty("delivery_ids", &request.delivery_ids)?;
        let notes = validate_notes("notes", request.notes.as_deref())?;

        let delivery_ids: Vec<String> = request
            .delivery_ids
            .iter()
            .cloned()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        let _locks = self.locks.acquire([numbering_key(owner, CLAIM_PREFIX)]).await;
        let mut tx = self.db.begin().await?;

        let vendor = tx.vendors().require(owner, &request.vendor_id).await?;

        let deliveries = tx.deliveries().get_many(owner, &delivery_ids).await?;
        if let Some(missing) = delivery_ids
            .iter()
            .find(|id| !deliveries.iter().any(|d| &d.id == *id))
        {
            return Err(DbError::not_found("Delivery", missing.as_str()).into());
        }
        if let Some(foreign) = deliveries.iter().find(|d| d.vendor_id != vendor.id) {
            warn!(delivery_id = %foreign.id, "Delivery belongs to another vendor");
            return Err(CoreError::VendorMismatch {
                entity: "Delivery",
                id: foreign.id.clone(),
                vendor_id: vendor.id.clone(),
            }
            .into());
        }

        let delivery_items = tx.deliveries().items_for(owner, &delivery_ids).await?;
        let rate = vendor.commission_rate();
        let lines = delivery_claim_lines(&delivery_items, rate)?;
        let totals = ClaimTotals::from_drafts(&lines);

        let now = Utc::now();
        let sequence = tx
            .claims()
            .count_numbers_with_prefix(owner, &daily_prefix(CLAIM_PREFIX, request.claim_date))
            .await?
            + 1;

        let claim = Claim {
            id: Uuid::new_v4().to_string(),
            owner_id: owner.as_str().to_string(),
            vendor_id: vendor.id.clone(),
            claim_number: claim_number(request.claim_date, sequence as u32),
            claim_date: request.claim_date,
            status: ClaimStatus::Draft,
            source: ClaimSource::Delivery,
            session_id: None,
            gross_amount_cents: totals.gross.cents(),
            commission_rate_bps: Some(rate.bps()),
            commission_amount_cents: totals.commission.cents(),
            net_amount_cents: totals.net.cents(),
            paid_amount_cents: 0,
            balance_amount_cents: totals.balance.cents(),
            notes,
            submitted_at: None,
            approved_at: None,
            settled_at: None,
            created_at: now,
            updated_at: now,
        };

        tx.claims().insert_claim(&claim).await?;
        for delivery_id in &delivery_ids {
            tx.claims().link_delivery(&claim.id, delivery_id).await?;
        }
        for item in claim_items_from_drafts(&claim.id, &lines, now) {
            tx.claims().insert_item(&item).await?;
        }

        let mut staged = Vec::new();
        stage(
            &mut tx,
            owner,
            SettlementEvent::ClaimCreated {
                claim_id: claim.id.clone(),
                vendor_id: vendor.id.clone(),
                claim_number: claim.claim_number.clone(),
                delivery_ids: delivery_ids.clone(),
                net_amount_cents: claim.net_amount_cents,
            },
            &mut staged,
        )
        .await?;

        let detail = load_claim_detail(&mut tx, owner, claim).await?;
        tx.commit().await?;
        self.dispatch(staged).await;

        info!(
            claim_id = %detail.claim.id,
            claim_number = %detail.claim.claim_number,
            lines = detail.items.len(),
            gross = detail.claim.gross_amount().cents(),
            net = detail.claim.net_amount_cents,
            "Claim created"
        );

        Ok(detail)
    }

    /// Corrects the reconciled quantities of one line on a draft claim.
    #[instrument(skip(self, request), fields(owner = %owner))]
    pub async fn update_item_quantities(
        &self,
        owner: &OwnerId,
        claim_id: &str,
        item_id: &str,
        request: UpdateItemQuantitiesRequest,
    ) -> EngineResult<ClaimDetail> {
        validate_non_negative_quantity("sold", request.sold)?;
        validate_non_negative_quantity("unsold", request.unsold)?;
        validate_non_negative_quantity("expired", request.expired)?;
        validate_non_negative_quantity("damaged", request.damaged)?;

        let _locks = self.locks.acquire([claim_key(owner, claim_id)]).await;
        let mut tx = self.db.begin().await?;

        let claim = tx.claims().require(owner, claim_id).await?;
        transition(&claim.id, claim.status, ClaimAction::EditQuantities)?;

        let item = tx
            .claims()
            .get_item(owner, claim_id, item_id)
            .await?
            .ok_or_else(|| DbError::not_found("Claim item", item_id))?;

        let quantities = ReconciledQuantities {
            delivered: item.quantities().delivered,
            sold: request.sold,
            unsold: request.unsold,
            expired: request.expired,
            damaged: request.damaged,
        };
        let (amounts, balance) = recompute_delivery_line(&item, &quantities, claim.commission_rate())?;

        let now = Utc::now();
        tx.claims()
            .update_item_amounts(owner, item_id, &quantities, &amounts, balance, now)
            .await?;

        let mut staged = Vec::new();
        let claim = recompute_claim(&mut tx, owner, claim_id, now, &mut staged).await?;
        let detail = load_claim_detail(&mut tx, owner, claim).await?;
        tx.commit().await?;
        self.dispatch(staged).await;

        info!(claim_id = %claim_id, item_id = %item_id, net = detail.claim.net_amount_cents, "Claim item corrected");
        Ok(detail)
    }

    /// `draft → submitted`.
    #[instrument(skip(self), fields(owner = %owner))]
    pub async fn submit_claim(&self, owner: &OwnerId, claim_id: &str) -> EngineResult<Claim> {
        let _locks = self.locks.acquire([claim_key(owner, claim_id)]).await;
        let mut tx = self.db.begin().await?;

        let claim = tx.claims().require(owner, claim_id).await?;
        let next = transition(&claim.id, claim.status, ClaimAction::Submit)?;

        let now = Utc::now();
        tx.claims().set_status(owner, claim_id, next, now).await?;

        let mut staged = Vec::new();
        stage(
            &mut tx,
            owner,
            SettlementEvent::ClaimSubmitted {
                claim_id: claim.id.clone(),
            },
            &mut staged,
        )
        .await?;

        let claim = tx.claims().require(owner, claim_id).await?;
        tx.commit().await?;
        self.dispatch(staged).await;

        info!(claim_id = %claim_id, "Claim submitted");
        Ok(claim)
    }

    /// `submitted → approved`, or straight to settled when nothing is owed.
    #[instrument(skip(self), fields(owner = %owner))]
    pub async fn approve_claim(&self, owner: &OwnerId, claim_id: &str) -> EngineResult<Claim> {
        let _locks = self.locks.acquire([claim_key(owner, claim_id)]).await;
        let mut tx = self.db.begin().await?;

        let claim = tx.claims().require(owner, claim_id).await?;
        let approved = transition(&claim.id, claim.status, ClaimAction::Approve)?;

        let now = Utc::now();
        tx.claims().set_status(owner, claim_id, approved, now).await?;

        let mut staged = Vec::new();
        stage(
            &mut tx,
            owner,
            SettlementEvent::ClaimApproved {
                claim_id: claim.id.clone(),
                balance_amount_cents: claim.balance_amount_cents,
            },
            &mut staged,
        )
        .await?;

        // Partial payments may already have covered a submitted claim.
        if settlement_status(approved, claim.balance_amount()) == ClaimStatus::Settled {
            tx.claims().set_status(owner, claim_id, ClaimStatus::Settled, now).await?;
            stage(
                &mut tx,
                owner,
                SettlementEvent::ClaimSettled {
                    claim_id: claim.id.clone(),
                    paid_amount_cents: claim.paid_amount_cents,
                },
                &mut staged,
            )
            .await?;
        }

        let claim = tx.claims().require(owner, claim_id).await?;
        tx.commit().await?;
        self.dispatch(staged).await;

        info!(claim_id = %claim_id, status = %claim.status, balance = claim.balance_amount_cents, "Claim approved");
        Ok(claim)
    }

    /// Rejects a draft or submitted claim, recording the reason in its notes.
    #[instrument(skip(self, request), fields(owner = %owner))]
    pub async fn reject_claim(
        &self,
        owner: &OwnerId,
        claim_id: &str,
        request: RejectClaimRequest,
    ) -> EngineResult<Claim> {
        validate_required("reason", &request.reason)?;
        let reason = validate_notes("reason", Some(&request.reason))?.unwrap_or_default();

        let _locks = self.locks.acquire([claim_key(owner, claim_id)]).await;
        let mut tx = self.db.begin().await?;

        let claim = tx.claims().require(owner, claim_id).await?;
        let next = match transition(&claim.id, claim.status, ClaimAction::Reject) {
            Ok(next) => next,
            Err(e) => {
                warn!(claim_id = %claim_id, status = %claim.status, "Claim cannot be rejected");
                return Err(e.into());
            }
        };

        let now = Utc::now();
        tx.claims().set_status(owner, claim_id, next, now).await?;
        tx.claims().set_notes(owner, claim_id, Some(&reason), now).await?;

        let mut staged = Vec::new();
        stage(
            &mut tx,
            owner,
            SettlementEvent::ClaimRejected {
                claim_id: claim.id.clone(),
                reason: reason.clone(),
            },
            &mut staged,
        )
        .await?;

        let claim = tx.claims().require(owner, claim_id).await?;
        tx.commit().await?;
        self.dispatch(staged).await;

        info!(claim_id = %claim_id, reason = %reason, "Claim rejected");
        Ok(claim)
    }

    /// Claims newest first by claim date.
    pub async fn list_claims(&self, owner: &OwnerId, request: ListClaimsRequest) -> EngineResult<ClaimPage> {
        validate_date_range(request.from, request.to)?;
        let limit = self.page_limit(request.limit)?;
        let offset = request.offset.unwrap_or(0);

        let filter = ClaimFilter {
            vendor_id: request.vendor_id,
            status: request.status,
            from: request.from,
            to: request.to,
        };

        let mut tx = self.db.begin().await?;
        let (claims, total) = tx.claims().list(owner, &filter, limit, offset).await?;

        Ok(ClaimPage {
            has_more: has_more(offset, claims.len(), total),
            claims,
            total,
        })
    }

    /// A claim with its lines, vendor name and source delivery numbers.
    pub async fn get_claim(&self, owner: &OwnerId, claim_id: &str) -> EngineResult<ClaimDetail> {
        let mut tx = self.db.begin().await?;
        let claim = tx.claims().require(owner, claim_id).await?;
        load_claim_detail(&mut tx, owner, claim).await
    }
}

// =============================================================================
// Shared Helpers
// =============================================================================

/// Claim item rows for freshly built lines, in line order.
pub(crate) fn claim_items_from_drafts(claim_id: &str, lines: &[ClaimLineDraft], now: DateTime<Utc>) -> Vec<ClaimItem> {
    lines
        .iter()
        .enumerate()
        .map(|(position, line)| {
            let (delivery_item_id, consignment_item_id) = match &line.source {
                LineSource::DeliveryItem(id) => (Some(id.clone()), None),
                LineSource::ConsignmentItem(id) => (None, Some(id.clone())),
            };
            ClaimItem {
                id: Uuid::new_v4().to_string(),
                claim_id: claim_id.to_string(),
                delivery_item_id,
                consignment_item_id,
                product_id: line.product_id.clone(),
                product_name: line.product_name.clone(),
                quantity_delivered_milli: line.quantities.delivered.milli(),
                quantity_sold_milli: line.quantities.sold.milli(),
                quantity_unsold_milli: line.quantities.unsold.milli(),
                quantity_expired_milli: line.quantities.expired.milli(),
                quantity_damaged_milli: line.quantities.damaged.milli(),
                unit_price_cents: line.unit_price.cents(),
                gross_amount_cents: line.amounts.gross.cents(),
                commission_amount_cents: line.amounts.commission.cents(),
                net_amount_cents: line.amounts.net.cents(),
                paid_amount_cents: 0,
                balance_amount_cents: line.amounts.net.cents(),
                carry_forward: false,
                position: position as i64,
                created_at: now,
                updated_at: now,
            }
        })
        .collect()
}

/// Re-derives paid and balance amounts of a claim and its items from every
/// recorded allocation, stores the totals and applies the settlement rule.
///
/// Stages `ClaimSettled` when the claim becomes settled.
pub(crate) async fn recompute_claim(
    tx: &mut DbTransaction,
    owner: &OwnerId,
    claim_id: &str,
    now: DateTime<Utc>,
    staged: &mut Vec<EventEnvelope>,
) -> EngineResult<Claim> {
    let claim = tx.claims().require(owner, claim_id).await?;
    let mut items = tx.claims().items(owner, claim_id).await?;
    let allocations = tx.payments().allocations_for_claim(owner, claim_id).await?;

    let capacities: Vec<ItemCapacity> = items
        .iter()
        .map(|item| ItemCapacity {
            item_id: item.id.clone(),
            net: item.net_amount(),
        })
        .collect();
    let recorded: Vec<RecordedAllocation> = allocations
        .iter()
        .map(|a| RecordedAllocation {
            claim_item_id: a.claim_item_id.clone(),
            amount: a.allocated_amount(),
        })
        .collect();

    let paid = distribute_to_items(&capacities, &recorded);
    for (item, paid) in items.iter_mut().zip(paid) {
        let balance = item.net_amount() - paid;
        if paid != item.paid_amount() || balance != item.balance_amount() {
            tx.claims()
                .update_item_payment(owner, &item.id, paid, balance, now)
                .await?;
            item.paid_amount_cents = paid.cents();
            item.balance_amount_cents = balance.cents();
        }
    }

    let totals = ClaimTotals::from_items(&items);
    tx.claims().update_totals(owner, claim_id, &totals, now).await?;

    let next = settlement_status(claim.status, totals.balance);
    if next != claim.status {
        tx.claims().set_status(owner, claim_id, next, now).await?;
        info!(claim_id = %claim_id, from = %claim.status, to = %next, "Claim settlement status changed");

        if next == ClaimStatus::Settled {
            stage(
                tx,
                owner,
                SettlementEvent::ClaimSettled {
                    claim_id: claim_id.to_string(),
                    paid_amount_cents: totals.paid.cents(),
                },
                staged,
            )
            .await?;
        }
    }

    Ok(tx.claims().require(owner, claim_id).await?)
}

pub(crate) async fn load_claim_detail(
    tx: &mut DbTransaction,
    owner: &OwnerId,
    claim: Claim,
) -> EngineResult<ClaimDetail> {
    let vendor = tx.vendors().require(owner, &claim.vendor_id).await?;
    let items = tx.claims().items(owner, &claim.id).await?;
    let mut delivery_numbers: HashMap<String, String> = tx.claims().delivery_numbers(owner, &claim.id).await?;

    let items = items
        .into_iter()
        .map(|item| ClaimLine {
            delivery_number: delivery_numbers.remove(&item.id),
            item,
        })
        .collect();

    Ok(ClaimDetail {
        claim,
        vendor_name: vendor.name,
        items,
    })
}
