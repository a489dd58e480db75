//! # Payments
//!
//! Recording vendor payments and spreading them over claims.
//!
//! ## Allocation Write Path
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  plan or check allocations     (consign_core::allocation)               │
//! │        │                                                                │
//! │        ▼                                                                │
//! │  replace_allocations(payment)  full replace, never merged               │
//! │        │                                                                │
//! │        ▼                                                                │
//! │  recompute_claim(c) for every claim touched before or after             │
//! │        items.paid  = distribute(all allocations of c)                   │
//! │        claim.paid  = Σ items.paid                                       │
//! │        approved + balance 0 ──► settled                                 │
//! │        settled  + balance>0 ──► approved                                │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Claim locks are held for the whole write so no other payment can move a
//! balance between the check and the write.

use std::collections::{BTreeSet, HashMap};

use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};
use uuid::Uuid;

use consign_core::allocation::{
    check_explicit, distribute_to_items, plan_bill_to_bill, plan_single_claim, AllocationRequest, ClaimBalance,
    ItemCapacity, RecordedAllocation,
};
use consign_core::numbering::{daily_prefix, payment_number, PAYMENT_PREFIX};
use consign_core::validation::{
    validate_date_range, validate_not_empty, validate_notes, validate_positive_amount, validate_required,
};
use consign_core::{
    AllocationState, Claim, ClaimStatus, CoreError, Money, OwnerId, Payment, PaymentAllocation, PaymentDetail,
    PaymentMethod, PaymentPage, ValidationError,
};
use consign_db::{DbError, DbTransaction, PaymentFilter};

use crate::claims::recompute_claim;
use crate::error::EngineResult;
use crate::events::SettlementEvent;
use crate::locks::{claim_key, numbering_key, payment_key};
use crate::{has_more, stage, SettlementEngine};

// =============================================================================
// Requests
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatePaymentRequest {
    pub vendor_id: String,
    pub method: PaymentMethod,
    pub payment_date: NaiveDate,
    pub total_amount: Money,
    /// Claims paid bill-to-bill.
    #[serde(default)]
    pub claim_ids: Vec<String>,
    /// The claim of a per_claim or partial payment.
    #[serde(default)]
    pub claim_id: Option<String>,
    /// Items deferred by a carry_forward payment.
    #[serde(default)]
    pub claim_item_ids: Vec<String>,
    #[serde(default)]
    pub reference: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AllocateRequest {
    pub allocations: Vec<AllocationRequest>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListPaymentsRequest {
    pub vendor_id: Option<String>,
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

// =============================================================================
// Operations
// =============================================================================

impl SettlementEngine {
    /// Records a payment and allocates it according to its method.
    #[instrument(
        skip(self, request),
        fields(owner = %owner, vendor_id = %request.vendor_id, method = %request.method)
    )]
    pub async fn create_payment(&self, owner: &OwnerId, request: CreatePaymentRequest) -> EngineResult<PaymentDetail> {
        validate_positive_amount("total_amount", request.total_amount)?;
        let reference = validate_notes("reference", request.reference.as_deref())?;
        let notes = validate_notes("notes", request.notes.as_deref())?;

        let claim_ids: Vec<String> = match request.method {
            PaymentMethod::BillToBill => {
                validate_not_empty("claim_ids", &request.claim_ids)?;
                distinct(&request.claim_ids)
            }
            PaymentMethod::PerClaim | PaymentMethod::Partial => {
                let claim_id = request.claim_id.clone().ok_or_else(|| ValidationError::RequiredFor {
                    field: "claim_id".to_string(),
                    context: format!("{} payments", request.method),
                })?;
                validate_required("claim_id", &claim_id)?;
                vec![claim_id]
            }
            PaymentMethod::CarryForward => Vec::new(),
        };

        let mut keys = vec![numbering_key(owner, PAYMENT_PREFIX)];
        keys.extend(claim_ids.iter().map(|id| claim_key(owner, id)));
        let _locks = self.locks.acquire(keys).await;

        let mut tx = self.db.begin().await?;
        let vendor = tx.vendors().require(owner, &request.vendor_id).await?;
        let now = Utc::now();

        let (plan, state) = match request.method {
            PaymentMethod::BillToBill => {
                let claims = vendor_claims(&mut tx, owner, &vendor.id, &claim_ids).await?;
                for claim in &claims {
                    ensure_status(claim, &[ClaimStatus::Approved], "receive a bill-to-bill payment")?;
                }
                let balances: Vec<ClaimBalance> = claims
                    .iter()
                    .map(|c| ClaimBalance {
                        claim_id: c.id.clone(),
                        balance: c.balance_amount(),
                    })
                    .collect();
                (plan_bill_to_bill(request.total_amount, &balances)?, AllocationState::Allocated)
            }
            PaymentMethod::PerClaim | PaymentMethod::Partial => {
                let claim = vendor_claims(&mut tx, owner, &vendor.id, &claim_ids)
                    .await?
                    .pop()
                    .ok_or_else(|| DbError::not_found("Claim", claim_ids.join(", ")))?;
                let allowed: &[ClaimStatus] = if request.method == PaymentMethod::PerClaim {
                    &[ClaimStatus::Approved]
                } else {
                    &[ClaimStatus::Submitted, ClaimStatus::Approved]
                };
                ensure_status(&claim, allowed, "receive this payment")?;
                let plan = plan_single_claim(
                    request.total_amount,
                    &ClaimBalance {
                        claim_id: claim.id.clone(),
                        balance: claim.balance_amount(),
                    },
                )?;
                (plan, AllocationState::Allocated)
            }
            PaymentMethod::CarryForward => {
                let item_ids = distinct(&request.claim_item_ids);
                let flagged = tx
                    .claims()
                    .set_carry_forward(owner, &vendor.id, &item_ids, now)
                    .await?;
                if (flagged as usize) < item_ids.len() {
                    return Err(DbError::not_found("Claim item", item_ids.join(", ")).into());
                }
                (Vec::new(), AllocationState::PendingCarryForward)
            }
        };

        let sequence = tx
            .payments()
            .count_numbers_with_prefix(owner, &daily_prefix(PAYMENT_PREFIX, request.payment_date))
            .await?
            + 1;

        let payment = Payment {
            id: Uuid::new_v4().to_string(),
            owner_id: owner.as_str().to_string(),
            vendor_id: vendor.id.clone(),
            payment_number: payment_number(request.payment_date, sequence as u32),
            payment_date: request.payment_date,
            payment_method: request.method,
            total_amount_cents: request.total_amount.cents(),
            allocation_state: state,
            reference,
            notes,
            created_at: now,
            updated_at: now,
        };
        tx.payments().insert(&payment).await?;

        let mut staged = Vec::new();
        stage(
            &mut tx,
            owner,
            SettlementEvent::PaymentRecorded {
                payment_id: payment.id.clone(),
                vendor_id: vendor.id.clone(),
                payment_number: payment.payment_number.clone(),
                method: payment.payment_method,
                total_amount_cents: payment.total_amount_cents,
                allocation_state: payment.allocation_state,
            },
            &mut staged,
        )
        .await?;

        if !plan.is_empty() {
            let rows = allocation_rows(&payment.id, &plan);
            tx.payments().replace_allocations(owner, &payment.id, &rows).await?;
            for claim_id in &claim_ids {
                recompute_claim(&mut tx, owner, claim_id, now, &mut staged).await?;
            }
            stage(
                &mut tx,
                owner,
                SettlementEvent::PaymentAllocated {
                    payment_id: payment.id.clone(),
                    claim_ids: distinct_claims(&plan),
                    allocated_amount_cents: plan.iter().map(|r| r.amount).sum::<Money>().cents(),
                },
                &mut staged,
            )
            .await?;
        }

        let detail = load_payment_detail(&mut tx, owner, payment).await?;
        tx.commit().await?;
        self.dispatch(staged).await;

        info!(
            payment_id = %detail.payment.id,
            payment_number = %detail.payment.payment_number,
            total = detail.payment.total_amount_cents,
            allocated = detail.allocated_amount_cents,
            "Payment recorded"
        );

        Ok(detail)
    }

    /// Replaces every allocation of a payment with the requested ones.
    #[instrument(skip(self, request), fields(owner = %owner, allocations = request.allocations.len()))]
    pub async fn allocate(
        &self,
        owner: &OwnerId,
        payment_id: &str,
        request: AllocateRequest,
    ) -> EngineResult<PaymentDetail> {
        validate_not_empty("allocations", &request.allocations)?;
        for allocation in &request.allocations {
            validate_required("claim_id", &allocation.claim_id)?;
            validate_positive_amount("amount", allocation.amount)?;
        }

        // The payment lock pins its current allocations, which name the
        // claims that must be locked next.
        let _payment_lock = self.locks.acquire([payment_key(owner, payment_id)]).await;
        let previous_claims: Vec<String> = {
            let mut tx = self.db.begin().await?;
            tx.payments().require(owner, payment_id).await?;
            let allocations = tx.payments().allocations(owner, payment_id).await?;
            allocations.into_iter().map(|a| a.claim_id).collect()
        };

        let requested_claims = distinct_claims(&request.allocations);
        let touched: Vec<String> = requested_claims
            .iter()
            .chain(previous_claims.iter())
            .cloned()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        let _claim_locks = self
            .locks
            .acquire(touched.iter().map(|id| claim_key(owner, id)))
            .await;

        let mut tx = self.db.begin().await?;
        let payment = tx.payments().require(owner, payment_id).await?;

        let claims = vendor_claims(&mut tx, owner, &payment.vendor_id, &requested_claims).await?;
        let mut claim_balances = HashMap::new();
        let mut item_balances = HashMap::new();
        for claim in &claims {
            ensure_status(claim, &[ClaimStatus::Approved, ClaimStatus::Settled], "receive allocations")?;
            let (claim_balance, items) = balances_excluding(&mut tx, owner, claim, payment_id).await?;
            claim_balances.insert(claim.id.clone(), claim_balance);
            item_balances.extend(items);
        }

        for allocation in &request.allocations {
            if let Some(item_id) = allocation.claim_item_id.as_deref() {
                tx.claims()
                    .get_item(owner, &allocation.claim_id, item_id)
                    .await?
                    .ok_or_else(|| DbError::not_found("Claim item", item_id))?;
            }
        }

        if let Err(e) = check_explicit(payment.total_amount(), &request.allocations, &claim_balances, &item_balances) {
            warn!(payment_id = %payment_id, error = %e, "Allocation rejected");
            return Err(e.into());
        }

        let now = Utc::now();
        let rows = allocation_rows(&payment.id, &request.allocations);
        tx.payments().replace_allocations(owner, &payment.id, &rows).await?;

        let mut staged = Vec::new();
        for claim_id in &touched {
            recompute_claim(&mut tx, owner, claim_id, now, &mut staged).await?;
        }
        tx.payments()
            .set_allocation_state(owner, &payment.id, AllocationState::Allocated, now)
            .await?;

        let allocated: Money = request.allocations.iter().map(|a| a.amount).sum();
        stage(
            &mut tx,
            owner,
            SettlementEvent::PaymentAllocated {
                payment_id: payment.id.clone(),
                claim_ids: requested_claims,
                allocated_amount_cents: allocated.cents(),
            },
            &mut staged,
        )
        .await?;

        let payment = tx.payments().require(owner, payment_id).await?;
        let detail = load_payment_detail(&mut tx, owner, payment).await?;
        tx.commit().await?;
        self.dispatch(staged).await;

        info!(
            payment_id = %payment_id,
            allocated = allocated.cents(),
            claims = touched.len(),
            "Payment allocated"
        );

        Ok(detail)
    }

    /// A payment with its vendor and allocations.
    pub async fn get_payment(&self, owner: &OwnerId, payment_id: &str) -> EngineResult<PaymentDetail> {
        let mut tx = self.db.begin().await?;
        let payment = tx.payments().require(owner, payment_id).await?;
        load_payment_detail(&mut tx, owner, payment).await
    }

    /// Payments newest first by payment date.
    pub async fn list_payments(&self, owner: &OwnerId, request: ListPaymentsRequest) -> EngineResult<PaymentPage> {
        validate_date_range(request.from, request.to)?;
        let limit = self.page_limit(request.limit)?;
        let offset = request.offset.unwrap_or(0);

        let filter = PaymentFilter {
            vendor_id: request.vendor_id,
            from: request.from,
            to: request.to,
        };

        let mut tx = self.db.begin().await?;
        let (payments, total) = tx.payments().list(owner, &filter, limit, offset).await?;

        Ok(PaymentPage {
            has_more: has_more(offset, payments.len(), total),
            payments,
            total,
        })
    }
}

// =============================================================================
// Helpers
// =============================================================================

fn distinct(ids: &[String]) -> Vec<String> {
    ids.iter().cloned().collect::<BTreeSet<_>>().into_iter().collect()
}

/// Claim ids in first-seen order.
fn distinct_claims(requests: &[AllocationRequest]) -> Vec<String> {
    let mut seen = BTreeSet::new();
    requests
        .iter()
        .filter(|r| seen.insert(r.claim_id.clone()))
        .map(|r| r.claim_id.clone())
        .collect()
}

fn allocation_rows(payment_id: &str, requests: &[AllocationRequest]) -> Vec<PaymentAllocation> {
    let now = Utc::now();
    requests
        .iter()
        .map(|r| PaymentAllocation {
            id: Uuid::new_v4().to_string(),
            payment_id: payment_id.to_string(),
            claim_id: r.claim_id.clone(),
            claim_item_id: r.claim_item_id.clone(),
            allocated_amount_cents: r.amount.cents(),
            created_at: now,
        })
        .collect()
}

/// Loads claims in request order; any that are missing or belong to another
/// vendor are reported as not found.
async fn vendor_claims(
    tx: &mut DbTransaction,
    owner: &OwnerId,
    vendor_id: &str,
    claim_ids: &[String],
) -> EngineResult<Vec<Claim>> {
    let found = tx.claims().get_many(owner, claim_ids).await?;
    let mut by_id: HashMap<String, Claim> = found
        .into_iter()
        .filter(|c| c.vendor_id == vendor_id)
        .map(|c| (c.id.clone(), c))
        .collect();

    claim_ids
        .iter()
        .map(|id| {
            by_id
                .remove(id)
                .ok_or_else(|| DbError::not_found("Claim", id.as_str()).into())
        })
        .collect()
}

fn ensure_status(claim: &Claim, allowed: &[ClaimStatus], operation: &'static str) -> EngineResult<()> {
    if allowed.contains(&claim.status) {
        return Ok(());
    }
    warn!(claim_id = %claim.id, status = %claim.status, "Claim cannot {}", operation);
    Err(CoreError::InvalidClaimStatus {
        claim_id: claim.id.clone(),
        current: claim.status,
        operation,
    }
    .into())
}

/// Claim and item balances as they would be without this payment's
/// current allocations.
async fn balances_excluding(
    tx: &mut DbTransaction,
    owner: &OwnerId,
    claim: &Claim,
    payment_id: &str,
) -> EngineResult<(Money, HashMap<String, Money>)> {
    let items = tx.claims().items(owner, &claim.id).await?;
    let others: Vec<RecordedAllocation> = tx
        .payments()
        .allocations_for_claim(owner, &claim.id)
        .await?
        .into_iter()
        .filter(|a| a.payment_id != payment_id)
        .map(|a| RecordedAllocation {
            claim_item_id: a.claim_item_id.clone(),
            amount: a.allocated_amount(),
        })
        .collect();

    let capacities: Vec<ItemCapacity> = items
        .iter()
        .map(|item| ItemCapacity {
            item_id: item.id.clone(),
            net: item.net_amount(),
        })
        .collect();
    let paid = distribute_to_items(&capacities, &others);

    let item_balances = items
        .iter()
        .zip(paid)
        .map(|(item, paid)| (item.id.clone(), item.net_amount() - paid))
        .collect();
    let claim_paid: Money = others.iter().map(|a| a.amount).sum();

    Ok((claim.net_amount() - claim_paid, item_balances))
}

async fn load_payment_detail(
    tx: &mut DbTransaction,
    owner: &OwnerId,
    payment: Payment,
) -> EngineResult<PaymentDetail> {
    let vendor = tx.vendors().require(owner, &payment.vendor_id).await?;
    let allocations = tx.payments().allocation_lines(owner, &payment.id).await?;
    let allocated: i64 = allocations.iter().map(|a| a.allocated_amount_cents).sum();

    Ok(PaymentDetail {
        payment,
        vendor_name: vendor.name,
        allocations,
        allocated_amount_cents: allocated,
    })
}
