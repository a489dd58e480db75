//! # Claim Math
//!
//! Pure rules for turning reconciled quantities into claim lines, keeping
//! claim totals equal to the sum of their lines, and moving claims through
//! their lifecycle.
//!
//! ## Line Amounts
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  delivery line:  gross      = round(sold × unit_price)                  │
//! │                  commission = round(gross × vendor_rate)                │
//! │                                                                         │
//! │  session line:   gross      = round(sold × list_price)                  │
//! │                  commission = round(sold × commission_per_unit)         │
//! │                                                                         │
//! │  both:           net        = gross - commission                        │
//! │                  balance    = net - paid                                │
//! │                                                                         │
//! │  claim totals    = Σ line values (never tracked incrementally)          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult, ValidationError};
use crate::money::{Money, Quantity, MAX_QUANTITY};
use crate::types::{ClaimItem, ClaimStatus, CommissionRate, DeliveryItem, ReconciledQuantities};
use crate::validation::{validate_non_negative_amount, validate_non_negative_quantity};

/// Largest allowed gap between delivered and accounted-for quantity (0.01).
pub const QUANTITY_TOLERANCE: Quantity = Quantity::from_milli(10);

// =============================================================================
// Quantity Balance
// =============================================================================

/// Checks `sold + unsold + expired + damaged == delivered` within tolerance.
///
/// ## Example
/// ```rust
/// use consign_core::claim::check_balanced;
/// use consign_core::money::Quantity;
/// use consign_core::types::ReconciledQuantities;
///
/// let q = ReconciledQuantities {
///     delivered: Quantity::from_units(50),
///     sold: Quantity::from_units(30),
///     unsold: Quantity::from_units(15),
///     expired: Quantity::from_units(3),
///     damaged: Quantity::from_units(2),
/// };
/// assert!(check_balanced("Sourdough", &q).is_ok());
/// ```
pub fn check_balanced(item_name: &str, quantities: &ReconciledQuantities) -> CoreResult<()> {
    validate_non_negative_quantity("quantity_delivered", quantities.delivered)?;
    for (field, part) in quantities.parts() {
        validate_non_negative_quantity(field, part)?;
    }

    let ceiling = quantities.delivered + QUANTITY_TOLERANCE;
    for (_, part) in quantities.parts() {
        if part > ceiling {
            return Err(CoreError::UnbalancedQuantities {
                item: item_name.to_string(),
                delivered: quantities.delivered,
                accounted: part,
            });
        }
    }

    let accounted = quantities.accounted().ok_or_else(|| ValidationError::TooLarge {
        field: "quantity_accounted".to_string(),
        max: MAX_QUANTITY.to_string(),
    })?;
    if !accounted.within(quantities.delivered, QUANTITY_TOLERANCE) {
        return Err(CoreError::UnbalancedQuantities {
            item: item_name.to_string(),
            delivered: quantities.delivered,
            accounted,
        });
    }
    Ok(())
}

// =============================================================================
// Line Amounts
// =============================================================================

/// Gross, commission and net of one claim line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct LineAmounts {
    pub gross: Money,
    pub commission: Money,
    pub net: Money,
}

impl LineAmounts {
    /// Delivery lines: commission is a vendor-level rate on the gross.
    pub fn for_delivery(sold: Quantity, unit_price: Money, rate: CommissionRate) -> Self {
        let gross = unit_price.multiply_quantity(sold);
        let commission = gross.apply_rate(rate);
        LineAmounts {
            gross,
            commission,
            net: gross - commission,
        }
    }

    /// Session lines: commission was frozen per unit when the session opened.
    pub fn for_session(sold: Quantity, list_price: Money, commission_per_unit: Money) -> Self {
        let gross = list_price.multiply_quantity(sold);
        let commission = commission_per_unit.multiply_quantity(sold);
        LineAmounts {
            gross,
            commission,
            net: gross - commission,
        }
    }
}

/// The record a claim line was built from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LineSource {
    DeliveryItem(String),
    ConsignmentItem(String),
}

/// A claim line ready to be persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClaimLineDraft {
    pub source: LineSource,
    pub product_id: String,
    pub product_name: String,
    pub quantities: ReconciledQuantities,
    pub unit_price: Money,
    pub amounts: LineAmounts,
}

/// Builds claim lines from reconciled delivery items.
///
/// Every item must balance, even ones that sold nothing; only items with a
/// positive sold quantity become lines.
///
/// ## Errors
/// - [`CoreError::UnbalancedQuantities`] naming the first item that fails
/// - [`CoreError::NothingToClaim`] when no item sold anything
pub fn delivery_claim_lines(
    items: &[DeliveryItem],
    rate: CommissionRate,
) -> CoreResult<Vec<ClaimLineDraft>> {
    let mut lines = Vec::new();

    for item in items {
        let quantities = item.reconciled();
        check_balanced(&item.product_name, &quantities)?;
        validate_non_negative_amount("unit_price", item.unit_price())?;

        if !quantities.sold.is_positive() {
            continue;
        }

        lines.push(ClaimLineDraft {
            source: LineSource::DeliveryItem(item.id.clone()),
            product_id: item.product_id.clone(),
            product_name: item.product_name.clone(),
            quantities,
            unit_price: item.unit_price(),
            amounts: LineAmounts::for_delivery(quantities.sold, item.unit_price(), rate),
        });
    }

    if lines.is_empty() {
        return Err(CoreError::NothingToClaim);
    }

    Ok(lines)
}

// =============================================================================
// Claim Totals
// =============================================================================

/// Aggregate money values of a claim.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ClaimTotals {
    pub gross: Money,
    pub commission: Money,
    pub net: Money,
    pub paid: Money,
    pub balance: Money,
}

impl ClaimTotals {
    /// Totals of freshly built lines (nothing paid yet).
    pub fn from_drafts(lines: &[ClaimLineDraft]) -> Self {
        let gross: Money = lines.iter().map(|l| l.amounts.gross).sum();
        let commission: Money = lines.iter().map(|l| l.amounts.commission).sum();
        let net: Money = lines.iter().map(|l| l.amounts.net).sum();
        ClaimTotals {
            gross,
            commission,
            net,
            paid: Money::zero(),
            balance: net,
        }
    }

    /// Totals recomputed from persisted items.
    pub fn from_items(items: &[ClaimItem]) -> Self {
        let mut totals = ClaimTotals::default();
        for item in items {
            totals.gross += Money::from_cents(item.gross_amount_cents);
            totals.commission += Money::from_cents(item.commission_amount_cents);
            totals.net += item.net_amount();
            totals.paid += item.paid_amount();
            totals.balance += item.balance_amount();
        }
        totals
    }
}

/// Recomputes a delivery line after its quantities were corrected.
///
/// The paid amount is kept; the balance becomes `net - paid`.
pub fn recompute_delivery_line(
    item: &ClaimItem,
    quantities: &ReconciledQuantities,
    rate: CommissionRate,
) -> CoreResult<(LineAmounts, Money)> {
    check_balanced(&item.product_name, quantities)?;
    validate_non_negative_amount("unit_price", item.unit_price())?;
    let amounts = LineAmounts::for_delivery(quantities.sold, item.unit_price(), rate);
    let balance = amounts.net - item.paid_amount();
    Ok((amounts, balance))
}

// =============================================================================
// Status Transitions
// =============================================================================

/// Explicit actions a caller can take on a claim.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClaimAction {
    Submit,
    Approve,
    Reject,
    EditQuantities,
}

impl ClaimAction {
    pub const fn verb(&self) -> &'static str {
        match self {
            ClaimAction::Submit => "submit",
            ClaimAction::Approve => "approve",
            ClaimAction::Reject => "reject",
            ClaimAction::EditQuantities => "edit quantities",
        }
    }
}

/// Returns the status a claim moves to, or an error naming the current one.
///
/// ```rust
/// use consign_core::claim::{transition, ClaimAction};
/// use consign_core::types::ClaimStatus;
///
/// assert_eq!(
///     transition("c-1", ClaimStatus::Submitted, ClaimAction::Approve).unwrap(),
///     ClaimStatus::Approved
/// );
/// assert!(transition("c-1", ClaimStatus::Draft, ClaimAction::Approve).is_err());
/// ```
pub fn transition(claim_id: &str, current: ClaimStatus, action: ClaimAction) -> CoreResult<ClaimStatus> {
    let next = match (current, action) {
        (ClaimStatus::Draft, ClaimAction::Submit) => Some(ClaimStatus::Submitted),
        (ClaimStatus::Submitted, ClaimAction::Approve) => Some(ClaimStatus::Approved),
        (ClaimStatus::Draft | ClaimStatus::Submitted, ClaimAction::Reject) => Some(ClaimStatus::Rejected),
        (ClaimStatus::Draft, ClaimAction::EditQuantities) => Some(ClaimStatus::Draft),
        _ => None,
    };

    next.ok_or_else(|| CoreError::InvalidClaimStatus {
        claim_id: claim_id.to_string(),
        current,
        operation: action.verb(),
    })
}

/// Status after a claim's balance was recomputed.
///
/// An approved claim with nothing left to pay is settled; a settled claim
/// whose balance re-opened goes back to approved. Other statuses are kept.
pub fn settlement_status(current: ClaimStatus, balance: Money) -> ClaimStatus {
    match current {
        ClaimStatus::Approved if !balance.is_positive() => ClaimStatus::Settled,
        ClaimStatus::Settled if balance.is_positive() => ClaimStatus::Approved,
        other => other,
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
