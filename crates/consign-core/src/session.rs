//! # Consignment Session Math
//!
//! Pricing, reconciliation checks, aggregates and claim lines for
//! consignment sessions.
//!
//! ## Item Pricing
//! ```text
//! list price (product sale price)          $20.00
//!      │
//!      ▼
//! commission per unit                      percent 10% → $2.00
//!      │                                   fixed $1.50 → $1.50
//!      ▼
//! unit price = list - commission           $18.00
//!      │
//!      ▼
//! total value = round(qty_sent × unit)     10 × $18.00 = $180.00
//! ```

use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::claim::{ClaimLineDraft, LineAmounts, LineSource};
use crate::error::{CoreError, CoreResult};
use crate::money::{Money, Quantity, MAX_AMOUNT};
use crate::types::{
    CommissionRate, CommissionType, ConsignmentItem, ConsignmentSession, ReconciledQuantities,
    SessionStatus,
};
use crate::validation::{validate_commission_rate, validate_non_negative_amount, validate_non_negative_quantity};

// =============================================================================
// Commission
// =============================================================================

/// How the business's cut of each unit is computed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
#[ts(export)]
pub enum Commission {
    /// Share of the list price.
    Percent(CommissionRate),
    /// Flat amount per unit.
    Fixed(Money),
}

impl Commission {
    /// Rejects negative amounts and percentages above 100.
    pub fn validate(&self) -> CoreResult<()> {
        match self {
            Commission::Percent(rate) => validate_commission_rate(*rate)?,
            Commission::Fixed(amount) => validate_non_negative_amount("commission_value", *amount)?,
        }
        Ok(())
    }

    pub fn commission_type(&self) -> CommissionType {
        match self {
            Commission::Percent(_) => CommissionType::Percent,
            Commission::Fixed(_) => CommissionType::Fixed,
        }
    }

    /// Rate in basis points, for percent commissions.
    pub fn rate_bps(&self) -> Option<u32> {
        match self {
            Commission::Percent(rate) => Some(rate.bps()),
            Commission::Fixed(_) => None,
        }
    }

    pub fn per_unit(&self, list_price: Money) -> Money {
        match self {
            Commission::Percent(rate) => list_price.apply_rate(*rate),
            Commission::Fixed(amount) => *amount,
        }
    }
}

/// Prices frozen on a consignment item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ItemPricing {
    pub list_price: Money,
    pub commission_per_unit: Money,
    pub unit_price: Money,
}

/// Prices one item from its product's sale price.
///
/// ## Errors
/// - [`CoreError::InvalidSalePrice`] when the list price is not positive
/// - [`CoreError::CommissionExceedsPrice`] when the cut is larger than the price
pub fn price_item(product_id: &str, list_price: Money, commission: Commission) -> CoreResult<ItemPricing> {
    commission.validate()?;

    if !list_price.is_positive() || list_price > MAX_AMOUNT {
        return Err(CoreError::InvalidSalePrice {
            product_id: product_id.to_string(),
        });
    }

    let commission_per_unit = commission.per_unit(list_price);
    if commission_per_unit > list_price {
        return Err(CoreError::CommissionExceedsPrice {
            product_id: product_id.to_string(),
            commission: commission_per_unit,
            price: list_price,
        });
    }

    Ok(ItemPricing {
        list_price,
        commission_per_unit,
        unit_price: list_price - commission_per_unit,
    })
}

/// Value of everything sent at the vendor's unit price.
#[inline]
pub fn item_total_value(qty_sent: Quantity, unit_price: Money) -> Money {
    unit_price.multiply_quantity(qty_sent)
}

// =============================================================================
// Reconciliation
// =============================================================================

/// Checks a reconciliation update against the item it targets.
pub fn check_reconcile(item: &ConsignmentItem, sold: Quantity, returned: Quantity) -> CoreResult<()> {
    validate_non_negative_quantity("qty_sold", sold)?;
    validate_non_negative_quantity("qty_returned", returned)?;

    let sent = item.qty_sent();
    let over = || CoreError::OverReconciled {
        item_id: item.id.clone(),
        sent,
        sold,
        returned,
    };
    if sold > sent || returned > sent {
        return Err(over());
    }
    match sold.checked_add(returned) {
        Some(total) if total <= sent => Ok(()),
        _ => Err(over()),
    }
}

/// Sessions can be reconciled until they are claimed.
pub fn ensure_reconcilable(session: &ConsignmentSession) -> CoreResult<()> {
    match session.status {
        SessionStatus::Open | SessionStatus::Submitted => Ok(()),
        current => Err(CoreError::InvalidSessionStatus {
            session_id: session.id.clone(),
            current,
            operation: "reconcile",
        }),
    }
}

/// Explicit session transitions (claiming happens through claim generation).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionAction {
    Submit,
    Close,
}

pub fn session_transition(
    session_id: &str,
    current: SessionStatus,
    action: SessionAction,
) -> CoreResult<SessionStatus> {
    match (current, action) {
        (SessionStatus::Open, SessionAction::Submit) => Ok(SessionStatus::Submitted),
        (SessionStatus::Claimed, SessionAction::Close) => Ok(SessionStatus::Closed),
        (current, SessionAction::Submit) => Err(CoreError::InvalidSessionStatus {
            session_id: session_id.to_string(),
            current,
            operation: "submit",
        }),
        (current, SessionAction::Close) => Err(CoreError::InvalidSessionStatus {
            session_id: session_id.to_string(),
            current,
            operation: "close",
        }),
    }
}

// =============================================================================
// Aggregates
// =============================================================================

/// Stored session aggregates, recomputed from all items after every change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SessionTotals {
    pub total_items: Quantity,
    pub total_value: Money,
}

impl SessionTotals {
    pub fn from_items(items: &[ConsignmentItem]) -> Self {
        SessionTotals {
            total_items: items.iter().map(ConsignmentItem::qty_sent).sum(),
            total_value: items
                .iter()
                .map(|i| item_total_value(i.qty_sent(), i.unit_price()))
                .sum(),
        }
    }
}

/// Derived figures shown with a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct SessionMetrics {
    /// Everything sent, at list price.
    pub gross_potential: Money,
    /// Everything sold, at list price.
    pub gross_sold: Money,
    pub total_commission: Money,
    /// What the vendor is owed for sold goods.
    pub total_payout: Money,
    /// Still with the vendor: sent - sold - returned.
    pub remaining_qty: Quantity,
}

impl SessionMetrics {
    pub fn from_items(items: &[ConsignmentItem]) -> Self {
        let mut metrics = SessionMetrics::default();
        for item in items {
            let sold = LineAmounts::for_session(item.qty_sold(), item.list_price(), item.commission_amount());
            metrics.gross_potential += item.list_price().multiply_quantity(item.qty_sent());
            metrics.gross_sold += sold.gross;
            metrics.total_commission += sold.commission;
            metrics.remaining_qty += item.qty_sent() - item.qty_sold() - item.qty_returned();
        }
        metrics.total_payout = metrics.gross_sold - metrics.total_commission;
        metrics
    }
}

// =============================================================================
// Claim Lines
// =============================================================================

/// Builds claim lines from a reconciled session, one per sold item.
///
/// Returned goods are recorded as unsold; session claims have no expired or
/// damaged stock.
pub fn session_claim_lines(items: &[ConsignmentItem]) -> CoreResult<Vec<ClaimLineDraft>> {
    let lines: Vec<ClaimLineDraft> = items
        .iter()
        .filter(|item| item.qty_sold().is_positive())
        .map(|item| ClaimLineDraft {
            source: LineSource::ConsignmentItem(item.id.clone()),
            product_id: item.product_id.clone(),
            product_name: item.product_name.clone(),
            quantities: ReconciledQuantities {
                delivered: item.qty_sent(),
                sold: item.qty_sold(),
                unsold: item.qty_returned(),
                expired: Quantity::zero(),
                damaged: Quantity::zero(),
            },
            unit_price: item.list_price(),
            amounts: LineAmounts::for_session(item.qty_sold(), item.list_price(), item.commission_amount()),
        })
        .collect();

    if lines.is_empty() {
        return Err(CoreError::NothingToClaim);
    }

    Ok(lines)
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use rstest::rstest;

    fn item(id: &str, sent: i64, sold: i64, returned: i64, list: i64, commission: i64) -> ConsignmentItem {
        let now = Utc::now();
        ConsignmentItem {
            id: id.to_string(),
            session_id: "s-1".to_string(),
            product_id: format!("p-{}", id),
            product_name: format!("Product {}", id),
            qty_sent_milli: Quantity::from_units(sent).milli(),
            qty_sold_milli: Quantity::from_units(sold).milli(),
            qty_returned_milli: Quantity::from_units(returned).milli(),
            list_price_cents: list,
            unit_price_cents: list - commission,
            commission_type: CommissionType::Fixed,
            commission_rate_bps: None,
            commission_amount_cents: commission,
            total_value_cents: (list - commission) * sent,
            position: 0,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_percent_pricing() {
        let pricing = price_item(
            "p-1",
            Money::from_cents(2000),
            Commission::Percent(CommissionRate::from_percent(10)),
        )
        .unwrap();
        assert_eq!(pricing.commission_per_unit.cents(), 200);
        assert_eq!(pricing.unit_price.cents(), 1800);
        assert_eq!(item_total_value(Quantity::from_units(10), pricing.unit_price).cents(), 18_000);
    }

    #[test]
    fn test_fixed_pricing() {
        let pricing = price_item("p-1", Money::from_cents(2000), Commission::Fixed(Money::from_cents(150))).unwrap();
        assert_eq!(pricing.unit_price.cents(), 1850);
    }

    #[test]
    fn test_pricing_rejects_bad_inputs() {
        assert!(matches!(
            price_item("p-1", Money::zero(), Commission::Fixed(Money::zero())),
            Err(CoreError::InvalidSalePrice { .. })
        ));
        assert!(matches!(
            price_item("p-1", Money::from_cents(100), Commission::Fixed(Money::from_cents(101))),
            Err(CoreError::CommissionExceedsPrice { .. })
        ));
        assert!(matches!(
            price_item("p-1", Money::from_cents(100), Commission::Percent(CommissionRate::from_bps(10_001))),
            Err(CoreError::Validation(_))
        ));
        assert!(matches!(
            price_item("p-1", Money::from_cents(100), Commission::Fixed(Money::from_cents(-1))),
            Err(CoreError::Validation(_))
        ));
    }

    #[test]
    fn test_full_percent_commission_is_allowed() {
        let pricing = price_item(
            "p-1",
            Money::from_cents(999),
            Commission::Percent(CommissionRate::from_percent(100)),
        )
        .unwrap();
        assert!(pricing.unit_price.is_zero());
    }

    #[test]
    fn test_check_reconcile() {
        let it = item("a", 10, 0, 0, 2000, 200);
        assert!(check_reconcile(&it, Quantity::from_units(7), Quantity::from_units(3)).is_ok());
        assert!(matches!(
            check_reconcile(&it, Quantity::from_units(8), Quantity::from_units(3)),
            Err(CoreError::OverReconciled { .. })
        ));
        assert!(check_reconcile(&it, Quantity::from_units(-1), Quantity::zero()).is_err());
    }

    #[rstest]
    #[case::sold_at_max(i64::MAX, 1_000)]
    #[case::returned_at_max(1_000, i64::MAX)]
    #[case::both_at_max(i64::MAX, i64::MAX)]
    fn test_check_reconcile_i64_edge(#[case] sold: i64, #[case] returned: i64) {
        let it = item("a", 10, 0, 0, 2000, 200);
        assert!(matches!(
            check_reconcile(&it, Quantity::from_milli(sold), Quantity::from_milli(returned)),
            Err(CoreError::Validation(_))
        ));
    }

    #[test]
    fn test_check_reconcile_caps_each_part() {
        let it = item("a", 10, 0, 0, 2000, 200);
        assert!(matches!(
            check_reconcile(&it, Quantity::from_units(11), Quantity::zero()),
            Err(CoreError::OverReconciled { .. })
        ));
        assert!(matches!(
            check_reconcile(&it, Quantity::zero(), Quantity::from_units(11)),
            Err(CoreError::OverReconciled { .. })
        ));
        assert!(check_reconcile(&it, Quantity::zero(), Quantity::from_units(10)).is_ok());
    }

    #[test]
    fn test_price_above_ceiling_rejected() {
        let result = price_item(
            "p-1",
            Money::from_cents(i64::MAX),
            Commission::Fixed(Money::from_cents(100)),
        );
        assert!(matches!(result, Err(CoreError::InvalidSalePrice { .. })));
    }

    #[test]
    fn test_session_transitions() {
        assert_eq!(
            session_transition("s-1", SessionStatus::Open, SessionAction::Submit).unwrap(),
            SessionStatus::Submitted
        );
        assert_eq!(
            session_transition("s-1", SessionStatus::Claimed, SessionAction::Close).unwrap(),
            SessionStatus::Closed
        );
        assert!(session_transition("s-1", SessionStatus::Open, SessionAction::Close).is_err());
        assert!(session_transition("s-1", SessionStatus::Closed, SessionAction::Submit).is_err());
    }

    #[test]
    fn test_totals_and_metrics() {
        let items = vec![item("a", 10, 7, 3, 2000, 200), item("b", 4, 1, 0, 500, 50)];

        let totals = SessionTotals::from_items(&items);
        assert_eq!(totals.total_items, Quantity::from_units(14));
        assert_eq!(totals.total_value.cents(), 18_000 + 1_800);

        let metrics = SessionMetrics::from_items(&items);
        assert_eq!(metrics.gross_potential.cents(), 20_000 + 2_000);
        assert_eq!(metrics.gross_sold.cents(), 14_000 + 500);
        assert_eq!(metrics.total_commission.cents(), 1_400 + 50);
        assert_eq!(metrics.total_payout.cents(), 12_600 + 450);
        assert_eq!(metrics.remaining_qty, Quantity::from_units(3));
    }

    #[test]
    fn test_session_claim_lines() {
        let items = vec![item("a", 10, 7, 3, 2000, 200), item("b", 4, 0, 4, 500, 50)];
        let lines = session_claim_lines(&items).unwrap();
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].amounts.gross.cents(), 14_000);
        assert_eq!(lines[0].amounts.commission.cents(), 1_400);
        assert_eq!(lines[0].amounts.net.cents(), 12_600);
        assert_eq!(lines[0].quantities.unsold, Quantity::from_units(3));
    }

    #[test]
    fn test_session_claim_lines_require_sales() {
        let items = vec![item("a", 10, 0, 10, 2000, 200)];
        assert!(matches!(session_claim_lines(&items), Err(CoreError::NothingToClaim)));
    }
}
