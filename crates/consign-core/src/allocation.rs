//! # Payment Allocation Planning
//!
//! Decides how much of a payment goes to which claim, and how a claim's
//! allocations spread over its items.
//!
//! ## Strategies
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  bill_to_bill    share_i = round(total × balance_i / Σ balance)         │
//! │                  capped at balance_i, overshoot trimmed from the end    │
//! │                                                                         │
//! │  per_claim       whole payment to one approved claim                    │
//! │  partial         whole payment to one submitted/approved claim          │
//! │                  (both: total must not exceed the claim balance)        │
//! │                                                                         │
//! │  carry_forward   nothing now; explicit allocations later                │
//! │                                                                         │
//! │  explicit        Σ amounts ≤ total                                      │
//! │                  Σ per claim ≤ claim balance                            │
//! │                  Σ per item  ≤ item balance                             │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Item Distribution
//! ```text
//! item-targeted allocations ──► their item
//! unitemized remainder ───────► fills items in creation order
//!
//!   items net:   [ 60 ][ 40 ][ 100 ]     targeted: 10 → item 2
//!   unitemized:  90
//!   paid:        [ 60 ][ 40 ][  0 ]  ←  item 2 gets 10 + 30 from the fill
//! ```

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::error::{CoreError, CoreResult};
use crate::money::Money;
use crate::validation::validate_positive_amount;

/// An outstanding claim considered for a payment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClaimBalance {
    pub claim_id: String,
    pub balance: Money,
}

/// One allocation line, planned or requested.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct AllocationRequest {
    pub claim_id: String,
    pub claim_item_id: Option<String>,
    pub amount: Money,
}

impl AllocationRequest {
    pub fn to_claim(claim_id: impl Into<String>, amount: Money) -> Self {
        AllocationRequest {
            claim_id: claim_id.into(),
            claim_item_id: None,
            amount,
        }
    }
}

// =============================================================================
// Proportional Split
// =============================================================================

/// Splits `total` over `weights` proportionally.
///
/// Each share is rounded, capped at its weight, and the result never sums
/// past `total`: rounding overshoot is trimmed one cent at a time starting
/// from the last non-zero share.
///
/// ```rust
/// use consign_core::allocation::split_proportionally;
/// use consign_core::money::Money;
///
/// let shares = split_proportionally(
///     Money::from_cents(20_000),
///     &[Money::from_cents(10_000), Money::from_cents(30_000)],
/// );
/// assert_eq!(shares, vec![Money::from_cents(5_000), Money::from_cents(15_000)]);
/// ```
pub fn split_proportionally(total: Money, weights: &[Money]) -> Vec<Money> {
    let sum: Money = weights.iter().map(|w| w.non_negative()).sum();
    if !sum.is_positive() || !total.is_positive() {
        return vec![Money::zero(); weights.len()];
    }

    let mut shares: Vec<Money> = weights
        .iter()
        .map(|w| {
            let w = w.non_negative();
            total.scale(w, sum).min(w)
        })
        .collect();

    let mut overshoot = shares.iter().sum::<Money>() - total;
    for share in shares.iter_mut().rev() {
        if !overshoot.is_positive() {
            break;
        }
        let cut = (*share).min(overshoot);
        *share -= cut;
        overshoot -= cut;
    }

    shares
}

// =============================================================================
// Strategy Planning
// =============================================================================

/// Plans a bill-to-bill payment across approved claims.
///
/// Claims with zero balance get nothing and produce no allocation line.
///
/// ## Errors
/// - [`CoreError::NoOutstandingBalance`] when the claims owe nothing in total
pub fn plan_bill_to_bill(total: Money, claims: &[ClaimBalance]) -> CoreResult<Vec<AllocationRequest>> {
    validate_positive_amount("total_amount", total)?;

    let balances: Vec<Money> = claims.iter().map(|c| c.balance).collect();
    let outstanding: Money = balances.iter().map(|b| b.non_negative()).sum();
    if !outstanding.is_positive() {
        return Err(CoreError::NoOutstandingBalance);
    }

    let shares = split_proportionally(total, &balances);
    Ok(claims
        .iter()
        .zip(shares)
        .filter(|(_, share)| share.is_positive())
        .map(|(claim, share)| AllocationRequest::to_claim(claim.claim_id.clone(), share))
        .collect())
}

/// Plans a payment applied entirely to one claim (per_claim and partial).
///
/// ## Errors
/// - [`CoreError::OverAllocation`] when the payment exceeds the claim balance
pub fn plan_single_claim(total: Money, claim: &ClaimBalance) -> CoreResult<Vec<AllocationRequest>> {
    validate_positive_amount("total_amount", total)?;

    if total > claim.balance {
        return Err(CoreError::OverAllocation {
            target: format!("claim {}", claim.claim_id),
            requested: total,
            balance: claim.balance,
        });
    }

    Ok(vec![AllocationRequest::to_claim(claim.claim_id.clone(), total)])
}

/// Checks explicitly requested allocations.
///
/// `claim_balances` and `item_balances` must already exclude whatever this
/// payment had allocated before, since the request replaces it.
pub fn check_explicit(
    total: Money,
    requests: &[AllocationRequest],
    claim_balances: &HashMap<String, Money>,
    item_balances: &HashMap<String, Money>,
) -> CoreResult<()> {
    for request in requests {
        validate_positive_amount("amount", request.amount)?;
    }

    let allocated: Money = requests.iter().map(|r| r.amount).sum();
    if allocated > total {
        return Err(CoreError::AllocationExceedsPayment { allocated, total });
    }

    let mut per_claim: HashMap<&str, Money> = HashMap::new();
    let mut per_item: HashMap<&str, Money> = HashMap::new();
    for request in requests {
        *per_claim.entry(request.claim_id.as_str()).or_default() += request.amount;
        if let Some(item_id) = request.claim_item_id.as_deref() {
            *per_item.entry(item_id).or_default() += request.amount;
        }
    }

    // Deterministic error reporting: first offending request wins.
    for request in requests {
        let requested = per_claim[request.claim_id.as_str()];
        let balance = claim_balances.get(&request.claim_id).copied().unwrap_or_default();
        if requested > balance {
            return Err(CoreError::OverAllocation {
                target: format!("claim {}", request.claim_id),
                requested,
                balance,
            });
        }

        if let Some(item_id) = request.claim_item_id.as_deref() {
            let requested = per_item[item_id];
            let balance = item_balances.get(item_id).copied().unwrap_or_default();
            if requested > balance {
                return Err(CoreError::OverAllocation {
                    target: format!("claim item {}", item_id),
                    requested,
                    balance,
                });
            }
        }
    }

    Ok(())
}

// =============================================================================
// Item Distribution
// =============================================================================

/// What a claim item can absorb, in creation order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemCapacity {
    pub item_id: String,
    pub net: Money,
}

/// An allocation already recorded against a claim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedAllocation {
    pub claim_item_id: Option<String>,
    pub amount: Money,
}

/// Derives each item's paid amount from every allocation against its claim.
///
/// The result is index-aligned with `items` and always sums to the total of
/// `allocations`; anything left after filling every item lands on the last.
pub fn distribute_to_items(items: &[ItemCapacity], allocations: &[RecordedAllocation]) -> Vec<Money> {
    let mut paid = vec![Money::zero(); items.len()];
    let index: HashMap<&str, usize> = items
        .iter()
        .enumerate()
        .map(|(i, item)| (item.item_id.as_str(), i))
        .collect();

    let mut unitemized = Money::zero();
    for allocation in allocations {
        match allocation
            .claim_item_id
            .as_deref()
            .and_then(|id| index.get(id))
        {
            Some(&i) => paid[i] += allocation.amount,
            None => unitemized += allocation.amount,
        }
    }

    for (i, item) in items.iter().enumerate() {
        if !unitemized.is_positive() {
            break;
        }
        let room = (item.net - paid[i]).non_negative();
        let take = room.min(unitemized);
        paid[i] += take;
        unitemized -= take;
    }

    if unitemized.is_positive() {
        if let Some(last) = paid.last_mut() {
            *last += unitemized;
        }
    }

    paid
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn balance(id: &str, cents: i64) -> ClaimBalance {
        ClaimBalance {
            claim_id: id.to_string(),
            balance: Money::from_cents(cents),
        }
    }

    #[test]
    fn test_bill_to_bill_proportional() {
        let plan = plan_bill_to_bill(
            Money::from_cents(20_000),
            &[balance("a", 10_000), balance("b", 30_000)],
        )
        .unwrap();
        assert_eq!(
            plan,
            vec![
                AllocationRequest::to_claim("a", Money::from_cents(5_000)),
                AllocationRequest::to_claim("b", Money::from_cents(15_000)),
            ]
        );
    }

    #[test]
    fn test_bill_to_bill_caps_at_balance() {
        // Paying more than is owed: every claim is cleared, the rest stays unallocated.
        let plan = plan_bill_to_bill(
            Money::from_cents(50_000),
            &[balance("a", 10_000), balance("b", 30_000)],
        )
        .unwrap();
        let amounts: Vec<i64> = plan.iter().map(|a| a.amount.cents()).collect();
        assert_eq!(amounts, vec![10_000, 30_000]);
    }

    #[test]
    fn test_bill_to_bill_skips_zero_balances() {
        let plan = plan_bill_to_bill(
            Money::from_cents(1_000),
            &[balance("a", 0), balance("b", 5_000)],
        )
        .unwrap();
        assert_eq!(plan, vec![AllocationRequest::to_claim("b", Money::from_cents(1_000))]);
    }

    #[test]
    fn test_bill_to_bill_nothing_outstanding() {
        assert!(matches!(
            plan_bill_to_bill(Money::from_cents(1_000), &[balance("a", 0)]),
            Err(CoreError::NoOutstandingBalance)
        ));
    }

    #[test]
    fn test_rounding_overshoot_is_trimmed() {
        // 2 cents over three equal balances: 0.67 each → 1 + 1 + 1 = 3, trimmed to 2.
        let shares = split_proportionally(
            Money::from_cents(2),
            &[Money::from_cents(100), Money::from_cents(100), Money::from_cents(100)],
        );
        let total: Money = shares.iter().sum();
        assert_eq!(total.cents(), 2);
        assert_eq!(shares[2], Money::zero());
    }

    #[test]
    fn test_single_claim() {
        let claim = balance("a", 50_000);
        assert!(matches!(
            plan_single_claim(Money::from_cents(60_000), &claim),
            Err(CoreError::OverAllocation { .. })
        ));
        let plan = plan_single_claim(Money::from_cents(50_000), &claim).unwrap();
        assert_eq!(plan[0].amount.cents(), 50_000);
    }

    #[test]
    fn test_check_explicit() {
        let claims: HashMap<String, Money> = [("a".to_string(), Money::from_cents(1_000))].into();
        let items: HashMap<String, Money> = [("a-1".to_string(), Money::from_cents(400))].into();

        let ok = vec![
            AllocationRequest::to_claim("a", Money::from_cents(500)),
            AllocationRequest {
                claim_id: "a".to_string(),
                claim_item_id: Some("a-1".to_string()),
                amount: Money::from_cents(400),
            },
        ];
        assert!(check_explicit(Money::from_cents(900), &ok, &claims, &items).is_ok());

        // Over the payment total.
        assert!(matches!(
            check_explicit(Money::from_cents(800), &ok, &claims, &items),
            Err(CoreError::AllocationExceedsPayment { .. })
        ));

        // Over the claim balance.
        let too_much = vec![AllocationRequest::to_claim("a", Money::from_cents(1_001))];
        assert!(matches!(
            check_explicit(Money::from_cents(5_000), &too_much, &claims, &items),
            Err(CoreError::OverAllocation { .. })
        ));

        // Over the item balance.
        let item_over = vec![AllocationRequest {
            claim_id: "a".to_string(),
            claim_item_id: Some("a-1".to_string()),
            amount: Money::from_cents(401),
        }];
        assert!(matches!(
            check_explicit(Money::from_cents(5_000), &item_over, &claims, &items),
            Err(CoreError::OverAllocation { target, .. }) if target == "claim item a-1"
        ));

        // Zero amounts are malformed.
        let zero = vec![AllocationRequest::to_claim("a", Money::zero())];
        assert!(matches!(
            check_explicit(Money::from_cents(5_000), &zero, &claims, &items),
            Err(CoreError::Validation(_))
        ));
    }

    #[test]
    fn test_distribute_to_items() {
        let items = vec![
            ItemCapacity { item_id: "1".to_string(), net: Money::from_cents(60) },
            ItemCapacity { item_id: "2".to_string(), net: Money::from_cents(40) },
            ItemCapacity { item_id: "3".to_string(), net: Money::from_cents(100) },
        ];
        let allocations = vec![
            RecordedAllocation { claim_item_id: Some("2".to_string()), amount: Money::from_cents(10) },
            RecordedAllocation { claim_item_id: None, amount: Money::from_cents(90) },
        ];
        let paid = distribute_to_items(&items, &allocations);
        assert_eq!(
            paid,
            vec![Money::from_cents(60), Money::from_cents(40), Money::zero()]
        );
    }

    #[test]
    fn test_distribute_nothing() {
        let items = vec![ItemCapacity { item_id: "1".to_string(), net: Money::from_cents(60) }];
        assert_eq!(distribute_to_items(&items, &[]), vec![Money::zero()]);
    }

    proptest! {
        #[test]
        fn prop_split_never_exceeds_total_or_weight(
            total in 1i64..10_000_000,
            weights in proptest::collection::vec(0i64..5_000_000, 1..12),
        ) {
            let weights: Vec<Money> = weights.into_iter().map(Money::from_cents).collect();
            let shares = split_proportionally(Money::from_cents(total), &weights);
            let sum: Money = shares.iter().sum();
            prop_assert!(sum.cents() <= total);
            for (share, weight) in shares.iter().zip(&weights) {
                prop_assert!(share <= weight);
                prop_assert!(!share.is_negative());
            }
        }

        #[test]
        fn prop_distribution_conserves_amount(
            nets in proptest::collection::vec(0i64..100_000, 1..8),
            amounts in proptest::collection::vec(1i64..50_000, 0..6),
        ) {
            let items: Vec<ItemCapacity> = nets
                .iter()
                .enumerate()
                .map(|(i, n)| ItemCapacity { item_id: i.to_string(), net: Money::from_cents(*n) })
                .collect();
            let allocations: Vec<RecordedAllocation> = amounts
                .iter()
                .map(|a| RecordedAllocation { claim_item_id: None, amount: Money::from_cents(*a) })
                .collect();
            let paid = distribute_to_items(&items, &allocations);
            let total: i64 = amounts.iter().sum();
            prop_assert_eq!(paid.iter().sum::<Money>().cents(), total);
        }
    }
}
