//! # Outstanding Balance
//!
//! What a vendor is still owed: the balance of every claim that is
//! submitted or approved and not yet fully paid.

use crate::money::Money;
use crate::types::{ClaimStatus, OutstandingBalance, OutstandingClaim};

/// Statuses whose balance counts as outstanding.
pub const OUTSTANDING_STATUSES: [ClaimStatus; 2] = [ClaimStatus::Approved, ClaimStatus::Submitted];

#[inline]
pub fn is_outstanding(status: ClaimStatus, balance: Money) -> bool {
    OUTSTANDING_STATUSES.contains(&status) && balance.is_positive()
}

/// Builds the vendor summary, keeping only outstanding claims.
pub fn summarize(vendor_id: &str, claims: Vec<OutstandingClaim>) -> OutstandingBalance {
    let claims: Vec<OutstandingClaim> = claims
        .into_iter()
        .filter(|c| is_outstanding(c.status, Money::from_cents(c.balance_amount_cents)))
        .collect();

    let total: Money = claims
        .iter()
        .map(|c| Money::from_cents(c.balance_amount_cents))
        .sum();

    OutstandingBalance {
        vendor_id: vendor_id.to_string(),
        total_outstanding_cents: total.cents(),
        claims,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn claim(id: &str, status: ClaimStatus, balance: i64) -> OutstandingClaim {
        OutstandingClaim {
            claim_id: id.to_string(),
            claim_number: format!("CLM-{}", id),
            claim_date: NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
            status,
            balance_amount_cents: balance,
        }
    }

    #[test]
    fn test_summarize_counts_submitted_and_approved() {
        let summary = summarize(
            "v-1",
            vec![
                claim("a", ClaimStatus::Approved, 10_000),
                claim("b", ClaimStatus::Submitted, 2_500),
                claim("c", ClaimStatus::Draft, 9_999),
                claim("d", ClaimStatus::Settled, 0),
                claim("e", ClaimStatus::Approved, 0),
            ],
        );
        assert_eq!(summary.total_outstanding_cents, 12_500);
        assert_eq!(summary.claims.len(), 2);
    }

    #[test]
    fn test_empty_summary() {
        let summary = summarize("v-1", Vec::new());
        assert_eq!(summary.total_outstanding_cents, 0);
        assert!(summary.claims.is_empty());
    }
}
