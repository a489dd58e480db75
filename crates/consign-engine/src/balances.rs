//! Vendor outstanding balances.

use tracing::debug;

use consign_core::balance::summarize;
use consign_core::{OutstandingBalance, OwnerId};

use crate::error::EngineResult;
use crate::SettlementEngine;

impl SettlementEngine {
    /// Everything still owed to a vendor, newest claim first.
    pub async fn get_outstanding_balance(&self, owner: &OwnerId, vendor_id: &str) -> EngineResult<OutstandingBalance> {
        let mut tx = self.db.begin().await?;
        tx.vendors().require(owner, vendor_id).await?;
        let claims = tx.claims().outstanding(owner, vendor_id).await?;

        let balance = summarize(vendor_id, claims);
        debug!(
            vendor_id = %vendor_id,
            claims = balance.claims.len(),
            outstanding = balance.total_outstanding_cents,
            "Outstanding balance"
        );
        Ok(balance)
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use consign_core::{ClaimStatus, Money, PaymentMethod};

    use crate::claims::CreateClaimRequest;
    use crate::error::ErrorKind;
    use crate::payments::CreatePaymentRequest;
    use crate::testing::{qty, Harness};

    #[tokio::test]
    async fn test_outstanding_excludes_drafts_and_settled() {
        let h = Harness::new().await;
        let vendor = h.vendor(&h.owner, Some(1_000)).await;
        let product = h.product(&h.owner, "Sourdough", 500).await;
        let date = NaiveDate::from_ymd_opt(2024, 3, 15).unwrap();

        let mut claim_ids = Vec::new();
        for n in 0..3 {
            let delivery = h
                .delivery(&vendor, &format!("INV-{}", n), &[(&product, 500, qty(10, 4, 6, 0, 0))])
                .await;
            let detail = h
                .engine
                .create_claim(
                    &h.owner,
                    CreateClaimRequest {
                        vendor_id: vendor.id.clone(),
                        delivery_ids: vec![delivery.id],
                        claim_date: date,
                        notes: None,
                    },
                )
                .await
                .unwrap();
            claim_ids.push(detail.claim.id);
        }

        // 4 sold at $5 less 10% commission.
        let net = 1_800;

        for id in &claim_ids[1..] {
            h.engine.submit_claim(&h.owner, id).await.unwrap();
        }
        h.engine.approve_claim(&h.owner, &claim_ids[2]).await.unwrap();
        h.engine
            .create_payment(
                &h.owner,
                CreatePaymentRequest {
                    vendor_id: vendor.id.clone(),
                    method: PaymentMethod::PerClaim,
                    payment_date: date,
                    total_amount: Money::from_cents(500),
                    claim_ids: Vec::new(),
                    claim_id: Some(claim_ids[2].clone()),
                    claim_item_ids: Vec::new(),
                    reference: None,
                    notes: None,
                },
            )
            .await
            .unwrap();

        let balance = h.engine.get_outstanding_balance(&h.owner, &vendor.id).await.unwrap();
        assert_eq!(balance.claims.len(), 2);
        assert_eq!(balance.total_outstanding_cents, net + (net - 500));
        assert!(balance
            .claims
            .iter()
            .all(|c| matches!(c.status, ClaimStatus::Submitted | ClaimStatus::Approved)));
        assert!(!balance.claims.iter().any(|c| c.claim_id == claim_ids[0]));
    }

    #[tokio::test]
    async fn test_outstanding_for_unknown_vendor() {
        let h = Harness::new().await;
        let err = h
            .engine
            .get_outstanding_balance(&h.owner, "no-such-vendor")
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_outstanding_empty_for_new_vendor() {
        let h = Harness::new().await;
        let vendor = h.vendor(&h.owner, None).await;
        let balance = h.engine.get_outstanding_balance(&h.owner, &vendor.id).await.unwrap();
        assert_eq!(balance.total_outstanding_cents, 0);
        assert!(balance.claims.is_empty());
    }
}
