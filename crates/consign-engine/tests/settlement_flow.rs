//! End-to-end settlement through the public engine API.

use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use rstest::rstest;
use uuid::Uuid;

use consign_core::session::Commission;
use consign_core::{
    AllocationState, ClaimStatus, CommissionRate, Delivery, DeliveryItem, Money, OwnerId, PaymentMethod, Product,
    Quantity, Vendor,
};
use consign_db::{Database, DbConfig};
use consign_engine::{
    CreateClaimRequest, CreatePaymentRequest, CreateSessionRequest, EngineConfig, ErrorKind, LogPublisher,
    ReconcileRequest, ReconcileUpdate, SessionItemInput, SettlementEngine, UpdateItemQuantitiesRequest,
};

fn owner() -> OwnerId {
    OwnerId::new("store-1")
}

async fn engine() -> SettlementEngine {
    let db = Database::new(DbConfig::in_memory()).await.unwrap();
    SettlementEngine::new(db, EngineConfig::default(), Arc::new(LogPublisher)).unwrap()
}

async fn vendor(engine: &SettlementEngine, rate_bps: Option<u32>) -> Vendor {
    let vendor = Vendor {
        id: Uuid::new_v4().to_string(),
        owner_id: owner().as_str().to_string(),
        name: "Hillside Bakery".to_string(),
        commission_rate_bps: rate_bps,
        created_at: Utc::now(),
    };
    let mut tx = engine.database().begin().await.unwrap();
    tx.vendors().insert(&vendor).await.unwrap();
    tx.commit().await.unwrap();
    vendor
}

async fn product(engine: &SettlementEngine, price_cents: i64) -> Product {
    let product = Product {
        id: Uuid::new_v4().to_string(),
        owner_id: owner().as_str().to_string(),
        name: "Rye Loaf".to_string(),
        sale_price_cents: price_cents,
        created_at: Utc::now(),
    };
    let mut tx = engine.database().begin().await.unwrap();
    tx.products().insert(&product).await.unwrap();
    tx.commit().await.unwrap();
    product
}

/// A delivery of 50 units at $2, reconciled 30 sold and 20 unsold.
async fn delivery_of_fifty(engine: &SettlementEngine, vendor: &Vendor, product: &Product) -> Delivery {
    let delivery = Delivery {
        id: Uuid::new_v4().to_string(),
        owner_id: vendor.owner_id.clone(),
        vendor_id: vendor.id.clone(),
        delivery_number: "DN-0042".to_string(),
        delivery_date: NaiveDate::from_ymd_opt(2024, 5, 2).unwrap(),
        created_at: Utc::now(),
    };
    let item = DeliveryItem {
        id: Uuid::new_v4().to_string(),
        delivery_id: delivery.id.clone(),
        product_id: product.id.clone(),
        product_name: product.name.clone(),
        unit_price_cents: 200,
        quantity_delivered_milli: Quantity::from_units(50).milli(),
        quantity_sold_milli: Some(Quantity::from_units(30).milli()),
        quantity_unsold_milli: Some(Quantity::from_units(20).milli()),
        quantity_expired_milli: Some(0),
        quantity_damaged_milli: Some(0),
    };

    let mut tx = engine.database().begin().await.unwrap();
    tx.deliveries().insert_delivery(&delivery).await.unwrap();
    tx.deliveries().insert_item(&item, 0).await.unwrap();
    tx.commit().await.unwrap();
    delivery
}

#[tokio::test]
async fn test_session_to_settled_claim() {
    let engine = engine().await;
    let owner = owner();
    let vendor = vendor(&engine, None).await;
    let product = product(&engine, 2_000).await;

    let session = engine
        .create_session(
            &owner,
            CreateSessionRequest {
                vendor_id: vendor.id.clone(),
                note: Some("Weekend market".to_string()),
                items: vec![SessionItemInput {
                    product_id: product.id.clone(),
                    quantity: Quantity::from_units(10),
                    commission: Commission::Percent(CommissionRate::from_percent(10)),
                }],
            },
        )
        .await
        .unwrap();
    assert_eq!(session.session.total_value_cents, 18_000);

    engine
        .reconcile(
            &owner,
            &session.session.id,
            ReconcileRequest {
                updates: vec![ReconcileUpdate {
                    item_id: session.items[0].id.clone(),
                    qty_sold: Quantity::from_units(7),
                    qty_returned: Quantity::from_units(3),
                }],
            },
        )
        .await
        .unwrap();

    let generated = engine.generate_claim(&owner, &session.session.id).await.unwrap();
    assert!(generated.created);
    assert_eq!(generated.claim.status, ClaimStatus::Submitted);
    assert_eq!(generated.claim.gross_amount_cents, 14_000);
    assert_eq!(generated.claim.commission_amount_cents, 1_400);
    assert_eq!(generated.claim.net_amount_cents, 12_600);

    let again = engine.generate_claim(&owner, &session.session.id).await.unwrap();
    assert!(!again.created);
    assert_eq!(again.claim.id, generated.claim.id);

    let claim_id = generated.claim.id.clone();
    engine.approve_claim(&owner, &claim_id).await.unwrap();

    let balance = engine.get_outstanding_balance(&owner, &vendor.id).await.unwrap();
    assert_eq!(balance.total_outstanding_cents, 12_600);

    let payment = engine
        .create_payment(
            &owner,
            CreatePaymentRequest {
                vendor_id: vendor.id.clone(),
                method: PaymentMethod::PerClaim,
                payment_date: NaiveDate::from_ymd_opt(2024, 5, 6).unwrap(),
                total_amount: Money::from_cents(12_600),
                claim_ids: Vec::new(),
                claim_id: Some(claim_id.clone()),
                claim_item_ids: Vec::new(),
                reference: Some("BANK-7781".to_string()),
                notes: None,
            },
        )
        .await
        .unwrap();
    assert_eq!(payment.payment.allocation_state, AllocationState::Allocated);
    assert_eq!(payment.payment.payment_number, "PAY-20240506-0001");

    let settled = engine.get_session_claim(&owner, &session.session.id).await.unwrap();
    assert_eq!(settled.claim.status, ClaimStatus::Settled);
    assert_eq!(settled.claim.balance_amount_cents, 0);

    let balance = engine.get_outstanding_balance(&owner, &vendor.id).await.unwrap();
    assert_eq!(balance.total_outstanding_cents, 0);
    assert!(balance.claims.is_empty());

    // Nothing is left pending: every event was handed to the publisher.
    assert_eq!(engine.pending_events().await.unwrap(), 0);
}

#[rstest]
#[case::balanced(15, 3, 2, None)]
#[case::short_by_three(15, 0, 2, Some(ErrorKind::InvalidArgument))]
#[case::over_by_one(16, 3, 2, Some(ErrorKind::InvalidArgument))]
#[tokio::test]
async fn test_claim_quantity_correction(
    #[case] unsold: i64,
    #[case] expired: i64,
    #[case] damaged: i64,
    #[case] expected: Option<ErrorKind>,
) {
    let engine = engine().await;
    let owner = owner();
    let vendor = vendor(&engine, Some(1_000)).await;
    let product = product(&engine, 200).await;
    let delivery = delivery_of_fifty(&engine, &vendor, &product).await;

    let claim = engine
        .create_claim(
            &owner,
            CreateClaimRequest {
                vendor_id: vendor.id.clone(),
                delivery_ids: vec![delivery.id.clone()],
                claim_date: NaiveDate::from_ymd_opt(2024, 5, 3).unwrap(),
                notes: None,
            },
        )
        .await
        .unwrap();
    assert_eq!(claim.claim.status, ClaimStatus::Draft);
    // 30 x $2 less 10%.
    assert_eq!(claim.claim.net_amount_cents, 5_400);

    let item_id = claim.items[0].item.id.clone();
    let result = engine
        .update_item_quantities(
            &owner,
            &claim.claim.id,
            &item_id,
            UpdateItemQuantitiesRequest {
                sold: Quantity::from_units(30),
                unsold: Quantity::from_units(unsold),
                expired: Quantity::from_units(expired),
                damaged: Quantity::from_units(damaged),
            },
        )
        .await;

    match expected {
        None => {
            let updated = result.unwrap();
            assert_eq!(updated.claim.net_amount_cents, 5_400);
            let quantities = updated.items[0].item.quantities();
            assert_eq!(quantities.expired, Quantity::from_units(3));
        }
        Some(kind) => {
            assert_eq!(result.unwrap_err().kind, kind);
            let unchanged = engine.get_claim(&owner, &claim.claim.id).await.unwrap();
            assert_eq!(unchanged.items[0].item.quantities().unsold, Quantity::from_units(20));
        }
    }
}
