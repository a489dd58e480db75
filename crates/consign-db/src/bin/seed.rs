//! # Seed Data Generator
//!
//! Populates a development database with vendors, products and reconciled
//! deliveries ready to be claimed.
//!
//! ## Usage
//! ```bash
//! # Seed the default owner with 3 vendors
//! cargo run -p consign-db --bin seed
//!
//! # More vendors, custom owner and path
//! cargo run -p consign-db --bin seed -- --vendors 10 --owner acct-42 --db ./data/consign.db
//! ```
//!
//! ## Generated Data
//! - Vendors with commission rates cycling through 0%, 10%, 12.5%, 15%
//! - One product per catalog entry
//! - Two deliveries per vendor, every item fully reconciled
//!   (`sold + unsold + expired + damaged == delivered`)

use chrono::{Duration, Utc};
use std::env;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use consign_core::money::Quantity;
use consign_core::{Delivery, DeliveryItem, OwnerId, Product, ReconciledQuantities, Vendor};
use consign_db::{Database, DbConfig};

/// Catalog for realistic test data: (name, sale price in cents).
const CATALOG: &[(&str, i64)] = &[
    ("Sourdough Loaf", 650),
    ("Rye Bread", 550),
    ("Croissant", 275),
    ("Pain au Chocolat", 325),
    ("Cinnamon Roll", 395),
    ("Bagel", 175),
    ("Baguette", 350),
    ("Focaccia", 725),
    ("Blueberry Muffin", 295),
    ("Carrot Cake Slice", 450),
];

const VENDOR_NAMES: &[&str] = &[
    "Corner Deli",
    "Harbor Cafe",
    "Green Street Grocer",
    "Station Kiosk",
    "Campus Coffee",
    "Market Hall Stall",
];

/// Commission rates in basis points.
const COMMISSION_RATES: &[u32] = &[0, 1000, 1250, 1500];

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args: Vec<String> = env::args().collect();

    let mut vendor_count: usize = 3;
    let mut db_path = String::from("./consign_dev.db");
    let mut owner = String::from("dev-owner");

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--vendors" | "-v" => {
                if i + 1 < args.len() {
                    vendor_count = args[i + 1].parse().unwrap_or(3);
                    i += 1;
                }
            }
            "--db" | "-d" => {
                if i + 1 < args.len() {
                    db_path = args[i + 1].clone();
                    i += 1;
                }
            }
            "--owner" | "-o" => {
                if i + 1 < args.len() {
                    owner = args[i + 1].clone();
                    i += 1;
                }
            }
            "--help" | "-h" => {
                println!("Consign Seed Data Generator");
                println!();
                println!("Usage: seed [OPTIONS]");
                println!();
                println!("Options:");
                println!("  -v, --vendors <N>   Number of vendors to generate (default: 3)");
                println!("  -o, --owner <ID>    Owner account id (default: dev-owner)");
                println!("  -d, --db <PATH>     Database file path (default: ./consign_dev.db)");
                println!("  -h, --help          Show this help message");
                return Ok(());
            }
            _ => {}
        }
        i += 1;
    }

    let owner = OwnerId::new(owner);
    info!(db = %db_path, owner = %owner, vendors = vendor_count, "Seeding database");

    let db = Database::new(DbConfig::new(&db_path)).await?;
    let mut tx = db.begin().await?;

    let existing = tx.vendors().count(&owner).await?;
    if existing > 0 {
        warn!(existing, "Owner already has vendors, skipping seed to avoid duplicates");
        return Ok(());
    }

    let now = Utc::now();
    let products: Vec<Product> = CATALOG
        .iter()
        .map(|(name, price)| Product {
            id: Uuid::new_v4().to_string(),
            owner_id: owner.as_str().to_string(),
            name: name.to_string(),
            sale_price_cents: *price,
            created_at: now,
        })
        .collect();

    for product in &products {
        tx.products().insert(product).await?;
    }

    let mut deliveries = 0;
    for v in 0..vendor_count {
        let vendor = Vendor {
            id: Uuid::new_v4().to_string(),
            owner_id: owner.as_str().to_string(),
            name: format!("{} #{}", VENDOR_NAMES[v % VENDOR_NAMES.len()], v + 1),
            commission_rate_bps: Some(COMMISSION_RATES[v % COMMISSION_RATES.len()]),
            created_at: now,
        };
        tx.vendors().insert(&vendor).await?;

        for d in 0..2 {
            let delivery = Delivery {
                id: Uuid::new_v4().to_string(),
                owner_id: owner.as_str().to_string(),
                vendor_id: vendor.id.clone(),
                delivery_number: format!("INV-{:03}-{:02}", v + 1, d + 1),
                delivery_date: (now - Duration::days(7 - d as i64)).date_naive(),
                created_at: now,
            };
            tx.deliveries().insert_delivery(&delivery).await?;

            for (position, product) in products.iter().skip(v + d).take(4).enumerate() {
                let quantities = reconciled(v * 10 + d * 4 + position);
                let item = DeliveryItem {
                    id: Uuid::new_v4().to_string(),
                    delivery_id: delivery.id.clone(),
                    product_id: product.id.clone(),
                    product_name: product.name.clone(),
                    unit_price_cents: product.sale_price_cents,
                    quantity_delivered_milli: quantities.delivered.milli(),
                    quantity_sold_milli: None,
                    quantity_unsold_milli: None,
                    quantity_expired_milli: None,
                    quantity_damaged_milli: None,
                };
                tx.deliveries().insert_item(&item, position as i64).await?;
                tx.deliveries()
                    .record_reconciliation(&owner, &item.id, &quantities)
                    .await?;
            }
            deliveries += 1;
        }
    }

    tx.commit().await?;

    info!(
        vendors = vendor_count,
        products = products.len(),
        deliveries,
        "Seed complete"
    );

    Ok(())
}

/// Deterministic, balanced quantities for a delivery line.
fn reconciled(seed: usize) -> ReconciledQuantities {
    let delivered = 20 + (seed % 5) as i64 * 5;
    let sold = delivered * (50 + (seed % 4) as i64 * 10) / 100;
    let expired = (seed % 3) as i64;
    let damaged = (seed % 2) as i64;
    let unsold = delivered - sold - expired - damaged;

    ReconciledQuantities {
        delivered: Quantity::from_units(delivered),
        sold: Quantity::from_units(sold),
        unsold: Quantity::from_units(unsold),
        expired: Quantity::from_units(expired),
        damaged: Quantity::from_units(damaged),
    }
}
