//! # Domain Types
//!
//! Core domain types used throughout consignment settlement.
//!
//! ## Type Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Domain Types                                    │
//! │                                                                         │
//! │  Vendor ──┬── Delivery ── DeliveryItem ─────────────┐                   │
//! │           │                                         │ (delivery source) │
//! │           └── ConsignmentSession ── ConsignmentItem ┤ (session source)  │
//! │                                                     ▼                   │
//! │                                  Claim ── ClaimItem                     │
//! │                                    ▲         ▲                          │
//! │                                    │         │ (optional)               │
//! │              Payment ── PaymentAllocation ───┘                          │
//! │                                                                         │
//! │  Status enums: ClaimStatus, SessionStatus, PaymentMethod,               │
//! │                AllocationState, CommissionType, ClaimSource             │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Storage Conventions
//! - `*_cents` fields hold [`Money`] as raw i64, `*_milli` fields hold
//!   [`Quantity`] as raw i64; accessor methods return the typed values
//! - Every root entity carries `owner_id`, the business account it belongs to
//! - Dual keys: UUID `id` for relations, human-readable number for people

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use ts_rs::TS;

use crate::money::{Money, Quantity};

// =============================================================================
// Owner
// =============================================================================

/// Opaque identifier of the business account that owns a record.
///
/// Every persistence call takes one; rows owned by someone else are
/// indistinguishable from rows that do not exist.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[serde(transparent)]
#[ts(export)]
pub struct OwnerId(String);

impl OwnerId {
    pub fn new(id: impl Into<String>) -> Self {
        OwnerId(id.into())
    }

    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OwnerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// =============================================================================
// Commission Rate
// =============================================================================

/// Commission rate in basis points.
///
/// 1 basis point = 0.01%, so 1000 bps = 10% and 10000 bps = 100%.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct CommissionRate(u32);

impl CommissionRate {
    /// Upper bound: a commission can never exceed the whole price.
    pub const MAX_BPS: u32 = 10_000;

    #[inline]
    pub const fn from_bps(bps: u32) -> Self {
        CommissionRate(bps)
    }

    /// Creates a rate from whole percent (10 → 10%).
    #[inline]
    pub const fn from_percent(pct: u32) -> Self {
        CommissionRate(pct * 100)
    }

    #[inline]
    pub const fn bps(&self) -> u32 {
        self.0
    }

    /// For display only.
    #[inline]
    pub fn percentage(&self) -> f64 {
        self.0 as f64 / 100.0
    }

    #[inline]
    pub const fn zero() -> Self {
        CommissionRate(0)
    }

    #[inline]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }
}

impl Default for CommissionRate {
    fn default() -> Self {
        CommissionRate::zero()
    }
}

// =============================================================================
// Status Enums
// =============================================================================

/// Claim lifecycle.
///
/// ```text
/// draft ──► submitted ──► approved ──► settled
///   │           │            ▲            │
///   └─────┬─────┘            └────────────┘ (balance re-opened)
///         ▼
///      rejected
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum ClaimStatus {
    Draft,
    Submitted,
    Approved,
    Rejected,
    Settled,
}

impl ClaimStatus {
    pub const fn as_str(&self) -> &'static str {
        match self {
            ClaimStatus::Draft => "draft",
            ClaimStatus::Submitted => "submitted",
            ClaimStatus::Approved => "approved",
            ClaimStatus::Rejected => "rejected",
            ClaimStatus::Settled => "settled",
        }
    }
}

impl Default for ClaimStatus {
    fn default() -> Self {
        ClaimStatus::Draft
    }
}

impl fmt::Display for ClaimStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a claim's quantities came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum ClaimSource {
    /// Reconciled delivery items, vendor-level commission rate.
    Delivery,
    /// A consignment session, per-item commission.
    Session,
}

/// Consignment session lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Open,
    Submitted,
    Claimed,
    Closed,
}

impl SessionStatus {
    pub const fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Open => "open",
            SessionStatus::Submitted => "submitted",
            SessionStatus::Claimed => "claimed",
            SessionStatus::Closed => "closed",
        }
    }
}

impl Default for SessionStatus {
    fn default() -> Self {
        SessionStatus::Open
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum CommissionType {
    Percent,
    Fixed,
}

/// How a payment is spread across claims.
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    /// Proportional to each claim's balance.
    BillToBill,
    /// The whole amount against one approved claim.
    PerClaim,
    /// Part of one submitted or approved claim.
    Partial,
    /// Recorded now, allocated later.
    CarryForward,
}

impl PaymentMethod {
    pub const fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::BillToBill => "bill_to_bill",
            PaymentMethod::PerClaim => "per_claim",
            PaymentMethod::Partial => "partial",
            PaymentMethod::CarryForward => "carry_forward",
        }
    }
}

impl fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum AllocationState {
    Allocated,
    Unallocated,
    PendingCarryForward,
}

/// Kinds of entries in a session's history log.
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum HistoryEventType {
    SessionCreated,
    SessionReconciled,
    SessionSubmitted,
    ClaimGenerated,
    SessionClosed,
}

// =============================================================================
// Vendor, Product, Delivery (read-only collaborators)
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Vendor {
    pub id: String,
    pub owner_id: String,
    pub name: String,
    /// Commission in basis points; `None` means no commission.
    pub commission_rate_bps: Option<u32>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

impl Vendor {
    #[inline]
    pub fn commission_rate(&self) -> CommissionRate {
        CommissionRate::from_bps(self.commission_rate_bps.unwrap_or(0))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Product {
    pub id: String,
    pub owner_id: String,
    pub name: String,
    pub sale_price_cents: i64,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

impl Product {
    #[inline]
    pub fn sale_price(&self) -> Money {
        Money::from_cents(self.sale_price_cents)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Delivery {
    pub id: String,
    pub owner_id: String,
    pub vendor_id: String,
    /// Invoice number printed on the delivery note.
    pub delivery_number: String,
    #[ts(as = "String")]
    pub delivery_date: NaiveDate,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

/// A delivered line whose quantities were reconciled upstream.
///
/// Reconciled quantities are `None` until the consumption process fills them.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct DeliveryItem {
    pub id: String,
    pub delivery_id: String,
    pub product_id: String,
    pub product_name: String,
    pub unit_price_cents: i64,
    pub quantity_delivered_milli: i64,
    pub quantity_sold_milli: Option<i64>,
    pub quantity_unsold_milli: Option<i64>,
    pub quantity_expired_milli: Option<i64>,
    pub quantity_damaged_milli: Option<i64>,
}

impl DeliveryItem {
    #[inline]
    pub fn unit_price(&self) -> Money {
        Money::from_cents(self.unit_price_cents)
    }

    /// Reconciled quantities, treating missing values as zero.
    pub fn reconciled(&self) -> ReconciledQuantities {
        ReconciledQuantities {
            delivered: Quantity::from_milli(self.quantity_delivered_milli),
            sold: Quantity::from_milli(self.quantity_sold_milli.unwrap_or(0)),
            unsold: Quantity::from_milli(self.quantity_unsold_milli.unwrap_or(0)),
            expired: Quantity::from_milli(self.quantity_expired_milli.unwrap_or(0)),
            damaged: Quantity::from_milli(self.quantity_damaged_milli.unwrap_or(0)),
        }
    }
}

/// The five quantities that must balance before anything is claimed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct ReconciledQuantities {
    pub delivered: Quantity,
    pub sold: Quantity,
    pub unsold: Quantity,
    pub expired: Quantity,
    pub damaged: Quantity,
}

impl ReconciledQuantities {
    /// `sold + unsold + expired + damaged`, or `None` if the sum overflows.
    #[inline]
    pub fn accounted(&self) -> Option<Quantity> {
        self.sold
            .checked_add(self.unsold)?
            .checked_add(self.expired)?
            .checked_add(self.damaged)
    }

    /// The four reconciled parts with their field names.
    pub fn parts(&self) -> [(&'static str, Quantity); 4] {
        [
            ("quantity_sold", self.sold),
            ("quantity_unsold", self.unsold),
            ("quantity_expired", self.expired),
            ("quantity_damaged", self.damaged),
        ]
    }
}

// =============================================================================
// Consignment Sessions
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct ConsignmentSession {
    pub id: String,
    pub owner_id: String,
    pub vendor_id: String,
    /// Human-readable reference, `CONS-YYYYMMDD-NNN`.
    pub reference: String,
    pub status: SessionStatus,
    pub note: Option<String>,
    /// Σ qty_sent across items.
    pub total_items_milli: i64,
    /// Σ item total value (qty_sent × unit price).
    pub total_value_cents: i64,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

impl ConsignmentSession {
    #[inline]
    pub fn total_items(&self) -> Quantity {
        Quantity::from_milli(self.total_items_milli)
    }

    #[inline]
    pub fn total_value(&self) -> Money {
        Money::from_cents(self.total_value_cents)
    }
}

/// One product placed with the vendor in a session.
///
/// Pricing is frozen at creation: `unit_price = list_price - commission_amount`.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct ConsignmentItem {
    pub id: String,
    pub session_id: String,
    pub product_id: String,
    pub product_name: String,
    pub qty_sent_milli: i64,
    pub qty_sold_milli: i64,
    pub qty_returned_milli: i64,
    pub list_price_cents: i64,
    pub unit_price_cents: i64,
    pub commission_type: CommissionType,
    /// Only set for percent commissions.
    pub commission_rate_bps: Option<u32>,
    /// Commission per unit in cents.
    pub commission_amount_cents: i64,
    pub total_value_cents: i64,
    pub position: i64,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

impl ConsignmentItem {
    #[inline]
    pub fn qty_sent(&self) -> Quantity {
        Quantity::from_milli(self.qty_sent_milli)
    }

    #[inline]
    pub fn qty_sold(&self) -> Quantity {
        Quantity::from_milli(self.qty_sold_milli)
    }

    #[inline]
    pub fn qty_returned(&self) -> Quantity {
        Quantity::from_milli(self.qty_returned_milli)
    }

    #[inline]
    pub fn list_price(&self) -> Money {
        Money::from_cents(self.list_price_cents)
    }

    #[inline]
    pub fn unit_price(&self) -> Money {
        Money::from_cents(self.unit_price_cents)
    }

    #[inline]
    pub fn commission_amount(&self) -> Money {
        Money::from_cents(self.commission_amount_cents)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct SessionHistoryEntry {
    pub id: String,
    pub session_id: String,
    pub owner_id: String,
    pub event_type: HistoryEventType,
    /// JSON details of the event.
    pub details: String,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// Claims
// =============================================================================

/// A settlement document summarizing what is owed to a vendor.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Claim {
    pub id: String,
    pub owner_id: String,
    pub vendor_id: String,
    /// `CLM-YYYYMMDD-NNNN`
    pub claim_number: String,
    #[ts(as = "String")]
    pub claim_date: NaiveDate,
    pub status: ClaimStatus,
    pub source: ClaimSource,
    pub session_id: Option<String>,
    pub gross_amount_cents: i64,
    /// Claim-level rate for delivery claims; session items carry their own.
    pub commission_rate_bps: Option<u32>,
    pub commission_amount_cents: i64,
    pub net_amount_cents: i64,
    pub paid_amount_cents: i64,
    pub balance_amount_cents: i64,
    pub notes: Option<String>,
    #[ts(as = "Option<String>")]
    pub submitted_at: Option<DateTime<Utc>>,
    #[ts(as = "Option<String>")]
    pub approved_at: Option<DateTime<Utc>>,
    #[ts(as = "Option<String>")]
    pub settled_at: Option<DateTime<Utc>>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

impl Claim {
    #[inline]
    pub fn gross_amount(&self) -> Money {
        Money::from_cents(self.gross_amount_cents)
    }

    #[inline]
    pub fn commission_amount(&self) -> Money {
        Money::from_cents(self.commission_amount_cents)
    }

    #[inline]
    pub fn net_amount(&self) -> Money {
        Money::from_cents(self.net_amount_cents)
    }

    #[inline]
    pub fn paid_amount(&self) -> Money {
        Money::from_cents(self.paid_amount_cents)
    }

    #[inline]
    pub fn balance_amount(&self) -> Money {
        Money::from_cents(self.balance_amount_cents)
    }

    #[inline]
    pub fn commission_rate(&self) -> CommissionRate {
        CommissionRate::from_bps(self.commission_rate_bps.unwrap_or(0))
    }
}

/// One product line on a claim.
///
/// Linked to exactly one of `delivery_item_id` or `consignment_item_id`.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct ClaimItem {
    pub id: String,
    pub claim_id: String,
    pub delivery_item_id: Option<String>,
    pub consignment_item_id: Option<String>,
    pub product_id: String,
    pub product_name: String,
    pub quantity_delivered_milli: i64,
    pub quantity_sold_milli: i64,
    pub quantity_unsold_milli: i64,
    pub quantity_expired_milli: i64,
    pub quantity_damaged_milli: i64,
    pub unit_price_cents: i64,
    pub gross_amount_cents: i64,
    pub commission_amount_cents: i64,
    pub net_amount_cents: i64,
    pub paid_amount_cents: i64,
    pub balance_amount_cents: i64,
    /// Payment deferred to a later settlement run.
    pub carry_forward: bool,
    /// Creation order; unitemized payments fill items in this order.
    pub position: i64,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

impl ClaimItem {
    #[inline]
    pub fn unit_price(&self) -> Money {
        Money::from_cents(self.unit_price_cents)
    }

    #[inline]
    pub fn net_amount(&self) -> Money {
        Money::from_cents(self.net_amount_cents)
    }

    #[inline]
    pub fn paid_amount(&self) -> Money {
        Money::from_cents(self.paid_amount_cents)
    }

    #[inline]
    pub fn balance_amount(&self) -> Money {
        Money::from_cents(self.balance_amount_cents)
    }

    pub fn quantities(&self) -> ReconciledQuantities {
        ReconciledQuantities {
            delivered: Quantity::from_milli(self.quantity_delivered_milli),
            sold: Quantity::from_milli(self.quantity_sold_milli),
            unsold: Quantity::from_milli(self.quantity_unsold_milli),
            expired: Quantity::from_milli(self.quantity_expired_milli),
            damaged: Quantity::from_milli(self.quantity_damaged_milli),
        }
    }
}

// =============================================================================
// Payments
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Payment {
    pub id: String,
    pub owner_id: String,
    pub vendor_id: String,
    /// `PAY-YYYYMMDD-NNNN`
    pub payment_number: String,
    #[ts(as = "String")]
    pub payment_date: NaiveDate,
    pub payment_method: PaymentMethod,
    pub total_amount_cents: i64,
    pub allocation_state: AllocationState,
    /// External reference (bank transfer id, cheque number).
    pub reference: Option<String>,
    pub notes: Option<String>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

impl Payment {
    #[inline]
    pub fn total_amount(&self) -> Money {
        Money::from_cents(self.total_amount_cents)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct PaymentAllocation {
    pub id: String,
    pub payment_id: String,
    pub claim_id: String,
    pub claim_item_id: Option<String>,
    pub allocated_amount_cents: i64,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

impl PaymentAllocation {
    #[inline]
    pub fn allocated_amount(&self) -> Money {
        Money::from_cents(self.allocated_amount_cents)
    }
}

// =============================================================================
// Event Outbox
// =============================================================================

/// A settlement event waiting to be handed to the publisher.
///
/// Written in the same transaction as the state change it describes.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct OutboxEntry {
    /// Also the event id consumers de-duplicate on.
    pub id: String,
    pub owner_id: String,
    /// Topic name, e.g. `consignment-claim-generated`.
    pub topic: String,
    pub aggregate_id: String,
    pub payload: String,
    pub attempts: i64,
    pub last_error: Option<String>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "Option<String>")]
    pub attempted_at: Option<DateTime<Utc>>,
    #[ts(as = "Option<String>")]
    pub published_at: Option<DateTime<Utc>>,
}

// =============================================================================
// Read Models
// =============================================================================

/// A claim line with the delivery it came from.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct ClaimLine {
    pub item: ClaimItem,
    /// Invoice number of the source delivery (delivery claims only).
    pub delivery_number: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct ClaimDetail {
    pub claim: Claim,
    pub vendor_name: String,
    pub items: Vec<ClaimLine>,
}

/// One page of claims.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct ClaimPage {
    pub claims: Vec<Claim>,
    pub total: i64,
    pub has_more: bool,
}

/// An allocation with the claim number it was applied to.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct AllocationLine {
    pub id: String,
    pub claim_id: String,
    pub claim_number: String,
    pub claim_item_id: Option<String>,
    pub allocated_amount_cents: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct PaymentDetail {
    pub payment: Payment,
    pub vendor_name: String,
    pub allocations: Vec<AllocationLine>,
    pub allocated_amount_cents: i64,
}

/// One page of payments.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct PaymentPage {
    pub payments: Vec<Payment>,
    pub total: i64,
    pub has_more: bool,
}

/// A claim contributing to a vendor's outstanding balance.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct OutstandingClaim {
    pub claim_id: String,
    pub claim_number: String,
    #[ts(as = "String")]
    pub claim_date: NaiveDate,
    pub status: ClaimStatus,
    pub balance_amount_cents: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct OutstandingBalance {
    pub vendor_id: String,
    pub total_outstanding_cents: i64,
    pub claims: Vec<OutstandingClaim>,
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_commission_rate_from_percent() {
        let rate = CommissionRate::from_percent(10);
        assert_eq!(rate.bps(), 1000);
        assert!((rate.percentage() - 10.0).abs() < 0.001);
    }

    #[test]
    fn test_status_defaults() {
        assert_eq!(ClaimStatus::default(), ClaimStatus::Draft);
        assert_eq!(SessionStatus::default(), SessionStatus::Open);
    }

    #[test]
    fn test_enum_serde_snake_case() {
        let json = serde_json::to_string(&PaymentMethod::BillToBill).unwrap();
        assert_eq!(json, "\"bill_to_bill\"");
        let state: AllocationState = serde_json::from_str("\"pending_carry_forward\"").unwrap();
        assert_eq!(state, AllocationState::PendingCarryForward);
    }

    #[test]
    fn test_reconciled_defaults_missing_to_zero() {
        let item = DeliveryItem {
            id: "di-1".to_string(),
            delivery_id: "d-1".to_string(),
            product_id: "p-1".to_string(),
            product_name: "Sourdough".to_string(),
            unit_price_cents: 500,
            quantity_delivered_milli: 10_000,
            quantity_sold_milli: Some(6_000),
            quantity_unsold_milli: None,
            quantity_expired_milli: Some(4_000),
            quantity_damaged_milli: None,
        };
        let q = item.reconciled();
        assert_eq!(q.unsold, Quantity::zero());
        assert_eq!(q.accounted(), Some(Quantity::from_units(10)));
    }

    #[test]
    fn test_accounted_overflow_is_none() {
        let q = ReconciledQuantities {
            delivered: Quantity::from_units(1),
            sold: Quantity::from_milli(i64::MAX),
            unsold: Quantity::from_milli(1),
            expired: Quantity::zero(),
            damaged: Quantity::zero(),
        };
        assert_eq!(q.accounted(), None);
    }

    #[test]
    fn test_owner_id_serializes_transparently() {
        let owner = OwnerId::new("acct-1");
        assert_eq!(serde_json::to_string(&owner).unwrap(), "\"acct-1\"");
        assert_eq!(owner.to_string(), "acct-1");
    }
}
