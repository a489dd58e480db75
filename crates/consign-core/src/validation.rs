//! # Validation Module
//!
//! Input validation applied before any settlement rule runs.
//!
//! ## Usage
//! ```rust
//! use consign_core::money::Quantity;
//! use consign_core::validation::{validate_not_empty, validate_positive_quantity};
//!
//! validate_not_empty("delivery_ids", &["d-1"]).unwrap();
//! validate_positive_quantity("quantity", Quantity::from_units(5)).unwrap();
//! ```

use chrono::NaiveDate;

use crate::error::ValidationError;
use crate::money::{Money, Quantity, MAX_AMOUNT, MAX_QUANTITY};
use crate::types::CommissionRate;
use crate::{MAX_LIST_INPUT, MAX_NOTES_LENGTH};

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

// =============================================================================
// String Validators
// =============================================================================

/// Validates that a text field is present and not blank.
///
/// ```rust
/// use consign_core::validation::validate_required;
///
/// assert!(validate_required("reason", "damaged in transit").is_ok());
/// assert!(validate_required("reason", "   ").is_err());
/// ```
pub fn validate_required(field: &str, value: &str) -> ValidationResult<()> {
    if value.trim().is_empty() {
        return Err(ValidationError::Required {
            field: field.to_string(),
        });
    }
    Ok(())
}

/// Validates optional free text (notes, references).
///
/// Blank values are normalized to `None`.
pub fn validate_notes(field: &str, value: Option<&str>) -> ValidationResult<Option<String>> {
    let Some(value) = value.map(str::trim).filter(|v| !v.is_empty()) else {
        return Ok(None);
    };

    if value.chars().count() > MAX_NOTES_LENGTH {
        return Err(ValidationError::TooLong {
            field: field.to_string(),
            max: MAX_NOTES_LENGTH,
        });
    }

    Ok(Some(value.to_string()))
}

// =============================================================================
// Collection Validators
// =============================================================================

/// Validates that a list input has at least one and at most
/// [`MAX_LIST_INPUT`] entries.
pub fn validate_not_empty<T>(field: &str, items: &[T]) -> ValidationResult<()> {
    if items.is_empty() {
        return Err(ValidationError::Required {
            field: field.to_string(),
        });
    }

    if items.len() > MAX_LIST_INPUT {
        return Err(ValidationError::OutOfRange {
            field: format!("{} count", field),
            min: 1,
            max: MAX_LIST_INPUT as i64,
        });
    }

    Ok(())
}

// =============================================================================
// Numeric Validators
// =============================================================================

pub fn validate_positive_quantity(field: &str, qty: Quantity) -> ValidationResult<()> {
    if !qty.is_positive() {
        return Err(ValidationError::MustBePositive {
            field: field.to_string(),
        });
    }
    validate_quantity_ceiling(field, qty)
}

pub fn validate_non_negative_quantity(field: &str, qty: Quantity) -> ValidationResult<()> {
    if qty.is_negative() {
        return Err(ValidationError::MustNotBeNegative {
            field: field.to_string(),
        });
    }
    validate_quantity_ceiling(field, qty)
}

/// Rejects quantities above [`MAX_QUANTITY`].
pub fn validate_quantity_ceiling(field: &str, qty: Quantity) -> ValidationResult<()> {
    if qty > MAX_QUANTITY {
        return Err(ValidationError::TooLarge {
            field: field.to_string(),
            max: MAX_QUANTITY.to_string(),
        });
    }
    Ok(())
}

/// Validates a payment or allocation amount.
///
/// ```rust
/// use consign_core::money::Money;
/// use consign_core::validation::validate_positive_amount;
///
/// assert!(validate_positive_amount("total_amount", Money::from_cents(1)).is_ok());
/// assert!(validate_positive_amount("total_amount", Money::zero()).is_err());
/// assert!(validate_positive_amount("total_amount", Money::from_cents(i64::MAX)).is_err());
/// ```
pub fn validate_positive_amount(field: &str, amount: Money) -> ValidationResult<()> {
    if !amount.is_positive() {
        return Err(ValidationError::MustBePositive {
            field: field.to_string(),
        });
    }
    validate_amount_ceiling(field, amount)
}

pub fn validate_non_negative_amount(field: &str, amount: Money) -> ValidationResult<()> {
    if amount.is_negative() {
        return Err(ValidationError::MustNotBeNegative {
            field: field.to_string(),
        });
    }
    validate_amount_ceiling(field, amount)
}

/// Rejects amounts above [`MAX_AMOUNT`].
pub fn validate_amount_ceiling(field: &str, amount: Money) -> ValidationResult<()> {
    if amount > MAX_AMOUNT {
        return Err(ValidationError::TooLarge {
            field: field.to_string(),
            max: MAX_AMOUNT.to_string(),
        });
    }
    Ok(())
}

/// Validates a percentage commission rate: 0% to 100%.
pub fn validate_commission_rate(rate: CommissionRate) -> ValidationResult<()> {
    if rate.bps() > CommissionRate::MAX_BPS {
        return Err(ValidationError::OutOfRange {
            field: "commission_rate".to_string(),
            min: 0,
            max: CommissionRate::MAX_BPS as i64,
        });
    }
    Ok(())
}

// =============================================================================
// Query Validators
// =============================================================================

/// Validates a page size against the configured maximum.
pub fn validate_limit(limit: u32, max: u32) -> ValidationResult<()> {
    if limit == 0 || limit > max {
        return Err(ValidationError::OutOfRange {
            field: "limit".to_string(),
            min: 1,
            max: max as i64,
        });
    }
    Ok(())
}

/// Validates that a date range is not inverted.
pub fn validate_date_range(from: Option<NaiveDate>, to: Option<NaiveDate>) -> ValidationResult<()> {
    if let (Some(from), Some(to)) = (from, to) {
        if from > to {
            return Err(ValidationError::InvalidFormat {
                field: "date_range".to_string(),
                reason: format!("from {} is after to {}", from, to),
            });
        }
    }
    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn test_validate_required() {
        assert!(validate_required("reason", "wrong totals").is_ok());
        assert!(matches!(
            validate_required("reason", ""),
            Err(ValidationError::Required { .. })
        ));
    }

    #[test]
    fn test_validate_notes_normalizes_blank() {
        assert_eq!(validate_notes("notes", Some("  ")).unwrap(), None);
        assert_eq!(validate_notes("notes", None).unwrap(), None);
        assert_eq!(
            validate_notes("notes", Some(" weekly run ")).unwrap(),
            Some("weekly run".to_string())
        );
        let long = "x".repeat(MAX_NOTES_LENGTH + 1);
        assert!(validate_notes("notes", Some(&long)).is_err());
    }

    #[test]
    fn test_validate_not_empty() {
        let empty: [&str; 0] = [];
        assert!(validate_not_empty("claim_ids", &empty).is_err());
        assert!(validate_not_empty("claim_ids", &["c-1"]).is_ok());
    }

    #[rstest]
    #[case(0, false)]
    #[case(-1, false)]
    #[case(1, true)]
    #[case(2_500, true)]
    fn test_validate_positive_quantity(#[case] milli: i64, #[case] ok: bool) {
        assert_eq!(
            validate_positive_quantity("quantity", Quantity::from_milli(milli)).is_ok(),
            ok
        );
    }

    #[rstest]
    #[case(0, true)]
    #[case(5_000, true)]
    #[case(10_000, true)]
    #[case(10_001, false)]
    fn test_validate_commission_rate(#[case] bps: u32, #[case] ok: bool) {
        assert_eq!(validate_commission_rate(CommissionRate::from_bps(bps)).is_ok(), ok);
    }

    #[rstest]
    #[case(Quantity::from_units(1), true)]
    #[case(MAX_QUANTITY, true)]
    #[case(Quantity::from_milli(MAX_QUANTITY.milli() + 1), false)]
    #[case(Quantity::from_milli(i64::MAX), false)]
    fn test_quantity_ceiling(#[case] qty: Quantity, #[case] ok: bool) {
        assert_eq!(validate_positive_quantity("quantity", qty).is_ok(), ok);
        assert_eq!(validate_non_negative_quantity("quantity", qty).is_ok(), ok);
    }

    #[test]
    fn test_amount_ceiling() {
        assert!(validate_positive_amount("amount", MAX_AMOUNT).is_ok());
        assert!(matches!(
            validate_positive_amount("amount", Money::from_cents(i64::MAX)),
            Err(ValidationError::TooLarge { .. })
        ));
        assert!(matches!(
            validate_non_negative_amount("commission_value", Money::from_cents(MAX_AMOUNT.cents() + 1)),
            Err(ValidationError::TooLarge { .. })
        ));
    }

    #[test]
    fn test_validate_limit() {
        assert!(validate_limit(20, 100).is_ok());
        assert!(validate_limit(0, 100).is_err());
        assert!(validate_limit(101, 100).is_err());
    }

    #[test]
    fn test_validate_date_range() {
        let jan = NaiveDate::from_ymd_opt(2024, 1, 1);
        let feb = NaiveDate::from_ymd_opt(2024, 2, 1);
        assert!(validate_date_range(jan, feb).is_ok());
        assert!(validate_date_range(feb, jan).is_err());
        assert!(validate_date_range(None, jan).is_ok());
    }
}
