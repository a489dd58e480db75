//! # Business Numbers
//!
//! Human-readable identifiers printed on settlement documents.
//!
//! ```text
//! CLM-20240315-0001   claim        (daily sequence per owner, 4 digits)
//! PAY-20240315-0001   payment      (daily sequence per owner, 4 digits)
//! CONS-20240315-001   session      (daily sequence per owner, 3 digits)
//! ```
//!
//! The sequence is `1 + <records the owner already has for that day>`, counted
//! inside the creating transaction.

use chrono::NaiveDate;

pub const CLAIM_PREFIX: &str = "CLM";
pub const PAYMENT_PREFIX: &str = "PAY";
pub const SESSION_PREFIX: &str = "CONS";

pub fn claim_number(date: NaiveDate, sequence: u32) -> String {
    format!("{}-{}-{:04}", CLAIM_PREFIX, date.format("%Y%m%d"), sequence)
}

pub fn payment_number(date: NaiveDate, sequence: u32) -> String {
    format!("{}-{}-{:04}", PAYMENT_PREFIX, date.format("%Y%m%d"), sequence)
}

pub fn session_reference(date: NaiveDate, sequence: u32) -> String {
    format!("{}-{}-{:03}", SESSION_PREFIX, date.format("%Y%m%d"), sequence)
}

/// The `PREFIX-YYYYMMDD-` part shared by every number issued that day.
pub fn daily_prefix(prefix: &str, date: NaiveDate) -> String {
    format!("{}-{}-", prefix, date.format("%Y%m%d"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_formats() {
        let date = NaiveDate::from_ymd_opt(2024, 3, 15).unwrap();
        assert_eq!(claim_number(date, 1), "CLM-20240315-0001");
        assert_eq!(payment_number(date, 42), "PAY-20240315-0042");
        assert_eq!(session_reference(date, 7), "CONS-20240315-007");
        assert_eq!(daily_prefix(CLAIM_PREFIX, date), "CLM-20240315-");
    }
}
