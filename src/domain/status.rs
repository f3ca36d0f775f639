//! Status vocabularies of the ledger and the mapping from the gateway's
//! payment outcome strings into the internal transaction status.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Internal status of a money movement attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "transaction_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum TransactionStatus {
    Pending,
    Succeeded,
    Cancelled,
}

impl TransactionStatus {
    /// `Succeeded` is terminal: no later gateway report may overwrite it.
    pub fn is_terminal(&self) -> bool {
        matches!(self, TransactionStatus::Succeeded)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionStatus::Pending => "pending",
            TransactionStatus::Succeeded => "succeeded",
            TransactionStatus::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle of a salary advance request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "advance_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum AdvanceStatus {
    Pending,
    Approved,
    Rejected,
}

/// Stored lifecycle of a reimbursement. `Late` is never written: it is
/// derived on read paths from `due_date` (see `services::reimbursement`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "reimbursement_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ReimbursementStatus {
    Pending,
    Paid,
    Late,
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "payment_method", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    MobileMoney,
    BankTransfer,
    Cheque,
    Cash,
}

/// Maps the gateway's status vocabulary onto the internal one.
///
/// Case-insensitive on the raw string. Returns `None` for anything the
/// gateway vocabulary does not cover; callers treat that as "no new
/// information" and keep the stored status.
///
/// `PENDING` and `INITIATED` both map to `Pending`: the gateway has
/// acknowledged the payment but nothing has settled yet.
pub fn map_gateway_status(raw: &str) -> Option<TransactionStatus> {
    match raw.trim().to_ascii_uppercase().as_str() {
        "SUCCESS" => Some(TransactionStatus::Succeeded),
        "FAILED" | "CANCELLED" => Some(TransactionStatus::Cancelled),
        "PENDING" | "INITIATED" => Some(TransactionStatus::Pending),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_success_to_succeeded() {
        assert_eq!(
            map_gateway_status("SUCCESS"),
            Some(TransactionStatus::Succeeded)
        );
    }

    #[test]
    fn maps_failure_vocabulary_to_cancelled() {
        assert_eq!(
            map_gateway_status("FAILED"),
            Some(TransactionStatus::Cancelled)
        );
        assert_eq!(
            map_gateway_status("CANCELLED"),
            Some(TransactionStatus::Cancelled)
        );
    }

    #[test]
    fn maps_in_flight_vocabulary_to_pending() {
        assert_eq!(
            map_gateway_status("PENDING"),
            Some(TransactionStatus::Pending)
        );
        assert_eq!(
            map_gateway_status("INITIATED"),
            Some(TransactionStatus::Pending)
        );
    }

    #[test]
    fn is_case_insensitive() {
        assert_eq!(
            map_gateway_status("success"),
            Some(TransactionStatus::Succeeded)
        );
        assert_eq!(
            map_gateway_status("  Failed "),
            Some(TransactionStatus::Cancelled)
        );
    }

    #[test]
    fn unknown_input_maps_to_none() {
        assert_eq!(map_gateway_status("REFUNDED"), None);
        assert_eq!(map_gateway_status(""), None);
        assert_eq!(map_gateway_status("garbage"), None);
    }

    #[test]
    fn only_succeeded_is_terminal() {
        assert!(TransactionStatus::Succeeded.is_terminal());
        assert!(!TransactionStatus::Pending.is_terminal());
        assert!(!TransactionStatus::Cancelled.is_terminal());
    }
}
