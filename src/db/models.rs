use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use crate::domain::{AdvanceStatus, PaymentMethod, ReimbursementStatus, TransactionStatus};

/// One money movement attempt, keyed by the gateway's transaction number.
/// Amounts are integers in the smallest currency unit.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Transaction {
    pub id: Uuid,
    pub external_id: String,
    pub amount: i64,
    pub method: PaymentMethod,
    pub status: TransactionStatus,
    pub settled_at: Option<DateTime<Utc>>,
    pub callback_message: Option<String>,
    pub advance_request_id: Option<Uuid>,
    pub partner_id: Option<Uuid>,
    pub employee_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields for inserting a transaction (or reconciling an existing one).
#[derive(Debug, Clone)]
pub struct NewTransaction {
    pub external_id: String,
    pub amount: i64,
    pub method: PaymentMethod,
    pub status: TransactionStatus,
    pub settled_at: Option<DateTime<Utc>>,
    pub callback_message: Option<String>,
    pub advance_request_id: Option<Uuid>,
    pub partner_id: Option<Uuid>,
    pub employee_id: Option<Uuid>,
}

/// Result of `queries::upsert_transaction_by_external_id`.
///
/// `changed` is the idempotency boundary of the engine: cascades and
/// notification intents fire only when it is true.
#[derive(Debug, Clone)]
pub struct UpsertOutcome {
    pub changed: bool,
    pub inserted: bool,
    pub transaction: Transaction,
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct AdvanceRequest {
    pub id: Uuid,
    pub employee_id: Uuid,
    pub amount: i64,
    pub available_salary: i64,
    pub status: AdvanceStatus,
    pub rejection_reason: Option<String>,
    pub validated_at: Option<DateTime<Utc>>,
    pub receipt_number: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Reimbursement {
    pub id: Uuid,
    pub transaction_id: Uuid,
    pub partner_id: Uuid,
    pub employee_id: Uuid,
    pub transaction_amount: i64,
    pub service_fee: i64,
    pub due_date: DateTime<Utc>,
    pub status: ReimbursementStatus,
    pub method: PaymentMethod,
    pub payment_external_id: Option<String>,
    pub payment_reference: Option<String>,
    pub settlement_external_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewReimbursement {
    pub transaction_id: Uuid,
    pub partner_id: Uuid,
    pub employee_id: Uuid,
    pub transaction_amount: i64,
    pub service_fee: i64,
    pub due_date: DateTime<Utc>,
    pub method: PaymentMethod,
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Partner {
    pub id: Uuid,
    pub name: String,
    pub contact_phone: Option<String>,
    pub contact_email: Option<String>,
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Employee {
    pub id: Uuid,
    pub partner_id: Uuid,
    pub name: String,
    pub contact_phone: Option<String>,
    pub contact_email: Option<String>,
}
