//! Reimbursement settlement: what a partner owes back for a disbursed
//! advance (principal plus service fee) and how that obligation gets paid.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::PgPool;
use uuid::Uuid;

use crate::db::models::{NewReimbursement, Reimbursement, Transaction};
use crate::db::queries;
use crate::domain::{PaymentMethod, ReimbursementStatus};
use crate::error::AppError;
use crate::gateway::{GatewayClient, InitiatePaymentRequest};
use crate::validation;

/// Total owed. Always recomputed from the parts; a stored total is never
/// trusted.
pub fn total_due(reimbursement: &Reimbursement) -> i64 {
    reimbursement.transaction_amount + reimbursement.service_fee
}

/// Effective status on read paths: a pending obligation past its due date
/// reports as late without any write.
pub fn effective_status(reimbursement: &Reimbursement, now: DateTime<Utc>) -> ReimbursementStatus {
    if reimbursement.status == ReimbursementStatus::Pending && now > reimbursement.due_date {
        ReimbursementStatus::Late
    } else {
        reimbursement.status
    }
}

/// Reimbursement as served to operators: stored row plus the derived
/// status and recomputed total.
#[derive(Debug, Clone, Serialize)]
pub struct ReimbursementView {
    #[serde(flatten)]
    pub reimbursement: Reimbursement,
    pub effective_status: ReimbursementStatus,
    pub total_due: i64,
}

impl ReimbursementView {
    pub fn at(reimbursement: Reimbursement, now: DateTime<Utc>) -> Self {
        let effective = effective_status(&reimbursement, now);
        let total = total_due(&reimbursement);
        Self {
            reimbursement,
            effective_status: effective,
            total_due: total,
        }
    }
}

#[derive(Clone)]
pub struct ReimbursementService {
    pool: PgPool,
    gateway: GatewayClient,
    return_url: String,
    callback_url: String,
}

impl ReimbursementService {
    pub fn new(pool: PgPool, gateway: GatewayClient, public_base_url: String) -> Self {
        let base = public_base_url.trim_end_matches('/').to_string();
        Self {
            pool,
            gateway,
            return_url: format!("{}/reimbursements/return", base),
            callback_url: format!("{}/callback", base),
        }
    }

    /// Claims a settled disbursement transaction as the source of a new
    /// reimbursement. The unique constraint on the transaction reference
    /// makes double-claiming impossible even under concurrent operators.
    pub async fn create_for_transaction(
        &self,
        transaction_id: Uuid,
        service_fee: i64,
        due_date: DateTime<Utc>,
    ) -> Result<Reimbursement, AppError> {
        if service_fee < 0 {
            return Err(AppError::Validation(
                "service fee must not be negative".to_string(),
            ));
        }

        let transaction = self.settled_transaction(transaction_id).await?;

        let (Some(partner_id), Some(employee_id)) =
            (transaction.partner_id, transaction.employee_id)
        else {
            return Err(AppError::InvalidState(format!(
                "transaction {} has no partner/employee attribution",
                transaction.external_id
            )));
        };

        let new = NewReimbursement {
            transaction_id,
            partner_id,
            employee_id,
            transaction_amount: transaction.amount,
            service_fee,
            due_date,
            method: PaymentMethod::MobileMoney,
        };

        match queries::insert_reimbursement(&self.pool, &new).await {
            Ok(reimbursement) => Ok(reimbursement),
            Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
                Err(AppError::InvalidState(format!(
                    "transaction {} is already claimed by a reimbursement",
                    transaction.external_id
                )))
            }
            Err(e) => Err(AppError::Database(e)),
        }
    }

    /// Opens a gateway payment for a pending reimbursement.
    ///
    /// Validation failures reject before any I/O, and a non-pending status
    /// is refused without calling the gateway. The reimbursement is *not*
    /// marked paid here: only a later reconciliation of the payment's own
    /// external id does that.
    pub async fn initiate_payment(
        &self,
        reimbursement_id: Uuid,
        amount: i64,
        currency: &str,
    ) -> Result<Reimbursement, AppError> {
        validation::validate_positive_amount(amount)?;
        validation::validate_required("currency", currency)?;

        let reimbursement = queries::get_reimbursement(&self.pool, reimbursement_id)
            .await?
            .ok_or_else(|| {
                AppError::NotFound(format!("reimbursement {} not found", reimbursement_id))
            })?;

        if reimbursement.status != ReimbursementStatus::Pending {
            return Err(AppError::InvalidState(format!(
                "reimbursement {} is {:?}, only pending ones can be paid",
                reimbursement_id, reimbursement.status
            )));
        }

        let external_id = format!("RBM-{}", Uuid::new_v4().simple());
        let initiated = self
            .gateway
            .initiate_payment(&InitiatePaymentRequest {
                external_id: external_id.clone(),
                amount,
                currency: currency.to_string(),
                return_url: self.return_url.clone(),
                callback_url: self.callback_url.clone(),
            })
            .await?;

        let payment_reference = format!(
            "REF-{}-{}",
            reimbursement.partner_id.simple(),
            Utc::now().format("%Y%m%d%H%M%S")
        );

        let recorded = queries::set_reimbursement_payment(
            &self.pool,
            reimbursement_id,
            &initiated.external_id,
            &payment_reference,
        )
        .await?;

        if !recorded {
            // A concurrent transition moved the reimbursement off pending
            // between the status check and this write. Refuse rather than
            // lose track of the gateway payment silently.
            tracing::error!(
                reimbursement_id = %reimbursement_id,
                payment_id = %initiated.external_id,
                "reimbursement left pending during payment initiation, payment id not recorded"
            );
            return Err(AppError::InvalidState(format!(
                "reimbursement {} left pending state during payment initiation",
                reimbursement_id
            )));
        }

        // The payment itself enters the ledger as a pending transaction so
        // webhooks and resyncs can find it by its external id.
        let new_transaction = crate::db::models::NewTransaction {
            external_id: initiated.external_id.clone(),
            amount,
            method: PaymentMethod::MobileMoney,
            status: crate::domain::TransactionStatus::Pending,
            settled_at: None,
            callback_message: None,
            advance_request_id: None,
            partner_id: Some(reimbursement.partner_id),
            employee_id: Some(reimbursement.employee_id),
        };
        queries::upsert_transaction_by_external_id(&self.pool, &new_transaction).await?;

        tracing::info!(
            reimbursement_id = %reimbursement_id,
            payment_id = %initiated.external_id,
            amount,
            "reimbursement payment initiated"
        );

        queries::get_reimbursement(&self.pool, reimbursement_id)
            .await?
            .ok_or_else(|| {
                AppError::Internal("reimbursement vanished after payment initiation".to_string())
            })
    }

    /// The pool an operator claims from: settled disbursements of the
    /// partner with no reimbursement yet. Recomputed at call time.
    pub async fn list_eligible(&self, partner_id: Uuid) -> Result<Vec<Transaction>, AppError> {
        queries::list_eligible_transactions(&self.pool, partner_id)
            .await
            .map_err(AppError::Database)
    }

    pub async fn list_for_partner(
        &self,
        partner_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Vec<ReimbursementView>, AppError> {
        let rows = queries::list_reimbursements_by_partner(&self.pool, partner_id).await?;
        Ok(rows
            .into_iter()
            .map(|r| ReimbursementView::at(r, now))
            .collect())
    }

    async fn settled_transaction(&self, transaction_id: Uuid) -> Result<Transaction, AppError> {
        let transaction = sqlx::query_as::<_, Transaction>(
            "SELECT * FROM transactions WHERE id = $1",
        )
        .bind(transaction_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("transaction {} not found", transaction_id)))?;

        if transaction.status != crate::domain::TransactionStatus::Succeeded {
            return Err(AppError::InvalidState(format!(
                "transaction {} has not settled, it cannot be reclaimed",
                transaction.external_id
            )));
        }

        Ok(transaction)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sample(status: ReimbursementStatus, due: DateTime<Utc>) -> Reimbursement {
        Reimbursement {
            id: Uuid::new_v4(),
            transaction_id: Uuid::new_v4(),
            partner_id: Uuid::new_v4(),
            employee_id: Uuid::new_v4(),
            transaction_amount: 100_000,
            service_fee: 5_000,
            due_date: due,
            status,
            method: PaymentMethod::MobileMoney,
            payment_external_id: None,
            payment_reference: None,
            settlement_external_id: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn total_is_principal_plus_fee() {
        let due = Utc::now();
        let r = sample(ReimbursementStatus::Pending, due);
        assert_eq!(total_due(&r), 105_000);
    }

    #[test]
    fn pending_past_due_reads_late() {
        let due = Utc.with_ymd_and_hms(2024, 1, 31, 0, 0, 0).unwrap();
        let now = Utc.with_ymd_and_hms(2024, 2, 1, 0, 0, 0).unwrap();

        let r = sample(ReimbursementStatus::Pending, due);
        assert_eq!(effective_status(&r, now), ReimbursementStatus::Late);
    }

    #[test]
    fn pending_before_due_stays_pending() {
        let due = Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap();
        let now = Utc.with_ymd_and_hms(2024, 2, 1, 0, 0, 0).unwrap();

        let r = sample(ReimbursementStatus::Pending, due);
        assert_eq!(effective_status(&r, now), ReimbursementStatus::Pending);
    }

    #[test]
    fn paid_never_reads_late() {
        let due = Utc.with_ymd_and_hms(2024, 1, 31, 0, 0, 0).unwrap();
        let now = Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap();

        let r = sample(ReimbursementStatus::Paid, due);
        assert_eq!(effective_status(&r, now), ReimbursementStatus::Paid);
    }

    #[test]
    fn view_carries_derived_fields() {
        let due = Utc.with_ymd_and_hms(2024, 1, 31, 0, 0, 0).unwrap();
        let now = Utc.with_ymd_and_hms(2024, 2, 15, 0, 0, 0).unwrap();

        let view = ReimbursementView::at(sample(ReimbursementStatus::Pending, due), now);
        assert_eq!(view.effective_status, ReimbursementStatus::Late);
        assert_eq!(view.total_due, 105_000);
    }
}
