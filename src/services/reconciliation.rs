//! Reconciliation of the internal ledger against the payment gateway.
//!
//! All entry points funnel into the same guarded upsert, so webhook
//! deliveries, operator resyncs and bulk imports are idempotent against
//! each other: a status transition is applied once, cascades once, and
//! notifies once, no matter how many callers observe it.

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use sqlx::PgPool;

use crate::db::models::{NewTransaction, Transaction, UpsertOutcome};
use crate::db::queries;
use crate::domain::{map_gateway_status, PaymentMethod, TransactionStatus};
use crate::error::AppError;
use crate::gateway::{GatewayClient, GatewayPaymentRecord, StatusLookup};
use crate::services::advance::{self, CascadeResult};
use crate::services::notify::{NotificationDispatcher, NotificationIntent, NotificationKind};
use uuid::Uuid;

/// Result of reconciling a single transaction.
#[derive(Debug, Clone, Serialize)]
pub struct ResyncOutcome {
    pub external_id: String,
    pub status: TransactionStatus,
    pub changed: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum ItemResult {
    Updated { status: TransactionStatus },
    Unchanged { status: TransactionStatus },
    Error { message: String },
}

#[derive(Debug, Clone, Serialize)]
pub struct ItemOutcome {
    pub external_id: String,
    #[serde(flatten)]
    pub result: ItemResult,
}

/// Per-item outcomes plus aggregate counts for a batch resync.
#[derive(Debug, Clone, Serialize)]
pub struct ResyncBatchReport {
    pub outcomes: Vec<ItemOutcome>,
    pub updated: usize,
    pub unchanged: usize,
    pub errors: usize,
    /// True when an item or time cap stopped the batch early.
    pub truncated: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct ImportReport {
    pub imported: usize,
    pub updated: usize,
    pub unchanged: usize,
    pub errors: usize,
}

/// Caps for a batch run. The batch returns partial results when a cap is
/// hit instead of failing outright.
#[derive(Debug, Clone, Copy)]
pub struct BatchLimits {
    pub max_items: usize,
    pub max_elapsed: Duration,
    pub per_item_timeout: Duration,
}

impl Default for BatchLimits {
    fn default() -> Self {
        Self {
            max_items: 500,
            max_elapsed: Duration::from_secs(120),
            per_item_timeout: Duration::from_secs(20),
        }
    }
}

#[derive(Clone)]
pub struct ReconciliationService {
    pool: PgPool,
    gateway: GatewayClient,
    notifier: Arc<dyn NotificationDispatcher>,
}

impl ReconciliationService {
    pub fn new(
        pool: PgPool,
        gateway: GatewayClient,
        notifier: Arc<dyn NotificationDispatcher>,
    ) -> Self {
        Self {
            pool,
            gateway,
            notifier,
        }
    }

    /// Resynchronizes one transaction against the gateway.
    ///
    /// A gateway answer of "unknown" (no record, empty body, unmapped
    /// status string) is not a failure: the stored status is reported back
    /// with `changed = false`.
    pub async fn resync_one(&self, external_id: &str) -> Result<ResyncOutcome, AppError> {
        let lookup = self.gateway.query_status(external_id).await?;

        match lookup {
            StatusLookup::Known(record) => self.apply_record(external_id, &record).await,
            StatusLookup::Unknown => self.fallback_to_stored(external_id).await,
        }
    }

    /// Applies one gateway-reported record to the ledger and runs the
    /// cascades when the guarded write actually changed something. Shared
    /// by single resync, webhook delivery and bulk import.
    pub async fn apply_record(
        &self,
        external_id: &str,
        record: &GatewayPaymentRecord,
    ) -> Result<ResyncOutcome, AppError> {
        let Some(mapped) = map_gateway_status(&record.status) else {
            tracing::warn!(
                external_id = %external_id,
                gateway_status = %record.status,
                "unrecognized gateway status, keeping stored state"
            );
            return self.fallback_to_stored(external_id).await;
        };

        let stored = queries::find_transaction_by_external_id(&self.pool, external_id).await?;

        let new = match &stored {
            Some(t) => NewTransaction {
                external_id: external_id.to_string(),
                amount: t.amount,
                method: t.method,
                status: mapped,
                settled_at: record.settled_at,
                callback_message: record.message.clone(),
                advance_request_id: t.advance_request_id,
                partner_id: t.partner_id,
                employee_id: t.employee_id,
            },
            None => {
                // First sighting of this payment. Without a positive amount
                // there is nothing to put on the ledger yet.
                let Some(amount) = record.amount.filter(|a| *a > 0) else {
                    return Err(AppError::NotFound(format!(
                        "transaction {} is unknown locally and the gateway record carries no amount",
                        external_id
                    )));
                };
                NewTransaction {
                    external_id: external_id.to_string(),
                    amount,
                    method: PaymentMethod::MobileMoney,
                    status: mapped,
                    settled_at: record.settled_at,
                    callback_message: record.message.clone(),
                    advance_request_id: None,
                    partner_id: None,
                    employee_id: None,
                }
            }
        };

        let outcome = queries::upsert_transaction_by_external_id(&self.pool, &new).await?;

        if outcome.changed {
            self.cascade(&outcome).await?;
        }

        Ok(ResyncOutcome {
            external_id: external_id.to_string(),
            status: outcome.transaction.status,
            changed: outcome.changed,
        })
    }

    /// Resynchronizes a set of transactions: the one linked to an advance
    /// request when a filter is given, otherwise all pending ones.
    ///
    /// Items are processed sequentially with a per-item timeout; one slow
    /// or failing item never aborts the rest, and the item/time caps yield
    /// partial results rather than an error.
    pub async fn resync_many(
        &self,
        advance_request_id: Option<Uuid>,
        limits: BatchLimits,
    ) -> Result<ResyncBatchReport, AppError> {
        let targets: Vec<Transaction> = match advance_request_id {
            Some(id) => queries::find_transaction_by_advance_request(&self.pool, id)
                .await?
                .into_iter()
                .collect(),
            None => {
                // One row past the cap distinguishes truncation from an
                // exactly-full page.
                queries::list_pending_transactions(&self.pool, limits.max_items as i64 + 1)
                    .await?
            }
        };

        let started = Instant::now();
        let mut report = ResyncBatchReport {
            outcomes: Vec::with_capacity(targets.len()),
            updated: 0,
            unchanged: 0,
            errors: 0,
            truncated: false,
        };

        for (index, target) in targets.iter().enumerate() {
            if index >= limits.max_items || started.elapsed() >= limits.max_elapsed {
                report.truncated = true;
                break;
            }

            let result = match tokio::time::timeout(
                limits.per_item_timeout,
                self.resync_one(&target.external_id),
            )
            .await
            {
                Ok(Ok(outcome)) if outcome.changed => {
                    report.updated += 1;
                    ItemResult::Updated {
                        status: outcome.status,
                    }
                }
                Ok(Ok(outcome)) => {
                    report.unchanged += 1;
                    ItemResult::Unchanged {
                        status: outcome.status,
                    }
                }
                Ok(Err(e)) => {
                    tracing::error!(
                        external_id = %target.external_id,
                        error = %e,
                        "resync item failed"
                    );
                    report.errors += 1;
                    ItemResult::Error {
                        message: e.to_string(),
                    }
                }
                Err(_) => {
                    tracing::error!(
                        external_id = %target.external_id,
                        "resync item timed out"
                    );
                    report.errors += 1;
                    ItemResult::Error {
                        message: "timed out".to_string(),
                    }
                }
            };

            report.outcomes.push(ItemOutcome {
                external_id: target.external_id.clone(),
                result,
            });
        }

        Ok(report)
    }

    /// Pulls the gateway's full transaction list and folds it into the
    /// ledger. New records the gateway cannot be attributed to a partner
    /// are accepted with a null partner reference.
    pub async fn import_from_gateway(&self) -> Result<ImportReport, AppError> {
        let records = self.gateway.list_transactions().await?;

        let mut report = ImportReport {
            imported: 0,
            updated: 0,
            unchanged: 0,
            errors: 0,
        };

        for record in &records {
            match self.import_record(record).await {
                Ok(outcome) if outcome.inserted => report.imported += 1,
                Ok(outcome) if outcome.changed => report.updated += 1,
                Ok(_) => report.unchanged += 1,
                Err(e) => {
                    tracing::error!(
                        external_id = %record.external_id,
                        error = %e,
                        "failed to import gateway record"
                    );
                    report.errors += 1;
                }
            }
        }

        tracing::info!(
            imported = report.imported,
            updated = report.updated,
            unchanged = report.unchanged,
            errors = report.errors,
            "gateway import finished"
        );

        Ok(report)
    }

    async fn import_record(
        &self,
        record: &GatewayPaymentRecord,
    ) -> Result<UpsertOutcome, AppError> {
        // Unmapped statuses import as pending rather than being dropped;
        // a later resync will settle them one way or the other.
        let status = map_gateway_status(&record.status).unwrap_or(TransactionStatus::Pending);

        let stored =
            queries::find_transaction_by_external_id(&self.pool, &record.external_id).await?;

        let new = match &stored {
            Some(t) => NewTransaction {
                external_id: record.external_id.clone(),
                amount: t.amount,
                method: t.method,
                status,
                settled_at: record.settled_at,
                callback_message: record.message.clone(),
                advance_request_id: t.advance_request_id,
                partner_id: t.partner_id,
                employee_id: t.employee_id,
            },
            None => {
                let Some(amount) = record.amount.filter(|a| *a > 0) else {
                    return Err(AppError::Validation(format!(
                        "gateway record {} has no positive amount",
                        record.external_id
                    )));
                };
                NewTransaction {
                    external_id: record.external_id.clone(),
                    amount,
                    method: PaymentMethod::MobileMoney,
                    status,
                    settled_at: record.settled_at,
                    callback_message: record.message.clone(),
                    advance_request_id: None,
                    partner_id: None,
                    employee_id: None,
                }
            }
        };

        let outcome = queries::upsert_transaction_by_external_id(&self.pool, &new).await?;

        if outcome.changed {
            self.cascade(&outcome).await?;
        }

        Ok(outcome)
    }

    async fn fallback_to_stored(&self, external_id: &str) -> Result<ResyncOutcome, AppError> {
        let stored = queries::find_transaction_by_external_id(&self.pool, external_id)
            .await?
            .ok_or_else(|| {
                AppError::NotFound(format!("transaction {} not found", external_id))
            })?;

        Ok(ResyncOutcome {
            external_id: external_id.to_string(),
            status: stored.status,
            changed: false,
        })
    }

    /// Dependent transitions after a fresh status change. Only ever called
    /// with `changed = true`, which is what bounds every side effect to
    /// once per transition.
    async fn cascade(&self, outcome: &UpsertOutcome) -> Result<(), AppError> {
        let transaction = &outcome.transaction;

        match transaction.status {
            TransactionStatus::Succeeded => {
                if let Some(advance_request_id) = transaction.advance_request_id {
                    let result = advance::approve_on_settlement(
                        &self.pool,
                        advance_request_id,
                        &transaction.external_id,
                    )
                    .await?;

                    if result == CascadeResult::Applied {
                        self.notify_advance_approved(advance_request_id, transaction)
                            .await?;
                    }
                }

                // A settlement may also be the payment of a reimbursement,
                // matched on the reimbursement's own payment id.
                if let Some(reimbursement) = queries::mark_reimbursement_paid_by_payment_id(
                    &self.pool,
                    &transaction.external_id,
                )
                .await?
                {
                    tracing::info!(
                        reimbursement_id = %reimbursement.id,
                        payment_id = %transaction.external_id,
                        "reimbursement settled"
                    );
                }
            }
            TransactionStatus::Cancelled => {
                self.notify_payment_failed(transaction).await?;
            }
            TransactionStatus::Pending => {}
        }

        Ok(())
    }

    async fn notify_advance_approved(
        &self,
        advance_request_id: Uuid,
        transaction: &Transaction,
    ) -> Result<(), AppError> {
        let Some(request) = queries::get_advance_request(&self.pool, advance_request_id).await?
        else {
            return Ok(());
        };

        let Some(contact) = self.employee_contact(request.employee_id).await? else {
            tracing::warn!(
                advance_request_id = %advance_request_id,
                "no contact for approved advance, skipping notification"
            );
            return Ok(());
        };

        self.notifier
            .dispatch(NotificationIntent {
                kind: NotificationKind::AdvanceApproved,
                recipient_contact: contact,
                amount: request.amount,
                reference: transaction.external_id.clone(),
            })
            .await;

        Ok(())
    }

    async fn notify_payment_failed(&self, transaction: &Transaction) -> Result<(), AppError> {
        let Some(employee_id) = transaction.employee_id else {
            return Ok(());
        };

        let Some(contact) = self.employee_contact(employee_id).await? else {
            return Ok(());
        };

        self.notifier
            .dispatch(NotificationIntent {
                kind: NotificationKind::PaymentFailed,
                recipient_contact: contact,
                amount: transaction.amount,
                reference: transaction.external_id.clone(),
            })
            .await;

        Ok(())
    }

    async fn employee_contact(&self, employee_id: Uuid) -> Result<Option<String>, AppError> {
        let employee = queries::get_employee(&self.pool, employee_id).await?;
        Ok(employee.and_then(|e| e.contact_phone.or(e.contact_email)))
    }
}
