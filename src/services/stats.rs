//! Read-only projections over the ledger for dashboard rendering.
//! No writes happen here, and every rate is safe on an empty ledger.

use std::collections::BTreeMap;

use chrono::Utc;
use serde::Serialize;
use sqlx::PgPool;
use uuid::Uuid;

use crate::db::queries;
use crate::domain::{AdvanceStatus, TransactionStatus};
use crate::error::AppError;

/// Percentage of `part` in `total`, rounded to one decimal place.
/// Zero when the denominator is zero, never NaN.
pub fn rate(part: i64, total: i64) -> f64 {
    if total <= 0 {
        return 0.0;
    }
    ((part as f64) * 1000.0 / (total as f64)).round() / 10.0
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct StatusBucket {
    pub count: i64,
    pub total_amount: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct OverviewStats {
    pub transactions_pending: StatusBucket,
    pub transactions_succeeded: StatusBucket,
    pub transactions_cancelled: StatusBucket,
    pub reimbursements_pending: i64,
    pub reimbursements_late: i64,
    pub reimbursements_paid: i64,
    pub reimbursements_cancelled: i64,
    pub paid_rate: f64,
    pub advances_pending: i64,
    pub advances_approved: i64,
    pub advances_rejected: i64,
    pub approval_rate: f64,
    pub satisfaction_rate: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct MonthlyPoint {
    pub month: String,
    pub disbursed_count: i64,
    pub disbursed_amount: i64,
    pub reimbursed_amount: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct PartnerStats {
    pub partner_id: Uuid,
    pub partner_name: String,
    pub transaction_count: i64,
    pub disbursed_amount: i64,
    pub reimbursements_total: i64,
    pub reimbursements_paid: i64,
    pub paid_rate: f64,
}

#[derive(Clone)]
pub struct StatsService {
    pool: PgPool,
}

impl StatsService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn overview(&self) -> Result<OverviewStats, AppError> {
        let mut stats = OverviewStats {
            transactions_pending: StatusBucket::default(),
            transactions_succeeded: StatusBucket::default(),
            transactions_cancelled: StatusBucket::default(),
            reimbursements_pending: 0,
            reimbursements_late: 0,
            reimbursements_paid: 0,
            reimbursements_cancelled: 0,
            paid_rate: 0.0,
            advances_pending: 0,
            advances_approved: 0,
            advances_rejected: 0,
            approval_rate: 0.0,
            satisfaction_rate: 0.0,
        };

        for (status, count, total_amount) in
            queries::transaction_totals_by_status(&self.pool).await?
        {
            let bucket = StatusBucket {
                count,
                total_amount,
            };
            match status {
                TransactionStatus::Pending => stats.transactions_pending = bucket,
                TransactionStatus::Succeeded => stats.transactions_succeeded = bucket,
                TransactionStatus::Cancelled => stats.transactions_cancelled = bucket,
            }
        }

        for (effective, count) in
            queries::reimbursement_counts_by_effective_status(&self.pool, Utc::now()).await?
        {
            match effective.as_str() {
                "pending" => stats.reimbursements_pending = count,
                "late" => stats.reimbursements_late = count,
                "paid" => stats.reimbursements_paid = count,
                "cancelled" => stats.reimbursements_cancelled = count,
                other => {
                    tracing::warn!(status = %other, "unexpected reimbursement status bucket")
                }
            }
        }

        let reimbursement_total = stats.reimbursements_pending
            + stats.reimbursements_late
            + stats.reimbursements_paid
            + stats.reimbursements_cancelled;
        stats.paid_rate = rate(stats.reimbursements_paid, reimbursement_total);

        for (status, count) in queries::advance_request_counts(&self.pool).await? {
            match status {
                AdvanceStatus::Pending => stats.advances_pending = count,
                AdvanceStatus::Approved => stats.advances_approved = count,
                AdvanceStatus::Rejected => stats.advances_rejected = count,
            }
        }

        let advance_total =
            stats.advances_pending + stats.advances_approved + stats.advances_rejected;
        stats.approval_rate = rate(stats.advances_approved, advance_total);

        // Ratings are 0..=5; scaled to a percentage like the other rates.
        stats.satisfaction_rate = match queries::average_review_rating(&self.pool).await? {
            Some(avg) => (avg * 200.0).round() / 10.0,
            None => 0.0,
        };

        Ok(stats)
    }

    pub async fn monthly(&self) -> Result<Vec<MonthlyPoint>, AppError> {
        let disbursed = queries::monthly_disbursements(&self.pool).await?;
        let reimbursed = queries::monthly_reimbursed(&self.pool).await?;

        let mut months: BTreeMap<String, MonthlyPoint> = BTreeMap::new();

        for (month, count, amount) in disbursed {
            months.insert(
                month.clone(),
                MonthlyPoint {
                    month,
                    disbursed_count: count,
                    disbursed_amount: amount,
                    reimbursed_amount: 0,
                },
            );
        }

        for (month, amount) in reimbursed {
            months
                .entry(month.clone())
                .or_insert_with(|| MonthlyPoint {
                    month,
                    disbursed_count: 0,
                    disbursed_amount: 0,
                    reimbursed_amount: 0,
                })
                .reimbursed_amount = amount;
        }

        Ok(months.into_values().collect())
    }

    pub async fn by_partner(&self) -> Result<Vec<PartnerStats>, AppError> {
        let transactions = queries::partner_transaction_totals(&self.pool).await?;
        let reimbursements: BTreeMap<Uuid, (i64, i64)> =
            queries::partner_reimbursement_totals(&self.pool)
                .await?
                .into_iter()
                .map(|(id, total, paid)| (id, (total, paid)))
                .collect();

        Ok(transactions
            .into_iter()
            .map(|(partner_id, partner_name, count, disbursed)| {
                let (total, paid) = reimbursements.get(&partner_id).copied().unwrap_or((0, 0));
                PartnerStats {
                    partner_id,
                    partner_name,
                    transaction_count: count,
                    disbursed_amount: disbursed,
                    reimbursements_total: total,
                    reimbursements_paid: paid,
                    paid_rate: rate(paid, total),
                }
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rate_is_zero_on_empty_total() {
        assert_eq!(rate(0, 0), 0.0);
        assert_eq!(rate(5, 0), 0.0);
    }

    #[test]
    fn rate_rounds_to_one_decimal() {
        assert_eq!(rate(1, 3), 33.3);
        assert_eq!(rate(2, 3), 66.7);
        assert_eq!(rate(1, 8), 12.5);
    }

    #[test]
    fn rate_stays_within_bounds() {
        assert_eq!(rate(0, 10), 0.0);
        assert_eq!(rate(10, 10), 100.0);

        for part in 0..=20 {
            let value = rate(part, 20);
            assert!((0.0..=100.0).contains(&value));
        }
    }
}
