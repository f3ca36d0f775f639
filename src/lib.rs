pub mod config;
pub mod db;
pub mod domain;
pub mod error;
pub mod gateway;
pub mod handlers;
pub mod services;
pub mod validation;

use std::sync::Arc;

use axum::{
    Router,
    routing::{get, post},
};
use tower_http::cors::CorsLayer;

use crate::gateway::GatewayClient;
use crate::services::{
    NotificationDispatcher, ReconciliationService, ReimbursementService, StatsService,
};

#[derive(Clone)]
pub struct AppState {
    pub db: sqlx::PgPool,
    pub reconciliation: ReconciliationService,
    pub reimbursements: ReimbursementService,
    pub stats: StatsService,
    pub webhook_secret: String,
}

impl AppState {
    pub fn new(
        db: sqlx::PgPool,
        gateway_client: GatewayClient,
        notifier: Arc<dyn NotificationDispatcher>,
        config: &config::Config,
    ) -> Self {
        Self {
            reconciliation: ReconciliationService::new(
                db.clone(),
                gateway_client.clone(),
                notifier,
            ),
            reimbursements: ReimbursementService::new(
                db.clone(),
                gateway_client,
                config.public_base_url.clone(),
            ),
            stats: StatsService::new(db.clone()),
            webhook_secret: config.webhook_secret.clone(),
            db,
        }
    }
}

pub fn create_app(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/callback", post(handlers::webhook::callback))
        .route(
            "/reconciliation/transactions/:external_id/resync",
            post(handlers::reconciliation::resync_one),
        )
        .route(
            "/reconciliation/resync",
            post(handlers::reconciliation::resync_batch),
        )
        .route(
            "/reconciliation/import",
            post(handlers::reconciliation::import),
        )
        .route(
            "/transactions/:external_id",
            get(handlers::transactions::get_transaction),
        )
        .route(
            "/partners/:id/transactions",
            get(handlers::transactions::list_partner_transactions),
        )
        .route(
            "/partners/:id/eligible-transactions",
            get(handlers::transactions::list_eligible_transactions),
        )
        .route(
            "/reimbursements",
            post(handlers::reimbursements::create).get(handlers::reimbursements::list),
        )
        .route(
            "/reimbursements/:id/pay",
            post(handlers::reimbursements::pay),
        )
        .route("/stats/overview", get(handlers::stats::overview))
        .route("/stats/monthly", get(handlers::stats::monthly))
        .route("/stats/partners", get(handlers::stats::by_partner))
        .layer(CorsLayer::permissive())
        .with_state(state)
}
