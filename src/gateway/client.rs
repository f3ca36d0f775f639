use failsafe::futures::CircuitBreaker as FuturesCircuitBreaker;
use failsafe::{backoff, failure_policy, Config, Error as FailsafeError, StateMachine};
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

use crate::config::GatewayConfig;

#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("HTTP request failed: {0}")]
    RequestError(#[from] reqwest::Error),
    #[error("Gateway rejected the request ({code}): {message}")]
    Rejected { code: String, message: String },
    #[error("Invalid response from gateway: {0}")]
    InvalidResponse(String),
    #[error("Circuit breaker open: {0}")]
    CircuitBreakerOpen(String),
}

#[derive(Debug, Clone, Serialize)]
pub struct InitiatePaymentRequest {
    pub external_id: String,
    pub amount: i64,
    pub currency: String,
    pub return_url: String,
    pub callback_url: String,
}

/// Result of a successful payment initiation.
#[derive(Debug, Clone, Deserialize)]
pub struct InitiatedPayment {
    #[serde(rename = "transaction_id")]
    pub external_id: String,
    pub payment_url: String,
}

/// One payment as the gateway reports it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayPaymentRecord {
    #[serde(rename = "transaction_id")]
    pub external_id: String,
    pub status: String,
    pub amount: Option<i64>,
    pub account: Option<String>,
    pub settled_at: Option<DateTime<Utc>>,
    pub message: Option<String>,
}

/// Outcome of a status query. `Unknown` means the gateway has no record of
/// the payment (or answered with an empty body); callers must treat it as
/// "no information", never as a failure.
#[derive(Debug, Clone)]
pub enum StatusLookup {
    Known(GatewayPaymentRecord),
    Unknown,
}

/// Response envelope shared by all gateway endpoints.
#[derive(Debug, Deserialize)]
struct Envelope<T> {
    code: Option<String>,
    message: Option<String>,
    data: Option<T>,
}

/// HTTP client for the external payment gateway.
///
/// Carries a bounded per-request timeout and a circuit breaker. It never
/// retries on its own; retry policy belongs to the reconciliation service.
#[derive(Clone)]
pub struct GatewayClient {
    client: Client,
    base_url: String,
    api_key: String,
    site_id: String,
    circuit_breaker: StateMachine<failure_policy::ConsecutiveFailures<backoff::EqualJittered>, ()>,
}

impl GatewayClient {
    pub fn new(config: &GatewayConfig) -> Self {
        Self::with_circuit_breaker(config, 3, 60)
    }

    pub fn with_circuit_breaker(
        config: &GatewayConfig,
        failure_threshold: u32,
        reset_timeout_secs: u64,
    ) -> Self {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .unwrap_or_default();

        let backoff = backoff::equal_jittered(
            Duration::from_secs(reset_timeout_secs),
            Duration::from_secs(reset_timeout_secs * 2),
        );
        let policy = failure_policy::consecutive_failures(failure_threshold, backoff);
        let circuit_breaker = Config::new().failure_policy(policy).build();

        GatewayClient {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            site_id: config.site_id.clone(),
            circuit_breaker,
        }
    }

    /// Returns the current state of the circuit breaker.
    pub fn circuit_state(&self) -> String {
        if self.circuit_breaker.is_call_permitted() {
            "closed".to_string()
        } else {
            "open".to_string()
        }
    }

    /// Asks the gateway to open a new payment.
    pub async fn initiate_payment(
        &self,
        request: &InitiatePaymentRequest,
    ) -> Result<InitiatedPayment, GatewayError> {
        let url = format!("{}/v1/payments", self.base_url);
        let client = self.client.clone();
        let api_key = self.api_key.clone();
        let body = serde_json::json!({
            "site_id": self.site_id,
            "transaction_id": request.external_id,
            "amount": request.amount,
            "currency": request.currency,
            "return_url": request.return_url,
            "notify_url": request.callback_url,
        });

        let result = self
            .circuit_breaker
            .call(async move {
                let response = client
                    .post(&url)
                    .bearer_auth(&api_key)
                    .json(&body)
                    .send()
                    .await?;

                let status = response.status();
                let text = response.text().await?;

                if !status.is_success() {
                    // A structured error payload means the gateway understood
                    // us and said no; anything else is unavailability.
                    if let Ok(envelope) = serde_json::from_str::<Envelope<serde_json::Value>>(&text)
                    {
                        if let Some(code) = envelope.code {
                            return Err(GatewayError::Rejected {
                                code,
                                message: envelope.message.unwrap_or_default(),
                            });
                        }
                    }
                    return Err(GatewayError::InvalidResponse(format!(
                        "unexpected status {}",
                        status
                    )));
                }

                let envelope: Envelope<InitiatedPayment> = serde_json::from_str(&text)
                    .map_err(|e| GatewayError::InvalidResponse(e.to_string()))?;

                envelope.data.ok_or_else(|| {
                    GatewayError::InvalidResponse("missing data in payment response".to_string())
                })
            })
            .await;

        unwrap_breaker(result)
    }

    /// Queries the gateway for the current status of a payment.
    ///
    /// A 404, an empty body or a response without data all yield
    /// `StatusLookup::Unknown` rather than an error.
    pub async fn query_status(&self, external_id: &str) -> Result<StatusLookup, GatewayError> {
        let url = format!("{}/v1/payments/check", self.base_url);
        let client = self.client.clone();
        let api_key = self.api_key.clone();
        let body = serde_json::json!({
            "site_id": self.site_id,
            "transaction_id": external_id,
        });

        let result = self
            .circuit_breaker
            .call(async move {
                let response = client
                    .post(&url)
                    .bearer_auth(&api_key)
                    .json(&body)
                    .send()
                    .await?;

                if response.status() == 404 {
                    return Ok(StatusLookup::Unknown);
                }

                let status = response.status();
                let text = response.text().await?;

                if text.trim().is_empty() {
                    return Ok(StatusLookup::Unknown);
                }

                if !status.is_success() {
                    return Err(GatewayError::InvalidResponse(format!(
                        "unexpected status {}",
                        status
                    )));
                }

                let envelope: Envelope<GatewayPaymentRecord> = serde_json::from_str(&text)
                    .map_err(|e| GatewayError::InvalidResponse(e.to_string()))?;

                Ok(match envelope.data {
                    Some(record) => StatusLookup::Known(record),
                    None => StatusLookup::Unknown,
                })
            })
            .await;

        unwrap_breaker(result)
    }

    /// Lists every transaction the gateway knows for this site. An empty
    /// list is a valid answer.
    pub async fn list_transactions(&self) -> Result<Vec<GatewayPaymentRecord>, GatewayError> {
        let url = format!("{}/v1/transactions?site_id={}", self.base_url, self.site_id);
        let client = self.client.clone();
        let api_key = self.api_key.clone();

        let result = self
            .circuit_breaker
            .call(async move {
                let response = client.get(&url).bearer_auth(&api_key).send().await?;

                let status = response.status();
                if !status.is_success() {
                    return Err(GatewayError::InvalidResponse(format!(
                        "unexpected status {}",
                        status
                    )));
                }

                let envelope: Envelope<Vec<GatewayPaymentRecord>> = response
                    .json()
                    .await
                    .map_err(GatewayError::RequestError)?;

                Ok(envelope.data.unwrap_or_default())
            })
            .await;

        unwrap_breaker(result)
    }
}

fn unwrap_breaker<T>(result: Result<T, FailsafeError<GatewayError>>) -> Result<T, GatewayError> {
    match result {
        Ok(value) => Ok(value),
        Err(FailsafeError::Rejected) => Err(GatewayError::CircuitBreakerOpen(
            "gateway circuit breaker is open".to_string(),
        )),
        Err(FailsafeError::Inner(e)) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config(base_url: String) -> GatewayConfig {
        GatewayConfig {
            base_url,
            api_key: "test-key".to_string(),
            site_id: "site-42".to_string(),
            request_timeout: Duration::from_secs(5),
        }
    }

    #[test]
    fn test_client_creation() {
        let client = GatewayClient::new(&test_config("https://gateway.example.com/".to_string()));
        assert_eq!(client.base_url, "https://gateway.example.com");
        assert_eq!(client.circuit_state(), "closed");
    }

    #[tokio::test]
    async fn test_initiate_payment_success() {
        let mut server = mockito::Server::new_async().await;

        let _mock = server
            .mock("POST", "/v1/payments")
            .with_status(201)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{"code":"201","message":"CREATED","data":{"transaction_id":"P1","payment_url":"https://pay.example.com/P1"}}"#,
            )
            .create_async()
            .await;

        let client = GatewayClient::new(&test_config(server.url()));
        let initiated = client
            .initiate_payment(&InitiatePaymentRequest {
                external_id: "P1".to_string(),
                amount: 50_000,
                currency: "XOF".to_string(),
                return_url: "https://backoffice.example.com/return".to_string(),
                callback_url: "https://backoffice.example.com/callback".to_string(),
            })
            .await
            .expect("initiation should succeed");

        assert_eq!(initiated.external_id, "P1");
        assert_eq!(initiated.payment_url, "https://pay.example.com/P1");
    }

    #[tokio::test]
    async fn test_initiate_payment_rejected() {
        let mut server = mockito::Server::new_async().await;

        let _mock = server
            .mock("POST", "/v1/payments")
            .with_status(400)
            .with_header("content-type", "application/json")
            .with_body(r#"{"code":"608","message":"MINIMUM_REQUIRED_FIELDS"}"#)
            .create_async()
            .await;

        let client = GatewayClient::new(&test_config(server.url()));
        let result = client
            .initiate_payment(&InitiatePaymentRequest {
                external_id: "P2".to_string(),
                amount: 1,
                currency: "XOF".to_string(),
                return_url: String::new(),
                callback_url: String::new(),
            })
            .await;

        assert!(matches!(result, Err(GatewayError::Rejected { .. })));
    }

    #[tokio::test]
    async fn test_query_status_known() {
        let mut server = mockito::Server::new_async().await;

        let _mock = server
            .mock("POST", "/v1/payments/check")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{"code":"00","data":{"transaction_id":"P1","status":"SUCCESS","amount":50000,"account":"22501020304","settled_at":null,"message":"ok"}}"#,
            )
            .create_async()
            .await;

        let client = GatewayClient::new(&test_config(server.url()));
        let lookup = client.query_status("P1").await.expect("query should succeed");

        match lookup {
            StatusLookup::Known(record) => {
                assert_eq!(record.external_id, "P1");
                assert_eq!(record.status, "SUCCESS");
                assert_eq!(record.amount, Some(50_000));
            }
            StatusLookup::Unknown => panic!("expected a known status"),
        }
    }

    #[tokio::test]
    async fn test_query_status_unknown_on_404() {
        let mut server = mockito::Server::new_async().await;

        let _mock = server
            .mock("POST", "/v1/payments/check")
            .with_status(404)
            .create_async()
            .await;

        let client = GatewayClient::new(&test_config(server.url()));
        let lookup = client.query_status("P9").await.expect("404 is not an error");

        assert!(matches!(lookup, StatusLookup::Unknown));
    }

    #[tokio::test]
    async fn test_query_status_unknown_on_empty_body() {
        let mut server = mockito::Server::new_async().await;

        let _mock = server
            .mock("POST", "/v1/payments/check")
            .with_status(200)
            .with_body("")
            .create_async()
            .await;

        let client = GatewayClient::new(&test_config(server.url()));
        let lookup = client.query_status("P9").await.expect("empty body is not an error");

        assert!(matches!(lookup, StatusLookup::Unknown));
    }

    #[tokio::test]
    async fn test_list_transactions_empty() {
        let mut server = mockito::Server::new_async().await;

        let _mock = server
            .mock("GET", mockito::Matcher::Regex(r"/v1/transactions.*".into()))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"code":"00","data":[]}"#)
            .create_async()
            .await;

        let client = GatewayClient::new(&test_config(server.url()));
        let records = client.list_transactions().await.expect("empty list is valid");

        assert!(records.is_empty());
    }

    #[tokio::test]
    #[ignore]
    async fn test_circuit_breaker_opens_after_failures() {
        let mut server = mockito::Server::new_async().await;

        let _mock = server
            .mock("POST", "/v1/payments/check")
            .with_status(500)
            .expect_at_least(3)
            .create_async()
            .await;

        let client = GatewayClient::with_circuit_breaker(&test_config(server.url()), 3, 1);

        for _ in 0..3 {
            let _ = client.query_status("P1").await;
        }

        let result = client.query_status("P1").await;
        assert!(matches!(result, Err(GatewayError::CircuitBreakerOpen(_))));
    }
}
