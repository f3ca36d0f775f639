use axum::{
    body::Bytes,
    extract::State,
    http::HeaderMap,
    response::IntoResponse,
    Json,
};
use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;

use crate::error::AppError;
use crate::gateway::GatewayPaymentRecord;
use crate::validation;
use crate::AppState;

type HmacSha256 = Hmac<Sha256>;

/// What the gateway posts to us when a payment changes state. Delivery is
/// at-least-once; processing is idempotent through the guarded upsert.
#[derive(Debug, Deserialize)]
pub struct CallbackPayload {
    pub transaction_id: String,
    pub status: String,
    pub amount: Option<i64>,
    pub account: Option<String>,
    pub message: Option<String>,
}

pub async fn callback(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<impl IntoResponse, AppError> {
    verify_signature(&state.webhook_secret, &headers, &body)?;

    let payload: CallbackPayload = serde_json::from_slice(&body)
        .map_err(|e| AppError::Validation(format!("malformed callback payload: {}", e)))?;

    validation::validate_external_id(&payload.transaction_id)?;
    if let Some(amount) = payload.amount {
        validation::validate_positive_amount(amount)?;
    }
    if let Some(message) = &payload.message {
        validation::validate_max_len("message", message, validation::CALLBACK_MESSAGE_MAX_LEN)?;
    }

    let record = GatewayPaymentRecord {
        external_id: payload.transaction_id.clone(),
        status: payload.status,
        amount: payload.amount,
        account: payload.account,
        settled_at: None,
        message: payload.message,
    };

    let outcome = state
        .reconciliation
        .apply_record(&payload.transaction_id, &record)
        .await?;

    Ok(Json(outcome))
}

fn verify_signature(secret: &str, headers: &HeaderMap, body: &[u8]) -> Result<(), AppError> {
    let signature = headers
        .get("X-Gateway-Signature")
        .and_then(|h| h.to_str().ok())
        .ok_or_else(|| AppError::Unauthorized("missing gateway signature".to_string()))?;

    let signature_bytes = hex::decode(signature)
        .map_err(|_| AppError::Unauthorized("malformed gateway signature".to_string()))?;

    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| AppError::Internal(format!("webhook secret unusable: {}", e)))?;
    mac.update(body);

    mac.verify_slice(&signature_bytes)
        .map_err(|_| AppError::Unauthorized("invalid gateway signature".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn sign(secret: &str, body: &[u8]) -> String {
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).unwrap();
        mac.update(body);
        hex::encode(mac.finalize().into_bytes())
    }

    #[test]
    fn accepts_valid_signature() {
        let secret = "top-secret";
        let body = br#"{"transaction_id":"P1","status":"SUCCESS"}"#;

        let mut headers = HeaderMap::new();
        headers.insert(
            "X-Gateway-Signature",
            HeaderValue::from_str(&sign(secret, body)).unwrap(),
        );

        assert!(verify_signature(secret, &headers, body).is_ok());
    }

    #[test]
    fn rejects_missing_signature() {
        let headers = HeaderMap::new();
        let result = verify_signature("top-secret", &headers, b"{}");
        assert!(matches!(result, Err(AppError::Unauthorized(_))));
    }

    #[test]
    fn rejects_tampered_body() {
        let secret = "top-secret";
        let body = br#"{"transaction_id":"P1","status":"SUCCESS"}"#;
        let tampered = br#"{"transaction_id":"P1","status":"FAILED"}"#;

        let mut headers = HeaderMap::new();
        headers.insert(
            "X-Gateway-Signature",
            HeaderValue::from_str(&sign(secret, body)).unwrap(),
        );

        assert!(matches!(
            verify_signature(secret, &headers, tampered),
            Err(AppError::Unauthorized(_))
        ));
    }

    #[test]
    fn rejects_wrong_secret() {
        let body = br#"{"transaction_id":"P1","status":"SUCCESS"}"#;

        let mut headers = HeaderMap::new();
        headers.insert(
            "X-Gateway-Signature",
            HeaderValue::from_str(&sign("other-secret", body)).unwrap(),
        );

        assert!(matches!(
            verify_signature("top-secret", &headers, body),
            Err(AppError::Unauthorized(_))
        ));
    }
}
