use ol_common::Money;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GatewayError {
    #[error("The payment gateway did not respond in time")]
    Timeout,
    /// A retryable fault: connection reset, 5xx, rate limiting.
    #[error("Transient payment gateway failure: {0}")]
    Transient(String),
    #[error("The charge was declined: {0}")]
    Declined(String),
}

impl GatewayError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, GatewayError::Transient(_))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChargeRequest {
    pub amount: Money,
    pub currency: String,
    pub payment_method_token: String,
    /// Stable for a given payment attempt, so that a retried call never charges twice.
    pub idempotency_key: String,
}

/// The gateway's confirmation of a successful charge. This is also the payload of the card-completion webhook.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChargeResult {
    pub charge_id: String,
    pub amount: Money,
    #[serde(default)]
    pub receipt_ref: Option<String>,
    #[serde(default)]
    pub card_brand: Option<String>,
    #[serde(default)]
    pub card_last4: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefundRequest {
    pub charge_id: String,
    pub amount: Money,
    pub reason: String,
    pub idempotency_key: String,
}

/// The card-processing provider.
///
/// Implementations are handed to the transaction coordinator explicitly. Timeouts are imposed by the caller, so
/// implementations may block for as long as the underlying transport does.
#[allow(async_fn_in_trait)]
pub trait PaymentGateway {
    async fn create_charge(&self, request: ChargeRequest) -> Result<ChargeResult, GatewayError>;

    /// Returns the gateway's reference for the refund.
    async fn issue_refund(&self, request: RefundRequest) -> Result<String, GatewayError>;
}
