//! A [`PaymentGateway`] that talks to a card processor's REST API.
//!
//! The processor is expected to expose `POST /charges` and `POST /refunds`, both honouring an `Idempotency-Key`
//! header. Anything else about the provider (auth, hosts) comes from [`GatewayConfig`].
use std::sync::Arc;

use log::*;
use ol_common::Money;
use order_ledger_engine::traits::{ChargeRequest, ChargeResult, GatewayError, PaymentGateway, RefundRequest};
use reqwest::{
    header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE},
    Client,
    StatusCode,
};
use serde::{de::DeserializeOwned, Deserialize, Serialize};

use crate::{config::GatewayConfig, errors::ServerError};

#[derive(Clone)]
pub struct HttpCardGateway {
    base_url: String,
    client: Arc<Client>,
}

#[derive(Serialize)]
struct ChargeBody<'a> {
    amount: i64,
    currency: &'a str,
    source: &'a str,
}

#[derive(Deserialize)]
struct ChargeResponse {
    id: String,
    amount: i64,
    #[serde(default)]
    receipt_number: Option<String>,
    #[serde(default)]
    card: Option<CardDetails>,
}

#[derive(Deserialize)]
struct CardDetails {
    #[serde(default)]
    brand: Option<String>,
    #[serde(default)]
    last4: Option<String>,
}

#[derive(Serialize)]
struct RefundBody<'a> {
    charge: &'a str,
    amount: i64,
    reason: &'a str,
}

#[derive(Deserialize)]
struct RefundResponse {
    id: String,
}

impl HttpCardGateway {
    pub fn new(config: &GatewayConfig) -> Result<Self, ServerError> {
        let mut headers = HeaderMap::with_capacity(2);
        let auth = HeaderValue::from_str(&format!("Bearer {}", config.api_key.reveal()))
            .map_err(|e| ServerError::ConfigurationError(format!("Invalid gateway API key. {e}")))?;
        headers.insert(AUTHORIZATION, auth);
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        let client = Client::builder()
            .default_headers(headers)
            .timeout(config.timeout)
            .build()
            .map_err(|e| ServerError::InitializeError(e.to_string()))?;
        let base_url = config.base_url.trim_end_matches('/').to_string();
        Ok(Self { base_url, client: Arc::new(client) })
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    async fn post<T: DeserializeOwned, B: Serialize>(
        &self,
        path: &str,
        idempotency_key: &str,
        body: &B,
    ) -> Result<T, GatewayError> {
        let url = self.url(path);
        trace!("💳️ POST {url} (key {idempotency_key})");
        let response = self
            .client
            .post(url)
            .header("Idempotency-Key", idempotency_key)
            .json(body)
            .send()
            .await
            .map_err(map_transport_error)?;
        let status = response.status();
        if status.is_success() {
            response.json::<T>().await.map_err(|e| GatewayError::Transient(format!("Malformed gateway response. {e}")))
        } else {
            let message = response.text().await.unwrap_or_default();
            Err(map_status(status, message))
        }
    }
}

impl PaymentGateway for HttpCardGateway {
    async fn create_charge(&self, request: ChargeRequest) -> Result<ChargeResult, GatewayError> {
        let body = ChargeBody {
            amount: request.amount.value(),
            currency: &request.currency,
            source: &request.payment_method_token,
        };
        let charge: ChargeResponse = self.post("/charges", &request.idempotency_key, &body).await?;
        debug!("💳️ Charge {} created for {}", charge.id, request.amount);
        let (card_brand, card_last4) = charge.card.map(|c| (c.brand, c.last4)).unwrap_or_default();
        Ok(ChargeResult {
            charge_id: charge.id,
            amount: Money::from(charge.amount),
            receipt_ref: charge.receipt_number,
            card_brand,
            card_last4,
        })
    }

    async fn issue_refund(&self, request: RefundRequest) -> Result<String, GatewayError> {
        let body = RefundBody { charge: &request.charge_id, amount: request.amount.value(), reason: &request.reason };
        let refund: RefundResponse = self.post("/refunds", &request.idempotency_key, &body).await?;
        debug!("💳️ Refund {} issued against charge {}", refund.id, request.charge_id);
        Ok(refund.id)
    }
}

fn map_transport_error(e: reqwest::Error) -> GatewayError {
    if e.is_timeout() {
        GatewayError::Timeout
    } else {
        GatewayError::Transient(e.to_string())
    }
}

/// Server faults and rate limiting are worth another try. Any other rejection is final.
fn map_status(status: StatusCode, message: String) -> GatewayError {
    if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS || status == StatusCode::REQUEST_TIMEOUT {
        GatewayError::Transient(format!("{status}: {message}"))
    } else {
        GatewayError::Declined(format!("{status}: {message}"))
    }
}
