use std::{
    collections::VecDeque,
    sync::{Arc, Mutex},
    time::Duration,
};

use crate::traits::{ChargeRequest, ChargeResult, GatewayError, PaymentGateway, RefundRequest};

#[derive(Debug, Default)]
struct Script {
    charges: VecDeque<Result<ChargeResult, GatewayError>>,
    refunds: VecDeque<Result<String, GatewayError>>,
    charge_requests: Vec<ChargeRequest>,
    refund_requests: Vec<RefundRequest>,
    delay: Option<Duration>,
}

/// A scripted [`PaymentGateway`].
///
/// Responses are queued with the `then_*` methods and consumed in order. When the queue is empty, charges succeed for
/// the requested amount and refunds succeed. Every request is recorded. Clones share the same script.
#[derive(Debug, Clone, Default)]
pub struct FakeGateway {
    script: Arc<Mutex<Script>>,
}

impl FakeGateway {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_script<T>(&self, f: impl FnOnce(&mut Script) -> T) -> T {
        let mut script = self.script.lock().unwrap_or_else(|p| p.into_inner());
        f(&mut script)
    }

    /// The next charge succeeds with the given result instead of the default.
    pub fn then_charge(&self, result: ChargeResult) -> &Self {
        self.with_script(|s| s.charges.push_back(Ok(result)));
        self
    }

    pub fn then_charge_error(&self, err: GatewayError) -> &Self {
        self.with_script(|s| s.charges.push_back(Err(err)));
        self
    }

    pub fn then_refund_error(&self, err: GatewayError) -> &Self {
        self.with_script(|s| s.refunds.push_back(Err(err)));
        self
    }

    /// Every call sleeps this long before answering.
    pub fn with_delay(&self, delay: Duration) -> &Self {
        self.with_script(|s| s.delay = Some(delay));
        self
    }

    pub fn charge_requests(&self) -> Vec<ChargeRequest> {
        self.with_script(|s| s.charge_requests.clone())
    }

    pub fn refund_requests(&self) -> Vec<RefundRequest> {
        self.with_script(|s| s.refund_requests.clone())
    }
}

impl PaymentGateway for FakeGateway {
    async fn create_charge(&self, request: ChargeRequest) -> Result<ChargeResult, GatewayError> {
        let (scripted, delay, n) = self.with_script(|s| {
            s.charge_requests.push(request.clone());
            (s.charges.pop_front(), s.delay, s.charge_requests.len())
        });
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        scripted.unwrap_or_else(|| {
            Ok(ChargeResult {
                charge_id: format!("ch_{n}_{}", request.idempotency_key),
                amount: request.amount,
                receipt_ref: Some(format!("rcpt_{n}")),
                card_brand: Some("visa".to_string()),
                card_last4: Some("4242".to_string()),
            })
        })
    }

    async fn issue_refund(&self, request: RefundRequest) -> Result<String, GatewayError> {
        let (scripted, delay, n) = self.with_script(|s| {
            s.refund_requests.push(request.clone());
            (s.refunds.pop_front(), s.delay, s.refund_requests.len())
        });
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        scripted.unwrap_or_else(|| Ok(format!("re_{n}_{}", request.charge_id)))
    }
}
