use mockall::mock;
use order_ledger_engine::traits::{ChargeRequest, ChargeResult, GatewayError, PaymentGateway, RefundRequest};

mock! {
    pub Gateway {}
    impl PaymentGateway for Gateway {
        async fn create_charge(&self, request: ChargeRequest) -> Result<ChargeResult, GatewayError>;
        async fn issue_refund(&self, request: RefundRequest) -> Result<String, GatewayError>;
    }
}
