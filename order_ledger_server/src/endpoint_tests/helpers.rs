use std::time::Duration;

use actix_web::{http::StatusCode, test, test::TestRequest, web, App};
use log::debug;
use ol_common::Money;
use order_ledger_engine::{
    db_types::{LineItem, PaymentMethod, ShippingAddress},
    events::EventProducers,
    order_objects::{CheckoutRequest, CheckoutResult},
    CoordinatorConfig,
    MemoryDatabase,
    RetryPolicy,
    TransactionCoordinator,
};
use serde::Serialize;

use super::mocks::MockGateway;
use crate::routes::{
    health,
    CardChargeRoute,
    CardCompleteRoute,
    CheckoutRoute,
    CodCompleteRoute,
    ConfirmRefundRoute,
    OrderByIdRoute,
    OrdersForUserRoute,
    PaymentByIdRoute,
    RefundRoute,
    RetryRefundRoute,
    UpdateOrderStatusRoute,
};

pub type TestApi = web::Data<TransactionCoordinator<MemoryDatabase, MockGateway>>;

pub fn test_api(gateway: MockGateway) -> TestApi {
    let config = CoordinatorConfig {
        retry: RetryPolicy::none(),
        gateway_timeout: Duration::from_secs(1),
        ..Default::default()
    };
    web::Data::new(TransactionCoordinator::new(MemoryDatabase::new(), gateway, EventProducers::default(), config))
}

pub async fn send(req: TestRequest, api: &TestApi) -> (StatusCode, String) {
    let app = App::new()
        .app_data(api.clone())
        .service(health)
        .service(CheckoutRoute::<MemoryDatabase, MockGateway>::new())
        .service(OrderByIdRoute::<MemoryDatabase, MockGateway>::new())
        .service(OrdersForUserRoute::<MemoryDatabase, MockGateway>::new())
        .service(UpdateOrderStatusRoute::<MemoryDatabase, MockGateway>::new())
        .service(PaymentByIdRoute::<MemoryDatabase, MockGateway>::new())
        .service(CodCompleteRoute::<MemoryDatabase, MockGateway>::new())
        .service(CardChargeRoute::<MemoryDatabase, MockGateway>::new())
        .service(CardCompleteRoute::<MemoryDatabase, MockGateway>::new())
        .service(RefundRoute::<MemoryDatabase, MockGateway>::new())
        .service(RetryRefundRoute::<MemoryDatabase, MockGateway>::new())
        .service(ConfirmRefundRoute::<MemoryDatabase, MockGateway>::new());
    let service = test::init_service(app).await;
    debug!("Making request");
    let res = test::call_service(&service, req.to_request()).await;
    let status = res.status();
    let body = test::read_body(res).await;
    (status, String::from_utf8_lossy(&body).into_owned())
}

pub async fn get_request(path: &str, api: &TestApi) -> (StatusCode, String) {
    send(TestRequest::get().uri(path), api).await
}

pub async fn post_request<T: Serialize>(path: &str, body: &T, api: &TestApi) -> (StatusCode, String) {
    send(TestRequest::post().uri(path).set_json(body), api).await
}

pub async fn patch_request<T: Serialize>(path: &str, body: &T, api: &TestApi) -> (StatusCode, String) {
    send(TestRequest::patch().uri(path).set_json(body), api).await
}

pub fn cart(user: &str, method: PaymentMethod) -> CheckoutRequest {
    CheckoutRequest {
        user_id: user.into(),
        line_items: vec![LineItem::new("sku-mug", 2, Money::from(1250)), LineItem::new("sku-tee", 1, Money::from(2499))],
        shipping_address: ShippingAddress {
            name: "Alice Smith".into(),
            line1: "1 Main St".into(),
            city: "Springfield".into(),
            postal_code: "12345".into(),
            country: "US".into(),
            ..Default::default()
        },
        method,
        currency: None,
        expected_total: Some(Money::from(4999)),
        order_id: None,
    }
}

/// Checks out a cart over HTTP and returns the ids.
pub async fn checkout(user: &str, method: PaymentMethod, api: &TestApi) -> CheckoutResult {
    let (status, body) = post_request("/checkout", &cart(user, method), api).await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    serde_json::from_str(&body).expect("Invalid checkout response")
}

pub fn error_code(body: &str) -> String {
    let value: serde_json::Value = serde_json::from_str(body).expect("Error body is not JSON");
    value["code"].as_str().unwrap_or_default().to_string()
}
