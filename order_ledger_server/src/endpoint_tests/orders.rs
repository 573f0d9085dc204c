use actix_web::http::StatusCode;
use ol_common::Money;
use order_ledger_engine::db_types::{Order, OrderStatusType, PaymentMethod, PaymentStatusType};
use serde_json::json;

use super::{
    helpers::{cart, checkout, error_code, get_request, patch_request, post_request, test_api},
    mocks::MockGateway,
};
use crate::data_objects::{PaymentProgressResponse, StatusUpdateResponse};

#[actix_web::test]
async fn health_check() {
    let _ = env_logger::try_init().ok();
    let api = test_api(MockGateway::new());
    let (status, body) = get_request("/health", &api).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "👍️\n");
}

#[actix_web::test]
async fn checkout_creates_a_pending_order() {
    let _ = env_logger::try_init().ok();
    let api = test_api(MockGateway::new());
    let result = checkout("alice", PaymentMethod::Cod, &api).await;
    assert_eq!(result.order_status, OrderStatusType::Pending);
    assert_eq!(result.payment_status, PaymentStatusType::Pending);
    assert_eq!(result.total, Money::from(4999));

    let (status, body) = get_request(&format!("/orders/{}", result.order_id.as_str()), &api).await;
    assert_eq!(status, StatusCode::OK);
    let order: Order = serde_json::from_str(&body).unwrap();
    assert_eq!(order.user_id.as_str(), "alice");
    assert_eq!(order.currency, "USD");
    assert_eq!(order.status_history.len(), 1);
    assert_eq!(order.version, 1);
}

#[actix_web::test]
async fn checkout_with_a_stale_total_is_rejected() {
    let _ = env_logger::try_init().ok();
    let api = test_api(MockGateway::new());
    let mut request = cart("alice", PaymentMethod::Card);
    request.expected_total = Some(Money::from(4000));
    let (status, body) = post_request("/checkout", &request, &api).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(error_code(&body), "CHECKOUT_FAILED");
    let (_, body) = get_request("/users/alice/orders", &api).await;
    assert_eq!(body, "[]");
}

#[actix_web::test]
async fn unknown_order() {
    let _ = env_logger::try_init().ok();
    let api = test_api(MockGateway::new());
    let (status, body) = get_request("/orders/does-not-exist", &api).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(error_code(&body), "NOT_FOUND");
}

#[actix_web::test]
async fn orders_for_user_filtered_by_status() {
    let _ = env_logger::try_init().ok();
    let api = test_api(MockGateway::new());
    let first = checkout("bob", PaymentMethod::Cod, &api).await;
    let second = checkout("bob", PaymentMethod::Cod, &api).await;
    checkout("carol", PaymentMethod::Cod, &api).await;
    let body = json!({ "collector": "courier-7" });
    let (status, _) = post_request(&format!("/payments/{}/cod-complete", first.payment_id.as_str()), &body, &api).await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = get_request("/users/bob/orders", &api).await;
    assert_eq!(status, StatusCode::OK);
    let orders: Vec<Order> = serde_json::from_str(&body).unwrap();
    assert_eq!(orders.len(), 2);

    let (_, body) = get_request("/users/bob/orders?status=processing", &api).await;
    let orders: Vec<Order> = serde_json::from_str(&body).unwrap();
    assert_eq!(orders.len(), 1);
    assert_eq!(orders[0].order_id, first.order_id);

    let (_, body) = get_request("/users/bob/orders?status=Pending", &api).await;
    let orders: Vec<Order> = serde_json::from_str(&body).unwrap();
    assert_eq!(orders.iter().map(|o| &o.order_id).collect::<Vec<_>>(), vec![&second.order_id]);

    let (status, body) = get_request("/users/bob/orders?status=lost", &api).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(error_code(&body), "BAD_REQUEST");
}

#[actix_web::test]
async fn admin_moves_an_order_along() {
    let _ = env_logger::try_init().ok();
    let api = test_api(MockGateway::new());
    let result = checkout("alice", PaymentMethod::Cod, &api).await;
    let order_path = format!("/orders/{}/status", result.order_id.as_str());

    // Nothing has been paid yet
    let shipped = json!({ "status": "Shipped", "note": "Tracking 1Z999", "actor": "admin-1" });
    let (status, body) = patch_request(&order_path, &shipped, &api).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(error_code(&body), "INVALID_TRANSITION");

    let body = json!({ "collector": "courier-7" });
    let (status, body) =
        post_request(&format!("/payments/{}/cod-complete", result.payment_id.as_str()), &body, &api).await;
    assert_eq!(status, StatusCode::OK);
    let progress: PaymentProgressResponse = serde_json::from_str(&body).unwrap();
    assert_eq!(progress.order_status, OrderStatusType::Processing);
    assert_eq!(progress.payment_status, PaymentStatusType::Completed);

    let (status, body) = patch_request(&order_path, &shipped, &api).await;
    assert_eq!(status, StatusCode::OK);
    let update: StatusUpdateResponse = serde_json::from_str(&body).unwrap();
    assert_eq!(update.order_status, OrderStatusType::Shipped);
    assert_eq!(update.note.as_deref(), Some("Tracking 1Z999"));
    assert!(update.changed);
    assert_eq!(update.refund_status, None);

    // A stale version loses, even for a legal move
    let delivered = json!({ "status": "Delivered", "actor": "admin-2", "expected_version": update.version - 1 });
    let (status, body) = patch_request(&order_path, &delivered, &api).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(error_code(&body), "CONFLICT");

    let delivered = json!({ "status": "Delivered", "actor": "admin-2", "expected_version": update.version });
    let (status, _) = patch_request(&order_path, &delivered, &api).await;
    assert_eq!(status, StatusCode::OK);

    let back = json!({ "status": "Processing", "actor": "admin-1" });
    let (status, body) = patch_request(&order_path, &back, &api).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(error_code(&body), "INVALID_TRANSITION");

    let (_, body) = get_request(&format!("/orders/{}", result.order_id.as_str()), &api).await;
    let order: Order = serde_json::from_str(&body).unwrap();
    assert_eq!(order.status, OrderStatusType::Delivered);
    assert_eq!(order.status_history.len(), 4);
    assert_eq!(order.last_entry().and_then(|e| e.actor.clone()).as_deref(), Some("admin-2"));
}
