use actix_web::http::StatusCode;
use ol_common::Money;
use order_ledger_engine::{
    db_types::{OrderStatusType, Payment, PaymentMethod, PaymentStatusType, RefundStatus},
    traits::{ChargeResult, GatewayError},
};
use serde_json::json;

use super::{
    helpers::{checkout, error_code, get_request, patch_request, post_request, test_api},
    mocks::MockGateway,
};
use crate::data_objects::{PaymentProgressResponse, RefundResponse, StatusUpdateResponse};

fn visa(amount: Money) -> ChargeResult {
    ChargeResult {
        charge_id: "ch_3Mx9".into(),
        amount,
        receipt_ref: Some("rcpt-1001".into()),
        card_brand: Some("visa".into()),
        card_last4: Some("4242".into()),
    }
}

fn paying_gateway() -> MockGateway {
    let mut gateway = MockGateway::new();
    gateway.expect_create_charge().times(1).returning(|req| Ok(visa(req.amount)));
    gateway
}

async fn fetch_payment(id: &str, api: &super::helpers::TestApi) -> Payment {
    let (status, body) = get_request(&format!("/payments/{id}"), api).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    serde_json::from_str(&body).unwrap()
}

#[actix_web::test]
async fn cash_collection_is_idempotent() {
    let _ = env_logger::try_init().ok();
    let api = test_api(MockGateway::new());
    let result = checkout("alice", PaymentMethod::Cod, &api).await;
    let path = format!("/payments/{}/cod-complete", result.payment_id.as_str());
    let body = json!({ "collector": "courier-7" });
    for _ in 0..2 {
        let (status, body) = post_request(&path, &body, &api).await;
        assert_eq!(status, StatusCode::OK, "{body}");
        let progress: PaymentProgressResponse = serde_json::from_str(&body).unwrap();
        assert_eq!(progress.order_id, result.order_id);
        assert_eq!(progress.payment_status, PaymentStatusType::Completed);
        assert_eq!(progress.order_status, OrderStatusType::Processing);
    }
    let payment = fetch_payment(result.payment_id.as_str(), &api).await;
    assert_eq!(payment.status_history.len(), 2);
    assert_eq!(payment.cod.map(|c| c.collected_by).as_deref(), Some("courier-7"));
}

#[actix_web::test]
async fn unknown_payment() {
    let _ = env_logger::try_init().ok();
    let api = test_api(MockGateway::new());
    let body = json!({ "collector": "courier-7" });
    let (status, body) = post_request("/payments/nope/cod-complete", &body, &api).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(error_code(&body), "NOT_FOUND");
}

#[actix_web::test]
async fn card_charge_captures_the_payment() {
    let _ = env_logger::try_init().ok();
    let api = test_api(paying_gateway());
    let result = checkout("alice", PaymentMethod::Card, &api).await;
    let path = format!("/payments/{}/card-charge", result.payment_id.as_str());
    let (status, body) = post_request(&path, &json!({ "payment_method_token": "tok_visa" }), &api).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    let progress: PaymentProgressResponse = serde_json::from_str(&body).unwrap();
    assert_eq!(progress.payment_status, PaymentStatusType::Completed);
    assert_eq!(progress.order_status, OrderStatusType::Processing);

    let payment = fetch_payment(result.payment_id.as_str(), &api).await;
    let card = payment.card.as_ref().expect("card details");
    assert_eq!(card.card_last4.as_deref(), Some("4242"));
    assert_eq!(card.card_brand.as_deref(), Some("visa"));
    assert_eq!(payment.charge_id(), Some("ch_3Mx9"));
    assert_eq!(payment.attempt_count, 1);
}

#[actix_web::test]
async fn declined_card() {
    let _ = env_logger::try_init().ok();
    let mut gateway = MockGateway::new();
    gateway.expect_create_charge().times(1).returning(|_| Err(GatewayError::Declined("insufficient funds".into())));
    let api = test_api(gateway);
    let result = checkout("alice", PaymentMethod::Card, &api).await;
    let path = format!("/payments/{}/card-charge", result.payment_id.as_str());
    let (status, body) = post_request(&path, &json!({ "payment_method_token": "tok_broke" }), &api).await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(error_code(&body), "GATEWAY_ERROR");
    let payment = fetch_payment(result.payment_id.as_str(), &api).await;
    assert_eq!(payment.status, PaymentStatusType::Failed);
    let (_, body) = get_request(&format!("/orders/{}", result.order_id.as_str()), &api).await;
    let order: serde_json::Value = serde_json::from_str(&body).unwrap();
    assert_eq!(order["status"], "Pending");
    assert_eq!(order["payment_status"], "Failed");
}

#[actix_web::test]
async fn webhook_settles_a_timed_out_charge_once() {
    let _ = env_logger::try_init().ok();
    let mut gateway = MockGateway::new();
    gateway.expect_create_charge().times(1).returning(|_| Err(GatewayError::Timeout));
    let api = test_api(gateway);
    let result = checkout("alice", PaymentMethod::Card, &api).await;
    let pid = result.payment_id.as_str();
    let (status, _) =
        post_request(&format!("/payments/{pid}/card-charge"), &json!({ "payment_method_token": "tok_visa" }), &api).await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(fetch_payment(pid, &api).await.status, PaymentStatusType::Processing);

    let webhook = visa(Money::from(4999));
    let (status, body) = post_request(&format!("/payments/{pid}/card-complete"), &webhook, &api).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    let first = fetch_payment(pid, &api).await;
    assert_eq!(first.status, PaymentStatusType::Completed);

    let (status, body) = post_request(&format!("/payments/{pid}/card-complete"), &webhook, &api).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    let progress: PaymentProgressResponse = serde_json::from_str(&body).unwrap();
    assert_eq!(progress.order_status, OrderStatusType::Processing);
    let second = fetch_payment(pid, &api).await;
    assert_eq!(second.status_history.len(), first.status_history.len());
    assert_eq!(second.version, first.version);
}

#[actix_web::test]
async fn late_webhook_on_a_failed_payment_is_kept() {
    let _ = env_logger::try_init().ok();
    let mut gateway = MockGateway::new();
    gateway.expect_create_charge().times(1).returning(|_| Err(GatewayError::Declined("do not honor".into())));
    let api = test_api(gateway);
    let result = checkout("alice", PaymentMethod::Card, &api).await;
    let pid = result.payment_id.as_str();
    let (status, _) =
        post_request(&format!("/payments/{pid}/card-charge"), &json!({ "payment_method_token": "tok_visa" }), &api).await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(fetch_payment(pid, &api).await.status, PaymentStatusType::Failed);

    let (status, body) = post_request(&format!("/payments/{pid}/card-complete"), &visa(Money::from(4999)), &api).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    let progress: PaymentProgressResponse = serde_json::from_str(&body).unwrap();
    assert_eq!(progress.payment_status, PaymentStatusType::Completed);
    assert_eq!(progress.order_status, OrderStatusType::Processing);
    let payment = fetch_payment(pid, &api).await;
    assert_eq!(payment.charge_id(), Some("ch_3Mx9"));
    assert_eq!(payment.status_history.len(), 5);
}

#[actix_web::test]
async fn cancelling_a_paid_card_order_refunds_it() {
    let _ = env_logger::try_init().ok();
    let mut gateway = paying_gateway();
    gateway
        .expect_issue_refund()
        .times(1)
        .withf(|req| req.charge_id == "ch_3Mx9" && req.amount == Money::from(4999))
        .returning(|_| Ok("re_77".into()));
    let api = test_api(gateway);
    let result = checkout("alice", PaymentMethod::Card, &api).await;
    let pid = result.payment_id.as_str();
    let (status, _) =
        post_request(&format!("/payments/{pid}/card-charge"), &json!({ "payment_method_token": "tok_visa" }), &api).await;
    assert_eq!(status, StatusCode::OK);

    let cancel = json!({ "status": "Cancelled", "note": "Changed my mind", "actor": "alice" });
    let (status, body) = patch_request(&format!("/orders/{}/status", result.order_id.as_str()), &cancel, &api).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    let update: StatusUpdateResponse = serde_json::from_str(&body).unwrap();
    assert_eq!(update.order_status, OrderStatusType::Cancelled);
    assert_eq!(update.payment_status, PaymentStatusType::Refunded);
    assert_eq!(update.refund_status, Some(RefundStatus::Processed));

    let payment = fetch_payment(pid, &api).await;
    let refund = payment.refund.expect("refund");
    assert_eq!(refund.amount, Money::from(4999));
    assert_eq!(refund.gateway_refund_ref.as_deref(), Some("re_77"));
}

#[actix_web::test]
async fn refunds_need_a_completed_payment() {
    let _ = env_logger::try_init().ok();
    let api = test_api(MockGateway::new());
    let result = checkout("alice", PaymentMethod::Card, &api).await;
    let refund = json!({ "amount": 1000, "reason": "goodwill", "actor": "admin-1" });
    let (status, body) = post_request(&format!("/payments/{}/refund", result.payment_id.as_str()), &refund, &api).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(error_code(&body), "INVALID_STATE");
    let payment = fetch_payment(result.payment_id.as_str(), &api).await;
    assert!(payment.refund.is_none());
    assert_eq!(payment.status_history.len(), 1);
}

#[actix_web::test]
async fn cash_refunds_are_confirmed_by_hand() {
    let _ = env_logger::try_init().ok();
    let api = test_api(MockGateway::new());
    let result = checkout("alice", PaymentMethod::Cod, &api).await;
    let pid = result.payment_id.as_str();
    let (status, _) = post_request(&format!("/payments/{pid}/cod-complete"), &json!({ "collector": "courier-7" }), &api).await;
    assert_eq!(status, StatusCode::OK);

    let refund = json!({ "amount": 2499, "reason": "damaged tee", "actor": "admin-1" });
    let (status, body) = post_request(&format!("/payments/{pid}/refund"), &refund, &api).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    let outcome: RefundResponse = serde_json::from_str(&body).unwrap();
    assert_eq!(outcome.refund_status, RefundStatus::Pending);
    assert_eq!(outcome.amount, Money::from(2499));
    assert_eq!(outcome.payment_status, PaymentStatusType::Refunded);

    let (status, body) = post_request(&format!("/payments/{pid}/refund/retry"), &json!({}), &api).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(error_code(&body), "INVALID_STATE");

    let confirm = json!({ "reference": "till-receipt-88", "actor": "admin-1" });
    let (status, body) = post_request(&format!("/payments/{pid}/refund/confirm"), &confirm, &api).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    let outcome: RefundResponse = serde_json::from_str(&body).unwrap();
    assert_eq!(outcome.refund_status, RefundStatus::Processed);
}
