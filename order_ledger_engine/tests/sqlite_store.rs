use chrono::{Duration, Utc};
use ol_common::Money;
use order_ledger_engine::{
    db_types::{
        LineItem,
        NewOrder,
        NewPayment,
        OrderId,
        OrderStatusType,
        PaymentId,
        PaymentMethod,
        PaymentStatusType,
        ShippingAddress,
    },
    order_objects::OrderQueryFilter,
    test_utils::prepare_env::{prepare_test_env, random_db_path},
    traits::{LedgerDatabase, LedgerDatabaseError},
    SqliteDatabase,
};
use sqlx::{migrate::MigrateDatabase, Sqlite};
use tokio::runtime::Runtime;

async fn setup() -> SqliteDatabase {
    let url = random_db_path();
    prepare_test_env(&url).await;
    SqliteDatabase::new_with_url(&url, 5).await.expect("Error creating database")
}

async fn tear_down(mut db: SqliteDatabase) {
    db.close().await.unwrap();
    Sqlite::drop_database(db.url()).await.unwrap();
}

fn new_order(id: &str, user: &str, price: i64) -> NewOrder {
    NewOrder {
        order_id: OrderId::from(id),
        user_id: user.into(),
        line_items: vec![LineItem::new("sku-1", 2, Money::from(price))],
        total: Money::from(2 * price),
        currency: "USD".into(),
        shipping_address: ShippingAddress::default(),
        created_at: Utc::now(),
    }
}

#[test]
fn checkout_round_trip() {
    let rt = Runtime::new().unwrap();
    rt.block_on(async {
        let db = setup().await;
        let order = new_order("10", "alice", 450);
        let payment = NewPayment::for_order(&order, PaymentMethod::Card);
        let payment_id = payment.payment_id.clone();
        let (stored_order, stored_payment) = db.insert_checkout(order, payment).await.unwrap();
        assert_eq!(stored_order.version, 1);
        assert_eq!(stored_order.total, Money::from(900));
        assert_eq!(stored_order.status, OrderStatusType::Pending);
        assert_eq!(stored_order.status_history.len(), 1);
        assert_eq!(stored_payment.amount, Money::from(900));
        assert_eq!(stored_payment.status, PaymentStatusType::Pending);
        assert!(stored_payment.card.is_some());

        let fetched = db.fetch_order(&OrderId::from("10")).await.unwrap().unwrap();
        assert_eq!(fetched, stored_order);
        let fetched = db.fetch_payment(&payment_id).await.unwrap().unwrap();
        assert_eq!(fetched, stored_payment);
        let by_order = db.fetch_payment_for_order(&OrderId::from("10")).await.unwrap().unwrap();
        assert_eq!(by_order.payment_id, payment_id);
        assert!(db.fetch_order(&OrderId::from("11")).await.unwrap().is_none());
        assert!(db.fetch_payment(&PaymentId::from("nope")).await.unwrap().is_none());
        tear_down(db).await;
    });
}

#[test]
fn duplicates_are_rejected() {
    let rt = Runtime::new().unwrap();
    rt.block_on(async {
        let db = setup().await;
        let order = new_order("20", "alice", 100);
        let payment = NewPayment::for_order(&order, PaymentMethod::Cod);
        db.insert_checkout(order.clone(), payment).await.unwrap();

        let again = NewPayment::for_order(&order, PaymentMethod::Cod);
        let err = db.insert_checkout(order.clone(), again.clone()).await.unwrap_err();
        assert!(matches!(err, LedgerDatabaseError::OrderAlreadyExists(_)));
        let err = db.insert_payment(again).await.unwrap_err();
        assert!(matches!(err, LedgerDatabaseError::PaymentAlreadyExists(_)));

        let orphan = NewPayment::for_order(&new_order("21", "alice", 100), PaymentMethod::Cod);
        let err = db.insert_payment(orphan).await.unwrap_err();
        assert!(matches!(err, LedgerDatabaseError::OrderNotFound(_)));
        tear_down(db).await;
    });
}

#[test]
fn updates_compare_versions() {
    let rt = Runtime::new().unwrap();
    rt.block_on(async {
        let db = setup().await;
        let order = new_order("30", "bob", 100);
        let payment = NewPayment::for_order(&order, PaymentMethod::Cod);
        let (mut order, mut payment) = db.insert_checkout(order, payment).await.unwrap();

        order.push_status(OrderStatusType::Processing, Some("paid".into()), Some("system".into()));
        let updated = db.update_order(&order, 1).await.unwrap();
        assert_eq!(updated.version, 2);
        assert_eq!(updated.status, OrderStatusType::Processing);
        assert_eq!(updated.status_history.len(), 2);

        // Another writer still holding version 1 loses
        match db.update_order(&order, 1).await {
            Err(LedgerDatabaseError::VersionConflict { expected, actual, .. }) => {
                assert_eq!(expected, 1);
                assert_eq!(actual, 2);
            },
            other => panic!("Expected a version conflict, got {other:?}"),
        }

        payment.push_status(PaymentStatusType::Completed, Some("cash".into()));
        let stored = db.update_payment(&payment, 1).await.unwrap();
        assert_eq!(stored.version, 2);
        assert!(matches!(db.update_payment(&payment, 1).await, Err(LedgerDatabaseError::VersionConflict { .. })));

        let mut ghost = updated.clone();
        ghost.order_id = OrderId::from("31");
        assert!(matches!(db.update_order(&ghost, 2).await, Err(LedgerDatabaseError::OrderNotFound(_))));
        tear_down(db).await;
    });
}

#[test]
fn search_by_user_and_status() {
    let rt = Runtime::new().unwrap();
    rt.block_on(async {
        let db = setup().await;
        let start = Utc::now();
        for (i, user) in ["alice", "bob", "alice", "alice"].iter().enumerate() {
            let mut order = new_order(&format!("4{i}"), user, 100);
            order.created_at = start + Duration::seconds(i as i64);
            let payment = NewPayment::for_order(&order, PaymentMethod::Cod);
            db.insert_checkout(order, payment).await.unwrap();
        }
        let mut order = db.fetch_order(&OrderId::from("42")).await.unwrap().unwrap();
        order.push_status(OrderStatusType::Cancelled, None, Some("alice".into()));
        db.update_order(&order, 1).await.unwrap();

        let all = db.search_orders(OrderQueryFilter::default().with_user_id("alice".into())).await.unwrap();
        let ids = all.iter().map(|o| o.order_id.as_str()).collect::<Vec<_>>();
        assert_eq!(ids, vec!["43", "42", "40"]);

        let pending = OrderQueryFilter::default().with_user_id("alice".into()).with_status(OrderStatusType::Pending);
        let ids = db.search_orders(pending).await.unwrap().into_iter().map(|o| o.order_id).collect::<Vec<_>>();
        assert_eq!(ids, vec![OrderId::from("43"), OrderId::from("40")]);

        let window = OrderQueryFilter::default().since(start + Duration::milliseconds(500)).until(start + Duration::seconds(2));
        let ids = db.search_orders(window).await.unwrap().into_iter().map(|o| o.order_id).collect::<Vec<_>>();
        assert_eq!(ids, vec![OrderId::from("42"), OrderId::from("41")]);

        let none = OrderQueryFilter::default().with_user_id("carol".into());
        assert!(db.search_orders(none).await.unwrap().is_empty());
        tear_down(db).await;
    });
}

#[test]
fn stale_payments() {
    let rt = Runtime::new().unwrap();
    rt.block_on(async {
        let db = setup().await;
        let mut ids = vec![];
        for i in 0..3 {
            let order = new_order(&format!("5{i}"), "dave", 100);
            let payment = NewPayment::for_order(&order, PaymentMethod::Card);
            let (_, mut payment) = db.insert_checkout(order, payment).await.unwrap();
            if i < 2 {
                payment.attempt_count = i + 1;
                payment.last_attempt_at = Some(Utc::now() - Duration::minutes(30 * (1 - i)));
                payment.push_status(PaymentStatusType::Processing, None);
                db.update_payment(&payment, 1).await.unwrap();
            }
            ids.push(payment.payment_id);
        }
        // Only the payment attempted half an hour ago is old enough
        let stale = db.fetch_stale_payments(PaymentStatusType::Processing, Utc::now() - Duration::minutes(10), 5).await.unwrap();
        assert_eq!(stale.iter().map(|p| &p.payment_id).collect::<Vec<_>>(), vec![&ids[0]]);
        // ...unless the attempt budget is exhausted
        let stale = db.fetch_stale_payments(PaymentStatusType::Processing, Utc::now() - Duration::minutes(10), 2).await.unwrap();
        assert_eq!(stale.len(), 2);
        // Pending payments are never swept
        let stale = db.fetch_stale_payments(PaymentStatusType::Processing, Utc::now() + Duration::minutes(1), 100).await.unwrap();
        assert!(stale.iter().all(|p| p.payment_id != ids[2]));
        tear_down(db).await;
    });
}
