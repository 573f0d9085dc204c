//! Request handler definitions
//!
//! Define each route and it handler here.
//! Handlers that are more than a line or two MUST go into a separate module. Keep this module neat and tidy 🙏
//!
//! A note about performance:
//! Since each worker thread processes its requests sequentially, handlers which block the current thread will cause the
//! current worker to stop processing new requests. Every ledger operation is asynchronous, and gateway calls are bounded
//! by the configured timeout, so handlers only ever `.await`.
use actix_web::{get, web, HttpResponse, Responder};
use log::*;
use order_ledger_engine::{
    db_types::{OrderId, OrderStatusType, PaymentId, UserId},
    order_objects::{CheckoutRequest, OrderTransition},
    traits::{ChargeResult, LedgerDatabase, PaymentGateway},
    TransactionCoordinator,
};

use crate::{
    data_objects::{
        CardChargeParams,
        CodCompleteParams,
        PaymentProgressResponse,
        RefundConfirmParams,
        RefundParams,
        RefundResponse,
        StatusUpdateParams,
        StatusUpdateResponse,
        UserOrdersQuery,
    },
    errors::ServerError,
};

// Web-actix cannot handle generics in handlers, so it's implemented manually using the `route!` macro.
// `route!(name => Method "/path" impl TraitA, TraitB)` defines `NameRoute<TTraitA, TTraitB>`, which registers the
// handler `name::<TTraitA, TTraitB>`.
#[macro_export]
macro_rules! route {
    ($name:ident => $method:ident $path:literal impl $($bounds:ty),+) => {
        paste::paste! { pub struct [<$name:camel Route>]< $( [< T $bounds:camel> ],)+ >( $( core::marker::PhantomData<fn() -> [< T $bounds:camel> ] >,)+ );}
        paste::paste! { impl< $( [< T $bounds:camel> ],)+ > [<$name:camel Route>]< $( [< T $bounds:camel> ],)+ > {
            #[allow(clippy::new_without_default)]
            pub fn new() -> Self {
                Self($( core::marker::PhantomData::<fn() -> [< T $bounds:camel> ] >,)+)
            }
        }}
        paste::paste! { impl<$( [< T $bounds:camel >] , )+> actix_web::dev::HttpServiceFactory for [<$name:camel Route>]<$([<T $bounds:camel>],)+>
        where
            $([<T $bounds:camel>]: $bounds + 'static,)+
        {
            fn register(self, config: &mut actix_web::dev::AppService) {
                let res = actix_web::Resource::new($path)
                    .name(stringify!($name))
                    .guard(actix_web::guard::$method())
                    .to($name::< $( [< T $bounds:camel >], )+>);
                actix_web::dev::HttpServiceFactory::register(res, config);
            }
        }}
    };
}

type Coordinator<B, G> = web::Data<TransactionCoordinator<B, G>>;

// ----------------------------------------------   Health  ----------------------------------------------------
#[get("/health")]
pub async fn health() -> impl Responder {
    trace!("💻️ Received health check request");
    HttpResponse::Ok().body("👍️\n")
}

//----------------------------------------------   Checkout  ----------------------------------------------------
route!(checkout => Post "/checkout" impl LedgerDatabase, PaymentGateway);
/// Creates an order and its payment from a priced cart.
///
/// The request may carry its own `order_id`. Repeating the request with the same id and cart returns the original
/// order instead of creating a second one.
pub async fn checkout<B: LedgerDatabase, G: PaymentGateway>(
    body: web::Json<CheckoutRequest>,
    api: Coordinator<B, G>,
) -> Result<HttpResponse, ServerError> {
    let request = body.into_inner();
    debug!("💻️ POST checkout for {} ({} items, {})", request.user_id, request.line_items.len(), request.method);
    let result = api.checkout(request).await?;
    Ok(HttpResponse::Created().json(result))
}

//----------------------------------------------   Orders  ----------------------------------------------------
route!(order_by_id => Get "/orders/{id}" impl LedgerDatabase, PaymentGateway);
pub async fn order_by_id<B: LedgerDatabase, G: PaymentGateway>(
    path: web::Path<String>,
    api: Coordinator<B, G>,
) -> Result<HttpResponse, ServerError> {
    let order_id = OrderId::from(path.into_inner());
    trace!("💻️ GET order {order_id}");
    let order = api.orders().get(&order_id).await?;
    Ok(HttpResponse::Ok().json(order))
}

route!(orders_for_user => Get "/users/{id}/orders" impl LedgerDatabase, PaymentGateway);
/// The user's orders, newest first. `?status=Shipped` restricts the list to one status.
pub async fn orders_for_user<B: LedgerDatabase, G: PaymentGateway>(
    path: web::Path<String>,
    query: web::Query<UserOrdersQuery>,
    api: Coordinator<B, G>,
) -> Result<HttpResponse, ServerError> {
    let user_id = UserId::from(path.into_inner());
    let status = query
        .into_inner()
        .status
        .map(|s| s.parse::<OrderStatusType>())
        .transpose()
        .map_err(|e| ServerError::InvalidRequestPath(e.to_string()))?;
    trace!("💻️ GET orders for {user_id} (status: {status:?})");
    let orders = api.orders().list_by_user(&user_id, status).await?;
    Ok(HttpResponse::Ok().json(orders))
}

route!(update_order_status => Patch "/orders/{id}/status" impl LedgerDatabase, PaymentGateway);
/// The admin status change. Cancelling a paid order refunds it.
pub async fn update_order_status<B: LedgerDatabase, G: PaymentGateway>(
    path: web::Path<String>,
    body: web::Json<StatusUpdateParams>,
    api: Coordinator<B, G>,
) -> Result<HttpResponse, ServerError> {
    let order_id = OrderId::from(path.into_inner());
    let transition = OrderTransition::from(body.into_inner());
    info!(
        "💻️ PATCH order {order_id} status to {} by {}",
        transition.target,
        transition.actor.as_deref().unwrap_or("(anonymous)")
    );
    let outcome = api.change_order_status(&order_id, transition).await?;
    Ok(HttpResponse::Ok().json(StatusUpdateResponse::from(outcome)))
}

//----------------------------------------------   Payments  ----------------------------------------------------
route!(payment_by_id => Get "/payments/{id}" impl LedgerDatabase, PaymentGateway);
pub async fn payment_by_id<B: LedgerDatabase, G: PaymentGateway>(
    path: web::Path<String>,
    api: Coordinator<B, G>,
) -> Result<HttpResponse, ServerError> {
    let payment_id = PaymentId::from(path.into_inner());
    trace!("💻️ GET payment {payment_id}");
    let payment = api.payments().get(&payment_id).await?;
    Ok(HttpResponse::Ok().json(payment))
}

route!(cod_complete => Post "/payments/{id}/cod-complete" impl LedgerDatabase, PaymentGateway);
/// The courier has collected the cash.
pub async fn cod_complete<B: LedgerDatabase, G: PaymentGateway>(
    path: web::Path<String>,
    body: web::Json<CodCompleteParams>,
    api: Coordinator<B, G>,
) -> Result<HttpResponse, ServerError> {
    let order_id = order_for_payment(path.into_inner(), &api).await?;
    let CodCompleteParams { collector } = body.into_inner();
    info!("💻️ POST cash collected for order {order_id} by {collector}");
    let progress = api.collect_cod_payment(&order_id, &collector).await?;
    Ok(HttpResponse::Ok().json(PaymentProgressResponse::from(progress)))
}

route!(card_charge => Post "/payments/{id}/card-charge" impl LedgerDatabase, PaymentGateway);
/// Charges the card through the gateway. A `502` with the payment still `Processing` means the outcome is not yet
/// known; the gateway webhook settles it.
pub async fn card_charge<B: LedgerDatabase, G: PaymentGateway>(
    path: web::Path<String>,
    body: web::Json<CardChargeParams>,
    api: Coordinator<B, G>,
) -> Result<HttpResponse, ServerError> {
    let order_id = order_for_payment(path.into_inner(), &api).await?;
    debug!("💻️ POST card charge for order {order_id}");
    let progress = api.charge_card(&order_id, &body.payment_method_token).await?;
    Ok(HttpResponse::Ok().json(PaymentProgressResponse::from(progress)))
}

route!(card_complete => Post "/payments/{id}/card-complete" impl LedgerDatabase, PaymentGateway);
/// The gateway webhook for captured charges. Safe to deliver more than once.
pub async fn card_complete<B: LedgerDatabase, G: PaymentGateway>(
    path: web::Path<String>,
    body: web::Json<ChargeResult>,
    api: Coordinator<B, G>,
) -> Result<HttpResponse, ServerError> {
    let order_id = order_for_payment(path.into_inner(), &api).await?;
    let charge = body.into_inner();
    info!("💻️ POST card webhook for order {order_id}, charge {}", charge.charge_id);
    let progress = api.process_card_charge(&order_id, charge).await?;
    Ok(HttpResponse::Ok().json(PaymentProgressResponse::from(progress)))
}

//----------------------------------------------   Refunds  ----------------------------------------------------
route!(refund => Post "/payments/{id}/refund" impl LedgerDatabase, PaymentGateway);
pub async fn refund<B: LedgerDatabase, G: PaymentGateway>(
    path: web::Path<String>,
    body: web::Json<RefundParams>,
    api: Coordinator<B, G>,
) -> Result<HttpResponse, ServerError> {
    let payment_id = PaymentId::from(path.into_inner());
    let RefundParams { amount, reason, actor } = body.into_inner();
    info!("💻️ POST refund of {amount} on payment {payment_id} by {actor}");
    let outcome = api.refund_payment(&payment_id, amount, &reason, &actor).await?;
    Ok(HttpResponse::Ok().json(RefundResponse::from(outcome)))
}

route!(retry_refund => Post "/payments/{id}/refund/retry" impl LedgerDatabase, PaymentGateway);
pub async fn retry_refund<B: LedgerDatabase, G: PaymentGateway>(
    path: web::Path<String>,
    api: Coordinator<B, G>,
) -> Result<HttpResponse, ServerError> {
    let payment_id = PaymentId::from(path.into_inner());
    info!("💻️ POST retry refund on payment {payment_id}");
    let outcome = api.retry_refund(&payment_id).await?;
    Ok(HttpResponse::Ok().json(RefundResponse::from(outcome)))
}

route!(confirm_refund => Post "/payments/{id}/refund/confirm" impl LedgerDatabase, PaymentGateway);
/// Cash refunds are handed back in person. This records that it happened.
pub async fn confirm_refund<B: LedgerDatabase, G: PaymentGateway>(
    path: web::Path<String>,
    body: web::Json<RefundConfirmParams>,
    api: Coordinator<B, G>,
) -> Result<HttpResponse, ServerError> {
    let payment_id = PaymentId::from(path.into_inner());
    let RefundConfirmParams { reference, actor } = body.into_inner();
    info!("💻️ POST confirm cash refund on payment {payment_id} by {actor}");
    let outcome = api.confirm_manual_refund(&payment_id, &reference, &actor).await?;
    Ok(HttpResponse::Ok().json(RefundResponse::from(outcome)))
}

async fn order_for_payment<B: LedgerDatabase, G: PaymentGateway>(
    payment_id: String,
    api: &TransactionCoordinator<B, G>,
) -> Result<OrderId, ServerError> {
    let payment = api.payments().get(&PaymentId::from(payment_id)).await?;
    Ok(payment.order_id)
}
