use std::time::Duration;

use actix_web::{dev::Server, http::KeepAlive, middleware::Logger, web, App, HttpServer};
use log::*;
use order_ledger_engine::{events::EventProducers, SqliteDatabase, TransactionCoordinator};

use crate::{
    config::ServerConfig,
    errors::ServerError,
    gateway::HttpCardGateway,
    notifications::create_notification_event_handlers,
    reconciliation_worker::start_reconciliation_worker,
    routes::{
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
    },
};

pub async fn run_server(config: ServerConfig) -> Result<(), ServerError> {
    let db = SqliteDatabase::new_with_url(&config.database_url, config.max_connections)
        .await
        .map_err(|e| ServerError::InitializeError(e.to_string()))?;
    if config.run_migrations {
        db.run_migrations().await.map_err(|e| ServerError::InitializeError(e.to_string()))?;
    }
    let gateway = HttpCardGateway::new(&config.gateway)?;
    let handlers = create_notification_event_handlers();
    let producers = handlers.producers();
    handlers.start_handlers().await;
    if config.reconciliation.enabled {
        let _worker = start_reconciliation_worker(
            db.clone(),
            gateway.clone(),
            producers.clone(),
            config.coordinator_config(),
            config.reconciliation,
        );
    }
    let srv = create_server_instance(config, db, gateway, producers)?;
    srv.await.map_err(|e| ServerError::Unspecified(e.to_string()))
}

pub fn create_server_instance(
    config: ServerConfig,
    db: SqliteDatabase,
    gateway: HttpCardGateway,
    producers: EventProducers,
) -> Result<Server, ServerError> {
    let coordinator_config = config.coordinator_config();
    let srv = HttpServer::new(move || {
        let coordinator =
            TransactionCoordinator::new(db.clone(), gateway.clone(), producers.clone(), coordinator_config.clone());
        App::new()
            .wrap(Logger::new("%t (%D ms) %s %a %{Host}i %U").log_target("ols::access_log"))
            .app_data(web::Data::new(coordinator))
            .service(health)
            .service(CheckoutRoute::<SqliteDatabase, HttpCardGateway>::new())
            .service(OrderByIdRoute::<SqliteDatabase, HttpCardGateway>::new())
            .service(OrdersForUserRoute::<SqliteDatabase, HttpCardGateway>::new())
            .service(UpdateOrderStatusRoute::<SqliteDatabase, HttpCardGateway>::new())
            .service(PaymentByIdRoute::<SqliteDatabase, HttpCardGateway>::new())
            .service(CodCompleteRoute::<SqliteDatabase, HttpCardGateway>::new())
            .service(CardChargeRoute::<SqliteDatabase, HttpCardGateway>::new())
            .service(CardCompleteRoute::<SqliteDatabase, HttpCardGateway>::new())
            .service(RefundRoute::<SqliteDatabase, HttpCardGateway>::new())
            .service(RetryRefundRoute::<SqliteDatabase, HttpCardGateway>::new())
            .service(ConfirmRefundRoute::<SqliteDatabase, HttpCardGateway>::new())
    })
    .keep_alive(KeepAlive::Timeout(Duration::from_secs(600)))
    .bind((config.host.as_str(), config.port))?
    .run();
    info!("🚀️ Order ledger listening on {}:{}", config.host, config.port);
    Ok(srv)
}
