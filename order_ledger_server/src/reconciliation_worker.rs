use log::*;
use order_ledger_engine::{
    db_types::Payment,
    events::EventProducers,
    CoordinatorConfig,
    SqliteDatabase,
    TransactionCoordinator,
};
use tokio::task::JoinHandle;

use crate::{config::ReconciliationConfig, gateway::HttpCardGateway};

/// Starts the stale payment reconciliation worker. Do not await the returned JoinHandle, as it will run indefinitely.
pub fn start_reconciliation_worker(
    db: SqliteDatabase,
    gateway: HttpCardGateway,
    producers: EventProducers,
    coordinator_config: CoordinatorConfig,
    config: ReconciliationConfig,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut timer = tokio::time::interval(config.interval);
        let api = TransactionCoordinator::new(db, gateway, producers, coordinator_config);
        info!("🕰️ Stale payment reconciliation worker started");
        loop {
            timer.tick().await;
            debug!("🕰️ Running stale payment reconciliation job");
            match api.reconcile_stale_payments(config.max_age, config.max_attempts).await {
                Ok(result) if result.total_count() == 0 => trace!("🕰️ No stale payments found"),
                Ok(result) => {
                    info!("🕰️ {} stale payments failed, {} skipped", result.failed_count(), result.skipped_count());
                    debug!("🕰️ Failed payments: {}", payment_list(&result.failed));
                    for (payment_id, order_id, reason) in &result.skipped {
                        debug!("🕰️ Skipped payment {payment_id} (order {order_id}): {reason}");
                    }
                },
                Err(e) => {
                    error!("🕰️ Error running stale payment reconciliation job: {e}");
                },
            }
        }
    })
}

fn payment_list(payments: &[Payment]) -> String {
    payments
        .iter()
        .map(|p| format!("payment_id: {} order_id: {} attempts: {}", p.payment_id, p.order_id, p.attempt_count))
        .collect::<Vec<String>>()
        .join(", ")
}
