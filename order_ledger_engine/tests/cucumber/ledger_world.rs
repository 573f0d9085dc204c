use std::time::Duration;

use cucumber::World;
use log::*;
use order_ledger_engine::{
    events::EventProducers,
    test_utils::{
        prepare_env::{create_database, random_db_path, run_migrations},
        FakeGateway,
    },
    CoordinatorConfig,
    LedgerError,
    RetryPolicy,
    SqliteDatabase,
    TransactionCoordinator,
};

#[derive(Default, Debug, World)]
pub struct LedgerWorld {
    pub system: Option<LedgerSystem>,
    pub last_error: Option<LedgerError>,
}

#[derive(Debug)]
pub struct LedgerSystem {
    pub db_path: String,
    pub db: SqliteDatabase,
    pub gateway: FakeGateway,
    pub coordinator: TransactionCoordinator<SqliteDatabase, FakeGateway>,
}

impl LedgerWorld {
    pub fn system(&self) -> &LedgerSystem {
        self.system.as_ref().expect("Ledger system not initialised")
    }

    pub fn coordinator(&self) -> &TransactionCoordinator<SqliteDatabase, FakeGateway> {
        &self.system().coordinator
    }

    pub fn gateway(&self) -> &FakeGateway {
        &self.system().gateway
    }

    /// Keeps the error of a step that is allowed to fail, so that a later step can assert on it.
    pub fn record<T>(&mut self, result: Result<T, LedgerError>) {
        match result {
            Ok(_) => self.last_error = None,
            Err(e) => {
                debug!("Step failed with {e}");
                self.last_error = Some(e);
            },
        }
    }
}

impl LedgerSystem {
    pub async fn new() -> Self {
        let url = prepare_test_env().await;
        let db = SqliteDatabase::new_with_url(&url, 5).await.expect("Error creating connection to database");
        debug!("Created database: {url}");
        let gateway = FakeGateway::new();
        let config = CoordinatorConfig {
            retry: RetryPolicy {
                max_conflict_retries: 3,
                max_gateway_retries: 2,
                initial_backoff: Duration::from_millis(5),
                max_backoff: Duration::from_millis(20),
            },
            gateway_timeout: Duration::from_millis(200),
            ..Default::default()
        };
        let coordinator = TransactionCoordinator::new(db.clone(), gateway.clone(), EventProducers::default(), config);
        Self { db_path: url, db, gateway, coordinator }
    }
}

pub async fn prepare_test_env() -> String {
    let path = random_db_path();
    create_database(&path).await;
    run_migrations(&path).await;
    path
}
