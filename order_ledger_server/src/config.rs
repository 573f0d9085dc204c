use std::{env, fmt::Display, str::FromStr, time::Duration};

use log::*;
use ol_common::{helpers::parse_boolean_flag, Secret, DEFAULT_CURRENCY_CODE};
use order_ledger_engine::{CoordinatorConfig, RetryPolicy};

const DEFAULT_OLS_HOST: &str = "127.0.0.1";
const DEFAULT_OLS_PORT: u16 = 8480;
const DEFAULT_DATABASE_URL: &str = "sqlite://data/order_ledger.db";
const DEFAULT_MAX_CONNECTIONS: u32 = 25;
const DEFAULT_GATEWAY_TIMEOUT: Duration = Duration::from_secs(10);
const DEFAULT_RECONCILE_INTERVAL: Duration = Duration::from_secs(60);
const DEFAULT_RECONCILE_MAX_AGE: chrono::Duration = chrono::Duration::minutes(15);
const DEFAULT_RECONCILE_MAX_ATTEMPTS: i64 = 5;

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub database_url: String,
    pub max_connections: u32,
    /// Apply the embedded migrations on start-up.
    pub run_migrations: bool,
    pub default_currency: String,
    pub gateway: GatewayConfig,
    pub retry: RetryPolicy,
    pub reconciliation: ReconciliationConfig,
}

#[derive(Clone, Debug, Default)]
pub struct GatewayConfig {
    /// Base url of the card processor, e.g. "https://api.cards.example.com/v1"
    pub base_url: String,
    pub api_key: Secret<String>,
    /// Upper bound on any single gateway call
    pub timeout: Duration,
}

/// Settings for the background sweep that fails card payments stuck in `Processing`.
#[derive(Clone, Copy, Debug)]
pub struct ReconciliationConfig {
    pub enabled: bool,
    pub interval: Duration,
    pub max_age: chrono::Duration,
    pub max_attempts: i64,
}

impl Default for ReconciliationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval: DEFAULT_RECONCILE_INTERVAL,
            max_age: DEFAULT_RECONCILE_MAX_AGE,
            max_attempts: DEFAULT_RECONCILE_MAX_ATTEMPTS,
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_OLS_HOST.to_string(),
            port: DEFAULT_OLS_PORT,
            database_url: DEFAULT_DATABASE_URL.to_string(),
            max_connections: DEFAULT_MAX_CONNECTIONS,
            run_migrations: true,
            default_currency: DEFAULT_CURRENCY_CODE.to_string(),
            gateway: GatewayConfig { timeout: DEFAULT_GATEWAY_TIMEOUT, ..Default::default() },
            retry: RetryPolicy::default(),
            reconciliation: ReconciliationConfig::default(),
        }
    }
}

impl ServerConfig {
    pub fn new(host: &str, port: u16) -> Self {
        Self { host: host.to_string(), port, ..Default::default() }
    }

    pub fn from_env_or_default() -> Self {
        let defaults = Self::default();
        let host = env::var("OLS_HOST").ok().unwrap_or(defaults.host);
        let port = env_or("OLS_PORT", defaults.port);
        let database_url = env::var("OLS_DATABASE_URL").ok().unwrap_or_else(|| {
            warn!("🪛️ OLS_DATABASE_URL is not set. Using the default, {DEFAULT_DATABASE_URL}.");
            defaults.database_url
        });
        let max_connections = env_or("OLS_DB_MAX_CONNECTIONS", defaults.max_connections);
        let run_migrations = parse_boolean_flag(env::var("OLS_RUN_MIGRATIONS").ok(), true);
        let default_currency = env::var("OLS_DEFAULT_CURRENCY").ok().unwrap_or(defaults.default_currency);
        let gateway = GatewayConfig::from_env_or_default();
        let retry = RetryPolicy {
            max_conflict_retries: env_or("OLS_MAX_CONFLICT_RETRIES", defaults.retry.max_conflict_retries),
            max_gateway_retries: env_or("OLS_MAX_GATEWAY_RETRIES", defaults.retry.max_gateway_retries),
            initial_backoff: millis_or("OLS_RETRY_INITIAL_BACKOFF_MS", defaults.retry.initial_backoff),
            max_backoff: millis_or("OLS_RETRY_MAX_BACKOFF_MS", defaults.retry.max_backoff),
        };
        let reconciliation = ReconciliationConfig::from_env_or_default();
        Self {
            host,
            port,
            database_url,
            max_connections,
            run_migrations,
            default_currency,
            gateway,
            retry,
            reconciliation,
        }
    }

    pub fn coordinator_config(&self) -> CoordinatorConfig {
        CoordinatorConfig {
            retry: self.retry,
            gateway_timeout: self.gateway.timeout,
            default_currency: self.default_currency.clone(),
        }
    }
}

impl GatewayConfig {
    pub fn from_env_or_default() -> Self {
        let base_url = env::var("OLS_GATEWAY_URL").ok().unwrap_or_else(|| {
            error!(
                "🪛️ OLS_GATEWAY_URL is not set. Card payments will fail until it points at your card processor's API."
            );
            String::default()
        });
        let api_key = env::var("OLS_GATEWAY_API_KEY").ok().unwrap_or_else(|| {
            error!("🪛️ OLS_GATEWAY_API_KEY is not set. Please set it to the secret key for your card processor.");
            String::default()
        });
        let timeout = millis_or("OLS_GATEWAY_TIMEOUT_MS", DEFAULT_GATEWAY_TIMEOUT);
        Self { base_url, api_key: Secret::new(api_key), timeout }
    }
}

impl ReconciliationConfig {
    pub fn from_env_or_default() -> Self {
        let enabled = parse_boolean_flag(env::var("OLS_RECONCILE_ENABLED").ok(), true);
        let interval = Duration::from_secs(env_or("OLS_RECONCILE_INTERVAL_SECS", DEFAULT_RECONCILE_INTERVAL.as_secs()));
        let max_age = chrono::Duration::minutes(env_or("OLS_RECONCILE_MAX_AGE_MINS", DEFAULT_RECONCILE_MAX_AGE.num_minutes()));
        let max_attempts = env_or("OLS_RECONCILE_MAX_ATTEMPTS", DEFAULT_RECONCILE_MAX_ATTEMPTS);
        if !enabled {
            info!("🪛️ Stale payment reconciliation is disabled.");
        }
        Self { enabled, interval, max_age, max_attempts }
    }
}

/// Reads and parses `name`, falling back to `default` (with a log message) when it is missing or invalid.
fn env_or<T>(name: &str, default: T) -> T
where
    T: FromStr + Display,
    T::Err: Display,
{
    match env::var(name) {
        Ok(s) => s.trim().parse::<T>().unwrap_or_else(|e| {
            warn!("🪛️ {s} is not a valid value for {name}. {e} Using the default, {default}, instead.");
            default
        }),
        Err(_) => {
            debug!("🪛️ {name} is not set. Using the default value of {default}.");
            default
        },
    }
}

fn millis_or(name: &str, default: Duration) -> Duration {
    let millis = env_or(name, default.as_millis() as u64);
    Duration::from_millis(millis)
}
