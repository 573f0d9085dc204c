//! # Order ledger public API
//!
//! The `ledger_api` module exposes the programmatic API of the engine. It is split the same way the responsibilities
//! are split:
//!
//! * [`order_lifecycle_api`] guards the order status graph and keeps the order's audit history.
//! * [`payment_lifecycle_api`] guards the payment status graph, including the refund sub-record.
//! * [`transaction_coordinator`] sequences the cross-aggregate flows (checkout, payment collection, cancellation and
//!   refunds), talks to the payment gateway and emits events.
//!
//! The other submodules are support types.
//!
//! # API usage
//!
//! Every API instance is created by supplying a backend that implements [`crate::traits::LedgerDatabase`]:
//!
//! ```rust,ignore
//! use order_ledger_engine::{OrderLifecycleApi, SqliteDatabase};
//! let db = SqliteDatabase::new_with_url("sqlite://data/order_ledger.db", 25).await?;
//! let api = OrderLifecycleApi::new(db);
//! let orders = api.list_by_user(&"alice".into(), None).await?;
//! ```
pub mod errors;
pub mod order_lifecycle_api;
pub mod order_objects;
pub mod payment_lifecycle_api;
pub mod payment_objects;
pub mod retry;
pub mod transaction_coordinator;
