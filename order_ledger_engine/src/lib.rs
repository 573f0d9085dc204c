//! Order Ledger Engine
//!
//! The engine owns the lifecycle of an order and its payment: creating both at checkout, collecting the money (cash on
//! delivery or card), moving each through its status graph, and refunding when an order is cancelled. Every change is
//! recorded in an append-only history on the document it changes.
//!
//! The library is divided into these main sections:
//! 1. Storage ([`mod@traits`], [`SqliteDatabase`], [`MemoryDatabase`]). Orders and payments are stored as whole
//!    documents and every write is a version compare-and-swap, so concurrent writers can never silently overwrite one
//!    another. The data types themselves live in [`mod@db_types`] and are public.
//! 2. The public API ([`mod@ledger_api`]). [`OrderLifecycleApi`] and [`PaymentLifecycleApi`] guard the two state
//!    machines. [`TransactionCoordinator`] runs the flows that span both documents and talks to the card gateway.
//!
//! The engine also provides a set of events that can be subscribed to ([`mod@events`]). For example, when a new order
//! is created, an `OrderCreated` event is emitted. Event delivery never blocks the ledger.
pub mod db_types;
pub mod events;
pub mod helpers;
pub mod ledger_api;
mod memory;
#[cfg(feature = "sqlite")]
mod sqlite;
pub mod traits;

#[cfg(any(feature = "test_utils", test))]
pub mod test_utils;

pub use ledger_api::{
    errors::LedgerError,
    order_lifecycle_api::OrderLifecycleApi,
    order_objects,
    payment_lifecycle_api::PaymentLifecycleApi,
    payment_objects,
    retry::RetryPolicy,
    transaction_coordinator::{CoordinatorConfig, TransactionCoordinator},
};
pub use memory::MemoryDatabase;
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteDatabase;
