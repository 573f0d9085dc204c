//! #  Backend and collaborator contracts.
//!
//! This module defines the interfaces the ledger engine needs from the outside world.
//!
//! * [`LedgerDatabase`] is the Ledger Store. It persists orders and payments as whole documents and guards every
//!   write with a version compare-and-swap. [`crate::SqliteDatabase`] and [`crate::MemoryDatabase`] implement it.
//! * [`PaymentGateway`] is the card-processing provider. The engine never talks to a provider except through this
//!   trait, and never holds a global client.
mod data_objects;
mod ledger_database;
mod payment_gateway;

pub use data_objects::ReconciliationResult;
pub use ledger_database::{LedgerDatabase, LedgerDatabaseError};
pub use payment_gateway::{ChargeRequest, ChargeResult, GatewayError, PaymentGateway, RefundRequest};
