//! # Order ledger server
//! This crate hosts the HTTP surface of the order ledger. It is responsible for:
//! Accepting checkouts and turning them into orders and payments.
//! Recording cash collections and driving card charges through the card processor.
//! Admin status changes and refunds, including the refund that follows a paid order's cancellation.
//! Sweeping card payments that never heard back from the processor.
//!
//! ## Configuration
//! The server is configured via environment variables. See [config](config/index.html) for more information.
//!
//! ## Routes
//! The server exposes the following routes:
//! * `/health`: A health check route that returns a 200 OK response.
//! * `/checkout`: Create an order and its payment.
//! * `/orders/{id}`, `/orders/{id}/status`, `/users/{id}/orders`: Read and update orders.
//! * `/payments/{id}` and its `cod-complete`, `card-charge`, `card-complete` and `refund` sub-routes.
pub mod cli;
pub mod config;
pub mod data_objects;
pub mod errors;
pub mod gateway;
pub mod notifications;
pub mod reconciliation_worker;
pub mod routes;
pub mod server;

#[cfg(test)]
mod endpoint_tests;
