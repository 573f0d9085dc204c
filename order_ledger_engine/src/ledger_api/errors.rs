use thiserror::Error;

use crate::traits::{GatewayError, LedgerDatabaseError};

/// Errors surfaced by the lifecycle managers and the transaction coordinator.
#[derive(Debug, Clone, Error)]
pub enum LedgerError {
    #[error("Illegal transition from {from} to {to}")]
    InvalidTransition { from: String, to: String },
    #[error("Operation not allowed in the current state: {0}")]
    InvalidState(String),
    #[error("{0} not found")]
    NotFound(String),
    #[error("Concurrent modification of {0}. Re-read and try again.")]
    Conflict(String),
    #[error("Payment gateway error: {0}")]
    GatewayError(#[from] GatewayError),
    #[error("Checkout failed: {0}")]
    CheckoutFailed(String),
    #[error("Database error: {0}")]
    DatabaseError(String),
}

impl LedgerError {
    pub fn invalid_transition<A: ToString, B: ToString>(from: A, to: B) -> Self {
        Self::InvalidTransition { from: from.to_string(), to: to.to_string() }
    }

    /// A stable, machine-readable error code.
    pub fn code(&self) -> &'static str {
        match self {
            LedgerError::InvalidTransition { .. } => "INVALID_TRANSITION",
            LedgerError::InvalidState(_) => "INVALID_STATE",
            LedgerError::NotFound(_) => "NOT_FOUND",
            LedgerError::Conflict(_) => "CONFLICT",
            LedgerError::GatewayError(_) => "GATEWAY_ERROR",
            LedgerError::CheckoutFailed(_) => "CHECKOUT_FAILED",
            LedgerError::DatabaseError(_) => "DATABASE_ERROR",
        }
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, LedgerError::Conflict(_))
    }
}

impl From<LedgerDatabaseError> for LedgerError {
    fn from(e: LedgerDatabaseError) -> Self {
        match e {
            LedgerDatabaseError::OrderNotFound(id) => LedgerError::NotFound(format!("Order {id}")),
            LedgerDatabaseError::PaymentNotFound(id) => LedgerError::NotFound(format!("Payment {id}")),
            LedgerDatabaseError::VersionConflict { id, .. } => LedgerError::Conflict(id),
            LedgerDatabaseError::OrderAlreadyExists(id) => LedgerError::CheckoutFailed(format!("Order {id} already exists")),
            LedgerDatabaseError::PaymentAlreadyExists(id) => {
                LedgerError::CheckoutFailed(format!("Order {id} already has a payment"))
            },
            e => LedgerError::DatabaseError(e.to_string()),
        }
    }
}
