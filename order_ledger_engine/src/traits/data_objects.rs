use crate::db_types::{OrderId, Payment, PaymentId};

/// The outcome of a reconciliation sweep over stuck card payments.
#[derive(Debug, Clone, Default)]
pub struct ReconciliationResult {
    /// Payments that were moved to `Failed`.
    pub failed: Vec<Payment>,
    /// Payments that could not be reconciled in this pass, with the reason. They will be picked up again next time.
    pub skipped: Vec<(PaymentId, OrderId, String)>,
}

impl ReconciliationResult {
    pub fn failed_count(&self) -> usize {
        self.failed.len()
    }

    pub fn skipped_count(&self) -> usize {
        self.skipped.len()
    }

    pub fn total_count(&self) -> usize {
        self.failed_count() + self.skipped_count()
    }
}
