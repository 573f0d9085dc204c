//! Small, pure helpers used by the lifecycle managers.
use chrono::{DateTime, Utc};
use rand::{distributions::Alphanumeric, Rng};

/// Generates a cash-on-delivery receipt number of the form `COD-YYYYMMDD-XXXXXXXX`, where the suffix is eight random
/// upper-case alphanumerics.
pub fn cod_receipt_number(collected_at: DateTime<Utc>) -> String {
    let suffix: String =
        rand::thread_rng().sample_iter(&Alphanumeric).take(8).map(|c| char::from(c).to_ascii_uppercase()).collect();
    format!("COD-{}-{suffix}", collected_at.format("%Y%m%d"))
}

/// Reduces whatever the gateway reported as card digits to the last four, so that a full PAN can never be stored.
pub fn mask_card_digits(digits: Option<&str>) -> Option<String> {
    let digits = digits?.chars().filter(|c| c.is_ascii_digit()).collect::<Vec<char>>();
    if digits.len() < 4 {
        return None;
    }
    Some(digits[digits.len() - 4..].iter().collect())
}

/// The idempotency key sent with the n-th charge attempt for a payment.
pub fn charge_idempotency_key(payment_id: &str, attempt: i64) -> String {
    format!("charge-{payment_id}-{attempt}")
}

/// The idempotency key sent with the n-th issuance of a payment's refund. A payment carries at most one refund, and
/// the key only moves on after a definitive failure, so a provider that caches by key never replays that failure.
pub fn refund_idempotency_key(payment_id: &str, attempt: i64) -> String {
    format!("refund-{payment_id}-{attempt}")
}
