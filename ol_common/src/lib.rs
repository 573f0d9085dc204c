//! Primitives shared by the order ledger crates.
mod money;

pub mod helpers;
pub mod op;
mod secret;

pub use money::{minor_unit_digits, Money, MoneyConversionError, DEFAULT_CURRENCY_CODE};
pub use secret::Secret;
