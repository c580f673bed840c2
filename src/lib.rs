//! Usage-to-cost breakdown for LLM API usage.
//!
//! [`compute_breakdown`] takes a batch of [`UsageRecord`]s and a
//! [`PricingTable`] and returns a [`BreakdownTree`] with a grand total,
//! per-account totals, per-model totals and per-account-per-model totals.
//! Amounts are kept in cents and rendered as trimmed USD strings.

pub mod aggregate;
pub mod cost;
pub mod diagnostic;
pub mod format;
pub mod input;
pub mod pricing;
pub mod types;

pub use aggregate::compute_breakdown;
pub use cost::{PricingMap, RateEntry};
pub use diagnostic::Diagnostic;
pub use pricing::{PriceEntry, PricingTable};
pub use types::{
    AccountBreakdown, BreakdownTree, CountBucket, Counters, Options, UnitKind, UsageRecord,
};
