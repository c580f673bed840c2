//! Currency strings for bucket amounts.
//!
//! Amounts are held in cents. They are shown in dollars at four fractional
//! digits, then trailing zeros are trimmed down to a two-digit floor:
//! `$5.0100` becomes `$5.01`, `$5.0010` becomes `$5.001`.

use num_format::{Locale, ToFormattedString};

use crate::types::{BreakdownTree, CountBucket};

/// Default shown for the grand total before anything is priced.
pub const ZERO_AMOUNT: &str = "$0.00";

const DISPLAY_DIGITS: usize = 4;
const MIN_DIGITS: usize = 2;

/// Attach `formatted_amount` to every bucket with a non-zero amount.
/// Leaves are visited before the totals that contain them.
pub fn format_amounts(tree: &mut BreakdownTree) {
    for account in tree.accounts.values_mut() {
        account.models.values_mut().for_each(format_bucket);
        format_bucket(&mut account.summary);
    }
    tree.models.values_mut().for_each(format_bucket);
    format_bucket(&mut tree.summary);
}

impl BreakdownTree {
    pub fn formatted(mut self) -> Self {
        format_amounts(&mut self);
        self
    }
}

fn format_bucket(bucket: &mut CountBucket) {
    if bucket.amount != 0.0 {
        bucket.formatted_amount = Some(format_cents(bucket.amount));
    }
}

/// `cents` as a trimmed dollar string.
pub fn format_cents(cents: f64) -> String {
    trim_trailing_zeros(&format_ten_thousandths((cents * 100.0).round()))
}

/// en-US currency style at four fractional digits: `-$1,234.5000`.
/// Halves round away from zero.
pub fn format_usd(dollars: f64) -> String {
    format_ten_thousandths((dollars * 10_000.0).round())
}

/// `amount` is a whole number of ten-thousandths of a dollar.
fn format_ten_thousandths(amount: f64) -> String {
    let sign = if amount < 0.0 { "-" } else { "" };
    let units = amount.abs() as u64;
    let scale = 10u64.pow(DISPLAY_DIGITS as u32);
    let whole = (units / scale).to_formatted_string(&Locale::en);
    format!(
        "{sign}${whole}.{:0width$}",
        units % scale,
        width = DISPLAY_DIGITS
    )
}

/// Strip trailing zeros after the decimal point, keeping at least two digits.
pub fn trim_trailing_zeros(formatted: &str) -> String {
    let Some((whole, fraction)) = formatted.split_once('.') else {
        return format!("{formatted}.{:0<width$}", "", width = MIN_DIGITS);
    };
    let kept = fraction.trim_end_matches('0');
    format!("{whole}.{kept:0<width$}", width = MIN_DIGITS)
}
