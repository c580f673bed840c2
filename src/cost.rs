use serde::{Deserialize, Serialize};

/// Decimal places kept on every accumulated amount.
pub const AMOUNT_PRECISION: i32 = 4;

/// Price in cents per `divisor` units. The amount stays a decimal string
/// until the final multiply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateEntry {
    pub divisor: u64,
    #[serde(alias = "unitAmount", alias = "unit_amount_decimal")]
    pub unit_amount: String,
}

impl RateEntry {
    pub fn new(divisor: u64, unit_amount: impl Into<String>) -> Self {
        Self {
            divisor,
            unit_amount: unit_amount.into(),
        }
    }

    /// `unit_amount` as a number, if it is a finite decimal.
    pub fn unit_amount_value(&self) -> Option<f64> {
        parse_unit_amount(&self.unit_amount)
    }

    /// Cost in cents of `units`, rounded to [`AMOUNT_PRECISION`] decimals.
    /// `None` when the entry cannot be applied (zero divisor or bad amount).
    pub fn amount_for(&self, units: f64) -> Option<f64> {
        if self.divisor == 0 {
            return None;
        }
        let unit_amount = self.unit_amount_value()?;
        let unit_count = units / self.divisor as f64;
        Some(round_amount(unit_count * unit_amount))
    }
}

pub fn parse_unit_amount(raw: &str) -> Option<f64> {
    raw.trim().parse::<f64>().ok().filter(|v| v.is_finite())
}

pub fn round_amount(value: f64) -> f64 {
    let scale = 10f64.powi(AMOUNT_PRECISION);
    (value * scale).round() / scale
}

/// Trait for looking up a rate by provider, model and optional discriminator.
pub trait PricingMap {
    fn rate_for(
        &self,
        provider: &str,
        model: &str,
        discriminator: Option<&str>,
    ) -> Option<&RateEntry>;

    /// Whether the model has any entry at all, flat or per discriminator.
    fn knows_model(&self, provider: &str, model: &str) -> bool;
}
