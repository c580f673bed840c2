use std::collections::BTreeMap;
use std::fmt;
use std::ops::{Index, IndexMut};

use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};

use crate::cost::round_amount;
use crate::diagnostic::Diagnostic;
use crate::format::ZERO_AMOUNT;

/// Which counter a record's rate applies to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnitKind {
    #[serde(alias = "calls")]
    Call,
    #[default]
    #[serde(alias = "tokens")]
    Token,
    #[serde(alias = "images")]
    Image,
}

impl UnitKind {
    pub const COUNT: usize = 3;
    pub const ALL: [UnitKind; Self::COUNT] = [UnitKind::Call, UnitKind::Token, UnitKind::Image];

    /// Key under which the counter appears in a serialized bucket.
    pub fn counter_name(self) -> &'static str {
        match self {
            UnitKind::Call => "calls",
            UnitKind::Token => "tokens",
            UnitKind::Image => "images",
        }
    }

    fn slot(self) -> usize {
        self as usize
    }
}

impl fmt::Display for UnitKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            UnitKind::Call => "call",
            UnitKind::Token => "token",
            UnitKind::Image => "image",
        })
    }
}

/// One counter per [`UnitKind`]. Serializes as `{"calls": .., "tokens": .., "images": ..}`.
///
/// Counters are non-negative but may be fractional (averaged summary rows).
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Counters([f64; UnitKind::COUNT]);

impl Counters {
    pub fn new(calls: f64, tokens: f64, images: f64) -> Self {
        Self([calls, tokens, images])
    }

    pub fn accumulate(&mut self, other: &Counters) {
        for kind in UnitKind::ALL {
            self[kind] += other[kind];
        }
    }

    pub fn is_zero(&self) -> bool {
        self.0.iter().all(|&n| n == 0.0)
    }

    /// First counter that is negative or not a finite number.
    pub fn invalid_kind(&self) -> Option<UnitKind> {
        UnitKind::ALL
            .into_iter()
            .find(|&kind| !self[kind].is_finite() || self[kind] < 0.0)
    }
}

impl Index<UnitKind> for Counters {
    type Output = f64;

    fn index(&self, kind: UnitKind) -> &f64 {
        &self.0[kind.slot()]
    }
}

impl IndexMut<UnitKind> for Counters {
    fn index_mut(&mut self, kind: UnitKind) -> &mut f64 {
        &mut self.0[kind.slot()]
    }
}

impl Serialize for Counters {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(UnitKind::COUNT))?;
        for kind in UnitKind::ALL {
            map.serialize_entry(kind.counter_name(), &self[kind])?;
        }
        map.end()
    }
}

/// A single usage row as handed over by the caller. Either one API call or a
/// pre-aggregated summary for an account/model pair.
///
/// Identity fields default to empty so that a row missing one of them can be
/// reported as malformed instead of failing the whole batch at decode time.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageRecord {
    #[serde(default, alias = "apiKeyId")]
    pub account_id: String,
    #[serde(default)]
    pub provider: String,
    #[serde(default)]
    pub model: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub discriminator: Option<String>,
    #[serde(default)]
    pub unit_kind: UnitKind,
    #[serde(default, alias = "callCount", alias = "countTotal")]
    pub calls: f64,
    #[serde(default, alias = "tokenCount", alias = "tokenTotal")]
    pub tokens: f64,
    #[serde(default, alias = "imageCount")]
    pub images: f64,
}

impl UsageRecord {
    /// Token-priced record with the given call and token counts.
    pub fn token_usage(
        account_id: impl Into<String>,
        provider: impl Into<String>,
        model: impl Into<String>,
        calls: f64,
        tokens: f64,
    ) -> Self {
        Self {
            account_id: account_id.into(),
            provider: provider.into(),
            model: model.into(),
            calls,
            tokens,
            ..Self::default()
        }
    }

    /// Image-priced record; `discriminator` is usually the resolution.
    pub fn image_usage(
        account_id: impl Into<String>,
        provider: impl Into<String>,
        model: impl Into<String>,
        discriminator: impl Into<String>,
        calls: f64,
        images: f64,
    ) -> Self {
        Self {
            account_id: account_id.into(),
            provider: provider.into(),
            model: model.into(),
            discriminator: Some(discriminator.into()),
            unit_kind: UnitKind::Image,
            calls,
            images,
            ..Self::default()
        }
    }

    pub fn counters(&self) -> Counters {
        Counters::new(self.calls, self.tokens, self.images)
    }
}

/// Accumulated usage and derived cost for one grouping.
///
/// `amount` is in cents and is re-rounded to four decimals on every addition.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CountBucket {
    #[serde(flatten)]
    pub counts: Counters,
    pub amount: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub formatted_amount: Option<String>,
}

impl CountBucket {
    pub fn calls(&self) -> f64 {
        self.counts[UnitKind::Call]
    }

    pub fn tokens(&self) -> f64 {
        self.counts[UnitKind::Token]
    }

    pub fn images(&self) -> f64 {
        self.counts[UnitKind::Image]
    }

    pub fn accumulate(&mut self, counts: &Counters) {
        self.counts.accumulate(counts);
    }

    pub fn add_amount(&mut self, cents: f64) {
        self.amount = round_amount(self.amount + cents);
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AccountBreakdown {
    pub summary: CountBucket,
    pub models: BTreeMap<String, CountBucket>,
}

/// Distinct identifiers seen in the input, in first-occurrence order.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Options {
    pub accounts: Vec<String>,
    pub models: Vec<String>,
    pub providers: Vec<String>,
}

impl Options {
    pub fn note(&mut self, record: &UsageRecord) {
        push_unique(&mut self.accounts, &record.account_id);
        push_unique(&mut self.models, &record.model);
        push_unique(&mut self.providers, &record.provider);
    }
}

fn push_unique(list: &mut Vec<String>, value: &str) {
    if !list.iter().any(|v| v == value) {
        list.push(value.to_string());
    }
}

/// Full cost breakdown returned to the caller.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BreakdownTree {
    pub summary: CountBucket,
    pub accounts: BTreeMap<String, AccountBreakdown>,
    pub models: BTreeMap<String, CountBucket>,
    pub options: Options,
    pub diagnostics: Vec<Diagnostic>,
}

impl Default for BreakdownTree {
    /// Empty tree; only the grand total carries the `$0.00` default.
    fn default() -> Self {
        Self {
            summary: CountBucket {
                formatted_amount: Some(ZERO_AMOUNT.to_string()),
                ..CountBucket::default()
            },
            accounts: BTreeMap::new(),
            models: BTreeMap::new(),
            options: Options::default(),
            diagnostics: Vec::new(),
        }
    }
}
