mod builtin;

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::cost::{PricingMap, RateEntry};

/// A model's price: either one flat rate, or a rate per discriminator
/// (e.g. image resolution).
///
/// On decode, an entry without `divisor`/`unit_amount` is read as a group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PriceEntry {
    Rate(Arc<RateEntry>),
    Group(BTreeMap<String, Arc<RateEntry>>),
}

/// `provider → model → PriceEntry`, plus the table's identity.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PricingTable {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub published: Option<DateTime<Utc>>,
    #[serde(default)]
    pub providers: BTreeMap<String, BTreeMap<String, PriceEntry>>,
}

impl PricingMap for PricingTable {
    fn rate_for(
        &self,
        provider: &str,
        model: &str,
        discriminator: Option<&str>,
    ) -> Option<&RateEntry> {
        match self.providers.get(provider)?.get(model)? {
            PriceEntry::Rate(rate) => Some(Arc::as_ref(rate)),
            PriceEntry::Group(group) => group.get(discriminator?).map(Arc::as_ref),
        }
    }

    fn knows_model(&self, provider: &str, model: &str) -> bool {
        self.providers
            .get(provider)
            .is_some_and(|models| models.contains_key(model))
    }
}

/// One priced key, flattened for listing.
pub struct PricedKey<'a> {
    pub provider: &'a str,
    pub model: &'a str,
    pub discriminator: Option<&'a str>,
    pub rate: &'a RateEntry,
}

impl PricingTable {
    /// The built-in table used when the caller supplies none.
    pub fn builtin() -> Self {
        builtin::table()
    }

    pub fn insert_rate(&mut self, provider: &str, model: &str, rate: Arc<RateEntry>) {
        self.providers
            .entry(provider.to_string())
            .or_default()
            .insert(model.to_string(), PriceEntry::Rate(rate));
    }

    /// Add a discriminated rate. Replaces a flat rate for the same model.
    pub fn insert_group_rate(
        &mut self,
        provider: &str,
        model: &str,
        discriminator: &str,
        rate: Arc<RateEntry>,
    ) {
        let models = self.providers.entry(provider.to_string()).or_default();
        let entry = models
            .entry(model.to_string())
            .or_insert_with(|| PriceEntry::Group(BTreeMap::new()));
        if let PriceEntry::Rate(_) = entry {
            *entry = PriceEntry::Group(BTreeMap::new());
        }
        if let PriceEntry::Group(group) = entry {
            group.insert(discriminator.to_string(), rate);
        }
    }

    /// Every priced key in provider/model/discriminator order.
    pub fn entries(&self) -> Vec<PricedKey<'_>> {
        let mut out = Vec::new();
        for (provider, models) in &self.providers {
            for (model, entry) in models {
                match entry {
                    PriceEntry::Rate(rate) => out.push(PricedKey {
                        provider,
                        model,
                        discriminator: None,
                        rate: Arc::as_ref(rate),
                    }),
                    PriceEntry::Group(group) => {
                        for (discriminator, rate) in group {
                            out.push(PricedKey {
                                provider,
                                model,
                                discriminator: Some(discriminator.as_str()),
                                rate: Arc::as_ref(rate),
                            });
                        }
                    }
                }
            }
        }
        out
    }

    /// Reject entries that could never be applied.
    pub fn validate(&self) -> Result<()> {
        for key in self.entries() {
            let label = match key.discriminator {
                Some(d) => format!("{}/{}/{}", key.provider, key.model, d),
                None => format!("{}/{}", key.provider, key.model),
            };
            if key.rate.divisor == 0 {
                bail!("{label}: divisor must be greater than zero");
            }
            if key.rate.unit_amount_value().is_none() {
                bail!(
                    "{label}: unit_amount {:?} is not a decimal number",
                    key.rate.unit_amount
                );
            }
        }
        Ok(())
    }

    pub fn from_toml_str(data: &str) -> Result<Self> {
        let table: PricingTable = toml::from_str(data)?;
        table.validate()?;
        Ok(table)
    }

    pub fn from_json_str(data: &str) -> Result<Self> {
        let table: PricingTable = serde_json::from_str(data)?;
        table.validate()?;
        Ok(table)
    }
}

/// Load the pricing table from `path`, or the built-in table when `None`.
/// `.json` files are read as JSON, anything else as TOML.
pub fn load_pricing(path: Option<&Path>) -> Result<PricingTable> {
    let Some(path) = path else {
        return Ok(PricingTable::builtin());
    };

    let data = fs::read_to_string(path)
        .with_context(|| format!("Failed to read pricing table {}", path.display()))?;
    let is_json = path.extension().is_some_and(|ext| ext == "json");
    let table = if is_json {
        PricingTable::from_json_str(&data)
    } else {
        PricingTable::from_toml_str(&data)
    }
    .with_context(|| format!("Invalid pricing table {}", path.display()))?;

    debug!(
        path = %path.display(),
        id = table.id.as_deref().unwrap_or("-"),
        entries = table.entries().len(),
        "loaded pricing table"
    );
    Ok(table)
}
