//! Non-fatal problems found while building a breakdown.
//!
//! None of these abort the computation; they are collected on the returned
//! tree and logged as they are found.

use serde::Serialize;
use thiserror::Error;

use crate::types::UnitKind;

#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum Diagnostic {
    /// No pricing entry for the provider/model (and discriminator, if any).
    #[error("no rate for provider:{provider} model:{model}{}", discriminator_suffix(.discriminator))]
    MissingRate {
        provider: String,
        model: String,
        discriminator: Option<String>,
    },

    /// A pricing entry exists but its amount or divisor cannot be applied.
    #[error("unusable rate for provider:{provider} model:{model}{}: {unit_amount:?} per {divisor}", discriminator_suffix(.discriminator))]
    InvalidRate {
        provider: String,
        model: String,
        discriminator: Option<String>,
        divisor: u64,
        unit_amount: String,
    },

    /// The priced counter was never incremented for this account/model.
    #[error("no {unit_kind} count for account:{account_id} model:{model}")]
    MissingUnitCount {
        account_id: String,
        model: String,
        unit_kind: UnitKind,
    },

    /// Record lacks an identity field, or holds a negative or non-finite
    /// counter, and was left out of every bucket.
    #[error("usage record #{index} has a missing or invalid {field}")]
    MalformedRecord { index: usize, field: &'static str },
}

impl Diagnostic {
    /// Short machine-readable name. Matches the serialized `kind` tag.
    pub fn kind(&self) -> &'static str {
        match self {
            Diagnostic::MissingRate { .. } => "missingRate",
            Diagnostic::InvalidRate { .. } => "invalidRate",
            Diagnostic::MissingUnitCount { .. } => "missingUnitCount",
            Diagnostic::MalformedRecord { .. } => "malformedRecord",
        }
    }
}

fn discriminator_suffix(discriminator: &Option<String>) -> String {
    match discriminator {
        Some(d) => format!(" discriminator:{d}"),
        None => String::new(),
    }
}
