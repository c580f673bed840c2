use std::sync::Arc;

use chrono::{DateTime, Utc};

use super::PricingTable;
use crate::cost::RateEntry;

const TABLE_ID: &str = "3b41a695-3c09-49db-8d03-e37673c260f0";
const PUBLISHED: &str = "2023-03-03T22:42:43.604Z";

const OPENAI: &str = "openai";

/// Per-1K-token completion models, amounts in cents.
const COMPLETION_MODELS: &[(&str, &str)] = &[
    ("text-davinci-003", "2"),
    ("text-curie-001", "0.2"),
    ("text-babbage-001", "0.05"),
    ("text-ada-001", "0.04"),
];

/// Fine-tuned usage, keyed by base model.
const FINE_TUNED: &[(&str, &str)] = &[("ada", "0.016")];

/// Per-image amounts in cents, keyed by resolution.
const IMAGE_RESOLUTIONS: &[(&str, &str)] = &[
    ("1024x1024", "2"),
    ("512x512", "1.8"),
    ("256x256", "1.6"),
];

pub(super) fn table() -> PricingTable {
    let mut table = PricingTable {
        id: Some(TABLE_ID.to_string()),
        published: DateTime::parse_from_rfc3339(PUBLISHED)
            .ok()
            .map(|d| d.with_timezone(&Utc)),
        ..PricingTable::default()
    };

    for &(model, cents) in COMPLETION_MODELS {
        table.insert_rate(OPENAI, model, Arc::new(RateEntry::new(1000, cents)));
    }

    for &(base, cents) in FINE_TUNED {
        table.insert_group_rate(
            OPENAI,
            "fineTuned",
            base,
            Arc::new(RateEntry::new(1000, cents)),
        );
    }

    // Historical names share one price point.
    let turbo = Arc::new(RateEntry::new(1000, "0.2"));
    for model in ["gpt-3.5-turbo", "gpt-3.5-turbo-0301"] {
        table.insert_rate(OPENAI, model, Arc::clone(&turbo));
    }

    for &(resolution, cents) in IMAGE_RESOLUTIONS {
        let rate = Arc::new(RateEntry::new(1, cents));
        for model in ["dall-e-2", "image-alpha-001"] {
            table.insert_group_rate(OPENAI, model, resolution, Arc::clone(&rate));
        }
    }

    table
}
