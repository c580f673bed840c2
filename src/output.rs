use anyhow::Result;
use comfy_table::{presets::UTF8_FULL_CONDENSED, Cell, ContentArrangement, Table};

use tkb::format::{format_cents, ZERO_AMOUNT};
use tkb::{BreakdownTree, CountBucket, PricingTable};

fn format_count(n: f64) -> String {
    if n >= 1_000_000.0 {
        format!("{:.1}M", n / 1_000_000.0)
    } else if n >= 1_000.0 {
        format!("{:.1}K", n / 1_000.0)
    } else if n.fract() == 0.0 {
        format!("{n:.0}")
    } else {
        format!("{n:.1}")
    }
}

fn bucket_row(label: &str, bucket: &CountBucket) -> Vec<Cell> {
    vec![
        Cell::new(label),
        Cell::new(format_count(bucket.calls())),
        Cell::new(format_count(bucket.tokens())),
        Cell::new(format_count(bucket.images())),
        Cell::new(bucket.formatted_amount.as_deref().unwrap_or(ZERO_AMOUNT)),
    ]
}

fn new_table(first_column: &str) -> Table {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL_CONDENSED);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec![first_column, "Calls", "Tokens", "Images", "Cost"]);
    table
}

/// Accounts in first-seen order, then models, then the grand total.
pub fn print_table(tree: &BreakdownTree, breakdown: bool) {
    let mut accounts = new_table("Account");
    for id in &tree.options.accounts {
        let Some(account) = tree.accounts.get(id) else {
            continue;
        };
        accounts.add_row(bucket_row(id, &account.summary));

        if breakdown {
            for model in &tree.options.models {
                if let Some(bucket) = account.models.get(model) {
                    accounts.add_row(bucket_row(&format!("  {model}"), bucket));
                }
            }
        }
    }
    accounts.add_row(bucket_row("TOTAL", &tree.summary));
    println!("{accounts}");

    let mut models = new_table("Model");
    for model in &tree.options.models {
        if let Some(bucket) = tree.models.get(model) {
            models.add_row(bucket_row(model, bucket));
        }
    }
    println!("{models}");
}

pub fn print_json(tree: &BreakdownTree) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(tree)?);
    Ok(())
}

pub fn print_pricing_table(pricing: &PricingTable) {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL_CONDENSED);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec!["Provider", "Model", "Variant", "Per", "Price"]);

    for key in pricing.entries() {
        let price = key
            .rate
            .unit_amount_value()
            .map(format_cents)
            .unwrap_or_else(|| format!("{:?}", key.rate.unit_amount));
        table.add_row(vec![
            Cell::new(key.provider),
            Cell::new(key.model),
            Cell::new(key.discriminator.unwrap_or("")),
            Cell::new(key.rate.divisor),
            Cell::new(price),
        ]);
    }

    if let Some(id) = &pricing.id {
        println!("Pricing table {id}");
    }
    if let Some(published) = &pricing.published {
        println!("Published {}", published.format("%Y-%m-%d %H:%M UTC"));
    }
    println!("{table}");
}

pub fn print_pricing_json(pricing: &PricingTable) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(pricing)?);
    Ok(())
}
