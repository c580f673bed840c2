use std::collections::{HashMap, HashSet};

use tracing::{debug, warn};

use crate::cost::PricingMap;
use crate::diagnostic::Diagnostic;
use crate::format::format_amounts;
use crate::pricing::PricingTable;
use crate::types::{BreakdownTree, Counters, UnitKind, UsageRecord};

/// Build the formatted breakdown for `usage`, priced with `pricing` or the
/// built-in table.
pub fn compute_breakdown(usage: &[UsageRecord], pricing: Option<&PricingTable>) -> BreakdownTree {
    let builtin;
    let pricing: &dyn PricingMap = match pricing {
        Some(table) => table,
        None => {
            builtin = PricingTable::builtin();
            &builtin
        }
    };

    let mut tree = aggregate(usage, pricing);
    format_amounts(&mut tree);
    tree
}

/// Records that share a group are priced together, once, on their summed
/// counters.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct PricingGroup {
    account_id: String,
    provider: String,
    model: String,
    discriminator: Option<String>,
    unit_kind: UnitKind,
}

impl PricingGroup {
    fn of(r: &UsageRecord) -> Self {
        Self {
            account_id: r.account_id.clone(),
            provider: r.provider.clone(),
            model: r.model.clone(),
            discriminator: r.discriminator.clone(),
            unit_kind: r.unit_kind,
        }
    }
}

/// Tally then price, without formatting.
pub fn aggregate(usage: &[UsageRecord], pricing: &dyn PricingMap) -> BreakdownTree {
    let mut tree = BreakdownTree::default();
    let groups = tally(usage, &mut tree);
    price(&groups, pricing, &mut tree);
    tree
}

/// Phase 1: counts only. Every valid record lands in all four buckets at
/// once; amounts stay at zero.
fn tally(usage: &[UsageRecord], tree: &mut BreakdownTree) -> Vec<(PricingGroup, Counters)> {
    let mut slots: HashMap<PricingGroup, usize> = HashMap::new();
    let mut groups: Vec<(PricingGroup, Counters)> = Vec::new();

    for (index, r) in usage.iter().enumerate() {
        let counts = r.counters();
        if let Some(field) = invalid_field(r, &counts) {
            report(tree, Diagnostic::MalformedRecord { index, field });
            continue;
        }

        tree.options.note(r);

        tree.summary.accumulate(&counts);
        let account = tree.accounts.entry(r.account_id.clone()).or_default();
        account.summary.accumulate(&counts);
        account
            .models
            .entry(r.model.clone())
            .or_default()
            .accumulate(&counts);
        tree.models
            .entry(r.model.clone())
            .or_default()
            .accumulate(&counts);

        let group = PricingGroup::of(r);
        match slots.get(&group) {
            Some(&slot) => groups[slot].1.accumulate(&counts),
            None => {
                slots.insert(group.clone(), groups.len());
                groups.push((group, counts));
            }
        }
    }

    groups
}

/// First missing identity field, or a counter that is negative or not finite.
fn invalid_field(r: &UsageRecord, counts: &Counters) -> Option<&'static str> {
    if r.account_id.trim().is_empty() {
        Some("accountId")
    } else if r.provider.trim().is_empty() {
        Some("provider")
    } else if r.model.trim().is_empty() {
        Some("model")
    } else {
        counts.invalid_kind().map(UnitKind::counter_name)
    }
}

/// Phase 2: one rate application per distinct group, on the group's final
/// tally.
fn price(groups: &[(PricingGroup, Counters)], pricing: &dyn PricingMap, tree: &mut BreakdownTree) {
    // A missing rate is reported once per key, however many accounts hit it.
    // For a model absent from the table the key is (provider, model) alone.
    let mut unpriced: HashSet<(&str, &str, Option<&str>)> = HashSet::new();

    for (group, counts) in groups {
        let discriminator = group.discriminator.as_deref();
        let Some(rate) = pricing.rate_for(&group.provider, &group.model, discriminator) else {
            let discriminator = discriminator
                .filter(|_| pricing.knows_model(&group.provider, &group.model));
            if unpriced.insert((group.provider.as_str(), group.model.as_str(), discriminator)) {
                report(
                    tree,
                    Diagnostic::MissingRate {
                        provider: group.provider.clone(),
                        model: group.model.clone(),
                        discriminator: discriminator.map(str::to_string),
                    },
                );
            }
            continue;
        };

        let units = counts[group.unit_kind];
        if units == 0.0 {
            report(
                tree,
                Diagnostic::MissingUnitCount {
                    account_id: group.account_id.clone(),
                    model: group.model.clone(),
                    unit_kind: group.unit_kind,
                },
            );
            continue;
        }

        let Some(amount) = rate.amount_for(units) else {
            if unpriced.insert((group.provider.as_str(), group.model.as_str(), discriminator)) {
                report(
                    tree,
                    Diagnostic::InvalidRate {
                        provider: group.provider.clone(),
                        model: group.model.clone(),
                        discriminator: group.discriminator.clone(),
                        divisor: rate.divisor,
                        unit_amount: rate.unit_amount.clone(),
                    },
                );
            }
            continue;
        };

        debug!(
            account = %group.account_id,
            model = %group.model,
            units,
            divisor = rate.divisor,
            unit_amount = %rate.unit_amount,
            amount,
            "priced usage group"
        );

        tree.summary.add_amount(amount);
        if let Some(account) = tree.accounts.get_mut(&group.account_id) {
            account.summary.add_amount(amount);
            if let Some(bucket) = account.models.get_mut(&group.model) {
                bucket.add_amount(amount);
            }
        }
        if let Some(bucket) = tree.models.get_mut(&group.model) {
            bucket.add_amount(amount);
        }
    }
}

fn report(tree: &mut BreakdownTree, diagnostic: Diagnostic) {
    warn!(kind = diagnostic.kind(), "{diagnostic}");
    tree.diagnostics.push(diagnostic);
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use pretty_assertions::assert_eq;

    use super::*;
    use crate::cost::RateEntry;

    fn scenario() -> Vec<UsageRecord> {
        vec![
            UsageRecord::token_usage("A", "openai", "text-davinci-003", 2.0, 100_000.0),
            UsageRecord::token_usage("A", "openai", "text-curie-001", 4.0, 200_000.0),
            UsageRecord::token_usage("B", "openai", "text-davinci-003", 3.0, 150_000.0),
            UsageRecord::token_usage("B", "openai", "text-curie-001", 1.0, 50_000.0),
        ]
    }

    fn assert_close(a: f64, b: f64) {
        assert!((a - b).abs() < 1e-6, "{a} != {b}");
    }

    #[test]
    fn two_accounts_two_models() {
        let tree = compute_breakdown(&scenario(), None);

        assert_eq!(tree.summary.calls(), 10.0);
        assert_eq!(tree.summary.tokens(), 500_000.0);
        assert_eq!(tree.summary.amount, 550.0);
        assert_eq!(tree.summary.formatted_amount.as_deref(), Some("$5.50"));

        let davinci = &tree.models["text-davinci-003"];
        assert_eq!(
            (davinci.calls(), davinci.tokens(), davinci.amount),
            (5.0, 250_000.0, 500.0)
        );
        let curie = &tree.models["text-curie-001"];
        assert_eq!((curie.calls(), curie.tokens(), curie.amount), (5.0, 250_000.0, 50.0));
        assert_eq!(curie.formatted_amount.as_deref(), Some("$0.50"));

        assert_eq!(tree.accounts["A"].summary.amount, 240.0);
        assert_eq!(tree.accounts["B"].summary.amount, 310.0);
        assert_eq!(tree.accounts["A"].models["text-curie-001"].amount, 40.0);
        assert_eq!(
            tree.accounts["B"].models["text-curie-001"].formatted_amount.as_deref(),
            Some("$0.10")
        );

        assert_eq!(tree.options.accounts, ["A", "B"]);
        assert_eq!(tree.options.models, ["text-davinci-003", "text-curie-001"]);
        assert_eq!(tree.options.providers, ["openai"]);
        assert!(tree.diagnostics.is_empty());
    }

    #[test]
    fn counts_and_amounts_are_conserved() {
        let mut usage = scenario();
        usage.push(UsageRecord::token_usage("C", "openai", "text-ada-001", 7.0, 12_345.0));
        usage.push(UsageRecord::token_usage("A", "openai", "text-babbage-001", 1.0, 999.5));
        usage.push(UsageRecord::image_usage("C", "openai", "dall-e-2", "512x512", 2.0, 3.0));
        usage.push(UsageRecord::token_usage("C", "openai", "unknown", 1.0, 10.0));
        let tree = compute_breakdown(&usage, None);

        for kind in UnitKind::ALL {
            let by_model: f64 = tree.models.values().map(|b| b.counts[kind]).sum();
            let by_account: f64 = tree.accounts.values().map(|a| a.summary.counts[kind]).sum();
            let by_pair: f64 = tree
                .accounts
                .values()
                .flat_map(|a| a.models.values())
                .map(|b| b.counts[kind])
                .sum();
            assert_close(tree.summary.counts[kind], by_model);
            assert_close(tree.summary.counts[kind], by_account);
            assert_close(tree.summary.counts[kind], by_pair);
        }

        let by_account: f64 = tree.accounts.values().map(|a| a.summary.amount).sum();
        let by_model: f64 = tree.models.values().map(|b| b.amount).sum();
        assert_close(tree.summary.amount, by_account);
        assert_close(tree.summary.amount, by_model);
    }

    #[test]
    fn pair_is_priced_once_on_its_total() {
        let usage = vec![
            UsageRecord::token_usage("A", "openai", "text-davinci-003", 1.0, 50_000.0),
            UsageRecord::token_usage("A", "openai", "text-davinci-003", 1.0, 50_000.0),
            UsageRecord::token_usage("A", "openai", "text-davinci-003", 1.0, 50_000.0),
        ];
        let tree = compute_breakdown(&usage, None);
        assert_eq!(tree.summary.tokens(), 150_000.0);
        assert_eq!(tree.summary.amount, 300.0);
        assert_eq!(tree.accounts["A"].models["text-davinci-003"].amount, 300.0);
    }

    #[test]
    fn fractional_token_count_is_priced() {
        let usage = vec![UsageRecord::token_usage("A", "openai", "text-curie-001", 2.0, 1500.5)];
        let tree = compute_breakdown(&usage, None);
        assert_eq!(tree.summary.tokens(), 1500.5);
        assert_eq!(tree.summary.amount, 0.3001);
        assert_eq!(tree.summary.formatted_amount.as_deref(), Some("$0.003"));
        assert!(tree.diagnostics.is_empty());
    }

    #[test]
    fn half_ten_thousandth_rounds_up() {
        // 15.625K tokens at 0.2¢ = 3.125¢
        let usage = vec![UsageRecord::token_usage("A", "openai", "text-curie-001", 1.0, 15_625.0)];
        let tree = compute_breakdown(&usage, None);
        assert_eq!(tree.summary.amount, 3.125);
        assert_eq!(tree.summary.formatted_amount.as_deref(), Some("$0.0313"));
    }

    #[test]
    fn unknown_model_tallies_but_costs_nothing() {
        let mut usage = scenario();
        usage.push(UsageRecord::token_usage("A", "openai", "gpt-9", 2.0, 1_000.0));
        usage.push(UsageRecord::token_usage("B", "openai", "gpt-9", 3.0, 4_000.0));
        let tree = compute_breakdown(&usage, None);

        let unknown = &tree.models["gpt-9"];
        assert_eq!((unknown.calls(), unknown.tokens()), (5.0, 5_000.0));
        assert_eq!(unknown.amount, 0.0);
        assert_eq!(unknown.formatted_amount, None);
        assert_eq!(tree.summary.amount, 550.0);
        assert_eq!(tree.summary.calls(), 15.0);

        assert_eq!(
            tree.diagnostics,
            vec![Diagnostic::MissingRate {
                provider: "openai".into(),
                model: "gpt-9".into(),
                discriminator: None,
            }]
        );
    }

    #[test]
    fn unknown_model_is_reported_once_across_discriminators() {
        let usage = vec![
            UsageRecord::image_usage("A", "openai", "dall-e-9", "1024x1024", 1.0, 2.0),
            UsageRecord::image_usage("A", "openai", "dall-e-9", "512x512", 1.0, 2.0),
            UsageRecord::image_usage("B", "openai", "dall-e-9", "256x256", 1.0, 2.0),
        ];
        let tree = compute_breakdown(&usage, None);
        assert_eq!(tree.summary.images(), 6.0);
        assert_eq!(
            tree.diagnostics,
            vec![Diagnostic::MissingRate {
                provider: "openai".into(),
                model: "dall-e-9".into(),
                discriminator: None,
            }]
        );
    }

    #[test]
    fn unknown_discriminator_of_known_model_is_named() {
        let usage = vec![
            UsageRecord::image_usage("A", "openai", "dall-e-2", "2048x2048", 1.0, 1.0),
            UsageRecord::image_usage("A", "openai", "dall-e-2", "64x64", 1.0, 1.0),
        ];
        let tree = compute_breakdown(&usage, None);
        let missing: Vec<_> = tree
            .diagnostics
            .iter()
            .map(|d| match d {
                Diagnostic::MissingRate { discriminator, .. } => discriminator.as_deref(),
                other => panic!("unexpected {other:?}"),
            })
            .collect();
        assert_eq!(missing, [Some("2048x2048"), Some("64x64")]);
    }

    #[test]
    fn discriminators_are_priced_separately() {
        let usage = vec![
            UsageRecord::image_usage("A", "openai", "dall-e-2", "1024x1024", 1.0, 10.0),
            UsageRecord::image_usage("A", "openai", "dall-e-2", "256x256", 1.0, 10.0),
        ];
        let tree = compute_breakdown(&usage, None);

        let bucket = &tree.accounts["A"].models["dall-e-2"];
        assert_eq!(bucket.images(), 20.0);
        // 10 × 2¢ + 10 × 1.6¢
        assert_close(bucket.amount, 36.0);
        assert_close(tree.models["dall-e-2"].amount, 36.0);
        assert_eq!(tree.summary.formatted_amount.as_deref(), Some("$0.36"));
        assert!(tree.diagnostics.is_empty());
    }

    #[test]
    fn grouped_model_without_discriminator_is_unpriced() {
        let usage = vec![UsageRecord::token_usage("A", "openai", "fineTuned", 1.0, 1_000.0)];
        let tree = compute_breakdown(&usage, None);
        assert_eq!(tree.summary.amount, 0.0);
        assert_eq!(tree.summary.formatted_amount.as_deref(), Some("$0.00"));
        assert!(matches!(
            tree.diagnostics.as_slice(),
            [Diagnostic::MissingRate { discriminator: None, .. }]
        ));
    }

    #[test]
    fn zero_unit_count_is_reported() {
        let mut record = UsageRecord::image_usage("A", "openai", "dall-e-2", "512x512", 4.0, 0.0);
        record.tokens = 100.0;
        let tree = compute_breakdown(&[record], None);
        assert_eq!(tree.summary.calls(), 4.0);
        assert_eq!(tree.summary.amount, 0.0);
        assert_eq!(
            tree.diagnostics,
            vec![Diagnostic::MissingUnitCount {
                account_id: "A".into(),
                model: "dall-e-2".into(),
                unit_kind: UnitKind::Image,
            }]
        );
    }

    #[test]
    fn malformed_records_are_skipped() {
        let mut usage = scenario();
        usage.insert(1, UsageRecord::token_usage("", "openai", "text-davinci-003", 9.0, 9.0));
        usage.push(UsageRecord::token_usage("A", " ", "text-davinci-003", 9.0, 9.0));
        usage.push(UsageRecord::token_usage("A", "openai", "", 9.0, 9.0));
        let tree = compute_breakdown(&usage, None);

        assert_eq!(tree.summary.calls(), 10.0);
        assert_eq!(tree.summary.amount, 550.0);
        assert_eq!(tree.options.accounts, ["A", "B"]);
        assert_eq!(
            tree.diagnostics,
            vec![
                Diagnostic::MalformedRecord { index: 1, field: "accountId" },
                Diagnostic::MalformedRecord { index: 5, field: "provider" },
                Diagnostic::MalformedRecord { index: 6, field: "model" },
            ]
        );
    }

    #[test]
    fn negative_or_non_finite_counters_are_skipped() {
        let mut usage = scenario();
        usage.push(UsageRecord::token_usage("C", "openai", "text-davinci-003", 1.0, -5.0));
        usage.push(UsageRecord::token_usage("C", "openai", "text-davinci-003", f64::NAN, 5.0));
        let tree = compute_breakdown(&usage, None);

        assert_eq!(tree.summary.calls(), 10.0);
        assert_eq!(tree.summary.tokens(), 500_000.0);
        assert_eq!(tree.options.accounts, ["A", "B"]);
        assert_eq!(
            tree.diagnostics,
            vec![
                Diagnostic::MalformedRecord { index: 4, field: "tokens" },
                Diagnostic::MalformedRecord { index: 5, field: "calls" },
            ]
        );
    }

    #[test]
    fn call_priced_model() {
        let mut table = PricingTable::default();
        table.insert_rate("search", "web", Arc::new(RateEntry::new(1, "0.5")));
        let mut record = UsageRecord::token_usage("A", "search", "web", 8.0, 0.0);
        record.unit_kind = UnitKind::Call;
        let tree = compute_breakdown(&[record], Some(&table));
        assert_eq!(tree.summary.amount, 4.0);
        assert_eq!(tree.summary.formatted_amount.as_deref(), Some("$0.04"));
    }

    #[test]
    fn unusable_rate_is_reported_once() {
        let mut table = PricingTable::default();
        table.insert_rate("p", "m", Arc::new(RateEntry::new(1000, "n/a")));
        let usage = vec![
            UsageRecord::token_usage("A", "p", "m", 1.0, 10.0),
            UsageRecord::token_usage("B", "p", "m", 1.0, 10.0),
        ];
        let tree = compute_breakdown(&usage, Some(&table));
        assert_eq!(tree.summary.amount, 0.0);
        assert_eq!(tree.diagnostics.len(), 1);
        assert_eq!(tree.diagnostics[0].kind(), "invalidRate");
    }

    #[test]
    fn empty_input() {
        let tree = compute_breakdown(&[], None);
        assert_eq!(tree, BreakdownTree::default());
    }

    #[test]
    fn aggregate_leaves_amounts_unformatted() {
        let table = PricingTable::builtin();
        let tree = aggregate(&scenario(), &table);
        assert_eq!(tree.summary.amount, 550.0);
        assert_eq!(tree.summary.formatted_amount.as_deref(), Some("$0.00"));
        assert_eq!(tree.models["text-davinci-003"].formatted_amount, None);
    }
}
