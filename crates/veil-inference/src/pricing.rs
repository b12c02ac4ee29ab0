//! Per-model token prices.
//!
//! Prices are US dollars per million tokens. Unknown models are billed at
//! the default completion model's price so a typo never makes calls free.

use crate::provider::Usage;

/// Price of one model.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ModelPrice {
    /// Dollars per million input tokens.
    pub input_per_million: f64,
    /// Dollars per million output tokens.
    pub output_per_million: f64,
}

const fn price(input: f64, output: f64) -> ModelPrice {
    ModelPrice {
        input_per_million: input,
        output_per_million: output,
    }
}

/// Price applied to models missing from the table.
pub const FALLBACK_PRICE: ModelPrice = price(0.15, 0.60);

const PRICES: &[(&str, ModelPrice)] = &[
    ("text-embedding-3-small", price(0.02, 0.0)),
    ("text-embedding-3-large", price(0.13, 0.0)),
    ("text-embedding-ada-002", price(0.10, 0.0)),
    ("gpt-4o-mini", price(0.15, 0.60)),
    ("gpt-4o", price(2.50, 10.00)),
    ("gpt-4.1-nano", price(0.10, 0.40)),
    ("gpt-4.1-mini", price(0.40, 1.60)),
    ("gpt-4.1", price(2.00, 8.00)),
    ("gpt-3.5-turbo", price(0.50, 1.50)),
];

/// Look up a model's price. Dated snapshots (`gpt-4o-2024-08-06`) resolve to
/// their base model.
pub fn price_for(model: &str) -> ModelPrice {
    PRICES
        .iter()
        .filter(|(name, _)| model == *name || model.starts_with(&format!("{name}-")))
        .max_by_key(|(name, _)| name.len())
        .map_or(FALLBACK_PRICE, |(_, p)| *p)
}

/// Dollar cost of one call.
pub fn cost_of(model: &str, usage: Usage) -> f64 {
    let p = price_for(model);
    (usage.input_tokens as f64 * p.input_per_million
        + usage.output_tokens as f64 * p.output_per_million)
        / 1_000_000.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_model_cost() {
        let usage = Usage {
            input_tokens: 1_000_000,
            output_tokens: 500_000,
        };
        assert!((cost_of("gpt-4o-mini", usage) - 0.45).abs() < 1e-9);
    }

    #[test]
    fn snapshot_resolves_to_longest_prefix() {
        assert_eq!(price_for("gpt-4o-mini-2024-07-18"), price(0.15, 0.60));
        assert_eq!(price_for("gpt-4o-2024-08-06"), price(2.50, 10.00));
        assert_eq!(price_for("gpt-4.1-mini"), price(0.40, 1.60));
    }

    #[test]
    fn unknown_model_uses_fallback() {
        assert_eq!(price_for("mystery-model"), FALLBACK_PRICE);
    }

    #[test]
    fn embeddings_only_bill_input() {
        let usage = Usage {
            input_tokens: 2_000_000,
            output_tokens: 0,
        };
        assert!((cost_of("text-embedding-3-small", usage) - 0.04).abs() < 1e-9);
    }
}
