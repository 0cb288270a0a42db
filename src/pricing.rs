use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::errors::{AppError, AppResult};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ModelPrice {
    pub input_per_million: f64,
    pub output_per_million: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
}

#[derive(Debug, Clone, Default)]
pub struct PriceTable {
    prices: HashMap<String, ModelPrice>,
}

impl PriceTable {
    pub fn builtin() -> Self {
        let mut prices = HashMap::new();
        for (model, input, output) in [
            ("gpt-4o-mini", 0.15, 0.60),
            ("gpt-4o", 2.50, 10.00),
            ("gpt-4.1", 2.00, 8.00),
            ("gpt-4.1-mini", 0.40, 1.60),
            ("gpt-4.1-nano", 0.10, 0.40),
        ] {
            prices.insert(
                model.to_string(),
                ModelPrice {
                    input_per_million: input,
                    output_per_million: output,
                },
            );
        }
        Self { prices }
    }

    pub fn with_overrides(raw: Option<&str>) -> AppResult<Self> {
        let mut table = Self::builtin();
        if let Some(raw) = raw {
            let overrides: HashMap<String, ModelPrice> = serde_json::from_str(raw)
                .map_err(|err| AppError::Config(format!("invalid CHAT_PRICE_TABLE: {err}")))?;
            for (model, price) in overrides {
                if price.input_per_million < 0.0 || price.output_per_million < 0.0 {
                    return Err(AppError::Config(format!(
                        "negative price configured for model {model}"
                    )));
                }
                table.prices.insert(model, price);
            }
        }
        Ok(table)
    }

    pub fn price_for(&self, model: &str) -> Option<ModelPrice> {
        self.prices.get(model).copied()
    }

    pub fn cost(&self, model: &str, usage: TokenUsage) -> Option<f64> {
        let price = self.price_for(model)?;
        Some(
            usage.prompt_tokens as f64 * price.input_per_million / 1_000_000.0
                + usage.completion_tokens as f64 * price.output_per_million / 1_000_000.0,
        )
    }
}
