//! Token accounting: usage extraction, pricing, and display formatting.
//!
//! Agents return heterogeneous response payloads; this module probes the
//! well-known shapes in a fixed order and prices the result against a
//! built-in per-million-token table.

use std::ops::{Add, AddAssign};

use serde_json::Value;

/// Token usage and cost for one turn, or accumulated across a session.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Usage {
    /// Input (prompt) tokens.
    pub input_tokens: u64,
    /// Output (completion) tokens.
    pub output_tokens: u64,
    /// Total tokens; input + output when the payload omits it.
    pub total_tokens: u64,
    /// Estimated cost in USD; 0.0 when the model is unknown.
    pub cost: f64,
}

impl Usage {
    /// True if any counter is non-zero.
    pub fn has_tokens(&self) -> bool {
        self.total_tokens > 0
    }
}

impl Add for Usage {
    type Output = Usage;

    fn add(self, rhs: Usage) -> Usage {
        Usage {
            input_tokens: self.input_tokens + rhs.input_tokens,
            output_tokens: self.output_tokens + rhs.output_tokens,
            total_tokens: self.total_tokens + rhs.total_tokens,
            cost: self.cost + rhs.cost,
        }
    }
}

impl AddAssign for Usage {
    fn add_assign(&mut self, rhs: Usage) {
        *self = *self + rhs;
    }
}

/// Ancillary per-turn metrics probed from the response payload.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct TurnMetrics {
    /// Agent reasoning cycles, if reported.
    pub cycles: Option<u64>,
    /// Tool invocations, if reported.
    pub tool_calls: Option<u64>,
}

/// Extracts token counters from a response payload.
///
/// Shapes are probed in order, first match wins:
/// 1. a `usage` mapping with keyed counters,
/// 2. keyed counters at the top level,
/// 3. a `metrics` mapping with the same keys,
/// 4. otherwise all counters are zero.
pub fn extract_counters(meta: &Value) -> (u64, u64, u64) {
    let candidates = [meta.get("usage"), Some(meta), meta.get("metrics")];
    for candidate in candidates.into_iter().flatten() {
        if let Some(counters) = keyed_counters(candidate) {
            return counters;
        }
    }
    (0, 0, 0)
}

/// Extracts ancillary metrics (cycles, tool calls) from a response payload.
pub fn extract_metrics(meta: &Value) -> TurnMetrics {
    let metrics = meta.get("metrics").unwrap_or(meta);
    TurnMetrics {
        cycles: counter(metrics, &["cycle_count", "cycles"]),
        tool_calls: counter(metrics, &["tool_calls", "tool_count"]),
    }
}

fn keyed_counters(value: &Value) -> Option<(u64, u64, u64)> {
    let input = counter(value, &["input_tokens", "inputTokens", "prompt_tokens"]);
    let output = counter(value, &["output_tokens", "outputTokens", "completion_tokens"]);
    let total = counter(value, &["total_tokens", "totalTokens"]);
    if input.is_none() && output.is_none() && total.is_none() {
        return None;
    }
    let input = input.unwrap_or(0);
    let output = output.unwrap_or(0);
    Some((input, output, total.unwrap_or(input + output)))
}

fn counter(value: &Value, keys: &[&str]) -> Option<u64> {
    keys.iter().find_map(|key| value.get(key)?.as_u64())
}

/// Per-million-token pricing for one model family.
#[derive(Clone, Copy, Debug)]
struct ModelPricing {
    input_per_m: f64,
    output_per_m: f64,
}

/// Pricing table keyed by normalized model-identifier fragments.
///
/// Lookup normalizes the model identifier (lowercase, separators collapsed
/// to `-`) and picks the longest table key contained in it, so both raw
/// platform IDs (`us.amazon.nova-lite-v1:0`) and display names
/// (`Claude Sonnet 4.5`) resolve to the same entry.
pub struct PricingTable {
    entries: Vec<(&'static str, ModelPricing)>,
}

impl PricingTable {
    /// Builds the table of commonly-used models.
    pub fn new() -> Self {
        let price = |input_per_m, output_per_m| ModelPricing {
            input_per_m,
            output_per_m,
        };
        Self {
            entries: vec![
                ("claude-sonnet-4-5", price(3.0, 15.0)),
                ("claude-sonnet-4", price(3.0, 15.0)),
                ("claude-sonnet-3-5", price(3.0, 15.0)),
                ("claude-sonnet", price(3.0, 15.0)),
                ("claude-haiku-3-5", price(0.8, 4.0)),
                ("claude-haiku", price(0.25, 1.25)),
                ("claude-opus-4", price(15.0, 75.0)),
                ("claude-opus", price(15.0, 75.0)),
                ("nova-pro", price(0.8, 3.2)),
                ("nova-lite", price(0.06, 0.24)),
                ("llama3-3-70b", price(0.72, 0.72)),
                ("llama-3-3-70b", price(0.72, 0.72)),
            ],
        }
    }

    /// Computes the cost of a call, or `None` for an unknown model.
    pub fn cost(&self, model: &str, input_tokens: u64, output_tokens: u64) -> Option<f64> {
        let normalized = normalize_model(model);
        let mut best: Option<(&str, ModelPricing)> = None;
        for (key, pricing) in &self.entries {
            if normalized.contains(key)
                && best.map_or(true, |(best_key, _)| key.len() > best_key.len())
            {
                best = Some((key, *pricing));
            }
        }
        let (_, pricing) = best?;
        Some(
            (input_tokens as f64 * pricing.input_per_m
                + output_tokens as f64 * pricing.output_per_m)
                / 1_000_000.0,
        )
    }

    /// Derives a priced [`Usage`] from raw counters; unknown models price
    /// at zero.
    pub fn usage(&self, model: Option<&str>, input: u64, output: u64, total: u64) -> Usage {
        let cost = model
            .and_then(|m| self.cost(m, input, output))
            .unwrap_or(0.0);
        Usage {
            input_tokens: input,
            output_tokens: output,
            total_tokens: total,
            cost,
        }
    }

    /// True if the table prices the given model.
    pub fn knows(&self, model: &str) -> bool {
        self.cost(model, 0, 0).is_some()
    }
}

impl Default for PricingTable {
    fn default() -> Self {
        Self::new()
    }
}

fn normalize_model(model: &str) -> String {
    model
        .to_lowercase()
        .chars()
        .map(|c| if c == '.' || c == ' ' || c == '_' { '-' } else { c })
        .collect()
}

/// Formats a token count: plain integer below 1 000, `X.YK` below
/// 1 000 000 (so 999 999 renders as `1000.0K`), `X.YM` at and above.
pub fn format_tokens(tokens: u64) -> String {
    if tokens >= 1_000_000 {
        format!("{:.1}M", tokens as f64 / 1_000_000.0)
    } else if tokens >= 1_000 {
        format!("{:.1}K", tokens as f64 / 1_000.0)
    } else {
        tokens.to_string()
    }
}

/// Formats a cost in USD to four decimal places.
pub fn format_cost(cost: f64) -> String {
    format!("${cost:.4}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn extract_prefers_usage_mapping() {
        let meta = json!({
            "usage": {"input_tokens": 10, "output_tokens": 5},
            "input_tokens": 999,
        });
        assert_eq!(extract_counters(&meta), (10, 5, 15));
    }

    #[test]
    fn extract_top_level_counters() {
        let meta = json!({"input_tokens": 7, "output_tokens": 3, "total_tokens": 10});
        assert_eq!(extract_counters(&meta), (7, 3, 10));
    }

    #[test]
    fn extract_metrics_mapping() {
        let meta = json!({"metrics": {"inputTokens": 4, "outputTokens": 6}});
        assert_eq!(extract_counters(&meta), (4, 6, 10));
    }

    #[test]
    fn extract_unknown_shape_is_zero() {
        assert_eq!(extract_counters(&json!({"whatever": true})), (0, 0, 0));
        assert_eq!(extract_counters(&json!(null)), (0, 0, 0));
    }

    #[test]
    fn extract_cycles_and_tools() {
        let meta = json!({"metrics": {"cycle_count": 2, "tool_calls": 3}});
        let metrics = extract_metrics(&meta);
        assert_eq!(metrics.cycles, Some(2));
        assert_eq!(metrics.tool_calls, Some(3));
        assert_eq!(extract_metrics(&json!({})), TurnMetrics::default());
    }

    #[test]
    fn pricing_substring_match() {
        let table = PricingTable::new();
        let cost = table
            .cost("us.anthropic.claude-sonnet-4-5-20250929-v1:0", 1_000_000, 0)
            .expect("priced");
        assert!((cost - 3.0).abs() < 1e-9);
        // Display names resolve too.
        assert!(table.knows("Claude Sonnet 4.5"));
        assert!(table.knows("us.amazon.nova-lite-v1:0"));
        assert!(table.knows("us.meta.llama3-3-70b-instruct-v1:0"));
        assert!(!table.knows("gpt-oss-20b"));
    }

    #[test]
    fn pricing_longest_key_wins() {
        let table = PricingTable::new();
        // Haiku 3.5 is priced differently from the older Haiku entry.
        let cost = table
            .cost("anthropic.claude-haiku-3-5-v1:0", 1_000_000, 0)
            .expect("priced");
        assert!((cost - 0.8).abs() < 1e-9);
        let older = table
            .cost("anthropic.claude-haiku-v1:0", 1_000_000, 0)
            .expect("priced");
        assert!((older - 0.25).abs() < 1e-9);
    }

    #[test]
    fn usage_for_unknown_model_costs_zero() {
        let table = PricingTable::new();
        let usage = table.usage(Some("mystery-model"), 10, 5, 15);
        assert_eq!(usage.total_tokens, 15);
        assert!(usage.cost.abs() < 1e-12);
    }

    #[test]
    fn usage_accumulates() {
        let mut total = Usage::default();
        total += Usage {
            input_tokens: 10,
            output_tokens: 5,
            total_tokens: 15,
            cost: 0.01,
        };
        total += Usage {
            input_tokens: 1,
            output_tokens: 2,
            total_tokens: 3,
            cost: 0.02,
        };
        assert_eq!(total.input_tokens, 11);
        assert_eq!(total.output_tokens, 7);
        assert_eq!(total.total_tokens, 18);
        assert!((total.cost - 0.03).abs() < 1e-12);
    }

    #[test]
    fn token_format_boundaries() {
        assert_eq!(format_tokens(0), "0");
        assert_eq!(format_tokens(999), "999");
        assert_eq!(format_tokens(1_000), "1.0K");
        assert_eq!(format_tokens(1_234), "1.2K");
        assert_eq!(format_tokens(999_999), "1000.0K");
        assert_eq!(format_tokens(1_000_000), "1.0M");
        assert_eq!(format_tokens(1_234_567), "1.2M");
    }

    #[test]
    fn cost_format() {
        assert_eq!(format_cost(0.0), "$0.0000");
        assert_eq!(format_cost(0.0105), "$0.0105");
        assert_eq!(format_cost(1.5), "$1.5000");
    }
}
