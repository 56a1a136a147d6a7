//! Cost estimation (§4.4): `(inputTokens/1M)·inputPrice +
//! (outputTokens/1M)·outputPrice`. Used for per-call telemetry and
//! rolled up into C10's monthly budget alarm.

use crate::tier::Tier;

/// USD per million tokens, in (input, output) pairs. Placeholder
/// figures — a real deployment overrides these from the per-tier
/// cost table named in §6's environment configuration.
fn price_per_million(tier: Tier) -> (f64, f64) {
    match tier {
        Tier::Economy => (0.15, 0.60),
        Tier::Standard => (3.00, 15.00),
        Tier::Premium => (15.00, 75.00),
    }
}

pub fn estimate_cost_usd(tier: Tier, input_tokens: u64, output_tokens: u64) -> f64 {
    let (input_price, output_price) = price_per_million(tier);
    (input_tokens as f64 / 1_000_000.0) * input_price
        + (output_tokens as f64 / 1_000_000.0) * output_price
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_tokens_cost_nothing() {
        assert_eq!(estimate_cost_usd(Tier::Premium, 0, 0), 0.0);
    }

    #[test]
    fn premium_costs_more_than_economy_for_equal_tokens() {
        let economy = estimate_cost_usd(Tier::Economy, 1_000_000, 1_000_000);
        let premium = estimate_cost_usd(Tier::Premium, 1_000_000, 1_000_000);
        assert!(premium > economy);
    }
}
