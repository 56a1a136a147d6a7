//! Tier-selection policy (§4.4).
//!
//! A tier is a named capability/cost bracket; selecting one is a pure
//! function of a `RequestDescriptor`; everything about how that tier
//! talks to a model (legal sampling parameters, response-format mode)
//! lives in `TierConfig`, decided here once and then carried around by
//! callers instead of each call site guessing (§9: "the source
//! occasionally passes `temperature` to a tier that rejects it").

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Tier {
    Economy,
    Standard,
    Premium,
}

impl Tier {
    pub fn as_str(self) -> &'static str {
        match self {
            Tier::Economy => "economy",
            Tier::Standard => "standard",
            Tier::Premium => "premium",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OutputFormat {
    Text,
    Json,
    JsonSchema,
}

/// A caller's request for a decision/extraction/synthesis call. The
/// optional `advisory_hint` slot is where the out-of-scope
/// "extraction memory" feature (§9 Open Questions) may feed a
/// past-run suggestion — the router treats it as an opaque nudge, not
/// a correctness input.
#[derive(Debug, Clone)]
pub struct RequestDescriptor {
    pub complexity: f64,
    pub budget_usd: f64,
    pub accuracy_target: f64,
    pub reasoning_required: bool,
    pub output_format: OutputFormat,
    pub has_schema: bool,
    pub advisory_hint: Option<String>,
}

impl RequestDescriptor {
    pub fn new(complexity: f64, budget_usd: f64, accuracy_target: f64) -> Self {
        Self {
            complexity: complexity.clamp(0.0, 1.0),
            budget_usd,
            accuracy_target: accuracy_target.clamp(0.0, 1.0),
            reasoning_required: false,
            output_format: OutputFormat::Text,
            has_schema: false,
            advisory_hint: None,
        }
    }
}

/// Budget-is-negligible threshold used by the low-tier rule.
pub const BUDGET_EPSILON_USD: f64 = 0.001;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ResponseFormatPolicy {
    /// Caller supplied a schema: request strict schema-constrained
    /// generation.
    StrictSchema,
    /// No schema, but structured output was requested.
    JsonObject,
    PlainText,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum VerbosityPolicy {
    Terse,
    Balanced,
    Verbose,
}

#[derive(Debug, Clone)]
pub struct TierConfig {
    pub tier: Tier,
    pub max_output_tokens: u32,
    /// `None` means the tier's backend rejects a temperature
    /// parameter outright — callers must not send the field at all,
    /// not send `None`-as-default.
    pub temperature: Option<f32>,
    pub response_format: ResponseFormatPolicy,
    pub verbosity: VerbosityPolicy,
}

/// Select a tier per §4.4's selection policy:
/// - `accuracy ≥ 0.95 ∨ complexity ≥ 0.8` → highest tier
/// - `budget < ε ∧ complexity < 0.3` → lowest tier
/// - otherwise → mid tier
pub fn select_tier(descriptor: &RequestDescriptor) -> Tier {
    if descriptor.accuracy_target >= 0.95 || descriptor.complexity >= 0.8 {
        Tier::Premium
    } else if descriptor.budget_usd < BUDGET_EPSILON_USD && descriptor.complexity < 0.3 {
        Tier::Economy
    } else {
        Tier::Standard
    }
}

/// Per-tier parameter legality, resolved once here rather than at
/// every call site. Premium models in this stack are reasoning
/// models that reject a `temperature` override.
pub fn tier_config(tier: Tier, descriptor: &RequestDescriptor) -> TierConfig {
    let response_format = match (descriptor.has_schema, descriptor.output_format) {
        (true, _) => ResponseFormatPolicy::StrictSchema,
        (false, OutputFormat::Json | OutputFormat::JsonSchema) => ResponseFormatPolicy::JsonObject,
        (false, OutputFormat::Text) => ResponseFormatPolicy::PlainText,
    };

    match tier {
        Tier::Economy => TierConfig {
            tier,
            max_output_tokens: 1_024,
            temperature: Some(0.2),
            response_format,
            verbosity: VerbosityPolicy::Terse,
        },
        Tier::Standard => TierConfig {
            tier,
            max_output_tokens: 4_096,
            temperature: Some(0.3),
            response_format,
            verbosity: VerbosityPolicy::Balanced,
        },
        Tier::Premium => TierConfig {
            tier,
            max_output_tokens: 8_192,
            temperature: None,
            response_format,
            verbosity: VerbosityPolicy::Verbose,
        },
    }
}

/// Ordered next-best tiers for a caller hitting a tier-specific
/// failure (rate limit, refusal, model-unavailable). Premium falls
/// back toward cheaper-but-available tiers rather than failing
/// outright; Economy has nowhere cheaper to go.
pub fn fallback_chain(tier: Tier) -> Vec<Tier> {
    match tier {
        Tier::Premium => vec![Tier::Standard, Tier::Economy],
        Tier::Standard => vec![Tier::Premium, Tier::Economy],
        Tier::Economy => vec![Tier::Standard, Tier::Premium],
    }
}
