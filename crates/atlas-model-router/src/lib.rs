//! C4 Model Router.
//!
//! A pure tier-selection policy plus an `InferenceBackend` trait that
//! the rest of the workspace calls through. The router owns every
//! per-tier parameter legality rule (§9: "the source occasionally
//! passes `temperature` to a tier that rejects it"), so callers never
//! build request bodies themselves.

pub mod backend;
pub mod cost;
pub mod tier;

pub use backend::{FixtureInferenceBackend, HttpInferenceBackend, InferenceBackend, InferenceRequest, InferenceResponse};
pub use cost::estimate_cost_usd;
pub use tier::{
    fallback_chain, select_tier, tier_config, OutputFormat, RequestDescriptor, ResponseFormatPolicy,
    Tier, TierConfig, VerbosityPolicy,
};
