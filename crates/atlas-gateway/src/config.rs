//! Gateway process configuration (§6), read via `clap`'s `env`
//! attribute the same way `atlas-worker` does.

use clap::Parser;

#[derive(Debug, Clone, Parser)]
#[command(name = "atlas-gateway")]
pub struct GatewayConfig {
    /// Listen address for the HTTP ingress.
    #[arg(long, env = "ATLAS_GATEWAY_ADDR", default_value = "0.0.0.0:8080")]
    pub addr: String,

    /// Shared bearer key; missing/wrong key on a non-GET is a 401 (§6).
    #[arg(long, env = "ATLAS_API_KEY", default_value = "")]
    pub api_key: String,

    /// OpenAI-compatible endpoint used for the `/health` tier checks.
    #[arg(long, env = "ATLAS_MODEL_BASE_URL", default_value = "https://api.openai.com/v1")]
    pub model_base_url: String,

    #[arg(long, env = "ATLAS_MODEL_API_KEY", default_value = "")]
    pub model_api_key: String,

    /// Postgres connection string; only consulted when the `postgres`
    /// feature is enabled.
    #[arg(long, env = "DATABASE_URL", default_value = "")]
    pub database_url: String,
}
