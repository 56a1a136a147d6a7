//! The `InferenceBackend` trait callers (C5/C6/C7/C8) actually invoke
//! to run a model call. Grounded on the teacher's `LlmClient` trait
//! (`agentic/llm_client.rs`): a small `chat`/`chat_json`-shaped
//! interface rather than a provider SDK leaking into every caller,
//! generalized to carry the router's `TierConfig` instead of letting
//! each call site pick its own parameters.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use atlas_types::{AtlasError, ModelErrorKind};

use crate::tier::{ResponseFormatPolicy, Tier, TierConfig};

#[derive(Debug, Clone)]
pub struct InferenceRequest {
    pub system_prompt: String,
    pub user_prompt: String,
    pub config: TierConfig,
    /// Present only when `config.response_format` is `StrictSchema`.
    pub schema: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InferenceResponse {
    pub text: String,
    pub input_tokens: u64,
    pub output_tokens: u64,
}

#[async_trait]
pub trait InferenceBackend: Send + Sync {
    /// Run one inference call at the tier carried in the request.
    /// Implementations own the per-tier parameter legality: e.g. a
    /// premium/reasoning tier must never forward a `temperature`.
    async fn call(&self, request: InferenceRequest) -> Result<InferenceResponse, AtlasError>;

    fn name(&self) -> &str;
}

/// Reqwest-backed reference implementation. Talks to a single
/// OpenAI-compatible chat-completions endpoint; the tier name is
/// mapped to a model id via `model_for_tier`, matching the teacher's
/// `client_factory.rs` one-function-per-backend-choice idiom.
pub struct HttpInferenceBackend {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model_for_tier: Box<dyn Fn(Tier) -> String + Send + Sync>,
}

impl HttpInferenceBackend {
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        model_for_tier: impl Fn(Tier) -> String + Send + Sync + 'static,
    ) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
            api_key: api_key.into(),
            model_for_tier: Box::new(model_for_tier),
        }
    }

    /// Default tier→model mapping read from environment variables,
    /// so a deployment can swap models without a code change. Falls
    /// back to a placeholder name per tier when unset.
    pub fn from_env(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self::new(base_url, api_key, |tier| {
            let var = match tier {
                Tier::Economy => "ATLAS_MODEL_ECONOMY",
                Tier::Standard => "ATLAS_MODEL_STANDARD",
                Tier::Premium => "ATLAS_MODEL_PREMIUM",
            };
            std::env::var(var).unwrap_or_else(|_| format!("atlas-{}", tier.as_str()))
        })
    }
}

#[async_trait]
impl InferenceBackend for HttpInferenceBackend {
    async fn call(&self, request: InferenceRequest) -> Result<InferenceResponse, AtlasError> {
        let model = (self.model_for_tier)(request.config.tier);

        let mut body = serde_json::json!({
            "model": model,
            "max_tokens": request.config.max_output_tokens,
            "messages": [
                {"role": "system", "content": request.system_prompt},
                {"role": "user", "content": request.user_prompt},
            ],
        });

        if let Some(temperature) = request.config.temperature {
            body["temperature"] = serde_json::json!(temperature);
        }

        match request.config.response_format {
            ResponseFormatPolicy::StrictSchema => {
                if let Some(schema) = &request.schema {
                    body["response_format"] = serde_json::json!({
                        "type": "json_schema",
                        "json_schema": schema,
                    });
                }
            }
            ResponseFormatPolicy::JsonObject => {
                body["response_format"] = serde_json::json!({"type": "json_object"});
            }
            ResponseFormatPolicy::PlainText => {}
        }

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| classify_transport_error(&e))?;

        let status = response.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(AtlasError::ModelCallFailed(ModelErrorKind::RateLimit));
        }
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            return Err(AtlasError::ModelCallFailed(ModelErrorKind::Auth));
        }
        if status == reqwest::StatusCode::SERVICE_UNAVAILABLE {
            return Err(AtlasError::ModelCallFailed(ModelErrorKind::Unavailable));
        }
        if !status.is_success() {
            return Err(AtlasError::ModelCallFailed(ModelErrorKind::Unavailable));
        }

        let payload: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|_| AtlasError::ModelCallFailed(ModelErrorKind::Refusal))?;

        let choice = payload
            .choices
            .into_iter()
            .next()
            .ok_or(AtlasError::ModelCallFailed(ModelErrorKind::Refusal))?;

        Ok(InferenceResponse {
            text: choice.message.content,
            input_tokens: payload.usage.prompt_tokens,
            output_tokens: payload.usage.completion_tokens,
        })
    }

    fn name(&self) -> &str {
        "http"
    }
}

fn classify_transport_error(error: &reqwest::Error) -> AtlasError {
    if error.is_timeout() {
        AtlasError::ModelCallFailed(ModelErrorKind::Timeout)
    } else {
        AtlasError::ModelCallFailed(ModelErrorKind::Unavailable)
    }
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
    #[serde(default)]
    usage: ChatUsage,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    content: String,
}

#[derive(Debug, Default, Deserialize)]
struct ChatUsage {
    #[serde(default)]
    prompt_tokens: u64,
    #[serde(default)]
    completion_tokens: u64,
}

/// Fixture backend for tests: returns a scripted response per call,
/// in call order, so orchestrator/agent-pool tests can drive
/// deterministic decision/extraction sequences without a network
/// dependency.
pub struct FixtureInferenceBackend {
    responses: tokio::sync::Mutex<std::collections::VecDeque<Result<InferenceResponse, AtlasError>>>,
}

impl FixtureInferenceBackend {
    pub fn new(responses: Vec<Result<InferenceResponse, AtlasError>>) -> Self {
        Self {
            responses: tokio::sync::Mutex::new(responses.into()),
        }
    }

    pub fn with_text(texts: Vec<&str>) -> Self {
        Self::new(
            texts
                .into_iter()
                .map(|text| {
                    Ok(InferenceResponse {
                        text: text.to_string(),
                        input_tokens: 100,
                        output_tokens: 50,
                    })
                })
                .collect(),
        )
    }
}

#[async_trait]
impl InferenceBackend for FixtureInferenceBackend {
    async fn call(&self, _request: InferenceRequest) -> Result<InferenceResponse, AtlasError> {
        let mut queue = self.responses.lock().await;
        queue
            .pop_front()
            .unwrap_or_else(|| Err(AtlasError::ModelCallFailed(ModelErrorKind::Unavailable)))
    }

    fn name(&self) -> &str {
        "fixture"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tier::{select_tier, tier_config, OutputFormat, RequestDescriptor};

    fn sample_request() -> InferenceRequest {
        let descriptor = RequestDescriptor::new(0.5, 1.0, 0.5);
        let tier = select_tier(&descriptor);
        InferenceRequest {
            system_prompt: "decide".into(),
            user_prompt: "page content".into(),
            config: tier_config(tier, &descriptor),
            schema: None,
        }
    }

    #[tokio::test]
    async fn fixture_backend_returns_scripted_responses_in_order() {
        let backend = FixtureInferenceBackend::with_text(vec!["first", "second"]);
        let first = backend.call(sample_request()).await.unwrap();
        assert_eq!(first.text, "first");
        let second = backend.call(sample_request()).await.unwrap();
        assert_eq!(second.text, "second");
    }

    #[tokio::test]
    async fn fixture_backend_exhausted_returns_unavailable() {
        let backend = FixtureInferenceBackend::with_text(vec![]);
        let err = backend.call(sample_request()).await.unwrap_err();
        assert!(matches!(
            err,
            AtlasError::ModelCallFailed(ModelErrorKind::Unavailable)
        ));
    }

    #[test]
    fn output_format_json_schema_without_schema_falls_back_to_object_mode_config() {
        let mut descriptor = RequestDescriptor::new(0.5, 1.0, 0.5);
        descriptor.output_format = OutputFormat::JsonSchema;
        descriptor.has_schema = false;
        let tier = select_tier(&descriptor);
        let config = tier_config(tier, &descriptor);
        assert_eq!(
            config.response_format,
            crate::tier::ResponseFormatPolicy::JsonObject
        );
    }
}
