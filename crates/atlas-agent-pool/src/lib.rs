//! C7 Agent Pool.
//!
//! Given a decided page-batch (an array of `ExtractionTarget`), run up
//! to a configured concurrency cap of agents in parallel; anything
//! beyond the cap serializes FIFO by descending priority. Each agent
//! owns its own deadline, strictly less than the batch deadline a
//! breach there produces a per-target error, never a batch failure
//! (§4.7).

mod politeness;

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Semaphore;
use tracing::{instrument, warn};

use atlas_model_router::{
    select_tier, tier_config, InferenceBackend, InferenceRequest, OutputFormat, RequestDescriptor, Tier,
};
use atlas_page_fetcher::{FetchOptions, PageFetcher};
use atlas_types::{AtlasError, ExtractedValue, ExtractionTarget, JobParams, ModelErrorKind, Provenance};

pub use politeness::PolitenessGate;

/// Default per-agent wall-clock budget (§4.7).
pub const DEFAULT_AGENT_DEADLINE: Duration = Duration::from_secs(20);

/// Default bound on agents running concurrently within one batch.
pub const DEFAULT_CONCURRENCY_CAP: usize = 5;

/// Below this many extracted items, a prompt mentioning "all"/"every"
/// triggers one escalated retry (§4.7). Not specified numerically in
/// the source; fixed here as a deliberate, documented choice (see
/// `DESIGN.md`) rather than left to guesswork at each call site.
pub const EXHAUSTIVENESS_RETRY_THRESHOLD: usize = 3;

#[derive(Debug, Clone)]
pub struct AgentResult {
    pub agent_id: String,
    pub url: String,
    pub extracted_data: Option<ExtractedValue>,
    pub provenance: Provenance,
    pub priority: i32,
    pub error: Option<String>,
}

pub struct AgentPool {
    fetcher: Arc<dyn PageFetcher>,
    backend: Arc<dyn InferenceBackend>,
    concurrency_cap: usize,
    agent_deadline: Duration,
    politeness: PolitenessGate,
}

impl AgentPool {
    pub fn new(fetcher: Arc<dyn PageFetcher>, backend: Arc<dyn InferenceBackend>) -> Self {
        Self {
            fetcher,
            backend,
            concurrency_cap: DEFAULT_CONCURRENCY_CAP,
            agent_deadline: DEFAULT_AGENT_DEADLINE,
            politeness: PolitenessGate::default(),
        }
    }

    pub fn with_concurrency_cap(mut self, cap: usize) -> Self {
        self.concurrency_cap = cap.max(1);
        self
    }

    pub fn with_agent_deadline(mut self, deadline: Duration) -> Self {
        self.agent_deadline = deadline;
        self
    }

    /// Run every target, respecting the batch deadline. Targets beyond
    /// `concurrency_cap` are admitted FIFO in descending-priority
    /// order as earlier agents finish and release a permit.
    #[instrument(skip(self, targets, params), fields(target_count = targets.len()))]
    pub async fn run(
        &self,
        mut targets: Vec<ExtractionTarget>,
        params: &JobParams,
        batch_deadline: Instant,
    ) -> Vec<AgentResult> {
        targets.sort_by(|a, b| b.priority.cmp(&a.priority).then(a.agent_id.cmp(&b.agent_id)));

        let concurrency = self.concurrency_cap.min(targets.len().max(1));
        let semaphore = Arc::new(Semaphore::new(concurrency));

        let mut handles = Vec::with_capacity(targets.len());
        for target in targets {
            let semaphore = semaphore.clone();
            let fetcher = self.fetcher.clone();
            let backend = self.backend.clone();
            let politeness = self.politeness.clone();
            let agent_deadline = batch_deadline.min(Instant::now() + self.agent_deadline);
            let params = params.clone();

            handles.push(tokio::spawn(async move {
                let _permit = semaphore.acquire_owned().await.expect("semaphore not closed");
                politeness.wait_for_host(&target.target_url).await;
                run_single_agent(&*fetcher, &*backend, target, &params, agent_deadline).await
            }));
        }

        let mut results = Vec::with_capacity(handles.len());
        for handle in handles {
            match handle.await {
                Ok(result) => results.push(result),
                Err(join_err) => warn!(error = %join_err, "agent task panicked"),
            }
        }

        // Merge in deterministic order: by decided priority, tie-
        // broken by agentId (§5's ordering guarantee for the extract
        // step).
        results.sort_by(|a, b| b.priority.cmp(&a.priority).then(a.agent_id.cmp(&b.agent_id)));
        results
    }
}

async fn run_single_agent(
    fetcher: &dyn PageFetcher,
    backend: &dyn InferenceBackend,
    target: ExtractionTarget,
    params: &JobParams,
    deadline: Instant,
) -> AgentResult {
    let provenance = Provenance::new(target.target_url.clone());

    let fetch_outcome = match fetcher
        .fetch(&target.target_url, &FetchOptions::default(), deadline)
        .await
    {
        Ok(outcome) => outcome,
        Err(e) => {
            return AgentResult {
                agent_id: target.agent_id,
                url: target.target_url,
                extracted_data: None,
                provenance,
                priority: target.priority,
                error: Some(e.to_string()),
            };
        }
    };

    let wants_exhaustive = wants_exhaustiveness(&params.extraction_instructions);

    let first_attempt = extract_once(backend, &target, params, &fetch_outcome.markdown, Tier::Standard).await;

    let (data, error) = match first_attempt {
        Ok(value) => {
            let count = value.item_count(None).unwrap_or(usize::MAX);
            if wants_exhaustive && count < EXHAUSTIVENESS_RETRY_THRESHOLD {
                match extract_once(backend, &target, params, &fetch_outcome.markdown, Tier::Premium).await {
                    Ok(retried) => (Some(retried), None),
                    Err(_) => (Some(value), None),
                }
            } else {
                (Some(value), None)
            }
        }
        Err(e) => (None, Some(e.to_string())),
    };

    AgentResult {
        agent_id: target.agent_id,
        url: target.target_url,
        extracted_data: data,
        provenance,
        priority: target.priority,
        error,
    }
}

fn wants_exhaustiveness(instructions: &str) -> bool {
    let lower = instructions.to_ascii_lowercase();
    lower.contains(" all ") || lower.starts_with("all ") || lower.contains(" every ") || lower.contains("every ")
}

async fn extract_once(
    backend: &dyn InferenceBackend,
    target: &ExtractionTarget,
    params: &JobParams,
    page_content: &str,
    tier: Tier,
) -> Result<ExtractedValue, AtlasError> {
    let mut descriptor = RequestDescriptor::new(0.5, 1.0, 0.8);
    descriptor.has_schema = params.output_schema.is_some();
    descriptor.output_format = if params.output_schema.is_some() {
        OutputFormat::JsonSchema
    } else {
        OutputFormat::Json
    };

    let tier = if tier == Tier::Premium {
        Tier::Premium
    } else {
        select_tier(&descriptor).min_with(Tier::Standard)
    };
    let config = tier_config(tier, &descriptor);

    let system_prompt = if tier == Tier::Premium {
        format!(
            "Extract structured data focused on: {}. Be exhaustive: return every matching item on the page, not a sample.",
            target.focus
        )
    } else {
        format!("Extract structured data focused on: {}", target.focus)
    };

    let user_prompt = format!(
        "Instructions: {}\n\nPage content:\n{}",
        params.extraction_instructions, page_content
    );

    let response = backend
        .call(InferenceRequest {
            system_prompt,
            user_prompt,
            config,
            schema: params.output_schema.clone(),
        })
        .await?;

    let parsed: serde_json::Value = serde_json::from_str(&response.text)
        .map_err(|_| AtlasError::ModelCallFailed(ModelErrorKind::Refusal))?;
    Ok(ExtractedValue::from(parsed))
}

trait TierExt {
    fn min_with(self, floor: Tier) -> Tier;
}

impl TierExt for Tier {
    /// Agent extraction calls never drop below the mid tier on their
    /// first attempt (§4.7: "single extraction call via C4 at the mid
    /// tier"), regardless of what the generic selection policy would
    /// pick for a low-complexity descriptor.
    fn min_with(self, floor: Tier) -> Tier {
        fn rank(tier: Tier) -> u8 {
            match tier {
                Tier::Economy => 0,
                Tier::Standard => 1,
                Tier::Premium => 2,
            }
        }
        if rank(self) < rank(floor) {
            floor
        } else {
            self
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wants_exhaustiveness_detects_all_and_every() {
        assert!(wants_exhaustiveness("Extract all the articles"));
        assert!(wants_exhaustiveness("Get every product listed"));
        assert!(!wants_exhaustiveness("Extract the page title"));
    }

    #[test]
    fn tier_floor_never_drops_below_standard() {
        assert_eq!(Tier::Economy.min_with(Tier::Standard), Tier::Standard);
        assert_eq!(Tier::Premium.min_with(Tier::Standard), Tier::Premium);
        assert_eq!(Tier::Standard.min_with(Tier::Standard), Tier::Standard);
    }
}
