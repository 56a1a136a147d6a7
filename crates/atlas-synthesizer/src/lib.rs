//! C8 Synthesizer.
//!
//! Merges per-agent `extractedData` into one coordinator answer.
//! Time-starved jobs skip synthesis entirely rather than risk missing
//! the job deadline; oversize payloads are chunked, each chunk
//! summarized independently so one bad chunk never sinks the rest
//! (§4.8).

mod chunk;

use std::time::{Duration, Instant};

use tracing::warn;

use atlas_model_router::{
    tier_config, InferenceBackend, InferenceRequest, OutputFormat, RequestDescriptor, Tier,
};
use atlas_types::{ExtractedRecord, JobParams};

pub use chunk::split_into_chunks;

/// Below this much remaining time, synthesis is skipped outright
/// rather than attempted and risk blowing the job deadline (§4.8).
pub const SYNTHESIS_SKIP_THRESHOLD: Duration = Duration::from_secs(30);

/// Size threshold (bytes) below which a single call handles the full
/// context; above it the input is chunked.
pub const SINGLE_CALL_SIZE_THRESHOLD_BYTES: usize = 100_000;

pub const SENTINEL_SKIPPED: &str = "synthesis skipped due to time constraints";

/// Per-chunk deadline, independent of the overall job deadline so one
/// slow chunk can't starve the others out of their share of the
/// remaining budget.
const CHUNK_DEADLINE: Duration = Duration::from_secs(15);

/// Size-scaled tier choice (§4.8): the same rule governs a
/// single-call synthesis and each individual chunk, so a small result
/// set never pays premium-tier cost just because total bytes sat
/// under the single-call threshold. See `DESIGN.md` for why this
/// reading reconciles the spec's "highest tier" single-call line with
/// its separate size-scaling table.
fn tier_for_size(bytes: usize) -> Tier {
    if bytes < 20_000 {
        Tier::Economy
    } else if bytes < 50_000 {
        Tier::Standard
    } else {
        Tier::Premium
    }
}

pub async fn synthesize(
    backend: &dyn InferenceBackend,
    extracted_data: &[ExtractedRecord],
    params: &JobParams,
    deadline: Instant,
) -> String {
    let remaining = deadline.saturating_duration_since(Instant::now());
    if remaining < SYNTHESIS_SKIP_THRESHOLD {
        return SENTINEL_SKIPPED.to_string();
    }

    let serialized = serde_json::to_string(extracted_data).unwrap_or_default();

    if serialized.len() <= SINGLE_CALL_SIZE_THRESHOLD_BYTES {
        return synthesize_chunk(backend, &serialized, params, 0).await;
    }

    let chunks = split_into_chunks(&serialized, SINGLE_CALL_SIZE_THRESHOLD_BYTES);
    let mut summaries = Vec::with_capacity(chunks.len());
    for (index, chunk) in chunks.iter().enumerate() {
        let summary = synthesize_chunk(backend, chunk, params, index).await;
        summaries.push(summary);
    }
    summaries.join("\n---\n")
}

async fn synthesize_chunk(
    backend: &dyn InferenceBackend,
    content: &str,
    params: &JobParams,
    chunk_index: usize,
) -> String {
    let tier = tier_for_size(content.len());
    let mut descriptor = RequestDescriptor::new(0.4, 1.0, 0.7);
    descriptor.has_schema = false;
    descriptor.output_format = OutputFormat::Text;
    let config = tier_config(tier, &descriptor);

    let system_prompt = "Synthesize the extracted page data into one coherent answer for the user's request.".to_string();
    let user_prompt = format!(
        "User request: {}\n\nExtracted data:\n{}",
        params.extraction_instructions, content
    );

    let call = backend.call(InferenceRequest {
        system_prompt,
        user_prompt,
        config,
        schema: None,
    });

    match tokio::time::timeout(CHUNK_DEADLINE, call).await {
        Ok(Ok(response)) => response.text,
        Ok(Err(e)) => {
            warn!(chunk_index, error = %e, "chunk synthesis failed");
            format!("Chunk {chunk_index}: synthesis failed — {e}")
        }
        Err(_) => {
            warn!(chunk_index, "chunk synthesis timed out");
            format!("Chunk {chunk_index}: synthesis failed — deadline exceeded")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use atlas_model_router::FixtureInferenceBackend;
    use atlas_types::{ExtractedValue, Provenance};

    fn sample_params() -> JobParams {
        JobParams {
            extraction_instructions: "summarize articles".into(),
            ..Default::default()
        }
    }

    fn sample_records(n: usize) -> Vec<ExtractedRecord> {
        (0..n)
            .map(|i| ExtractedRecord {
                provenance: Provenance::new(format!("https://example.com/{i}")),
                data: ExtractedValue::String(format!("item {i}")),
            })
            .collect()
    }

    #[tokio::test]
    async fn time_starved_synthesis_returns_sentinel_without_calling_backend() {
        let backend = FixtureInferenceBackend::with_text(vec![]);
        let deadline = Instant::now() + Duration::from_secs(5);
        let result = synthesize(&backend, &sample_records(3), &sample_params(), deadline).await;
        assert_eq!(result, SENTINEL_SKIPPED);
    }

    #[tokio::test]
    async fn small_payload_uses_a_single_call() {
        let backend = FixtureInferenceBackend::with_text(vec!["synthesized answer"]);
        let deadline = Instant::now() + Duration::from_secs(60);
        let result = synthesize(&backend, &sample_records(3), &sample_params(), deadline).await;
        assert_eq!(result, "synthesized answer");
    }

    #[tokio::test]
    async fn chunk_failure_is_surfaced_inline_without_failing_the_whole_synthesis() {
        let backend = FixtureInferenceBackend::with_text(vec![]);
        let big_content = "x".repeat(10);
        let result = synthesize_chunk(&backend, &big_content, &sample_params(), 2).await;
        assert!(result.starts_with("Chunk 2: synthesis failed"));
    }
}
