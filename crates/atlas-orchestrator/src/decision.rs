//! Orchestrator decision record (§4.6 step 1): the model's structured
//! answer to "what should the loop do next". On parse failure or a
//! decide-call timeout, the loop falls back to a hard-coded
//! single-page decision rather than aborting the job.

use serde::{Deserialize, Serialize};

use atlas_types::ExtractionTarget;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    SinglePage,
    MultiAgent,
    Pagination,
    Stop,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaginationDecision {
    #[serde(default)]
    pub has_next: bool,
    #[serde(default)]
    pub next_page_url: Option<String>,
    #[serde(default)]
    pub page_type: Option<String>,
    #[serde(default)]
    pub estimated_total_pages: Option<u32>,
}

fn default_confidence() -> f64 {
    0.5
}

/// `{strategy, reasoning, agentsNeeded, extractionTargets[],
/// pagination, stopRecommendation, confidence}` (§4.6).
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Decision {
    pub strategy: Strategy,
    #[serde(default)]
    pub reasoning: String,
    #[serde(default)]
    pub agents_needed: u32,
    #[serde(default)]
    pub extraction_targets: Vec<ExtractionTarget>,
    #[serde(default)]
    pub pagination: PaginationDecision,
    #[serde(default)]
    pub stop_recommendation: bool,
    #[serde(default = "default_confidence")]
    pub confidence: f64,
}

impl Decision {
    /// The hard-coded fallback from §4.6 step 1: a single-page
    /// decision targeting the current URL, never a stop — stopping
    /// silently on a decide failure would risk an empty completion.
    pub fn fallback_single_page(current_url: &str, focus: &str) -> Self {
        Decision {
            strategy: Strategy::SinglePage,
            reasoning: "fallback: decision call failed or returned unparsable output".into(),
            agents_needed: 1,
            extraction_targets: vec![ExtractionTarget {
                agent_id: "agent-fallback".into(),
                target_url: current_url.to_string(),
                focus: focus.to_string(),
                priority: 0,
            }],
            pagination: PaginationDecision::default(),
            stop_recommendation: false,
            confidence: 0.0,
        }
    }
}

/// Parse a raw model response into a `Decision`, falling back on any
/// shape mismatch rather than propagating a parse error up the loop.
pub fn parse_decision(text: &str, current_url: &str, focus: &str) -> Decision {
    serde_json::from_str::<Decision>(text)
        .unwrap_or_else(|_| Decision::fallback_single_page(current_url, focus))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_a_well_formed_multi_agent_decision() {
        let text = serde_json::json!({
            "strategy": "multi_agent",
            "reasoning": "found a listing page with several article links",
            "agentsNeeded": 2,
            "extractionTargets": [
                {"agentId": "a1", "targetUrl": "https://example.com/one", "focus": "title", "priority": 1},
                {"agentId": "a2", "targetUrl": "https://example.com/two", "focus": "title", "priority": 0},
            ],
            "pagination": {"hasNext": false},
            "stopRecommendation": false,
            "confidence": 0.8,
        })
        .to_string();

        let decision = parse_decision(&text, "https://example.com", "titles");
        assert_eq!(decision.strategy, Strategy::MultiAgent);
        assert_eq!(decision.extraction_targets.len(), 2);
    }

    #[test]
    fn unparsable_text_falls_back_to_single_page() {
        let decision = parse_decision("not json at all", "https://example.com", "title");
        assert_eq!(decision.strategy, Strategy::SinglePage);
        assert_eq!(decision.extraction_targets[0].target_url, "https://example.com");
    }

    #[test]
    fn missing_optional_fields_default_sensibly() {
        let text = serde_json::json!({"strategy": "stop"}).to_string();
        let decision = parse_decision(&text, "https://example.com", "title");
        assert_eq!(decision.strategy, Strategy::Stop);
        assert!(decision.extraction_targets.is_empty());
        assert!(!decision.pagination.has_next);
    }
}
