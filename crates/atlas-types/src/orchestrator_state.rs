//! In-worker orchestration state. Never persisted (§3): created when a
//! worker picks up a job, destroyed at worker exit, invisible outside
//! the worker that owns it.

use std::collections::HashSet;
use std::time::Instant;

use serde::{Deserialize, Serialize};

use crate::value::{ExtractedValue, Provenance};

/// One `(agentId, url, focus)` tuple assigned to a single extraction
/// agent by the orchestrator's decision step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionTarget {
    pub agent_id: String,
    pub target_url: String,
    pub focus: String,
    pub priority: i32,
}

/// One page's worth of extracted data, carried with its provenance so
/// the synthesizer and the final `pages` array can cite where it came
/// from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractedRecord {
    pub provenance: Provenance,
    pub data: ExtractedValue,
}

#[derive(Debug, Clone)]
pub struct OrchestratorState {
    pub current_page: u32,
    pub pagination_urls: Vec<String>,
    pub processed_urls: HashSet<String>,
    pub extracted_data: Vec<ExtractedRecord>,
    pub total_pages_processed: u32,
    pub total_links_found: u32,
    pub start_time: Instant,
    pub stop_conditions: Vec<String>,
}

impl OrchestratorState {
    pub fn new(seed_url: &str) -> Self {
        Self {
            current_page: 1,
            pagination_urls: Vec::new(),
            processed_urls: HashSet::new(),
            extracted_data: Vec::new(),
            total_pages_processed: 0,
            total_links_found: 0,
            start_time: Instant::now(),
            stop_conditions: Vec::new(),
        }
        .with_seed(seed_url)
    }

    fn with_seed(mut self, seed_url: &str) -> Self {
        self.pagination_urls.push(seed_url.to_string());
        self
    }

    /// `paginationUrls` is strictly appended, never reordered (§8
    /// testable property).
    pub fn push_pagination_url(&mut self, url: String) {
        if !self.processed_urls.contains(&url) {
            self.pagination_urls.push(url);
        }
    }

    pub fn mark_processed(&mut self, url: &str) {
        self.processed_urls.insert(url.to_string());
        self.total_pages_processed += 1;
    }

    pub fn record_extraction(&mut self, record: ExtractedRecord) {
        self.extracted_data.push(record);
    }

    pub fn add_stop_condition(&mut self, reason: impl Into<String>) {
        self.stop_conditions.push(reason.into());
    }

    pub fn has_results(&self) -> bool {
        !self.extracted_data.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pagination_urls_never_reordered() {
        let mut state = OrchestratorState::new("https://example.com");
        state.push_pagination_url("https://example.com/page/2".into());
        state.push_pagination_url("https://example.com/page/3".into());
        assert_eq!(
            state.pagination_urls,
            vec![
                "https://example.com".to_string(),
                "https://example.com/page/2".to_string(),
                "https://example.com/page/3".to_string(),
            ]
        );
    }

    #[test]
    fn duplicate_targets_within_a_run_are_elided() {
        let mut state = OrchestratorState::new("https://example.com");
        state.mark_processed("https://example.com/a");
        state.push_pagination_url("https://example.com/a".into());
        assert_eq!(state.pagination_urls.len(), 1);
    }
}
