//! `list()` predicate and bounded-page response shapes.

use chrono::{DateTime, Utc};

use atlas_types::{JobStatus, JobSummary, JobType};

#[derive(Debug, Clone, Default)]
pub struct JobFilter {
    pub status: Option<JobStatus>,
    pub job_type: Option<JobType>,
    pub created_after: Option<DateTime<Utc>>,
    pub page_size: u32,
    pub cursor: Option<String>,
}

impl JobFilter {
    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size;
        self
    }
}

/// Default and maximum page size, matching the "bounded page size"
/// requirement in §4.1.
pub const DEFAULT_PAGE_SIZE: u32 = 50;
pub const MAX_PAGE_SIZE: u32 = 200;

pub fn clamp_page_size(requested: u32) -> u32 {
    if requested == 0 {
        DEFAULT_PAGE_SIZE
    } else {
        requested.min(MAX_PAGE_SIZE)
    }
}

#[derive(Debug, Clone, Default)]
pub struct JobPage {
    pub jobs: Vec<JobSummary>,
    pub has_more: bool,
    pub next_cursor: Option<String>,
}
