//! Ingress handlers (§6): thin translation between the wire shapes
//! and `JobLifecycleManager` (C9). No business logic lives here.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::Json;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use atlas_types::{AtlasError, Job, JobParams, JobType};

use crate::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateJobRequest {
    pub url: String,
    #[serde(default)]
    pub extraction_instructions: Option<String>,
    #[serde(default)]
    pub prompt: Option<String>,
    #[serde(default)]
    pub output_schema: Option<serde_json::Value>,
    #[serde(default)]
    pub max_pages: Option<u32>,
    #[serde(default)]
    pub max_depth: Option<u32>,
    #[serde(default)]
    pub max_links: Option<u32>,
    /// Wall-clock timeout in milliseconds, mapped straight onto
    /// `JobParams::timeout_ms`.
    #[serde(default)]
    pub timeout: Option<u64>,
    #[serde(default)]
    pub stop_patterns: Vec<String>,
    #[serde(default)]
    pub link_patterns: Vec<String>,
    #[serde(default)]
    pub exclude_patterns: Vec<String>,
    /// A trailing `/*` on `url` auto-enables autonomous mode (§6);
    /// this flag is an explicit alternative to that convention.
    #[serde(default)]
    pub wildcard: bool,
    #[serde(default)]
    pub autonomous: bool,
    #[serde(default)]
    pub agentic: bool,
    #[serde(default)]
    pub model: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateJobResponse {
    pub job_id: Uuid,
    pub status: String,
    pub status_url: String,
}

fn to_job_params(req: &CreateJobRequest) -> Result<JobParams, (StatusCode, String)> {
    let instructions = req
        .extraction_instructions
        .clone()
        .or_else(|| req.prompt.clone())
        .unwrap_or_default();

    if instructions.trim().is_empty() && req.output_schema.is_none() {
        return Err((
            StatusCode::BAD_REQUEST,
            "extractionInstructions, prompt, or outputSchema is required".into(),
        ));
    }

    let mut params = JobParams {
        extraction_instructions: instructions,
        ..Default::default()
    };
    params.output_schema = req.output_schema.clone();
    if let Some(v) = req.max_pages {
        params.max_pages = v;
    }
    if let Some(v) = req.max_depth {
        params.max_depth = v;
    }
    if let Some(v) = req.max_links {
        params.max_links = v;
    }
    if let Some(v) = req.timeout {
        params.timeout_ms = v;
    }
    params.stop_patterns = req.stop_patterns.clone();
    params.link_include_patterns = req.link_patterns.clone();
    params.link_exclude_patterns = req.exclude_patterns.clone();
    params.model_tier_preference = req.model.clone();
    params.autonomous = req.autonomous || req.wildcard || req.url.trim_end().ends_with("/*");

    Ok(params)
}

fn to_http_error(error: AtlasError) -> (StatusCode, String) {
    let status = match &error {
        AtlasError::ValidationError(_) => StatusCode::BAD_REQUEST,
        AtlasError::NotFound => StatusCode::NOT_FOUND,
        AtlasError::AlreadyExists | AtlasError::InvalidTransition { .. } => StatusCode::CONFLICT,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, error.to_string())
}

async fn create_job(
    state: AppState,
    status_path: &'static str,
    default_type: JobType,
    req: CreateJobRequest,
) -> Result<(StatusCode, Json<CreateJobResponse>), (StatusCode, String)> {
    let params = to_job_params(&req)?;
    let job_type = if default_type == JobType::SyncExtract && params.autonomous {
        JobType::AutonomousExtract
    } else {
        default_type
    };

    let job = state
        .lifecycle
        .create_job(job_type, req.url.clone(), params)
        .await
        .map_err(to_http_error)?;

    Ok((
        StatusCode::CREATED,
        Json(CreateJobResponse {
            job_id: job.id,
            status: job.status.as_str().to_string(),
            status_url: format!("/api/{status_path}/{}", job.id),
        }),
    ))
}

pub async fn create_extract(
    State(state): State<AppState>,
    Json(req): Json<CreateJobRequest>,
) -> Result<(StatusCode, Json<CreateJobResponse>), (StatusCode, String)> {
    create_job(state, "extract", JobType::SyncExtract, req).await
}

pub async fn create_scrape(
    State(state): State<AppState>,
    Json(req): Json<CreateJobRequest>,
) -> Result<(StatusCode, Json<CreateJobResponse>), (StatusCode, String)> {
    create_job(state, "scrape", JobType::Scrape, req).await
}

pub async fn create_crawl(
    State(state): State<AppState>,
    Json(req): Json<CreateJobRequest>,
) -> Result<(StatusCode, Json<CreateJobResponse>), (StatusCode, String)> {
    create_job(state, "crawl", JobType::Crawl, req).await
}

pub async fn get_job(
    State(state): State<AppState>,
    Path(job_id): Path<Uuid>,
) -> Result<Json<Job>, (StatusCode, String)> {
    state
        .lifecycle
        .get_job(job_id)
        .await
        .map_err(to_http_error)?
        .map(Json)
        .ok_or((StatusCode::NOT_FOUND, "job not found".to_string()))
}

pub async fn health(State(state): State<AppState>) -> Json<atlas_health_monitor::HealthReport> {
    let store = atlas_health_monitor::telemetry::check_store(state.store.as_ref()).await;
    let model_tiers = atlas_health_monitor::telemetry::check_model_tiers(state.backend.as_ref()).await;
    let resources = atlas_health_monitor::telemetry::resource_utilization(state.process_start);

    Json(atlas_health_monitor::HealthReport {
        store,
        model_tiers,
        resources,
        // No billing/usage aggregator exists anywhere in the
        // collaborator stack (§9 "cost/budget bookkeeping" names a
        // per-call counter fed into `logs`, not a queryable rollup);
        // a real deployment wires this from that counter.
        monthly_cost_usd: 0.0,
    })
}
