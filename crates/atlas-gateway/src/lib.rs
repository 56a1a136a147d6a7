//! Thin axum ingress implementing §6's HTTP contract (`atlas-gateway`
//! binary). Owns no business logic: every handler translates a wire
//! shape and delegates straight to `atlas-lifecycle`'s
//! `JobLifecycleManager`, the way the teacher's `api` crate stays a
//! thin layer over its service crates.

pub mod auth;
pub mod config;
pub mod handlers;

use std::sync::Arc;
use std::time::Instant;

use atlas_job_store::JobStore;
use atlas_lifecycle::JobLifecycleManager;
use atlas_model_router::InferenceBackend;

/// Shared application state, cloned into every handler via axum's
/// `State` extractor. Constructed once at binary start (§9 "explicit,
/// injected dependencies with a clear lifecycle").
#[derive(Clone)]
pub struct AppState {
    pub lifecycle: Arc<JobLifecycleManager>,
    pub store: Arc<dyn JobStore>,
    pub backend: Arc<dyn InferenceBackend>,
    pub api_key: String,
    pub process_start: Instant,
}
