//! Shared-bearer-key auth (§6): "missing/wrong key → 401 except for
//! GETs." An empty configured key disables the check entirely, for
//! local development without a key to manage.

use axum::extract::{Request, State};
use axum::http::{header, Method, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

use crate::AppState;

pub async fn require_bearer(State(state): State<AppState>, req: Request, next: Next) -> Response {
    if req.method() == Method::GET || state.api_key.is_empty() {
        return next.run(req).await;
    }

    let expected = format!("Bearer {}", state.api_key);
    let presented = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok());

    match presented {
        Some(token) if token == expected => next.run(req).await,
        _ => (StatusCode::UNAUTHORIZED, "missing or invalid bearer token").into_response(),
    }
}
