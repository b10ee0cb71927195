//! HTTP request handlers
//!
//! Contains handlers for all HTTP endpoints.

use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{Html, IntoResponse, Response},
    Json,
};
use serde::Serialize;
use tracing::instrument;

use super::AppState;
use crate::error::{AppError, AppResult};
use crate::transformer::{PrometheusFormatter, TEXT_CONTENT_TYPE};

/// Health check response
#[derive(Serialize)]
pub struct HealthResponse {
    status: String,
    version: String,
}

/// Root endpoint - displays basic info
pub async fn root(State(state): State<AppState>) -> Html<String> {
    let html = format!(
        r#"<!DOCTYPE html>
<html>
<head>
    <title>jmx-bridge</title>
</head>
<body>
    <h1>jmx-bridge</h1>
    <p>Version: {}</p>
    <ul>
        <li><a href="/health">Health Check</a></li>
        <li><a href="{}">Metrics</a></li>
    </ul>
</body>
</html>"#,
        env!("CARGO_PKG_VERSION"),
        state.metrics_path
    );
    Html(html)
}

/// Health check endpoint
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Metrics endpoint - scrapes beans and returns Prometheus text format
///
/// Failing connections still answer 200 with `jmx_scrape_error 1`.
#[instrument(skip(state), name = "metrics_handler")]
pub async fn metrics(State(state): State<AppState>) -> AppResult<Response> {
    let snapshots = state
        .exporter
        .collect()
        .await
        .map_err(AppError::Exporter)?;

    let output = PrometheusFormatter::new().format(&snapshots);

    Ok((
        StatusCode::OK,
        [(header::CONTENT_TYPE, TEXT_CONTENT_TYPE)],
        output,
    )
        .into_response())
}
