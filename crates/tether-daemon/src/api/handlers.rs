use axum::extract::{Path, Query, State};
use axum::http::header::CONTENT_TYPE;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::IntoResponse;
use axum::Json;
use futures::stream::{self, Stream};
use serde::Deserialize;
use std::convert::Infallible;
use tracing::{debug, warn};

use super::responses::{ApiError, ApiResult, ProcessActionResponse, VersionResponse};
use super::state::ApiState;
use crate::health::{HealthRecord, HealthSummary};
use crate::logs::LogEntry;
use crate::supervisor::ProcessInfo;

pub async fn health_summary(State(state): State<ApiState>) -> Json<HealthSummary> {
    Json(state.health.local_summary())
}

pub async fn health_target(
    State(state): State<ApiState>,
    Path(slug): Path<String>,
) -> ApiResult<Json<HealthRecord>> {
    state
        .health
        .local_snapshot(&slug)
        .map(Json)
        .ok_or_else(|| ApiError::not_found("target", &slug))
}

pub async fn external_summary(State(state): State<ApiState>) -> Json<HealthSummary> {
    Json(state.health.external_summary())
}

pub async fn external_target(
    State(state): State<ApiState>,
    Path(slug): Path<String>,
) -> ApiResult<Json<HealthRecord>> {
    state
        .health
        .external_snapshot(&slug)
        .map(Json)
        .ok_or_else(|| ApiError::not_found("remote target", &slug))
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamParams {
    #[serde(default)]
    pub from_line: u64,
}

fn log_event(entry: &LogEntry) -> Event {
    match serde_json::to_string(entry) {
        Ok(json) => Event::default().data(json),
        Err(e) => {
            warn!("Failed to encode log entry: {}", e);
            Event::default().comment("encode error")
        }
    }
}

/// Replays lines after `fromLine`, then follows the file until the client disconnects.
pub async fn stream_logs(
    State(state): State<ApiState>,
    Path(slug): Path<String>,
    Query(params): Query<StreamParams>,
) -> ApiResult<Sse<impl Stream<Item = Result<Event, Infallible>>>> {
    match state.registry.get(&slug) {
        Some(target) if target.is_local() => {}
        _ => return Err(ApiError::not_found("local target", &slug)),
    }

    let subscription = state.logs.tail(&slug, params.from_line).await?;
    state.metrics.record_stream_opened();
    debug!(target_slug = %slug, id = %subscription.id, from_line = params.from_line, "Log stream opened");

    let events = stream::unfold(subscription.receiver, |mut receiver| async move {
        let entry = receiver.recv().await?;
        Some((Ok(log_event(&entry)), receiver))
    });
    Ok(Sse::new(events).keep_alive(KeepAlive::default()))
}

pub async fn list_processes(State(state): State<ApiState>) -> Json<Vec<ProcessInfo>> {
    let mut processes = state.supervisor.all_process_info();
    processes.sort_by(|a, b| a.slug.cmp(&b.slug));
    Json(processes)
}

pub async fn get_process(
    State(state): State<ApiState>,
    Path(slug): Path<String>,
) -> ApiResult<Json<ProcessInfo>> {
    state
        .supervisor
        .process_info(&slug)
        .map(Json)
        .ok_or_else(|| ApiError::not_found("process", &slug))
}

pub async fn start_process(
    State(state): State<ApiState>,
    Path(slug): Path<String>,
) -> ApiResult<Json<ProcessActionResponse>> {
    let pid = state.supervisor.start(&slug).await?;
    Ok(Json(ProcessActionResponse {
        slug,
        action: "start",
        pid: Some(pid),
        exit_code: None,
    }))
}

pub async fn stop_process(
    State(state): State<ApiState>,
    Path(slug): Path<String>,
) -> ApiResult<Json<ProcessActionResponse>> {
    let exit_code = state.supervisor.stop(&slug, None).await?;
    Ok(Json(ProcessActionResponse {
        slug,
        action: "stop",
        pid: None,
        exit_code,
    }))
}

pub async fn restart_process(
    State(state): State<ApiState>,
    Path(slug): Path<String>,
) -> ApiResult<Json<ProcessActionResponse>> {
    let pid = state.supervisor.restart(&slug).await?;
    Ok(Json(ProcessActionResponse {
        slug,
        action: "restart",
        pid: Some(pid),
        exit_code: None,
    }))
}

pub async fn prometheus_metrics(State(state): State<ApiState>) -> impl IntoResponse {
    let body = state.exporter.export().await;
    ([(CONTENT_TYPE, "text/plain; version=0.0.4")], body)
}

pub async fn version(State(state): State<ApiState>) -> Json<VersionResponse> {
    Json(VersionResponse {
        name: env!("CARGO_PKG_NAME"),
        version: env!("CARGO_PKG_VERSION"),
        uptime_secs: state.metrics.uptime_secs(),
    })
}
