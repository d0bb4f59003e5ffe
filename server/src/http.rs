// Copyright (c) 2026 Forgebase Contributors
// SPDX-License-Identifier: Apache-2.0
//! HTTP adapter over `orchestrator-core` (spec.md §2 "API adapter to core").
//!
//! Thin by design: every handler validates the request shape, calls one
//! application service method, and folds the result into JSON. No
//! orchestration logic lives here — that's the engine's job.

use std::convert::Infallible;
use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::IntoResponse;
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use futures::stream::Stream;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt as _;
use tokio_util::sync::CancellationToken;

use orchestrator_core::domain::execution::WorkflowExecutionId;
use orchestrator_core::domain::resource::{NewHealthCheckRecord, ResourceId};
use orchestrator_core::error::{CoreError, ErrorCode};
use orchestrator_core::infrastructure::spec_parser::parse_score_yaml;

use crate::state::AppState;

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/specs", post(submit_spec))
        .route("/specs/validate", post(validate_spec))
        .route("/specs/{name}", delete(delete_spec))
        .route("/resources/{id}", get(get_resource))
        .route("/resources/{id}/retry", post(retry_resource))
        .route("/resources/{id}/history", get(resource_history))
        .route("/resources/{id}/dependencies", get(resource_dependencies))
        .route("/resources/{id}/health-checks", get(list_health_checks).post(record_health_check))
        .route("/executions/{id}/retry", post(retry_execution))
        .route("/executions/{id}/logs", get(stream_logs))
        .route("/apps/{app}/graph", get(app_graph))
        .route("/apps/{app}/graph/rebuild", post(rebuild_graph))
        .route("/apps/{app}/graph/critical-path", get(critical_path))
        .route("/apps/{app}/graph/annotations", post(add_annotation))
        .route("/apps/{app}/graph/nodes/{node_id}/annotations/{annotation_id}", delete(delete_annotation))
        .route("/apps/{app}/metrics", get(app_metrics))
        .route("/apps/{app}/history", get(app_history))
        .route("/providers/reload", post(reload_providers))
        .route("/providers/reload-history", get(reload_history))
        .with_state(state)
}

async fn healthz() -> impl IntoResponse {
    Json(json!({"status": "ok"}))
}

fn error_response(err: CoreError) -> (StatusCode, Json<Value>) {
    let status = match err.code {
        ErrorCode::InvalidSpec | ErrorCode::InvalidWorkflow | ErrorCode::InvalidParameters | ErrorCode::UnknownStepType => StatusCode::BAD_REQUEST,
        ErrorCode::NoProvider | ErrorCode::NoProvisioner | ErrorCode::CapabilityConflict => StatusCode::UNPROCESSABLE_ENTITY,
        ErrorCode::InvalidTransition => StatusCode::CONFLICT,
        ErrorCode::ResourceNotFound | ErrorCode::ExecutionNotFound => StatusCode::NOT_FOUND,
        ErrorCode::Timeout => StatusCode::GATEWAY_TIMEOUT,
        ErrorCode::Cancelled => StatusCode::from_u16(499).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
        ErrorCode::StepFailed | ErrorCode::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, Json(json!({"error": {"code": err.code.as_str(), "message": err.message, "details": err.details}})))
}

#[derive(Debug, Deserialize)]
struct SubmitSpecRequest {
    #[serde(default)]
    team: Option<String>,
    #[serde(default = "default_submitter")]
    submitted_by: String,
}

fn default_submitter() -> String {
    "api".to_string()
}

/// Body is the raw Score YAML document; `team`/`submitted_by` travel as
/// query parameters since the body itself is not JSON (spec.md §6).
async fn submit_spec(State(state): State<Arc<AppState>>, Query(query): Query<SubmitSpecRequest>, body: String) -> impl IntoResponse {
    let new_spec = match parse_score_yaml(&body, &query.submitted_by, query.team) {
        Ok(s) => s,
        Err(e) => return error_response(CoreError::from(e)).into_response(),
    };
    match state.specs.submit(new_spec).await {
        Ok(spec) => {
            // Wake the engine immediately rather than making freshly
            // declared resources wait out a full poll interval.
            state.wake.notify_one();
            (StatusCode::CREATED, Json(json!(spec))).into_response()
        }
        Err(e) => error_response(e).into_response(),
    }
}

async fn validate_spec(State(state): State<Arc<AppState>>, Query(query): Query<SubmitSpecRequest>, body: String) -> impl IntoResponse {
    let new_spec = match parse_score_yaml(&body, &query.submitted_by, query.team) {
        Ok(s) => s,
        Err(e) => return error_response(CoreError::from(e)).into_response(),
    };
    match state.specs.validate_only(&new_spec).await {
        Ok(()) => (StatusCode::OK, Json(json!({"valid": true}))).into_response(),
        Err(e) => error_response(CoreError::from(e)).into_response(),
    }
}

async fn delete_spec(State(state): State<Arc<AppState>>, Path(name): Path<String>) -> impl IntoResponse {
    match state.specs.delete(&name).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => error_response(e).into_response(),
    }
}

async fn get_resource(State(state): State<Arc<AppState>>, Path(id): Path<ResourceId>) -> impl IntoResponse {
    match state.resources.get(id).await {
        Ok(resource) => Json(json!(resource)).into_response(),
        Err(e) => error_response(e).into_response(),
    }
}

#[derive(Debug, Default, Deserialize)]
struct RetryRequest {
    #[serde(default = "default_submitter")]
    actor: String,
}

async fn retry_resource(State(state): State<Arc<AppState>>, Path(id): Path<ResourceId>, body: Option<Json<RetryRequest>>) -> impl IntoResponse {
    let actor = body.map(|Json(r)| r.actor).unwrap_or_else(default_submitter);
    match state.resources.retry(id, &actor).await {
        Ok((resource, record)) => Json(json!({"resource": resource, "transition": record})).into_response(),
        Err(e) => error_response(e).into_response(),
    }
}

async fn resource_history(State(state): State<Arc<AppState>>, Path(id): Path<ResourceId>) -> impl IntoResponse {
    match state.resources.history(id).await {
        Ok(history) => Json(json!(history)).into_response(),
        Err(e) => error_response(CoreError::from(e)).into_response(),
    }
}

async fn resource_dependencies(State(state): State<Arc<AppState>>, Path(id): Path<ResourceId>) -> impl IntoResponse {
    match state.resources.list_dependencies(id).await {
        Ok(deps) => Json(json!(deps)).into_response(),
        Err(e) => error_response(CoreError::from(e)).into_response(),
    }
}

#[derive(Debug, Deserialize)]
struct HealthCheckRequest {
    check_type: String,
    status: orchestrator_core::domain::resource::HealthStatus,
    #[serde(default)]
    latency_ms: Option<i64>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    metrics: Option<Value>,
}

async fn record_health_check(State(state): State<Arc<AppState>>, Path(id): Path<ResourceId>, Json(req): Json<HealthCheckRequest>) -> impl IntoResponse {
    let check = NewHealthCheckRecord { resource_id: id, check_type: req.check_type, status: req.status, latency_ms: req.latency_ms, error: req.error, metrics: req.metrics };
    match state.resources.record_health_check(check).await {
        Ok(record) => (StatusCode::CREATED, Json(json!(record))).into_response(),
        Err(e) => error_response(e).into_response(),
    }
}

#[derive(Debug, Deserialize)]
struct LimitQuery {
    #[serde(default = "default_limit")]
    limit: i64,
}

fn default_limit() -> i64 {
    50
}

async fn list_health_checks(State(state): State<Arc<AppState>>, Path(id): Path<ResourceId>, Query(q): Query<LimitQuery>) -> impl IntoResponse {
    match state.resources.health_history(id, q.limit).await {
        Ok(checks) => Json(json!(checks)).into_response(),
        Err(e) => error_response(CoreError::from(e)).into_response(),
    }
}

#[derive(Debug, Default, Deserialize)]
struct RetryExecutionRequest {
    #[serde(default)]
    resume_from_step: Option<i32>,
}

/// Spawns the retry off the request lifetime, mirroring how the engine
/// itself never awaits a workflow execution inline (spec.md §4.7) — the
/// caller polls `/resources/{id}` or the execution's log stream instead of
/// waiting on this response.
async fn retry_execution(State(state): State<Arc<AppState>>, Path(id): Path<WorkflowExecutionId>, body: Option<Json<RetryExecutionRequest>>) -> impl IntoResponse {
    let resume_from_step = body.and_then(|Json(r)| r.resume_from_step);
    let executor = state.executor.clone();
    tokio::spawn(async move {
        if let Err(e) = executor.retry(id, resume_from_step, CancellationToken::new()).await {
            tracing::warn!(execution = %id, error = %e, "retried execution failed");
        }
    });
    (StatusCode::ACCEPTED, Json(json!({"parent_execution_id": id}))).into_response()
}

async fn stream_logs(State(state): State<Arc<AppState>>, Path(id): Path<WorkflowExecutionId>) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let rx = state.pubsub.subscribe(id);
    let stream = BroadcastStream::new(rx).filter_map(|item| match item {
        Ok(line) => Some(Ok(Event::default().event(line.step_name).data(line.line))),
        Err(_lagged) => None,
    });
    Sse::new(stream).keep_alive(KeepAlive::default())
}

async fn app_graph(State(state): State<Arc<AppState>>, Path(app): Path<String>) -> impl IntoResponse {
    match state.graph.graph_for_app(&app).await {
        Ok(view) => Json(json!(view)).into_response(),
        Err(e) => error_response(CoreError::from(e)).into_response(),
    }
}

async fn rebuild_graph(State(state): State<Arc<AppState>>, Path(app): Path<String>) -> impl IntoResponse {
    match state.graph.rebuild_for_app(&app).await {
        Ok(view) => Json(json!(view)).into_response(),
        Err(e) => error_response(CoreError::from(e)).into_response(),
    }
}

async fn critical_path(State(state): State<Arc<AppState>>, Path(app): Path<String>) -> impl IntoResponse {
    match state.graph.critical_path(&app).await {
        Ok(result) => Json(json!({"path": result.path, "total_weight_ms": result.total_weight_ms})).into_response(),
        Err(e) => error_response(CoreError::from(e)).into_response(),
    }
}

#[derive(Debug, Deserialize)]
struct AnnotationRequest {
    node_id: String,
    author: String,
    text: String,
}

async fn add_annotation(State(state): State<Arc<AppState>>, Path(app): Path<String>, Json(req): Json<AnnotationRequest>) -> impl IntoResponse {
    match state.graph.add_annotation(&app, &req.node_id, &req.author, &req.text).await {
        Ok(annotation) => (StatusCode::CREATED, Json(json!(annotation))).into_response(),
        Err(e) => error_response(CoreError::from(e)).into_response(),
    }
}

#[derive(Debug, Deserialize)]
struct DeleteAnnotationRequest {
    requester: String,
    #[serde(default)]
    requester_is_admin: bool,
}

async fn delete_annotation(
    State(state): State<Arc<AppState>>,
    Path((app, node_id, annotation_id)): Path<(String, String, i64)>,
    Json(req): Json<DeleteAnnotationRequest>,
) -> impl IntoResponse {
    let annotations = match state.graph.list_annotations(&app, &node_id).await {
        Ok(list) => list,
        Err(e) => return error_response(CoreError::from(e)).into_response(),
    };
    let Some(annotation) = annotations.into_iter().find(|a| a.id == annotation_id) else {
        return error_response(CoreError::new(ErrorCode::ResourceNotFound, format!("annotation {annotation_id} not found"))).into_response();
    };
    match state.graph.delete_annotation(&annotation, &req.requester, req.requester_is_admin).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => error_response(CoreError::from(e)).into_response(),
    }
}

async fn app_metrics(State(state): State<Arc<AppState>>, Path(app): Path<String>, Query(q): Query<LimitQuery>) -> impl IntoResponse {
    match state.graph.metrics(&app, q.limit).await {
        Ok(summary) => Json(json!({
            "total": summary.total,
            "success_count": summary.success_count,
            "failure_count": summary.failure_count,
            "avg_duration_ms": summary.avg_duration_ms,
            "median_duration_ms": summary.median_duration_ms,
            "min_duration_ms": summary.min_duration_ms,
            "max_duration_ms": summary.max_duration_ms,
        }))
        .into_response(),
        Err(e) => error_response(CoreError::from(e)).into_response(),
    }
}

async fn app_history(State(state): State<Arc<AppState>>, Path(app): Path<String>, Query(q): Query<LimitQuery>) -> impl IntoResponse {
    match state.graph.history(&app, q.limit).await {
        Ok(history) => Json(json!(history)).into_response(),
        Err(e) => error_response(CoreError::from(e)).into_response(),
    }
}

async fn reload_providers(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let sources = state.provider_sources();
    let manifests = orchestrator_core::infrastructure::provider_loader::load_all(&sources, &state.providers_dir).await;
    match state.registry.reload(manifests) {
        Ok(()) => Json(json!({"reloaded": true, "providers": state.registry.load().len()})).into_response(),
        Err(e) => error_response(CoreError::from(e)).into_response(),
    }
}

async fn reload_history(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let history: Vec<Value> = state
        .registry
        .reload_history()
        .into_iter()
        .map(|event| json!({"at": event.at, "provider_count": event.provider_count, "error": event.error, "success": event.is_success()}))
        .collect();
    Json(json!(history))
}
