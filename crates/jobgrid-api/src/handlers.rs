//! REST API handlers.
//!
//! Each handler reads/writes via the control-plane components and returns
//! JSON responses in a consistent envelope.

use std::time::{SystemTime, UNIX_EPOCH};

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde::Deserialize;

use jobgrid_broker::JobStatus;
use jobgrid_queue::CommandError;
use jobgrid_state::{
    AlertRule, CooldownConfig, ScalingPolicy, ThresholdSet, validate_alert_rule, validate_policy,
};
use jobgrid_worker::LifecycleError;

use crate::ApiState;

/// Response wrapper for consistent API format.
#[derive(serde::Serialize)]
struct ApiResponse<T: serde::Serialize> {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl<T: serde::Serialize> ApiResponse<T> {
    fn ok(data: T) -> Json<Self> {
        Json(Self {
            success: true,
            data: Some(data),
            error: None,
        })
    }
}

fn error_response(msg: &str, status: StatusCode) -> impl IntoResponse {
    (
        status,
        Json(ApiResponse::<()> {
            success: false,
            data: None,
            error: Some(msg.to_string()),
        }),
    )
}

fn command_error_response(e: CommandError) -> axum::response::Response {
    let status = match &e {
        CommandError::QueueNotFound(_) => StatusCode::NOT_FOUND,
        CommandError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
        CommandError::Broker(_) => StatusCode::BAD_GATEWAY,
    };
    error_response(&e.to_string(), status).into_response()
}

// ── Policies ───────────────────────────────────────────────────────

/// GET /api/v1/policies
pub async fn list_policies(State(state): State<ApiState>) -> impl IntoResponse {
    match state.store.list_policies() {
        Ok(policies) => ApiResponse::ok(policies).into_response(),
        Err(e) => error_response(&e.to_string(), StatusCode::INTERNAL_SERVER_ERROR).into_response(),
    }
}

/// GET /api/v1/policies/:queue
pub async fn get_policy(
    State(state): State<ApiState>,
    Path(queue): Path<String>,
) -> impl IntoResponse {
    match state.store.get_policy(&queue) {
        Ok(Some(policy)) => ApiResponse::ok(policy).into_response(),
        Ok(None) => error_response("policy not found", StatusCode::NOT_FOUND).into_response(),
        Err(e) => error_response(&e.to_string(), StatusCode::INTERNAL_SERVER_ERROR).into_response(),
    }
}

/// Policy create/update body. Timestamps are managed server-side.
#[derive(Deserialize)]
pub struct PolicyRequest {
    pub min_workers: u32,
    pub max_workers: u32,
    #[serde(default)]
    pub scale_up: Option<ThresholdSet>,
    #[serde(default)]
    pub scale_down: Option<ThresholdSet>,
    pub cooldown: CooldownConfig,
}

/// PUT /api/v1/policies/:queue
///
/// Validation failures reject the whole update with field-level detail;
/// the stored policy is replaced atomically or not at all.
pub async fn put_policy(
    State(state): State<ApiState>,
    Path(queue): Path<String>,
    Json(req): Json<PolicyRequest>,
) -> impl IntoResponse {
    let now = epoch_secs();
    let created_at = match state.store.get_policy(&queue) {
        Ok(Some(existing)) => existing.created_at,
        Ok(None) => now,
        Err(e) => {
            return error_response(&e.to_string(), StatusCode::INTERNAL_SERVER_ERROR)
                .into_response();
        }
    };

    let policy = ScalingPolicy {
        queue: queue.clone(),
        min_workers: req.min_workers,
        max_workers: req.max_workers,
        scale_up: req.scale_up,
        scale_down: req.scale_down,
        cooldown: req.cooldown,
        created_at,
        updated_at: now,
    };

    if let Err(e) = validate_policy(&policy) {
        return error_response(&e.to_string(), StatusCode::BAD_REQUEST).into_response();
    }
    match state.store.put_policy(&policy) {
        Ok(()) => ApiResponse::ok(policy).into_response(),
        Err(e) => error_response(&e.to_string(), StatusCode::INTERNAL_SERVER_ERROR).into_response(),
    }
}

// ── Decisions ──────────────────────────────────────────────────────

#[derive(Deserialize)]
pub struct DecisionsQuery {
    #[serde(default = "default_limit")]
    pub limit: usize,
}

fn default_limit() -> usize {
    50
}

/// GET /api/v1/queues/:queue/decisions
pub async fn list_decisions(
    State(state): State<ApiState>,
    Path(queue): Path<String>,
    Query(query): Query<DecisionsQuery>,
) -> impl IntoResponse {
    match state.store.list_decisions(&queue, query.limit) {
        Ok(decisions) => ApiResponse::ok(decisions).into_response(),
        Err(e) => error_response(&e.to_string(), StatusCode::INTERNAL_SERVER_ERROR).into_response(),
    }
}

// ── Workers ────────────────────────────────────────────────────────

/// GET /api/v1/queues/:queue/workers
pub async fn list_workers(
    State(state): State<ApiState>,
    Path(queue): Path<String>,
) -> impl IntoResponse {
    match state.store.list_workers_for_queue(&queue) {
        Ok(workers) => ApiResponse::ok(workers).into_response(),
        Err(e) => error_response(&e.to_string(), StatusCode::INTERNAL_SERVER_ERROR).into_response(),
    }
}

/// Manual recycle body.
#[derive(Deserialize)]
pub struct RecycleRequest {
    pub reason: String,
    #[serde(default = "default_graceful")]
    pub graceful: bool,
}

fn default_graceful() -> bool {
    true
}

/// POST /api/v1/queues/:queue/workers/:id/recycle
pub async fn recycle_worker(
    State(state): State<ApiState>,
    Path((queue, worker_id)): Path<(String, String)>,
    Json(req): Json<RecycleRequest>,
) -> impl IntoResponse {
    match state
        .lifecycle
        .recycle(&queue, &worker_id, &req.reason, req.graceful)
        .await
    {
        Ok(()) => ApiResponse::ok("recycling").into_response(),
        Err(e @ LifecycleError::WorkerNotFound { .. }) => {
            error_response(&e.to_string(), StatusCode::NOT_FOUND).into_response()
        }
        Err(e @ LifecycleError::ReasonRequired) => {
            error_response(&e.to_string(), StatusCode::BAD_REQUEST).into_response()
        }
        Err(e) => error_response(&e.to_string(), StatusCode::INTERNAL_SERVER_ERROR).into_response(),
    }
}

// ── Queue commands ─────────────────────────────────────────────────

/// POST /api/v1/queues/:queue/pause
pub async fn pause_queue(
    State(state): State<ApiState>,
    Path(queue): Path<String>,
) -> impl IntoResponse {
    match state.controller.pause(&queue).await {
        Ok(()) => ApiResponse::ok("paused").into_response(),
        Err(e) => command_error_response(e),
    }
}

/// POST /api/v1/queues/:queue/resume
pub async fn resume_queue(
    State(state): State<ApiState>,
    Path(queue): Path<String>,
) -> impl IntoResponse {
    match state.controller.resume(&queue).await {
        Ok(()) => ApiResponse::ok("resumed").into_response(),
        Err(e) => command_error_response(e),
    }
}

/// Clean command body.
#[derive(Deserialize)]
pub struct CleanRequest {
    pub status: JobStatus,
    pub grace_ms: u64,
    pub limit: usize,
}

/// POST /api/v1/queues/:queue/clean
pub async fn clean_queue(
    State(state): State<ApiState>,
    Path(queue): Path<String>,
    Json(req): Json<CleanRequest>,
) -> impl IntoResponse {
    match state
        .controller
        .clean(&queue, req.status, req.grace_ms, req.limit)
        .await
    {
        Ok(removed) => ApiResponse::ok(serde_json::json!({ "removed": removed })).into_response(),
        Err(e) => command_error_response(e),
    }
}

/// Retry-failed command body.
#[derive(Deserialize)]
pub struct RetryRequest {
    pub limit: usize,
}

/// POST /api/v1/queues/:queue/retry-failed
pub async fn retry_failed(
    State(state): State<ApiState>,
    Path(queue): Path<String>,
    Json(req): Json<RetryRequest>,
) -> impl IntoResponse {
    match state.controller.retry_failed(&queue, req.limit).await {
        Ok(report) => ApiResponse::ok(report).into_response(),
        Err(e) => command_error_response(e),
    }
}

// ── Rate limiters ──────────────────────────────────────────────────

/// GET /api/v1/limiters
pub async fn list_limiters(State(state): State<ApiState>) -> impl IntoResponse {
    ApiResponse::ok(state.limiter.limiter_names()).into_response()
}

/// GET /api/v1/limiters/:name
pub async fn limiter_status(
    State(state): State<ApiState>,
    Path(name): Path<String>,
) -> impl IntoResponse {
    match state.limiter.status(&name) {
        Ok(status) => ApiResponse::ok(status).into_response(),
        Err(e) => error_response(&e.to_string(), StatusCode::NOT_FOUND).into_response(),
    }
}

// ── Alerts ─────────────────────────────────────────────────────────

/// GET /api/v1/alerts
pub async fn list_alerts(State(state): State<ApiState>) -> impl IntoResponse {
    match state.store.list_alerts() {
        Ok(alerts) => ApiResponse::ok(alerts).into_response(),
        Err(e) => error_response(&e.to_string(), StatusCode::INTERNAL_SERVER_ERROR).into_response(),
    }
}

/// Acknowledge body.
#[derive(Deserialize)]
pub struct AckRequest {
    pub actor: String,
    #[serde(default)]
    pub notes: Option<String>,
}

/// POST /api/v1/alerts/:id/ack
pub async fn acknowledge_alert(
    State(state): State<ApiState>,
    Path(alert_id): Path<String>,
    Json(req): Json<AckRequest>,
) -> impl IntoResponse {
    match state
        .alerts
        .acknowledge(&alert_id, &req.actor, req.notes, epoch_secs())
    {
        Ok(alert) => ApiResponse::ok(alert).into_response(),
        Err(e @ jobgrid_alert::AlertError::NotFound(_)) => {
            error_response(&e.to_string(), StatusCode::NOT_FOUND).into_response()
        }
        Err(e) => error_response(&e.to_string(), StatusCode::INTERNAL_SERVER_ERROR).into_response(),
    }
}

// ── Alert rules ────────────────────────────────────────────────────

/// GET /api/v1/rules
pub async fn list_rules(State(state): State<ApiState>) -> impl IntoResponse {
    match state.store.list_alert_rules() {
        Ok(rules) => ApiResponse::ok(rules).into_response(),
        Err(e) => error_response(&e.to_string(), StatusCode::INTERNAL_SERVER_ERROR).into_response(),
    }
}

/// Rule create/update body.
#[derive(Deserialize)]
pub struct RuleRequest {
    pub metric: jobgrid_state::AlertMetric,
    #[serde(default)]
    pub warning: Option<f64>,
    #[serde(default)]
    pub critical: Option<f64>,
    #[serde(default)]
    pub urgent: Option<f64>,
    pub period_secs: u64,
}

/// PUT /api/v1/rules/:alert_type
pub async fn put_rule(
    State(state): State<ApiState>,
    Path(alert_type): Path<String>,
    Json(req): Json<RuleRequest>,
) -> impl IntoResponse {
    let rule = AlertRule {
        alert_type,
        metric: req.metric,
        warning: req.warning,
        critical: req.critical,
        urgent: req.urgent,
        period_secs: req.period_secs,
    };

    if let Err(e) = validate_alert_rule(&rule) {
        return error_response(&e.to_string(), StatusCode::BAD_REQUEST).into_response();
    }
    match state.store.put_alert_rule(&rule) {
        Ok(()) => ApiResponse::ok(rule).into_response(),
        Err(e) => error_response(&e.to_string(), StatusCode::INTERNAL_SERVER_ERROR).into_response(),
    }
}

/// Current Unix epoch in seconds.
fn epoch_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
