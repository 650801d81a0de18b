//! jobgrid-api — REST API for the JobGrid control plane.
//!
//! Provides axum route handlers over the state store, the rate limiter,
//! the alert engine, the worker lifecycle manager, and the queue
//! controller. Policy and alert-rule writes are validated field-by-field
//! before they reach the store; runtime failures never block the read
//! endpoints.
//!
//! # API Routes
//!
//! | Method | Path | Description |
//! |---|---|---|
//! | GET | `/api/v1/policies` | List scaling policies |
//! | PUT | `/api/v1/policies/{queue}` | Create/replace a policy (validated) |
//! | GET | `/api/v1/policies/{queue}` | Get one policy |
//! | GET | `/api/v1/queues/{queue}/decisions` | Recent applied decisions |
//! | GET | `/api/v1/queues/{queue}/workers` | Worker records |
//! | POST | `/api/v1/queues/{queue}/workers/{id}/recycle` | Manual recycle |
//! | POST | `/api/v1/queues/{queue}/pause` | Pause dispatch |
//! | POST | `/api/v1/queues/{queue}/resume` | Resume dispatch |
//! | POST | `/api/v1/queues/{queue}/clean` | Remove old jobs |
//! | POST | `/api/v1/queues/{queue}/retry-failed` | Retry failed jobs |
//! | GET | `/api/v1/limiters` | Rate limiter names |
//! | GET | `/api/v1/limiters/{name}` | Per-window limiter status |
//! | GET | `/api/v1/alerts` | List alerts |
//! | POST | `/api/v1/alerts/{id}/ack` | Acknowledge an alert |
//! | GET | `/api/v1/rules` | List alert rules |
//! | PUT | `/api/v1/rules/{alert_type}` | Create/replace a rule (validated) |

pub mod handlers;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post, put};

use jobgrid_alert::AlertEngine;
use jobgrid_queue::QueueController;
use jobgrid_ratelimit::RateLimiter;
use jobgrid_state::StateStore;
use jobgrid_worker::WorkerLifecycleManager;

/// Shared state for API handlers.
#[derive(Clone)]
pub struct ApiState {
    pub store: StateStore,
    pub limiter: Arc<RateLimiter>,
    pub alerts: Arc<AlertEngine>,
    pub lifecycle: WorkerLifecycleManager,
    pub controller: QueueController,
}

/// Build the complete API router.
pub fn build_router(state: ApiState) -> Router {
    let api_routes = Router::new()
        .route(
            "/policies",
            get(handlers::list_policies),
        )
        .route(
            "/policies/{queue}",
            get(handlers::get_policy).put(handlers::put_policy),
        )
        .route("/queues/{queue}/decisions", get(handlers::list_decisions))
        .route("/queues/{queue}/workers", get(handlers::list_workers))
        .route(
            "/queues/{queue}/workers/{id}/recycle",
            post(handlers::recycle_worker),
        )
        .route("/queues/{queue}/pause", post(handlers::pause_queue))
        .route("/queues/{queue}/resume", post(handlers::resume_queue))
        .route("/queues/{queue}/clean", post(handlers::clean_queue))
        .route(
            "/queues/{queue}/retry-failed",
            post(handlers::retry_failed),
        )
        .route("/limiters", get(handlers::list_limiters))
        .route("/limiters/{name}", get(handlers::limiter_status))
        .route("/alerts", get(handlers::list_alerts))
        .route("/alerts/{id}/ack", post(handlers::acknowledge_alert))
        .route("/rules", get(handlers::list_rules))
        .route("/rules/{alert_type}", put(handlers::put_rule))
        .with_state(state);

    Router::new().nest("/api/v1", api_routes)
}
