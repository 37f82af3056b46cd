//! # gmx-api: Marketplace Order Service
//!
//! The HTTP service for the GMX marketplace order lifecycle, built on
//! Axum/Tower/Tokio. Handlers are thin: they validate the request, resolve
//! the caller and hand off to [`engine::OrderEngine`], which owns every
//! state change.
//!
//! ## Routes
//!
//! - `/v1/orders/*`: checkout, payment, delivery, confirmation, cancellation
//! - `/v1/orders/{id}/dispute`, `/v1/orders/{id}/review`: buyer filings
//! - `/v1/admin/*`: verdicts, review moderation, bans, audit log
//! - `/openapi.json`: generated OpenAPI document
//! - `/health/*`, `/metrics`: unauthenticated health checks and scrape endpoint
//!
//! ## Middleware Stack (Tower)
//!
//! TraceLayer → MetricsMiddleware → AuthMiddleware → Handler
//!
//! ## Background Work
//!
//! [`worker::AutoCompleteWorker`] periodically completes delivered orders
//! whose buyer-protection window has run out.
//!
//! ## Crate Policy
//!
//! - Sits at the top of the dependency DAG.
//! - No business rules in route handlers; they live in `gmx-state` and
//!   `gmx-arbitration` and are sequenced by the engine.
//! - All errors map to structured HTTP responses via `AppError`.

pub mod auth;
pub mod config;
pub mod engine;
pub mod error;
pub mod extractors;
pub mod middleware;
pub mod notify;
pub mod openapi;
pub mod routes;
pub mod state;
pub mod store;
pub mod worker;

use axum::extract::{DefaultBodyLimit, State};
use axum::http::StatusCode;
use axum::middleware::from_fn;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Extension, Router};
use tower_http::trace::TraceLayer;

use crate::auth::AuthConfig;

pub use config::AppConfig;
pub use engine::{EngineError, OrderEngine};
pub use error::AppError;
pub use state::AppState;

/// Request bodies above this size are rejected before deserialization.
const MAX_BODY_BYTES: usize = 256 * 1024;

/// Assemble the full application router with all routes and middleware.
///
/// Health checks and `/metrics` are mounted outside the auth middleware so
/// they stay reachable without credentials.
pub fn app(state: AppState) -> Router {
    let auth_config = AuthConfig {
        token: state.config.auth_token.clone(),
    };

    // Outermost → innermost: TraceLayer → metrics → auth → handler.
    let mut api = Router::new()
        .merge(routes::orders::router())
        .merge(routes::disputes::router())
        .merge(routes::reviews::router())
        .merge(routes::admin::router())
        .merge(openapi::router())
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(from_fn(auth::auth_middleware));

    if state.config.metrics_enabled {
        api = api.layer(from_fn(middleware::metrics::metrics_middleware));
    }

    let api = api
        .layer(TraceLayer::new_for_http())
        .layer(Extension(auth_config))
        .with_state(state.clone());

    let mut unauthenticated = Router::new()
        .route("/health/liveness", get(liveness))
        .route("/health/readiness", get(readiness));

    if state.config.metrics_enabled {
        unauthenticated = unauthenticated.route("/metrics", get(prometheus_metrics));
    }

    let unauthenticated = unauthenticated.with_state(state);

    Router::new().merge(unauthenticated).merge(api)
}

/// Liveness check. The process is up.
async fn liveness() -> &'static str {
    "ok"
}

/// Readiness check. Returns 200 "ready", or 503 when the store is
/// unreachable.
async fn readiness(State(state): State<AppState>) -> impl IntoResponse {
    if let Err(e) = state.engine.ping().await {
        tracing::warn!(error = %e, "store health check failed");
        return (StatusCode::SERVICE_UNAVAILABLE, "store unreachable").into_response();
    }
    (StatusCode::OK, "ready").into_response()
}

/// GET /metrics: Prometheus text exposition.
async fn prometheus_metrics(State(state): State<AppState>) -> impl IntoResponse {
    match &state.metrics {
        Some(handle) => (StatusCode::OK, handle.render()).into_response(),
        None => (StatusCode::SERVICE_UNAVAILABLE, "metrics recorder not installed").into_response(),
    }
}
