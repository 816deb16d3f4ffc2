//! # dealpipe HTTP API Module
//!
//! This module implements the HTTP REST API server using axum.
//!
//! ## Endpoints
//!
//! - `GET /pipeline-stages` - Active stages in pipeline order
//! - `GET /pipeline-stages/all` - Every stage, inactive included (admin)
//! - `POST /pipeline-stages` - Create a stage (admin)
//! - `PUT /pipeline-stages/order` - Reorder active stages (admin)
//! - `PUT /pipeline-stages/{id}` - Update a stage (admin)
//! - `DELETE /pipeline-stages/{id}` - Deactivate a stage (admin)
//! - `GET /deals` - List deals (`?stage_id=`, `?orphaned=true`)
//! - `POST /deals` - Create a deal
//! - `GET /deals/{id}` - Fetch a deal
//! - `PUT /deals/{id}` - Move or update a deal (owner or admin)
//! - `DELETE /deals/{id}` - Delete a deal (owner or admin)
//! - `GET /health` - Health check
//!
//! ## Configuration (Environment Variables)
//!
//! - `DEALPIPE_CORS_ORIGINS`: Comma-separated list of allowed origins, or "*" for all (default: localhost only)
//! - `DEALPIPE_RATE_LIMIT`: Requests per second per caller (default: 100, 0 to disable)

mod auth;
mod error;
mod handlers;
mod middleware;
mod types;

pub use auth::{Caller, IdentityResolver, StaticSessions};
pub use error::ApiError;
pub use middleware::{create_rate_limiter, get_rate_limit_from_env};
pub use types::{
    CreateDealRequest, CreateStageRequest, DealJson, DealListQuery, ErrorResponse,
    HealthResponse, MessageResponse, ReorderStagesRequest, UpdateDealRequest, UpdateStageRequest,
};

use crate::AppError;
use axum::{
    Router,
    extract::DefaultBodyLimit,
    http::{HeaderValue, Method, header},
    middleware as axum_middleware,
    routing::{get, put},
};
use dealpipe_core::{DealEngine, RecordStore, StageRegistry};
use std::net::SocketAddr;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Request bodies above this size are rejected before deserialization.
const MAX_BODY_BYTES: usize = 256 * 1024;

// =============================================================================
// SERVER STATE
// =============================================================================

/// Shared server state. Holds handles only; all data lives in the store.
#[derive(Clone)]
pub struct AppState {
    pub stages: StageRegistry,
    pub deals: DealEngine,
    pub identities: Arc<dyn IdentityResolver>,
}

impl AppState {
    /// Wire the registry and engine over one shared store.
    #[must_use]
    pub fn new(store: Arc<dyn RecordStore>, identities: Arc<dyn IdentityResolver>) -> Self {
        let stages = StageRegistry::new(store.clone());
        let deals = DealEngine::new(store, stages.clone());
        Self {
            stages,
            deals,
            identities,
        }
    }
}

// =============================================================================
// CORS CONFIGURATION
// =============================================================================

/// Origins served when `DEALPIPE_CORS_ORIGINS` is unset or unusable.
const LOCAL_ORIGINS: [&str; 4] = [
    "http://localhost:3000",
    "http://localhost:8080",
    "http://127.0.0.1:3000",
    "http://127.0.0.1:8080",
];

/// Parse a comma-separated origin list, dropping blanks and malformed entries.
fn parse_origins(list: &str) -> Vec<HeaderValue> {
    list.split(',')
        .map(str::trim)
        .filter(|origin| !origin.is_empty())
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::warn!(origin, error = %e, "ignoring malformed CORS origin");
                None
            }
        })
        .collect()
}

/// CORS for an explicit origin list. Browsers may send the bearer token.
fn origin_cors(origins: Vec<HeaderValue>) -> CorsLayer {
    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
}

/// CORS policy from `DEALPIPE_CORS_ORIGINS`: `*`, a list, or local origins.
fn build_cors_layer() -> CorsLayer {
    let configured = std::env::var("DEALPIPE_CORS_ORIGINS").ok();
    if configured.as_deref() == Some("*") {
        tracing::warn!("CORS open to every origin");
        return CorsLayer::permissive();
    }

    let origins = configured.as_deref().map(parse_origins).unwrap_or_default();
    if origins.is_empty() {
        tracing::info!(origins = ?LOCAL_ORIGINS, "CORS limited to local origins");
        return origin_cors(parse_origins(&LOCAL_ORIGINS.join(",")));
    }
    tracing::info!(count = origins.len(), "CORS origins configured");
    origin_cors(origins)
}

// =============================================================================
// ROUTER CREATION
// =============================================================================

/// Create the axum router with all endpoints and middleware.
///
/// Middleware stack (outer to inner):
/// 1. Tracing - logs all requests
/// 2. CORS - handles preflight requests
/// 3. Body limit
/// 4. Identity resolution - attaches the [`Caller`]
/// 5. Rate limiting - keyed by user, or by peer address when anonymous
///    (if enabled)
pub fn create_router(state: AppState) -> Router {
    let rate_limit = get_rate_limit_from_env();

    let mut router = Router::new()
        .route("/health", get(handlers::health_handler))
        .route(
            "/pipeline-stages",
            get(handlers::list_stages_handler).post(handlers::create_stage_handler),
        )
        .route("/pipeline-stages/all", get(handlers::list_all_stages_handler))
        .route("/pipeline-stages/order", put(handlers::reorder_stages_handler))
        .route(
            "/pipeline-stages/{id}",
            put(handlers::update_stage_handler).delete(handlers::deactivate_stage_handler),
        )
        .route(
            "/deals",
            get(handlers::list_deals_handler).post(handlers::create_deal_handler),
        )
        .route(
            "/deals/{id}",
            get(handlers::get_deal_handler)
                .put(handlers::update_deal_handler)
                .delete(handlers::delete_deal_handler),
        );

    // Rate limiting sits inside identity resolution so it can key on the caller.
    if rate_limit > 0 {
        tracing::info!("Rate limiting enabled: {} requests/second per caller", rate_limit);
        router = router.layer(axum_middleware::from_fn_with_state(
            create_rate_limiter(rate_limit),
            middleware::rate_limit_middleware,
        ));
    } else {
        tracing::info!("Rate limiting disabled");
    }

    router
        .layer(axum_middleware::from_fn_with_state(
            state.identities.clone(),
            auth::identity_middleware,
        ))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(build_cors_layer())
                .layer(DefaultBodyLimit::max(MAX_BODY_BYTES)),
        )
        .with_state(state)
}

// =============================================================================
// SERVER STARTUP
// =============================================================================

/// Start the HTTP server.
pub async fn run_server(addr: &str, state: AppState) -> Result<(), AppError> {
    let router = create_router(state);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| AppError::Io(format!("Bind failed: {}", e)))?;

    tracing::info!("dealpipe HTTP server listening on {}", addr);

    axum::serve(
        listener,
        router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
        .map_err(|e| AppError::Io(format!("Server error: {}", e)))
}
