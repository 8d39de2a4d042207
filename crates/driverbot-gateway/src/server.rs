//! HTTP server implementation using Axum.

use std::future::Future;
use std::sync::Arc;

use axum::response::IntoResponse;
use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    routing::{get, post, put},
};
use driverbot_core::config::GatewayConfig;
use driverbot_scheduler::PollDriver;
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Shared state for the gateway server.
#[derive(Clone)]
pub struct AppState {
    pub gateway_config: GatewayConfig,
    pub start_time: std::time::Instant,
    /// `None` leaves the admin API open.
    pub admin_token: Option<String>,
    /// Poll driver; its coordinator owns the store, snapshot and writer.
    pub driver: Arc<PollDriver>,
}

impl AppState {
    pub fn new(gateway_config: GatewayConfig, driver: Arc<PollDriver>) -> Self {
        let admin_token = Some(gateway_config.admin_token.trim().to_string()).filter(|t| !t.is_empty());
        Self {
            gateway_config,
            start_time: std::time::Instant::now(),
            admin_token,
            driver,
        }
    }
}

/// Admin token auth middleware: validates X-Admin-Token header or ?token= query.
async fn require_admin(
    State(state): State<Arc<AppState>>,
    req: axum::http::Request<axum::body::Body>,
    next: axum::middleware::Next,
) -> axum::response::Response {
    let Some(expected) = &state.admin_token else {
        return next.run(req).await;
    };

    let from_header = req
        .headers()
        .get("X-Admin-Token")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");
    if from_header == expected {
        return next.run(req).await;
    }

    if let Some(query) = req.uri().query()
        && query
            .split('&')
            .filter_map(|pair| pair.strip_prefix("token="))
            .any(|token| token == expected)
    {
        return next.run(req).await;
    }

    (
        StatusCode::UNAUTHORIZED,
        Json(serde_json::json!({"ok": false, "error": "Unauthorized — invalid or missing admin token"})),
    )
        .into_response()
}

/// Build the Axum router with all routes.
pub fn build_router(state: AppState) -> Router {
    build_router_from_arc(Arc::new(state))
}

pub fn build_router_from_arc(shared: Arc<AppState>) -> Router {
    // Protected routes: require the admin token
    let protected = Router::new()
        .route(
            "/api/v1/state",
            get(super::routes::get_state).post(super::routes::update_state),
        )
        .route("/api/v1/broadcast", post(super::routes::queue_broadcast))
        .route("/api/v1/scheduled", post(super::routes::add_scheduled))
        .route("/api/v1/weekly", put(super::routes::set_weekly))
        .route("/api/v1/groups/{id}", post(super::routes::update_group))
        .route("/api/v1/tick", post(super::routes::manual_tick))
        .route("/api/v1/deliveries", get(super::routes::list_deliveries))
        .route_layer(axum::middleware::from_fn_with_state(
            shared.clone(),
            require_admin,
        ));

    // Public routes: no auth
    let public = Router::new().route("/health", get(super::routes::health_check));

    protected
        .merge(public)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors_layer()),
        )
        .with_state(shared)
}

fn cors_layer() -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_methods([
            axum::http::Method::GET,
            axum::http::Method::POST,
            axum::http::Method::PUT,
            axum::http::Method::OPTIONS,
        ])
        .allow_headers(Any)
        .max_age(std::time::Duration::from_secs(3600));

    // Example: DRIVERBOT_CORS_ORIGINS=https://admin.example.com
    if let Ok(origins_str) = std::env::var("DRIVERBOT_CORS_ORIGINS") {
        let origins: Vec<_> = origins_str
            .split(',')
            .filter_map(|s| s.trim().parse::<axum::http::HeaderValue>().ok())
            .collect();
        cors.allow_origin(origins)
    } else {
        cors.allow_origin(Any)
    }
}

/// Start the HTTP server; returns once `shutdown` resolves and open
/// requests have drained.
pub async fn start(
    state: AppState,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> anyhow::Result<()> {
    let addr = format!("{}:{}", state.gateway_config.host, state.gateway_config.port);
    if state.admin_token.is_none() {
        tracing::warn!("⚠️ No admin token configured, admin API is open");
    }
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("🌐 Admin API listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;
    Ok(())
}
