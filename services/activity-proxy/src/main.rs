//! Activity proxy
//!
//! Single-binary backend for the activity frontend that:
//! 1. Holds the upstream OAuth token (client credentials or authorization code)
//! 2. Proxies activity requests and filters them by type and subject
//! 3. Keeps per-activity deposit status flags in memory

mod activities;
mod auth;
mod config;
mod cors;
mod deposits;
mod error;
mod metrics;
mod upstream;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{any, get, post};
use axum::{Json, Router};
use chrono::Utc;
use metrics_exporter_prometheus::PrometheusHandle;
use serde_json::{Value, json};
use tokio::net::TcpListener;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use activity_filter::FilterMode;
use deposit_store::DepositStore;
use upstream_auth::{AuthFlow, PendingStates, TokenProvider};

use crate::config::Config;
use crate::cors::CorsPolicy;
use crate::upstream::Upstream;

/// How long in-flight requests may take to finish after a shutdown signal
const DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Shared application state accessible from all handlers
#[derive(Clone)]
struct AppState {
    tokens: Arc<TokenProvider>,
    pending_states: Arc<PendingStates>,
    deposits: Arc<DepositStore>,
    upstream: Upstream,
    filter_mode: FilterMode,
    /// Redirect target of `/auth/callback`
    frontend_url: String,
    prometheus: PrometheusHandle,
}

/// Build the axum router with all routes and shared state.
///
/// Only the auth routes of the configured flow are mounted. Other methods on
/// the activity paths fall through to the generic forward. Trailing-slash
/// variants of the activity paths are routed to the same filtered handlers.
fn build_router(state: AppState, cors: CorsPolicy, max_connections: usize) -> Router {
    let router: Router<AppState> = Router::new()
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .route("/auth/status", get(auth::status))
        .route("/auth/logout", post(auth::logout));

    let router = match state.tokens.flow() {
        AuthFlow::AuthorizationCode => router
            .route("/auth/url", get(auth::authorization_url))
            .route("/auth/callback", get(auth::callback)),
        AuthFlow::ClientCredentials => router.route("/auth/test", get(auth::test_connection)),
    };

    router
        .route(
            "/api/activity-deposits",
            get(deposits::get_status).put(deposits::set_status),
        )
        .route(
            "/api/v3/activities",
            get(activities::list).fallback(activities::forward),
        )
        .route(
            "/api/v3/activities/",
            get(activities::list).fallback(activities::forward),
        )
        .route(
            "/api/v3/activities/{id}",
            get(activities::get_one).fallback(activities::forward),
        )
        .route(
            "/api/v3/activities/{id}/",
            get(activities::get_one).fallback(activities::forward),
        )
        .route("/api/{*path}", any(activities::forward))
        .fallback(not_found)
        .layer(axum::middleware::from_fn(metrics::track_requests))
        .layer(axum::middleware::from_fn_with_state(cors, cors::apply))
        .layer(tower::limit::ConcurrencyLimitLayer::new(max_connections))
        .with_state(state)
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with JSON output and LOG_LEVEL / RUST_LOG support
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_env("LOG_LEVEL")
                .or_else(|_| EnvFilter::try_from_default_env())
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    info!("starting activity-proxy");

    // Install Prometheus metrics recorder before any metrics are emitted
    let prometheus =
        metrics::install_recorder().context("failed to install Prometheus recorder")?;

    // CLI: simple --config flag parsing
    let args: Vec<String> = std::env::args().collect();
    let cli_config_path = args
        .iter()
        .position(|a| a == "--config")
        .and_then(|i| args.get(i + 1))
        .map(|s| s.as_str());

    let config_path = Config::resolve_path(cli_config_path);
    info!(path = %config_path.display(), "loading configuration");

    let config = Config::load(&config_path)
        .with_context(|| format!("failed to load config from {}", config_path.display()))?;

    info!(
        listen_addr = %config.server.listen_addr,
        flow = config.oauth.flow.as_str(),
        filter_mode = config.upstream.filter_mode.as_str(),
        upstream_url = %config.upstream.base_url,
        "configuration loaded"
    );

    let cors = CorsPolicy::new(config.allowed_origins());
    let Config {
        server,
        oauth,
        upstream,
    } = config;

    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(server.timeout_secs))
        .build()
        .context("failed to build HTTP client")?;

    let app_state = AppState {
        tokens: Arc::new(TokenProvider::new(client.clone(), oauth)),
        pending_states: Arc::new(PendingStates::default()),
        deposits: Arc::new(DepositStore::new()),
        upstream: Upstream::new(client, &upstream.base_url)?,
        filter_mode: upstream.filter_mode,
        frontend_url: server.frontend_url,
        prometheus,
    };

    let app = build_router(app_state, cors, server.max_connections);

    let listener = TcpListener::bind(server.listen_addr)
        .await
        .with_context(|| format!("failed to bind to {}", server.listen_addr))?;
    info!(addr = %server.listen_addr, "accepting requests");

    // The drain deadline starts when the signal arrives, not at startup:
    // the server is told to drain, then the drain races DRAIN_TIMEOUT.
    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();

    let server_handle = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async {
                let _ = shutdown_rx.await;
            })
            .await
    });

    shutdown_signal().await;
    let _ = shutdown_tx.send(());

    match tokio::time::timeout(DRAIN_TIMEOUT, server_handle).await {
        Ok(Ok(Ok(()))) => {
            info!("all in-flight requests drained");
        }
        Ok(Ok(Err(e))) => {
            error!(error = %e, "server error during shutdown");
        }
        Ok(Err(e)) => {
            error!(error = %e, "server task panicked");
        }
        Err(_) => {
            warn!(
                drain_timeout_secs = DRAIN_TIMEOUT.as_secs(),
                "drain timeout exceeded, forcing shutdown"
            );
        }
    }

    info!("shutdown complete");
    Ok(())
}

/// GET /health
async fn health_handler(State(state): State<AppState>) -> Json<Value> {
    let status = state.tokens.status().await;
    Json(json!({
        "status": "OK",
        "timestamp": Utc::now(),
        "authenticated": status.authenticated,
    }))
}

/// Prometheus metrics endpoint in text exposition format.
async fn metrics_handler(State(state): State<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(
            axum::http::header::CONTENT_TYPE,
            "text/plain; version=0.0.4; charset=utf-8",
        )],
        state.prometheus.render(),
    )
}

async fn not_found() -> impl IntoResponse {
    (
        StatusCode::NOT_FOUND,
        Json(json!({ "error": "Route not found" })),
    )
}

/// Wait for SIGTERM or SIGINT for graceful shutdown.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received SIGINT, shutting down"),
        _ = terminate => info!("received SIGTERM, shutting down"),
    }
}
