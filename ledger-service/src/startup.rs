//! Application startup and lifecycle management.

use crate::config::Config;
use crate::handlers;
use crate::services::{get_metrics, init_metrics, Database};
use axum::{
    http::StatusCode,
    middleware::from_fn,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use secrecy::ExposeSecret;
use serde_json::json;
use service_core::error::AppError;
use service_core::middleware::request_id_middleware;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub db: Database,
    pub config: Config,
}

/// Health check endpoint for Docker/K8s liveness probes.
async fn health_check() -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(json!({
            "status": "ok",
            "service": "ledger-service",
            "version": env!("CARGO_PKG_VERSION")
        })),
    )
}

/// Readiness check endpoint for K8s readiness probes.
async fn readiness_check(
    axum::extract::State(state): axum::extract::State<AppState>,
) -> Result<impl IntoResponse, AppError> {
    state.db.health_check().await?;
    Ok((StatusCode::OK, Json(json!({ "status": "ready" }))))
}

/// Prometheus metrics endpoint.
async fn metrics_endpoint() -> impl IntoResponse {
    (
        StatusCode::OK,
        [("content-type", "text/plain; charset=utf-8")],
        get_metrics(),
    )
}

/// Build the API router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/companies", post(handlers::create_company))
        .route(
            "/tax-rates",
            post(handlers::create_tax_rate).get(handlers::list_tax_rates),
        )
        .route("/tax-rates/:tax_rate_id", get(handlers::get_tax_rate))
        .route("/invoices", post(handlers::create_invoice))
        .route("/invoices/unpaid", get(handlers::list_unpaid_invoices))
        .route("/invoices/:invoice_id", get(handlers::get_invoice))
        .route("/invoices/:invoice_id/issue", post(handlers::issue_invoice))
        .route("/invoices/:invoice_id/send", post(handlers::send_invoice))
        .route(
            "/invoices/:invoice_id/outstanding",
            get(handlers::get_outstanding),
        )
        .route("/payments", post(handlers::create_payment))
        .route("/payments/:payment_id", get(handlers::get_payment))
        .route("/payments/:payment_id/allocations", post(handlers::allocate))
        .route(
            "/payments/:payment_id/remaining",
            get(handlers::get_remaining),
        )
        .route(
            "/allocations/:allocation_id",
            axum::routing::delete(handlers::remove_allocation),
        )
        .route("/health", get(health_check))
        .route("/ready", get(readiness_check))
        .route("/metrics", get(metrics_endpoint))
        .layer(from_fn(request_id_middleware))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Application container for managing server lifecycle.
pub struct Application {
    port: u16,
    listener: TcpListener,
    state: AppState,
}

impl Application {
    /// Build the application with the given configuration.
    pub async fn build(config: Config) -> Result<Self, AppError> {
        let db = Database::new(
            config.database.url.expose_secret(),
            config.database.max_connections,
            config.database.min_connections,
        )
        .await?;

        db.run_migrations().await?;

        init_metrics();

        let address = format!("{}:{}", config.server.host, config.server.port);
        let listener = TcpListener::bind(&address).await?;
        let port = listener.local_addr()?.port();

        tracing::info!(address = %address, port = port, "ledger-service listening");

        Ok(Self {
            port,
            listener,
            state: AppState { db, config },
        })
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Run the HTTP server until shutdown.
    pub async fn run_until_stopped(self) -> Result<(), AppError> {
        let app = router(self.state);
        axum::serve(self.listener, app)
            .await
            .map_err(|e| AppError::InternalError(anyhow::anyhow!("Server error: {}", e)))?;
        Ok(())
    }
}
