//! Application startup and lifecycle management.

use crate::config::PayoutConfig;
use crate::handlers;
use crate::services::{StripeApi, StripeClient};
use axum::{
    middleware::{from_fn, from_fn_with_state},
    routing::{get, post},
    Router,
};
use service_core::error::AppError;
use service_core::middleware::{
    cors::{cors_headers_middleware, CorsPolicy},
    metrics::metrics_middleware,
    tracing::{request_id_middleware, REQUEST_ID_HEADER},
};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<PayoutConfig>,
    pub stripe: Arc<dyn StripeApi>,
}

/// Application container for managing server lifecycle.
pub struct Application {
    http_port: u16,
    listener: TcpListener,
    router: Router,
}

impl Application {
    /// Build the application with the given configuration.
    pub async fn build(config: PayoutConfig) -> Result<Self, AppError> {
        let stripe = StripeClient::new(config.stripe.clone()).map_err(|e| {
            tracing::error!("Failed to create Stripe HTTP client: {}", e);
            AppError::InternalError(e)
        })?;

        if stripe.is_configured() {
            tracing::info!(
                mode = config.stripe.mode().as_str(),
                api_base_url = %config.stripe.api_base_url,
                "Stripe client initialized"
            );
        } else {
            tracing::warn!(
                "STRIPE_SECRET_KEY not configured - reconciliation requests will fail until it is set"
            );
        }

        Self::build_with_provider(config, Arc::new(stripe)).await
    }

    /// Build the application around an existing provider client.
    pub async fn build_with_provider(
        config: PayoutConfig,
        stripe: Arc<dyn StripeApi>,
    ) -> Result<Self, AppError> {
        let http_addr = SocketAddr::from(([0, 0, 0, 0], config.common.port));
        let listener = TcpListener::bind(http_addr).await.map_err(|e| {
            tracing::error!("Failed to bind HTTP listener to {}: {}", http_addr, e);
            AppError::from(e)
        })?;
        let http_port = listener.local_addr()?.port();

        tracing::info!("Payout service: HTTP on port {}", http_port);

        let state = AppState {
            config: Arc::new(config),
            stripe,
        };

        Ok(Self {
            http_port,
            listener,
            router: router(state),
        })
    }

    /// Get the HTTP port the server is listening on.
    pub fn http_port(&self) -> u16 {
        self.http_port
    }

    /// Run the application until stopped.
    pub async fn run_until_stopped(self) -> std::io::Result<()> {
        axum::serve(self.listener, self.router).await.map_err(|e| {
            tracing::error!("HTTP server error: {}", e);
            std::io::Error::other(format!("HTTP server error: {}", e))
        })
    }
}

pub fn router(state: AppState) -> Router {
    let api = Router::new()
        .route(
            "/api/stripe/verify-balance",
            post(handlers::stripe::verify_balance)
                .options(handlers::preflight)
                .fallback(handlers::method_not_allowed),
        )
        .route(
            "/api/stripe/verify-payouts",
            post(handlers::stripe::verify_payouts)
                .options(handlers::preflight)
                .fallback(handlers::method_not_allowed),
        )
        .route(
            "/api/stripe/list-payouts",
            post(handlers::stripe::list_payouts)
                .options(handlers::preflight)
                .fallback(handlers::method_not_allowed),
        )
        .layer(from_fn_with_state(
            CorsPolicy::for_method("POST"),
            cors_headers_middleware,
        ));

    let ops = Router::new()
        .route(
            "/health",
            get(handlers::health_check)
                .options(handlers::preflight)
                .fallback(handlers::get_method_not_allowed),
        )
        .route(
            "/ready",
            get(handlers::readiness_check)
                .options(handlers::preflight)
                .fallback(handlers::get_method_not_allowed),
        )
        .route(
            "/metrics",
            get(handlers::metrics).fallback(handlers::get_method_not_allowed),
        )
        .layer(from_fn_with_state(
            CorsPolicy::for_method("GET"),
            cors_headers_middleware,
        ));

    Router::new()
        .merge(api)
        .merge(ops)
        .fallback(handlers::not_found)
        .layer(from_fn(metrics_middleware))
        .layer(
            TraceLayer::new_for_http().make_span_with(|request: &axum::http::Request<_>| {
                let request_id = request
                    .headers()
                    .get(REQUEST_ID_HEADER)
                    .and_then(|value| value.to_str().ok())
                    .unwrap_or("-");

                tracing::info_span!(
                    "http_request",
                    request_id = %request_id,
                    method = %request.method(),
                    uri = %request.uri(),
                    version = ?request.version(),
                )
            }),
        )
        .layer(from_fn(request_id_middleware))
        .with_state(state)
}
