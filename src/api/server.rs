//! API server.
//!
//! Wires the router, middleware stack, and graceful shutdown.

use super::{
    handlers::AppState,
    middleware::{request_id_middleware, REQUEST_ID_HEADER},
    routes::create_router,
    security::RateLimiter,
};
use crate::config::SweetFlipsConfig;
use crate::service::RoundService;
use axum::http::{HeaderName, HeaderValue, Method};
use std::{net::SocketAddr, sync::Arc, time::Duration};
use tokio::signal;
use tower_http::{
    cors::{Any, CorsLayer, ExposeHeaders},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};
use tracing::info;

pub struct ApiServer {
    config: SweetFlipsConfig,
    service: Arc<RoundService>,
}

impl ApiServer {
    pub fn new(config: SweetFlipsConfig, service: Arc<RoundService>) -> Self {
        Self { config, service }
    }

    /// Start the API server and run until a shutdown signal arrives.
    pub async fn run(self) -> Result<(), Box<dyn std::error::Error>> {
        let addr = self.socket_addr()?;
        let app = self.create_app();

        info!("Starting SweetFlips API server");
        info!("   Listen: http://{}", addr);
        info!(
            "   Rate limit: {} requests / {}s per IP (enabled: {})",
            self.config.rate_limit.max_requests,
            self.config.rate_limit.window_secs,
            self.config.rate_limit.enabled
        );

        let listener = tokio::net::TcpListener::bind(addr).await?;
        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(shutdown_signal())
        .await?;

        // The sweeper observes the flag on its next tick; the task dies with
        // the runtime either way, this just makes the stop explicit.
        self.service.sessions().stop_sweeper();

        info!("API server stopped gracefully");
        Ok(())
    }

    /// Create the application with the middleware stack.
    fn create_app(&self) -> axum::Router {
        let rate_limiter = Arc::new(RateLimiter::new(
            self.config.rate_limit.enabled,
            self.config.rate_limit.max_requests,
            Duration::from_secs(self.config.rate_limit.window_secs),
        ));
        RateLimiter::start_cleanup_task(rate_limiter.clone());

        let state = Arc::new(AppState {
            service: self.service.clone(),
            rate_limiter,
            version: env!("CARGO_PKG_VERSION").to_string(),
        });

        create_router(state)
            // Request ID middleware (first for tracing)
            .layer(axum::middleware::from_fn(request_id_middleware))
            // CORS layer (before timeout to handle preflight)
            .layer(cors_layer(&self.config.server.cors_origins))
            .layer(TimeoutLayer::new(Duration::from_secs(
                self.config.server.request_timeout_secs,
            )))
            // Tracing layer (last for complete request tracing)
            .layer(TraceLayer::new_for_http())
    }

    fn socket_addr(&self) -> Result<SocketAddr, Box<dyn std::error::Error>> {
        Ok(SocketAddr::from((
            self.config.server.listen_address.parse::<std::net::IpAddr>()?,
            self.config.server.port,
        )))
    }
}

/// CORS policy from the configured origins. A wildcard (or empty) list means
/// the permissive development policy.
fn cors_layer(origins: &[String]) -> CorsLayer {
    let expose = ExposeHeaders::list([HeaderName::from_static(REQUEST_ID_HEADER)]);

    if origins.is_empty() || origins.iter().any(|o| o == "*") {
        return CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
            .expose_headers(expose);
    }

    let allowed: Vec<HeaderValue> = origins.iter().filter_map(|o| o.parse().ok()).collect();
    CorsLayer::new()
        .allow_origin(allowed)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers(Any)
        .expose_headers(expose)
}

/// Wait for shutdown signal
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C signal");
        },
        _ = terminate => {
            info!("Received terminate signal");
        },
    }
}
