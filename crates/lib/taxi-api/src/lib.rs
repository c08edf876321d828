//! HTTP API for the taxi trip pipeline.
//!
//! Serves trip CRUD, aggregate statistics, the import log and on-demand
//! import runs over JSON.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::extract::DefaultBodyLimit;
use taxi_core::control::TaxiControlPlane;
use taxi_core::control::imports::DEFAULT_BATCH_SIZE;
use taxi_core::store::TripStore;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

mod error;
mod extract;
mod routes;

pub use error::ApiError;

/// Configuration for the API server.
#[derive(Debug, Clone)]
pub struct ApiServerConfig {
    pub addr: SocketAddr,
    pub max_body_bytes: usize,
    pub request_timeout: Duration,
    /// Applies to `POST /api/v1/imports/run` instead of `request_timeout`.
    pub import_timeout: Duration,
    /// Directory imported when a run request names none.
    pub data_dir: PathBuf,
    pub batch_size: usize,
}

impl ApiServerConfig {
    #[must_use]
    pub fn new(addr: SocketAddr) -> Self {
        Self {
            addr,
            max_body_bytes: 1024 * 1024,
            request_timeout: Duration::from_secs(30),
            import_timeout: Duration::from_secs(3600),
            data_dir: PathBuf::from("data"),
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }

    #[must_use]
    pub const fn with_max_body_bytes(mut self, max_body_bytes: usize) -> Self {
        self.max_body_bytes = max_body_bytes;
        self
    }

    #[must_use]
    pub const fn with_request_timeout(mut self, request_timeout: Duration) -> Self {
        self.request_timeout = request_timeout;
        self
    }

    #[must_use]
    pub const fn with_import_timeout(mut self, import_timeout: Duration) -> Self {
        self.import_timeout = import_timeout;
        self
    }

    #[must_use]
    pub fn with_data_dir(mut self, data_dir: impl Into<PathBuf>) -> Self {
        self.data_dir = data_dir.into();
        self
    }

    #[must_use]
    pub const fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }
}

impl Default for ApiServerConfig {
    fn default() -> Self {
        Self::new(SocketAddr::from(([0, 0, 0, 0], 8000)))
    }
}

/// HTTP API server wrapper.
pub struct ApiServer<S: TripStore> {
    config: ApiServerConfig,
    control: TaxiControlPlane<S>,
}

impl<S: TripStore> ApiServer<S> {
    #[must_use]
    pub const fn new(control: TaxiControlPlane<S>, config: ApiServerConfig) -> Self {
        Self { config, control }
    }

    /// Runs the HTTP server until Ctrl-C or SIGTERM.
    ///
    /// # Errors
    /// Returns any listener or server error.
    pub async fn serve(self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let addr = self.config.addr;
        let listener = tokio::net::TcpListener::bind(addr).await?;
        let app = router(self.control, &self.config);

        info!("taxi-api listening on {addr}");
        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await?;
        info!("taxi-api stopped");
        Ok(())
    }
}

pub(crate) struct AppState<S: TripStore> {
    pub(crate) control: TaxiControlPlane<S>,
    pub(crate) request_timeout: Duration,
    pub(crate) import_timeout: Duration,
    pub(crate) data_dir: Arc<PathBuf>,
    pub(crate) batch_size: usize,
}

impl<S: TripStore> Clone for AppState<S> {
    fn clone(&self) -> Self {
        Self {
            control: self.control.clone(),
            request_timeout: self.request_timeout,
            import_timeout: self.import_timeout,
            data_dir: self.data_dir.clone(),
            batch_size: self.batch_size,
        }
    }
}

/// Builds the API router with CORS, request tracing and the body limit.
pub fn router<S: TripStore>(control: TaxiControlPlane<S>, config: &ApiServerConfig) -> Router {
    let state = AppState {
        control,
        request_timeout: config.request_timeout,
        import_timeout: config.import_timeout,
        data_dir: Arc::new(config.data_dir.clone()),
        batch_size: config.batch_size,
    };

    routes::routes::<S>()
        .layer(DefaultBodyLimit::max(config.max_body_bytes))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %err, "failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                tracing::warn!(error = %err, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
    info!("shutdown signal received");
}
