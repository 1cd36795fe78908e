//! Router construction and server host for the API.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use axum::{
    Router,
    extract::DefaultBodyLimit,
    http::Method,
    routing::{get, post},
};
use tokio::net::TcpListener;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::handlers::{cluster, jobs, metrics};
use crate::state::ApiState;

/// Axum router wrapper hosting the Parlance API.
pub struct ApiServer {
    router: Router,
}

impl ApiServer {
    /// Build the router over shared state.
    #[must_use]
    pub fn new(state: Arc<ApiState>) -> Self {
        let body_limit = usize::try_from(state.settings.max_upload_bytes())
            .unwrap_or(usize::MAX)
            .saturating_add(64 * 1024); // multipart framing overhead

        let cors = CorsLayer::new()
            .allow_origin(Any)
            .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS]);

        let router = Self::public_routes()
            .merge(Self::job_routes())
            .merge(Self::cluster_routes())
            .layer(DefaultBodyLimit::max(body_limit))
            .layer(cors)
            .layer(TraceLayer::new_for_http())
            .with_state(state);

        Self { router }
    }

    fn public_routes() -> Router<Arc<ApiState>> {
        Router::new()
            .route("/healthz", get(cluster::healthz))
            .route("/health", get(cluster::health))
            .route("/metrics", get(metrics::metrics_text))
            .route("/metrics/json", get(metrics::metrics_json))
            .route("/metrics/gate-paths", get(metrics::gate_paths))
    }

    fn job_routes() -> Router<Arc<ApiState>> {
        Router::new()
            .route(
                "/jobs",
                post(jobs::submit_job)
                    .get(jobs::list_jobs)
                    .delete(jobs::delete_jobs),
            )
            .route("/jobs/by-url", post(jobs::submit_by_url))
            .route("/jobs/{id}", get(jobs::get_job).delete(jobs::delete_job))
            .route("/jobs/{id}/result", get(jobs::get_result))
            .route("/jobs/{id}/audio", get(jobs::get_audio))
            .route("/admin/jobs", get(jobs::admin_jobs))
    }

    fn cluster_routes() -> Router<Arc<ApiState>> {
        Router::new()
            .route("/cluster/jobs", get(cluster::cluster_jobs))
            .route("/cluster/nodes", get(cluster::cluster_nodes))
            .route("/cluster/local-metrics", get(cluster::local_metrics))
            .route("/cluster/metrics-summary", get(cluster::metrics_summary))
    }

    /// The underlying router, for in-process testing.
    #[must_use]
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Serve the API on the supplied address until the shutdown future
    /// resolves.
    ///
    /// # Errors
    ///
    /// Returns an error if the listener fails to bind or the server
    /// terminates unexpectedly.
    pub async fn serve(
        self,
        addr: SocketAddr,
        shutdown: impl Future<Output = ()> + Send + 'static,
    ) -> Result<()> {
        tracing::info!(addr = %addr, "starting API listener");
        let listener = TcpListener::bind(addr).await?;
        axum::serve(listener, self.router.into_make_service())
            .with_graceful_shutdown(shutdown)
            .await?;
        Ok(())
    }
}
