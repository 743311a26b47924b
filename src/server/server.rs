use anyhow::Result;
use axum::Router;
use reqwest::Url;
use std::sync::Arc;
use tracing::info;

use crate::config::settings::SettingsConfig;
use crate::issuer::http::HttpIssuer;
use crate::observability::metrics::get_metrics;
use crate::observability::routes::MetricsState;
use crate::pipeline::interception::InterceptionPipeline;
use crate::pipeline::transport::ReqwestTransport;
use crate::server::proxy::proxy_request;

#[derive(Clone)]
pub struct AppState {
    pub metrics_state: MetricsState,
    pub pipeline: Arc<InterceptionPipeline<HttpIssuer>>,
    pub transport: ReqwestTransport,
    pub upstream: Arc<Url>,
}

impl AppState {
    pub async fn new(
        pipeline: InterceptionPipeline<HttpIssuer>,
        transport: ReqwestTransport,
        upstream: Url,
    ) -> Self {
        let metrics = get_metrics().await;
        Self {
            metrics_state: MetricsState::new(metrics.registry.clone()),
            pipeline: Arc::new(pipeline),
            transport,
            upstream: Arc::new(upstream),
        }
    }
}

/// Metrics route (when enabled) plus the relay for every other path.
pub fn router(settings_config: &SettingsConfig, state: AppState) -> Router {
    Router::new()
        .merge(state.metrics_state.router(&settings_config.metrics))
        .fallback(proxy_request)
        .with_state(state)
}

/// Start one Axum server relaying every request through the pipeline.
pub async fn start(settings_config: &SettingsConfig, state: AppState) -> Result<()> {
    let metrics = get_metrics().await;
    let app = router(settings_config, state);

    let bind_addr = &settings_config.server.host;
    let port = &settings_config.server.port;
    let listener = tokio::net::TcpListener::bind(format!("{}:{}", bind_addr, port)).await?;
    info!("relay listening on {}", listener.local_addr()?);

    metrics.up.set(1);
    axum::serve(listener, app).await?;
    metrics.up.set(0);
    Ok(())
}
