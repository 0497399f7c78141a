//! HTTP boundary: router assembly and server lifecycle.

pub mod api;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use axum::Router;
use tokio::sync::Mutex;
use tower_http::cors::CorsLayer;
use tracing::info;

use crate::config::Config;
use crate::github::{GitHubApi, GitHubClient};
use crate::oauth::GatewayClient;
use crate::project;
use crate::session::Session;
use crate::submit::scaffold::{PackageScaffolder, Scaffolder};

pub use self::api::{AppState, SharedState, api_router};

/// Network-facing server settings, separate from the recognized
/// configuration options.
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Directory the notebook frontend serves from; a fallback source for
    /// project detection.
    pub notebook_dir: Option<PathBuf>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3131,
            notebook_dir: None,
        }
    }
}

/// Assemble the shared state from configuration and production collaborators.
pub fn build_state(config: Config, notebook_dir: Option<PathBuf>) -> Result<SharedState> {
    let gateway = GatewayClient::new(
        &config.oauth_gateway_url,
        Duration::from_secs(config.access_token_poll_timeout),
    )
    .context("Invalid OAuth gateway configuration")?;
    let session = Mutex::new(Session::new(&config.github_access_token));
    let github: Arc<dyn GitHubApi> = Arc::new(GitHubClient::new());
    let scaffolder: Arc<dyn Scaffolder> = Arc::new(PackageScaffolder);

    Ok(Arc::new(AppState {
        config,
        session,
        gateway,
        github,
        scaffolder,
        notebook_dir,
    }))
}

/// Build the application router. The notebook frontend is served from a
/// different origin, so CORS stays permissive.
pub fn build_router(state: SharedState) -> Router {
    api_router().layer(CorsLayer::permissive()).with_state(state)
}

/// Start serving. Fails fast, before binding, when no project can be
/// detected — a server that cannot resolve a project cannot serve a single
/// successful submission.
pub async fn start_server(server: ServerConfig, config: Config) -> Result<()> {
    let project = project::resolve(&config.project_config_path, server.notebook_dir.as_deref())
        .context("Could not detect project")?;
    info!("serving submissions for {project}");

    let state = build_state(config, server.notebook_dir.clone())?;
    let app = build_router(state);

    let addr = format!("{}:{}", server.host, server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {addr}"))?;
    info!("assemble server running at http://{}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("server shut down gracefully");
    Ok(())
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_err() {
        tracing::warn!("failed to install Ctrl+C handler");
    }
}
