//! Math Tutor - step-by-step math solutions with rendered graphs
//!
//! An HTTP service that solves problems through an LLM and, when asked or
//! when the user accepts an offer, runs generated plotting code in a
//! sandboxed interpreter and returns the image.

mod api;
mod config;
mod db;
mod dialogue;
mod graph;
mod llm;
mod system_prompt;
mod title_generator;

use api::{create_router, AppState};
use config::ServerConfig;
use db::Database;
use dialogue::DialogueEngine;
use graph::{ArtifactPublisher, RendererConfig, SandboxedRenderer, StorageConfig};
use llm::LlmConfig;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "math_tutor=info,tower_http=debug".into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_current_span(false)
                .with_span_list(false),
        )
        .init();

    let config = ServerConfig::from_env();

    // Ensure database and output directories exist
    if let Some(parent) = config.db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::create_dir_all(&config.output_dir)?;

    tracing::info!(path = %config.db_path.display(), "Opening database");
    let db = Database::open(&config.db_path)?;

    let llm = llm::connect(&LlmConfig::from_env());
    tracing::info!(model = %llm.model_id(), "LLM configured");

    let renderer_config = RendererConfig::from_env(&config.output_dir);
    match renderer_config.locate_interpreter() {
        Some(path) => tracing::info!(interpreter = %path.display(), "Graph renderer ready"),
        None => tracing::warn!(
            interpreter = %renderer_config.interpreter,
            "Interpreter not found on PATH; graph rendering will fail"
        ),
    }
    let renderer = Arc::new(SandboxedRenderer::new(renderer_config));
    let publisher = ArtifactPublisher::from_config(&StorageConfig::from_env());
    tracing::info!(remote_uploads = publisher.has_remote_store(), "Graph publisher ready");

    let shutdown = CancellationToken::new();
    let engine = DialogueEngine::new(llm, renderer, publisher).with_cancellation(shutdown.clone());
    let state = AppState::new(db, engine, config.output_dir.clone());

    // Create router
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let compression = CompressionLayer::new()
        .gzip(true)
        .br(true)
        .deflate(true)
        .zstd(true);

    let app = create_router(state)
        .layer(cors)
        .layer(compression)
        .layer(TraceLayer::new_for_http());

    // Start server
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!("Math tutor listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown))
        .await?;

    Ok(())
}

/// Resolves on Ctrl-C or SIGTERM, cancelling in-flight renders first
async fn shutdown_signal(shutdown: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    tracing::info!("Shutting down");
    shutdown.cancel();
}
