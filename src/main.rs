//! Eyecare Gateway - Main entry point
//!
//! This binary loads configuration from the environment, builds the HTTP server
//! with all routes and middleware, and optionally registers with Nacos.

use anyhow::{Context, Result};
use chrono::Local;
use eyecare_gateway::{
    api::{router, AppState},
    core::{init_metrics, AppConfig},
    services::{CompletionClient, RegistryClient},
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

fn main() -> Result<()> {
    // Load .env file if present (before reading any environment variables)
    dotenvy::dotenv().ok();

    let worker_threads = std::env::var("TOKIO_WORKER_THREADS")
        .ok()
        .and_then(|s| s.parse::<usize>().ok())
        .filter(|n| *n > 0)
        .unwrap_or_else(|| {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1)
        });

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(worker_threads)
        .enable_all()
        .build()?;

    runtime.block_on(async_main(worker_threads))
}

/// Custom time formatter that uses local timezone (respects TZ environment variable)
struct LocalTime;

impl tracing_subscriber::fmt::time::FormatTime for LocalTime {
    fn format_time(&self, w: &mut tracing_subscriber::fmt::format::Writer<'_>) -> std::fmt::Result {
        let now = Local::now();
        write!(w, "{}", now.format("%Y-%m-%d %H:%M:%S"))
    }
}

fn init_tracing(log_level: &str) {
    // NO_COLOR disables ANSI codes, e.g. when logging to a file
    let no_color = std::env::var("NO_COLOR").is_ok();

    let base_filter = std::env::var("RUST_LOG")
        .unwrap_or_else(|_| format!("{},eyecare_gateway=debug", log_level));

    // Always suppress noisy HTTP library logs regardless of RUST_LOG setting
    let filter_str = format!(
        "{},hyper=warn,hyper::proto=warn,h2=warn,reqwest=warn",
        base_filter
    );
    let filter = tracing_subscriber::EnvFilter::new(filter_str);

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_timer(LocalTime)
                .with_ansi(!no_color),
        )
        .init();
}

async fn async_main(worker_threads: usize) -> Result<()> {
    let config = AppConfig::from_env()?;

    init_tracing(&config.log_level);
    init_metrics();

    tracing::info!("Tokio runtime: using {} worker threads", worker_threads);

    let client = CompletionClient::from_config(&config)?;
    tracing::info!(
        api_base = %config.upstream.api_base,
        default_model = %config.upstream.default_model,
        verify_ssl = config.verify_ssl,
        timeout_secs = config.request_timeout_secs,
        "Upstream client configured"
    );

    let registry_task = match config.registry.clone() {
        Some(registry) => {
            let http = reqwest::Client::builder()
                .timeout(std::time::Duration::from_secs(10))
                .build()
                .context("Failed to build registry HTTP client")?;
            Some(RegistryClient::new(http, registry, config.server.port).spawn())
        }
        None => {
            tracing::info!("NACOS_SERVER_ADDRESS not set, service registration disabled");
            None
        }
    };

    let host = config.server.host.clone();
    let port = config.server.port;

    let app = router(AppState::new(client));

    tracing::info!("Starting Eyecare Gateway on {}:{}", host, port);
    tracing::info!("Chat API: /chat/completions, /api/chat/completions");
    tracing::info!("Eye doctor API: /domain-chat, /domain-recommendations (aliases under /api/eye-doctor)");
    tracing::info!("Swagger UI: /swagger-ui");
    tracing::info!("Metrics endpoint: /metrics");

    let listener = tokio::net::TcpListener::bind((host.as_str(), port))
        .await
        .with_context(|| format!("Failed to bind {}:{}", host, port))?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    if let Some(task) = registry_task {
        task.abort();
    }
    tracing::info!("Server shut down gracefully");

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
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
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received, draining connections");
}
