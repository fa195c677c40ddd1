//! Axum API server binary.

use std::net::SocketAddr;
use std::sync::Arc;

use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use reelgen_api::{create_router, metrics, ApiConfig, AppState, StaleJobConfig, StaleJobDetector};
use reelgen_media::{check_ffmpeg, check_ffprobe, FfmpegTool};
use reelgen_store::{InMemoryClipCatalog, InMemoryJobStore};
use reelgen_worker::{
    ElevenLabsClient, GenerationPipeline, JobExecutor, VoiceoverConfig, WorkerConfig,
};

/// Log a fatal startup error and exit.
fn fatal(context: &str, e: impl std::fmt::Display) -> ! {
    error!("{}: {}", context, e);
    std::process::exit(1);
}

fn init_tracing() {
    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(false);

    let env_filter = EnvFilter::from_default_env();
    let env_filter = match "reelgen=info".parse() {
        Ok(directive) => env_filter.add_directive(directive),
        Err(_) => env_filter,
    };

    if use_json {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(env_filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_ansi(true)
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_file(false)
                    .with_line_number(false),
            )
            .with(env_filter)
            .init();
    }
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    // rustls 0.23 needs a process-wide crypto provider for reqwest
    if rustls::crypto::ring::default_provider()
        .install_default()
        .is_err()
    {
        eprintln!("rustls crypto provider already installed");
    }

    init_tracing();
    info!("Starting reelgen-api");

    let config = ApiConfig::from_env();
    info!("API config: host={}, port={}", config.host, config.port);

    let worker_config = match WorkerConfig::from_env() {
        Ok(c) => Arc::new(c),
        Err(e) => fatal("Invalid worker configuration", e),
    };
    let voice_config = VoiceoverConfig::from_env().unwrap_or_else(|e| fatal("Voiceover unavailable", e));

    match check_ffmpeg() {
        Ok(path) => info!("Using ffmpeg at {}", path.display()),
        Err(e) => fatal("FFmpeg check failed", e),
    }
    if let Err(e) = check_ffprobe() {
        warn!("{}; hook frame size will fall back to the canonical frame", e);
    }

    for dir in [&worker_config.output_dir, &worker_config.tmp_dir] {
        if let Err(e) = tokio::fs::create_dir_all(dir).await {
            fatal(&format!("Failed to create directory {}", dir.display()), e);
        }
    }

    let catalog = match &config.catalog_path {
        Some(path) => match InMemoryClipCatalog::from_manifest(path).await {
            Ok(catalog) => {
                info!("Loaded {} clips from {}", catalog.len().await, path.display());
                catalog
            }
            Err(e) => fatal(&format!("Failed to load clip manifest {}", path.display()), e),
        },
        None => {
            warn!("CATALOG_PATH not set, starting with an empty clip catalog");
            InMemoryClipCatalog::new()
        }
    };

    let metrics_handle = if config.metrics_enabled {
        match metrics::init_metrics() {
            Ok(handle) => {
                info!("Prometheus metrics enabled at /metrics");
                Some(handle)
            }
            Err(e) => {
                warn!("Failed to install Prometheus recorder: {}", e);
                None
            }
        }
    } else {
        None
    };

    let speech = match ElevenLabsClient::new(voice_config) {
        Ok(client) => Arc::new(client),
        Err(e) => fatal("Failed to create speech client", e),
    };
    let store = Arc::new(InMemoryJobStore::new());
    let pipeline = Arc::new(GenerationPipeline::new(
        Arc::clone(&worker_config),
        store.clone(),
        Arc::new(catalog),
        Arc::new(FfmpegTool::with_timeout(worker_config.ffmpeg_timeout_secs)),
        speech,
    ));
    let executor = Arc::new(JobExecutor::new(pipeline, worker_config.executor));

    let stale_config = StaleJobConfig::from_env()
        .unwrap_or_else(|e| fatal("Invalid stale job detector configuration", e));
    let stale_detector = StaleJobDetector::new(store.clone(), stale_config);
    tokio::spawn(async move {
        stale_detector.run().await;
    });

    let state = AppState::new(config.clone(), worker_config, store, Arc::clone(&executor));
    let app = create_router(state, metrics_handle);

    let addr: SocketAddr = match format!("{}:{}", config.host, config.port).parse() {
        Ok(addr) => addr,
        Err(e) => fatal("Invalid bind address", e),
    };
    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(e) => fatal(&format!("Failed to bind {addr}"), e),
    };
    info!("Listening on {}", addr);

    if let Err(e) = axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    {
        error!("Server error: {}", e);
    }

    executor.shutdown().await;
    info!("Server shutdown complete");
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Received shutdown signal"),
        Err(e) => {
            error!("Failed to install CTRL+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    }
}
