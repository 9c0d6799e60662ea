//! Batch video generation worker binary.

use std::sync::Arc;

use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use vgen_provider::ReplicateClient;
use vgen_queue::DispatchQueue;
use vgen_status::RedisStatusStore;
use vgen_storage::{DriveClient, SpacesClient, TransferEngine};
use vgen_worker::{BatchExecutor, ProcessingContext, SmtpNotifier, WorkerConfig};

#[tokio::main]
async fn main() {
    // Install rustls crypto provider (required for TLS/HTTPS)
    rustls::crypto::ring::default_provider()
        .install_default()
        .expect("Failed to install rustls crypto provider");

    // Load environment variables
    dotenvy::dotenv().ok();

    // Initialize tracing with colored output for dev, JSON for production
    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(false);

    let env_filter = EnvFilter::from_default_env()
        .add_directive("vgen=info".parse().expect("valid directive"));

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

    info!("Starting vgen-worker");

    let config = WorkerConfig::from_env();
    info!("Worker config: {:?}", config);

    let spaces = match SpacesClient::from_env() {
        Ok(c) => c,
        Err(e) => {
            error!("Failed to create storage client: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = spaces.check_connectivity().await {
        error!("Storage connectivity check failed: {}", e);
        std::process::exit(1);
    }

    let provider = match ReplicateClient::from_env() {
        Ok(c) => c,
        Err(e) => {
            error!("Failed to create provider client: {}", e);
            std::process::exit(1);
        }
    };

    let status = match RedisStatusStore::from_env() {
        Ok(s) => s,
        Err(e) => {
            error!("Failed to create status store: {}", e);
            std::process::exit(1);
        }
    };

    let queue = match DispatchQueue::from_env() {
        Ok(q) => q,
        Err(e) => {
            error!("Failed to create dispatch queue: {}", e);
            std::process::exit(1);
        }
    };

    let notifier = SmtpNotifier::from_env();
    if notifier.is_none() {
        info!("SMTP_HOST not set, batch notifications disabled");
    }

    let mirror = DriveClient::from_env();
    if mirror.is_none() {
        info!("Drive mirror not configured, skipping");
    }

    let ctx = ProcessingContext {
        provider: Arc::new(provider),
        transfer: Arc::new(TransferEngine::new(spaces)),
        status: Arc::new(status),
        notifier: notifier.map(|n| Arc::new(n) as Arc<dyn vgen_worker::Notifier>),
        mirror: mirror.map(Arc::new),
        config: config.clone(),
    };

    let executor = Arc::new(BatchExecutor::new(config, queue, ctx));

    // Signal handler triggers graceful shutdown
    let shutdown_executor = Arc::clone(&executor);
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("Received shutdown signal");
        shutdown_executor.shutdown();
    });

    if let Err(e) = executor.run().await {
        error!("Executor error: {}", e);
        std::process::exit(1);
    }

    info!("Worker shutdown complete");
}
