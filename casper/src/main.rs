use std::{net::SocketAddr, path::PathBuf, sync::Arc};

use clap::Parser;
use displaydoc::Display;
use meltdown::Meltdown;
use thiserror::Error;
use tracing::info;

use casper::{
    app::{App, ServeError},
    app_state::{AppState, InnerAppState},
    cache::storage::Storage,
    config::{ConfigError, ConfigRegistry, RegistryPaths},
    middleware::{BulkEndpoint, CacheabilityMiddleware, Chain, FilterRegistry, SingleEndpoint},
    observability::Observability,
    upstream::{UpstreamClient, UpstreamForwarder},
    utils::meltdown::{wait_for_shutdown_signals, TaggedService},
};
use telemetry::{
    metrics_relay::{MetricsSink, NullMetricsSink, UdpMetricsSink},
    syslog_trace::SyslogTraceSink,
};

#[global_allocator]
static GLOBAL: jemallocator::Jemalloc = jemallocator::Jemalloc;

/// Sidecar HTTP caching proxy.
#[derive(Debug, Parser)]
#[command(version)]
struct Args {
    /// Path to the telemetry/log-level config file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Enable verbose logging.
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Debug, Error, Display)]
enum StartupError {
    /// failed to read telemetry config: {0}
    Telemetry(#[from] telemetry::init::TelemetryError),
    /// failed to load configuration: {0}
    Config(#[from] ConfigError),
    /// failed to connect storage backend: {0}
    Storage(#[from] casper::cache::storage::StorageError),
    /// storage handshake failed and `casper.strict_storage_handshake` is set
    StrictStorageHandshake,
    /// server failed: {0}
    Serve(#[from] ServeError),
}

fn listen_addr() -> SocketAddr {
    let host = std::env::var("CASPER_HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
    let port: u16 = std::env::var("CASPER_PORT").ok().and_then(|v| v.parse().ok()).unwrap_or(3000);
    format!("{host}:{port}").parse().unwrap_or_else(|_| SocketAddr::from(([0, 0, 0, 0], 3000)))
}

fn worker_id() -> String {
    std::env::var("CASPER_WORKER_ID").unwrap_or_else(|_| uuid::Uuid::now_v7().to_string())
}

#[tokio::main]
async fn main() -> Result<(), StartupError> {
    dotenvy::dotenv().ok();
    let args = Args::parse();

    let mut telemetry_config = match &args.config {
        Some(path) => match std::fs::read(path) {
            Ok(bytes) => serde_yml::from_slice(&bytes).unwrap_or_else(|error| {
                eprintln!("failed to parse {}: {error}, using defaults", path.display());
                telemetry::Config::default()
            }),
            Err(error) => {
                eprintln!("failed to read {}: {error}, using defaults", path.display());
                telemetry::Config::default()
            }
        },
        None => telemetry::Config::default(),
    };
    if args.verbose {
        telemetry_config.level = "info,casper=trace".to_string();
    }
    telemetry::init_telemetry(&telemetry_config)?;

    #[cfg(debug_assertions)]
    tracing::warn!("running in debug mode");

    let paths = RegistryPaths::from_env();
    let registry = Arc::new(ConfigRegistry::load(paths).await?);
    let global = registry.global().await;

    let mut metrics_config = telemetry_config.metrics_relay.clone();
    if let Ok(host) = global.yelp_meteorite.metrics_relay.host.parse() {
        metrics_config.host = host;
    }
    if global.yelp_meteorite.metrics_relay.port != 0 {
        metrics_config.port = global.yelp_meteorite.metrics_relay.port;
    }
    if let Ok(service) = std::env::var("PAASTA_SERVICE") {
        metrics_config.service_name = service;
    }
    if let Ok(instance) = std::env::var("PAASTA_INSTANCE") {
        metrics_config.instance_name = instance;
    }
    let metrics_sink: Arc<dyn MetricsSink> = match UdpMetricsSink::connect(&metrics_config).await {
        Ok(sink) => Arc::new(sink),
        Err(error) => {
            tracing::warn!(%error, "failed to connect metrics relay, metrics will be dropped");
            Arc::new(NullMetricsSink)
        }
    };

    let mut syslog_config = telemetry_config.zipkin_syslog.clone();
    if let Ok(host) = global.zipkin.syslog.host.parse() {
        syslog_config.host = host;
    }
    if global.zipkin.syslog.port != 0 {
        syslog_config.port = global.zipkin.syslog.port;
    }
    let trace_sink = SyslogTraceSink::connect(&syslog_config).await.ok();
    if trace_sink.is_none() {
        tracing::warn!("failed to connect zipkin syslog sink, traces will be dropped");
    }

    let storage = match std::env::var("CASPER_REDIS_URL").ok().and_then(|s| url::Url::parse(&s).ok()) {
        #[cfg(feature = "redis-storage")]
        Some(url) => Storage::redis(&url)?,
        #[cfg(not(feature = "redis-storage"))]
        Some(_) => Storage::in_process(),
        None => Storage::in_process(),
    };

    if global.casper.strict_storage_handshake && !storage.health_check().await {
        tracing::error!("storage handshake failed and strict_storage_handshake is set");
        return Err(StartupError::StrictStorageHandshake);
    }

    let chain = Chain::new(vec![
        Arc::new(CacheabilityMiddleware),
        Arc::new(SingleEndpoint),
        Arc::new(BulkEndpoint),
    ]);

    let app_state = AppState::new(InnerAppState {
        config: Arc::clone(&registry),
        storage,
        upstream: UpstreamClient::new(),
        observability: Observability::new(metrics_sink, trace_sink),
        filters: FilterRegistry::default(),
        worker_id: worker_id(),
        chain,
        forwarder: Arc::new(UpstreamForwarder),
        task_tracker: tokio_util::task::TaskTracker::new(),
    });

    registry.spawn_reload_task();

    let addr = listen_addr();
    let app = App::new(app_state, addr);

    let mut shutting_down = false;
    let mut meltdown = Meltdown::new()
        .register(TaggedService::new("shutdown-signals", wait_for_shutdown_signals))
        .register(TaggedService::new("casper", app));

    info!("starting services");
    while let Some((service, result)) = meltdown.next().await {
        match result {
            Ok(()) => info!(%service, "service stopped successfully"),
            Err(error) => tracing::error!(%service, %error, "service crashed"),
        }
        if !shutting_down {
            info!("propagating shutdown signal...");
            meltdown.trigger();
            shutting_down = true;
        }
    }

    info!("shut down");
    Ok(())
}
