//! banhammer server entry point
//!
//! Wires the TCP ingress, the single-writer detection engine, the periodic
//! scheduler, and the HTTP query surface together and runs them until
//! `Ctrl-C`.

use std::{sync::Arc, time::Duration};

use application::{
    DetectionEngine, EngineActor,
    ports::{BanSinkPort, LimitDirectoryPort, NotifierPort, NullNotifier},
    services::Tracker,
};
use infrastructure::{
    AppConfig, OtelConfig, PanelDirectoryAdapter, SqliteBanSink, TaskScheduler,
    TelegramNotifier, create_pool, init_telemetry,
};
use ingress_tcp::NodeRegistry;
use metrics_exporter_prometheus::PrometheusBuilder;
use presentation_http::{
    middleware::{BearerOrQueryTokenLayer, RequestIdLayer},
    routes, state::AppState,
};
use secrecy::SecretString;
use tokio::net::TcpListener;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::load()?;

    let otel_config = OtelConfig {
        enabled: config.telemetry.enabled,
        endpoint: config.telemetry.otlp_endpoint.clone(),
        ..OtelConfig::default()
    };
    let _telemetry_guard = init_telemetry(&otel_config)?;

    info!(version = env!("CARGO_PKG_VERSION"), "banhammer starting");

    let pool = create_pool(&config.database)?;
    let ban_sink: Arc<dyn BanSinkPort> = Arc::new(SqliteBanSink::new(Arc::new(pool)));

    let directory: Arc<dyn LimitDirectoryPort> = Arc::new(PanelDirectoryAdapter::new(config.panel.clone()));
    directory.refresh().await.unwrap_or_else(|e| {
        tracing::warn!(error = %e, "initial panel directory refresh failed, starting with an empty cache");
    });

    let notifier: Arc<dyn NotifierPort> = match std::env::var("TELEGRAM_BOT_TOKEN") {
        Ok(token) if !token.is_empty() => Arc::new(TelegramNotifier::new(SecretString::from(token))),
        _ => Arc::new(NullNotifier),
    };

    let tracker = Tracker::new(config.detection.concurrent_window_s, config.detection.data_retention_s);
    let detection_engine = DetectionEngine::new(
        config.detection.to_detection_config(),
        Arc::clone(&directory),
        Arc::clone(&ban_sink),
        notifier,
    );
    let engine = EngineActor::spawn(tracker, detection_engine, Arc::clone(&directory), 1024);

    let registry = NodeRegistry::default();

    let prometheus_recorder = PrometheusBuilder::new().install_recorder()?;

    let scheduler = TaskScheduler::new(infrastructure::SchedulerConfig::default());
    {
        let engine = engine.clone();
        scheduler.add_task("sweep", Duration::from_secs(5), move || {
            let engine = engine.clone();
            async move {
                engine.sweep(chrono::Utc::now()).await;
                Ok(())
            }
        })?;
    }
    {
        let engine = engine.clone();
        scheduler.add_task("cleanup", Duration::from_secs(60), move || {
            let engine = engine.clone();
            async move {
                engine.cleanup().await;
                Ok(())
            }
        })?;
    }
    {
        let directory = Arc::clone(&directory);
        scheduler.add_task("directory_refresh", Duration::from_secs(30), move || {
            let directory = Arc::clone(&directory);
            async move {
                if directory.needs_reload() {
                    directory.refresh().await.map_err(|e| e.to_string())?;
                }
                Ok(())
            }
        })?;
    }

    let ingress_engine = engine.clone();
    let ingress_registry = registry.clone();
    let tcp_host = config.tcp.host.clone();
    let tcp_port = config.tcp.port;
    let tcp_idle_timeout_secs = config.tcp.idle_timeout_secs;
    tokio::spawn(async move {
        if let Err(e) = ingress_tcp::run(
            &tcp_host,
            tcp_port,
            ingress_engine,
            ingress_registry,
            tcp_idle_timeout_secs,
        )
        .await
        {
            tracing::error!(error = %e, "TCP ingress server exited");
        }
    });

    let state = AppState {
        engine,
        ban_sink,
        registry,
        prometheus: prometheus_recorder,
        api_token: config.api.token.clone(),
    };

    let cors_layer = if config.api.cors_enabled {
        CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any)
    } else {
        CorsLayer::new()
    };

    let app = routes::create_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer)
        .layer(RequestIdLayer)
        .layer(BearerOrQueryTokenLayer::new(config.api.token.clone()));

    let addr = format!("{}:{}", config.api.host, config.api.port);
    let listener = TcpListener::bind(&addr).await?;
    info!(%addr, "HTTP query surface listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutdown signal received");
            scheduler.stop().await;
        })
        .await?;

    Ok(())
}
