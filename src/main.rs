use std::sync::Arc;

use tracing::info;

use slotline::config::{self, ServiceConfig};
use slotline::engine::{Engine, EngineOptions};
use slotline::notify::NotifyHub;
use slotline::sink::{LogSink, NotificationSink, WebhookSink};
use slotline::{dispatch, sweep};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let cfg = ServiceConfig::from_env();
    slotline::observability::init(cfg.metrics_port)?;

    std::fs::create_dir_all(&cfg.data_dir)?;

    let mut options = EngineOptions {
        compact_threshold: cfg.compact_threshold,
        ..EngineOptions::default()
    };
    if let Some(path) = &cfg.booking_config {
        options.seed = config::load_booking_config(path)?;
    }

    let notify = Arc::new(NotifyHub::new());
    let engine = Arc::new(Engine::with_options(cfg.wal_path(), notify.clone(), options)?);

    let sink: Arc<dyn NotificationSink> = match &cfg.notify_url {
        Some(url) => Arc::new(WebhookSink::new(url)),
        None => Arc::new(LogSink),
    };

    info!("slotline started");
    info!("  data_dir: {}", cfg.data_dir.display());
    info!("  notify: {}", cfg.notify_url.as_deref().unwrap_or("log only"));
    info!("  sweep: every {}s{}", cfg.sweep_interval.as_secs(), if cfg.dry_run { " (dry run)" } else { "" });
    info!("  metrics: {}", cfg.metrics_port.map_or("disabled".to_string(), |p| format!("http://0.0.0.0:{p}/metrics")));

    let dispatcher = tokio::spawn(dispatch::run_dispatcher(notify.subscribe(), sink.clone(), cfg.notify_timeout));
    let scheduler = tokio::spawn(sweep::run_scheduler(engine.clone(), sink, cfg.sweep_options()));

    // Graceful shutdown on SIGTERM/ctrl-c
    #[cfg(unix)]
    {
        let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = sigterm.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await?;
    }

    info!("shutdown signal received");
    scheduler.abort();
    dispatcher.abort();

    info!("slotline stopped");
    Ok(())
}
