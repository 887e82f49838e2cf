mod metrics;

use meter_alarm_core::SchedulerConfig;
use meter_alarm_runtime::SystemClock;
use meter_config::DaemonConfig;
use meter_logging::LogFormat;
use tracing::{error, info};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration
    let config_path =
        std::env::var("METER_CONFIG").unwrap_or_else(|_| "config/alarmd.yaml".to_string());
    let config: DaemonConfig = meter_config::load_config(&config_path)?;

    // Initialize logging
    let log_format = if config.app.log_json {
        LogFormat::Json
    } else {
        LogFormat::Plain
    };
    meter_logging::init_with(&config.app.log_level, log_format);

    // Register metrics
    meter_metrics::register_metrics();

    info!(
        service = %config.app.service_name,
        version = env!("CARGO_PKG_VERSION"),
        config = %config_path,
        "Starting alarm daemon"
    );

    // Start metrics endpoint
    let metrics_addr = format!("0.0.0.0:{}", config.app.metrics_port);
    let listener = tokio::net::TcpListener::bind(&metrics_addr).await?;
    info!("Serving metrics on {}", metrics_addr);
    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, metrics::create_router()).await {
            error!("Metrics server error: {}", e);
        }
    });

    // Start alarm actor
    let scheduler_config = SchedulerConfig {
        upper_bound_ms: config.alarm.upper_bound_ms,
    };
    let (handle, mut fired_rx, actor_task) = meter_alarm_runtime::spawn(
        scheduler_config,
        SystemClock,
        config.alarm.channel_capacity,
    );

    let provisioned = config.sessions.len();
    for snapshot in config.sessions {
        handle.upsert(snapshot.id, snapshot.state).await?;
    }
    info!(sessions = provisioned, "Provisioned sessions");

    loop {
        tokio::select! {
            Some(fired) = fired_rx.recv() => {
                info!(
                    session_id = fired.session_id,
                    now_sec = fired.now_sec,
                    trigger = ?fired.trigger,
                    "Session alarm due"
                );
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Shutting down");
                break;
            }
        }
    }

    drop(handle);
    actor_task.await?;
    Ok(())
}
