//! sysglance_agent: HTTP + WebSocket telemetry server.

use std::env;
use std::sync::Arc;

use sysglance_agent::analysis::GeminiClient;
use sysglance_agent::broadcast::Broadcaster;
use sysglance_agent::config::{parse_port, usage, wants_help, AgentConfig};
use sysglance_agent::history::MetricHistory;
use sysglance_agent::probe::SysinfoProbe;
use sysglance_agent::routes::router;
use sysglance_agent::sampler::spawn_sampler;
use sysglance_agent::state::AppState;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args: Vec<String> = env::args().collect();
    if wants_help(args.iter().skip(1).cloned()) {
        let prog = args.first().map(String::as_str).unwrap_or("sysglance_agent");
        println!("{}", usage(prog));
        return Ok(());
    }

    let mut config = AgentConfig::from_env();
    config.port = parse_port(args, config.port);
    if config.genai_api_key.is_none() {
        warn!("SYSGLANCE_GENAI_API_KEY not set; analysis endpoints will return error text");
    }

    let probe = Arc::new(SysinfoProbe::new(config.disk_mount.clone()));
    let history = Arc::new(MetricHistory::new(config.history_window_ms));
    let broadcaster = Broadcaster::new(config.send_timeout, config.subscriber_queue);
    let generator = Arc::new(GeminiClient::new(
        config.genai_endpoint.clone(),
        config.genai_api_key.clone(),
        config.genai_timeout,
    )?);

    let sampler = spawn_sampler(
        probe.clone(),
        history.clone(),
        broadcaster.clone(),
        config.sample_period,
    );

    let app = router(AppState::new(probe, history, broadcaster, generator));

    let listener = tokio::net::TcpListener::bind(config.socket_addr()).await?;
    info!("sysglance agent listening on http://{}", listener.local_addr()?);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    sampler.stop().await;
    info!("sysglance agent stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("failed to listen for ctrl-c: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!("failed to install SIGTERM handler: {e}");
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
    info!("shutdown signal received");
}
