mod bootstrap;
mod health;

use std::{future::Future, pin::pin};

use anyhow::Result;
use querybot_core::config::{AppConfig, LoadOptions};
use querybot_slack::socket::SocketModeRunner;

fn init_logging(config: &AppConfig) {
    use querybot_core::config::LogFormat::*;
    use tracing::Level;

    let log_level = config.logging.level.parse::<Level>().unwrap_or(Level::INFO);

    match config.logging.format {
        Compact => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).compact().init();
        }
        Pretty => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).pretty().init();
        }
        Json => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).json().init();
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    run().await
}

pub async fn run() -> Result<()> {
    let config = AppConfig::load(LoadOptions::default())?;
    init_logging(&config);

    let app = bootstrap::bootstrap_with_config(config)?;

    health::spawn(
        &app.config.server.bind_address,
        app.config.server.health_check_port,
        health::HealthState::new(app.config.invocation_log.path.clone()),
    )
    .await?;

    tracing::info!(
        event_name = "system.server.started",
        correlation_id = "bootstrap",
        command = %app.config.slack.command,
        dispatch_enabled = app.dispatch_enabled,
        "querybot-server started"
    );

    serve_until_shutdown(&app.slack_runner, shutdown_signal()).await?;

    tracing::info!(
        event_name = "system.server.stopping",
        correlation_id = "shutdown",
        "querybot-server stopping"
    );

    Ok(())
}

/// Runs the socket loop and returns only once `shutdown` resolves. If the loop
/// gives up on its own the process stays up so the health endpoint keeps
/// answering.
async fn serve_until_shutdown<F>(runner: &SocketModeRunner, shutdown: F) -> Result<()>
where
    F: Future<Output = ()>,
{
    let mut shutdown = pin!(shutdown);
    let mut requested = false;
    runner
        .run_until(async {
            shutdown.as_mut().await;
            requested = true;
        })
        .await?;

    if !requested {
        tracing::warn!(
            event_name = "system.server.socket_stopped",
            correlation_id = "shutdown",
            "socket mode loop ended; waiting for shutdown signal"
        );
        shutdown.await;
    }
    Ok(())
}

async fn shutdown_signal() {
    if let Err(error) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %error, "failed to listen for ctrl-c; running until the socket closes");
        std::future::pending::<()>().await;
    }
}
