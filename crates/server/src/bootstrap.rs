use std::sync::Arc;
use std::time::Duration;

use querybot_core::config::{AppConfig, ConfigError};
use querybot_core::FileInvocationLog;
use querybot_executor::{Dispatcher, ExecutorError, HttpExecutor};
use querybot_slack::{
    api::{SlackApi, SlackWebClient},
    commands::QueryCommandService,
    events::{query_dispatcher, ChannelErrorHook},
    socket::{ReconnectPolicy, SocketModeRunner},
    submissions::QuerySubmissionService,
    transport::SlackSocketTransport,
};
use thiserror::Error;
use tracing::info;

pub struct Application {
    pub config: AppConfig,
    pub slack_runner: SocketModeRunner,
    pub dispatch_enabled: bool,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("executor client setup failed: {0}")]
    Executor(#[from] ExecutorError),
}

/// Wires the Slack services, invocation log and optional executor into a runner.
pub fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        "starting application bootstrap"
    );

    let slack: Arc<dyn SlackApi> = Arc::new(SlackWebClient::new(
        config.slack.api_base_url.clone(),
        config.slack.bot_token.clone(),
    ));
    let invocation_log = Arc::new(FileInvocationLog::new(config.invocation_log.path.clone()));

    let mut submissions = QuerySubmissionService::new(Arc::clone(&slack));
    if config.executor.enabled {
        let executor = HttpExecutor::from_config(&config.executor)?;
        submissions = submissions.with_dispatcher(Arc::new(Dispatcher::new(
            Arc::new(executor),
            config.executor.function_name.clone(),
        )));
    }
    let dispatch_enabled = submissions.dispatch_enabled();

    let dispatcher = query_dispatcher(
        QueryCommandService::new(Arc::clone(&slack), invocation_log, config.slack.command.clone()),
        submissions,
    );
    let transport = Arc::new(SlackSocketTransport::new(
        config.slack.api_base_url.clone(),
        config.slack.app_token.clone(),
    ));
    let slack_runner = SocketModeRunner::new(
        transport,
        dispatcher,
        Arc::new(ChannelErrorHook::new(slack)),
        ReconnectPolicy::default(),
    )
    .with_drain_timeout(Duration::from_secs(config.server.graceful_shutdown_secs));

    info!(
        event_name = "system.bootstrap.ready",
        correlation_id = "bootstrap",
        command = %config.slack.command,
        invocation_log = %config.invocation_log.path.display(),
        dispatch_enabled,
        "application bootstrap complete"
    );

    Ok(Application { config, slack_runner, dispatch_enabled })
}
