use std::sync::Arc;

use querybot_core::config::{AppConfig, LoadOptions};
use querybot_core::DispatchPayload;
use querybot_executor::{DispatchOutcome, Dispatcher, HttpExecutor};
use uuid::Uuid;

use super::CommandResult;

const COMMAND: &str = "invoke";

/// Sends `query` to the executor regardless of `executor.enabled`, so operators
/// can exercise the function before turning dispatch on for Slack traffic.
pub fn run(query: &str, function: Option<&str>) -> CommandResult {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => return CommandResult::failure(COMMAND, "config_validation", error.to_string(), 2),
    };
    run_with_config(&config, query, function)
}

pub fn run_with_config(config: &AppConfig, query: &str, function: Option<&str>) -> CommandResult {
    let payload = match DispatchPayload::new(query) {
        Ok(payload) => payload,
        Err(error) => return CommandResult::failure(COMMAND, "validation", error.to_string(), 2),
    };

    let executor = match HttpExecutor::from_config(&config.executor) {
        Ok(executor) => executor,
        Err(error) => {
            return CommandResult::failure(
                COMMAND,
                "executor_not_configured",
                format!("{error}; set executor.base_url or QUERYBOT_EXECUTOR_BASE_URL"),
                2,
            )
        }
    };
    let dispatcher = Dispatcher::new(Arc::new(executor), config.executor.function_name.clone());
    let function_name = function.unwrap_or(dispatcher.function_name()).to_owned();
    let correlation_id = format!("cli-{}", Uuid::new_v4());

    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            return CommandResult::failure(
                COMMAND,
                "runtime",
                format!("failed to initialize async runtime: {error}"),
                1,
            )
        }
    };

    let outcome = runtime.block_on(dispatcher.dispatch_to(&function_name, &payload, &correlation_id));
    match outcome {
        DispatchOutcome::Succeeded { function_name, response } => {
            CommandResult::success(COMMAND, format!("{function_name} returned {response}"))
        }
        DispatchOutcome::Failed { error, .. } => {
            CommandResult::failure(COMMAND, error.kind().as_str(), error.to_string(), 1)
        }
    }
}
