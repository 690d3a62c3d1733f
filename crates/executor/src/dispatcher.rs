use std::sync::Arc;

use querybot_core::{DispatchPayload, QueryBotError};
use serde_json::Value;
use tracing::{info, warn};

use crate::client::Executor;

#[derive(Clone, Debug, PartialEq)]
pub enum DispatchOutcome {
    Succeeded { function_name: String, response: Value },
    Failed { function_name: String, error: QueryBotError },
}

impl DispatchOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Succeeded { .. })
    }
}

pub struct Dispatcher {
    executor: Arc<dyn Executor>,
    function_name: String,
}

impl Dispatcher {
    pub fn new(executor: Arc<dyn Executor>, function_name: impl Into<String>) -> Self {
        Self { executor, function_name: function_name.into() }
    }

    pub fn function_name(&self) -> &str {
        &self.function_name
    }

    pub async fn dispatch(&self, payload: &DispatchPayload, correlation_id: &str) -> DispatchOutcome {
        self.dispatch_to(&self.function_name, payload, correlation_id).await
    }

    /// Invokes `function_name` and logs the result. Errors are folded into the
    /// returned outcome; callers on the Slack path only log it.
    pub async fn dispatch_to(
        &self,
        function_name: &str,
        payload: &DispatchPayload,
        correlation_id: &str,
    ) -> DispatchOutcome {
        info!(
            event_name = "executor.dispatch.started",
            correlation_id,
            function_name,
            query_len = payload.query.len(),
            "invoking external executor"
        );

        match self.executor.invoke(function_name, payload).await {
            Ok(response) => {
                info!(
                    event_name = "executor.dispatch.succeeded",
                    correlation_id,
                    function_name,
                    response = %response,
                    "external executor returned a response"
                );
                DispatchOutcome::Succeeded { function_name: function_name.to_owned(), response }
            }
            Err(error) => {
                warn!(
                    event_name = "executor.dispatch.failed",
                    correlation_id,
                    function_name,
                    error = %error,
                    "external executor invocation failed"
                );
                DispatchOutcome::Failed {
                    function_name: function_name.to_owned(),
                    error: QueryBotError::Dispatch(error.to_string()),
                }
            }
        }
    }
}
