use std::sync::Arc;

use async_trait::async_trait;
use querybot_core::{CommandInvocation, InvocationLog, InvocationLogEntry, QueryBotError};
use tracing::{info, warn};

use crate::{
    api::SlackApi,
    blocks,
    events::{EventContext, EventHandlerError, HandlerResult, SlashCommandService},
};

/// Handles the configured slash command: resolve the caller's name, record the
/// invocation, then open the query form.
pub struct QueryCommandService {
    slack: Arc<dyn SlackApi>,
    invocation_log: Arc<dyn InvocationLog>,
    command: String,
}

impl QueryCommandService {
    pub fn new(
        slack: Arc<dyn SlackApi>,
        invocation_log: Arc<dyn InvocationLog>,
        command: impl Into<String>,
    ) -> Self {
        Self { slack, invocation_log, command: command.into() }
    }

    async fn run(
        &self,
        invocation: &CommandInvocation,
        ctx: &EventContext,
    ) -> Result<(), QueryBotError> {
        let display_name = self
            .slack
            .user_display_name(&invocation.user_id)
            .await
            .map_err(|error| QueryBotError::Lookup(error.to_string()))?;

        let entry = InvocationLogEntry::new(
            invocation.received_at,
            invocation.user_id.clone(),
            display_name,
        );
        self.invocation_log.record(&entry).await?;

        let view = blocks::query_modal(&invocation.channel_id)?;
        self.slack
            .open_view(&invocation.trigger_id, &view)
            .await
            .map_err(|error| QueryBotError::Delivery(error.to_string()))?;

        info!(
            event_name = "querybot.command.modal_opened",
            correlation_id = %ctx.correlation_id,
            user_id = %invocation.user_id.as_str(),
            channel_id = %invocation.channel_id.as_str(),
            "query modal opened"
        );
        Ok(())
    }
}

#[async_trait]
impl SlashCommandService for QueryCommandService {
    async fn handle_command(
        &self,
        invocation: &CommandInvocation,
        ctx: &EventContext,
    ) -> Result<HandlerResult, EventHandlerError> {
        if invocation.command.trim() != self.command {
            return Err(EventHandlerError::UnsupportedCommand(invocation.command.clone()));
        }

        let Err(error) = self.run(invocation, ctx).await else {
            return Ok(HandlerResult::Processed);
        };

        warn!(
            event_name = "querybot.command.failed",
            correlation_id = %ctx.correlation_id,
            user_id = %invocation.user_id.as_str(),
            channel_id = %invocation.channel_id.as_str(),
            error_kind = error.kind().as_str(),
            error = %error,
            "slash command flow failed; reporting to channel"
        );

        let channel = invocation.channel_id.as_str();
        let message = blocks::error_message(&error, &ctx.correlation_id);
        match self.slack.post_message(channel, &message).await {
            Ok(()) => Ok(HandlerResult::Reported(error.kind())),
            Err(source) => Err(EventHandlerError::Report {
                original: error,
                target: channel.to_owned(),
                source,
            }),
        }
    }
}
