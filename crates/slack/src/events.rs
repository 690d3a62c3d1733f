use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use querybot_core::{CommandInvocation, ErrorKind, FormSubmission, QueryBotError};
use thiserror::Error;
use tracing::{error, warn};

use crate::{
    api::{SlackApi, SlackApiError},
    blocks,
};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SlackEnvelope {
    pub envelope_id: String,
    pub event: SlackEvent,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SlackEvent {
    SlashCommand(CommandInvocation),
    ViewSubmission(FormSubmission),
    Unsupported { event_type: String },
}

impl SlackEvent {
    pub fn event_type(&self) -> SlackEventType {
        match self {
            Self::SlashCommand(_) => SlackEventType::SlashCommand,
            Self::ViewSubmission(_) => SlackEventType::ViewSubmission,
            Self::Unsupported { .. } => SlackEventType::Unsupported,
        }
    }

    pub fn user_id(&self) -> Option<&str> {
        match self {
            Self::SlashCommand(invocation) => Some(invocation.user_id.as_str()),
            Self::ViewSubmission(submission) => Some(submission.user_id.as_str()),
            Self::Unsupported { .. } => None,
        }
    }

    /// Where a reply about this event belongs: the invoking channel for commands,
    /// the modal's origin channel for submissions, else a DM to the submitter.
    pub fn reply_channel(&self) -> Option<&str> {
        match self {
            Self::SlashCommand(invocation) => Some(invocation.channel_id.as_str()),
            Self::ViewSubmission(submission) => Some(
                submission
                    .origin_channel
                    .as_ref()
                    .map(|channel| channel.as_str())
                    .unwrap_or(submission.user_id.as_str()),
            ),
            Self::Unsupported { .. } => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum SlackEventType {
    SlashCommand,
    ViewSubmission,
    Unsupported,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EventContext {
    pub correlation_id: String,
}

impl Default for EventContext {
    fn default() -> Self {
        Self { correlation_id: "unknown-correlation-id".to_owned() }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum HandlerResult {
    Processed,
    /// The flow failed and the failure was reported back to the user.
    Reported(ErrorKind),
    Ignored,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum EventHandlerError {
    #[error("unsupported slash command: {0}")]
    UnsupportedCommand(String),
    #[error("could not report `{original}` to {target}: {source}")]
    Report { original: QueryBotError, target: String, source: SlackApiError },
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DispatchError {
    #[error(transparent)]
    Handler(#[from] EventHandlerError),
}

#[async_trait]
pub trait EventHandler: Send + Sync {
    fn event_type(&self) -> SlackEventType;
    async fn handle(
        &self,
        envelope: &SlackEnvelope,
        ctx: &EventContext,
    ) -> Result<HandlerResult, EventHandlerError>;
}

#[derive(Default)]
pub struct EventDispatcher {
    handlers: HashMap<SlackEventType, Arc<dyn EventHandler>>,
}

impl EventDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<H>(&mut self, handler: H)
    where
        H: EventHandler + 'static,
    {
        self.handlers.insert(handler.event_type(), Arc::new(handler));
    }

    pub async fn dispatch(
        &self,
        envelope: &SlackEnvelope,
        ctx: &EventContext,
    ) -> Result<HandlerResult, DispatchError> {
        let Some(handler) = self.handlers.get(&envelope.event.event_type()) else {
            return Ok(HandlerResult::Ignored);
        };

        handler.handle(envelope, ctx).await.map_err(DispatchError::from)
    }

    pub fn handler_count(&self) -> usize {
        self.handlers.len()
    }
}

/// Registers the slash-command and view-submission flows.
pub fn query_dispatcher<C, S>(commands: C, submissions: S) -> EventDispatcher
where
    C: SlashCommandService + 'static,
    S: ViewSubmissionService + 'static,
{
    let mut dispatcher = EventDispatcher::new();
    dispatcher.register(SlashCommandHandler::new(commands));
    dispatcher.register(ViewSubmissionHandler::new(submissions));
    dispatcher
}

#[async_trait]
pub trait SlashCommandService: Send + Sync {
    async fn handle_command(
        &self,
        invocation: &CommandInvocation,
        ctx: &EventContext,
    ) -> Result<HandlerResult, EventHandlerError>;
}

pub struct SlashCommandHandler<S> {
    service: S,
}

impl<S> SlashCommandHandler<S>
where
    S: SlashCommandService,
{
    pub fn new(service: S) -> Self {
        Self { service }
    }
}

#[async_trait]
impl<S> EventHandler for SlashCommandHandler<S>
where
    S: SlashCommandService + 'static,
{
    fn event_type(&self) -> SlackEventType {
        SlackEventType::SlashCommand
    }

    async fn handle(
        &self,
        envelope: &SlackEnvelope,
        ctx: &EventContext,
    ) -> Result<HandlerResult, EventHandlerError> {
        let SlackEvent::SlashCommand(invocation) = &envelope.event else {
            return Ok(HandlerResult::Ignored);
        };

        self.service.handle_command(invocation, ctx).await
    }
}

#[async_trait]
pub trait ViewSubmissionService: Send + Sync {
    async fn handle_submission(
        &self,
        submission: &FormSubmission,
        ctx: &EventContext,
    ) -> Result<HandlerResult, EventHandlerError>;
}

pub struct ViewSubmissionHandler<S> {
    service: S,
}

impl<S> ViewSubmissionHandler<S>
where
    S: ViewSubmissionService,
{
    pub fn new(service: S) -> Self {
        Self { service }
    }
}

#[async_trait]
impl<S> EventHandler for ViewSubmissionHandler<S>
where
    S: ViewSubmissionService + 'static,
{
    fn event_type(&self) -> SlackEventType {
        SlackEventType::ViewSubmission
    }

    async fn handle(
        &self,
        envelope: &SlackEnvelope,
        ctx: &EventContext,
    ) -> Result<HandlerResult, EventHandlerError> {
        let SlackEvent::ViewSubmission(submission) = &envelope.event else {
            return Ok(HandlerResult::Ignored);
        };

        self.service.handle_submission(submission, ctx).await
    }
}

/// Last-resort handler for errors that escaped a flow.
#[async_trait]
pub trait UnhandledErrorHook: Send + Sync {
    async fn on_unhandled(&self, envelope: &SlackEnvelope, error: &DispatchError);
}

#[derive(Default)]
pub struct LoggingErrorHook;

#[async_trait]
impl UnhandledErrorHook for LoggingErrorHook {
    async fn on_unhandled(&self, envelope: &SlackEnvelope, error: &DispatchError) {
        error!(
            event_name = "ingress.slack.unhandled_error",
            envelope_id = %envelope.envelope_id,
            correlation_id = %envelope.envelope_id,
            error = %error,
            "unhandled error while processing slack envelope"
        );
    }
}

/// Logs the error, then posts it to the channel the interaction came from.
pub struct ChannelErrorHook {
    slack: Arc<dyn SlackApi>,
}

impl ChannelErrorHook {
    pub fn new(slack: Arc<dyn SlackApi>) -> Self {
        Self { slack }
    }
}

#[async_trait]
impl UnhandledErrorHook for ChannelErrorHook {
    async fn on_unhandled(&self, envelope: &SlackEnvelope, error: &DispatchError) {
        LoggingErrorHook.on_unhandled(envelope, error).await;

        let Some(channel) = envelope.event.reply_channel() else {
            return;
        };
        let message = blocks::unhandled_error_message(&error.to_string(), &envelope.envelope_id);
        if let Err(post_error) = self.slack.post_message(channel, &message).await {
            warn!(
                event_name = "ingress.slack.unhandled_error_report_failed",
                envelope_id = %envelope.envelope_id,
                correlation_id = %envelope.envelope_id,
                channel,
                error = %post_error,
                "could not report unhandled error to slack"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use async_trait::async_trait;
    use chrono::Utc;
    use querybot_core::{
        ChannelId, CommandInvocation, FormSubmission, QueryBotError, TriggerId, UserId,
    };

    use super::{
        query_dispatcher, ChannelErrorHook, DispatchError, EventContext, EventDispatcher,
        EventHandlerError, HandlerResult, SlackEnvelope, SlackEvent, SlashCommandService,
        UnhandledErrorHook, ViewSubmissionService,
    };
    use crate::api::SlackApiError;
    use crate::test_support::RecordingSlackApi;

    struct FixedCommandService(HandlerResult);

    #[async_trait]
    impl SlashCommandService for FixedCommandService {
        async fn handle_command(
            &self,
            _invocation: &CommandInvocation,
            _ctx: &EventContext,
        ) -> Result<HandlerResult, EventHandlerError> {
            Ok(self.0.clone())
        }
    }

    struct FailingSubmissionService;

    #[async_trait]
    impl ViewSubmissionService for FailingSubmissionService {
        async fn handle_submission(
            &self,
            _submission: &FormSubmission,
            _ctx: &EventContext,
        ) -> Result<HandlerResult, EventHandlerError> {
            Err(EventHandlerError::UnsupportedCommand("/other".to_owned()))
        }
    }

    fn command_envelope() -> SlackEnvelope {
        SlackEnvelope {
            envelope_id: "env-1".to_owned(),
            event: SlackEvent::SlashCommand(CommandInvocation {
                command: "/query".to_owned(),
                text: String::new(),
                user_id: UserId("U1".to_owned()),
                channel_id: ChannelId("C1".to_owned()),
                trigger_id: TriggerId("trigger-1".to_owned()),
                received_at: Utc::now(),
            }),
        }
    }

    fn submission_envelope(origin_channel: Option<&str>) -> SlackEnvelope {
        SlackEnvelope {
            envelope_id: "env-2".to_owned(),
            event: SlackEvent::ViewSubmission(FormSubmission {
                user_id: UserId("U2".to_owned()),
                trigger_id: TriggerId("trigger-2".to_owned()),
                callback_id: "query_modal".to_owned(),
                origin_channel: origin_channel.map(|channel| ChannelId(channel.to_owned())),
                values: Vec::new(),
            }),
        }
    }

    #[tokio::test]
    async fn dispatcher_routes_slash_commands() {
        let dispatcher = query_dispatcher(
            FixedCommandService(HandlerResult::Processed),
            FailingSubmissionService,
        );

        let result = dispatcher
            .dispatch(&command_envelope(), &EventContext::default())
            .await
            .expect("dispatch");

        assert_eq!(result, HandlerResult::Processed);
        assert_eq!(dispatcher.handler_count(), 2);
    }

    #[tokio::test]
    async fn dispatcher_surfaces_handler_errors() {
        let dispatcher = query_dispatcher(
            FixedCommandService(HandlerResult::Processed),
            FailingSubmissionService,
        );

        let error = dispatcher
            .dispatch(&submission_envelope(None), &EventContext::default())
            .await
            .expect_err("handler error");

        assert_eq!(
            error,
            DispatchError::Handler(EventHandlerError::UnsupportedCommand("/other".to_owned()))
        );
    }

    #[tokio::test]
    async fn dispatcher_returns_ignored_when_no_handler_registered() {
        let dispatcher = EventDispatcher::new();
        let envelope = SlackEnvelope {
            envelope_id: "env-3".to_owned(),
            event: SlackEvent::Unsupported { event_type: "events_api".to_owned() },
        };

        let result =
            dispatcher.dispatch(&envelope, &EventContext::default()).await.expect("dispatch");

        assert_eq!(result, HandlerResult::Ignored);
    }

    #[test]
    fn reply_channel_falls_back_to_dm_for_submissions_without_origin() {
        assert_eq!(command_envelope().event.reply_channel(), Some("C1"));
        assert_eq!(submission_envelope(Some("C9")).event.reply_channel(), Some("C9"));
        assert_eq!(submission_envelope(None).event.reply_channel(), Some("U2"));
        assert_eq!(SlackEvent::Unsupported { event_type: "x".to_owned() }.reply_channel(), None);
    }

    #[tokio::test]
    async fn channel_hook_posts_error_text_to_origin_channel() {
        let slack = Arc::new(RecordingSlackApi::default());
        let hook = ChannelErrorHook::new(slack.clone());
        let error = DispatchError::Handler(EventHandlerError::Report {
            original: QueryBotError::Delivery("channel_not_found".to_owned()),
            target: "C1".to_owned(),
            source: SlackApiError::Api {
                method: "chat.postMessage".to_owned(),
                error: "not_in_channel".to_owned(),
            },
        });

        hook.on_unhandled(&command_envelope(), &error).await;

        let posts = slack.posted_messages();
        assert_eq!(posts.len(), 1);
        assert_eq!(posts[0].0, "C1");
        assert!(posts[0].1.fallback_text.contains("not_in_channel"));
        assert!(posts[0].1.fallback_text.contains("channel_not_found"));
    }

    #[tokio::test]
    async fn channel_hook_skips_unsupported_events() {
        let slack = Arc::new(RecordingSlackApi::default());
        let hook = ChannelErrorHook::new(slack.clone());
        let envelope = SlackEnvelope {
            envelope_id: "env-4".to_owned(),
            event: SlackEvent::Unsupported { event_type: "events_api".to_owned() },
        };

        hook.on_unhandled(
            &envelope,
            &DispatchError::Handler(EventHandlerError::UnsupportedCommand("/x".to_owned())),
        )
        .await;

        assert!(slack.posted_messages().is_empty());
    }
}
