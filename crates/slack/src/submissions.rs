use std::sync::Arc;

use async_trait::async_trait;
use querybot_core::{DispatchPayload, FormSubmission, QueryBotError};
use querybot_executor::Dispatcher;
use tracing::{info, warn};

use crate::{
    api::SlackApi,
    blocks::{self, QUERY_ACTION_ID, QUERY_BLOCK_ID, QUERY_MODAL_CALLBACK_ID},
    events::{EventContext, EventHandlerError, HandlerResult, ViewSubmissionService},
};

/// Handles submissions of the query form: extract the query, build the
/// executor payload, confirm by DM, and dispatch when an executor is wired in.
pub struct QuerySubmissionService {
    slack: Arc<dyn SlackApi>,
    dispatcher: Option<Arc<Dispatcher>>,
}

impl QuerySubmissionService {
    pub fn new(slack: Arc<dyn SlackApi>) -> Self {
        Self { slack, dispatcher: None }
    }

    pub fn with_dispatcher(mut self, dispatcher: Arc<Dispatcher>) -> Self {
        self.dispatcher = Some(dispatcher);
        self
    }

    pub fn dispatch_enabled(&self) -> bool {
        self.dispatcher.is_some()
    }

    /// Runs the submission flow and returns the payload that was built.
    pub async fn run(
        &self,
        submission: &FormSubmission,
        ctx: &EventContext,
    ) -> Result<DispatchPayload, QueryBotError> {
        let query = submission.value(QUERY_BLOCK_ID, QUERY_ACTION_ID).ok_or_else(|| {
            QueryBotError::Validation(format!(
                "no value for `{QUERY_BLOCK_ID}.{QUERY_ACTION_ID}` in submitted form"
            ))
        })?;

        let display_name = self
            .slack
            .user_display_name(&submission.user_id)
            .await
            .map_err(|error| QueryBotError::Lookup(error.to_string()))?;

        let payload = DispatchPayload::new(query)?;
        info!(
            event_name = "querybot.submission.payload_built",
            correlation_id = %ctx.correlation_id,
            user_id = %submission.user_id.as_str(),
            payload = %payload.to_json()?,
            "dispatch payload built"
        );

        let confirmation = blocks::submission_confirmation(&display_name, &payload.query);
        self.slack
            .post_message(submission.user_id.as_str(), &confirmation)
            .await
            .map_err(|error| QueryBotError::Delivery(error.to_string()))?;

        if let Some(dispatcher) = &self.dispatcher {
            // Outcome is logged by the dispatcher; the user already has their confirmation.
            dispatcher.dispatch(&payload, &ctx.correlation_id).await;
        }

        Ok(payload)
    }
}

#[async_trait]
impl ViewSubmissionService for QuerySubmissionService {
    async fn handle_submission(
        &self,
        submission: &FormSubmission,
        ctx: &EventContext,
    ) -> Result<HandlerResult, EventHandlerError> {
        if submission.callback_id != QUERY_MODAL_CALLBACK_ID {
            return Ok(HandlerResult::Ignored);
        }

        let Err(error) = self.run(submission, ctx).await else {
            return Ok(HandlerResult::Processed);
        };

        warn!(
            event_name = "querybot.submission.failed",
            correlation_id = %ctx.correlation_id,
            user_id = %submission.user_id.as_str(),
            error_kind = error.kind().as_str(),
            error = %error,
            "form submission flow failed; reporting by direct message"
        );

        let user = submission.user_id.as_str();
        let message = blocks::error_message(&error, &ctx.correlation_id);
        match self.slack.post_message(user, &message).await {
            Ok(()) => Ok(HandlerResult::Reported(error.kind())),
            Err(source) => {
                Err(EventHandlerError::Report { original: error, target: user.to_owned(), source })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::Arc;

    use async_trait::async_trait;
    use querybot_core::{
        ChannelId, DispatchPayload, ErrorKind, FormSubmission, QueryBotError, SubmittedValue,
        TriggerId, UserId,
    };
    use querybot_executor::{Dispatcher, Executor, ExecutorError};
    use serde_json::{json, Value};
    use tokio::sync::Mutex;

    use super::QuerySubmissionService;
    use crate::api::SlackApiError;
    use crate::blocks::{QUERY_ACTION_ID, QUERY_BLOCK_ID, QUERY_MODAL_CALLBACK_ID};
    use crate::events::{EventContext, HandlerResult, ViewSubmissionService};
    use crate::test_support::{Journal, RecordingSlackApi};

    struct JournalingExecutor {
        journal: Journal,
        responses: Mutex<VecDeque<Result<Value, ExecutorError>>>,
        payloads: Mutex<Vec<Value>>,
    }

    impl JournalingExecutor {
        fn new(journal: Journal, responses: Vec<Result<Value, ExecutorError>>) -> Self {
            Self { journal, responses: Mutex::new(responses.into()), payloads: Mutex::default() }
        }
    }

    #[async_trait]
    impl Executor for JournalingExecutor {
        async fn invoke(
            &self,
            function_name: &str,
            payload: &DispatchPayload,
        ) -> Result<Value, ExecutorError> {
            self.journal.push(format!("executor:{function_name}"));
            self.payloads.lock().await.push(payload.to_json().expect("payload json"));
            self.responses.lock().await.pop_front().unwrap_or(Ok(Value::Null))
        }
    }

    fn submission(query: Option<&str>) -> FormSubmission {
        FormSubmission {
            user_id: UserId("U1".to_owned()),
            trigger_id: TriggerId("trigger-2".to_owned()),
            callback_id: QUERY_MODAL_CALLBACK_ID.to_owned(),
            origin_channel: Some(ChannelId("C1".to_owned())),
            values: vec![SubmittedValue {
                block_id: QUERY_BLOCK_ID.to_owned(),
                action_id: QUERY_ACTION_ID.to_owned(),
                value: query.map(str::to_owned),
            }],
        }
    }

    fn context() -> EventContext {
        EventContext { correlation_id: "env-2".to_owned() }
    }

    #[tokio::test]
    async fn builds_payload_and_confirms_by_direct_message() {
        let slack = Arc::new(RecordingSlackApi::default().with_display_name("U1", "Ada"));
        let service = QuerySubmissionService::new(slack.clone());

        let payload = service.run(&submission(Some("SELECT 1")), &context()).await.expect("run");

        assert_eq!(payload.to_json().expect("json"), json!({ "query": "SELECT 1" }));
        let posts = slack.posted_messages();
        assert_eq!(posts.len(), 1);
        assert_eq!(posts[0].0, "U1");
        assert!(posts[0].1.fallback_text.contains("Ada"));
        assert!(!service.dispatch_enabled());
    }

    #[tokio::test]
    async fn lookup_failure_dms_literal_error_text() {
        let lookup_error = SlackApiError::Api {
            method: "users.info".to_owned(),
            error: "user_not_found".to_owned(),
        };
        let slack = Arc::new(RecordingSlackApi::default().failing_lookup(lookup_error.clone()));
        let service = QuerySubmissionService::new(slack.clone());

        let result = service.handle_submission(&submission(Some("SELECT 1")), &context()).await;

        assert_eq!(result, Ok(HandlerResult::Reported(ErrorKind::Lookup)));
        let posts = slack.posted_messages();
        assert_eq!(posts.len(), 1);
        assert_eq!(posts[0].0, "U1");
        let expected = QueryBotError::Lookup(lookup_error.to_string()).to_string();
        assert!(posts[0].1.fallback_text.contains(&expected));
    }

    #[tokio::test]
    async fn empty_field_is_a_validation_error() {
        let slack = Arc::new(RecordingSlackApi::default());
        let service = QuerySubmissionService::new(slack.clone());

        let result = service.handle_submission(&submission(None), &context()).await;

        assert_eq!(result, Ok(HandlerResult::Reported(ErrorKind::Validation)));
        assert!(slack.posted_messages()[0].1.fallback_text.contains("query_block.query_input"));
    }

    #[tokio::test]
    async fn other_forms_are_ignored() {
        let slack = Arc::new(RecordingSlackApi::default());
        let service = QuerySubmissionService::new(slack.clone());
        let mut other = submission(Some("SELECT 1"));
        other.callback_id = "feedback_modal".to_owned();

        let result = service.handle_submission(&other, &context()).await;

        assert_eq!(result, Ok(HandlerResult::Ignored));
        assert!(slack.posted_messages().is_empty());
    }

    #[tokio::test]
    async fn enabled_dispatcher_runs_after_confirmation() {
        let journal = Journal::default();
        let slack = Arc::new(RecordingSlackApi::default().with_journal(journal.clone()));
        let executor = Arc::new(JournalingExecutor::new(journal.clone(), vec![Ok(json!({}))]));
        let service = QuerySubmissionService::new(slack)
            .with_dispatcher(Arc::new(Dispatcher::new(executor.clone(), "query-runner")));

        let result = service.handle_submission(&submission(Some("SELECT 1")), &context()).await;

        assert_eq!(result, Ok(HandlerResult::Processed));
        assert_eq!(
            journal.entries(),
            vec!["users.info:U1", "chat.postMessage:U1", "executor:query-runner"]
        );
        assert_eq!(*executor.payloads.lock().await, vec![json!({ "query": "SELECT 1" })]);
    }

    #[tokio::test]
    async fn dispatch_failure_does_not_fail_the_submission() {
        let journal = Journal::default();
        let slack = Arc::new(RecordingSlackApi::default().with_journal(journal.clone()));
        let executor = Arc::new(JournalingExecutor::new(
            journal,
            vec![Err(ExecutorError::Status { status: 502, body: "bad gateway".to_owned() })],
        ));
        let service = QuerySubmissionService::new(slack.clone())
            .with_dispatcher(Arc::new(Dispatcher::new(executor, "query-runner")));

        let result = service.handle_submission(&submission(Some("SELECT 1")), &context()).await;

        assert_eq!(result, Ok(HandlerResult::Processed));
        assert_eq!(slack.posted_messages().len(), 1);
    }
}
