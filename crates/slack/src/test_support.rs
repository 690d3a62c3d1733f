use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use querybot_core::{TriggerId, UserId};

use crate::api::{SlackApi, SlackApiError};
use crate::blocks::{MessageTemplate, ModalView};

/// Ordered record of side effects shared between fakes.
#[derive(Clone, Default)]
pub struct Journal(Arc<Mutex<Vec<String>>>);

impl Journal {
    pub fn push(&self, entry: impl Into<String>) {
        self.0.lock().expect("journal lock").push(entry.into());
    }

    pub fn entries(&self) -> Vec<String> {
        self.0.lock().expect("journal lock").clone()
    }
}

#[derive(Default)]
pub struct RecordingSlackApi {
    journal: Journal,
    display_names: HashMap<String, String>,
    lookup_error: Option<SlackApiError>,
    open_view_error: Option<SlackApiError>,
    post_error: Option<SlackApiError>,
    views: Mutex<Vec<(String, ModalView)>>,
    messages: Mutex<Vec<(String, MessageTemplate)>>,
}

impl RecordingSlackApi {
    pub fn with_journal(mut self, journal: Journal) -> Self {
        self.journal = journal;
        self
    }

    pub fn with_display_name(mut self, user_id: &str, name: &str) -> Self {
        self.display_names.insert(user_id.to_owned(), name.to_owned());
        self
    }

    pub fn failing_lookup(mut self, error: SlackApiError) -> Self {
        self.lookup_error = Some(error);
        self
    }

    pub fn failing_open_view(mut self, error: SlackApiError) -> Self {
        self.open_view_error = Some(error);
        self
    }

    pub fn failing_post(mut self, error: SlackApiError) -> Self {
        self.post_error = Some(error);
        self
    }

    pub fn opened_views(&self) -> Vec<(String, ModalView)> {
        self.views.lock().expect("views lock").clone()
    }

    pub fn posted_messages(&self) -> Vec<(String, MessageTemplate)> {
        self.messages.lock().expect("messages lock").clone()
    }
}

#[async_trait]
impl SlackApi for RecordingSlackApi {
    async fn user_display_name(&self, user_id: &UserId) -> Result<String, SlackApiError> {
        self.journal.push(format!("users.info:{}", user_id.as_str()));
        if let Some(error) = &self.lookup_error {
            return Err(error.clone());
        }
        Ok(self
            .display_names
            .get(user_id.as_str())
            .cloned()
            .unwrap_or_else(|| format!("name-{}", user_id.as_str())))
    }

    async fn open_view(
        &self,
        trigger_id: &TriggerId,
        view: &ModalView,
    ) -> Result<(), SlackApiError> {
        self.journal.push(format!("views.open:{}", trigger_id.as_str()));
        if let Some(error) = &self.open_view_error {
            return Err(error.clone());
        }
        self.views.lock().expect("views lock").push((trigger_id.as_str().to_owned(), view.clone()));
        Ok(())
    }

    async fn post_message(
        &self,
        channel: &str,
        message: &MessageTemplate,
    ) -> Result<(), SlackApiError> {
        self.journal.push(format!("chat.postMessage:{channel}"));
        if let Some(error) = &self.post_error {
            return Err(error.clone());
        }
        self.messages.lock().expect("messages lock").push((channel.to_owned(), message.clone()));
        Ok(())
    }
}
