use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UserId(pub String);

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChannelId(pub String);

/// Single-use handle Slack hands out with an interaction; required to open a modal.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriggerId(pub String);

impl UserId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl ChannelId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TriggerId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandInvocation {
    pub command: String,
    pub text: String,
    pub user_id: UserId,
    pub channel_id: ChannelId,
    pub trigger_id: TriggerId,
    pub received_at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormSubmission {
    pub user_id: UserId,
    pub trigger_id: TriggerId,
    pub callback_id: String,
    /// Channel the modal was opened from, recovered from the view's private metadata.
    pub origin_channel: Option<ChannelId>,
    /// Input values as submitted; `value` is `None` when a field was left empty.
    pub values: Vec<SubmittedValue>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmittedValue {
    pub block_id: String,
    pub action_id: String,
    pub value: Option<String>,
}

impl FormSubmission {
    pub fn value(&self, block_id: &str, action_id: &str) -> Option<&str> {
        self.values
            .iter()
            .find(|entry| entry.block_id == block_id && entry.action_id == action_id)
            .and_then(|entry| entry.value.as_deref())
    }
}
