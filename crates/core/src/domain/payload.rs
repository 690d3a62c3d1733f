use serde::{Deserialize, Serialize};

use crate::errors::QueryBotError;

/// Body forwarded to the external executor: `{"query": "<text>"}`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchPayload {
    pub query: String,
}

impl DispatchPayload {
    pub fn new(query: impl Into<String>) -> Result<Self, QueryBotError> {
        let query = query.into();
        if query.trim().is_empty() {
            return Err(QueryBotError::Validation("query text must not be empty".to_owned()));
        }
        Ok(Self { query })
    }

    pub fn to_json(&self) -> Result<serde_json::Value, QueryBotError> {
        serde_json::to_value(self).map_err(|error| QueryBotError::Dispatch(error.to_string()))
    }
}
