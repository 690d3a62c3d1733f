use async_trait::async_trait;
use querybot_core::{TriggerId, UserId};
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use serde_json::{json, Value};
use thiserror::Error;
use tracing::debug;

use crate::blocks::{MessageTemplate, ModalView};

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum SlackApiError {
    #[error("{method} request failed: {message}")]
    Http { method: String, message: String },
    #[error("{method} returned error `{error}`")]
    Api { method: String, error: String },
    #[error("{method} response could not be decoded: {message}")]
    Decode { method: String, message: String },
}

/// Outbound Web API calls the handlers depend on.
#[async_trait]
pub trait SlackApi: Send + Sync {
    async fn user_display_name(&self, user_id: &UserId) -> Result<String, SlackApiError>;
    async fn open_view(&self, trigger_id: &TriggerId, view: &ModalView)
        -> Result<(), SlackApiError>;
    /// `channel` may be a channel id or a user id; the latter delivers a DM.
    async fn post_message(
        &self,
        channel: &str,
        message: &MessageTemplate,
    ) -> Result<(), SlackApiError>;
}

pub struct SlackWebClient {
    http: reqwest::Client,
    base_url: String,
    bot_token: SecretString,
}

impl SlackWebClient {
    pub fn new(base_url: impl Into<String>, bot_token: SecretString) -> Self {
        Self { http: reqwest::Client::new(), base_url: base_url.into(), bot_token }
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/{method}", self.base_url.trim_end_matches('/'))
    }

    async fn post_json<B>(&self, method: &str, body: &B) -> Result<Value, SlackApiError>
    where
        B: Serialize + Sync,
    {
        let response = self
            .http
            .post(self.method_url(method))
            .bearer_auth(self.bot_token.expose_secret())
            .json(body)
            .send()
            .await
            .map_err(|error| http_error(method, error))?;
        read_response(method, response).await
    }

    async fn get(&self, method: &str, query: &[(&str, &str)]) -> Result<Value, SlackApiError> {
        let response = self
            .http
            .get(self.method_url(method))
            .bearer_auth(self.bot_token.expose_secret())
            .query(query)
            .send()
            .await
            .map_err(|error| http_error(method, error))?;
        read_response(method, response).await
    }
}

#[async_trait]
impl SlackApi for SlackWebClient {
    async fn user_display_name(&self, user_id: &UserId) -> Result<String, SlackApiError> {
        let body = self.get("users.info", &[("user", user_id.as_str())]).await?;
        display_name_from_user(&body["user"]).ok_or_else(|| SlackApiError::Decode {
            method: "users.info".to_owned(),
            message: format!("no usable name for user {}", user_id.as_str()),
        })
    }

    async fn open_view(
        &self,
        trigger_id: &TriggerId,
        view: &ModalView,
    ) -> Result<(), SlackApiError> {
        let body = json!({ "trigger_id": trigger_id.as_str(), "view": view });
        self.post_json("views.open", &body).await?;
        debug!(callback_id = %view.callback_id, "slack modal opened");
        Ok(())
    }

    async fn post_message(
        &self,
        channel: &str,
        message: &MessageTemplate,
    ) -> Result<(), SlackApiError> {
        let body = json!({
            "channel": channel,
            "text": message.fallback_text,
            "blocks": message.blocks,
        });
        self.post_json("chat.postMessage", &body).await?;
        debug!(channel, "slack message posted");
        Ok(())
    }
}

fn http_error(method: &str, error: reqwest::Error) -> SlackApiError {
    SlackApiError::Http { method: method.to_owned(), message: error.to_string() }
}

async fn read_response(method: &str, response: reqwest::Response) -> Result<Value, SlackApiError> {
    let status = response.status();
    let text = response.text().await.map_err(|error| http_error(method, error))?;
    if !status.is_success() {
        return Err(SlackApiError::Http {
            method: method.to_owned(),
            message: format!("HTTP {status}: {text}"),
        });
    }
    parse_api_body(method, &text)
}

/// Slack reports failures in-band as `{"ok": false, "error": "..."}`.
pub fn parse_api_body(method: &str, text: &str) -> Result<Value, SlackApiError> {
    let body: Value = serde_json::from_str(text).map_err(|error| SlackApiError::Decode {
        method: method.to_owned(),
        message: error.to_string(),
    })?;

    if body.get("ok").and_then(Value::as_bool).unwrap_or(false) {
        return Ok(body);
    }

    let error = body.get("error").and_then(Value::as_str).unwrap_or("unknown_error");
    Err(SlackApiError::Api { method: method.to_owned(), error: error.to_owned() })
}

/// Profile display name, then the profile's real name, then the account's
/// real name, then the handle.
pub fn display_name_from_user(user: &Value) -> Option<String> {
    let candidates = [
        &user["profile"]["display_name"],
        &user["profile"]["real_name"],
        &user["real_name"],
        &user["name"],
    ];
    candidates
        .into_iter()
        .filter_map(Value::as_str)
        .map(str::trim)
        .find(|name| !name.is_empty())
        .map(str::to_owned)
}
