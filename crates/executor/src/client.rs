use std::time::Duration;

use async_trait::async_trait;
use querybot_core::config::ExecutorConfig;
use querybot_core::DispatchPayload;
use secrecy::{ExposeSecret, SecretString};
use serde_json::Value;
use thiserror::Error;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ExecutorError {
    #[error("executor is not configured")]
    NotConfigured,
    #[error("executor request failed: {0}")]
    Http(String),
    #[error("executor returned HTTP {status}: {body}")]
    Status { status: u16, body: String },
    #[error("executor response was not valid JSON: {0}")]
    Decode(String),
    #[error("function `{function_name}` raised an error: {message}")]
    Function { function_name: String, message: String },
}

#[async_trait]
pub trait Executor: Send + Sync {
    async fn invoke(
        &self,
        function_name: &str,
        payload: &DispatchPayload,
    ) -> Result<Value, ExecutorError>;
}

/// Invokes functions exposed at `{base_url}/{function_name}` with a JSON POST.
pub struct HttpExecutor {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<SecretString>,
}

impl HttpExecutor {
    pub fn new(
        base_url: impl Into<String>,
        api_key: Option<SecretString>,
        timeout: Duration,
    ) -> Result<Self, ExecutorError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|error| ExecutorError::Http(error.to_string()))?;
        Ok(Self { client, base_url: base_url.into(), api_key })
    }

    pub fn from_config(config: &ExecutorConfig) -> Result<Self, ExecutorError> {
        let base_url = config.base_url.clone().ok_or(ExecutorError::NotConfigured)?;
        Self::new(base_url, config.api_key.clone(), Duration::from_secs(config.timeout_secs))
    }

    pub fn function_url(&self, function_name: &str) -> String {
        format!("{}/{}", self.base_url.trim_end_matches('/'), function_name.trim_matches('/'))
    }
}

#[async_trait]
impl Executor for HttpExecutor {
    async fn invoke(
        &self,
        function_name: &str,
        payload: &DispatchPayload,
    ) -> Result<Value, ExecutorError> {
        let mut request = self.client.post(self.function_url(function_name)).json(payload);
        if let Some(api_key) = &self.api_key {
            request = request.bearer_auth(api_key.expose_secret());
        }

        let response = request.send().await.map_err(|error| ExecutorError::Http(error.to_string()))?;
        let status = response.status();
        let body = response.text().await.map_err(|error| ExecutorError::Http(error.to_string()))?;

        if !status.is_success() {
            return Err(ExecutorError::Status { status: status.as_u16(), body });
        }

        parse_function_response(function_name, &body)
    }
}

/// Functions report their own failures in-band with an `errorMessage` field.
pub fn parse_function_response(function_name: &str, body: &str) -> Result<Value, ExecutorError> {
    let value: Value =
        serde_json::from_str(body).map_err(|error| ExecutorError::Decode(error.to_string()))?;

    if let Some(message) = value.get("errorMessage").and_then(Value::as_str) {
        return Err(ExecutorError::Function {
            function_name: function_name.to_owned(),
            message: message.to_owned(),
        });
    }

    Ok(value)
}
