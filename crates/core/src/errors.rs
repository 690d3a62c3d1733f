use thiserror::Error;

/// Failures surfaced to Slack users. Every handler boundary maps its errors
/// into one of these kinds before rendering a message.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum QueryBotError {
    #[error("user lookup failed: {0}")]
    Lookup(String),
    #[error("dispatch failed: {0}")]
    Dispatch(String),
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("slack delivery failed: {0}")]
    Delivery(String),
    #[error("invocation log write failed: {0}")]
    Persistence(String),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Lookup,
    Dispatch,
    Validation,
    Delivery,
    Persistence,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Lookup => "lookup",
            Self::Dispatch => "dispatch",
            Self::Validation => "validation",
            Self::Delivery => "delivery",
            Self::Persistence => "persistence",
        }
    }
}

impl QueryBotError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Lookup(_) => ErrorKind::Lookup,
            Self::Dispatch(_) => ErrorKind::Dispatch,
            Self::Validation(_) => ErrorKind::Validation,
            Self::Delivery(_) => ErrorKind::Delivery,
            Self::Persistence(_) => ErrorKind::Persistence,
        }
    }

    /// Text posted back to Slack. Always carries the underlying error string.
    pub fn user_message(&self) -> String {
        let headline = match self.kind() {
            ErrorKind::Lookup => "Could not look up your Slack profile.",
            ErrorKind::Dispatch => "Could not hand your query to the executor.",
            ErrorKind::Validation => "Your request could not be processed.",
            ErrorKind::Delivery => "Could not reach Slack to complete your request.",
            ErrorKind::Persistence => "Could not record this invocation.",
        };
        format!(":warning: {headline} Error: {self}")
    }
}
