//! Querybot core: configuration, the user-facing error taxonomy, the records
//! exchanged during one slash command round trip, and the invocation log.

pub mod config;
pub mod domain;
pub mod errors;
pub mod invocation_log;

pub use domain::invocation::{
    ChannelId, CommandInvocation, FormSubmission, SubmittedValue, TriggerId, UserId,
};
pub use domain::payload::DispatchPayload;
pub use errors::{ErrorKind, QueryBotError};
pub use invocation_log::{
    FileInvocationLog, InMemoryInvocationLog, InvocationLog, InvocationLogEntry,
};
