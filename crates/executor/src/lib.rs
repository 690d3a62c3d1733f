//! External executor integration.
//!
//! A submitted query is wrapped in a [`querybot_core::DispatchPayload`] and
//! handed to a named cloud function:
//!
//! - **Client** (`client`) - `Executor` trait and the HTTPS implementation
//! - **Dispatcher** (`dispatcher`) - invokes a function and reports the outcome
//!   to the local log; failures never escape to the Slack flow

pub mod client;
pub mod dispatcher;

pub use client::{Executor, ExecutorError, HttpExecutor};
pub use dispatcher::{DispatchOutcome, Dispatcher};
