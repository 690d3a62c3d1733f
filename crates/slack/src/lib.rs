//! Slack integration for querybot.
//!
//! - **Socket Mode** (`socket`, `transport`) - WebSocket connection to Slack with
//!   ack-first delivery and reconnect
//! - **Web API** (`api`) - user lookup, modal open, message post
//! - **Events** (`events`) - envelope model, dispatcher and the unhandled-error hook
//! - **Flows** (`commands`, `submissions`) - the slash command and form submission
//! - **Block Kit** (`blocks`) - typed modal and message builders
//!
//! ```text
//! Slack ── envelope ──► SocketModeRunner ── ack ──► Slack
//!                             │
//!                             ▼ (one task per envelope)
//!                      EventDispatcher ──► QueryCommandService / QuerySubmissionService
//!                             │                     │
//!                             ▼                     ▼
//!                     UnhandledErrorHook      SlackApi, InvocationLog, Dispatcher
//! ```

pub mod api;
pub mod blocks;
pub mod commands;
pub mod events;
pub mod socket;
pub mod submissions;
pub mod transport;

#[cfg(test)]
mod test_support;
