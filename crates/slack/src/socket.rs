use std::future::Future;
use std::pin::{pin, Pin};
use std::{sync::Arc, time::Duration};

use anyhow::Result;
use async_trait::async_trait;
use thiserror::Error;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::events::{
    EventContext, EventDispatcher, LoggingErrorHook, SlackEnvelope, UnhandledErrorHook,
};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("transport failed to connect: {0}")]
    Connect(String),
    #[error("transport read failed: {0}")]
    Receive(String),
    #[error("transport ack failed: {0}")]
    Acknowledge(String),
    #[error("transport disconnect failed: {0}")]
    Disconnect(String),
    /// Slack asked us to reconnect (connection refresh, close frame, stream end).
    #[error("server closed the connection: {0}")]
    ServerDisconnect(String),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self { max_retries: 5, base_delay_ms: 250, max_delay_ms: 5_000 }
    }
}

impl ReconnectPolicy {
    fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.min(16);
        let multiplier = 1_u64 << exponent;
        let delay_ms = self.base_delay_ms.saturating_mul(multiplier).min(self.max_delay_ms);
        Duration::from_millis(delay_ms)
    }
}

#[async_trait]
pub trait SocketTransport: Send + Sync {
    async fn connect(&self) -> Result<(), TransportError>;
    async fn next_envelope(&self) -> Result<Option<SlackEnvelope>, TransportError>;
    async fn acknowledge(&self, envelope_id: &str) -> Result<(), TransportError>;
    async fn disconnect(&self) -> Result<(), TransportError>;
}

#[derive(Default)]
pub struct NoopSocketTransport;

#[async_trait]
impl SocketTransport for NoopSocketTransport {
    async fn connect(&self) -> Result<(), TransportError> {
        Ok(())
    }

    async fn next_envelope(&self) -> Result<Option<SlackEnvelope>, TransportError> {
        Ok(None)
    }

    async fn acknowledge(&self, _envelope_id: &str) -> Result<(), TransportError> {
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), TransportError> {
        Ok(())
    }
}

pub struct SocketModeRunner {
    transport: Arc<dyn SocketTransport>,
    dispatcher: Arc<EventDispatcher>,
    error_hook: Arc<dyn UnhandledErrorHook>,
    reconnect_policy: ReconnectPolicy,
    drain_timeout: Duration,
}

impl Default for SocketModeRunner {
    fn default() -> Self {
        Self {
            transport: Arc::new(NoopSocketTransport),
            dispatcher: Arc::new(EventDispatcher::default()),
            error_hook: Arc::new(LoggingErrorHook),
            reconnect_policy: ReconnectPolicy::default(),
            drain_timeout: DEFAULT_DRAIN_TIMEOUT,
        }
    }
}

const DEFAULT_DRAIN_TIMEOUT: Duration = Duration::from_secs(15);

impl SocketModeRunner {
    pub fn new(
        transport: Arc<dyn SocketTransport>,
        dispatcher: EventDispatcher,
        error_hook: Arc<dyn UnhandledErrorHook>,
        reconnect_policy: ReconnectPolicy,
    ) -> Self {
        Self {
            transport,
            dispatcher: Arc::new(dispatcher),
            error_hook,
            reconnect_policy,
            drain_timeout: DEFAULT_DRAIN_TIMEOUT,
        }
    }

    /// Upper bound on waiting for acknowledged envelopes once a connection ends.
    pub fn with_drain_timeout(mut self, drain_timeout: Duration) -> Self {
        self.drain_timeout = drain_timeout;
        self
    }

    pub fn handler_count(&self) -> usize {
        self.dispatcher.handler_count()
    }

    /// Pumps envelopes until the transport stream closes cleanly or retries run
    /// out. Retries count consecutive failed connects: every successful connect
    /// and every server-requested disconnect restores the full budget.
    pub async fn start(&self) -> Result<()> {
        self.run_until(std::future::pending::<()>()).await
    }

    /// Like [`Self::start`], but stops reading new envelopes once `shutdown`
    /// resolves. Envelopes already acknowledged still get `drain_timeout` to finish.
    pub async fn run_until<F>(&self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        let mut shutdown = pin!(shutdown);
        let mut attempt = 0;
        loop {
            match self.connect_and_pump(&mut attempt, shutdown.as_mut()).await {
                Ok(()) => return Ok(()),
                Err(TransportError::ServerDisconnect(reason)) => {
                    info!(
                        event_name = "ingress.slack.server_disconnect",
                        reason = %reason,
                        "slack closed the socket; reconnecting"
                    );
                    attempt = 0;
                }
                Err(transport_error) => {
                    warn!(
                        attempt,
                        max_retries = self.reconnect_policy.max_retries,
                        error = %transport_error,
                        "socket mode transport failed"
                    );

                    if attempt >= self.reconnect_policy.max_retries {
                        warn!(
                            max_retries = self.reconnect_policy.max_retries,
                            "socket mode retries exhausted; continuing process without crash"
                        );
                        return Ok(());
                    }

                    let delay = self.reconnect_policy.backoff(attempt);
                    tokio::select! {
                        () = tokio::time::sleep(delay) => {}
                        () = shutdown.as_mut() => {
                            info!(event_name = "ingress.slack.shutdown", "shutdown requested during backoff");
                            return Ok(());
                        }
                    }
                    attempt += 1;
                }
            }
        }
    }

    async fn connect_and_pump<F>(
        &self,
        attempt: &mut u32,
        shutdown: Pin<&mut F>,
    ) -> Result<(), TransportError>
    where
        F: Future<Output = ()>,
    {
        info!(attempt = *attempt, "opening socket mode transport connection");
        self.transport.connect().await?;
        info!(attempt = *attempt, "socket mode transport connected");
        *attempt = 0;

        let mut in_flight = JoinSet::new();
        let result = self.pump(&mut in_flight, shutdown).await;
        self.drain(&mut in_flight).await;

        result
    }

    // Handlers already acknowledged to Slack get to run to completion, within bounds.
    async fn drain(&self, in_flight: &mut JoinSet<()>) {
        if in_flight.is_empty() {
            return;
        }

        let pending = in_flight.len();
        let joined_all = tokio::time::timeout(self.drain_timeout, async {
            while let Some(joined) = in_flight.join_next().await {
                if let Err(error) = joined {
                    warn!(error = %error, "slack envelope task ended abnormally");
                }
            }
        })
        .await;

        if joined_all.is_err() {
            warn!(
                pending,
                remaining = in_flight.len(),
                drain_timeout_ms = self.drain_timeout.as_millis() as u64,
                "in-flight slack envelopes did not finish in time; aborting"
            );
            in_flight.abort_all();
        }
    }

    async fn pump<F>(
        &self,
        in_flight: &mut JoinSet<()>,
        mut shutdown: Pin<&mut F>,
    ) -> Result<(), TransportError>
    where
        F: Future<Output = ()>,
    {
        loop {
            let next = tokio::select! {
                biased;
                () = shutdown.as_mut() => {
                    info!(
                        event_name = "ingress.slack.shutdown",
                        in_flight = in_flight.len(),
                        "shutdown requested; closing socket mode transport"
                    );
                    self.transport.disconnect().await?;
                    return Ok(());
                }
                next = self.transport.next_envelope() => next?,
            };

            let Some(envelope) = next else {
                info!("socket mode transport stream closed");
                self.transport.disconnect().await?;
                return Ok(());
            };
            let (user_id, channel_id) = correlation_fields(&envelope);

            info!(
                event_name = "ingress.slack.envelope_received",
                envelope_id = %envelope.envelope_id,
                event_type = ?envelope.event.event_type(),
                correlation_id = %envelope.envelope_id,
                user_id = user_id.unwrap_or("unknown"),
                channel_id = channel_id.unwrap_or("unknown"),
                "received slack envelope"
            );

            if let Err(error) = self.transport.acknowledge(&envelope.envelope_id).await {
                warn!(
                    event_name = "ingress.slack.ack_sent",
                    envelope_id = %envelope.envelope_id,
                    correlation_id = %envelope.envelope_id,
                    error = %error,
                    "failed to acknowledge slack envelope"
                );
            } else {
                debug!(
                    event_name = "ingress.slack.ack_sent",
                    envelope_id = %envelope.envelope_id,
                    correlation_id = %envelope.envelope_id,
                    "acknowledged slack envelope"
                );
            }

            let dispatcher = Arc::clone(&self.dispatcher);
            let error_hook = Arc::clone(&self.error_hook);
            in_flight.spawn(async move {
                let context = EventContext { correlation_id: envelope.envelope_id.clone() };
                if let Err(error) = dispatcher.dispatch(&envelope, &context).await {
                    error_hook.on_unhandled(&envelope, &error).await;
                }
            });

            // Reap finished tasks so a long-lived connection does not accumulate them.
            while let Some(joined) = in_flight.try_join_next() {
                if let Err(error) = joined {
                    warn!(error = %error, "slack envelope task ended abnormally");
                }
            }
        }
    }
}

fn correlation_fields(envelope: &SlackEnvelope) -> (Option<&str>, Option<&str>) {
    (envelope.event.user_id(), envelope.event.reply_channel())
}
