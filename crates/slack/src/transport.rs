use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures_util::{SinkExt, StreamExt};
use querybot_core::{
    ChannelId, CommandInvocation, FormSubmission, SubmittedValue, TriggerId, UserId,
};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::Value;
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio_tungstenite::{
    connect_async, tungstenite::protocol::Message, MaybeTlsStream, WebSocketStream,
};
use tracing::{debug, warn};

use crate::events::{SlackEnvelope, SlackEvent};
use crate::socket::{SocketTransport, TransportError};

type SocketStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// What a single Socket Mode text frame carries.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SocketFrame {
    Hello,
    Disconnect { reason: String },
    Envelope(SlackEnvelope),
}

#[derive(Deserialize)]
struct RawFrame {
    #[serde(rename = "type")]
    frame_type: String,
    envelope_id: Option<String>,
    #[serde(default)]
    payload: Value,
    reason: Option<String>,
}

#[derive(Deserialize)]
struct RawSlashCommand {
    command: String,
    #[serde(default)]
    text: String,
    user_id: String,
    channel_id: String,
    trigger_id: String,
}

#[derive(Deserialize)]
struct RawViewSubmission {
    user: RawUser,
    #[serde(default)]
    trigger_id: String,
    view: RawView,
}

#[derive(Deserialize)]
struct RawUser {
    id: String,
}

#[derive(Deserialize)]
struct RawView {
    callback_id: String,
    #[serde(default)]
    private_metadata: String,
    #[serde(default)]
    state: RawViewState,
}

#[derive(Default, Deserialize)]
struct RawViewState {
    #[serde(default)]
    values: BTreeMap<String, BTreeMap<String, RawInputValue>>,
}

#[derive(Deserialize)]
struct RawInputValue {
    value: Option<String>,
}

pub fn parse_socket_frame(
    text: &str,
    received_at: DateTime<Utc>,
) -> Result<SocketFrame, TransportError> {
    let frame: RawFrame = serde_json::from_str(text)
        .map_err(|error| TransportError::Receive(format!("malformed socket frame: {error}")))?;

    match frame.frame_type.as_str() {
        "hello" => return Ok(SocketFrame::Hello),
        "disconnect" => {
            return Ok(SocketFrame::Disconnect {
                reason: frame.reason.unwrap_or_else(|| "unspecified".to_owned()),
            })
        }
        _ => {}
    }

    let envelope_id = frame.envelope_id.ok_or_else(|| {
        TransportError::Receive(format!("`{}` frame has no envelope_id", frame.frame_type))
    })?;
    let event = match frame.frame_type.as_str() {
        "slash_commands" => parse_slash_command(frame.payload, received_at)?,
        "interactive" => parse_interactive(frame.payload)?,
        other => SlackEvent::Unsupported { event_type: other.to_owned() },
    };

    Ok(SocketFrame::Envelope(SlackEnvelope { envelope_id, event }))
}

fn parse_slash_command(
    payload: Value,
    received_at: DateTime<Utc>,
) -> Result<SlackEvent, TransportError> {
    let raw: RawSlashCommand = serde_json::from_value(payload)
        .map_err(|error| TransportError::Receive(format!("malformed slash command: {error}")))?;

    Ok(SlackEvent::SlashCommand(CommandInvocation {
        command: raw.command,
        text: raw.text,
        user_id: UserId(raw.user_id),
        channel_id: ChannelId(raw.channel_id),
        trigger_id: TriggerId(raw.trigger_id),
        received_at,
    }))
}

fn parse_interactive(payload: Value) -> Result<SlackEvent, TransportError> {
    let interaction_type = payload.get("type").and_then(Value::as_str).unwrap_or("unknown");
    if interaction_type != "view_submission" {
        return Ok(SlackEvent::Unsupported { event_type: format!("interactive:{interaction_type}") });
    }

    let raw: RawViewSubmission = serde_json::from_value(payload)
        .map_err(|error| TransportError::Receive(format!("malformed view submission: {error}")))?;

    let values = raw
        .view
        .state
        .values
        .into_iter()
        .flat_map(|(block_id, actions)| {
            actions.into_iter().map(move |(action_id, input)| SubmittedValue {
                block_id: block_id.clone(),
                action_id,
                value: input.value,
            })
        })
        .collect();
    let origin_channel = Some(raw.view.private_metadata)
        .filter(|metadata| !metadata.trim().is_empty())
        .map(ChannelId);

    Ok(SlackEvent::ViewSubmission(FormSubmission {
        user_id: UserId(raw.user.id),
        trigger_id: TriggerId(raw.trigger_id),
        callback_id: raw.view.callback_id,
        origin_channel,
        values,
    }))
}

/// The `envelope_id` of a frame whose payload could not be parsed, so it can
/// still be acknowledged and Slack stops redelivering it.
pub fn envelope_id_of(text: &str) -> Option<String> {
    let frame: Value = serde_json::from_str(text).ok()?;
    frame.get("envelope_id").and_then(Value::as_str).map(str::to_owned)
}

pub fn ack_frame(envelope_id: &str) -> String {
    serde_json::json!({ "envelope_id": envelope_id }).to_string()
}

/// Socket Mode over a WebSocket URL obtained from `apps.connections.open`.
pub struct SlackSocketTransport {
    http: reqwest::Client,
    api_base_url: String,
    app_token: SecretString,
    stream: Mutex<Option<SocketStream>>,
}

impl SlackSocketTransport {
    pub fn new(api_base_url: impl Into<String>, app_token: SecretString) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_base_url: api_base_url.into(),
            app_token,
            stream: Mutex::new(None),
        }
    }

    async fn open_connection_url(&self) -> Result<String, TransportError> {
        let url = format!("{}/apps.connections.open", self.api_base_url.trim_end_matches('/'));
        let body: Value = self
            .http
            .post(url)
            .bearer_auth(self.app_token.expose_secret())
            .send()
            .await
            .map_err(|error| TransportError::Connect(error.to_string()))?
            .json()
            .await
            .map_err(|error| TransportError::Connect(error.to_string()))?;

        if !body.get("ok").and_then(Value::as_bool).unwrap_or(false) {
            let error = body.get("error").and_then(Value::as_str).unwrap_or("unknown_error");
            return Err(TransportError::Connect(format!("apps.connections.open: {error}")));
        }

        body.get("url")
            .and_then(Value::as_str)
            .map(str::to_owned)
            .ok_or_else(|| TransportError::Connect("apps.connections.open returned no url".into()))
    }
}

#[async_trait]
impl SocketTransport for SlackSocketTransport {
    async fn connect(&self) -> Result<(), TransportError> {
        let url = self.open_connection_url().await?;
        let (stream, _) = connect_async(url.as_str())
            .await
            .map_err(|error| TransportError::Connect(error.to_string()))?;
        *self.stream.lock().await = Some(stream);
        Ok(())
    }

    async fn next_envelope(&self) -> Result<Option<SlackEnvelope>, TransportError> {
        let mut guard = self.stream.lock().await;
        let stream = guard
            .as_mut()
            .ok_or_else(|| TransportError::Receive("socket is not connected".to_owned()))?;

        loop {
            let Some(message) = stream.next().await else {
                return Err(TransportError::ServerDisconnect("socket stream ended".to_owned()));
            };
            let message = message.map_err(|error| TransportError::Receive(error.to_string()))?;

            // Pings are answered by tungstenite on the next read.
            let text = match message {
                Message::Text(text) => text,
                Message::Close(frame) => {
                    let reason = frame
                        .map(|frame| frame.reason.to_string())
                        .unwrap_or_else(|| "close frame".to_owned());
                    return Err(TransportError::ServerDisconnect(reason));
                }
                _ => continue,
            };

            let frame = match parse_socket_frame(&text, Utc::now()) {
                Ok(frame) => frame,
                Err(error) => {
                    let envelope_id = envelope_id_of(&text);
                    warn!(
                        error = %error,
                        envelope_id = envelope_id.as_deref().unwrap_or("none"),
                        "skipping unreadable socket mode frame"
                    );
                    if let Some(envelope_id) = envelope_id {
                        stream
                            .send(Message::Text(ack_frame(&envelope_id)))
                            .await
                            .map_err(|error| TransportError::Acknowledge(error.to_string()))?;
                    }
                    continue;
                }
            };
            match frame {
                SocketFrame::Hello => debug!("socket mode hello received"),
                SocketFrame::Disconnect { reason } => {
                    return Err(TransportError::ServerDisconnect(reason));
                }
                SocketFrame::Envelope(envelope) => return Ok(Some(envelope)),
            }
        }
    }

    async fn acknowledge(&self, envelope_id: &str) -> Result<(), TransportError> {
        let mut guard = self.stream.lock().await;
        let stream = guard
            .as_mut()
            .ok_or_else(|| TransportError::Acknowledge("socket is not connected".to_owned()))?;
        stream
            .send(Message::Text(ack_frame(envelope_id)))
            .await
            .map_err(|error| TransportError::Acknowledge(error.to_string()))
    }

    async fn disconnect(&self) -> Result<(), TransportError> {
        let Some(mut stream) = self.stream.lock().await.take() else {
            return Ok(());
        };
        stream.close(None).await.map_err(|error| TransportError::Disconnect(error.to_string()))
    }
}
