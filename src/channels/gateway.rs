//! Discord gateway session.
//!
//! Keeps one websocket session alive (hello, identify, heartbeat) and turns
//! the dispatches the ticket flow cares about into [`GatewayIntent`]s pushed
//! onto the ticket event queue. Sessions are not resumed; a dropped session
//! is replaced by a fresh identify after a backoff.

use crate::channels::discord::DiscordUser;
use crate::channels::{GatewayIntent, InteractionRef, TicketUser, CLOSE_TICKET_ID, OPEN_TICKET_ID};
use crate::tickets::TicketEvent;
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use log::{debug, error, info, warn};
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};

pub const DEFAULT_GATEWAY_URL: &str = "wss://gateway.discord.gg/?v=10&encoding=json";

const INTENT_GUILDS: u64 = 1 << 0;
const INTENT_GUILD_MESSAGES: u64 = 1 << 9;
const INTENT_MESSAGE_CONTENT: u64 = 1 << 15;

const OP_DISPATCH: u8 = 0;
const OP_HEARTBEAT: u8 = 1;
const OP_IDENTIFY: u8 = 2;
const OP_RECONNECT: u8 = 7;
const OP_INVALID_SESSION: u8 = 9;
const OP_HELLO: u8 = 10;
const OP_HEARTBEAT_ACK: u8 = 11;

const INTERACTION_MESSAGE_COMPONENT: u8 = 3;

const MAX_RECONNECT_DELAY: Duration = Duration::from_secs(60);

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsWriter = SplitSink<WsStream, Message>;

#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("websocket error: {0}")]
    WebSocket(String),
    #[error("invalid gateway payload: {0}")]
    Payload(#[from] serde_json::Error),
    #[error("gateway session closed: {0}")]
    Closed(String),
    #[error("gateway rejected session ({code}): {reason}")]
    Rejected { code: u16, reason: String },
    #[error("ticket event queue closed")]
    QueueClosed,
}

impl GatewayError {
    fn is_fatal(&self) -> bool {
        matches!(self, Self::Rejected { .. } | Self::QueueClosed)
    }
}

#[derive(Debug, Deserialize)]
struct GatewayPayload {
    op: u8,
    #[serde(default)]
    d: Value,
    #[serde(default)]
    s: Option<u64>,
    #[serde(default)]
    t: Option<String>,
}

#[derive(Debug, Deserialize)]
struct InteractionDispatch {
    id: String,
    token: String,
    #[serde(rename = "type")]
    kind: u8,
    guild_id: Option<String>,
    channel_id: Option<String>,
    member: Option<InteractionMember>,
    user: Option<DiscordUser>,
    data: Option<ComponentData>,
}

#[derive(Debug, Deserialize)]
struct InteractionMember {
    user: DiscordUser,
}

#[derive(Debug, Deserialize)]
struct ComponentData {
    custom_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct MessageDispatch {
    channel_id: String,
    author: DiscordUser,
    #[serde(default)]
    content: String,
}

pub struct DiscordGateway {
    url: String,
    bot_token: String,
    events: mpsc::UnboundedSender<TicketEvent>,
}

impl DiscordGateway {
    pub fn new(bot_token: impl Into<String>, events: mpsc::UnboundedSender<TicketEvent>) -> Self {
        Self {
            url: DEFAULT_GATEWAY_URL.to_string(),
            bot_token: bot_token.into(),
            events,
        }
    }

    pub fn spawn(self) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move { self.run().await })
    }

    /// Runs sessions back to back until the gateway rejects the bot or the
    /// ticket queue is gone.
    pub async fn run(self) {
        let mut delay = Duration::from_secs(1);

        loop {
            let started = Instant::now();
            match self.run_session().await {
                Ok(()) => info!("Discord gateway asked for a new session"),
                Err(e) if e.is_fatal() => {
                    error!("Discord gateway stopped: {}", e);
                    return;
                }
                Err(e) => warn!("Discord gateway session ended: {}", e),
            }

            if started.elapsed() > MAX_RECONNECT_DELAY {
                delay = Duration::from_secs(1);
            }
            debug!("Reconnecting to Discord gateway in {:?}", delay);
            tokio::time::sleep(delay).await;
            delay = (delay * 2).min(MAX_RECONNECT_DELAY);
        }
    }

    async fn run_session(&self) -> Result<(), GatewayError> {
        let (stream, _response) = connect_async(self.url.as_str())
            .await
            .map_err(|e| GatewayError::WebSocket(e.to_string()))?;
        let (mut writer, mut reader) = stream.split();

        let heartbeat_interval = loop {
            match reader.next().await {
                Some(Ok(Message::Text(text))) => {
                    let payload: GatewayPayload = serde_json::from_str(&text)?;
                    if payload.op == OP_HELLO {
                        let millis = payload.d["heartbeat_interval"].as_u64().unwrap_or(41_250);
                        break Duration::from_millis(millis);
                    }
                }
                Some(Ok(Message::Close(frame))) => return Err(close_error(frame)),
                Some(Ok(_)) => {}
                Some(Err(e)) => return Err(GatewayError::WebSocket(e.to_string())),
                None => return Err(GatewayError::Closed("stream ended before hello".to_string())),
            }
        };

        send_json(&mut writer, &self.identify_payload()).await?;
        info!("Identified with Discord gateway, heartbeat every {:?}", heartbeat_interval);

        let mut heartbeat = tokio::time::interval_at(Instant::now() + heartbeat_interval, heartbeat_interval);
        let mut sequence: Option<u64> = None;
        let mut acked = true;

        loop {
            tokio::select! {
                _ = heartbeat.tick() => {
                    if !acked {
                        return Err(GatewayError::Closed("heartbeat not acknowledged".to_string()));
                    }
                    acked = false;
                    send_json(&mut writer, &json!({ "op": OP_HEARTBEAT, "d": sequence })).await?;
                }
                frame = reader.next() => match frame {
                    Some(Ok(Message::Text(text))) => {
                        let payload: GatewayPayload = serde_json::from_str(&text)?;
                        if let Some(s) = payload.s {
                            sequence = Some(s);
                        }
                        match payload.op {
                            OP_DISPATCH => {
                                if let Some(intent) = parse_dispatch(payload.t.as_deref(), payload.d) {
                                    self.events
                                        .send(TicketEvent::Intent(intent))
                                        .map_err(|_| GatewayError::QueueClosed)?;
                                }
                            }
                            OP_HEARTBEAT => {
                                send_json(&mut writer, &json!({ "op": OP_HEARTBEAT, "d": sequence })).await?;
                            }
                            OP_HEARTBEAT_ACK => acked = true,
                            OP_RECONNECT | OP_INVALID_SESSION => {
                                let _ = writer.send(Message::Close(None)).await;
                                return Ok(());
                            }
                            other => debug!("Ignoring gateway opcode {}", other),
                        }
                    }
                    Some(Ok(Message::Close(frame))) => return Err(close_error(frame)),
                    Some(Ok(_)) => {}
                    Some(Err(e)) => return Err(GatewayError::WebSocket(e.to_string())),
                    None => return Err(GatewayError::Closed("stream ended".to_string())),
                }
            }
        }
    }

    fn identify_payload(&self) -> Value {
        json!({
            "op": OP_IDENTIFY,
            "d": {
                "token": self.bot_token,
                "intents": INTENT_GUILDS | INTENT_GUILD_MESSAGES | INTENT_MESSAGE_CONTENT,
                "properties": {
                    "os": std::env::consts::OS,
                    "browser": "ticketbot",
                    "device": "ticketbot"
                }
            }
        })
    }
}

async fn send_json(writer: &mut WsWriter, value: &Value) -> Result<(), GatewayError> {
    writer
        .send(Message::Text(value.to_string().into()))
        .await
        .map_err(|e| GatewayError::WebSocket(e.to_string()))
}

fn close_error(frame: Option<tokio_tungstenite::tungstenite::protocol::CloseFrame>) -> GatewayError {
    match frame {
        Some(frame) => {
            let code = u16::from(frame.code);
            let reason = frame.reason.to_string();
            // 4004 bad token, 4010-4014 shard/intent configuration errors.
            if code == 4004 || (4010..=4014).contains(&code) {
                GatewayError::Rejected { code, reason }
            } else {
                GatewayError::Closed(format!("{code} {reason}"))
            }
        }
        None => GatewayError::Closed("closed without frame".to_string()),
    }
}

/// Maps a dispatch to the intent it carries, if any.
pub fn parse_dispatch(event: Option<&str>, data: Value) -> Option<GatewayIntent> {
    match event? {
        "READY" => Some(GatewayIntent::Ready),
        "INTERACTION_CREATE" => {
            let interaction: InteractionDispatch = match serde_json::from_value(data) {
                Ok(i) => i,
                Err(e) => {
                    warn!("Unreadable interaction dispatch: {}", e);
                    return None;
                }
            };
            if interaction.kind != INTERACTION_MESSAGE_COMPONENT {
                return None;
            }

            let custom_id = interaction.data.as_ref()?.custom_id.clone()?;
            let user = interaction
                .member
                .map(|m| m.user)
                .or(interaction.user)?;
            let reference = Some(InteractionRef {
                id: interaction.id,
                token: interaction.token,
            });

            match custom_id.as_str() {
                OPEN_TICKET_ID => Some(GatewayIntent::OpenRequested {
                    user: TicketUser {
                        id: user.id,
                        username: user.username,
                    },
                    guild_id: interaction.guild_id?,
                    interaction: reference,
                }),
                CLOSE_TICKET_ID => Some(GatewayIntent::CloseRequested {
                    channel_id: interaction.channel_id?,
                    user_id: user.id,
                    interaction: reference,
                }),
                _ => None,
            }
        }
        "MESSAGE_CREATE" => {
            let message: MessageDispatch = serde_json::from_value(data).ok()?;
            Some(GatewayIntent::MessageReceived {
                channel_id: message.channel_id,
                author_id: message.author.id,
                author_is_bot: message.author.bot,
                text: message.content,
            })
        }
        _ => None,
    }
}
