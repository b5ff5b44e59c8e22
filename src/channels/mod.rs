use serde::{Deserialize, Serialize};

pub mod discord;
pub mod gateway;

pub const OPEN_TICKET_ID: &str = "open_ticket";
pub const CLOSE_TICKET_ID: &str = "close_ticket";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Channel {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub guild_id: Option<String>,
    #[serde(default)]
    pub parent_id: Option<String>,
}

/// Everything needed to provision a private ticket channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelSpec {
    pub guild_id: String,
    pub name: String,
    pub category: String,
    pub owner_id: String,
}

impl ChannelSpec {
    pub fn ticket(guild_id: &str, category: &str, owner: &TicketUser) -> Self {
        Self {
            guild_id: guild_id.to_string(),
            name: format!("ticket-{}", owner.username.to_lowercase()),
            category: category.to_string(),
            owner_id: owner.id.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TicketUser {
    pub id: String,
    pub username: String,
}

impl TicketUser {
    pub fn mention(&self) -> String {
        format!("<@{}>", self.id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InteractionRef {
    pub id: String,
    pub token: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InteractionReply {
    /// Visible only to the user who pressed the button.
    Ephemeral(String),
    /// Silent acknowledgement, no visible reply.
    Acknowledge,
}

/// Intents the gateway delivers to the ticket state machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GatewayIntent {
    Ready,
    OpenRequested {
        user: TicketUser,
        guild_id: String,
        interaction: Option<InteractionRef>,
    },
    CloseRequested {
        channel_id: String,
        user_id: String,
        interaction: Option<InteractionRef>,
    },
    MessageReceived {
        channel_id: String,
        author_id: String,
        author_is_bot: bool,
        text: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ButtonStyle {
    Primary,
    Danger,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Button {
    pub custom_id: String,
    pub label: String,
    pub style: ButtonStyle,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmbedField {
    pub name: String,
    pub value: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Embed {
    pub title: Option<String>,
    pub description: Option<String>,
    pub color: Option<u32>,
    pub image_url: Option<String>,
    pub fields: Vec<EmbedField>,
}

impl Embed {
    pub fn titled(title: impl Into<String>) -> Self {
        Self {
            title: Some(title.into()),
            ..Self::default()
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_color(mut self, color: u32) -> Self {
        self.color = Some(color);
        self
    }

    pub fn with_image(mut self, url: impl Into<String>) -> Self {
        self.image_url = Some(url.into());
        self
    }

    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.push(EmbedField {
            name: name.into(),
            value: value.into(),
        });
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OutgoingMessage {
    pub content: Option<String>,
    pub embeds: Vec<Embed>,
    pub buttons: Vec<Button>,
}

impl OutgoingMessage {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            content: Some(text.into()),
            ..Self::default()
        }
    }

    pub fn embed(embed: Embed) -> Self {
        Self {
            embeds: vec![embed],
            ..Self::default()
        }
    }

    pub fn with_button(
        mut self,
        custom_id: impl Into<String>,
        label: impl Into<String>,
        style: ButtonStyle,
    ) -> Self {
        self.buttons.push(Button {
            custom_id: custom_id.into(),
            label: label.into(),
            style,
        });
        self
    }
}

#[derive(Debug, Clone)]
pub enum ChannelError {
    /// The channel (or interaction) no longer exists.
    NotFound(String),
    AuthenticationFailed(String),
    PermissionDenied(String),
    RateLimited { retry_after: Option<f64> },
    ContentTooLong { max_length: usize, actual_length: usize },
    NetworkError(String),
    ApiError { code: Option<String>, message: String },
}

impl ChannelError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

impl std::fmt::Display for ChannelError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotFound(what) => write!(f, "Not found: {what}"),
            Self::AuthenticationFailed(msg) => write!(f, "Authentication failed: {msg}"),
            Self::PermissionDenied(msg) => write!(f, "Permission denied: {msg}"),
            Self::RateLimited { retry_after } => {
                if let Some(secs) = retry_after {
                    write!(f, "Rate limited, retry after {secs} seconds")
                } else {
                    write!(f, "Rate limited")
                }
            }
            Self::ContentTooLong { max_length, actual_length } => {
                write!(f, "Content too long: {actual_length} characters (max: {max_length})")
            }
            Self::NetworkError(msg) => write!(f, "Network error: {msg}"),
            Self::ApiError { code, message } => {
                if let Some(c) = code {
                    write!(f, "API error [{c}]: {message}")
                } else {
                    write!(f, "API error: {message}")
                }
            }
        }
    }
}

impl std::error::Error for ChannelError {}

/// Channel operations the ticket state machine consumes.
#[async_trait::async_trait]
pub trait TicketGateway: Send + Sync {
    /// `Ok(None)` when the channel does not exist.
    async fn fetch_channel(&self, id: &str) -> Result<Option<Channel>, ChannelError>;
    async fn create_channel(&self, spec: &ChannelSpec) -> Result<Channel, ChannelError>;
    async fn send_message(
        &self,
        channel_id: &str,
        message: &OutgoingMessage,
    ) -> Result<(), ChannelError>;
    async fn delete_channel(&self, channel_id: &str) -> Result<(), ChannelError>;
    async fn reply(
        &self,
        interaction: &InteractionRef,
        reply: &InteractionReply,
    ) -> Result<(), ChannelError>;
}
