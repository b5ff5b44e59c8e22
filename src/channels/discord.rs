use crate::channels::{
    ButtonStyle, Channel, ChannelError, ChannelSpec, InteractionRef, InteractionReply,
    OutgoingMessage, TicketGateway,
};
use log::{debug, info};
use serde::{Deserialize, Serialize};
use tokio::sync::OnceCell;

const VIEW_CHANNEL: u64 = 1 << 10;
const SEND_MESSAGES: u64 = 1 << 11;

const CHANNEL_TYPE_TEXT: u8 = 0;
const CHANNEL_TYPE_CATEGORY: u8 = 4;

const OVERWRITE_ROLE: u8 = 0;
const OVERWRITE_MEMBER: u8 = 1;

const CALLBACK_CHANNEL_MESSAGE: u8 = 4;
const CALLBACK_DEFERRED_UPDATE: u8 = 6;
const FLAG_EPHEMERAL: u64 = 1 << 6;

/// Discord REST client implementing the channel side of [`TicketGateway`].
pub struct DiscordProvider {
    client: reqwest::Client,
    base_url: String,
    bot_token: String,
    bot_user_id: OnceCell<String>,
}

impl DiscordProvider {
    pub fn new(bot_token: impl Into<String>) -> Self {
        Self::with_base_url(bot_token, "https://discord.com/api/v10")
    }

    pub fn with_base_url(bot_token: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
            bot_token: bot_token.into(),
            bot_user_id: OnceCell::new(),
        }
    }

    fn max_text_length(&self) -> usize {
        2000
    }

    fn authorization(&self) -> String {
        format!("Bot {}", self.bot_token)
    }

    async fn check(response: reqwest::Response, what: &str) -> Result<reqwest::Response, ChannelError> {
        let status = response.status();

        if status.is_success() {
            return Ok(response);
        }

        if status.as_u16() == 429 {
            let retry_after = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.parse().ok());
            return Err(ChannelError::RateLimited { retry_after });
        }

        let error_text = response.text().await.unwrap_or_default();
        match status.as_u16() {
            404 => Err(ChannelError::NotFound(what.to_string())),
            401 => Err(ChannelError::AuthenticationFailed(error_text)),
            403 => Err(ChannelError::PermissionDenied(format!("{}: {}", what, error_text))),
            _ => Err(ChannelError::ApiError {
                code: Some(status.to_string()),
                message: error_text,
            }),
        }
    }

    async fn parse<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, ChannelError> {
        response.json::<T>().await.map_err(|e| ChannelError::ApiError {
            code: None,
            message: e.to_string(),
        })
    }

    pub async fn get_current_user(&self) -> Result<DiscordUser, ChannelError> {
        let response = self
            .client
            .get(format!("{}/users/@me", self.base_url))
            .header("Authorization", self.authorization())
            .send()
            .await
            .map_err(|e| ChannelError::NetworkError(e.to_string()))?;

        let response = Self::check(response, "current user").await?;
        Self::parse(response).await
    }

    async fn bot_user_id(&self) -> Result<&str, ChannelError> {
        self.bot_user_id
            .get_or_try_init(|| async { self.get_current_user().await.map(|u| u.id) })
            .await
            .map(String::as_str)
    }

    pub async fn get_guild_channels(&self, guild_id: &str) -> Result<Vec<GuildChannel>, ChannelError> {
        let response = self
            .client
            .get(format!("{}/guilds/{}/channels", self.base_url, guild_id))
            .header("Authorization", self.authorization())
            .send()
            .await
            .map_err(|e| ChannelError::NetworkError(e.to_string()))?;

        let response = Self::check(response, &format!("guild {guild_id}")).await?;
        Self::parse(response).await
    }

    /// Returns the id of the named category, creating it when missing.
    async fn ensure_category(&self, guild_id: &str, name: &str) -> Result<String, ChannelError> {
        let existing = self
            .get_guild_channels(guild_id)
            .await?
            .into_iter()
            .find(|c| c.is_category() && c.name == name);

        if let Some(category) = existing {
            return Ok(category.id);
        }

        let body = CreateGuildChannel {
            name: name.to_string(),
            channel_type: CHANNEL_TYPE_CATEGORY,
            parent_id: None,
            permission_overwrites: vec![],
        };
        let category: Channel = self.create_guild_channel(guild_id, &body).await?;
        info!("Created category '{}' ({}) in guild {}", name, category.id, guild_id);
        Ok(category.id)
    }

    async fn create_guild_channel(
        &self,
        guild_id: &str,
        body: &CreateGuildChannel,
    ) -> Result<Channel, ChannelError> {
        let response = self
            .client
            .post(format!("{}/guilds/{}/channels", self.base_url, guild_id))
            .header("Authorization", self.authorization())
            .json(body)
            .send()
            .await
            .map_err(|e| ChannelError::NetworkError(e.to_string()))?;

        let response = Self::check(response, &format!("guild {guild_id}")).await?;
        Self::parse(response).await
    }

    fn build_payload(message: &OutgoingMessage) -> MessagePayload {
        let embeds = message
            .embeds
            .iter()
            .map(|e| DiscordEmbed {
                title: e.title.clone(),
                description: e.description.clone(),
                color: e.color,
                image: e.image_url.clone().map(|url| EmbedImage { url }),
                fields: e
                    .fields
                    .iter()
                    .map(|f| DiscordEmbedField {
                        name: f.name.clone(),
                        value: f.value.clone(),
                    })
                    .collect(),
            })
            .collect();

        let components = if message.buttons.is_empty() {
            vec![]
        } else {
            vec![ActionRow {
                component_type: 1,
                components: message
                    .buttons
                    .iter()
                    .map(|b| ButtonComponent {
                        component_type: 2,
                        style: match b.style {
                            ButtonStyle::Primary => 1,
                            ButtonStyle::Danger => 4,
                        },
                        label: b.label.clone(),
                        custom_id: b.custom_id.clone(),
                    })
                    .collect(),
            }]
        };

        MessagePayload {
            content: message.content.clone(),
            embeds,
            components,
        }
    }
}

#[async_trait::async_trait]
impl TicketGateway for DiscordProvider {
    async fn fetch_channel(&self, id: &str) -> Result<Option<Channel>, ChannelError> {
        let response = self
            .client
            .get(format!("{}/channels/{}", self.base_url, id))
            .header("Authorization", self.authorization())
            .send()
            .await
            .map_err(|e| ChannelError::NetworkError(e.to_string()))?;

        match Self::check(response, &format!("channel {id}")).await {
            Ok(response) => Self::parse(response).await.map(Some),
            Err(ChannelError::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn create_channel(&self, spec: &ChannelSpec) -> Result<Channel, ChannelError> {
        let category_id = self.ensure_category(&spec.guild_id, &spec.category).await?;
        let bot_id = self.bot_user_id().await?.to_string();
        let member_allow = (VIEW_CHANNEL | SEND_MESSAGES).to_string();

        let body = CreateGuildChannel {
            name: spec.name.clone(),
            channel_type: CHANNEL_TYPE_TEXT,
            parent_id: Some(category_id),
            permission_overwrites: vec![
                // The @everyone role shares the guild's id.
                PermissionOverwrite {
                    id: spec.guild_id.clone(),
                    overwrite_type: OVERWRITE_ROLE,
                    allow: "0".to_string(),
                    deny: VIEW_CHANNEL.to_string(),
                },
                PermissionOverwrite {
                    id: spec.owner_id.clone(),
                    overwrite_type: OVERWRITE_MEMBER,
                    allow: member_allow.clone(),
                    deny: "0".to_string(),
                },
                PermissionOverwrite {
                    id: bot_id,
                    overwrite_type: OVERWRITE_MEMBER,
                    allow: member_allow,
                    deny: "0".to_string(),
                },
            ],
        };

        let channel = self.create_guild_channel(&spec.guild_id, &body).await?;
        debug!("Created channel {} ({})", channel.name, channel.id);
        Ok(channel)
    }

    async fn send_message(
        &self,
        channel_id: &str,
        message: &OutgoingMessage,
    ) -> Result<(), ChannelError> {
        let text_len = message
            .content
            .as_deref()
            .map(|text| text.chars().count())
            .unwrap_or(0);
        if text_len > self.max_text_length() {
            return Err(ChannelError::ContentTooLong {
                max_length: self.max_text_length(),
                actual_length: text_len,
            });
        }

        let response = self
            .client
            .post(format!("{}/channels/{}/messages", self.base_url, channel_id))
            .header("Authorization", self.authorization())
            .json(&Self::build_payload(message))
            .send()
            .await
            .map_err(|e| ChannelError::NetworkError(e.to_string()))?;

        Self::check(response, &format!("channel {channel_id}")).await?;
        Ok(())
    }

    async fn delete_channel(&self, channel_id: &str) -> Result<(), ChannelError> {
        let response = self
            .client
            .delete(format!("{}/channels/{}", self.base_url, channel_id))
            .header("Authorization", self.authorization())
            .send()
            .await
            .map_err(|e| ChannelError::NetworkError(e.to_string()))?;

        Self::check(response, &format!("channel {channel_id}")).await?;
        Ok(())
    }

    async fn reply(
        &self,
        interaction: &InteractionRef,
        reply: &InteractionReply,
    ) -> Result<(), ChannelError> {
        let body = match reply {
            InteractionReply::Ephemeral(content) => InteractionCallback {
                callback_type: CALLBACK_CHANNEL_MESSAGE,
                data: Some(InteractionCallbackData {
                    content: content.clone(),
                    flags: FLAG_EPHEMERAL,
                }),
            },
            InteractionReply::Acknowledge => InteractionCallback {
                callback_type: CALLBACK_DEFERRED_UPDATE,
                data: None,
            },
        };

        let response = self
            .client
            .post(format!(
                "{}/interactions/{}/{}/callback",
                self.base_url, interaction.id, interaction.token
            ))
            .json(&body)
            .send()
            .await
            .map_err(|e| ChannelError::NetworkError(e.to_string()))?;

        Self::check(response, &format!("interaction {}", interaction.id)).await?;
        Ok(())
    }
}

#[derive(Debug, Serialize)]
struct MessagePayload {
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    embeds: Vec<DiscordEmbed>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    components: Vec<ActionRow>,
}

#[derive(Debug, Serialize)]
struct DiscordEmbed {
    #[serde(skip_serializing_if = "Option::is_none")]
    title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    color: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    image: Option<EmbedImage>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    fields: Vec<DiscordEmbedField>,
}

#[derive(Debug, Serialize)]
struct EmbedImage {
    url: String,
}

#[derive(Debug, Serialize)]
struct DiscordEmbedField {
    name: String,
    value: String,
}

#[derive(Debug, Serialize)]
struct ActionRow {
    #[serde(rename = "type")]
    component_type: u8,
    components: Vec<ButtonComponent>,
}

#[derive(Debug, Serialize)]
struct ButtonComponent {
    #[serde(rename = "type")]
    component_type: u8,
    style: u8,
    label: String,
    custom_id: String,
}

#[derive(Debug, Serialize)]
struct CreateGuildChannel {
    name: String,
    #[serde(rename = "type")]
    channel_type: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    parent_id: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    permission_overwrites: Vec<PermissionOverwrite>,
}

#[derive(Debug, Serialize)]
struct PermissionOverwrite {
    id: String,
    #[serde(rename = "type")]
    overwrite_type: u8,
    allow: String,
    deny: String,
}

#[derive(Debug, Serialize)]
struct InteractionCallback {
    #[serde(rename = "type")]
    callback_type: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<InteractionCallbackData>,
}

#[derive(Debug, Serialize)]
struct InteractionCallbackData {
    content: String,
    flags: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DiscordUser {
    pub id: String,
    pub username: String,
    #[serde(default)]
    pub bot: bool,
}

#[derive(Debug, Deserialize)]
pub struct GuildChannel {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub channel_type: u8,
    pub guild_id: Option<String>,
    pub parent_id: Option<String>,
}

impl GuildChannel {
    pub fn is_category(&self) -> bool {
        self.channel_type == CHANNEL_TYPE_CATEGORY
    }
}
