//! In-memory [`TicketGateway`] for exercising the state machine without Discord.

use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};

use crate::channels::{
    Channel, ChannelError, ChannelSpec, InteractionRef, InteractionReply, OutgoingMessage,
    TicketGateway,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GatewayCall {
    Fetch(String),
    Create(ChannelSpec),
    Send {
        channel_id: String,
        message: OutgoingMessage,
    },
    Delete(String),
    Reply {
        interaction_id: String,
        reply: InteractionReply,
    },
}

/// Records every call and keeps a set of live channel ids.
///
/// Sends and deletes against a channel that is not in the set fail with
/// [`ChannelError::NotFound`], like the real API does.
#[derive(Debug, Default)]
pub struct RecordingGateway {
    channels: Mutex<HashSet<String>>,
    calls: Mutex<Vec<GatewayCall>>,
    next_id: AtomicU64,
    fail_fetches: AtomicBool,
    fail_creates: AtomicBool,
    fail_sends: AtomicBool,
    fail_deletes: AtomicBool,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl RecordingGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_channels<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let gateway = Self::new();
        for id in ids {
            gateway.add_channel(id);
        }
        gateway
    }

    pub fn add_channel(&self, id: impl Into<String>) {
        lock(&self.channels).insert(id.into());
    }

    pub fn remove_channel(&self, id: &str) {
        lock(&self.channels).remove(id);
    }

    pub fn has_channel(&self, id: &str) -> bool {
        lock(&self.channels).contains(id)
    }

    pub fn fail_fetches(&self, fail: bool) {
        self.fail_fetches.store(fail, Ordering::SeqCst);
    }

    pub fn fail_creates(&self, fail: bool) {
        self.fail_creates.store(fail, Ordering::SeqCst);
    }

    pub fn fail_sends(&self, fail: bool) {
        self.fail_sends.store(fail, Ordering::SeqCst);
    }

    pub fn fail_deletes(&self, fail: bool) {
        self.fail_deletes.store(fail, Ordering::SeqCst);
    }

    pub fn calls(&self) -> Vec<GatewayCall> {
        lock(&self.calls).clone()
    }

    /// Messages successfully delivered to `channel_id`.
    pub fn sent_to(&self, channel_id: &str) -> Vec<OutgoingMessage> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                GatewayCall::Send {
                    channel_id: id,
                    message,
                } if id == channel_id => Some(message),
                _ => None,
            })
            .collect()
    }

    /// Channels successfully deleted, in order.
    pub fn deleted(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                GatewayCall::Delete(id) => Some(id),
                _ => None,
            })
            .collect()
    }

    pub fn created(&self) -> Vec<ChannelSpec> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                GatewayCall::Create(spec) => Some(spec),
                _ => None,
            })
            .collect()
    }

    pub fn replies(&self) -> Vec<InteractionReply> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                GatewayCall::Reply { reply, .. } => Some(reply),
                _ => None,
            })
            .collect()
    }

    fn record(&self, call: GatewayCall) {
        lock(&self.calls).push(call);
    }
}

#[async_trait]
impl TicketGateway for RecordingGateway {
    async fn fetch_channel(&self, id: &str) -> Result<Option<Channel>, ChannelError> {
        if self.fail_fetches.load(Ordering::SeqCst) {
            return Err(ChannelError::NetworkError("gateway unavailable".to_string()));
        }
        self.record(GatewayCall::Fetch(id.to_string()));
        Ok(self.has_channel(id).then(|| Channel {
            id: id.to_string(),
            name: String::new(),
            guild_id: None,
            parent_id: None,
        }))
    }

    async fn create_channel(&self, spec: &ChannelSpec) -> Result<Channel, ChannelError> {
        if self.fail_creates.load(Ordering::SeqCst) {
            return Err(ChannelError::PermissionDenied("Missing Permissions".to_string()));
        }
        let id = format!("{}", 1000 + self.next_id.fetch_add(1, Ordering::SeqCst));
        self.add_channel(id.clone());
        self.record(GatewayCall::Create(spec.clone()));
        Ok(Channel {
            id,
            name: spec.name.clone(),
            guild_id: Some(spec.guild_id.clone()),
            parent_id: None,
        })
    }

    async fn send_message(
        &self,
        channel_id: &str,
        message: &OutgoingMessage,
    ) -> Result<(), ChannelError> {
        if self.fail_sends.load(Ordering::SeqCst) {
            return Err(ChannelError::NetworkError("connection reset".to_string()));
        }
        if !self.has_channel(channel_id) {
            return Err(ChannelError::NotFound(format!("channel {channel_id}")));
        }
        self.record(GatewayCall::Send {
            channel_id: channel_id.to_string(),
            message: message.clone(),
        });
        Ok(())
    }

    async fn delete_channel(&self, channel_id: &str) -> Result<(), ChannelError> {
        if self.fail_deletes.load(Ordering::SeqCst) {
            return Err(ChannelError::ApiError {
                code: Some("500".to_string()),
                message: "Internal Server Error".to_string(),
            });
        }
        if !lock(&self.channels).remove(channel_id) {
            return Err(ChannelError::NotFound(format!("channel {channel_id}")));
        }
        self.record(GatewayCall::Delete(channel_id.to_string()));
        Ok(())
    }

    async fn reply(
        &self,
        interaction: &InteractionRef,
        reply: &InteractionReply,
    ) -> Result<(), ChannelError> {
        self.record(GatewayCall::Reply {
            interaction_id: interaction.id.clone(),
            reply: reply.clone(),
        });
        Ok(())
    }
}
