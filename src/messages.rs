//! Inbound messages and their dispatch to the processor
//!
//! Four topics feed the service:
//!
//! | Topic                | Types                                                  |
//! |----------------------|--------------------------------------------------------|
//! | buddy list commands  | `CREATE`, `REQUEST_ADD`, `REQUEST_DELETE`, `UPDATE_CAPACITY` |
//! | character status     | `CREATED`, `DELETED`, `LOGIN`, `LOGOUT`, `CHANNEL_CHANGED` |
//! | invite status        | `ACCEPTED`, `REJECTED` (invite type `BUDDY` only)      |
//! | cash shop status     | `CHARACTER_ENTER`, `CHARACTER_EXIT`                    |
//!
//! Every message shares the `{worldId, type, body}` shape. Decoding reads that
//! header first and only parses the body for types this service handles, so
//! unknown types are skipped rather than rejected.

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::config::TopicsConfig;
use crate::db::TenantContext;
use crate::error::BuddyError;
use crate::list::OFFLINE_CHANNEL;
use crate::services::events::Envelope;
use crate::services::invite::INVITE_TYPE_BUDDY;
use crate::services::BuddyListProcessor;

/// Shared message header
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Header {
    #[serde(default)]
    world_id: u8,
    #[serde(default)]
    character_id: u32,
    #[serde(default)]
    invite_type: Option<String>,
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    body: serde_json::Value,
}

fn parse<T: DeserializeOwned>(body: serde_json::Value) -> Result<T, BuddyError> {
    Ok(serde_json::from_value(body)?)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CapacityBody {
    capacity: u8,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RequestAddBody {
    character_id: u32,
    #[serde(default)]
    group: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TargetBody {
    character_id: u32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChannelBody {
    channel_id: u8,
    #[serde(default)]
    old_channel_id: Option<u8>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InviteBody {
    originator_id: u32,
    target_id: u32,
}

/// A decoded inbound message this service acts on
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    CreateList { world_id: u8, character_id: u32, capacity: u8 },
    RequestAdd { world_id: u8, character_id: u32, target_id: u32, group: String },
    RequestDelete { world_id: u8, character_id: u32, target_id: u32 },
    UpdateCapacity { world_id: u8, character_id: u32, capacity: u8 },
    CharacterCreated { world_id: u8, character_id: u32 },
    CharacterDeleted { world_id: u8, character_id: u32 },
    ChannelChanged { world_id: u8, character_id: u32, channel_id: i8 },
    InviteAccepted { world_id: u8, originator_id: u32, target_id: u32 },
    InviteRejected { world_id: u8, originator_id: u32, target_id: u32 },
    ShopStatus { world_id: u8, character_id: u32, in_shop: bool },
}

/// Decode a payload received on `topic`
///
/// Returns `Ok(None)` for messages this service ignores.
pub fn decode(topics: &TopicsConfig, topic: &str, payload: &[u8]) -> Result<Option<Inbound>, BuddyError> {
    let Header {
        world_id,
        character_id,
        invite_type,
        kind,
        body,
    } = serde_json::from_slice(payload)?;

    let message = if topic == topics.buddy_list_command {
        match kind.as_str() {
            "CREATE" => {
                let body: CapacityBody = parse(body)?;
                Inbound::CreateList { world_id, character_id, capacity: body.capacity }
            }
            "REQUEST_ADD" => {
                let body: RequestAddBody = parse(body)?;
                Inbound::RequestAdd { world_id, character_id, target_id: body.character_id, group: body.group }
            }
            "REQUEST_DELETE" => {
                let body: TargetBody = parse(body)?;
                Inbound::RequestDelete { world_id, character_id, target_id: body.character_id }
            }
            "UPDATE_CAPACITY" => {
                let body: CapacityBody = parse(body)?;
                Inbound::UpdateCapacity { world_id, character_id, capacity: body.capacity }
            }
            _ => return Ok(None),
        }
    } else if topic == topics.character_status {
        match kind.as_str() {
            "CREATED" => Inbound::CharacterCreated { world_id, character_id },
            "DELETED" => Inbound::CharacterDeleted { world_id, character_id },
            "LOGIN" => {
                let body: ChannelBody = parse(body)?;
                Inbound::ChannelChanged { world_id, character_id, channel_id: body.channel_id as i8 }
            }
            "LOGOUT" => Inbound::ChannelChanged { world_id, character_id, channel_id: OFFLINE_CHANNEL },
            "CHANNEL_CHANGED" => {
                let body: ChannelBody = parse(body)?;
                if body.old_channel_id == Some(body.channel_id) {
                    return Ok(None);
                }
                Inbound::ChannelChanged { world_id, character_id, channel_id: body.channel_id as i8 }
            }
            _ => return Ok(None),
        }
    } else if topic == topics.invite_status {
        if invite_type.as_deref() != Some(INVITE_TYPE_BUDDY) {
            return Ok(None);
        }
        match kind.as_str() {
            "ACCEPTED" => {
                let body: InviteBody = parse(body)?;
                Inbound::InviteAccepted { world_id, originator_id: body.originator_id, target_id: body.target_id }
            }
            "REJECTED" => {
                let body: InviteBody = parse(body)?;
                Inbound::InviteRejected { world_id, originator_id: body.originator_id, target_id: body.target_id }
            }
            _ => return Ok(None),
        }
    } else if topic == topics.cash_shop_status {
        let in_shop = match kind.as_str() {
            "CHARACTER_ENTER" => true,
            "CHARACTER_EXIT" => false,
            _ => return Ok(None),
        };
        let body: TargetBody = parse(body)?;
        Inbound::ShopStatus { world_id, character_id: body.character_id, in_shop }
    } else {
        return Ok(None);
    };

    Ok(Some(message))
}

/// Routes inbound messages to the processor
pub struct Dispatcher {
    processor: Arc<BuddyListProcessor>,
    topics: TopicsConfig,
    default_capacity: u8,
}

impl Dispatcher {
    pub fn new(processor: Arc<BuddyListProcessor>, topics: TopicsConfig, default_capacity: u8) -> Self {
        Self {
            processor,
            topics,
            default_capacity,
        }
    }

    pub fn topics(&self) -> &TopicsConfig {
        &self.topics
    }

    /// Apply one decoded message. Blocks on the database.
    pub fn handle(&self, ctx: &TenantContext, message: Inbound) -> Result<(), BuddyError> {
        let p = &self.processor;
        match message {
            Inbound::CreateList { character_id, capacity, .. } => p.create_list(ctx, character_id, capacity).map(|_| ()),
            Inbound::RequestAdd { world_id, character_id, target_id, group } => {
                p.request_add_buddy(ctx, character_id, world_id, target_id, &group)
            }
            Inbound::RequestDelete { world_id, character_id, target_id } => {
                p.request_delete_buddy(ctx, character_id, world_id, target_id)
            }
            Inbound::UpdateCapacity { world_id, character_id, capacity } => {
                p.update_capacity(ctx, character_id, world_id, capacity)
            }
            Inbound::CharacterCreated { character_id, .. } => {
                p.create_list(ctx, character_id, self.default_capacity).map(|_| ())
            }
            Inbound::CharacterDeleted { world_id, character_id } => p.delete_list(ctx, character_id, world_id),
            Inbound::ChannelChanged { world_id, character_id, channel_id } => {
                p.update_channel(ctx, character_id, world_id, channel_id).map(|_| ())
            }
            Inbound::InviteAccepted { world_id, originator_id, target_id } => {
                p.accept_invite(ctx, target_id, world_id, originator_id)
            }
            Inbound::InviteRejected { world_id, originator_id, target_id } => {
                p.reject_invite(ctx, originator_id, world_id, target_id)
            }
            Inbound::ShopStatus { world_id, character_id, in_shop } => {
                p.update_shop_status(ctx, character_id, world_id, in_shop).map(|_| ())
            }
        }
    }

    /// Decode an envelope and apply it on a blocking worker
    ///
    /// Returns `Ok(false)` when the message was ignored.
    pub async fn dispatch(self: &Arc<Self>, envelope: Envelope) -> Result<bool, BuddyError> {
        let Some(message) = decode(&self.topics, &envelope.topic, &envelope.payload)? else {
            debug!(topic = %envelope.topic, "Ignoring message");
            return Ok(false);
        };

        let ctx = TenantContext::new(envelope.tenant_id);
        let dispatcher = Arc::clone(self);
        debug!(topic = %envelope.topic, message = ?message, "Dispatching message");

        tokio::task::spawn_blocking(move || dispatcher.handle(&ctx, message))
            .await
            .map_err(|e| {
                warn!(error = %e, "Message handler panicked");
                BuddyError::Internal(format!("Handler task failed: {}", e))
            })??;
        Ok(true)
    }
}
