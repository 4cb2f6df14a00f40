//! Buddy invites
//!
//! Invites live in a separate service. This side only issues `CREATE` and
//! `REJECT` commands for invites of type `BUDDY`, and later consumes the
//! invite service's `ACCEPTED`/`REJECTED` status events (see
//! [`crate::messages`]).

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::events::{Envelope, MessageTransport};
use crate::db::TenantContext;
use crate::error::BuddyError;

/// Invite type owned by this service
pub const INVITE_TYPE_BUDDY: &str = "BUDDY";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateInviteBody {
    pub originator_id: u32,
    pub target_id: u32,
    pub reference_id: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RejectInviteBody {
    pub target_id: u32,
    pub originator_id: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "body", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InviteCommandBody {
    Create(CreateInviteBody),
    Reject(RejectInviteBody),
}

/// Command sent to the invite service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InviteCommand {
    pub world_id: u8,
    pub invite_type: String,
    #[serde(flatten)]
    pub body: InviteCommandBody,
}

/// Creates and rejects buddy invites
pub trait InviteSubsystem: Send + Sync {
    /// Invite `target_id` on behalf of `actor_id`
    fn create(&self, ctx: &TenantContext, actor_id: u32, world_id: u8, target_id: u32) -> Result<(), BuddyError>;

    /// Reject, on behalf of `actor_id`, the invite sent by `originator_id`
    fn reject(&self, ctx: &TenantContext, actor_id: u32, world_id: u8, originator_id: u32) -> Result<(), BuddyError>;
}

/// Invite subsystem that publishes commands through a [`MessageTransport`]
pub struct TransportInviteSubsystem {
    transport: Arc<dyn MessageTransport>,
    topic: String,
}

impl TransportInviteSubsystem {
    pub fn new(transport: Arc<dyn MessageTransport>, topic: impl Into<String>) -> Self {
        Self {
            transport,
            topic: topic.into(),
        }
    }

    fn send(&self, ctx: &TenantContext, key: u32, command: InviteCommand) -> Result<(), BuddyError> {
        let envelope = Envelope::json(&self.topic, key.to_string(), ctx, &command)?;
        self.transport
            .emit(envelope)
            .map_err(|e| BuddyError::Invite(e.to_string()))
    }
}

impl InviteSubsystem for TransportInviteSubsystem {
    fn create(&self, ctx: &TenantContext, actor_id: u32, world_id: u8, target_id: u32) -> Result<(), BuddyError> {
        debug!(actor_id, target_id, "Creating buddy invite");
        let command = InviteCommand {
            world_id,
            invite_type: INVITE_TYPE_BUDDY.to_string(),
            body: InviteCommandBody::Create(CreateInviteBody {
                originator_id: actor_id,
                target_id,
                reference_id: actor_id,
            }),
        };
        self.send(ctx, target_id, command)
    }

    fn reject(&self, ctx: &TenantContext, actor_id: u32, world_id: u8, originator_id: u32) -> Result<(), BuddyError> {
        debug!(actor_id, originator_id, "Rejecting buddy invite");
        let command = InviteCommand {
            world_id,
            invite_type: INVITE_TYPE_BUDDY.to_string(),
            body: InviteCommandBody::Reject(RejectInviteBody {
                target_id: actor_id,
                originator_id,
            }),
        };
        self.send(ctx, actor_id, command)
    }
}
