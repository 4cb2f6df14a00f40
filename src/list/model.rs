//! Buddy list and buddy edge models

use serde::Serialize;
use uuid::Uuid;

use super::builder::ListBuilder;

/// Channel id used for a buddy who is offline or whose channel is unknown
pub const OFFLINE_CHANNEL: i8 = -1;

/// Group assigned to the accepting side of an invite
pub const DEFAULT_GROUP: &str = "Default Group";

/// A directed buddy edge: the list owner considers `character_id` a buddy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Buddy {
    /// The buddy (edge target)
    pub character_id: u32,
    /// Free-form group label chosen by the owner
    pub group: String,
    /// Target's name, copied when the edge was created
    pub character_name: String,
    /// Target's last known channel, `-1` when offline
    pub channel_id: i8,
    pub in_shop: bool,
    /// True until the target reciprocates
    pub pending: bool,
}

impl Buddy {
    /// A fresh edge for a target whose channel is not yet known
    pub fn new(character_id: u32, character_name: impl Into<String>, group: impl Into<String>, pending: bool) -> Self {
        Self {
            character_id,
            group: group.into(),
            character_name: character_name.into(),
            channel_id: OFFLINE_CHANNEL,
            in_shop: false,
            pending,
        }
    }
}

/// A character's buddy list
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BuddyList {
    pub(super) id: Uuid,
    #[serde(skip)]
    pub(super) tenant_id: Uuid,
    pub(super) character_id: u32,
    pub(super) capacity: u8,
    pub(super) buddies: Vec<Buddy>,
}

impl BuddyList {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn tenant_id(&self) -> Uuid {
        self.tenant_id
    }

    /// Owner of the list
    pub fn character_id(&self) -> u32 {
        self.character_id
    }

    pub fn capacity(&self) -> u8 {
        self.capacity
    }

    pub fn buddies(&self) -> &[Buddy] {
        &self.buddies
    }

    pub fn len(&self) -> usize {
        self.buddies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buddies.is_empty()
    }

    /// Edge pointing at `character_id`, if the owner has one
    pub fn find(&self, character_id: u32) -> Option<&Buddy> {
        self.buddies.iter().find(|b| b.character_id == character_id)
    }

    pub fn contains(&self, character_id: u32) -> bool {
        self.find(character_id).is_some()
    }

    /// Whether one more edge would exceed capacity
    pub fn is_full(&self) -> bool {
        self.buddies.len() + 1 > self.capacity as usize
    }

    /// Copy this list into a builder for validated modification
    pub fn to_builder(&self) -> ListBuilder {
        ListBuilder::new(self.tenant_id, self.character_id)
            .id(self.id)
            .capacity(self.capacity)
            .buddies(self.buddies.clone())
    }
}
