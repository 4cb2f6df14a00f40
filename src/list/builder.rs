//! Validated construction of [`BuddyList`] values

use thiserror::Error;
use uuid::Uuid;

use super::model::{Buddy, BuddyList};

/// Capacity given to a builder that never sets one
pub const DEFAULT_CAPACITY: u8 = 20;

/// Reasons a list cannot be built
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("tenant id is required")]
    MissingTenant,

    #[error("character id is required")]
    MissingOwner,

    #[error("capacity must be greater than 0")]
    NonPositiveCapacity,

    #[error("buddy count {count} exceeds capacity {capacity}")]
    CapacityExceeded { count: usize, capacity: u8 },
}

/// Builder for [`BuddyList`]
///
/// Used both for fresh lists and for rebuilding persisted rows. Derive one from
/// an existing list with [`BuddyList::to_builder`] to validate a change before
/// writing it.
#[derive(Debug, Clone)]
pub struct ListBuilder {
    tenant_id: Uuid,
    id: Uuid,
    character_id: u32,
    capacity: u8,
    buddies: Vec<Buddy>,
}

impl ListBuilder {
    pub fn new(tenant_id: Uuid, character_id: u32) -> Self {
        Self {
            tenant_id,
            id: Uuid::nil(),
            character_id,
            capacity: DEFAULT_CAPACITY,
            buddies: Vec::new(),
        }
    }

    pub fn id(mut self, id: Uuid) -> Self {
        self.id = id;
        self
    }

    pub fn capacity(mut self, capacity: u8) -> Self {
        self.capacity = capacity;
        self
    }

    pub fn buddies(mut self, buddies: Vec<Buddy>) -> Self {
        self.buddies = buddies;
        self
    }

    pub fn add_buddy(mut self, buddy: Buddy) -> Self {
        self.buddies.push(buddy);
        self
    }

    pub fn build(self) -> Result<BuddyList, ValidationError> {
        self.validate()?;

        Ok(BuddyList {
            id: self.id,
            tenant_id: self.tenant_id,
            character_id: self.character_id,
            capacity: self.capacity,
            buddies: self.buddies,
        })
    }

    fn validate(&self) -> Result<(), ValidationError> {
        if self.tenant_id.is_nil() {
            return Err(ValidationError::MissingTenant);
        }

        if self.character_id == 0 {
            return Err(ValidationError::MissingOwner);
        }

        if self.capacity == 0 {
            return Err(ValidationError::NonPositiveCapacity);
        }

        if self.buddies.len() > self.capacity as usize {
            return Err(ValidationError::CapacityExceeded {
                count: self.buddies.len(),
                capacity: self.capacity,
            });
        }

        Ok(())
    }
}
