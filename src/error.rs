//! Error types for buddy-lists

use thiserror::Error;

use crate::list::ValidationError;
use crate::services::events::ErrorKind;

#[derive(Error, Debug)]
pub enum BuddyError {
    #[error("Invalid buddy list: {0}")]
    Validation(#[from] ValidationError),

    #[error("Buddy list already exists for character {0}")]
    DuplicateList(u32),

    #[error("Buddy list not found for character {0}")]
    ListNotFound(u32),

    #[error("Character not found: {0}")]
    TargetNotFound(u32),

    #[error("Character {0} is a GM and cannot be added as a buddy")]
    CannotBuddyGm(u32),

    #[error("Buddy list for character {0} is at capacity")]
    ListFull(u32),

    #[error("Buddy list for character {0} (the other party) is at capacity")]
    OtherListFull(u32),

    #[error("Character {target_id} is already on the buddy list of {character_id}")]
    AlreadyBuddy { character_id: u32, target_id: u32 },

    #[error("Invalid capacity: {0}")]
    InvalidCapacity(u8),

    #[error("Capacity {capacity} is less than current buddy count {count}")]
    CapacityTooSmall { capacity: u8, count: usize },

    #[error("Character directory error: {0}")]
    Directory(String),

    #[error("Invite error: {0}")]
    Invite(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Database error: {0}")]
    Database(#[from] diesel::result::Error),

    #[error("Connection pool error: {0}")]
    Pool(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl BuddyError {
    /// Notification kind reported to the initiating character for this failure
    pub fn kind(&self) -> ErrorKind {
        match self {
            BuddyError::ListFull(_) => ErrorKind::ListFull,
            BuddyError::OtherListFull(_) => ErrorKind::OtherListFull,
            BuddyError::AlreadyBuddy { .. } => ErrorKind::AlreadyBuddy,
            BuddyError::CannotBuddyGm(_) => ErrorKind::CannotBuddyGm,
            BuddyError::TargetNotFound(_) => ErrorKind::CharacterNotFound,
            BuddyError::InvalidCapacity(_) => ErrorKind::InvalidCapacity,
            BuddyError::CapacityTooSmall { .. } => ErrorKind::CapacityTooSmall,
            _ => ErrorKind::UnknownError,
        }
    }

    /// Whether redelivering the same message could ever succeed
    pub fn is_terminal(&self) -> bool {
        !matches!(
            self,
            BuddyError::Database(_)
                | BuddyError::Pool(_)
                | BuddyError::Transport(_)
                | BuddyError::Invite(_)
                | BuddyError::Directory(_)
                | BuddyError::Internal(_)
        )
    }
}
