//! Service layer for buddy-lists
//!
//! ## Architecture
//!
//! ```text
//! Transport (NATS subscription)
//!     ↓
//! Dispatcher (messages.rs)
//!     ↓
//! BuddyListProcessor (business logic, transaction boundary)
//!     ↓
//! List store (db/lists.rs)
//!     ↓
//! SQLite Database
//! ```
//!
//! The processor talks to the outside through three traits: the
//! [`CharacterDirectory`], the [`InviteSubsystem`] and the [`MessageTransport`].

pub mod character;
pub mod events;
pub mod invite;
pub mod processor;

pub use character::{Character, CharacterDirectory, HttpCharacterDirectory};
pub use events::{Envelope, ErrorKind, EventBuffer, EventBus, MessageTransport, StatusEvent, StatusEventBody};
pub use invite::{InviteSubsystem, TransportInviteSubsystem};
pub use processor::BuddyListProcessor;
