//! Buddy Lists - relationship engine for a game backend
//!
//! Keeps each character's buddy list, drives the request / accept / reject /
//! delete lifecycle between two characters, and propagates presence (channel
//! and cash shop status) to everyone who lists a character as a buddy.
//!
//! ## Architecture
//!
//! - **List store** (`db`): SQLite via Diesel, every row scoped by tenant
//! - **List aggregate** (`list`): validated construction through `ListBuilder`
//! - **Processor** (`services`): transactional operations with buffered status events
//! - **Dispatcher** (`messages`): decodes inbound topics and routes to the processor
//! - **Transport** (`transport`): NATS publishing and subscriptions
//!
//! ## Storage Layout
//!
//! ```text
//! ~/.local/share/buddy-lists/
//! ├── buddies.db     # Lists and edges
//! └── config.toml    # Configuration
//! ```

pub mod config;
pub mod db;
pub mod error;
pub mod list;
pub mod messages;
pub mod services;
pub mod transport;

pub use config::{Config, TopicsConfig};
pub use db::{BuddyDb, DbStats, TenantContext};
pub use error::BuddyError;
pub use list::{Buddy, BuddyList, ListBuilder, ValidationError};
pub use messages::{Dispatcher, Inbound};
pub use services::{
    BuddyListProcessor, Character, CharacterDirectory, Envelope, ErrorKind, EventBus, HttpCharacterDirectory,
    InviteSubsystem, MessageTransport, StatusEvent, StatusEventBody, TransportInviteSubsystem,
};
pub use transport::NatsTransport;
