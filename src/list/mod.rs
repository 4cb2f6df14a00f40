//! Buddy list aggregate
//!
//! A [`BuddyList`] is a character's roster: a capacity and the buddy edges the
//! character owns. Lists are only ever constructed through [`ListBuilder`], so
//! every value in hand satisfies `buddies.len() <= capacity`.

pub mod builder;
pub mod model;

pub use builder::{ListBuilder, ValidationError, DEFAULT_CAPACITY};
pub use model::{Buddy, BuddyList, DEFAULT_GROUP, OFFLINE_CHANNEL};
