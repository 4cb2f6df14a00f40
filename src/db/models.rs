//! Diesel model definitions for database tables
//!
//! - Queryable structs: for SELECT queries (reading data)
//! - Insertable structs: for INSERT queries (writing data)
//!
//! SQLite has no unsigned or boolean column types, so character ids are stored
//! as BIGINT and flags as INTEGER 0/1.

use diesel::prelude::*;

use super::diesel_schema::*;
use crate::list::Buddy;

// ============================================================================
// Timestamp Helpers (SQLite stores timestamps as TEXT)
// ============================================================================

/// Get current UTC timestamp as ISO 8601 string for SQLite TEXT columns
pub fn current_timestamp() -> String {
    chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string()
}

pub(crate) fn flag(value: bool) -> i32 {
    if value { 1 } else { 0 }
}

// ============================================================================
// Buddy List Models
// ============================================================================

/// Buddy list row from SELECT query
#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = buddy_lists)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct BuddyListRow {
    pub id: String,
    pub tenant_id: String,
    pub character_id: i64,
    pub capacity: i32,
    pub created_at: String,
    pub updated_at: String,
}

/// New buddy list for INSERT
#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = buddy_lists)]
pub struct NewBuddyList<'a> {
    pub id: &'a str,
    pub tenant_id: &'a str,
    pub character_id: i64,
    pub capacity: i32,
}

// ============================================================================
// Buddy Models
// ============================================================================

/// Buddy edge row from SELECT query
#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = buddies)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct BuddyRow {
    pub id: i32,
    pub list_id: String,
    pub character_id: i64,
    pub group_name: String,
    pub character_name: String,
    pub channel_id: i32,
    pub in_shop: i32,
    pub pending: i32,
    pub created_at: String,
}

impl From<BuddyRow> for Buddy {
    fn from(row: BuddyRow) -> Self {
        Buddy {
            character_id: row.character_id as u32,
            group: row.group_name,
            character_name: row.character_name,
            channel_id: row.channel_id as i8,
            in_shop: row.in_shop == 1,
            pending: row.pending == 1,
        }
    }
}

/// New buddy edge for INSERT
#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = buddies)]
pub struct NewBuddy<'a> {
    pub list_id: &'a str,
    pub character_id: i64,
    pub group_name: &'a str,
    pub character_name: &'a str,
    pub channel_id: i32,
    pub in_shop: i32,
    pub pending: i32,
}

impl<'a> NewBuddy<'a> {
    pub fn from_buddy(list_id: &'a str, buddy: &'a Buddy) -> Self {
        Self {
            list_id,
            character_id: buddy.character_id as i64,
            group_name: &buddy.group,
            character_name: &buddy.character_name,
            channel_id: buddy.channel_id as i32,
            in_shop: flag(buddy.in_shop),
            pending: flag(buddy.pending),
        }
    }
}
