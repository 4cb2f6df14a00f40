//! Database schema definitions

use diesel::prelude::*;
use diesel::sql_types::Integer;
use diesel::sqlite::SqliteConnection;
use tracing::info;

use crate::error::BuddyError;

/// Current schema version for migrations
pub const SCHEMA_VERSION: i32 = 1;

#[derive(QueryableByName)]
struct VersionRow {
    #[diesel(sql_type = Integer)]
    version: i32,
}

/// Initialize the database schema
pub fn init_schema(conn: &mut SqliteConnection) -> Result<(), BuddyError> {
    let current_version = get_schema_version(conn)?;

    if current_version == 0 {
        info!("Creating new database schema v{}", SCHEMA_VERSION);
        create_tables(conn)?;
        set_schema_version(conn, SCHEMA_VERSION)?;
    } else if current_version < SCHEMA_VERSION {
        info!("Migrating schema from v{} to v{}", current_version, SCHEMA_VERSION);
        set_schema_version(conn, SCHEMA_VERSION)?;
    } else {
        info!("Database schema is up to date (v{})", current_version);
    }

    Ok(())
}

/// Get current schema version (0 if not initialized)
fn get_schema_version(conn: &mut SqliteConnection) -> Result<i32, BuddyError> {
    diesel::sql_query("CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL)")
        .execute(conn)
        .map_err(|e| BuddyError::Internal(format!("Failed to create schema_version table: {}", e)))?;

    let row = diesel::sql_query("SELECT version FROM schema_version LIMIT 1")
        .get_result::<VersionRow>(conn)
        .optional()
        .map_err(|e| BuddyError::Internal(format!("Failed to read schema_version: {}", e)))?;

    Ok(row.map(|r| r.version).unwrap_or(0))
}

fn set_schema_version(conn: &mut SqliteConnection, version: i32) -> Result<(), BuddyError> {
    diesel::sql_query("DELETE FROM schema_version")
        .execute(conn)
        .map_err(|e| BuddyError::Internal(format!("Failed to clear schema_version: {}", e)))?;
    diesel::sql_query("INSERT INTO schema_version (version) VALUES (?)")
        .bind::<Integer, _>(version)
        .execute(conn)
        .map_err(|e| BuddyError::Internal(format!("Failed to set schema_version: {}", e)))?;
    Ok(())
}

fn create_tables(conn: &mut SqliteConnection) -> Result<(), BuddyError> {
    diesel::sql_query(LISTS_SCHEMA)
        .execute(conn)
        .map_err(|e| BuddyError::Internal(format!("Failed to create buddy_lists: {}", e)))?;

    diesel::sql_query(BUDDIES_SCHEMA)
        .execute(conn)
        .map_err(|e| BuddyError::Internal(format!("Failed to create buddies: {}", e)))?;

    for index in INDEXES {
        diesel::sql_query(*index)
            .execute(conn)
            .map_err(|e| BuddyError::Internal(format!("Failed to create index: {}", e)))?;
    }

    Ok(())
}

/// One list per (tenant, owner)
const LISTS_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS buddy_lists (
    id TEXT PRIMARY KEY NOT NULL,
    tenant_id TEXT NOT NULL,
    character_id BIGINT NOT NULL,
    capacity INTEGER NOT NULL CHECK (capacity > 0 AND capacity <= 255),
    created_at TEXT NOT NULL DEFAULT (datetime('now')),
    updated_at TEXT NOT NULL DEFAULT (datetime('now')),
    UNIQUE (tenant_id, character_id)
)
"#;

/// Directed edges. AUTOINCREMENT keeps insertion order stable for reads.
const BUDDIES_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS buddies (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    list_id TEXT NOT NULL REFERENCES buddy_lists(id) ON DELETE CASCADE,
    character_id BIGINT NOT NULL,
    group_name TEXT NOT NULL,
    character_name TEXT NOT NULL,
    channel_id INTEGER NOT NULL DEFAULT -1,
    in_shop INTEGER NOT NULL DEFAULT 0,
    pending INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL DEFAULT (datetime('now')),
    UNIQUE (list_id, character_id)
)
"#;

const INDEXES: &[&str] = &[
    "CREATE INDEX IF NOT EXISTS idx_buddy_lists_tenant ON buddy_lists(tenant_id)",
    "CREATE INDEX IF NOT EXISTS idx_buddies_list ON buddies(list_id)",
    "CREATE INDEX IF NOT EXISTS idx_buddies_character ON buddies(character_id)",
];
