//! Buddy list store
//!
//! Persistence for lists and their directed edges. Every function takes the
//! caller's connection, so a command handler can compose several of them in
//! one transaction, and the tenant context, so nothing crosses tenants.
//!
//! Edge-level helpers address an edge by `(owner, target)`: the edge stored on
//! `owner`'s list that points at `target`.

use diesel::prelude::*;
use diesel::result::{DatabaseErrorKind, Error as DieselError};
use diesel::sqlite::SqliteConnection;
use uuid::Uuid;

use super::context::TenantContext;
use super::diesel_schema::{buddies, buddy_lists};
use super::DbStats;
use super::models::{current_timestamp, flag, BuddyListRow, BuddyRow, NewBuddy, NewBuddyList};
use crate::error::BuddyError;
use crate::list::{Buddy, BuddyList, ListBuilder};

// ============================================================================
// Lists
// ============================================================================

fn list_row(
    conn: &mut SqliteConnection,
    ctx: &TenantContext,
    character_id: u32,
) -> Result<Option<BuddyListRow>, BuddyError> {
    let row = buddy_lists::table
        .filter(buddy_lists::tenant_id.eq(ctx.key()))
        .filter(buddy_lists::character_id.eq(character_id as i64))
        .select(BuddyListRow::as_select())
        .first(conn)
        .optional()?;
    Ok(row)
}

fn list_id(
    conn: &mut SqliteConnection,
    ctx: &TenantContext,
    character_id: u32,
) -> Result<Option<String>, BuddyError> {
    let id = buddy_lists::table
        .filter(buddy_lists::tenant_id.eq(ctx.key()))
        .filter(buddy_lists::character_id.eq(character_id as i64))
        .select(buddy_lists::id)
        .first::<String>(conn)
        .optional()?;
    Ok(id)
}

fn require_list_id(
    conn: &mut SqliteConnection,
    ctx: &TenantContext,
    character_id: u32,
) -> Result<String, BuddyError> {
    list_id(conn, ctx, character_id)?.ok_or(BuddyError::ListNotFound(character_id))
}

fn load_buddies(conn: &mut SqliteConnection, list_id: &str) -> Result<Vec<Buddy>, BuddyError> {
    let rows: Vec<BuddyRow> = buddies::table
        .filter(buddies::list_id.eq(list_id))
        .order(buddies::id.asc())
        .select(BuddyRow::as_select())
        .load(conn)?;
    Ok(rows.into_iter().map(Buddy::from).collect())
}

fn hydrate(
    conn: &mut SqliteConnection,
    ctx: &TenantContext,
    row: BuddyListRow,
) -> Result<BuddyList, BuddyError> {
    let id = Uuid::parse_str(&row.id)
        .map_err(|e| BuddyError::Internal(format!("Corrupt list id '{}': {}", row.id, e)))?;
    let capacity = u8::try_from(row.capacity)
        .map_err(|_| BuddyError::Internal(format!("Corrupt capacity {} on list {}", row.capacity, row.id)))?;
    let buddies = load_buddies(conn, &row.id)?;

    let list = ListBuilder::new(ctx.tenant_id(), row.character_id as u32)
        .id(id)
        .capacity(capacity)
        .buddies(buddies)
        .build()?;
    Ok(list)
}

/// Get the list owned by `character_id`, with its edges in insertion order
pub fn get_list(
    conn: &mut SqliteConnection,
    ctx: &TenantContext,
    character_id: u32,
) -> Result<Option<BuddyList>, BuddyError> {
    match list_row(conn, ctx, character_id)? {
        Some(row) => hydrate(conn, ctx, row).map(Some),
        None => Ok(None),
    }
}

/// Create an empty list
///
/// Fails with [`BuddyError::DuplicateList`] when the owner already has one.
pub fn create_list(
    conn: &mut SqliteConnection,
    ctx: &TenantContext,
    character_id: u32,
    capacity: u8,
) -> Result<BuddyList, BuddyError> {
    let list = ListBuilder::new(ctx.tenant_id(), character_id)
        .id(Uuid::new_v4())
        .capacity(capacity)
        .build()?;

    let id = list.id().to_string();
    let new_list = NewBuddyList {
        id: &id,
        tenant_id: ctx.key(),
        character_id: character_id as i64,
        capacity: capacity as i32,
    };

    diesel::insert_into(buddy_lists::table)
        .values(&new_list)
        .execute(conn)
        .map_err(|e| match e {
            DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, _) => {
                BuddyError::DuplicateList(character_id)
            }
            other => BuddyError::Database(other),
        })?;

    Ok(list)
}

/// Change a list's capacity
///
/// Returns false when the owner has no list.
pub fn update_capacity(
    conn: &mut SqliteConnection,
    ctx: &TenantContext,
    character_id: u32,
    capacity: u8,
) -> Result<bool, BuddyError> {
    let updated = diesel::update(
        buddy_lists::table
            .filter(buddy_lists::tenant_id.eq(ctx.key()))
            .filter(buddy_lists::character_id.eq(character_id as i64)),
    )
    .set((
        buddy_lists::capacity.eq(capacity as i32),
        buddy_lists::updated_at.eq(current_timestamp()),
    ))
    .execute(conn)?;
    Ok(updated > 0)
}

/// Delete a list together with its outbound edges
///
/// Returns false when the owner has no list.
pub fn delete_list(
    conn: &mut SqliteConnection,
    ctx: &TenantContext,
    character_id: u32,
) -> Result<bool, BuddyError> {
    let Some(id) = list_id(conn, ctx, character_id)? else {
        return Ok(false);
    };

    diesel::delete(buddies::table.filter(buddies::list_id.eq(&id))).execute(conn)?;
    let deleted = diesel::delete(buddy_lists::table.filter(buddy_lists::id.eq(&id))).execute(conn)?;
    Ok(deleted > 0)
}

// ============================================================================
// Edges
// ============================================================================

/// Append an edge to `owner_id`'s list
pub fn add_buddy(
    conn: &mut SqliteConnection,
    ctx: &TenantContext,
    owner_id: u32,
    buddy: &Buddy,
) -> Result<(), BuddyError> {
    let list_id = require_list_id(conn, ctx, owner_id)?;

    diesel::insert_into(buddies::table)
        .values(&NewBuddy::from_buddy(&list_id, buddy))
        .execute(conn)
        .map_err(|e| match e {
            DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, _) => BuddyError::AlreadyBuddy {
                character_id: owner_id,
                target_id: buddy.character_id,
            },
            other => BuddyError::Database(other),
        })?;
    Ok(())
}

/// Get the edge on `owner_id`'s list pointing at `target_id`
pub fn get_buddy(
    conn: &mut SqliteConnection,
    ctx: &TenantContext,
    owner_id: u32,
    target_id: u32,
) -> Result<Option<Buddy>, BuddyError> {
    let Some(list_id) = list_id(conn, ctx, owner_id)? else {
        return Ok(None);
    };

    let row = buddies::table
        .filter(buddies::list_id.eq(&list_id))
        .filter(buddies::character_id.eq(target_id as i64))
        .select(BuddyRow::as_select())
        .first(conn)
        .optional()?;
    Ok(row.map(Buddy::from))
}

/// Remove the edge on `owner_id`'s list pointing at `target_id`
///
/// Returns whether an edge was removed. A missing list counts as no edge.
pub fn remove_buddy(
    conn: &mut SqliteConnection,
    ctx: &TenantContext,
    owner_id: u32,
    target_id: u32,
) -> Result<bool, BuddyError> {
    let Some(list_id) = list_id(conn, ctx, owner_id)? else {
        return Ok(false);
    };

    let removed = diesel::delete(
        buddies::table
            .filter(buddies::list_id.eq(&list_id))
            .filter(buddies::character_id.eq(target_id as i64)),
    )
    .execute(conn)?;
    Ok(removed > 0)
}

/// Clear the pending flag on an edge
pub fn confirm_buddy(
    conn: &mut SqliteConnection,
    ctx: &TenantContext,
    owner_id: u32,
    target_id: u32,
) -> Result<bool, BuddyError> {
    let Some(list_id) = list_id(conn, ctx, owner_id)? else {
        return Ok(false);
    };

    let updated = diesel::update(
        buddies::table
            .filter(buddies::list_id.eq(&list_id))
            .filter(buddies::character_id.eq(target_id as i64)),
    )
    .set(buddies::pending.eq(0))
    .execute(conn)?;
    Ok(updated > 0)
}

/// Record `target_id`'s channel on the edge `owner_id` holds for it
pub fn update_buddy_channel(
    conn: &mut SqliteConnection,
    ctx: &TenantContext,
    owner_id: u32,
    target_id: u32,
    channel_id: i8,
) -> Result<bool, BuddyError> {
    let Some(list_id) = list_id(conn, ctx, owner_id)? else {
        return Ok(false);
    };

    let updated = diesel::update(
        buddies::table
            .filter(buddies::list_id.eq(&list_id))
            .filter(buddies::character_id.eq(target_id as i64)),
    )
    .set(buddies::channel_id.eq(channel_id as i32))
    .execute(conn)?;
    Ok(updated > 0)
}

/// Record `target_id`'s shop status on the edge `owner_id` holds for it
pub fn update_buddy_shop_status(
    conn: &mut SqliteConnection,
    ctx: &TenantContext,
    owner_id: u32,
    target_id: u32,
    in_shop: bool,
) -> Result<bool, BuddyError> {
    let Some(list_id) = list_id(conn, ctx, owner_id)? else {
        return Ok(false);
    };

    let updated = diesel::update(
        buddies::table
            .filter(buddies::list_id.eq(&list_id))
            .filter(buddies::character_id.eq(target_id as i64)),
    )
    .set(buddies::in_shop.eq(flag(in_shop)))
    .execute(conn)?;
    Ok(updated > 0)
}

/// Owners, within the tenant, whose lists hold an edge pointing at `target_id`
pub fn inbound_owners(
    conn: &mut SqliteConnection,
    ctx: &TenantContext,
    target_id: u32,
) -> Result<Vec<u32>, BuddyError> {
    let owners: Vec<i64> = buddies::table
        .inner_join(buddy_lists::table)
        .filter(buddy_lists::tenant_id.eq(ctx.key()))
        .filter(buddies::character_id.eq(target_id as i64))
        .order(buddies::id.asc())
        .select(buddy_lists::character_id)
        .load(conn)?;
    Ok(owners.into_iter().map(|id| id as u32).collect())
}

/// Remove every edge, within the tenant, pointing at `target_id`
pub fn remove_inbound_buddies(
    conn: &mut SqliteConnection,
    ctx: &TenantContext,
    target_id: u32,
) -> Result<usize, BuddyError> {
    let edge_ids: Vec<i32> = buddies::table
        .inner_join(buddy_lists::table)
        .filter(buddy_lists::tenant_id.eq(ctx.key()))
        .filter(buddies::character_id.eq(target_id as i64))
        .select(buddies::id)
        .load(conn)?;

    if edge_ids.is_empty() {
        return Ok(0);
    }

    let removed = diesel::delete(buddies::table.filter(buddies::id.eq_any(edge_ids))).execute(conn)?;
    Ok(removed)
}

/// List, edge and pending edge counts, for one tenant or the whole store
pub fn stats(conn: &mut SqliteConnection, ctx: Option<&TenantContext>) -> Result<DbStats, BuddyError> {
    let mut lists = buddy_lists::table.count().into_boxed();
    let mut edges = buddies::table.inner_join(buddy_lists::table).count().into_boxed();
    let mut pending = buddies::table
        .inner_join(buddy_lists::table)
        .filter(buddies::pending.eq(1))
        .count()
        .into_boxed();

    if let Some(ctx) = ctx {
        lists = lists.filter(buddy_lists::tenant_id.eq(ctx.key()));
        edges = edges.filter(buddy_lists::tenant_id.eq(ctx.key()));
        pending = pending.filter(buddy_lists::tenant_id.eq(ctx.key()));
    }

    let list_count: i64 = lists.get_result(conn)?;
    let buddy_count: i64 = edges.get_result(conn)?;
    let pending_count: i64 = pending.get_result(conn)?;
    Ok(DbStats {
        list_count: list_count as u64,
        buddy_count: buddy_count as u64,
        pending_count: pending_count as u64,
    })
}
