//! Buddy list processor - the relationship engine
//!
//! Every operation runs in one immediate transaction and stages its status
//! events in an [`EventBuffer`]. After commit the whole buffer is flushed;
//! after rollback only error notifications addressed to the initiating
//! character are delivered. A crash between commit and flush loses the
//! notifications but never the state change.
//!
//! Relationships are stored as two directed edges, one on each party's list.
//! A request leaves a single pending edge on the requester's list until the
//! target accepts, or until the target requests back.

use std::sync::Arc;

use diesel::sqlite::SqliteConnection;
use tracing::{debug, error, info, warn};

use super::character::CharacterDirectory;
use super::events::{ErrorKind, EventBuffer, MessageTransport, StatusEvent};
use super::invite::InviteSubsystem;
use crate::db::{lists, BuddyDb, DbStats, TenantContext};
use crate::error::BuddyError;
use crate::list::{Buddy, BuddyList, DEFAULT_GROUP, OFFLINE_CHANNEL};

/// Character that receives an `ERROR` notification when an operation fails
#[derive(Debug, Clone, Copy)]
struct Initiator {
    world_id: u8,
    character_id: u32,
}

/// Relationship engine over the list store
pub struct BuddyListProcessor {
    db: BuddyDb,
    directory: Arc<dyn CharacterDirectory>,
    invites: Arc<dyn InviteSubsystem>,
    transport: Arc<dyn MessageTransport>,
    status_topic: String,
}

impl BuddyListProcessor {
    pub fn new(
        db: BuddyDb,
        directory: Arc<dyn CharacterDirectory>,
        invites: Arc<dyn InviteSubsystem>,
        transport: Arc<dyn MessageTransport>,
        status_topic: impl Into<String>,
    ) -> Self {
        Self {
            db,
            directory,
            invites,
            transport,
            status_topic: status_topic.into(),
        }
    }

    // =========================================================================
    // Transaction boundary
    // =========================================================================

    fn execute<T, F>(&self, ctx: &TenantContext, initiator: Option<Initiator>, op: F) -> Result<T, BuddyError>
    where
        F: FnOnce(&mut SqliteConnection, &mut EventBuffer) -> Result<T, BuddyError>,
    {
        let mut buffer = EventBuffer::new(ctx);

        match self.db.transaction(|conn| op(conn, &mut buffer)) {
            Ok(value) => {
                if let Err(e) = buffer.flush(self.transport.as_ref()) {
                    error!(tenant = %ctx.key(), error = %e, "Transaction committed but status events were not emitted");
                }
                Ok(value)
            }
            Err(err) => self.fail_with(ctx, buffer, initiator, err),
        }
    }

    /// Report a failure detected before any transaction was opened
    fn fail<T>(&self, ctx: &TenantContext, initiator: Initiator, err: BuddyError) -> Result<T, BuddyError> {
        self.fail_with(ctx, EventBuffer::new(ctx), Some(initiator), err)
    }

    fn fail_with<T>(
        &self,
        ctx: &TenantContext,
        mut buffer: EventBuffer,
        initiator: Option<Initiator>,
        err: BuddyError,
    ) -> Result<T, BuddyError> {
        self.log_failure(&err, initiator);
        if let Some(initiator) = initiator {
            buffer.put(
                &self.status_topic,
                StatusEvent::error(initiator.world_id, initiator.character_id, err.kind()),
            );
        }
        if let Err(e) = buffer.flush_errors(self.transport.as_ref()) {
            error!(tenant = %ctx.key(), error = %e, "Unable to emit error notification");
        }
        Err(err)
    }

    fn log_failure(&self, err: &BuddyError, initiator: Option<Initiator>) {
        let character_id = initiator.map(|i| i.character_id);
        if err.kind() == ErrorKind::UnknownError {
            error!(character_id = ?character_id, error = %err, "Buddy list operation failed");
        } else {
            info!(character_id = ?character_id, error = %err, "Buddy list operation rejected");
        }
    }

    // =========================================================================
    // Read Operations
    // =========================================================================

    /// Get a character's list
    pub fn get_list(&self, ctx: &TenantContext, character_id: u32) -> Result<Option<BuddyList>, BuddyError> {
        self.db.with_conn(|conn| lists::get_list(conn, ctx, character_id))
    }

    /// Get a character's buddies in insertion order
    pub fn get_buddies(&self, ctx: &TenantContext, character_id: u32) -> Result<Vec<Buddy>, BuddyError> {
        self.get_list(ctx, character_id)?
            .map(|list| list.buddies().to_vec())
            .ok_or(BuddyError::ListNotFound(character_id))
    }

    /// List and edge counts for one tenant
    pub fn stats(&self, ctx: &TenantContext) -> Result<DbStats, BuddyError> {
        self.db.with_conn(|conn| lists::stats(conn, Some(ctx)))
    }

    // =========================================================================
    // List lifecycle
    // =========================================================================

    /// Create an empty list for `character_id`
    pub fn create_list(&self, ctx: &TenantContext, character_id: u32, capacity: u8) -> Result<BuddyList, BuddyError> {
        let list = self.execute(ctx, None, |conn, _| lists::create_list(conn, ctx, character_id, capacity))?;
        info!(character_id, capacity, "Created buddy list");
        Ok(list)
    }

    /// Remove a deleted character from every list that references it, then
    /// drop its own list
    pub fn delete_list(&self, ctx: &TenantContext, character_id: u32, world_id: u8) -> Result<(), BuddyError> {
        let topic = self.status_topic.as_str();

        self.execute(ctx, None, |conn, buffer| {
            if lists::get_list(conn, ctx, character_id)?.is_none() {
                debug!(character_id, "No buddy list to delete");
                return Ok(());
            }

            let owners = lists::inbound_owners(conn, ctx, character_id)?;
            lists::remove_inbound_buddies(conn, ctx, character_id)?;
            for owner in &owners {
                buffer.put(topic, StatusEvent::buddy_removed(world_id, *owner, character_id));
            }

            lists::delete_list(conn, ctx, character_id)?;
            info!(character_id, removed_from = owners.len(), "Deleted buddy list");
            Ok(())
        })
    }

    /// Change a list's capacity
    ///
    /// The new capacity must be non-zero and at least the current buddy count.
    pub fn update_capacity(
        &self,
        ctx: &TenantContext,
        character_id: u32,
        world_id: u8,
        capacity: u8,
    ) -> Result<(), BuddyError> {
        let topic = self.status_topic.as_str();
        let initiator = Initiator { world_id, character_id };

        self.execute(ctx, Some(initiator), |conn, buffer| {
            if capacity == 0 {
                return Err(BuddyError::InvalidCapacity(capacity));
            }

            let list = lists::get_list(conn, ctx, character_id)?.ok_or(BuddyError::TargetNotFound(character_id))?;
            if (capacity as usize) < list.len() {
                return Err(BuddyError::CapacityTooSmall {
                    capacity,
                    count: list.len(),
                });
            }
            list.to_builder().capacity(capacity).build()?;

            lists::update_capacity(conn, ctx, character_id, capacity)?;
            buffer.put(topic, StatusEvent::capacity_change(world_id, character_id, capacity));
            debug!(character_id, from = list.capacity(), to = capacity, "Updated buddy list capacity");
            Ok(())
        })
    }

    // =========================================================================
    // Relationship operations
    // =========================================================================

    /// `character_id` asks to add `target_id` under `group`
    pub fn request_add_buddy(
        &self,
        ctx: &TenantContext,
        character_id: u32,
        world_id: u8,
        target_id: u32,
        group: &str,
    ) -> Result<(), BuddyError> {
        let initiator = Initiator { world_id, character_id };

        let target = match self.directory.get_by_id(ctx, target_id) {
            Ok(target) => target,
            Err(e) => {
                warn!(character_id, target_id, error = %e, "Unable to retrieve character information");
                return self.fail(ctx, initiator, BuddyError::TargetNotFound(target_id));
            }
        };
        if target.is_gm() {
            return self.fail(ctx, initiator, BuddyError::CannotBuddyGm(target_id));
        }

        let topic = self.status_topic.as_str();
        self.execute(ctx, Some(initiator), |conn, buffer| {
            let list = lists::get_list(conn, ctx, character_id)?.ok_or(BuddyError::ListNotFound(character_id))?;
            if list.is_full() {
                return Err(BuddyError::ListFull(character_id));
            }
            if list.contains(target_id) {
                return Err(BuddyError::AlreadyBuddy { character_id, target_id });
            }

            let target_list = lists::get_list(conn, ctx, target_id)?.ok_or(BuddyError::ListNotFound(target_id))?;
            if target_list.is_full() {
                return Err(BuddyError::OtherListFull(target_id));
            }

            if let Some(mirror) = target_list.find(character_id) {
                debug!(character_id, target_id, "Target already requested character, completing immediately");
                lists::add_buddy(conn, ctx, character_id, &Buddy::new(target_id, target.name.clone(), group, false))?;
                lists::confirm_buddy(conn, ctx, target_id, character_id)?;

                buffer.put(
                    topic,
                    StatusEvent::buddy_added(world_id, character_id, target_id, group, target.name.clone(), OFFLINE_CHANNEL),
                );
                buffer.put(
                    topic,
                    StatusEvent::buddy_added(
                        world_id,
                        target_id,
                        character_id,
                        mirror.group.clone(),
                        mirror.character_name.clone(),
                        mirror.channel_id,
                    ),
                );
                return Ok(());
            }

            lists::add_buddy(conn, ctx, character_id, &Buddy::new(target_id, target.name.clone(), group, true))?;
            self.invites
                .create(ctx, character_id, world_id, target_id)
                .map_err(|e| BuddyError::Invite(format!("Unable to create invite for {}: {}", target_id, e)))?;

            buffer.put(
                topic,
                StatusEvent::buddy_added(world_id, character_id, target_id, group, target.name.clone(), OFFLINE_CHANNEL),
            );
            Ok(())
        })
    }

    /// `character_id` removes `target_id`
    ///
    /// With no edge to remove, the request is a rejection of the target's
    /// pending invite.
    pub fn request_delete_buddy(
        &self,
        ctx: &TenantContext,
        character_id: u32,
        world_id: u8,
        target_id: u32,
    ) -> Result<(), BuddyError> {
        let topic = self.status_topic.as_str();
        let initiator = Initiator { world_id, character_id };

        self.execute(ctx, Some(initiator), |conn, buffer| {
            let list = lists::get_list(conn, ctx, character_id)?.ok_or(BuddyError::ListNotFound(character_id))?;
            if !list.contains(target_id) {
                debug!(character_id, target_id, "Target is not on buddy list, treating as invite rejection");
                return self
                    .invites
                    .reject(ctx, character_id, world_id, target_id)
                    .map_err(|e| BuddyError::Invite(format!("Unable to reject invite from {}: {}", target_id, e)));
            }

            remove_edge(conn, buffer, topic, ctx, character_id, world_id, target_id)?;
            Ok(())
        })
    }

    /// `character_id` accepted the buddy invite sent by `originator_id`
    ///
    /// The accepter's own list is checked before either character is resolved,
    /// so a full list or a redelivered accept is reported as such even when
    /// the directory is unavailable. The checks run again under the write lock.
    pub fn accept_invite(
        &self,
        ctx: &TenantContext,
        character_id: u32,
        world_id: u8,
        originator_id: u32,
    ) -> Result<(), BuddyError> {
        let initiator = Initiator { world_id, character_id };

        let precheck = self.db.with_conn(|conn| {
            let list = lists::get_list(conn, ctx, character_id)?.ok_or(BuddyError::ListNotFound(character_id))?;
            can_accept(&list, originator_id)
        });
        if let Err(e) = precheck {
            return self.fail(ctx, initiator, e);
        }

        let accepter = match self.directory.get_by_id(ctx, character_id) {
            Ok(c) => c,
            Err(e) => {
                return self.fail(
                    ctx,
                    initiator,
                    BuddyError::Directory(format!("Unable to resolve accepting character {}: {}", character_id, e)),
                );
            }
        };
        let originator = match self.directory.get_by_id(ctx, originator_id) {
            Ok(c) => c,
            Err(e) => {
                warn!(character_id, originator_id, error = %e, "Unable to retrieve character information");
                return self.fail(ctx, initiator, BuddyError::TargetNotFound(originator_id));
            }
        };

        let topic = self.status_topic.as_str();
        self.execute(ctx, Some(initiator), |conn, buffer| {
            let list = lists::get_list(conn, ctx, character_id)?.ok_or(BuddyError::ListNotFound(character_id))?;
            can_accept(&list, originator_id)?;

            let originator_list =
                lists::get_list(conn, ctx, originator_id)?.ok_or(BuddyError::ListNotFound(originator_id))?;
            let pending = originator_list.find(character_id).cloned();
            if pending.is_none() && originator_list.is_full() {
                return Err(BuddyError::OtherListFull(originator_id));
            }

            lists::remove_buddy(conn, ctx, originator_id, character_id)?;
            lists::add_buddy(
                conn,
                ctx,
                character_id,
                &Buddy::new(originator_id, originator.name.clone(), DEFAULT_GROUP, false),
            )?;

            let mut reverse = Buddy::new(character_id, accepter.name.clone(), DEFAULT_GROUP, false);
            if let Some(pending) = pending {
                reverse.group = pending.group;
                reverse.channel_id = pending.channel_id;
                reverse.in_shop = pending.in_shop;
            }
            lists::add_buddy(conn, ctx, originator_id, &reverse)?;

            buffer.put(
                topic,
                StatusEvent::buddy_added(
                    world_id,
                    character_id,
                    originator_id,
                    DEFAULT_GROUP,
                    originator.name.clone(),
                    OFFLINE_CHANNEL,
                ),
            );
            info!(character_id, originator_id, "Buddy invite accepted");
            Ok(())
        })
    }

    /// `target_id` rejected the invite sent by `originator_id`
    pub fn reject_invite(
        &self,
        ctx: &TenantContext,
        originator_id: u32,
        world_id: u8,
        target_id: u32,
    ) -> Result<(), BuddyError> {
        let topic = self.status_topic.as_str();

        self.execute(ctx, None, |conn, buffer| {
            if !remove_edge(conn, buffer, topic, ctx, originator_id, world_id, target_id)? {
                debug!(originator_id, target_id, "No pending edge for rejected invite");
            }
            Ok(())
        })
    }

    // =========================================================================
    // Presence propagation
    // =========================================================================

    /// Record `character_id`'s channel on every buddy's mirror edge
    ///
    /// Returns the number of buddies notified.
    pub fn update_channel(
        &self,
        ctx: &TenantContext,
        character_id: u32,
        world_id: u8,
        channel_id: i8,
    ) -> Result<usize, BuddyError> {
        let topic = self.status_topic.as_str();

        self.execute(ctx, None, |conn, buffer| {
            let Some(list) = lists::get_list(conn, ctx, character_id)? else {
                debug!(character_id, "No buddy list, skipping channel update");
                return Ok(0);
            };

            let mut notified = 0;
            for buddy in list.buddies() {
                if lists::update_buddy_channel(conn, ctx, buddy.character_id, character_id, channel_id)? {
                    buffer.put(
                        topic,
                        StatusEvent::buddy_channel_change(world_id, buddy.character_id, character_id, channel_id),
                    );
                    notified += 1;
                }
            }
            debug!(character_id, channel_id, notified, "Propagated channel");
            Ok(notified)
        })
    }

    /// Record `character_id`'s cash shop status on every buddy's mirror edge
    ///
    /// Returns the number of buddies notified.
    pub fn update_shop_status(
        &self,
        ctx: &TenantContext,
        character_id: u32,
        world_id: u8,
        in_shop: bool,
    ) -> Result<usize, BuddyError> {
        let topic = self.status_topic.as_str();

        self.execute(ctx, None, |conn, buffer| {
            let Some(list) = lists::get_list(conn, ctx, character_id)? else {
                debug!(character_id, "No buddy list, skipping shop status update");
                return Ok(0);
            };

            let mut notified = 0;
            for buddy in list.buddies() {
                if !lists::update_buddy_shop_status(conn, ctx, buddy.character_id, character_id, in_shop)? {
                    continue;
                }
                let Some(mirror) = lists::get_buddy(conn, ctx, buddy.character_id, character_id)? else {
                    continue;
                };
                buffer.put(
                    topic,
                    StatusEvent::buddy_updated(
                        world_id,
                        buddy.character_id,
                        character_id,
                        mirror.group,
                        mirror.character_name,
                        mirror.channel_id,
                        mirror.in_shop,
                    ),
                );
                notified += 1;
            }
            debug!(character_id, in_shop, notified, "Propagated shop status");
            Ok(notified)
        })
    }
}

/// Room for one more edge, and no edge to `originator_id` yet
fn can_accept(list: &BuddyList, originator_id: u32) -> Result<(), BuddyError> {
    if list.is_full() {
        return Err(BuddyError::ListFull(list.character_id()));
    }
    if list.contains(originator_id) {
        return Err(BuddyError::AlreadyBuddy {
            character_id: list.character_id(),
            target_id: originator_id,
        });
    }
    Ok(())
}

/// Remove `owner_id`'s edge to `target_id` and mark `owner_id` offline on the
/// mirror edge, if there is one.
///
/// Returns false, staging nothing, when there was no edge.
fn remove_edge(
    conn: &mut SqliteConnection,
    buffer: &mut EventBuffer,
    topic: &str,
    ctx: &TenantContext,
    owner_id: u32,
    world_id: u8,
    target_id: u32,
) -> Result<bool, BuddyError> {
    if !lists::remove_buddy(conn, ctx, owner_id, target_id)? {
        return Ok(false);
    }

    let mirrored = lists::update_buddy_channel(conn, ctx, target_id, owner_id, OFFLINE_CHANNEL)?;

    buffer.put(topic, StatusEvent::buddy_removed(world_id, owner_id, target_id));
    if mirrored {
        buffer.put(topic, StatusEvent::buddy_channel_change(world_id, target_id, owner_id, OFFLINE_CHANNEL));
    }
    Ok(true)
}
