//! Relationship lifecycle integration tests
//!
//! Each test drives the processor against an in-memory database and checks
//! both persisted lists and the status events published afterwards.

mod common;

use buddy_lists::list::{DEFAULT_GROUP, OFFLINE_CHANNEL};
use buddy_lists::{BuddyError, ErrorKind, StatusEvent, TenantContext};
use common::*;
use uuid::Uuid;

#[test]
fn test_third_add_on_capacity_two_is_list_full() {
    let mut h = Harness::new();
    h.lists(&[BOB, CAROL, DAVE], 20);
    h.lists(&[ALICE], 2);

    h.processor.request_add_buddy(&h.ctx, ALICE, WORLD, BOB, "Friends").unwrap();
    h.processor.request_add_buddy(&h.ctx, ALICE, WORLD, CAROL, "Friends").unwrap();
    h.drain();

    let err = h
        .processor
        .request_add_buddy(&h.ctx, ALICE, WORLD, DAVE, "Friends")
        .unwrap_err();
    assert!(matches!(err, BuddyError::ListFull(ALICE)));

    assert_eq!(h.buddy_ids(ALICE), vec![BOB, CAROL]);
    assert_eq!(h.drain(), vec![StatusEvent::error(WORLD, ALICE, ErrorKind::ListFull)]);
}

#[test]
fn test_request_leaves_pending_edge_and_creates_invite() {
    let mut h = Harness::new();
    h.lists(&[ALICE, BOB], 20);

    h.processor.request_add_buddy(&h.ctx, ALICE, WORLD, BOB, "Friends").unwrap();

    let alice = h.processor.get_buddies(&h.ctx, ALICE).unwrap();
    assert_eq!(alice.len(), 1);
    assert_eq!(alice[0].character_id, BOB);
    assert_eq!(alice[0].character_name, "Bob");
    assert_eq!(alice[0].group, "Friends");
    assert!(alice[0].pending);
    assert!(h.buddy_ids(BOB).is_empty());

    assert_eq!(
        h.drain(),
        vec![StatusEvent::buddy_added(WORLD, ALICE, BOB, "Friends", "Bob", OFFLINE_CHANNEL)]
    );
    assert_eq!(
        h.invites.calls(),
        vec![InviteCall::Create {
            actor_id: ALICE,
            world_id: WORLD,
            target_id: BOB
        }]
    );
}

#[test]
fn test_mutual_requests_complete_without_invite() {
    let mut h = Harness::new();
    h.lists(&[ALICE, BOB], 20);

    h.processor.request_add_buddy(&h.ctx, ALICE, WORLD, BOB, "Friends").unwrap();
    h.drain();

    h.processor.request_add_buddy(&h.ctx, BOB, WORLD, ALICE, "Guild").unwrap();

    let alice = h.processor.get_buddies(&h.ctx, ALICE).unwrap();
    let bob = h.processor.get_buddies(&h.ctx, BOB).unwrap();
    assert_eq!(alice.len(), 1);
    assert_eq!(bob.len(), 1);
    assert!(!alice[0].pending);
    assert!(!bob[0].pending);
    assert_eq!(bob[0].group, "Guild");

    assert_eq!(
        h.drain(),
        vec![
            StatusEvent::buddy_added(WORLD, BOB, ALICE, "Guild", "Alice", OFFLINE_CHANNEL),
            StatusEvent::buddy_added(WORLD, ALICE, BOB, "Friends", "Bob", OFFLINE_CHANNEL),
        ]
    );
    // Only Alice's original request produced an invite
    assert_eq!(h.invites.calls().len(), 1);
}

#[test]
fn test_accept_invite_is_symmetric() {
    let mut h = Harness::new();
    h.lists(&[ALICE, BOB], 20);

    h.processor.request_add_buddy(&h.ctx, ALICE, WORLD, BOB, "Friends").unwrap();
    h.drain();

    h.processor.accept_invite(&h.ctx, BOB, WORLD, ALICE).unwrap();

    let alice = h.processor.get_buddies(&h.ctx, ALICE).unwrap();
    let bob = h.processor.get_buddies(&h.ctx, BOB).unwrap();
    assert_eq!(alice.len(), 1);
    assert_eq!(alice[0].character_id, BOB);
    assert_eq!(alice[0].group, "Friends");
    assert!(!alice[0].pending);
    assert_eq!(bob.len(), 1);
    assert_eq!(bob[0].character_id, ALICE);
    assert_eq!(bob[0].character_name, "Alice");
    assert_eq!(bob[0].group, DEFAULT_GROUP);
    assert!(!bob[0].pending);

    assert_eq!(
        h.drain(),
        vec![StatusEvent::buddy_added(WORLD, BOB, ALICE, DEFAULT_GROUP, "Alice", OFFLINE_CHANNEL)]
    );
}

#[test]
fn test_accept_with_full_list_fails() {
    let mut h = Harness::new();
    h.lists(&[ALICE, CAROL], 20);
    h.lists(&[BOB], 1);

    h.processor.request_add_buddy(&h.ctx, ALICE, WORLD, BOB, "Friends").unwrap();
    h.processor.request_add_buddy(&h.ctx, BOB, WORLD, CAROL, "Friends").unwrap();
    h.drain();

    let err = h.processor.accept_invite(&h.ctx, BOB, WORLD, ALICE).unwrap_err();
    assert!(matches!(err, BuddyError::ListFull(BOB)));

    // Alice's pending edge survives the rolled back accept
    let alice = h.processor.get_buddies(&h.ctx, ALICE).unwrap();
    assert!(alice[0].pending);
    assert_eq!(h.drain(), vec![StatusEvent::error(WORLD, BOB, ErrorKind::ListFull)]);
}

#[test]
fn test_accept_full_list_checked_before_lookups() {
    let mut h = Harness::new();
    h.lists(&[CAROL], 20);
    h.lists(&[BOB], 1);
    h.processor.request_add_buddy(&h.ctx, BOB, WORLD, CAROL, "Friends").unwrap();
    h.drain();

    // The originator is unknown, but Bob has no room either way
    let err = h.processor.accept_invite(&h.ctx, BOB, WORLD, MISSING).unwrap_err();
    assert!(matches!(err, BuddyError::ListFull(BOB)));
    assert_eq!(h.drain(), vec![StatusEvent::error(WORLD, BOB, ErrorKind::ListFull)]);
    assert_eq!(h.buddy_ids(BOB), vec![CAROL]);
}

#[test]
fn test_accept_without_pending_edge_into_full_list() {
    let mut h = Harness::new();
    h.lists(&[ALICE], 1);
    h.lists(&[BOB, CAROL], 20);
    h.processor.request_add_buddy(&h.ctx, ALICE, WORLD, CAROL, "Friends").unwrap();
    h.drain();

    let err = h.processor.accept_invite(&h.ctx, BOB, WORLD, ALICE).unwrap_err();
    assert!(matches!(err, BuddyError::OtherListFull(ALICE)));
    assert_eq!(h.drain(), vec![StatusEvent::error(WORLD, BOB, ErrorKind::OtherListFull)]);
    assert!(h.buddy_ids(BOB).is_empty());
    assert_eq!(h.buddy_ids(ALICE), vec![CAROL]);
}

#[test]
fn test_redelivered_accept_is_already_buddy() {
    let mut h = Harness::new();
    h.lists(&[ALICE, BOB], 20);
    h.befriend(ALICE, BOB);
    h.drain();

    let err = h.processor.accept_invite(&h.ctx, BOB, WORLD, ALICE).unwrap_err();
    assert!(matches!(err, BuddyError::AlreadyBuddy { character_id: BOB, target_id: ALICE }));
    assert_eq!(h.drain(), vec![StatusEvent::error(WORLD, BOB, ErrorKind::AlreadyBuddy)]);
    assert_eq!(h.buddy_ids(ALICE), vec![BOB]);
    assert_eq!(h.buddy_ids(BOB), vec![ALICE]);
    assert!(h.processor.get_buddies(&h.ctx, ALICE).unwrap().iter().all(|b| !b.pending));
}

#[test]
fn test_accept_from_unknown_originator() {
    let mut h = Harness::new();
    h.lists(&[BOB], 20);

    let err = h.processor.accept_invite(&h.ctx, BOB, WORLD, MISSING).unwrap_err();
    assert!(matches!(err, BuddyError::TargetNotFound(MISSING)));
    assert_eq!(h.drain(), vec![StatusEvent::error(WORLD, BOB, ErrorKind::CharacterNotFound)]);
    assert!(h.buddy_ids(BOB).is_empty());
}

#[test]
fn test_accept_by_unresolvable_character() {
    let mut h = Harness::new();
    h.lists(&[MISSING, ALICE], 20);

    let err = h.processor.accept_invite(&h.ctx, MISSING, WORLD, ALICE).unwrap_err();
    assert!(matches!(err, BuddyError::Directory(_)));
    assert_eq!(h.drain(), vec![StatusEvent::error(WORLD, MISSING, ErrorKind::UnknownError)]);
    assert!(h.buddy_ids(MISSING).is_empty());
    assert!(h.buddy_ids(ALICE).is_empty());
}

#[test]
fn test_redelivered_request_is_already_buddy() {
    let mut h = Harness::new();
    h.lists(&[ALICE, BOB], 20);

    h.processor.request_add_buddy(&h.ctx, ALICE, WORLD, BOB, "Friends").unwrap();
    h.drain();

    let err = h
        .processor
        .request_add_buddy(&h.ctx, ALICE, WORLD, BOB, "Friends")
        .unwrap_err();
    assert!(matches!(err, BuddyError::AlreadyBuddy { character_id: ALICE, target_id: BOB }));
    assert_eq!(h.buddy_ids(ALICE), vec![BOB]);
    assert_eq!(h.drain(), vec![StatusEvent::error(WORLD, ALICE, ErrorKind::AlreadyBuddy)]);
    assert_eq!(h.invites.calls().len(), 1);
}

#[test]
fn test_full_target_list_is_other_list_full() {
    let mut h = Harness::new();
    h.lists(&[ALICE, CAROL], 20);
    h.lists(&[BOB], 1);
    h.processor.request_add_buddy(&h.ctx, BOB, WORLD, CAROL, "Friends").unwrap();
    h.drain();

    let err = h
        .processor
        .request_add_buddy(&h.ctx, ALICE, WORLD, BOB, "Friends")
        .unwrap_err();
    assert!(matches!(err, BuddyError::OtherListFull(BOB)));
    assert!(h.buddy_ids(ALICE).is_empty());
    assert_eq!(h.drain(), vec![StatusEvent::error(WORLD, ALICE, ErrorKind::OtherListFull)]);
}

#[test]
fn test_gm_and_unknown_targets_rejected() {
    let mut h = Harness::new();
    h.lists(&[ALICE, GM], 20);

    let err = h.processor.request_add_buddy(&h.ctx, ALICE, WORLD, GM, "Friends").unwrap_err();
    assert!(matches!(err, BuddyError::CannotBuddyGm(GM)));

    let err = h
        .processor
        .request_add_buddy(&h.ctx, ALICE, WORLD, MISSING, "Friends")
        .unwrap_err();
    assert!(matches!(err, BuddyError::TargetNotFound(MISSING)));

    let kinds: Vec<_> = h.drain().iter().filter_map(error_kind).collect();
    assert_eq!(kinds, vec![ErrorKind::CannotBuddyGm, ErrorKind::CharacterNotFound]);
    assert!(h.buddy_ids(ALICE).is_empty());
    assert!(h.invites.calls().is_empty());
}

#[test]
fn test_delete_missing_edge_rejects_invite() {
    let mut h = Harness::new();
    h.lists(&[ALICE, BOB], 20);

    // Bob declines Alice's request from the buddy window
    h.processor.request_add_buddy(&h.ctx, ALICE, WORLD, BOB, "Friends").unwrap();
    h.drain();

    h.processor.request_delete_buddy(&h.ctx, BOB, WORLD, ALICE).unwrap();
    h.processor.request_delete_buddy(&h.ctx, BOB, WORLD, ALICE).unwrap();

    assert!(h.drain().is_empty());
    let rejects: Vec<_> = h
        .invites
        .calls()
        .into_iter()
        .filter(|c| matches!(c, InviteCall::Reject { .. }))
        .collect();
    assert_eq!(
        rejects,
        vec![
            InviteCall::Reject {
                actor_id: BOB,
                world_id: WORLD,
                originator_id: ALICE
            };
            2
        ]
    );
    assert_eq!(h.buddy_ids(ALICE), vec![BOB]);
}

#[test]
fn test_delete_keeps_mirror_edge_offline() {
    let mut h = Harness::new();
    h.lists(&[ALICE, BOB], 20);
    h.befriend(ALICE, BOB);
    h.processor.update_channel(&h.ctx, ALICE, WORLD, 3).unwrap();
    h.drain();

    h.processor.request_delete_buddy(&h.ctx, ALICE, WORLD, BOB).unwrap();

    assert!(h.buddy_ids(ALICE).is_empty());
    let bob = h.processor.get_buddies(&h.ctx, BOB).unwrap();
    assert_eq!(bob.len(), 1);
    assert_eq!(bob[0].character_id, ALICE);
    assert_eq!(bob[0].channel_id, OFFLINE_CHANNEL);

    assert_eq!(
        h.drain(),
        vec![
            StatusEvent::buddy_removed(WORLD, ALICE, BOB),
            StatusEvent::buddy_channel_change(WORLD, BOB, ALICE, OFFLINE_CHANNEL),
        ]
    );
}

#[test]
fn test_reject_invite_removes_pending_edge() {
    let mut h = Harness::new();
    h.lists(&[ALICE, BOB], 20);
    h.processor.request_add_buddy(&h.ctx, ALICE, WORLD, BOB, "Friends").unwrap();
    h.drain();

    h.processor.reject_invite(&h.ctx, ALICE, WORLD, BOB).unwrap();
    assert!(h.buddy_ids(ALICE).is_empty());
    assert_eq!(h.drain(), vec![StatusEvent::buddy_removed(WORLD, ALICE, BOB)]);

    // Redelivery finds nothing to remove
    h.processor.reject_invite(&h.ctx, ALICE, WORLD, BOB).unwrap();
    assert!(h.drain().is_empty());
}

#[test]
fn test_capacity_reduction_guard() {
    let mut h = Harness::new();
    h.lists(&[BOB, CAROL], 20);
    h.lists(&[ALICE], 5);
    h.processor.request_add_buddy(&h.ctx, ALICE, WORLD, BOB, "Friends").unwrap();
    h.processor.request_add_buddy(&h.ctx, ALICE, WORLD, CAROL, "Friends").unwrap();
    h.drain();

    let err = h.processor.update_capacity(&h.ctx, ALICE, WORLD, 1).unwrap_err();
    assert!(matches!(err, BuddyError::CapacityTooSmall { capacity: 1, count: 2 }));

    let err = h.processor.update_capacity(&h.ctx, ALICE, WORLD, 0).unwrap_err();
    assert!(matches!(err, BuddyError::InvalidCapacity(0)));

    let list = h.processor.get_list(&h.ctx, ALICE).unwrap().unwrap();
    assert_eq!(list.capacity(), 5);
    assert_eq!(
        h.drain(),
        vec![
            StatusEvent::error(WORLD, ALICE, ErrorKind::CapacityTooSmall),
            StatusEvent::error(WORLD, ALICE, ErrorKind::InvalidCapacity),
        ]
    );

    h.processor.update_capacity(&h.ctx, ALICE, WORLD, 2).unwrap();
    let list = h.processor.get_list(&h.ctx, ALICE).unwrap().unwrap();
    assert_eq!(list.capacity(), 2);
    assert_eq!(h.drain(), vec![StatusEvent::capacity_change(WORLD, ALICE, 2)]);
}

#[test]
fn test_login_propagates_channel_to_mirrors() {
    let mut h = Harness::new();
    h.lists(&[ALICE, BOB, CAROL, DAVE], 20);
    h.befriend(ALICE, BOB);
    h.befriend(CAROL, ALICE);
    // Dave never answered, so he has no edge back
    h.processor.request_add_buddy(&h.ctx, ALICE, WORLD, DAVE, "Friends").unwrap();
    h.drain();

    let notified = h.processor.update_channel(&h.ctx, ALICE, WORLD, 5).unwrap();
    assert_eq!(notified, 2);

    for buddy in [BOB, CAROL] {
        let mirror = h
            .processor
            .get_buddies(&h.ctx, buddy)
            .unwrap()
            .into_iter()
            .find(|b| b.character_id == ALICE)
            .unwrap();
        assert_eq!(mirror.channel_id, 5);
    }
    assert!(h.buddy_ids(DAVE).is_empty());

    let mut events = h.drain();
    events.sort_by_key(|e| e.character_id);
    assert_eq!(
        events,
        vec![
            StatusEvent::buddy_channel_change(WORLD, BOB, ALICE, 5),
            StatusEvent::buddy_channel_change(WORLD, CAROL, ALICE, 5),
        ]
    );
}

#[test]
fn test_shop_status_sends_mirror_display_fields() {
    let mut h = Harness::new();
    h.lists(&[ALICE, BOB], 20);
    h.befriend(ALICE, BOB);
    h.processor.update_channel(&h.ctx, ALICE, WORLD, 2).unwrap();
    h.drain();

    let notified = h.processor.update_shop_status(&h.ctx, ALICE, WORLD, true).unwrap();
    assert_eq!(notified, 1);

    let bob = h.processor.get_buddies(&h.ctx, BOB).unwrap();
    assert!(bob[0].in_shop);
    assert_eq!(
        h.drain(),
        vec![StatusEvent::buddy_updated(WORLD, BOB, ALICE, DEFAULT_GROUP, "Alice", 2, true)]
    );

    // A character without a list is skipped
    assert_eq!(h.processor.update_shop_status(&h.ctx, ERIN, WORLD, true).unwrap(), 0);
}

#[test]
fn test_deleted_character_removed_from_every_list() {
    let mut h = Harness::new();
    h.lists(&[ALICE, BOB, CAROL, DAVE], 20);
    h.befriend(ALICE, BOB);
    h.befriend(ALICE, CAROL);
    h.befriend(DAVE, ALICE);
    h.drain();

    h.processor.delete_list(&h.ctx, ALICE, WORLD).unwrap();

    assert!(h.processor.get_list(&h.ctx, ALICE).unwrap().is_none());
    for buddy in [BOB, CAROL, DAVE] {
        assert!(h.buddy_ids(buddy).is_empty());
    }

    let mut events = h.drain();
    events.sort_by_key(|e| e.character_id);
    assert_eq!(
        events,
        vec![
            StatusEvent::buddy_removed(WORLD, BOB, ALICE),
            StatusEvent::buddy_removed(WORLD, CAROL, ALICE),
            StatusEvent::buddy_removed(WORLD, DAVE, ALICE),
        ]
    );

    let stats = h.processor.stats(&h.ctx).unwrap();
    assert_eq!(stats.list_count, 3);
    assert_eq!(stats.buddy_count, 0);

    // Deleting again is a no-op
    h.processor.delete_list(&h.ctx, ALICE, WORLD).unwrap();
    assert!(h.drain().is_empty());
}

#[test]
fn test_tenants_are_isolated() {
    let h = Harness::new();
    let other = TenantContext::new(Uuid::new_v4());
    h.lists(&[ALICE, BOB], 20);
    h.processor.create_list(&other, ALICE, 20).unwrap();
    h.processor.create_list(&other, BOB, 20).unwrap();

    h.befriend(ALICE, BOB);

    assert!(h.processor.get_buddies(&other, ALICE).unwrap().is_empty());
    assert!(h.processor.get_buddies(&other, BOB).unwrap().is_empty());

    h.processor.delete_list(&other, ALICE, WORLD).unwrap();
    assert!(h.processor.get_list(&h.ctx, ALICE).unwrap().is_some());
    assert_eq!(h.buddy_ids(BOB), vec![ALICE]);
}

#[test]
fn test_capacity_invariant_holds_under_churn() {
    let h = Harness::new();
    h.lists(&[BOB, CAROL, DAVE, ERIN], 20);
    h.lists(&[ALICE], 3);

    for target in [BOB, CAROL, DAVE, ERIN] {
        let _ = h.processor.request_add_buddy(&h.ctx, ALICE, WORLD, target, "Friends");
        let _ = h.processor.accept_invite(&h.ctx, target, WORLD, ALICE);
    }
    let _ = h.processor.request_delete_buddy(&h.ctx, ALICE, WORLD, CAROL);
    let _ = h.processor.request_add_buddy(&h.ctx, ALICE, WORLD, ERIN, "Friends");
    let _ = h.processor.update_capacity(&h.ctx, ALICE, WORLD, 1);

    let list = h.processor.get_list(&h.ctx, ALICE).unwrap().unwrap();
    assert!(list.len() <= list.capacity() as usize);

    let mut ids = h.buddy_ids(ALICE);
    let total = ids.len();
    ids.sort_unstable();
    ids.dedup();
    assert_eq!(ids.len(), total);
}
