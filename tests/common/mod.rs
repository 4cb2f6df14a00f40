//! Shared fixtures for the integration tests
//!
//! The processor runs against an in-memory database with fake collaborators:
//! a fixed character roster, an invite subsystem that records calls, and an
//! [`EventBus`] the tests read status events from.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use buddy_lists::services::events::StatusEventBody;
use buddy_lists::{
    BuddyDb, BuddyError, BuddyListProcessor, Character, CharacterDirectory, Envelope, EventBus, InviteSubsystem,
    StatusEvent, TenantContext,
};
use tokio::sync::broadcast;
use uuid::Uuid;

pub const STATUS_TOPIC: &str = "EVENT_TOPIC_BUDDY_LIST_STATUS";
pub const WORLD: u8 = 0;

pub const ALICE: u32 = 1000;
pub const BOB: u32 = 1001;
pub const CAROL: u32 = 1002;
pub const DAVE: u32 = 1003;
pub const ERIN: u32 = 1004;
pub const GM: u32 = 9000;
pub const MISSING: u32 = 4040;

/// Character roster keyed by id
pub struct Roster {
    characters: HashMap<u32, Character>,
}

impl Roster {
    pub fn new() -> Self {
        let mut characters = HashMap::new();
        for (id, name, gm) in [
            (ALICE, "Alice", 0),
            (BOB, "Bob", 0),
            (CAROL, "Carol", 0),
            (DAVE, "Dave", 0),
            (ERIN, "Erin", 0),
            (GM, "Admin", 1),
        ] {
            characters.insert(
                id,
                Character {
                    id,
                    name: name.to_string(),
                    gm,
                },
            );
        }
        Self { characters }
    }
}

impl CharacterDirectory for Roster {
    fn get_by_id(&self, _ctx: &TenantContext, character_id: u32) -> Result<Character, BuddyError> {
        self.characters
            .get(&character_id)
            .cloned()
            .ok_or(BuddyError::TargetNotFound(character_id))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InviteCall {
    Create { actor_id: u32, world_id: u8, target_id: u32 },
    Reject { actor_id: u32, world_id: u8, originator_id: u32 },
}

#[derive(Default)]
pub struct RecordingInvites {
    calls: Mutex<Vec<InviteCall>>,
}

impl RecordingInvites {
    pub fn calls(&self) -> Vec<InviteCall> {
        self.calls.lock().unwrap().clone()
    }
}

impl InviteSubsystem for RecordingInvites {
    fn create(&self, _ctx: &TenantContext, actor_id: u32, world_id: u8, target_id: u32) -> Result<(), BuddyError> {
        self.calls.lock().unwrap().push(InviteCall::Create {
            actor_id,
            world_id,
            target_id,
        });
        Ok(())
    }

    fn reject(&self, _ctx: &TenantContext, actor_id: u32, world_id: u8, originator_id: u32) -> Result<(), BuddyError> {
        self.calls.lock().unwrap().push(InviteCall::Reject {
            actor_id,
            world_id,
            originator_id,
        });
        Ok(())
    }
}

pub struct Harness {
    pub processor: Arc<BuddyListProcessor>,
    pub invites: Arc<RecordingInvites>,
    pub bus: Arc<EventBus>,
    pub ctx: TenantContext,
    events: broadcast::Receiver<Envelope>,
}

impl Harness {
    pub fn new() -> Self {
        let bus = Arc::new(EventBus::new());
        let invites = Arc::new(RecordingInvites::default());
        let processor = Arc::new(BuddyListProcessor::new(
            BuddyDb::open_in_memory().unwrap(),
            Arc::new(Roster::new()),
            invites.clone(),
            bus.clone(),
            STATUS_TOPIC,
        ));
        let events = bus.subscribe();

        Self {
            processor,
            invites,
            bus,
            ctx: TenantContext::new(Uuid::new_v4()),
            events,
        }
    }

    /// Create a list for each character
    pub fn lists(&self, characters: &[u32], capacity: u8) {
        for id in characters {
            self.processor.create_list(&self.ctx, *id, capacity).unwrap();
        }
    }

    /// Request and accept, leaving a confirmed edge on both lists
    pub fn befriend(&self, originator: u32, target: u32) {
        self.processor
            .request_add_buddy(&self.ctx, originator, WORLD, target, "Friends")
            .unwrap();
        self.processor.accept_invite(&self.ctx, target, WORLD, originator).unwrap();
    }

    /// Status events emitted since the last drain
    pub fn drain(&mut self) -> Vec<StatusEvent> {
        let mut events = Vec::new();
        while let Ok(envelope) = self.events.try_recv() {
            assert_eq!(envelope.topic, STATUS_TOPIC);
            assert_eq!(envelope.tenant_id, self.ctx.tenant_id());
            let event: StatusEvent = envelope.decode().unwrap();
            assert_eq!(envelope.key, event.character_id.to_string());
            events.push(event);
        }
        events
    }

    pub fn buddy_ids(&self, character_id: u32) -> Vec<u32> {
        self.processor
            .get_buddies(&self.ctx, character_id)
            .unwrap()
            .iter()
            .map(|b| b.character_id)
            .collect()
    }
}

/// Error kind carried by an `ERROR` event
pub fn error_kind(event: &StatusEvent) -> Option<buddy_lists::ErrorKind> {
    match &event.body {
        StatusEventBody::Error(body) => Some(body.error),
        _ => None,
    }
}
