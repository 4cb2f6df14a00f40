//! Buddy list status events and their delivery
//!
//! - [`StatusEvent`]: the notification payload published on the status topic
//! - [`Envelope`]: a serialized message addressed to a topic, keyed and tenant-tagged
//! - [`MessageTransport`]: where envelopes go (NATS in the daemon, [`EventBus`] in-process)
//! - [`EventBuffer`]: stages events during a transaction and flushes them afterwards

use bytes::Bytes;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::{debug, trace, warn};
use uuid::Uuid;

use crate::db::TenantContext;
use crate::error::BuddyError;

// ============================================================================
// Status events
// ============================================================================

/// Error reported to the initiating character
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    #[serde(rename = "BUDDY_LIST_FULL")]
    ListFull,
    #[serde(rename = "OTHER_BUDDY_LIST_FULL")]
    OtherListFull,
    AlreadyBuddy,
    CannotBuddyGm,
    CharacterNotFound,
    InvalidCapacity,
    CapacityTooSmall,
    UnknownError,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuddyAddedBody {
    pub character_id: u32,
    pub group: String,
    pub character_name: String,
    pub channel_id: i8,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuddyRemovedBody {
    pub character_id: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuddyUpdatedBody {
    pub character_id: u32,
    pub group: String,
    pub character_name: String,
    pub channel_id: i8,
    pub in_shop: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuddyChannelChangeBody {
    pub character_id: u32,
    pub channel_id: i8,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CapacityChangeBody {
    pub capacity: u8,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorBody {
    pub error: ErrorKind,
}

/// Typed status event body, serialized as `"type"` + `"body"`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "body", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StatusEventBody {
    BuddyAdded(BuddyAddedBody),
    BuddyRemoved(BuddyRemovedBody),
    BuddyUpdated(BuddyUpdatedBody),
    BuddyChannelChange(BuddyChannelChangeBody),
    CapacityChange(CapacityChangeBody),
    Error(ErrorBody),
}

/// Notification addressed to `character_id`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusEvent {
    pub world_id: u8,
    pub character_id: u32,
    #[serde(flatten)]
    pub body: StatusEventBody,
}

impl StatusEvent {
    pub fn buddy_added(
        world_id: u8,
        character_id: u32,
        buddy_id: u32,
        group: impl Into<String>,
        character_name: impl Into<String>,
        channel_id: i8,
    ) -> Self {
        Self {
            world_id,
            character_id,
            body: StatusEventBody::BuddyAdded(BuddyAddedBody {
                character_id: buddy_id,
                group: group.into(),
                character_name: character_name.into(),
                channel_id,
            }),
        }
    }

    pub fn buddy_removed(world_id: u8, character_id: u32, buddy_id: u32) -> Self {
        Self {
            world_id,
            character_id,
            body: StatusEventBody::BuddyRemoved(BuddyRemovedBody { character_id: buddy_id }),
        }
    }

    pub fn buddy_updated(
        world_id: u8,
        character_id: u32,
        buddy_id: u32,
        group: impl Into<String>,
        character_name: impl Into<String>,
        channel_id: i8,
        in_shop: bool,
    ) -> Self {
        Self {
            world_id,
            character_id,
            body: StatusEventBody::BuddyUpdated(BuddyUpdatedBody {
                character_id: buddy_id,
                group: group.into(),
                character_name: character_name.into(),
                channel_id,
                in_shop,
            }),
        }
    }

    pub fn buddy_channel_change(world_id: u8, character_id: u32, buddy_id: u32, channel_id: i8) -> Self {
        Self {
            world_id,
            character_id,
            body: StatusEventBody::BuddyChannelChange(BuddyChannelChangeBody {
                character_id: buddy_id,
                channel_id,
            }),
        }
    }

    pub fn capacity_change(world_id: u8, character_id: u32, capacity: u8) -> Self {
        Self {
            world_id,
            character_id,
            body: StatusEventBody::CapacityChange(CapacityChangeBody { capacity }),
        }
    }

    pub fn error(world_id: u8, character_id: u32, error: ErrorKind) -> Self {
        Self {
            world_id,
            character_id,
            body: StatusEventBody::Error(ErrorBody { error }),
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self.body, StatusEventBody::Error(_))
    }
}

// ============================================================================
// Transport
// ============================================================================

/// A serialized message bound for a topic
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    pub topic: String,
    /// Partition/ordering key, the addressed character id
    pub key: String,
    pub tenant_id: Uuid,
    /// JSON payload
    pub payload: Bytes,
}

impl Envelope {
    /// Serialize `value` as JSON into an envelope
    pub fn json<T: Serialize>(
        topic: impl Into<String>,
        key: impl Into<String>,
        ctx: &TenantContext,
        value: &T,
    ) -> Result<Self, BuddyError> {
        Ok(Self {
            topic: topic.into(),
            key: key.into(),
            tenant_id: ctx.tenant_id(),
            payload: Bytes::from(serde_json::to_vec(value)?),
        })
    }

    /// Decode the JSON payload
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, BuddyError> {
        Ok(serde_json::from_slice(&self.payload)?)
    }
}

/// Outbound message sink
///
/// `emit` must not block on the network; implementations hand the envelope
/// to an async publisher or an in-process channel.
pub trait MessageTransport: Send + Sync {
    fn emit(&self, envelope: Envelope) -> Result<(), BuddyError>;
}

/// In-process transport broadcasting envelopes to subscribers
pub struct EventBus {
    sender: broadcast::Sender<Envelope>,
}

impl EventBus {
    /// Create a new event bus with default capacity
    pub fn new() -> Self {
        Self::with_capacity(1024)
    }

    /// Create a new event bus with specified capacity
    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Subscribe to envelopes emitted after this call
    pub fn subscribe(&self) -> broadcast::Receiver<Envelope> {
        self.sender.subscribe()
    }

    /// Get the number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl MessageTransport for EventBus {
    fn emit(&self, envelope: Envelope) -> Result<(), BuddyError> {
        trace!(topic = %envelope.topic, key = %envelope.key, "Emitting envelope");
        // No subscribers is not an error
        let _ = self.sender.send(envelope);
        Ok(())
    }
}

// ============================================================================
// Buffer
// ============================================================================

/// Events staged by one operation
///
/// Nothing reaches the transport until the owning transaction finishes:
/// [`EventBuffer::flush`] after commit, [`EventBuffer::flush_errors`] after
/// rollback.
#[derive(Debug)]
pub struct EventBuffer {
    ctx: TenantContext,
    staged: Vec<(String, StatusEvent)>,
}

impl EventBuffer {
    pub fn new(ctx: &TenantContext) -> Self {
        Self {
            ctx: ctx.clone(),
            staged: Vec::new(),
        }
    }

    /// Stage an event for `topic`
    pub fn put(&mut self, topic: &str, event: StatusEvent) {
        self.staged.push((topic.to_string(), event));
    }

    /// Emit every staged event. Returns the number emitted.
    pub fn flush(self, transport: &dyn MessageTransport) -> Result<usize, BuddyError> {
        let ctx = self.ctx;
        Self::emit_all(&ctx, self.staged, transport)
    }

    /// Emit only staged error notifications, dropping everything else.
    pub fn flush_errors(self, transport: &dyn MessageTransport) -> Result<usize, BuddyError> {
        let ctx = self.ctx;
        let dropped = self.staged.iter().filter(|(_, e)| !e.is_error()).count();
        if dropped > 0 {
            debug!(dropped, "Discarding events staged by rolled back transaction");
        }
        let errors = self.staged.into_iter().filter(|(_, e)| e.is_error()).collect();
        Self::emit_all(&ctx, errors, transport)
    }

    /// Serialize every event, then hand the envelopes to the transport in
    /// order.
    ///
    /// Nothing is emitted unless every event serializes. Envelopes already
    /// handed over cannot be recalled, so a transport failure midway stops the
    /// flush with the earlier events delivered and the rest dropped.
    fn emit_all(
        ctx: &TenantContext,
        staged: Vec<(String, StatusEvent)>,
        transport: &dyn MessageTransport,
    ) -> Result<usize, BuddyError> {
        let envelopes = staged
            .into_iter()
            .map(|(topic, event)| Envelope::json(topic, event.character_id.to_string(), ctx, &event))
            .collect::<Result<Vec<_>, _>>()?;

        let total = envelopes.len();
        for (emitted, envelope) in envelopes.into_iter().enumerate() {
            let key = envelope.key.clone();
            if let Err(e) = transport.emit(envelope) {
                warn!(key = %key, emitted, dropped = total - emitted, error = %e, "Failed to emit status events");
                return Err(e);
            }
        }
        Ok(total)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tokio::time::{timeout, Duration};

    const TOPIC: &str = "EVENT_TOPIC_BUDDY_LIST_STATUS";

    #[test]
    fn test_status_event_wire_format() {
        let event = StatusEvent::buddy_added(0, 12345, 67890, "Friends", "Bob", -1);
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(
            value,
            json!({
                "worldId": 0,
                "characterId": 12345,
                "type": "BUDDY_ADDED",
                "body": {
                    "characterId": 67890,
                    "group": "Friends",
                    "characterName": "Bob",
                    "channelId": -1
                }
            })
        );

        let back: StatusEvent = serde_json::from_value(value).unwrap();
        assert_eq!(back, event);
    }

    #[test]
    fn test_error_kind_names() {
        let cases = [
            (ErrorKind::ListFull, "BUDDY_LIST_FULL"),
            (ErrorKind::OtherListFull, "OTHER_BUDDY_LIST_FULL"),
            (ErrorKind::AlreadyBuddy, "ALREADY_BUDDY"),
            (ErrorKind::CannotBuddyGm, "CANNOT_BUDDY_GM"),
            (ErrorKind::CharacterNotFound, "CHARACTER_NOT_FOUND"),
            (ErrorKind::InvalidCapacity, "INVALID_CAPACITY"),
            (ErrorKind::CapacityTooSmall, "CAPACITY_TOO_SMALL"),
            (ErrorKind::UnknownError, "UNKNOWN_ERROR"),
        ];
        for (kind, name) in cases {
            assert_eq!(serde_json::to_value(kind).unwrap(), json!(name));
        }

        let event = StatusEvent::error(1, 5, ErrorKind::ListFull);
        assert_eq!(
            serde_json::to_value(&event).unwrap(),
            json!({"worldId": 1, "characterId": 5, "type": "ERROR", "body": {"error": "BUDDY_LIST_FULL"}})
        );
    }

    #[test]
    fn test_capacity_change_type_name() {
        let value = serde_json::to_value(StatusEvent::capacity_change(0, 1, 50)).unwrap();
        assert_eq!(value["type"], "CAPACITY_CHANGE");
        assert_eq!(value["body"]["capacity"], 50);
    }

    #[tokio::test]
    async fn test_event_bus_emit_receive() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe();
        let ctx = TenantContext::new(Uuid::new_v4());

        let envelope = Envelope::json(TOPIC, "1", &ctx, &StatusEvent::buddy_removed(0, 1, 2)).unwrap();
        bus.emit(envelope.clone()).unwrap();

        let received = timeout(Duration::from_millis(100), rx.recv()).await.unwrap().unwrap();
        assert_eq!(received, envelope);
        assert_eq!(received.tenant_id, ctx.tenant_id());
    }

    #[test]
    fn test_event_bus_without_subscribers() {
        let bus = EventBus::default();
        assert_eq!(bus.subscriber_count(), 0);
        let ctx = TenantContext::new(Uuid::new_v4());
        let envelope = Envelope::json(TOPIC, "1", &ctx, &StatusEvent::buddy_removed(0, 1, 2)).unwrap();
        assert!(bus.emit(envelope).is_ok());
    }

    #[test]
    fn test_buffer_flush_preserves_order() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe();
        let ctx = TenantContext::new(Uuid::new_v4());

        let mut buffer = EventBuffer::new(&ctx);
        buffer.put(TOPIC, StatusEvent::buddy_removed(0, 1, 2));
        buffer.put(TOPIC, StatusEvent::buddy_channel_change(0, 2, 1, -1));
        assert_eq!(buffer.flush(&bus).unwrap(), 2);

        let first: StatusEvent = rx.try_recv().unwrap().decode().unwrap();
        let second = rx.try_recv().unwrap();
        assert_eq!(first, StatusEvent::buddy_removed(0, 1, 2));
        assert_eq!(second.key, "2");
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_buffer_flush_errors_keeps_only_errors() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe();
        let ctx = TenantContext::new(Uuid::new_v4());

        let mut buffer = EventBuffer::new(&ctx);
        buffer.put(TOPIC, StatusEvent::buddy_added(0, 1, 2, "g", "Two", -1));
        buffer.put(TOPIC, StatusEvent::error(0, 1, ErrorKind::UnknownError));
        assert_eq!(buffer.flush_errors(&bus).unwrap(), 1);

        let event: StatusEvent = rx.try_recv().unwrap().decode().unwrap();
        assert!(event.is_error());
        assert!(rx.try_recv().is_err());
    }

    /// Accepts a fixed number of envelopes, then fails
    struct FlakyTransport {
        accepted: std::sync::Mutex<Vec<Envelope>>,
        limit: usize,
    }

    impl MessageTransport for FlakyTransport {
        fn emit(&self, envelope: Envelope) -> Result<(), BuddyError> {
            let mut accepted = self.accepted.lock().unwrap();
            if accepted.len() >= self.limit {
                return Err(BuddyError::Transport("broker unavailable".into()));
            }
            accepted.push(envelope);
            Ok(())
        }
    }

    #[test]
    fn test_buffer_flush_stops_at_transport_failure() {
        let transport = FlakyTransport {
            accepted: std::sync::Mutex::new(Vec::new()),
            limit: 1,
        };
        let ctx = TenantContext::new(Uuid::new_v4());

        let mut buffer = EventBuffer::new(&ctx);
        buffer.put(TOPIC, StatusEvent::buddy_removed(0, 1, 2));
        buffer.put(TOPIC, StatusEvent::buddy_channel_change(0, 2, 1, -1));
        buffer.put(TOPIC, StatusEvent::buddy_removed(0, 3, 2));

        assert!(matches!(buffer.flush(&transport), Err(BuddyError::Transport(_))));

        let accepted = transport.accepted.lock().unwrap();
        assert_eq!(accepted.len(), 1);
        assert_eq!(accepted[0].key, "1");
    }
}
