//! NATS transport
//!
//! Outbound envelopes are handed to a background publisher over an unbounded
//! channel, so the synchronous processor never waits on the network. Inbound
//! messages are read from one subscription per consumed topic and dispatched
//! in arrival order.
//!
//! The tenant travels in the `TENANT_ID` header, the partition key in
//! `MESSAGE_KEY`.

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use async_nats::{Client, ConnectOptions, HeaderMap, HeaderValue};
use futures_util::stream::{self, StreamExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::db::TenantContext;
use crate::error::BuddyError;
use crate::messages::Dispatcher;
use crate::services::character::TENANT_HEADER;
use crate::services::events::{Envelope, MessageTransport};

/// Header carrying the envelope key
pub const KEY_HEADER: &str = "MESSAGE_KEY";

/// Default ping interval for keep-alive
const DEFAULT_PING_INTERVAL: Duration = Duration::from_secs(120);

/// Connect to NATS
pub async fn connect(url: &str, name: &str) -> Result<Client, BuddyError> {
    info!("Connecting to NATS at {}", url);

    let client = ConnectOptions::new()
        .name(name)
        .ping_interval(DEFAULT_PING_INTERVAL)
        .connection_timeout(Duration::from_secs(5))
        .connect(url)
        .await
        .map_err(|e| BuddyError::Transport(format!("Failed to connect: {}", e)))?;

    info!("Connected to NATS at {}", url);
    Ok(client)
}

fn headers_for(envelope: &Envelope) -> Result<HeaderMap, BuddyError> {
    let mut headers = HeaderMap::new();
    headers.insert(
        TENANT_HEADER,
        HeaderValue::from_str(&envelope.tenant_id.to_string())
            .map_err(|e| BuddyError::Transport(format!("Invalid header: {}", e)))?,
    );
    headers.insert(
        KEY_HEADER,
        HeaderValue::from_str(&envelope.key).map_err(|e| BuddyError::Transport(format!("Invalid header: {}", e)))?,
    );
    Ok(headers)
}

/// Rebuild an envelope from a received message
///
/// Messages without a parseable tenant header are rejected.
pub fn envelope_from(message: async_nats::Message) -> Result<Envelope, BuddyError> {
    let headers = message.headers.as_ref();
    let tenant = headers
        .and_then(|h| h.get(TENANT_HEADER))
        .map(|v| v.as_str().to_string())
        .ok_or_else(|| BuddyError::Transport(format!("Message on {} has no tenant header", message.subject)))?;
    let ctx = TenantContext::parse(&tenant)?;
    let key = headers
        .and_then(|h| h.get(KEY_HEADER))
        .map(|v| v.as_str().to_string())
        .unwrap_or_default();

    Ok(Envelope {
        topic: message.subject.to_string(),
        key,
        tenant_id: ctx.tenant_id(),
        payload: message.payload,
    })
}

/// [`MessageTransport`] publishing to NATS from a background task
#[derive(Clone)]
pub struct NatsTransport {
    sender: mpsc::UnboundedSender<Envelope>,
}

impl NatsTransport {
    /// Start the publisher task
    ///
    /// The task ends, after flushing, once every clone of the transport is
    /// dropped.
    pub fn spawn(client: Client) -> (Self, JoinHandle<()>) {
        let (sender, mut receiver) = mpsc::unbounded_channel::<Envelope>();

        let handle = tokio::spawn(async move {
            while let Some(envelope) = receiver.recv().await {
                let headers = match headers_for(&envelope) {
                    Ok(headers) => headers,
                    Err(e) => {
                        warn!(topic = %envelope.topic, error = %e, "Dropping envelope");
                        continue;
                    }
                };
                if let Err(e) = client
                    .publish_with_headers(envelope.topic.clone(), headers, envelope.payload)
                    .await
                {
                    error!(topic = %envelope.topic, key = %envelope.key, error = %e, "Publish failed");
                }
            }
            if let Err(e) = client.flush().await {
                warn!(error = %e, "Final flush failed");
            }
            debug!("NATS publisher stopped");
        });

        (Self { sender }, handle)
    }
}

impl MessageTransport for NatsTransport {
    fn emit(&self, envelope: Envelope) -> Result<(), BuddyError> {
        self.sender
            .send(envelope)
            .map_err(|_| BuddyError::Transport("NATS publisher has stopped".into()))
    }
}

/// Subscribe to every inbound topic and dispatch messages until the
/// subscriptions close
pub async fn consume(client: Client, dispatcher: Arc<Dispatcher>) -> Result<(), BuddyError> {
    let mut subscriptions = Vec::new();
    for topic in dispatcher.topics().inbound() {
        let subscriber = client
            .subscribe(topic.to_string())
            .await
            .map_err(|e| BuddyError::Transport(format!("Subscribe to {} failed: {}", topic, e)))?;
        info!(topic = %topic, "Subscribed");
        subscriptions.push(subscriber);
    }

    let mut messages = stream::select_all(subscriptions);
    while let Some(message) = messages.next().await {
        let envelope = match envelope_from(message) {
            Ok(envelope) => envelope,
            Err(e) => {
                warn!(error = %e, "Discarding message");
                continue;
            }
        };

        let topic = envelope.topic.clone();
        match dispatcher.dispatch(envelope).await {
            Ok(_) => {}
            Err(e) if e.is_terminal() => debug!(topic = %topic, error = %e, "Message rejected"),
            Err(e) => warn!(topic = %topic, error = %e, "Message handling failed"),
        }
    }

    info!("NATS subscriptions closed");
    Ok(())
}
