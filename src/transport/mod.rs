//! Message broker integration

pub mod nats;

pub use nats::NatsTransport;
