//! NATS messaging

pub mod client;
pub mod triggers;

pub use client::NatsClient;
pub use triggers::{spawn_trigger_subscriber, TRIGGER_SUBJECT_PREFIX};
