//! NATS client wrapper
//!
//! Connection management with keep-alive and publish/request helpers. Used
//! for fire-and-forget outputs; the only producer today is the payment
//! intent emitter.

use async_nats::{Client, ConnectOptions};
use bytes::Bytes;
use std::time::Duration;
use tracing::info;

use crate::config::NatsArgs;
use crate::types::{LapidaryError, Result};

/// Default request timeout for RPC-style calls
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Default ping interval for keep-alive
const DEFAULT_PING_INTERVAL: Duration = Duration::from_secs(120);

/// NATS client wrapper
#[derive(Clone)]
pub struct NatsClient {
    client: Client,
    request_timeout: Duration,
}

impl NatsClient {
    /// Create a new NATS client
    pub async fn new(args: &NatsArgs, name: &str) -> Result<Self> {
        info!("Connecting to NATS at {}", args.nats_url);

        // Fail fast when NATS is down; reconnection still works after the
        // first successful connect.
        let mut options = ConnectOptions::new()
            .name(name)
            .ping_interval(DEFAULT_PING_INTERVAL)
            .connection_timeout(Duration::from_secs(5));

        if let (Some(user), Some(pass)) = (&args.nats_user, &args.nats_password) {
            options = options.user_and_password(user.clone(), pass.clone());
        }

        let client = options
            .connect(&args.nats_url)
            .await
            .map_err(|e| LapidaryError::Nats(format!("Failed to connect: {}", e)))?;

        info!("Connected to NATS at {}", args.nats_url);

        Ok(Self {
            client,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        })
    }

    /// Set the request timeout for RPC calls
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Get the underlying NATS client
    pub fn inner(&self) -> &Client {
        &self.client
    }

    /// Publish a message to a subject
    pub async fn publish(&self, subject: &str, payload: Bytes) -> Result<()> {
        self.client
            .publish(subject.to_string(), payload)
            .await
            .map_err(|e| LapidaryError::Nats(format!("Publish failed: {}", e)))
    }

    /// Request/response pattern with timeout
    pub async fn request(&self, subject: &str, payload: Bytes) -> Result<async_nats::Message> {
        tokio::time::timeout(
            self.request_timeout,
            self.client.request(subject.to_string(), payload),
        )
        .await
        .map_err(|_| LapidaryError::Nats(format!("Request to {} timed out", subject)))?
        .map_err(|e| LapidaryError::Nats(format!("Request failed: {}", e)))
    }
}
