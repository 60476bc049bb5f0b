//! NATS client wrapper
//!
//! Connection management plus the JetStream work-queue plumbing used for
//! provisioning events. Event consumers are created with an ack pending
//! window of one so at most one registration is in flight per topic and
//! messages are acknowledged only after their side effects complete.

use async_nats::jetstream::{
    self,
    consumer::{pull, AckPolicy, PullConsumer},
    stream::RetentionPolicy,
};
use async_nats::{connection::State, Client, ConnectOptions};
use async_trait::async_trait;
use bytes::Bytes;
use std::time::Duration;
use tracing::info;

use super::messages::EVENT_STREAM;
use crate::config::NatsArgs;
use crate::types::{FleetError, Result};

/// Default ping interval for keep-alive
const DEFAULT_PING_INTERVAL: Duration = Duration::from_secs(120);

/// Outbound publish capability, kept narrow so collaborators can be tested
/// without a broker
#[async_trait]
pub trait EventSink: Send + Sync {
    async fn publish(&self, subject: &str, payload: Bytes) -> Result<()>;

    /// Whether a publish is currently likely to be accepted
    fn is_writable(&self) -> bool;
}

/// NATS client wrapper with JetStream support
#[derive(Clone)]
pub struct NatsClient {
    client: Client,
    jetstream: jetstream::Context,
    name: String,
}

impl NatsClient {
    /// Connect to NATS. Fails fast when the server is unreachable so the
    /// caller can decide to run degraded; reconnection is automatic after
    /// the first successful connect.
    pub async fn new(args: &NatsArgs, name: &str) -> Result<Self> {
        info!("Connecting to NATS at {}", args.nats_url);

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
            .map_err(|e| FleetError::Nats(format!("Failed to connect: {}", e)))?;

        info!("Connected to NATS at {}", args.nats_url);

        let jetstream = jetstream::new(client.clone());

        Ok(Self {
            client,
            jetstream,
            name: name.to_string(),
        })
    }

    /// Get the underlying NATS client
    pub fn inner(&self) -> &Client {
        &self.client
    }

    pub fn is_connected(&self) -> bool {
        self.client.connection_state() == State::Connected
    }

    /// Create (or look up) the durable work-queue consumer for one event
    /// topic. `max_ack_pending = 1` gives store-and-forward delivery: the
    /// next event is only handed over once the previous one is acked.
    pub async fn event_consumer(
        &self,
        consumer_name: &str,
        filter_subject: &str,
    ) -> Result<PullConsumer> {
        let stream = self
            .jetstream
            .get_or_create_stream(jetstream::stream::Config {
                name: EVENT_STREAM.to_string(),
                subjects: vec![format!("{}.>", super::messages::EVENT_SUBJECT_PREFIX)],
                retention: RetentionPolicy::WorkQueue,
                ..Default::default()
            })
            .await
            .map_err(|e| FleetError::Nats(format!("Stream setup failed: {}", e)))?;

        stream
            .get_or_create_consumer(
                consumer_name,
                pull::Config {
                    durable_name: Some(consumer_name.to_string()),
                    filter_subject: filter_subject.to_string(),
                    ack_policy: AckPolicy::Explicit,
                    max_ack_pending: 1,
                    ..Default::default()
                },
            )
            .await
            .map_err(|e| FleetError::Nats(format!("Consumer setup failed: {}", e)))
    }

    /// Flush pending messages
    pub async fn flush(&self) -> Result<()> {
        self.client
            .flush()
            .await
            .map_err(|e| FleetError::Nats(format!("Flush failed: {}", e)))
    }

    /// Get the client name
    pub fn name(&self) -> &str {
        &self.name
    }
}

#[async_trait]
impl EventSink for NatsClient {
    async fn publish(&self, subject: &str, payload: Bytes) -> Result<()> {
        self.client
            .publish(subject.to_string(), payload)
            .await
            .map_err(|e| FleetError::Nats(format!("Publish failed: {}", e)))
    }

    fn is_writable(&self) -> bool {
        self.is_connected()
    }
}


#[cfg(test)]
mod tests {
    // Connection-level behavior needs a running NATS server and lives in
    // deployment smoke tests; the sink contract is covered via RecordingSink
    // in the monitor and balancer tests.
}
