//! Request/reply endpoint for the player-facing selection command
//!
//! The chat front end stays a thin formatter: it sends a `SelectRequest`
//! and renders whatever comes back. Selection itself (ready filtering,
//! strategy, auto-spawn) all happens in the balancer.

use futures_util::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use super::client::{EventSink, NatsClient};
use super::messages::{SelectRequest, SelectResponse};
use crate::balancer::LoadBalancer;

/// Delay before rebuilding a broken subscription
const RETRY_DELAY: Duration = Duration::from_secs(5);

/// Answers selection requests over the transport
pub struct SelectionService {
    nats: NatsClient,
    balancer: Arc<LoadBalancer>,
}

impl SelectionService {
    pub fn new(nats: NatsClient, balancer: Arc<LoadBalancer>) -> Self {
        Self { nats, balancer }
    }

    /// Spawn the request loop
    pub fn start(self: Arc<Self>) {
        tokio::spawn(async move {
            self.run().await;
        });
    }

    async fn run(&self) {
        loop {
            let mut subscription = match self.nats.inner().subscribe(SelectRequest::subject()).await
            {
                Ok(subscription) => subscription,
                Err(e) => {
                    warn!(error = %e, "Selection subscription failed, retrying");
                    tokio::time::sleep(RETRY_DELAY).await;
                    continue;
                }
            };

            info!(subject = SelectRequest::subject(), "Answering selection requests");

            while let Some(message) = subscription.next().await {
                let response = respond(&self.balancer, &message.payload).await;

                let Some(reply) = message.reply else {
                    continue;
                };

                match response.to_bytes() {
                    Ok(payload) => {
                        if let Err(e) = self.nats.publish(reply.as_str(), payload).await {
                            warn!(error = %e, "Failed to publish selection reply");
                        }
                    }
                    Err(e) => warn!(error = %e, "Failed to serialize selection reply"),
                }
            }

            tokio::time::sleep(RETRY_DELAY).await;
        }
    }
}

/// Build the reply for one selection request
pub(crate) async fn respond(balancer: &LoadBalancer, payload: &[u8]) -> SelectResponse {
    let not_found = |balancer: &LoadBalancer| SelectResponse {
        found: false,
        name: None,
        host: None,
        port: None,
        available_types: balancer.available_game_types(),
    };

    let request = match SelectRequest::from_bytes(payload) {
        Ok(request) => request,
        Err(e) => {
            warn!(error = %e, "Dropping malformed selection request");
            return not_found(balancer);
        }
    };

    let Some(game_type) = request.game_type else {
        // No argument: list what is available
        return not_found(balancer);
    };

    match balancer.select_instance(&game_type).await {
        Some(selection) => SelectResponse {
            found: true,
            name: Some(selection.display_name),
            host: Some(selection.target.host),
            port: Some(selection.target.port),
            available_types: Vec::new(),
        },
        // select_instance already fired the auto-spawn request
        None => not_found(balancer),
    }
}
