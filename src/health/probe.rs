//! Liveness probing for managed instances
//!
//! A probe is an out-of-band status check against an instance's network
//! address. The transport owns its own timeout; callers treat any `Err`
//! as a failed probe and apply the state-machine rules on top.

use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;

use crate::routing::RouteTarget;
use crate::types::{FleetError, Result};

/// Successful probe response
#[derive(Debug, Clone, Deserialize)]
pub struct ProbeReply {
    /// Players currently connected
    #[serde(default)]
    pub players_online: u32,
    /// Configured player capacity
    #[serde(default)]
    pub players_max: u32,
}

/// Issues status probes against instance addresses
#[async_trait]
pub trait Prober: Send + Sync {
    async fn probe(&self, target: &RouteTarget) -> Result<ProbeReply>;
}

/// Probes the status endpoint each game server exposes on its game address
pub struct StatusProber {
    client: reqwest::Client,
}

impl StatusProber {
    /// Create a prober whose HTTP client owns the probe timeout
    pub fn new(timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .connect_timeout(timeout)
            .timeout(timeout)
            .build()
            .unwrap_or_default();

        Self { client }
    }
}

#[async_trait]
impl Prober for StatusProber {
    async fn probe(&self, target: &RouteTarget) -> Result<ProbeReply> {
        let url = format!("http://{}:{}/status", target.host, target.port);

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| FleetError::Probe(format!("{} unreachable: {}", target, e)))?;

        if !response.status().is_success() {
            return Err(FleetError::Probe(format!(
                "{} returned status {}",
                target,
                response.status()
            )));
        }

        response
            .json::<ProbeReply>()
            .await
            .map_err(|e| FleetError::Probe(format!("{} bad status payload: {}", target, e)))
    }
}


#[cfg(test)]
mod tests {
    use super::testing::{ProbeOutcome, ScriptedProber};
    use super::*;

    #[tokio::test]
    async fn test_scripted_prober_drains_then_repeats() {
        let prober = ScriptedProber::new();
        let target = RouteTarget::new("10.0.0.5", 25565);
        prober.script(
            &target,
            vec![ProbeOutcome::Fail, ProbeOutcome::Ok(3)],
        );

        assert!(prober.probe(&target).await.is_err());
        assert_eq!(prober.probe(&target).await.unwrap().players_online, 3);
        // Last outcome repeats
        assert_eq!(prober.probe(&target).await.unwrap().players_online, 3);
        assert_eq!(prober.call_count(), 3);
    }

    #[tokio::test]
    async fn test_unscripted_target_fails() {
        let prober = ScriptedProber::new();
        let target = RouteTarget::new("10.0.0.9", 25565);
        assert!(prober.probe(&target).await.is_err());
    }
}
