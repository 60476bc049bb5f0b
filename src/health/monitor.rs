//! Periodic health monitoring for managed instances
//!
//! Advances the instance state machine: a successful probe promotes a
//! registering instance to ready; a failed probe is tolerated inside the
//! grace period, gets one last chance right after it, and evicts
//! immediately once the instance was ready. Per-instance checks run as
//! their own tasks so slow probes never stall the cycle.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};

use crate::fleet::{FleetRegistry, InstanceState, ManagedInstance};
use crate::nats::messages::PlayerCountReport;
use crate::nats::EventSink;

/// Health monitor configuration
#[derive(Debug, Clone)]
pub struct HealthConfig {
    /// Interval between health-check cycles
    pub interval: Duration,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(30),
        }
    }
}

/// Periodic health-check service. Cheap to clone; clones share the running
/// flag, so one `stop()` ends the loop wherever it was started from.
#[derive(Clone)]
pub struct HealthMonitor {
    config: HealthConfig,
    registry: Arc<FleetRegistry>,
    /// Outbound channel for player-count reports; absent when the
    /// transport is down, in which case reports are skipped
    sink: Option<Arc<dyn EventSink>>,
    /// Originating proxy id stamped onto reports
    proxy_id: String,
    running: Arc<RwLock<bool>>,
}

impl HealthMonitor {
    pub fn new(
        config: HealthConfig,
        registry: Arc<FleetRegistry>,
        sink: Option<Arc<dyn EventSink>>,
        proxy_id: String,
    ) -> Self {
        Self {
            config,
            registry,
            sink,
            proxy_id,
            running: Arc::new(RwLock::new(false)),
        }
    }

    /// Start the periodic cycle loop
    pub async fn start(&self) {
        {
            let mut running = self.running.write().await;
            if *running {
                warn!("Health monitor already running");
                return;
            }
            *running = true;
        }

        info!(interval = ?self.config.interval, "Starting health monitor");

        let monitor = self.clone();
        tokio::spawn(async move {
            let start = tokio::time::Instant::now() + monitor.config.interval;
            let mut ticks = tokio::time::interval_at(start, monitor.config.interval);

            loop {
                ticks.tick().await;

                if !*monitor.running.read().await {
                    info!("Health monitor stopped");
                    break;
                }

                monitor.run_cycle().await;
            }
        });
    }

    /// Stop the cycle loop
    pub async fn stop(&self) {
        let mut running = self.running.write().await;
        *running = false;
        info!("Stopping health monitor");
    }

    /// One pass over a snapshot of the managed set. Each instance check is
    /// spawned fire-and-forget; the only synchronous decision is the
    /// external-removal check, which invalidates everything and ends the
    /// pass early.
    pub async fn run_cycle(&self) {
        let snapshot = self.registry.managed_set();
        if snapshot.is_empty() {
            return;
        }

        debug!(instances = snapshot.len(), "Health cycle starting");

        for name in snapshot {
            if !self.registry.table().contains(&name) {
                warn!(
                    name = %name,
                    "Managed routing entry removed externally, clearing local state"
                );
                self.registry.invalidate_all();
                break;
            }

            let monitor = self.clone();
            tokio::spawn(async move {
                monitor.check_instance(&name).await;
            });
        }
    }

    /// Apply the state-machine rules to a single instance
    async fn check_instance(&self, name: &str) {
        let Some(instance) = self.registry.get(name) else {
            return;
        };

        match instance.state {
            InstanceState::Ready => self.check_ready(name, &instance).await,
            InstanceState::Registering | InstanceState::Offline => {
                if self.registry.in_grace_period(name) {
                    self.check_in_grace(name, &instance).await;
                } else {
                    self.check_past_grace(name, &instance).await;
                }
            }
        }
    }

    /// Grace period: probe eagerly so the instance becomes routable the
    /// moment it answers; failures are tolerated
    async fn check_in_grace(&self, name: &str, instance: &ManagedInstance) {
        match self.registry.prober().probe(&instance.target).await {
            Ok(reply) => {
                self.registry.record_players(name, reply.players_online);
                self.registry.mark_ready(name);
                self.report_players(name, reply.players_online).await;
            }
            Err(_) => {
                debug!(
                    name = %name,
                    remaining_secs = self.registry.remaining_grace_secs(name),
                    "Not ready yet, still in grace period"
                );
            }
        }
    }

    /// Past grace and never answered: one last chance before eviction.
    /// This is the only path that removes an instance for failing to
    /// become ready.
    async fn check_past_grace(&self, name: &str, instance: &ManagedInstance) {
        match self.registry.prober().probe(&instance.target).await {
            Ok(reply) => {
                self.registry.record_players(name, reply.players_online);
                self.registry.mark_ready(name);
                info!(name = %name, "Instance answered just after its grace period");
                self.report_players(name, reply.players_online).await;
            }
            Err(e) => {
                warn!(
                    name = %name,
                    error = %e,
                    "Never became ready within grace period, evicting"
                );
                self.registry.unregister(name);
            }
        }
    }

    /// Steady state: a single failed probe evicts immediately
    async fn check_ready(&self, name: &str, instance: &ManagedInstance) {
        match self.registry.prober().probe(&instance.target).await {
            Ok(reply) => {
                self.registry.record_players(name, reply.players_online);
                debug!(
                    name = %name,
                    players = reply.players_online,
                    max = reply.players_max,
                    "Health check ok"
                );
                self.report_players(name, reply.players_online).await;
            }
            Err(e) => {
                warn!(name = %name, error = %e, "Ready instance went offline, evicting");
                self.registry.unregister(name);
            }
        }
    }

    /// Publish the observed player count for downstream scaling decisions.
    /// Best-effort: failures are logged, never escalated.
    async fn report_players(&self, name: &str, players: u32) {
        let Some(sink) = &self.sink else {
            return;
        };

        if !sink.is_writable() {
            return;
        }

        let Some(report) = PlayerCountReport::from_display_name(name, players, &self.proxy_id)
        else {
            debug!(name = %name, "Name has no type-id separator, skipping report");
            return;
        };

        let payload = match report.to_bytes() {
            Ok(p) => p,
            Err(e) => {
                error!(error = %e, "Failed to serialize player-count report");
                return;
            }
        };

        if let Err(e) = sink.publish(PlayerCountReport::subject(), payload).await {
            warn!(error = %e, "Failed to publish player-count report");
        }
    }
}
