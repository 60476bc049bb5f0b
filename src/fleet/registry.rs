//! Fleet registry: authoritative map of managed instances
//!
//! Owns the managed-instance map and every routing-table entry derived from
//! it. Registration is driven by provisioning events; the registry never
//! removes a routing entry it did not create itself.
//!
//! ## Thread safety
//!
//! Backed by DashMap so health-check callbacks, the reconciler and inbound
//! event handling can interleave without a cycle-wide lock.

use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::instance::{InstanceState, ManagedInstance};
use crate::health::Prober;
use crate::notify::WebhookNotifier;
use crate::routing::{RouteTarget, RoutingTable};

/// Default grace period after registration
const DEFAULT_GRACE_PERIOD: Duration = Duration::from_secs(30);

/// Registration probe burst: one attempt every 2s, 15 attempts (~30s)
const DEFAULT_BURST_INTERVAL: Duration = Duration::from_secs(2);
const DEFAULT_BURST_ATTEMPTS: u32 = 15;

/// Tuning for the registry and its registration probe burst
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    /// Routing-table name template, e.g. "{type}-{id}"
    pub name_template: String,
    /// Window after registration during which probe failures are tolerated
    pub grace_period: Duration,
    /// Delay between registration-burst probe attempts
    pub burst_interval: Duration,
    /// Maximum registration-burst probe attempts
    pub burst_attempts: u32,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            name_template: "{type}-{id}".to_string(),
            grace_period: DEFAULT_GRACE_PERIOD,
            burst_interval: DEFAULT_BURST_INTERVAL,
            burst_attempts: DEFAULT_BURST_ATTEMPTS,
        }
    }
}

/// Outcome of a registration attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegisterOutcome {
    /// Inserted into the routing table and managed map
    Registered(String),
    /// Name already present; first registration wins, this one is a no-op
    AlreadyRegistered(String),
}

/// Outcome of an unregistration attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnregisterOutcome {
    /// Removed from the routing table and managed map
    Removed,
    /// Present in the routing table but not created by this engine
    NotManaged,
    /// No routing entry under this name
    NotFound,
}

/// Authoritative registry of managed instances
pub struct FleetRegistry {
    config: RegistryConfig,
    table: Arc<dyn RoutingTable>,
    prober: Arc<dyn Prober>,
    notifier: Arc<WebhookNotifier>,
    /// display_name → instance; shared with registration-burst tasks
    instances: Arc<DashMap<String, ManagedInstance>>,
}

impl FleetRegistry {
    pub fn new(
        config: RegistryConfig,
        table: Arc<dyn RoutingTable>,
        prober: Arc<dyn Prober>,
        notifier: Arc<WebhookNotifier>,
    ) -> Self {
        Self {
            config,
            table,
            prober,
            notifier,
            instances: Arc::new(DashMap::new()),
        }
    }

    /// Render the routing-table name for an instance
    pub fn format_display_name(&self, game_type: &str, instance_id: &str) -> String {
        self.config
            .name_template
            .replace("{type}", game_type)
            .replace("{id}", instance_id)
    }

    /// Register an instance into the routing table and managed map.
    ///
    /// Duplicates are benign: if the name already has a routing entry the
    /// call logs and returns without touching anything. On success the
    /// instance starts in `Registering` and an aggressive probe burst is
    /// scheduled so it becomes routable as soon as it answers.
    pub fn register(
        &self,
        instance_id: &str,
        game_type: &str,
        host: &str,
        port: u16,
    ) -> RegisterOutcome {
        let name = self.format_display_name(game_type, instance_id);

        if self.table.contains(&name) {
            warn!(name = %name, "Instance already registered, keeping first registration");
            return RegisterOutcome::AlreadyRegistered(name);
        }

        let target = RouteTarget::new(host, port);
        let instance = ManagedInstance::new(instance_id, game_type, name.clone(), target.clone());

        self.table.put(&name, target.clone());
        self.instances.insert(name.clone(), instance);

        info!(
            name = %name,
            instance_id = %instance_id,
            game_type = %game_type,
            address = %target,
            managed = self.instances.len(),
            "Registered instance"
        );

        self.notifier
            .instance_registered(&name, instance_id, game_type, &target.to_string());

        self.spawn_ready_burst(name.clone());

        RegisterOutcome::Registered(name)
    }

    /// Aggressive post-registration probing, independent of the periodic
    /// health cycle, stopping the moment the instance is ready or gone.
    fn spawn_ready_burst(&self, name: String) {
        let instances = Arc::clone(&self.instances);
        let prober = Arc::clone(&self.prober);
        let notifier = Arc::clone(&self.notifier);
        let burst_interval = self.config.burst_interval;
        let burst_attempts = self.config.burst_attempts;

        tokio::spawn(async move {
            let start = tokio::time::Instant::now() + burst_interval;
            let mut ticks = tokio::time::interval_at(start, burst_interval);

            for attempt in 1..=burst_attempts {
                ticks.tick().await;

                let target = match instances.get(&name) {
                    Some(inst) if inst.is_ready() => return,
                    Some(inst) => inst.target.clone(),
                    // Unregistered while we were waiting
                    None => return,
                };

                if let Ok(reply) = prober.probe(&target).await {
                    if let Some(mut entry) = instances.get_mut(&name) {
                        entry.players_online = reply.players_online;
                    }
                    if promote_to_ready(&instances, &notifier, &name) {
                        info!(
                            name = %name,
                            attempt,
                            "Instance answered during registration burst"
                        );
                    }
                    return;
                }

                debug!(name = %name, attempt, "Registration burst probe unanswered");
            }
        });
    }

    /// Remove an instance, but only if this engine created its entry
    pub fn unregister(&self, name: &str) -> UnregisterOutcome {
        if !self.table.contains(name) {
            debug!(name = %name, "Unregister skipped, no routing entry");
            return UnregisterOutcome::NotFound;
        }

        if !self.instances.contains_key(name) {
            warn!(name = %name, "Unregister refused, entry not managed by this engine");
            return UnregisterOutcome::NotManaged;
        }

        self.table.remove(name);
        self.instances.remove(name);

        info!(name = %name, managed = self.instances.len(), "Removed instance");
        self.notifier.instance_removed(name);

        UnregisterOutcome::Removed
    }

    /// Idempotent transition to `Ready`. Returns true on the first call.
    pub fn mark_ready(&self, name: &str) -> bool {
        promote_to_ready(&self.instances, &self.notifier, name)
    }

    pub fn is_ready(&self, name: &str) -> bool {
        self.instances
            .get(name)
            .map(|i| i.is_ready())
            .unwrap_or(false)
    }

    pub fn is_managed(&self, name: &str) -> bool {
        self.instances.contains_key(name)
    }

    /// Whether probe failures are currently tolerated for this instance
    pub fn in_grace_period(&self, name: &str) -> bool {
        self.instances
            .get(name)
            .map(|i| i.in_grace_period(self.config.grace_period))
            .unwrap_or(false)
    }

    /// Seconds of grace remaining for an instance
    pub fn remaining_grace_secs(&self, name: &str) -> u64 {
        self.instances
            .get(name)
            .map(|i| i.remaining_grace_secs(self.config.grace_period))
            .unwrap_or(0)
    }

    /// Record the player count from a successful probe
    pub fn record_players(&self, name: &str, players: u32) {
        if let Some(mut entry) = self.instances.get_mut(name) {
            entry.players_online = players;
        }
    }

    pub fn players_online(&self, name: &str) -> Option<u32> {
        self.instances.get(name).map(|i| i.players_online)
    }

    /// Point-in-time snapshot of managed names, safe to iterate while the
    /// live map keeps changing
    pub fn managed_set(&self) -> Vec<String> {
        self.instances.iter().map(|e| e.key().clone()).collect()
    }

    /// Point-in-time snapshot of full instance records, for the operator
    /// surface
    pub fn snapshot(&self) -> Vec<ManagedInstance> {
        self.instances.iter().map(|e| e.value().clone()).collect()
    }

    pub fn get(&self, name: &str) -> Option<ManagedInstance> {
        self.instances.get(name).map(|e| e.value().clone())
    }

    pub fn managed_count(&self) -> usize {
        self.instances.len()
    }

    /// Drop all local state. Used when a managed routing entry disappears
    /// out from under us: external mutation means the whole local view may
    /// be stale, so it is cleared rather than repaired entry by entry.
    /// Routing entries are left alone; they are no longer known to be ours.
    pub fn invalidate_all(&self) {
        let dropped = self.instances.len();
        self.instances.clear();
        warn!(dropped, "Managed set invalidated after external routing-table change");
    }

    /// Handle to the routing table, for collaborators that need lookups
    pub fn table(&self) -> &Arc<dyn RoutingTable> {
        &self.table
    }

    /// Handle to the prober shared with the health monitor
    pub fn prober(&self) -> &Arc<dyn Prober> {
        &self.prober
    }

    pub fn grace_period(&self) -> Duration {
        self.config.grace_period
    }
}

/// Shared ready-promotion path for `mark_ready` and the registration burst
fn promote_to_ready(
    instances: &DashMap<String, ManagedInstance>,
    notifier: &WebhookNotifier,
    name: &str,
) -> bool {
    let Some(mut entry) = instances.get_mut(name) else {
        return false;
    };

    if entry.state == InstanceState::Ready {
        return false;
    }

    entry.state = InstanceState::Ready;
    drop(entry);

    info!(name = %name, "Instance is ready and accepting players");
    notifier.instance_ready(name);
    true
}
