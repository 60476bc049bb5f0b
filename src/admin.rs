//! Operator surface
//!
//! Read/administrative operations for whatever command front end sits on
//! top: backing-store connection status, the managed-instance listing and
//! an immediate reconciliation pass. All real state lives in the registry
//! and the periodic services.

use serde::Serialize;
use std::sync::Arc;
use tracing::info;

use crate::directory::EndpointDirectory;
use crate::fleet::FleetRegistry;
use crate::nats::NatsClient;
use crate::reconcile::{ReconcileReport, Reconciler};

/// Connection and fleet overview
#[derive(Debug, Clone, Serialize)]
pub struct FleetStatus {
    pub transport_connected: bool,
    pub directory_connected: bool,
    pub managed: usize,
    pub ready: usize,
}

/// One row of the managed-instance listing
#[derive(Debug, Clone, Serialize)]
pub struct InstanceSummary {
    pub display_name: String,
    pub game_type: String,
    pub address: String,
    pub state: String,
    pub players_online: u32,
    pub registered_at: chrono::DateTime<chrono::Utc>,
    pub age_secs: u64,
}

/// Handle the operator command front end calls into
pub struct AdminHandle {
    registry: Arc<FleetRegistry>,
    reconciler: Arc<Reconciler>,
    nats: Option<NatsClient>,
    directory: Option<Arc<dyn EndpointDirectory>>,
}

impl AdminHandle {
    pub fn new(
        registry: Arc<FleetRegistry>,
        reconciler: Arc<Reconciler>,
        nats: Option<NatsClient>,
        directory: Option<Arc<dyn EndpointDirectory>>,
    ) -> Self {
        Self {
            registry,
            reconciler,
            nats,
            directory,
        }
    }

    /// Connection status of the two backing stores plus fleet counts
    pub async fn status(&self) -> FleetStatus {
        let transport_connected = self
            .nats
            .as_ref()
            .map(|n| n.is_connected())
            .unwrap_or(false);

        let directory_connected = match &self.directory {
            Some(directory) => directory.ping().await,
            None => false,
        };

        let snapshot = self.registry.snapshot();
        let ready = snapshot.iter().filter(|i| i.is_ready()).count();

        FleetStatus {
            transport_connected,
            directory_connected,
            managed: snapshot.len(),
            ready,
        }
    }

    /// Managed instances, sorted by name
    pub fn list_instances(&self) -> Vec<InstanceSummary> {
        let mut rows: Vec<InstanceSummary> = self
            .registry
            .snapshot()
            .into_iter()
            .map(|i| InstanceSummary {
                display_name: i.display_name.clone(),
                game_type: i.game_type.clone(),
                address: i.target.to_string(),
                state: i.state.to_string(),
                players_online: i.players_online,
                registered_at: i.registered_at,
                age_secs: i.age_secs(),
            })
            .collect();

        rows.sort_by(|a, b| a.display_name.cmp(&b.display_name));
        rows
    }

    /// Run a reconciliation sweep right now instead of waiting for the
    /// next scheduled one
    pub async fn force_reconcile(&self) -> ReconcileReport {
        info!("Manual reconciliation requested");
        self.reconciler.reconcile_once().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directory::MemoryDirectory;
    use crate::fleet::RegistryConfig;
    use crate::health::testing::ScriptedProber;
    use crate::health::Prober;
    use crate::notify::WebhookNotifier;
    use crate::reconcile::ReconcileConfig;
    use crate::routing::{ProxyRoutingTable, RoutingTable};

    fn make_handle(directory: Option<Arc<dyn EndpointDirectory>>) -> (AdminHandle, Arc<FleetRegistry>) {
        let registry = Arc::new(FleetRegistry::new(
            RegistryConfig {
                burst_attempts: 0,
                ..RegistryConfig::default()
            },
            Arc::new(ProxyRoutingTable::new()) as Arc<dyn RoutingTable>,
            Arc::new(ScriptedProber::new()) as Arc<dyn Prober>,
            Arc::new(WebhookNotifier::disabled()),
        ));

        let reconciler = Arc::new(Reconciler::new(
            ReconcileConfig::default(),
            registry.clone(),
            directory.clone(),
        ));

        (
            AdminHandle::new(registry.clone(), reconciler, None, directory),
            registry,
        )
    }

    #[tokio::test]
    async fn test_status_counts_ready_instances() {
        let (handle, registry) = make_handle(Some(
            Arc::new(MemoryDirectory::new()) as Arc<dyn EndpointDirectory>
        ));

        registry.register("1", "bedwars", "10.0.0.1", 25565);
        registry.register("2", "bedwars", "10.0.0.2", 25566);
        registry.mark_ready("bedwars-1");

        let status = handle.status().await;
        assert_eq!(status.managed, 2);
        assert_eq!(status.ready, 1);
        assert!(!status.transport_connected);
        assert!(status.directory_connected);
    }

    #[tokio::test]
    async fn test_status_without_backends() {
        let (handle, _) = make_handle(None);

        let status = handle.status().await;
        assert!(!status.transport_connected);
        assert!(!status.directory_connected);
    }

    #[tokio::test]
    async fn test_list_is_sorted_and_described() {
        let (handle, registry) = make_handle(None);

        registry.register("2", "skywars", "10.0.0.2", 25566);
        registry.register("1", "bedwars", "10.0.0.1", 25565);
        registry.mark_ready("bedwars-1");
        registry.record_players("bedwars-1", 5);

        let rows = handle.list_instances();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].display_name, "bedwars-1");
        assert_eq!(rows[0].state, "ready");
        assert_eq!(rows[0].players_online, 5);
        assert_eq!(rows[0].address, "10.0.0.1:25565");
        assert_eq!(rows[1].display_name, "skywars-2");
        assert_eq!(rows[1].state, "registering");
    }

    #[tokio::test]
    async fn test_force_reconcile_runs_sweep() {
        let (handle, registry) = make_handle(Some(
            Arc::new(MemoryDirectory::new()) as Arc<dyn EndpointDirectory>
        ));
        registry.register("1", "bedwars", "10.0.0.1", 25565);

        let report = handle.force_reconcile().await;
        assert!(!report.skipped);
        assert_eq!(report.managed, 1);
        assert_eq!(report.unlisted_managed, 1);
    }
}
