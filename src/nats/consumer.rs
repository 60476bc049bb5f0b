//! Inbound provisioning-event consumption
//!
//! One durable work-queue consumer per topic; each message is acknowledged
//! only after its registration side effects are complete, so at most one
//! registration is in flight per topic and back-to-back announcements
//! cannot race each other. Malformed payloads are logged, dropped and
//! acked; a bad message must never wedge the queue or the process.

use futures_util::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use super::client::NatsClient;
use super::messages::{ServerEmptyEvent, ServerReadyEvent};
use crate::directory::EndpointDirectory;
use crate::fleet::FleetRegistry;
use crate::panel::ProvisioningPanel;

/// Default game port, also the base of the deterministic port fallback
const DEFAULT_GAME_PORT: u16 = 25565;

/// Delay before rebuilding a broken consumer
const RETRY_DELAY: Duration = Duration::from_secs(5);

/// Turns provisioning events into registry side effects.
///
/// Split from the transport loop so the event semantics can run (and be
/// exercised) without a broker connection.
pub struct EventHandler {
    registry: Arc<FleetRegistry>,
    panel: Option<Arc<dyn ProvisioningPanel>>,
    directory: Option<Arc<dyn EndpointDirectory>>,
    /// Bridge host substituted whenever an event or lookup leaves the host
    /// undecided; panel-reported hosts are never used
    default_host: String,
}

impl EventHandler {
    pub fn new(
        registry: Arc<FleetRegistry>,
        panel: Option<Arc<dyn ProvisioningPanel>>,
        directory: Option<Arc<dyn EndpointDirectory>>,
        default_host: String,
    ) -> Self {
        Self {
            registry,
            panel,
            directory,
            default_host,
        }
    }

    /// A provisioned instance announced it is up: resolve its address and
    /// register it
    pub async fn handle_server_ready(&self, payload: &[u8]) {
        let event = match ServerReadyEvent::from_bytes(payload) {
            Ok(event) => event,
            Err(e) => {
                warn!(error = %e, "Dropping malformed server_ready event");
                return;
            }
        };

        info!(
            server_id = %event.server_id,
            game_type = %event.game_type,
            "Processing server_ready event"
        );

        let (host, port) = self.resolve_address(&event).await;
        self.registry
            .register(&event.server_id, &event.game_type, &host, port);
    }

    /// An instance went empty: drop it if we manage it, otherwise this is
    /// a no-op
    pub async fn handle_server_empty(&self, payload: &[u8]) {
        let event = match ServerEmptyEvent::from_bytes(payload) {
            Ok(event) => event,
            Err(e) => {
                warn!(error = %e, "Dropping malformed server_empty event");
                return;
            }
        };

        let name = self
            .registry
            .format_display_name(&event.game_type, &event.server_id);

        info!(name = %name, "Processing server_empty event");
        self.registry.unregister(&name);
    }

    /// Resolution ladder for announcements without full connection info:
    /// event address → event port + default host → panel port + default
    /// host → directory record port + default host → deterministic port
    /// offset from the numeric instance id.
    async fn resolve_address(&self, event: &ServerReadyEvent) -> (String, u16) {
        if let (Some(ip), Some(port)) = (&event.ip, event.port) {
            return (ip.clone(), port);
        }

        if let Some(port) = event.port {
            return (self.default_host.clone(), port);
        }

        if let Some(panel) = &self.panel {
            if let Some(details) = panel.server_details(&event.server_id).await {
                // The panel reports the allocation's public side; only the
                // default host is reachable from the proxy network
                debug!(
                    server_id = %event.server_id,
                    panel_host = %details.ip,
                    port = details.port,
                    "Using panel port with the configured default host"
                );
                return (self.default_host.clone(), details.port);
            }
        }

        if let Some(directory) = &self.directory {
            match directory.record_for_instance(&event.server_id).await {
                Ok(Some(record)) => {
                    debug!(
                        server_id = %event.server_id,
                        port = record.port,
                        "Using directory record port with the configured default host"
                    );
                    return (self.default_host.clone(), record.port);
                }
                Ok(None) => {}
                Err(e) => {
                    error!(server_id = %event.server_id, error = %e, "Directory lookup failed");
                }
            }
        }

        let port = event
            .server_id
            .parse::<u32>()
            .ok()
            .map(|id| DEFAULT_GAME_PORT as u32 + id)
            .filter(|p| *p <= u16::MAX as u32)
            .map(|p| p as u16)
            .unwrap_or(DEFAULT_GAME_PORT);

        debug!(
            server_id = %event.server_id,
            port,
            "No address source available, using deterministic port offset"
        );

        (self.default_host.clone(), port)
    }
}

/// Pulls provisioning events off the work queues and feeds the handler
pub struct EventConsumer {
    nats: NatsClient,
    handler: Arc<EventHandler>,
}

impl EventConsumer {
    pub fn new(nats: NatsClient, handler: Arc<EventHandler>) -> Self {
        Self { nats, handler }
    }

    /// Spawn the two consumer loops
    pub fn start(self: Arc<Self>) {
        let ready = Arc::clone(&self);
        tokio::spawn(async move {
            ready
                .consume_loop("fleet-server-ready", ServerReadyEvent::subject(), true)
                .await;
        });

        let empty = Arc::clone(&self);
        tokio::spawn(async move {
            empty
                .consume_loop("fleet-server-empty", ServerEmptyEvent::subject(), false)
                .await;
        });
    }

    /// Pull messages from one topic forever, rebuilding the consumer after
    /// transport errors instead of giving up
    async fn consume_loop(&self, consumer_name: &str, subject: &str, is_ready_topic: bool) {
        loop {
            let consumer = match self.nats.event_consumer(consumer_name, subject).await {
                Ok(consumer) => consumer,
                Err(e) => {
                    warn!(subject = %subject, error = %e, "Consumer setup failed, retrying");
                    tokio::time::sleep(RETRY_DELAY).await;
                    continue;
                }
            };

            let mut messages = match consumer.messages().await {
                Ok(messages) => messages,
                Err(e) => {
                    warn!(subject = %subject, error = %e, "Message stream failed, retrying");
                    tokio::time::sleep(RETRY_DELAY).await;
                    continue;
                }
            };

            info!(subject = %subject, consumer = %consumer_name, "Consuming provisioning events");

            while let Some(message) = messages.next().await {
                let message = match message {
                    Ok(message) => message,
                    Err(e) => {
                        warn!(subject = %subject, error = %e, "Message delivery error, rebuilding consumer");
                        break;
                    }
                };

                // Side effects first, ack second: with an ack window of one
                // the next event is withheld until this one is fully done
                if is_ready_topic {
                    self.handler.handle_server_ready(&message.payload).await;
                } else {
                    self.handler.handle_server_empty(&message.payload).await;
                }

                if let Err(e) = message.ack().await {
                    warn!(subject = %subject, error = %e, "Failed to ack event");
                }
            }

            tokio::time::sleep(RETRY_DELAY).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::balancer::{LoadBalancer, Strategy};
    use crate::directory::{InstanceRecord, MemoryDirectory};
    use crate::fleet::RegistryConfig;
    use crate::health::testing::ScriptedProber;
    use crate::health::{HealthConfig, HealthMonitor, Prober};
    use crate::notify::WebhookNotifier;
    use crate::panel::testing::ScriptedPanel;
    use crate::panel::ServerDetails;
    use crate::routing::{ProxyRoutingTable, RouteTarget, RoutingTable};

    struct Fixture {
        registry: Arc<FleetRegistry>,
        table: Arc<ProxyRoutingTable>,
        prober: Arc<ScriptedProber>,
        panel: Option<Arc<dyn ProvisioningPanel>>,
        directory: Option<Arc<dyn EndpointDirectory>>,
    }

    impl Fixture {
        fn new() -> Self {
            let table = Arc::new(ProxyRoutingTable::new());
            let prober = Arc::new(ScriptedProber::new());
            let registry = Arc::new(FleetRegistry::new(
                RegistryConfig {
                    burst_attempts: 0,
                    ..RegistryConfig::default()
                },
                table.clone() as Arc<dyn RoutingTable>,
                prober.clone() as Arc<dyn Prober>,
                Arc::new(WebhookNotifier::disabled()),
            ));

            Self {
                registry,
                table,
                prober,
                panel: None,
                directory: None,
            }
        }

        fn handler(&self) -> EventHandler {
            EventHandler::new(
                self.registry.clone(),
                self.panel.clone(),
                self.directory.clone(),
                "172.18.0.1".to_string(),
            )
        }
    }

    #[tokio::test]
    async fn test_event_with_full_address_registers_directly() {
        let f = Fixture::new();

        f.handler()
            .handle_server_ready(
                br#"{"server_id":"42","type":"bedwars","ip":"10.0.0.5","port":25565}"#,
            )
            .await;

        let target = f.table.get("bedwars-42").unwrap();
        assert_eq!(target, RouteTarget::new("10.0.0.5", 25565));
        assert!(!f.registry.is_ready("bedwars-42"));
    }

    #[tokio::test]
    async fn test_event_with_port_only_uses_default_host() {
        let f = Fixture::new();

        f.handler()
            .handle_server_ready(br#"{"server_id":"7","type":"skywars","port":25610}"#)
            .await;

        let target = f.table.get("skywars-7").unwrap();
        assert_eq!(target, RouteTarget::new("172.18.0.1", 25610));
    }

    #[tokio::test]
    async fn test_panel_port_used_but_never_panel_host() {
        let mut f = Fixture::new();
        f.panel = Some(Arc::new(ScriptedPanel::new().with_details(
            "7",
            ServerDetails {
                name: Some("sw-7".to_string()),
                ip: "203.0.113.50".to_string(),
                port: 25601,
                identifier: Some("abc".to_string()),
            },
        )) as Arc<dyn ProvisioningPanel>);

        f.handler()
            .handle_server_ready(br#"{"server_id":"7","type":"skywars"}"#)
            .await;

        let target = f.table.get("skywars-7").unwrap();
        assert_eq!(target, RouteTarget::new("172.18.0.1", 25601));
    }

    #[tokio::test]
    async fn test_directory_fallback_when_panel_has_nothing() {
        let mut f = Fixture::new();
        let directory = Arc::new(MemoryDirectory::new());
        directory.insert_record(
            "instances:9:endpoint",
            InstanceRecord {
                name: "bedwars-9".to_string(),
                host: "203.0.113.9".to_string(),
                port: 25620,
                game_type: Some("bedwars".to_string()),
            },
        );
        f.directory = Some(directory as Arc<dyn EndpointDirectory>);

        f.handler()
            .handle_server_ready(br#"{"server_id":"9","type":"bedwars"}"#)
            .await;

        // Directory port, but the bridge host
        let target = f.table.get("bedwars-9").unwrap();
        assert_eq!(target, RouteTarget::new("172.18.0.1", 25620));
    }

    #[tokio::test]
    async fn test_numeric_port_offset_fallback() {
        let f = Fixture::new();

        f.handler()
            .handle_server_ready(br#"{"server_id":"42","type":"bedwars"}"#)
            .await;

        let target = f.table.get("bedwars-42").unwrap();
        assert_eq!(target, RouteTarget::new("172.18.0.1", 25607));
    }

    #[tokio::test]
    async fn test_non_numeric_id_falls_back_to_default_port() {
        let f = Fixture::new();

        f.handler()
            .handle_server_ready(br#"{"server_id":"abc123","type":"bedwars"}"#)
            .await;

        let target = f.table.get("bedwars-abc123").unwrap();
        assert_eq!(target.port, 25565);
    }

    #[tokio::test]
    async fn test_malformed_event_registers_nothing() {
        let f = Fixture::new();
        let handler = f.handler();

        handler.handle_server_ready(br#"{"type":"bedwars"}"#).await;
        handler.handle_server_ready(b"not json at all").await;

        assert_eq!(f.registry.managed_count(), 0);
    }

    #[tokio::test]
    async fn test_server_empty_removes_managed_instance() {
        let f = Fixture::new();
        let handler = f.handler();

        handler
            .handle_server_ready(
                br#"{"server_id":"42","type":"bedwars","ip":"10.0.0.5","port":25565}"#,
            )
            .await;
        handler
            .handle_server_empty(br#"{"server_id":"42","type":"bedwars"}"#)
            .await;

        assert!(!f.registry.is_managed("bedwars-42"));
        assert!(!f.table.contains("bedwars-42"));
    }

    #[tokio::test]
    async fn test_server_empty_for_unmanaged_instance_is_noop() {
        let f = Fixture::new();

        f.handler()
            .handle_server_empty(br#"{"server_id":"99","type":"bedwars"}"#)
            .await;

        assert_eq!(f.registry.managed_count(), 0);
    }

    #[tokio::test]
    async fn test_duplicate_ready_events_keep_first_registration() {
        let f = Fixture::new();
        let handler = f.handler();

        handler
            .handle_server_ready(
                br#"{"server_id":"42","type":"bedwars","ip":"10.0.0.5","port":25565}"#,
            )
            .await;
        handler
            .handle_server_ready(
                br#"{"server_id":"42","type":"bedwars","ip":"10.0.0.9","port":25999}"#,
            )
            .await;

        assert_eq!(f.registry.managed_count(), 1);
        assert_eq!(f.table.get("bedwars-42").unwrap().port, 25565);
    }

    /// End-to-end: announcement → registering → probe success → ready →
    /// selected for routing
    #[tokio::test(start_paused = true)]
    async fn test_event_to_selection_flow() {
        let f = Fixture::new();

        f.handler()
            .handle_server_ready(
                br#"{"server_id":"42","type":"bedwars","ip":"10.0.0.5","port":25565}"#,
            )
            .await;
        assert!(f.registry.is_managed("bedwars-42"));
        assert!(!f.registry.is_ready("bedwars-42"));

        f.prober.always_ok(&RouteTarget::new("10.0.0.5", 25565), 0);
        let monitor = Arc::new(HealthMonitor::new(
            HealthConfig::default(),
            f.registry.clone(),
            None,
            "proxy-1".to_string(),
        ));
        monitor.run_cycle().await;
        tokio::time::sleep(Duration::from_millis(10)).await;

        assert!(f.registry.is_ready("bedwars-42"));

        let balancer = LoadBalancer::new(
            f.registry.clone(),
            None,
            Strategy::LeastPlayers,
            false,
        );
        let selection = balancer.select_instance("bedwars").await.unwrap();
        assert_eq!(selection.target, RouteTarget::new("10.0.0.5", 25565));
    }
}
