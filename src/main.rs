//! fleetsync - dynamic game-server fleet management for a routing proxy

use clap::Parser;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use fleetsync::{
    admin::AdminHandle,
    balancer::{LoadBalancer, Strategy},
    config::Args,
    directory::{EndpointDirectory, MongoDirectory},
    fleet::{FleetRegistry, RegistryConfig},
    health::{HealthConfig, HealthMonitor, Prober, StatusProber},
    nats::{EventConsumer, EventHandler, EventSink, NatsClient, SelectionService},
    notify::WebhookNotifier,
    panel::{PanelClient, ProvisioningPanel},
    reconcile::{ReconcileConfig, Reconciler},
    routing::{ProxyRoutingTable, RoutingTable},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file if present
    let _ = dotenvy::dotenv();

    // Parse command line arguments
    let args = Args::parse();

    // Initialize tracing/logging
    let log_level = args.log_level.clone();
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("fleetsync={},info", log_level).into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Validate configuration
    if let Err(e) = args.validate() {
        error!("Configuration error: {}", e);
        std::process::exit(1);
    }

    // Print startup banner
    info!("======================================");
    info!("  fleetsync - fleet management engine");
    info!("======================================");
    info!("Proxy ID: {}", args.proxy_id);
    info!("Name template: {}", args.name_template);
    info!("Default host: {}", args.default_host);
    info!("Grace period: {}s", args.grace_period_secs);
    info!("Health interval: {}s", args.health_check_interval_secs);
    info!("Reconcile interval: {}s", args.reconcile_interval_secs);
    info!("Strategy: {}", args.balance_strategy);
    info!("Auto-spawn: {}", args.auto_spawn);
    info!("NATS: {}", args.nats.nats_url);
    info!("MongoDB: {}", args.mongodb_uri);
    info!("======================================");

    // Connect to NATS. Without it the engine runs degraded: no inbound
    // events, no spawn requests, no player-count reports.
    let nats = match NatsClient::new(&args.nats, &format!("fleetsync-{}", args.proxy_id)).await {
        Ok(client) => {
            info!("NATS connected successfully");
            Some(client)
        }
        Err(e) => {
            warn!("NATS connection failed, running without event transport: {}", e);
            None
        }
    };

    // Connect to MongoDB. Without it address fallbacks and reconciliation
    // sweeps are skipped.
    let directory: Option<Arc<dyn EndpointDirectory>> =
        match MongoDirectory::connect(&args.mongodb_uri, &args.mongodb_db).await {
            Ok(directory) => {
                info!("MongoDB connected successfully");
                Some(Arc::new(directory))
            }
            Err(e) => {
                warn!("MongoDB connection failed, running without directory: {}", e);
                None
            }
        };

    // Webhook sink for lifecycle notifications
    let notifier = Arc::new(WebhookNotifier::new(
        args.webhook_url.clone(),
        args.webhook_enabled,
        args.webhook_name.clone(),
    ));
    if notifier.is_enabled() {
        info!("Webhook notifications enabled");
    }

    // Provisioning panel client
    let panel: Option<Arc<dyn ProvisioningPanel>> = {
        let client = PanelClient::new(
            args.panel_url.clone(),
            args.panel_api_key.clone(),
            args.panel_enabled,
        );
        if client.is_enabled() {
            info!("Panel API client initialized");
            Some(Arc::new(client))
        } else {
            info!("Panel API disabled");
            None
        }
    };

    // Routing table shared with the proxy frontend
    let table: Arc<dyn RoutingTable> = Arc::new(ProxyRoutingTable::new());

    // Probe transport owns its own timeout
    let prober: Arc<dyn Prober> =
        Arc::new(StatusProber::new(Duration::from_millis(args.probe_timeout_ms)));

    // Core registry
    let registry = Arc::new(FleetRegistry::new(
        RegistryConfig {
            name_template: args.name_template.clone(),
            grace_period: Duration::from_secs(args.grace_period_secs),
            ..RegistryConfig::default()
        },
        table,
        prober,
        notifier.clone(),
    ));

    let sink: Option<Arc<dyn EventSink>> = nats
        .clone()
        .map(|client| Arc::new(client) as Arc<dyn EventSink>);

    // Health monitor
    let monitor = HealthMonitor::new(
        HealthConfig {
            interval: Duration::from_secs(args.health_check_interval_secs),
        },
        registry.clone(),
        sink.clone(),
        args.proxy_id.to_string(),
    );
    monitor.start().await;

    // Reconciler
    let reconciler = Arc::new(Reconciler::new(
        ReconcileConfig {
            interval: Duration::from_secs(args.reconcile_interval_secs),
            patterns: args.directory_pattern_list(),
        },
        registry.clone(),
        directory.clone(),
    ));
    reconciler.clone().start().await;

    // Load balancer for the player-facing selection command
    let strategy = Strategy::parse(&args.balance_strategy);
    let balancer = Arc::new(LoadBalancer::new(
        registry.clone(),
        sink.clone(),
        strategy,
        args.auto_spawn,
    ));

    // Event consumers and the selection endpoint
    if let Some(client) = nats.clone() {
        let handler = Arc::new(EventHandler::new(
            registry.clone(),
            panel.clone(),
            directory.clone(),
            args.default_host.clone(),
        ));
        Arc::new(EventConsumer::new(client.clone(), handler)).start();
        Arc::new(SelectionService::new(client, balancer.clone())).start();
    } else {
        warn!("Event transport unavailable, dynamic registration is disabled");
    }

    // Operator surface
    let admin = AdminHandle::new(
        registry.clone(),
        reconciler.clone(),
        nats.clone(),
        directory.clone(),
    );
    let status = admin.status().await;
    info!(
        transport = status.transport_connected,
        directory = status.directory_connected,
        managed = status.managed,
        "fleetsync started"
    );
    notifier.engine_started(status.managed);

    // Run until interrupted
    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received");

    monitor.stop().await;
    reconciler.stop().await;
    notifier.engine_stopped();

    if let Some(client) = &nats {
        let _ = client.flush().await;
    }

    info!("fleetsync stopped");
    Ok(())
}
