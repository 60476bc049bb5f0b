//! Configuration for fleetsync
//!
//! CLI arguments and environment variable handling using clap.

use clap::Parser;
use uuid::Uuid;

/// fleetsync - dynamic game-server fleet management for a routing proxy
#[derive(Parser, Debug, Clone)]
#[command(name = "fleetsync")]
#[command(about = "Registers ephemeral game servers into the proxy routing table and keeps them healthy")]
pub struct Args {
    /// Unique identifier for this proxy instance
    ///
    /// Stamped onto outbound player-count reports so a downstream
    /// controller can deduplicate across multiple proxies.
    #[arg(long, env = "PROXY_ID", default_value_t = Uuid::new_v4())]
    pub proxy_id: Uuid,

    /// Template for routing-table names, e.g. "{type}-{id}" -> "bedwars-42"
    #[arg(long, env = "NAME_TEMPLATE", default_value = "{type}-{id}")]
    pub name_template: String,

    /// Default host for instances whose announcement carries no address.
    /// This is the bridge address reachable from the proxy; it always wins
    /// over whatever host the panel reports.
    #[arg(long, env = "DEFAULT_HOST", default_value = "172.18.0.1")]
    pub default_host: String,

    /// Seconds after registration during which failed probes are tolerated
    #[arg(long, env = "GRACE_PERIOD_SECS", default_value = "30")]
    pub grace_period_secs: u64,

    /// Interval between health-check cycles in seconds
    #[arg(long, env = "HEALTH_CHECK_INTERVAL_SECS", default_value = "30")]
    pub health_check_interval_secs: u64,

    /// Interval between directory reconciliation sweeps in seconds
    #[arg(long, env = "RECONCILE_INTERVAL_SECS", default_value = "60")]
    pub reconcile_interval_secs: u64,

    /// Comma-separated directory key patterns to sweep, e.g. "instances,legacy"
    #[arg(long, env = "DIRECTORY_PATTERNS", default_value = "instances")]
    pub directory_patterns: String,

    /// Probe request timeout in milliseconds (owned by the probe transport)
    #[arg(long, env = "PROBE_TIMEOUT_MS", default_value = "2000")]
    pub probe_timeout_ms: u64,

    /// NATS configuration
    #[command(flatten)]
    pub nats: NatsArgs,

    /// MongoDB connection URI for the endpoint directory
    #[arg(long, env = "MONGODB_URI", default_value = "mongodb://localhost:27017")]
    pub mongodb_uri: String,

    /// MongoDB database name
    #[arg(long, env = "MONGODB_DB", default_value = "fleetsync")]
    pub mongodb_db: String,

    /// Provisioning panel base URL (e.g. "https://panel.example.com")
    #[arg(long, env = "PANEL_URL")]
    pub panel_url: Option<String>,

    /// Provisioning panel application API key
    #[arg(long, env = "PANEL_API_KEY")]
    pub panel_api_key: Option<String>,

    /// Enable panel lookups for events that omit connection info
    #[arg(long, env = "PANEL_ENABLED", default_value = "true")]
    pub panel_enabled: bool,

    /// Webhook URL for lifecycle notifications (optional)
    #[arg(long, env = "WEBHOOK_URL")]
    pub webhook_url: Option<String>,

    /// Enable webhook lifecycle notifications
    #[arg(long, env = "WEBHOOK_ENABLED", default_value = "false")]
    pub webhook_enabled: bool,

    /// Display name used by the webhook sink
    #[arg(long, env = "WEBHOOK_NAME", default_value = "fleetsync")]
    pub webhook_name: String,

    /// Load-balancing strategy: LEAST_PLAYERS, RANDOM, ROUND_ROBIN
    /// (anything else falls back to first-candidate)
    #[arg(long, env = "BALANCE_STRATEGY", default_value = "LEAST_PLAYERS")]
    pub balance_strategy: String,

    /// Publish a spawn request when selection finds no ready instance
    #[arg(long, env = "AUTO_SPAWN", default_value = "true")]
    pub auto_spawn: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,
}

/// NATS connection configuration
#[derive(Parser, Debug, Clone)]
pub struct NatsArgs {
    /// NATS server URL
    #[arg(long, env = "NATS_URL", default_value = "nats://127.0.0.1:4222")]
    pub nats_url: String,

    /// NATS username (optional)
    #[arg(long, env = "NATS_USER")]
    pub nats_user: Option<String>,

    /// NATS password (optional)
    #[arg(long, env = "NATS_PASSWORD")]
    pub nats_password: Option<String>,
}

impl Args {
    /// Get the list of directory key patterns
    pub fn directory_pattern_list(&self) -> Vec<String> {
        self.directory_patterns
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect()
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if !self.name_template.contains("{type}") || !self.name_template.contains("{id}") {
            return Err("NAME_TEMPLATE must contain both {type} and {id}".to_string());
        }

        if self.panel_enabled && self.panel_url.is_some() && self.panel_api_key.is_none() {
            return Err("PANEL_API_KEY is required when PANEL_URL is set".to_string());
        }

        if self.health_check_interval_secs == 0 || self.reconcile_interval_secs == 0 {
            return Err("check intervals must be greater than zero".to_string());
        }

        Ok(())
    }
}
