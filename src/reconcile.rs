//! Directory reconciliation
//!
//! Periodic cross-check between the endpoint directory and the managed set
//! to detect drift. Reconciliation is one-way: instances registered over
//! the event channel are not mirrored into the directory,
//! so a managed name missing from the listing is normal and is never
//! evicted from here. Directory entries with no managed counterpart are
//! logged but NOT registered; additions stay event-driven to rule out
//! double-registration races between the two paths.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::directory::EndpointDirectory;
use crate::fleet::FleetRegistry;

/// Reconciler configuration
#[derive(Debug, Clone)]
pub struct ReconcileConfig {
    /// Interval between sweeps, coarser than the health cycle
    pub interval: Duration,
    /// Directory key patterns to sweep
    pub patterns: Vec<String>,
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(60),
            patterns: vec!["instances".to_string()],
        }
    }
}

/// Outcome of a single sweep, surfaced on the operator command
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    /// Complete records returned by the directory
    pub directory_records: usize,
    /// Managed instances at sweep time
    pub managed: usize,
    /// Managed names absent from the listing (event-registered, retained)
    pub unlisted_managed: usize,
    /// Listed names with no managed counterpart (logged, not registered)
    pub unregistered_listed: usize,
    /// True when the directory was unreachable and the sweep was skipped
    pub skipped: bool,
}

/// Periodic directory sweep service
pub struct Reconciler {
    config: ReconcileConfig,
    registry: Arc<FleetRegistry>,
    directory: Option<Arc<dyn EndpointDirectory>>,
    running: Arc<RwLock<bool>>,
}

impl Reconciler {
    pub fn new(
        config: ReconcileConfig,
        registry: Arc<FleetRegistry>,
        directory: Option<Arc<dyn EndpointDirectory>>,
    ) -> Self {
        Self {
            config,
            registry,
            directory,
            running: Arc::new(RwLock::new(false)),
        }
    }

    /// Start the periodic sweep loop
    pub async fn start(self: Arc<Self>) {
        {
            let mut running = self.running.write().await;
            if *running {
                warn!("Reconciler already running");
                return;
            }
            *running = true;
        }

        info!(
            interval = ?self.config.interval,
            patterns = ?self.config.patterns,
            "Starting reconciler"
        );

        let reconciler = Arc::clone(&self);
        tokio::spawn(async move {
            let start = tokio::time::Instant::now() + reconciler.config.interval;
            let mut ticks = tokio::time::interval_at(start, reconciler.config.interval);

            loop {
                ticks.tick().await;

                if !*reconciler.running.read().await {
                    info!("Reconciler stopped");
                    break;
                }

                reconciler.reconcile_once().await;
            }
        });
    }

    /// Stop the sweep loop
    pub async fn stop(&self) {
        let mut running = self.running.write().await;
        *running = false;
        info!("Stopping reconciler");
    }

    /// One sweep over all configured patterns. Also invoked directly by the
    /// operator force-reconcile command.
    pub async fn reconcile_once(&self) -> ReconcileReport {
        let Some(directory) = &self.directory else {
            debug!("No endpoint directory configured, reconciliation skipped");
            return ReconcileReport {
                skipped: true,
                ..ReconcileReport::default()
            };
        };

        let mut records = Vec::new();
        for pattern in &self.config.patterns {
            match directory.list_records(pattern).await {
                Ok(mut listed) => records.append(&mut listed),
                Err(e) => {
                    warn!(pattern = %pattern, error = %e, "Directory unreachable, skipping sweep");
                    return ReconcileReport {
                        skipped: true,
                        ..ReconcileReport::default()
                    };
                }
            }
        }

        let listed_names: HashSet<&str> = records.iter().map(|r| r.name.as_str()).collect();
        let managed = self.registry.managed_set();

        // Managed but not listed: normal for event-registered instances.
        // Retained; the health monitor alone decides evictions.
        let mut unlisted_managed = 0;
        for name in &managed {
            if !listed_names.contains(name.as_str()) {
                debug!(name = %name, "Not in directory listing but actively managed, keeping");
                unlisted_managed += 1;
            }
        }

        // Listed but not managed: the addition path is deliberately inert;
        // registrations come from the event channel only.
        let managed_names: HashSet<&str> = managed.iter().map(String::as_str).collect();
        let mut unregistered_listed = 0;
        for record in &records {
            if !managed_names.contains(record.name.as_str())
                && !self.registry.table().contains(&record.name)
            {
                info!(
                    name = %record.name,
                    address = %format!("{}:{}", record.host, record.port),
                    "Directory lists an instance this engine does not manage"
                );
                unregistered_listed += 1;
            }
        }

        let report = ReconcileReport {
            directory_records: records.len(),
            managed: managed.len(),
            unlisted_managed,
            unregistered_listed,
            skipped: false,
        };

        debug!(
            directory = report.directory_records,
            managed = report.managed,
            drift = report.unregistered_listed,
            "Reconciliation sweep complete"
        );

        report
    }
}
