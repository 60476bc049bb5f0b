//! Webhook notifications for fleet lifecycle events
//!
//! Best-effort observability sink: every post is fire-and-forget on its own
//! task and a failed delivery only produces a log line. Nothing in the
//! engine waits on a webhook.

use serde_json::json;
use std::time::Duration;
use tracing::{debug, warn};

/// Timeout for webhook deliveries
const DELIVERY_TIMEOUT: Duration = Duration::from_secs(5);

/// Posts lifecycle events to a configured webhook URL
pub struct WebhookNotifier {
    enabled: bool,
    url: String,
    sender_name: String,
    client: reqwest::Client,
}

impl WebhookNotifier {
    pub fn new(url: Option<String>, enabled: bool, sender_name: String) -> Self {
        let url = url.unwrap_or_default();
        let enabled = enabled && !url.is_empty();

        let client = reqwest::Client::builder()
            .timeout(DELIVERY_TIMEOUT)
            .build()
            .unwrap_or_default();

        Self {
            enabled,
            url,
            sender_name,
            client,
        }
    }

    /// A notifier that drops everything; used when no webhook is configured
    pub fn disabled() -> Self {
        Self::new(None, false, "fleetsync".to_string())
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn post(&self, content: String) {
        if !self.enabled {
            return;
        }

        let client = self.client.clone();
        let url = self.url.clone();
        let payload = json!({
            "username": self.sender_name,
            "content": content,
        });

        tokio::spawn(async move {
            match client.post(&url).json(&payload).send().await {
                Ok(resp) if resp.status().is_success() => {
                    debug!("Webhook delivered");
                }
                Ok(resp) => {
                    warn!(status = %resp.status(), "Webhook rejected");
                }
                Err(e) => {
                    warn!(error = %e, "Webhook delivery failed");
                }
            }
        });
    }

    pub fn instance_registered(&self, name: &str, instance_id: &str, game_type: &str, address: &str) {
        self.post(format!(
            ":inbox_tray: Registered **{name}** (id {instance_id}, type {game_type}) at `{address}`"
        ));
    }

    pub fn instance_ready(&self, name: &str) {
        self.post(format!(":white_check_mark: **{name}** is ready for players"));
    }

    pub fn instance_removed(&self, name: &str) {
        self.post(format!(":outbox_tray: Removed **{name}**"));
    }

    pub fn engine_started(&self, managed: usize) {
        self.post(format!(
            ":rocket: fleetsync started ({managed} instance(s) managed)"
        ));
    }

    pub fn engine_stopped(&self) {
        self.post(":octagonal_sign: fleetsync stopped".to_string());
    }

    pub fn error(&self, title: &str, detail: &str) {
        self.post(format!(":warning: **{title}**: {detail}"));
    }
}
