//! Provisioning panel API client
//!
//! Read-only lookups against the hosting panel, used when a `server_ready`
//! event arrives without connection info. Three strategies are tried in
//! order: direct lookup by internal id, filter by external id, then a full
//! scan matched on id / identifier / external id. Whatever the panel
//! reports, only the allocation *port* is ever used; the proxy reaches
//! instances through the configured default host.

use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, warn};

/// Timeout for panel API calls
const PANEL_TIMEOUT: Duration = Duration::from_secs(10);

/// Connection details parsed from a panel server record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerDetails {
    pub name: Option<String>,
    pub ip: String,
    pub port: u16,
    pub identifier: Option<String>,
}

/// Lookup interface the event consumer depends on
#[async_trait]
pub trait ProvisioningPanel: Send + Sync {
    /// Resolve an instance id to its primary allocation. Lookup failures
    /// are swallowed into `None`; the caller falls through to the next
    /// resolution source.
    async fn server_details(&self, server_id: &str) -> Option<ServerDetails>;

    fn is_enabled(&self) -> bool;
}

/// HTTP client for the panel's application API
pub struct PanelClient {
    base_url: String,
    api_key: String,
    enabled: bool,
    client: reqwest::Client,
}

impl PanelClient {
    pub fn new(base_url: Option<String>, api_key: Option<String>, enabled: bool) -> Self {
        let base_url = base_url
            .unwrap_or_default()
            .trim_end_matches('/')
            .to_string();
        let api_key = api_key.unwrap_or_default();
        let enabled = enabled && !base_url.is_empty() && !api_key.is_empty();

        let client = reqwest::Client::builder()
            .connect_timeout(PANEL_TIMEOUT)
            .timeout(PANEL_TIMEOUT)
            .build()
            .unwrap_or_default();

        Self {
            base_url,
            api_key,
            enabled,
            client,
        }
    }

    async fn get_json(&self, url: &str) -> Option<Value> {
        let response = self
            .client
            .get(url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Accept", "application/json")
            .send()
            .await
            .ok()?;

        if !response.status().is_success() {
            return None;
        }

        response.json::<Value>().await.ok()
    }

    async fn by_id(&self, server_id: &str) -> Option<ServerDetails> {
        let url = format!(
            "{}/api/application/servers/{}?include=allocations",
            self.base_url, server_id
        );
        parse_details(&self.get_json(&url).await?)
    }

    async fn by_external_id(&self, external_id: &str) -> Option<ServerDetails> {
        let url = format!(
            "{}/api/application/servers?filter[external_id]={}&include=allocations",
            self.base_url, external_id
        );
        let body = self.get_json(&url).await?;
        let first = body.get("data")?.as_array()?.first()?;
        parse_details(first)
    }

    async fn scan(&self, wanted: &str) -> Option<ServerDetails> {
        let url = format!("{}/api/application/servers?include=allocations", self.base_url);
        let body = self.get_json(&url).await?;

        for server in body.get("data")?.as_array()? {
            let attrs = server.get("attributes")?;

            let id = attrs.get("id").and_then(Value::as_i64).map(|v| v.to_string());
            let identifier = attrs
                .get("identifier")
                .and_then(Value::as_str)
                .map(str::to_string);
            let external_id = attrs
                .get("external_id")
                .and_then(Value::as_str)
                .map(str::to_string);

            let matched = id.as_deref() == Some(wanted)
                || identifier.as_deref() == Some(wanted)
                || external_id.as_deref() == Some(wanted);

            if matched {
                return parse_details(server);
            }
        }

        None
    }
}

#[async_trait]
impl ProvisioningPanel for PanelClient {
    async fn server_details(&self, server_id: &str) -> Option<ServerDetails> {
        if !self.enabled {
            return None;
        }

        if let Some(details) = self.by_id(server_id).await {
            debug!(server_id = %server_id, port = details.port, "Panel lookup by id");
            return Some(details);
        }

        if let Some(details) = self.by_external_id(server_id).await {
            debug!(server_id = %server_id, port = details.port, "Panel lookup by external id");
            return Some(details);
        }

        match self.scan(server_id).await {
            Some(details) => {
                debug!(server_id = %server_id, port = details.port, "Panel lookup by scan");
                Some(details)
            }
            None => {
                warn!(server_id = %server_id, "Panel has no record for instance");
                None
            }
        }
    }

    fn is_enabled(&self) -> bool {
        self.enabled
    }
}

/// Extract name/identifier and the primary (or first) allocation from a
/// panel server object
fn parse_details(server: &Value) -> Option<ServerDetails> {
    let attrs = server.get("attributes").unwrap_or(server);

    let name = attrs.get("name").and_then(Value::as_str).map(str::to_string);
    let identifier = attrs
        .get("identifier")
        .and_then(Value::as_str)
        .map(str::to_string);

    let allocations = attrs
        .get("relationships")?
        .get("allocations")?
        .get("data")?
        .as_array()?;

    let primary = allocations
        .iter()
        .filter_map(|a| a.get("attributes"))
        .find(|a| a.get("is_default").and_then(Value::as_bool) == Some(true))
        .or_else(|| allocations.first()?.get("attributes"))?;

    let ip = primary.get("ip")?.as_str()?.to_string();
    let port = u16::try_from(primary.get("port")?.as_i64()?).ok()?;

    Some(ServerDetails {
        name,
        ip,
        port,
        identifier,
    })
}
