//! Endpoint directory: fallback source of truth for instance endpoints
//!
//! Holds instance endpoint records keyed like `instances:{id}:endpoint`,
//! written by the provisioning controller. The event channel is the
//! authoritative registration path; the directory is consulted as an
//! address fallback and swept by the reconciler to detect drift.

mod memory;
mod mongo;

pub use memory::MemoryDirectory;
pub use mongo::MongoDirectory;

use async_trait::async_trait;

use crate::types::Result;

/// A complete endpoint record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstanceRecord {
    pub name: String,
    pub host: String,
    pub port: u16,
    pub game_type: Option<String>,
}

/// Directory key for one instance's endpoint record
pub fn instance_key(instance_id: &str) -> String {
    format!("instances:{}:endpoint", instance_id)
}

/// Key-value lookups the engine performs against the directory
#[async_trait]
pub trait EndpointDirectory: Send + Sync {
    /// List records whose key matches `pattern:*`. Records missing any of
    /// name, host or port are skipped, not surfaced as errors.
    async fn list_records(&self, pattern: &str) -> Result<Vec<InstanceRecord>>;

    /// Fetch the endpoint record stored for one instance id
    async fn record_for_instance(&self, instance_id: &str) -> Result<Option<InstanceRecord>>;

    /// Legacy lookup: a JSON array of instance ids stored under one key
    async fn instance_ids(&self, key: &str) -> Result<Vec<String>>;

    /// Cheap connectivity check for the operator surface
    async fn ping(&self) -> bool;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_instance_key_format() {
        assert_eq!(instance_key("42"), "instances:42:endpoint");
    }
}
