//! In-memory endpoint directory
//!
//! Used when no MongoDB is configured (the engine then runs purely
//! event-driven) and throughout the test suite.

use async_trait::async_trait;
use dashmap::DashMap;

use super::{EndpointDirectory, InstanceRecord};
use crate::types::Result;

#[derive(Default)]
pub struct MemoryDirectory {
    records: DashMap<String, InstanceRecord>,
    id_lists: DashMap<String, Vec<String>>,
}

impl MemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_record(&self, key: &str, record: InstanceRecord) {
        self.records.insert(key.to_string(), record);
    }

    pub fn remove_record(&self, key: &str) {
        self.records.remove(key);
    }

    pub fn set_instance_ids(&self, key: &str, ids: Vec<String>) {
        self.id_lists.insert(key.to_string(), ids);
    }
}

#[async_trait]
impl EndpointDirectory for MemoryDirectory {
    async fn list_records(&self, pattern: &str) -> Result<Vec<InstanceRecord>> {
        let prefix = format!("{}:", pattern);
        Ok(self
            .records
            .iter()
            .filter(|e| e.key().starts_with(&prefix))
            .map(|e| e.value().clone())
            .collect())
    }

    async fn record_for_instance(&self, instance_id: &str) -> Result<Option<InstanceRecord>> {
        Ok(self
            .records
            .get(&super::instance_key(instance_id))
            .map(|e| e.value().clone()))
    }

    async fn instance_ids(&self, key: &str) -> Result<Vec<String>> {
        Ok(self
            .id_lists
            .get(key)
            .map(|e| e.value().clone())
            .unwrap_or_default())
    }

    async fn ping(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(name: &str, port: u16) -> InstanceRecord {
        InstanceRecord {
            name: name.to_string(),
            host: "10.0.0.5".to_string(),
            port,
            game_type: Some("bedwars".to_string()),
        }
    }

    #[tokio::test]
    async fn test_list_records_matches_pattern_prefix() {
        let dir = MemoryDirectory::new();
        dir.insert_record("instances:1:endpoint", record("bedwars-1", 25565));
        dir.insert_record("instances:2:endpoint", record("bedwars-2", 25566));
        dir.insert_record("legacy:9:endpoint", record("skywars-9", 25601));

        let listed = dir.list_records("instances").await.unwrap();
        assert_eq!(listed.len(), 2);

        let legacy = dir.list_records("legacy").await.unwrap();
        assert_eq!(legacy.len(), 1);
        assert_eq!(legacy[0].name, "skywars-9");
    }

    #[tokio::test]
    async fn test_record_for_instance() {
        let dir = MemoryDirectory::new();
        dir.insert_record("instances:42:endpoint", record("bedwars-42", 25565));

        let found = dir.record_for_instance("42").await.unwrap().unwrap();
        assert_eq!(found.port, 25565);
        assert!(dir.record_for_instance("7").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_instance_ids_default_empty() {
        let dir = MemoryDirectory::new();
        assert!(dir.instance_ids("instances:bedwars").await.unwrap().is_empty());

        dir.set_instance_ids("instances:bedwars", vec!["42".into(), "43".into()]);
        assert_eq!(
            dir.instance_ids("instances:bedwars").await.unwrap(),
            vec!["42", "43"]
        );
    }
}
