//! Routing-table capability
//!
//! The proxy owns its routing table; this engine only holds a handle to it
//! and must never assume exclusive ownership. Entries created by operators
//! or other plugins share the same namespace, which is why removal always
//! goes through the registry's managed-set check first.

use dashmap::DashMap;
use serde::{Deserialize, Serialize};

/// A routable backend address
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteTarget {
    pub host: String,
    pub port: u16,
}

impl RouteTarget {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

impl std::fmt::Display for RouteTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Injected handle to the proxy's name → address table
pub trait RoutingTable: Send + Sync {
    /// Insert or replace an entry
    fn put(&self, name: &str, target: RouteTarget);

    /// Remove an entry. Returns true if it existed.
    fn remove(&self, name: &str) -> bool;

    /// Whether an entry exists under this name
    fn contains(&self, name: &str) -> bool;

    /// Look up an entry's address
    fn get(&self, name: &str) -> Option<RouteTarget>;

    /// Snapshot of all entry names
    fn list(&self) -> Vec<String>;
}

/// In-process routing table shared with the proxy frontend
#[derive(Default)]
pub struct ProxyRoutingTable {
    entries: DashMap<String, RouteTarget>,
}

impl ProxyRoutingTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl RoutingTable for ProxyRoutingTable {
    fn put(&self, name: &str, target: RouteTarget) {
        self.entries.insert(name.to_string(), target);
    }

    fn remove(&self, name: &str) -> bool {
        self.entries.remove(name).is_some()
    }

    fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    fn get(&self, name: &str) -> Option<RouteTarget> {
        self.entries.get(name).map(|e| e.value().clone())
    }

    fn list(&self) -> Vec<String> {
        self.entries.iter().map(|e| e.key().clone()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_put_get_remove() {
        let table = ProxyRoutingTable::new();
        table.put("bedwars-42", RouteTarget::new("10.0.0.5", 25565));

        assert!(table.contains("bedwars-42"));
        assert_eq!(
            table.get("bedwars-42"),
            Some(RouteTarget::new("10.0.0.5", 25565))
        );

        assert!(table.remove("bedwars-42"));
        assert!(!table.contains("bedwars-42"));
        assert!(!table.remove("bedwars-42"));
    }

    #[test]
    fn test_put_replaces_existing() {
        let table = ProxyRoutingTable::new();
        table.put("skywars-7", RouteTarget::new("10.0.0.5", 25601));
        table.put("skywars-7", RouteTarget::new("10.0.0.6", 25602));

        assert_eq!(table.len(), 1);
        assert_eq!(
            table.get("skywars-7"),
            Some(RouteTarget::new("10.0.0.6", 25602))
        );
    }

    #[test]
    fn test_list_snapshot() {
        let table = ProxyRoutingTable::new();
        table.put("bedwars-1", RouteTarget::new("10.0.0.1", 25565));
        table.put("bedwars-2", RouteTarget::new("10.0.0.2", 25566));

        let mut names = table.list();
        names.sort();
        assert_eq!(names, vec!["bedwars-1", "bedwars-2"]);
    }
}
