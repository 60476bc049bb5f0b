//! MongoDB-backed endpoint directory

use async_trait::async_trait;
use bson::{doc, Bson, Document};
use futures::TryStreamExt;
use mongodb::{Client, Collection, Database};
use tracing::{debug, info, warn};

use super::{EndpointDirectory, InstanceRecord};
use crate::types::Result;

/// Collection holding endpoint records
const ENDPOINT_COLLECTION: &str = "endpoints";

/// Endpoint directory backed by MongoDB
pub struct MongoDirectory {
    db: Database,
    collection: Collection<Document>,
}

impl MongoDirectory {
    /// Connect and select the endpoint collection
    pub async fn connect(uri: &str, db_name: &str) -> Result<Self> {
        info!("Connecting to MongoDB at {}", uri);

        let client = Client::with_uri_str(uri).await?;
        let db = client.database(db_name);
        let collection = db.collection::<Document>(ENDPOINT_COLLECTION);

        // Surface connectivity problems now instead of on the first sweep
        db.run_command(doc! { "ping": 1 }).await?;
        info!("Connected to MongoDB, database {}", db_name);

        Ok(Self { db, collection })
    }
}

#[async_trait]
impl EndpointDirectory for MongoDirectory {
    async fn list_records(&self, pattern: &str) -> Result<Vec<InstanceRecord>> {
        let filter = doc! { "key": { "$regex": format!("^{}:", pattern) } };
        let mut cursor = self.collection.find(filter).await?;

        let mut records = Vec::new();
        while let Some(document) = cursor.try_next().await? {
            match parse_record(&document) {
                Some(record) => records.push(record),
                None => {
                    debug!(
                        key = document.get_str("key").unwrap_or("<missing>"),
                        "Skipping incomplete endpoint record"
                    );
                }
            }
        }

        Ok(records)
    }

    async fn record_for_instance(&self, instance_id: &str) -> Result<Option<InstanceRecord>> {
        let key = super::instance_key(instance_id);
        let document = self.collection.find_one(doc! { "key": &key }).await?;

        Ok(document.as_ref().and_then(parse_record))
    }

    async fn instance_ids(&self, key: &str) -> Result<Vec<String>> {
        let Some(document) = self.collection.find_one(doc! { "key": key }).await? else {
            return Ok(Vec::new());
        };

        // Newer writers store a BSON array, the legacy controller stores the
        // JSON array as a string
        match document.get("ids") {
            Some(Bson::Array(values)) => Ok(values
                .iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect()),
            Some(Bson::String(raw)) => match serde_json::from_str::<Vec<String>>(raw) {
                Ok(ids) => Ok(ids),
                Err(e) => {
                    warn!(key = %key, error = %e, "Unparseable legacy id list");
                    Ok(Vec::new())
                }
            },
            _ => Ok(Vec::new()),
        }
    }

    async fn ping(&self) -> bool {
        self.db.run_command(doc! { "ping": 1 }).await.is_ok()
    }
}

/// Parse an endpoint record; documents missing name, host or port are
/// skipped by returning `None`
fn parse_record(document: &Document) -> Option<InstanceRecord> {
    let name = document.get_str("name").ok()?.to_string();
    let host = document.get_str("host").ok()?.to_string();

    let port = match document.get("port") {
        Some(Bson::Int32(p)) => u16::try_from(*p).ok()?,
        Some(Bson::Int64(p)) => u16::try_from(*p).ok()?,
        Some(Bson::String(p)) => p.parse::<u16>().ok()?,
        _ => return None,
    };

    let game_type = document.get_str("game_type").ok().map(str::to_string);

    Some(InstanceRecord {
        name,
        host,
        port,
        game_type,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_record_complete() {
        let document = doc! {
            "key": "instances:42:endpoint",
            "name": "bedwars-42",
            "host": "10.0.0.5",
            "port": 25565,
            "game_type": "bedwars",
        };

        let record = parse_record(&document).unwrap();
        assert_eq!(record.name, "bedwars-42");
        assert_eq!(record.host, "10.0.0.5");
        assert_eq!(record.port, 25565);
        assert_eq!(record.game_type.as_deref(), Some("bedwars"));
    }

    #[test]
    fn test_parse_record_string_port_and_missing_type() {
        let document = doc! {
            "name": "skywars-7",
            "host": "10.0.0.6",
            "port": "25601",
        };

        let record = parse_record(&document).unwrap();
        assert_eq!(record.port, 25601);
        assert!(record.game_type.is_none());
    }

    #[test]
    fn test_parse_record_incomplete_is_skipped() {
        assert!(parse_record(&doc! { "name": "bedwars-42", "host": "10.0.0.5" }).is_none());
        assert!(parse_record(&doc! { "name": "bedwars-42", "port": 25565 }).is_none());
        assert!(parse_record(&doc! { "host": "10.0.0.5", "port": 25565 }).is_none());
        assert!(parse_record(&doc! { "name": "x", "host": "h", "port": 70000 }).is_none());
    }
}
