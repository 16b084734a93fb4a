//! MongoDB client and repositories
//!
//! One collection per record kind. Records use string ids so the same
//! identity flows through events, logs and both store backends.

use async_trait::async_trait;
use bson::{doc, Document};
use futures_util::StreamExt;
use mongodb::error::{ErrorKind, WriteFailure};
use mongodb::{options::IndexOptions, Client, Collection, IndexModel};
use serde::{de::DeserializeOwned, Serialize};
use tracing::{error, info};

use super::Repository;
use crate::models::{
    Disk, DiskQuery, Entity, Matches, Mount, MountQuery, NetworkInterface, NetworkQuery, Node,
    NodeQuery,
};
use crate::types::{FleetError, Result};

/// Record kinds that know their MongoDB indexes and filters
pub trait MongoEntity: Entity + Serialize + DeserializeOwned + Unpin {
    fn indexes() -> Vec<(Document, Option<IndexOptions>)>;

    /// Server-side part of a query; anything not expressible here is
    /// re-checked with `Matches` after the fetch
    fn filter(query: &Self::Query) -> Document;
}

/// MongoDB client wrapper
#[derive(Clone)]
pub struct MongoClient {
    client: Client,
    db_name: String,
}

impl MongoClient {
    pub async fn new(uri: &str, db_name: &str) -> Result<Self> {
        info!("Connecting to MongoDB at {}", uri);

        // Fail fast instead of hanging on an unreachable server
        let timeout_uri = if uri.contains('?') {
            format!("{}&serverSelectionTimeoutMS=3000&connectTimeoutMS=3000", uri)
        } else {
            format!("{}?serverSelectionTimeoutMS=3000&connectTimeoutMS=3000", uri)
        };

        let client = Client::with_uri_str(&timeout_uri)
            .await
            .map_err(|e| FleetError::Database(format!("Failed to connect to MongoDB: {}", e)))?;

        client
            .database(db_name)
            .run_command(doc! { "ping": 1 })
            .await
            .map_err(|e| FleetError::Database(format!("MongoDB ping failed: {}", e)))?;

        info!("Connected to MongoDB database '{}'", db_name);

        Ok(Self {
            client,
            db_name: db_name.to_string(),
        })
    }

    pub fn db_name(&self) -> &str {
        &self.db_name
    }

    fn collection<T: Send + Sync>(&self, name: &str) -> Collection<T> {
        self.client.database(&self.db_name).collection::<T>(name)
    }
}

/// Repository over one MongoDB collection
pub struct MongoRepository<E: MongoEntity> {
    inner: Collection<E>,
}

impl<E: MongoEntity> MongoRepository<E> {
    /// Open the collection and apply indexes
    pub async fn new(client: &MongoClient) -> Result<Self> {
        let repo = Self {
            inner: client.collection::<E>(E::KIND),
        };
        repo.apply_indexes().await?;
        Ok(repo)
    }

    async fn apply_indexes(&self) -> Result<()> {
        let indices: Vec<IndexModel> = E::indexes()
            .into_iter()
            .map(|(keys, opts)| IndexModel::builder().keys(keys).options(opts).build())
            .collect();

        if indices.is_empty() {
            return Ok(());
        }

        self.inner
            .create_indexes(indices)
            .await
            .map_err(|e| FleetError::Database(format!("Failed to create indexes: {}", e)))?;

        Ok(())
    }
}

#[async_trait]
impl<E: MongoEntity> Repository<E> for MongoRepository<E> {
    async fn find(&self, query: &E::Query) -> Result<Vec<E>> {
        let cursor = self
            .inner
            .find(E::filter(query))
            .sort(doc! { "createdAt": 1 })
            .await
            .map_err(|e| FleetError::Database(format!("Find failed: {}", e)))?;

        let records: Vec<E> = cursor
            .filter_map(|doc| async {
                match doc {
                    Ok(d) => Some(d),
                    Err(e) => {
                        error!("Error reading {} document: {}", E::KIND, e);
                        None
                    }
                }
            })
            .collect()
            .await;

        Ok(records.into_iter().filter(|r| query.matches(r)).collect())
    }

    async fn get(&self, id: &str) -> Result<Option<E>> {
        self.inner
            .find_one(doc! { "_id": id })
            .await
            .map_err(|e| FleetError::Database(format!("Find failed: {}", e)))
    }

    async fn create(&self, entity: E) -> Result<E> {
        self.inner.insert_one(&entity).await.map_err(|e| {
            if is_duplicate_key(&e) {
                FleetError::Conflict {
                    kind: E::KIND,
                    key: entity.unique_key().unwrap_or(entity.id()).to_string(),
                }
            } else {
                FleetError::Database(format!("Insert failed: {}", e))
            }
        })?;
        Ok(entity)
    }

    async fn update(&self, entity: E) -> Result<E> {
        let result = self
            .inner
            .replace_one(doc! { "_id": entity.id() }, &entity)
            .await
            .map_err(|e| FleetError::Database(format!("Update failed: {}", e)))?;

        if result.matched_count == 0 {
            return Err(FleetError::NotFound {
                kind: E::KIND,
                id: entity.id().to_string(),
            });
        }
        Ok(entity)
    }

    async fn delete(&self, id: &str) -> Result<()> {
        let result = self
            .inner
            .delete_one(doc! { "_id": id })
            .await
            .map_err(|e| FleetError::Database(format!("Delete failed: {}", e)))?;

        if result.deleted_count == 0 {
            return Err(FleetError::NotFound {
                kind: E::KIND,
                id: id.to_string(),
            });
        }
        Ok(())
    }
}

/// Unique index violation (E11000)
fn is_duplicate_key(err: &mongodb::error::Error) -> bool {
    matches!(
        err.kind.as_ref(),
        ErrorKind::Write(WriteFailure::WriteError(write)) if write.code == 11000
    )
}

fn named_index(keys: Document, name: &str, unique: bool) -> (Document, Option<IndexOptions>) {
    (
        keys,
        Some(
            IndexOptions::builder()
                .name(name.to_string())
                .unique(unique)
                .build(),
        ),
    )
}

impl MongoEntity for Node {
    fn indexes() -> Vec<(Document, Option<IndexOptions>)> {
        vec![
            named_index(doc! { "nodeID": 1 }, "node_key_unique", true),
            named_index(doc! { "telemetry.hostname": 1 }, "hostname_index", false),
            named_index(doc! { "online": 1, "updatedAt": 1 }, "online_updated_index", false),
        ]
    }

    fn filter(query: &NodeQuery) -> Document {
        let mut filter = Document::new();
        if let Some(id) = &query.id {
            filter.insert("_id", id.as_str());
        }
        if let Some(key) = &query.node_key {
            filter.insert("nodeID", key.as_str());
        }
        if let Some(hostname) = &query.hostname {
            filter.insert("telemetry.hostname", hostname.as_str());
        }
        if let Some(online) = query.online {
            filter.insert("online", online);
        }
        if let Some(cutoff) = query.updated_before {
            filter.insert("updatedAt", doc! { "$lt": bson::DateTime::from_chrono(cutoff) });
        }
        filter
    }
}

impl MongoEntity for Disk {
    fn indexes() -> Vec<(Document, Option<IndexOptions>)> {
        vec![named_index(doc! { "node": 1 }, "node_index", false)]
    }

    fn filter(query: &DiskQuery) -> Document {
        let mut filter = Document::new();
        if let Some(id) = &query.id {
            filter.insert("_id", id.as_str());
        }
        if let Some(node) = &query.node {
            filter.insert("node", node.as_str());
        }
        filter
    }
}

impl MongoEntity for NetworkInterface {
    fn indexes() -> Vec<(Document, Option<IndexOptions>)> {
        vec![named_index(
            doc! { "node": 1, "address": 1 },
            "node_address_index",
            false,
        )]
    }

    fn filter(query: &NetworkQuery) -> Document {
        let mut filter = Document::new();
        if let Some(id) = &query.id {
            filter.insert("_id", id.as_str());
        }
        if let Some(node) = &query.node {
            filter.insert("node", node.as_str());
        }
        if let Some(address) = &query.address {
            filter.insert("address", address.as_str());
        }
        if let Some(family) = query.family {
            if let Ok(bson::Bson::String(family)) = bson::to_bson(&family) {
                filter.insert("family", family);
            }
        }
        for (field, flag) in [
            ("internal", query.internal),
            ("public", query.public),
            ("tunnel", query.tunnel),
            ("docker", query.docker),
        ] {
            if let Some(flag) = flag {
                filter.insert(field, flag);
            }
        }
        filter
    }
}

impl MongoEntity for Mount {
    fn indexes() -> Vec<(Document, Option<IndexOptions>)> {
        vec![
            named_index(doc! { "node": 1 }, "node_index", false),
            named_index(doc! { "device": 1 }, "device_index", false),
        ]
    }

    fn filter(query: &MountQuery) -> Document {
        let mut filter = Document::new();
        if let Some(id) = &query.id {
            filter.insert("_id", id.as_str());
        }
        if let Some(node) = &query.node {
            filter.insert("node", node.as_str());
        }
        if let Some(device) = &query.device {
            filter.insert("device", device.as_str());
        }
        filter
    }
}
