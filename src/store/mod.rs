//! Entity store
//!
//! Typed CRUD over the four record kinds. The store is the single source of
//! truth shared by the reconciler and every event handler; writes are
//! last-write-wins upserts keyed by natural identity, so no locking is layered
//! on top.
//!
//! ## Backends
//!
//! - `memory` - concurrent in-process maps, used by tests and dev mode
//! - `mongo` - one MongoDB collection per record kind

pub mod memory;
pub mod mongo;

pub use memory::MemoryRepository;
pub use mongo::{MongoClient, MongoRepository};

use async_trait::async_trait;
use std::sync::Arc;

use crate::models::{Disk, Entity, Mount, NetworkInterface, Node};
use crate::types::{FleetError, Result};

/// CRUD + query over one record kind
#[async_trait]
pub trait Repository<E: Entity>: Send + Sync {
    /// All matching records in insertion order
    async fn find(&self, query: &E::Query) -> Result<Vec<E>>;

    /// First matching record in insertion order
    async fn find_one(&self, query: &E::Query) -> Result<Option<E>> {
        Ok(self.find(query).await?.into_iter().next())
    }

    async fn get(&self, id: &str) -> Result<Option<E>>;

    async fn create(&self, entity: E) -> Result<E>;

    /// Replace the stored record with the same id
    async fn update(&self, entity: E) -> Result<E>;

    async fn delete(&self, id: &str) -> Result<()>;

    /// Like `get` but absent records are an error
    async fn resolve(&self, id: &str) -> Result<E> {
        self.get(id).await?.ok_or_else(|| FleetError::NotFound {
            kind: E::KIND,
            id: id.to_string(),
        })
    }
}

/// Handles to every record collection
#[derive(Clone)]
pub struct EntityStore {
    pub nodes: Arc<dyn Repository<Node>>,
    pub disks: Arc<dyn Repository<Disk>>,
    pub networks: Arc<dyn Repository<NetworkInterface>>,
    pub mounts: Arc<dyn Repository<Mount>>,
}

impl EntityStore {
    /// In-memory store
    pub fn memory() -> Self {
        Self {
            nodes: Arc::new(MemoryRepository::<Node>::new()),
            disks: Arc::new(MemoryRepository::<Disk>::new()),
            networks: Arc::new(MemoryRepository::<NetworkInterface>::new()),
            mounts: Arc::new(MemoryRepository::<Mount>::new()),
        }
    }

    /// MongoDB-backed store, creating collections and indexes as needed
    pub async fn mongo(client: &MongoClient) -> Result<Self> {
        Ok(Self {
            nodes: Arc::new(MongoRepository::<Node>::new(client).await?),
            disks: Arc::new(MongoRepository::<Disk>::new(client).await?),
            networks: Arc::new(MongoRepository::<NetworkInterface>::new(client).await?),
            mounts: Arc::new(MongoRepository::<Mount>::new(client).await?),
        })
    }
}
