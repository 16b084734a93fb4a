//! In-memory repository

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use super::Repository;
use crate::models::{Entity, Matches};
use crate::types::{FleetError, Result};

/// Concurrent map of records tagged with an insertion sequence
///
/// Natural keys (`Entity::unique_key`) are held in a side index mapping
/// key to record id, claimed before the record is inserted.
pub struct MemoryRepository<E: Entity> {
    records: DashMap<String, (u64, E)>,
    unique: DashMap<String, String>,
    sequence: AtomicU64,
}

impl<E: Entity> MemoryRepository<E> {
    pub fn new() -> Self {
        Self {
            records: DashMap::new(),
            unique: DashMap::new(),
            sequence: AtomicU64::new(0),
        }
    }

    /// Claim a natural key for `id`; re-claiming one's own key is a no-op
    fn claim_key(&self, key: &str, id: &str) -> Result<()> {
        match self.unique.entry(key.to_string()) {
            Entry::Occupied(owner) if owner.get() != id => Err(FleetError::Conflict {
                kind: E::KIND,
                key: key.to_string(),
            }),
            Entry::Occupied(_) => Ok(()),
            Entry::Vacant(slot) => {
                slot.insert(id.to_string());
                Ok(())
            }
        }
    }

    fn release_key(&self, key: Option<&str>, id: &str) {
        if let Some(key) = key {
            self.unique.remove_if(key, |_, owner| owner == id);
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl<E: Entity> Default for MemoryRepository<E> {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<E: Entity> Repository<E> for MemoryRepository<E> {
    async fn find(&self, query: &E::Query) -> Result<Vec<E>> {
        let mut hits: Vec<(u64, E)> = self
            .records
            .iter()
            .filter(|entry| query.matches(&entry.value().1))
            .map(|entry| entry.value().clone())
            .collect();

        hits.sort_by_key(|(seq, _)| *seq);
        Ok(hits.into_iter().map(|(_, e)| e).collect())
    }

    async fn get(&self, id: &str) -> Result<Option<E>> {
        Ok(self.records.get(id).map(|entry| entry.value().1.clone()))
    }

    async fn create(&self, entity: E) -> Result<E> {
        if let Some(key) = entity.unique_key() {
            self.claim_key(key, entity.id())?;
        }

        let seq = self.sequence.fetch_add(1, Ordering::SeqCst);
        match self.records.entry(entity.id().to_string()) {
            Entry::Occupied(existing) => {
                if existing.get().1.unique_key() != entity.unique_key() {
                    self.release_key(entity.unique_key(), entity.id());
                }
                Err(FleetError::Database(format!(
                    "duplicate {} id {}",
                    E::KIND,
                    entity.id()
                )))
            }
            Entry::Vacant(slot) => {
                slot.insert((seq, entity.clone()));
                Ok(entity)
            }
        }
    }

    async fn update(&self, entity: E) -> Result<E> {
        let mut entry = self
            .records
            .get_mut(entity.id())
            .ok_or_else(|| FleetError::NotFound {
                kind: E::KIND,
                id: entity.id().to_string(),
            })?;

        let previous = entry.value().1.unique_key().map(str::to_string);
        if previous.as_deref() != entity.unique_key() {
            if let Some(key) = entity.unique_key() {
                self.claim_key(key, entity.id())?;
            }
            self.release_key(previous.as_deref(), entity.id());
        }

        entry.value_mut().1 = entity.clone();
        Ok(entity)
    }

    async fn delete(&self, id: &str) -> Result<()> {
        let (_, (_, removed)) = self.records.remove(id).ok_or_else(|| FleetError::NotFound {
            kind: E::KIND,
            id: id.to_string(),
        })?;
        self.release_key(removed.unique_key(), id);
        Ok(())
    }
}
