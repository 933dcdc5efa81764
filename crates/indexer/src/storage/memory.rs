//! In-process entity store.
//!
//! Backs the unit tests. Same atomicity contract as the SQLite store: a
//! change set is applied under one write lock.

use super::{ChangeSet, Entity, EntityKind, EntityStore, Mutation, StoredEntity};
use anyhow::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Entity store backed by a hash map.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    entities: Arc<RwLock<HashMap<(EntityKind, String), Entity>>>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Typed point lookup.
    pub async fn get<E: StoredEntity>(&self, id: &str) -> Option<E> {
        let entities = self.entities.read().await;
        entities
            .get(&(E::KIND, id.to_string()))
            .cloned()
            .and_then(E::from_entity)
    }

    /// Number of stored entities of one kind.
    pub async fn count(&self, kind: EntityKind) -> usize {
        let entities = self.entities.read().await;
        entities.keys().filter(|(k, _)| *k == kind).count()
    }

    /// All stored entities of one type, ordered by id.
    pub async fn all<E: StoredEntity>(&self) -> Vec<E> {
        let entities = self.entities.read().await;
        let mut out: Vec<E> = entities
            .iter()
            .filter(|((kind, _), _)| *kind == E::KIND)
            .filter_map(|(_, entity)| E::from_entity(entity.clone()))
            .collect();
        out.sort_by(|a, b| a.id().cmp(b.id()));
        out
    }
}

#[async_trait]
impl EntityStore for MemoryStore {
    async fn load(&self, kind: EntityKind, id: &str) -> Result<Option<Entity>> {
        let entities = self.entities.read().await;
        Ok(entities.get(&(kind, id.to_string())).cloned())
    }

    async fn commit(&self, changes: ChangeSet) -> Result<()> {
        let mut entities = self.entities.write().await;
        for mutation in changes.into_mutations() {
            match mutation {
                Mutation::Save(entity) => {
                    entities.insert((entity.kind(), entity.id().to_string()), entity);
                }
                Mutation::Remove(kind, id) => {
                    entities.remove(&(kind, id));
                }
            }
        }
        Ok(())
    }
}
