//! # Entity Registry
//!
//! Set of tracked entities keyed by [`EntityId`]. Iteration is id-ordered so
//! capture, broad-phase and restore always visit entities in the same order.

use std::collections::BTreeMap;

use tracing::debug;

use crate::entity::{EntityId, TrackedEntity};

/// Owns every entity the coordinator captures and rewinds.
#[derive(Debug, Default)]
pub struct EntityRegistry {
    entities: BTreeMap<EntityId, TrackedEntity>,
}

impl EntityRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `entity`. Returns false and drops it if the id is already present.
    pub fn insert(&mut self, entity: TrackedEntity) -> bool {
        let id = entity.id();
        if self.entities.contains_key(&id) {
            debug!(entity = %id, "already registered");
            return false;
        }
        self.entities.insert(id, entity);
        true
    }

    /// Removes and returns the entity, restoring it first if rewound.
    pub fn remove(&mut self, id: EntityId) -> Option<TrackedEntity> {
        let mut entity = self.entities.remove(&id)?;
        if entity.restore() {
            debug!(entity = %id, "restored on removal");
        }
        Some(entity)
    }

    /// Entity by id.
    #[must_use]
    pub fn get(&self, id: EntityId) -> Option<&TrackedEntity> {
        self.entities.get(&id)
    }

    /// Mutable entity by id.
    #[must_use]
    pub fn get_mut(&mut self, id: EntityId) -> Option<&mut TrackedEntity> {
        self.entities.get_mut(&id)
    }

    /// True if `id` is registered.
    #[must_use]
    pub fn contains(&self, id: EntityId) -> bool {
        self.entities.contains_key(&id)
    }

    /// Number of entities.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    /// True when empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Entities in id order.
    pub fn iter(&self) -> impl Iterator<Item = &TrackedEntity> {
        self.entities.values()
    }

    /// Mutable entities in id order.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut TrackedEntity> {
        self.entities.values_mut()
    }

    /// Registered ids in order.
    pub fn ids(&self) -> impl Iterator<Item = EntityId> + '_ {
        self.entities.keys().copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RewindConfig;
    use crate::entity::TrackedEntityBuilder;
    use crate::snapshot::RewindTarget;

    fn tracked(id: u64) -> TrackedEntity {
        TrackedEntityBuilder::new(EntityId::new(id)).build(&RewindConfig::default())
    }

    #[test]
    fn test_insert_is_set_like() {
        let mut registry = EntityRegistry::new();
        assert!(registry.insert(tracked(1)));
        assert!(!registry.insert(tracked(1)));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_iteration_is_id_ordered() {
        let mut registry = EntityRegistry::new();
        for id in [5, 1, 3] {
            registry.insert(tracked(id));
        }
        let ids: Vec<u64> = registry.ids().map(EntityId::raw).collect();
        assert_eq!(ids, vec![1, 3, 5]);
    }

    #[test]
    fn test_remove_missing_is_noop() {
        let mut registry = EntityRegistry::new();
        assert!(registry.remove(EntityId::new(4)).is_none());
    }

    #[test]
    fn test_remove_restores_rewound() {
        let mut registry = EntityRegistry::new();
        let mut entity = tracked(2);
        for frame in 1..=5 {
            entity.capture(frame).unwrap();
        }
        assert!(entity.rewind(RewindTarget::Frame(3), 5));
        registry.insert(entity);

        let removed = registry.remove(EntityId::new(2)).unwrap();
        assert!(!removed.is_rewound());
    }
}
