//! Ordered, unique-key collections of model entities
use indexmap::IndexMap;
use log::warn;

use crate::mass_model::model::ModelError;

/// Something with a stable string identifier that can be stored in a [`Registry`]
pub trait Entity {
    fn id(&self) -> &str;
}

/// Insertion ordered collection of entities keyed by their id
///
/// Iteration order is insertion order, and defines the row and column order of the
/// stoichiometric matrix. Lookup by id goes through the key index, which can go stale if ids
/// are changed through [`Registry::iter_mut`]; call [`Registry::repair`] afterward.
#[derive(Clone, Debug)]
pub struct Registry<T: Entity> {
    entries: IndexMap<String, T>,
}

impl<T: Entity> Default for Registry<T> {
    fn default() -> Self {
        Registry {
            entries: IndexMap::new(),
        }
    }
}

impl<T: Entity> Registry<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.entries.contains_key(id)
    }

    pub fn get(&self, id: &str) -> Option<&T> {
        self.entries.get(id)
    }

    pub fn get_mut(&mut self, id: &str) -> Option<&mut T> {
        self.entries.get_mut(id)
    }

    /// Position of an entity in iteration order
    pub fn index_of(&self, id: &str) -> Option<usize> {
        self.entries.get_index_of(id)
    }

    pub fn get_index(&self, index: usize) -> Option<&T> {
        self.entries.get_index(index).map(|(_, v)| v)
    }

    pub fn first(&self) -> Option<&T> {
        self.get_index(0)
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.entries.values()
    }

    /// Mutable iteration, changing an entity's id here requires a [`Registry::repair`]
    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut T> {
        self.entries.values_mut()
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(|k| k.as_str())
    }

    /// Insert an entity at the end of the registry
    ///
    /// # Returns
    /// - `Ok(())` if the entity was added
    /// - `Err(ModelError::DuplicateEntity)` if an entity with the same id already exists, in
    ///   which case the registry is unchanged
    pub fn insert(&mut self, entity: T) -> Result<(), ModelError> {
        if self.entries.contains_key(entity.id()) {
            return Err(ModelError::DuplicateEntity(entity.id().to_string()));
        }
        self.entries.insert(entity.id().to_string(), entity);
        Ok(())
    }

    /// Insert a batch of entities, skipping (and logging) any whose id is already present
    ///
    /// Returns the ids which were actually added, in order.
    pub fn insert_batch<I: IntoIterator<Item = T>>(&mut self, entities: I) -> Vec<String> {
        let mut added = Vec::new();
        for entity in entities {
            let id = entity.id().to_string();
            match self.insert(entity) {
                Ok(()) => added.push(id),
                Err(err) => warn!("{err}, skipping"),
            }
        }
        added
    }

    /// Remove an entity, preserving the order of the remaining entities
    ///
    /// Entities after the removed one shift down by one position, which is linear in their
    /// number. Swapping the last entity into the gap would be constant time but would reorder
    /// the rows or columns of the stoichiometric matrix.
    pub fn remove(&mut self, id: &str) -> Option<T> {
        self.entries.shift_remove(id)
    }

    /// Rebuild the id index from the entities' current ids
    ///
    /// If two entities now share an id the later one is dropped, and its id is returned.
    pub fn repair(&mut self) -> Vec<String> {
        let entries = std::mem::take(&mut self.entries);
        let mut dropped = Vec::new();
        for (_, entity) in entries {
            let id = entity.id().to_string();
            if self.entries.contains_key(&id) {
                warn!("Entity {id} appears more than once after repair, dropping duplicate");
                dropped.push(id);
                continue;
            }
            self.entries.insert(id, entity);
        }
        dropped
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

impl<T: Entity> FromIterator<T> for Registry<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        let mut registry = Registry::new();
        registry.insert_batch(iter);
        registry
    }
}

impl<'a, T: Entity> IntoIterator for &'a Registry<T> {
    type Item = &'a T;
    type IntoIter = indexmap::map::Values<'a, String, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.values()
    }
}
