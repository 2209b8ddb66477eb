use std::collections::BTreeSet;

use crate::entity::EntityId;

/// Entities touched during the current tick, each recorded once and
/// traversed in ascending id order.
#[derive(Debug, Clone, Default)]
pub struct ChangedSet {
    ids: BTreeSet<EntityId>,
}

impl ChangedSet {
    /// Returns false if the id was already recorded this tick.
    pub fn insert(&mut self, id: EntityId) -> bool {
        self.ids.insert(id)
    }

    pub fn remove(&mut self, id: EntityId) -> bool {
        self.ids.remove(&id)
    }

    pub fn contains(&self, id: EntityId) -> bool {
        self.ids.contains(&id)
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = EntityId> + '_ {
        self.ids.iter().copied()
    }

    pub fn clear(&mut self) {
        self.ids.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_is_idempotent_and_ordered() {
        let mut set = ChangedSet::default();
        assert!(set.insert(EntityId(4)));
        assert!(set.insert(EntityId(1)));
        assert!(!set.insert(EntityId(4)));

        assert_eq!(set.len(), 2);
        assert_eq!(set.iter().collect::<Vec<_>>(), vec![EntityId(1), EntityId(4)]);
    }

    #[test]
    fn remove_and_clear() {
        let mut set = ChangedSet::default();
        set.insert(EntityId(2));
        assert!(set.remove(EntityId(2)));
        assert!(!set.remove(EntityId(2)));

        set.insert(EntityId(3));
        set.clear();
        assert!(set.is_empty());
    }
}
