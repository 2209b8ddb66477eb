/// Fixed-capacity sparse storage addressed by slot index.
///
/// `free_hint` always names the lowest unoccupied slot, or the capacity when
/// every slot is taken.
#[derive(Debug, Clone)]
pub struct SlotTable<T> {
    slots: Vec<Option<T>>,
    free_hint: usize,
    active: usize,
}

impl<T> SlotTable<T> {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            slots: (0..capacity).map(|_| None).collect(),
            free_hint: 0,
            active: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn len(&self) -> usize {
        self.active
    }

    pub fn is_empty(&self) -> bool {
        self.active == 0
    }

    pub fn is_full(&self) -> bool {
        self.free_hint >= self.slots.len()
    }

    pub fn free_hint(&self) -> usize {
        self.free_hint
    }

    /// Fills the lowest free slot with the value built from its index.
    pub fn insert_with(&mut self, build: impl FnOnce(usize) -> T) -> Option<usize> {
        let index = self.free_hint;
        let slot = self.slots.get_mut(index)?;
        *slot = Some(build(index));
        self.active += 1;
        self.free_hint = self.scan_free(index + 1);
        Some(index)
    }

    /// Fills a specific slot. Hands the value back if the slot is taken or
    /// out of range.
    pub fn insert_at(&mut self, index: usize, value: T) -> Result<(), T> {
        match self.slots.get_mut(index) {
            Some(slot) if slot.is_none() => {
                *slot = Some(value);
                self.active += 1;
                if index == self.free_hint {
                    self.free_hint = self.scan_free(index + 1);
                }
                Ok(())
            }
            _ => Err(value),
        }
    }

    pub fn remove(&mut self, index: usize) -> Option<T> {
        let value = self.slots.get_mut(index)?.take()?;
        self.active -= 1;
        if index < self.free_hint {
            self.free_hint = index;
        }
        Some(value)
    }

    pub fn get(&self, index: usize) -> Option<&T> {
        self.slots.get(index)?.as_ref()
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut T> {
        self.slots.get_mut(index)?.as_mut()
    }

    pub fn contains(&self, index: usize) -> bool {
        self.get(index).is_some()
    }

    /// Occupied slots in index order. Stops once every occupied slot has
    /// been yielded.
    pub fn iter(&self) -> impl Iterator<Item = (usize, &T)> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(index, slot)| slot.as_ref().map(|value| (index, value)))
            .take(self.active)
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (usize, &mut T)> {
        let active = self.active;
        self.slots
            .iter_mut()
            .enumerate()
            .filter_map(|(index, slot)| slot.as_mut().map(|value| (index, value)))
            .take(active)
    }

    pub fn clear(&mut self) {
        self.slots.iter_mut().for_each(|slot| *slot = None);
        self.free_hint = 0;
        self.active = 0;
    }

    fn scan_free(&self, from: usize) -> usize {
        (from..self.slots.len())
            .find(|&index| self.slots[index].is_none())
            .unwrap_or(self.slots.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inserts_fill_lowest_free_slot() {
        let mut table = SlotTable::with_capacity(4);
        assert_eq!(table.insert_with(|i| i * 10), Some(0));
        assert_eq!(table.insert_with(|i| i * 10), Some(1));
        assert_eq!(table.insert_with(|i| i * 10), Some(2));

        table.remove(0);
        assert_eq!(table.free_hint(), 0);
        assert_eq!(table.insert_with(|i| i * 10), Some(0));
        assert_eq!(table.free_hint(), 3);
        assert_eq!(table.get(1), Some(&10));
    }

    #[test]
    fn hint_skips_occupied_slots_after_reuse() {
        let mut table = SlotTable::with_capacity(4);
        for _ in 0..4 {
            table.insert_with(|i| i);
        }
        table.remove(3);
        table.remove(1);

        assert_eq!(table.insert_with(|i| i), Some(1));
        assert_eq!(table.insert_with(|i| i), Some(3));
        assert!(table.is_full());
        assert_eq!(table.insert_with(|i| i), None);
    }

    #[test]
    fn insert_at_keeps_hint_lowest() {
        let mut table = SlotTable::with_capacity(3);
        assert!(table.insert_at(0, 'a').is_ok());
        assert_eq!(table.free_hint(), 1);
        assert!(table.insert_at(2, 'c').is_ok());
        assert_eq!(table.free_hint(), 1);
        assert_eq!(table.insert_at(2, 'x'), Err('x'));
        assert_eq!(table.insert_at(9, 'y'), Err('y'));
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn iteration_visits_each_occupied_slot_once() {
        let mut table = SlotTable::with_capacity(8);
        table.insert_at(1, "one").unwrap();
        table.insert_at(5, "five").unwrap();

        let seen: Vec<_> = table.iter().collect();
        assert_eq!(seen, vec![(1, &"one"), (5, &"five")]);
    }

    #[test]
    fn removing_empty_slot_is_noop() {
        let mut table: SlotTable<u8> = SlotTable::with_capacity(2);
        assert_eq!(table.remove(1), None);
        assert_eq!(table.remove(7), None);
        assert!(table.is_empty());
    }
}
