//! Ordered slot maps used to declare passes, resources and inputs.

use std::collections::HashMap;

use crate::graph::key::Key;

/// An ordered map from [`Key`] to an optional value. Slots can be reserved before their value is known, and
/// filled in later. Iteration follows insertion order, which is also the declaration order the compiler
/// uses to break ties.
#[derive(Debug)]
pub struct Pool<T> {
    slots: Vec<(Key, Option<T>)>,
    index: HashMap<Key, usize>,
}

impl<T> Default for Pool<T> {
    fn default() -> Self {
        Self {
            slots: Vec::new(),
            index: HashMap::new(),
        }
    }
}

impl<T> Pool<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a value, replacing and returning whatever the slot held before. A replaced slot keeps its
    /// position in the iteration order.
    pub fn insert(&mut self, key: Key, value: T) -> Option<T> {
        match self.index.get(&key) {
            Some(&slot) => self.slots[slot].1.replace(value),
            None => {
                self.index.insert(key, self.slots.len());
                self.slots.push((key, Some(value)));
                None
            }
        }
    }

    /// Reserve an empty slot. Returns `false` if the key was already present.
    pub fn reserve(&mut self, key: Key) -> bool {
        if self.index.contains_key(&key) {
            return false;
        }
        self.index.insert(key, self.slots.len());
        self.slots.push((key, None));
        true
    }

    /// Fill a previously reserved slot. Returns the value back if no slot with this key exists.
    pub fn fill(&mut self, key: Key, value: T) -> Result<Option<T>, T> {
        match self.index.get(&key) {
            Some(&slot) => Ok(self.slots[slot].1.replace(value)),
            None => Err(value),
        }
    }

    pub fn remove(&mut self, key: &Key) -> Option<T> {
        let slot = self.index.remove(key)?;
        let (_, value) = self.slots.remove(slot);
        for (_, index) in self.index.iter_mut() {
            if *index > slot {
                *index -= 1;
            }
        }
        value
    }

    pub fn contains(&self, key: &Key) -> bool {
        self.index.contains_key(key)
    }

    /// Get the value in a slot. Returns `None` for missing and for reserved-but-empty slots.
    pub fn get(&self, key: &Key) -> Option<&T> {
        self.index.get(key).and_then(|&slot| self.slots[slot].1.as_ref())
    }

    pub fn get_mut(&mut self, key: &Key) -> Option<&mut T> {
        let slot = *self.index.get(key)?;
        self.slots[slot].1.as_mut()
    }

    /// Iterate over all slots in insertion order, including empty ones.
    pub fn slots(&self) -> impl Iterator<Item = (Key, Option<&T>)> {
        self.slots.iter().map(|(key, value)| (*key, value.as_ref()))
    }

    /// Iterate over all filled slots in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (Key, &T)> {
        self.slots.iter().filter_map(|(key, value)| value.as_ref().map(|value| (*key, value)))
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}
