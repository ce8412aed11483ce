//! Ordered, deduplicated rule storage.
//!
//! Insertion order is the training order and doubles as replay priority.
//! The only mutations are `add` (which may fold new evidence into an existing
//! rule) and removal; the store has no interior locking, so a store shared
//! across threads needs a single writer.

use std::collections::HashMap;

use crate::types::StackDescriptor;

/// An ordered mapping from rule id to descriptor.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RuleStore {
    rules: Vec<StackDescriptor>,
    index: HashMap<String, usize>,
}

impl RuleStore {
    /// Create a new empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a descriptor. Returns `true` if it was new.
    ///
    /// When a descriptor with the same id already exists, it keeps its place
    /// and content; only unseen samples and positions are appended to it.
    pub fn add(&mut self, descriptor: StackDescriptor) -> bool {
        if let Some(&i) = self.index.get(&descriptor.id) {
            let existing = &mut self.rules[i];
            for sample in descriptor.samples {
                if !existing.samples.contains(&sample) {
                    existing.samples.push(sample);
                }
            }
            for position in descriptor.positions {
                if !existing.positions.contains(&position) {
                    existing.positions.push(position);
                }
            }
            for position in descriptor.sibling_positions {
                if !existing.sibling_positions.contains(&position) {
                    existing.sibling_positions.push(position);
                }
            }
            return false;
        }

        self.index.insert(descriptor.id.clone(), self.rules.len());
        self.rules.push(descriptor);
        true
    }

    /// Add every descriptor in order. Returns how many were new.
    pub fn add_all(&mut self, descriptors: impl IntoIterator<Item = StackDescriptor>) -> usize {
        let mut added = 0;
        for descriptor in descriptors {
            if self.add(descriptor) {
                added += 1;
            }
        }
        added
    }

    /// Union another store into this one, keeping this store's order and
    /// appending unseen rules at the end.
    pub fn merge(&mut self, other: &RuleStore) -> usize {
        self.add_all(other.rules.iter().cloned())
    }

    /// Remove a rule by id.
    pub fn remove(&mut self, id: &str) -> Option<StackDescriptor> {
        let i = self.index.remove(id)?;
        let removed = self.rules.remove(i);
        self.reindex();
        Some(removed)
    }

    /// Remove every rule for which `keep` returns false.
    pub fn retain(&mut self, mut keep: impl FnMut(&StackDescriptor) -> bool) -> usize {
        let before = self.rules.len();
        self.rules.retain(|d| keep(d));
        self.reindex();
        before - self.rules.len()
    }

    pub fn get(&self, id: &str) -> Option<&StackDescriptor> {
        self.index.get(id).map(|&i| &self.rules[i])
    }

    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    /// All rules in insertion order.
    pub fn all(&self) -> &[StackDescriptor] {
        &self.rules
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.rules.iter().map(|d| d.id.as_str())
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn clear(&mut self) {
        self.rules.clear();
        self.index.clear();
    }

    pub fn into_descriptors(self) -> Vec<StackDescriptor> {
        self.rules
    }

    fn reindex(&mut self) {
        self.index = self
            .rules
            .iter()
            .enumerate()
            .map(|(i, d)| (d.id.clone(), i))
            .collect();
    }
}

impl FromIterator<StackDescriptor> for RuleStore {
    fn from_iter<I: IntoIterator<Item = StackDescriptor>>(iter: I) -> Self {
        let mut store = RuleStore::new();
        store.add_all(iter);
        store
    }
}

impl<'a> IntoIterator for &'a RuleStore {
    type Item = &'a StackDescriptor;
    type IntoIter = std::slice::Iter<'a, StackDescriptor>;

    fn into_iter(self) -> Self::IntoIter {
        self.rules.iter()
    }
}
