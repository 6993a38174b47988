use crate::mods::ModKey;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstallerStack<V> {
    entries: Vec<(ModKey, V)>,
}

impl<V> Default for InstallerStack<V> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
        }
    }
}

impl<V> InstallerStack<V> {
    pub fn push(&mut self, key: ModKey, value: V) {
        debug_assert!(!self.contains(&key));
        self.entries.push((key, value));
    }

    pub fn push_bottom(&mut self, key: ModKey, value: V) {
        debug_assert!(!self.contains(&key));
        self.entries.insert(0, (key, value));
    }

    pub fn remove(&mut self, key: &ModKey) -> Option<V> {
        let pos = self.entries.iter().position(|(k, _)| k == key)?;
        Some(self.entries.remove(pos).1)
    }

    pub fn contains(&self, key: &ModKey) -> bool {
        self.entries.iter().any(|(k, _)| k == key)
    }

    pub fn position(&self, key: &ModKey) -> Option<usize> {
        self.entries.iter().position(|(k, _)| k == key)
    }

    pub fn current(&self) -> Option<&(ModKey, V)> {
        self.entries.last()
    }

    pub fn previous(&self) -> Option<&(ModKey, V)> {
        self.entries.len().checked_sub(2).map(|i| &self.entries[i])
    }

    pub fn value_of(&self, key: &ModKey) -> Option<&V> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn replace_key(&mut self, old: &ModKey, new: ModKey) {
        if let Some(pos) = self.position(old) {
            self.entries[pos].0 = new;
        }
    }

    pub fn set_value(&mut self, key: &ModKey, value: V) {
        if let Some(pos) = self.position(key) {
            self.entries[pos].1 = value;
        }
    }

    pub fn installers(&self) -> impl Iterator<Item = &ModKey> {
        self.entries.iter().map(|(k, _)| k)
    }

    pub fn entries(&self) -> impl Iterator<Item = &(ModKey, V)> {
        self.entries.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn only_original_left(&self) -> bool {
        self.entries.len() == 1 && self.entries[0].0.is_original()
    }

    pub fn bottom_is_original(&self) -> bool {
        self.entries
            .first()
            .map(|(k, _)| k.is_original())
            .unwrap_or(false)
    }
}
