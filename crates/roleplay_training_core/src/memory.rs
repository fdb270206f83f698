//! crates/roleplay_training_core/src/memory.rs
//!
//! Trainer feedback accumulated per customer type, bounded per key.

use std::collections::BTreeMap;

/// Most recent entries kept per memory key.
pub const MEMORY_CAPACITY: usize = 10;

/// Reserved key whose lessons apply to every scenario.
pub const GENERAL_KEY: &str = "general";

/// Feedback strings keyed by customer type (or [`GENERAL_KEY`]).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrainingMemory {
    entries: BTreeMap<String, Vec<String>>,
}

impl TrainingMemory {
    pub fn from_entries(entries: BTreeMap<String, Vec<String>>) -> Self {
        let mut memory = Self { entries };
        for lessons in memory.entries.values_mut() {
            truncate_to_recent(lessons);
        }
        memory
    }

    /// Pushes `text` under `key`, evicting the oldest entries beyond capacity.
    pub fn append(&mut self, key: &str, text: impl Into<String>) {
        let lessons = self.entries.entry(key.to_string()).or_default();
        lessons.push(text.into());
        truncate_to_recent(lessons);
    }

    pub fn get(&self, key: &str) -> &[String] {
        self.entries.get(key).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Entries for `key` followed by the general entries.
    pub fn relevant(&self, key: &str) -> Vec<String> {
        let mut lessons = self.get(key).to_vec();
        if key != GENERAL_KEY {
            lessons.extend_from_slice(self.get(GENERAL_KEY));
        }
        lessons
    }

    pub fn is_empty(&self) -> bool {
        self.entries.values().all(Vec::is_empty)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.entries
            .iter()
            .map(|(key, lessons)| (key.as_str(), lessons.as_slice()))
    }

    pub fn as_map(&self) -> &BTreeMap<String, Vec<String>> {
        &self.entries
    }
}

fn truncate_to_recent(lessons: &mut Vec<String>) {
    if lessons.len() > MEMORY_CAPACITY {
        let excess = lessons.len() - MEMORY_CAPACITY;
        lessons.drain(..excess);
    }
}
