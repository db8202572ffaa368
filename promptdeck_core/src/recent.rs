use crate::catalog::PromptRecord;
use crate::store::{KeyValueStore, RECENT_PROMPTS_KEY};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

pub const MAX_RECENT_PROMPTS: usize = 6;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RecentEntry {
    #[serde(flatten)]
    pub prompt: PromptRecord,
    pub last_used: DateTime<Utc>,
}

/// Bounded most-recently-used list of prompts, newest first.
pub struct RecentPrompts {
    store: Arc<dyn KeyValueStore>,
    entries: Vec<RecentEntry>,
}

impl RecentPrompts {
    /// Reads the persisted list. Unreadable or corrupt storage yields an
    /// empty list.
    pub fn load(store: Arc<dyn KeyValueStore>) -> Self {
        let entries = match store.get(RECENT_PROMPTS_KEY) {
            Ok(Some(raw)) => match serde_json::from_str::<Vec<RecentEntry>>(&raw) {
                Ok(entries) => normalize(entries),
                Err(err) => {
                    tracing::warn!("Ignoring corrupt recent prompts: {}", err);
                    Vec::new()
                }
            },
            Ok(None) => Vec::new(),
            Err(err) => {
                tracing::warn!("Recent prompts unavailable: {}", err);
                Vec::new()
            }
        };
        Self { store, entries }
    }

    pub fn entries(&self) -> &[RecentEntry] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The recent-prompts section is hidden entirely when there is nothing to show.
    pub fn is_visible(&self) -> bool {
        !self.entries.is_empty()
    }

    pub fn record(&mut self, prompt: &PromptRecord) {
        self.record_at(prompt, Utc::now());
    }

    pub fn record_at(&mut self, prompt: &PromptRecord, used_at: DateTime<Utc>) {
        self.entries.retain(|e| e.prompt.id != prompt.id);
        self.entries.insert(
            0,
            RecentEntry {
                prompt: prompt.clone(),
                last_used: used_at,
            },
        );
        self.entries.truncate(MAX_RECENT_PROMPTS);
        self.persist();
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.persist();
    }

    fn persist(&self) {
        let raw = match serde_json::to_string(&self.entries) {
            Ok(raw) => raw,
            Err(err) => {
                tracing::warn!("Failed to serialize recent prompts: {}", err);
                return;
            }
        };
        if let Err(err) = self.store.set(RECENT_PROMPTS_KEY, &raw) {
            tracing::warn!("Failed to persist recent prompts: {}", err);
        }
    }
}

// Stored data may have been edited by hand; restore the ordering and bound.
fn normalize(mut entries: Vec<RecentEntry>) -> Vec<RecentEntry> {
    entries.sort_by(|a, b| b.last_used.cmp(&a.last_used));
    let mut seen = std::collections::HashSet::new();
    entries.retain(|e| seen.insert(e.prompt.id));
    entries.truncate(MAX_RECENT_PROMPTS);
    entries
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::Catalog;
    use crate::store::{MemoryStore, StoreError};
    use chrono::Duration;

    struct BrokenStore;

    impl KeyValueStore for BrokenStore {
        fn get(&self, _key: &str) -> Result<Option<String>, StoreError> {
            Err(StoreError::Unavailable)
        }
        fn set(&self, _key: &str, _value: &str) -> Result<(), StoreError> {
            Err(StoreError::Unavailable)
        }
        fn remove(&self, _key: &str) -> Result<(), StoreError> {
            Err(StoreError::Unavailable)
        }
    }

    fn base_time() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2026-03-01T09:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    #[test]
    fn record_keeps_six_unique_entries_newest_first() {
        let catalog = Catalog::builtin().unwrap();
        let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
        let mut recent = RecentPrompts::load(store.clone());

        let sequence = [1u32, 2, 3, 1, 4, 5, 6, 7, 8, 3, 3];
        for (step, id) in sequence.iter().enumerate() {
            let prompt = catalog.get(*id).unwrap();
            recent.record_at(prompt, base_time() + Duration::seconds(step as i64));
        }

        let ids: Vec<u32> = recent.entries().iter().map(|e| e.prompt.id).collect();
        assert_eq!(ids, vec![3, 8, 7, 6, 5, 4]);
        assert!(recent
            .entries()
            .windows(2)
            .all(|w| w[0].last_used >= w[1].last_used));

        let reloaded = RecentPrompts::load(store);
        assert_eq!(reloaded.entries(), recent.entries());
    }

    #[test]
    fn recording_same_prompt_twice_keeps_later_timestamp() {
        let catalog = Catalog::builtin().unwrap();
        let mut recent = RecentPrompts::load(Arc::new(MemoryStore::new()));
        let prompt = catalog.get(5).unwrap();

        recent.record_at(prompt, base_time());
        recent.record_at(prompt, base_time() + Duration::minutes(3));

        assert_eq!(recent.entries().len(), 1);
        assert_eq!(
            recent.entries()[0].last_used,
            base_time() + Duration::minutes(3)
        );
    }

    #[test]
    fn clear_empties_and_hides_section() {
        let catalog = Catalog::builtin().unwrap();
        let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
        let mut recent = RecentPrompts::load(store.clone());
        recent.record(catalog.get(1).unwrap());
        assert!(recent.is_visible());

        recent.clear();
        assert!(recent.is_empty());
        assert!(!recent.is_visible());
        assert_eq!(
            store.get(RECENT_PROMPTS_KEY).unwrap().as_deref(),
            Some("[]")
        );

        recent.clear();
        assert!(!recent.is_visible());
    }

    #[test]
    fn unavailable_storage_degrades_to_memory_only() {
        let catalog = Catalog::builtin().unwrap();
        let mut recent = RecentPrompts::load(Arc::new(BrokenStore));
        assert!(recent.is_empty());

        recent.record(catalog.get(2).unwrap());
        assert_eq!(recent.entries()[0].prompt.id, 2);
    }

    #[test]
    fn corrupt_storage_is_treated_as_empty() {
        let store = MemoryStore::new();
        store.set(RECENT_PROMPTS_KEY, "{not json").unwrap();
        let recent = RecentPrompts::load(Arc::new(store));
        assert!(recent.is_empty());
    }

    #[test]
    fn stored_entries_use_camel_case_last_used() {
        let catalog = Catalog::builtin().unwrap();
        let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
        let mut recent = RecentPrompts::load(store.clone());
        recent.record_at(catalog.get(1).unwrap(), base_time());

        let raw = store.get(RECENT_PROMPTS_KEY).unwrap().unwrap();
        let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(value[0]["id"], 1);
        assert!(value[0]["lastUsed"].is_string());
    }
}
