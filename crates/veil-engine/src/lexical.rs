//! Trie-backed filter sets with a per-name cache.
//!
//! Each list is decoded once and reused until a `filterLists` change
//! notification names it. A lagged notification receiver drops the whole
//! cache since changes may have been missed.

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::broadcast::{self, error::TryRecvError};
use tracing::{debug, warn};
use veil_core::{FilterList, StoreName, StoreNotification};
use veil_store::{FilterListRepository, StoreError, StoreGateway};

use crate::errors::Result;

/// Cached view of every persisted filter list.
pub struct FilterSets {
    repo: FilterListRepository,
    cache: Mutex<BTreeMap<String, Arc<FilterList>>>,
    changes: Mutex<broadcast::Receiver<StoreNotification>>,
}

impl FilterSets {
    /// Create a cache that tracks changes published by `gateway`.
    pub fn new(gateway: &StoreGateway) -> Self {
        Self {
            repo: FilterListRepository::new(gateway.clone()),
            cache: Mutex::new(BTreeMap::new()),
            changes: Mutex::new(gateway.subscribe()),
        }
    }

    /// Current lists in name order, decoding only those not cached.
    pub async fn load(&self) -> Result<Vec<Arc<FilterList>>> {
        self.invalidate_changed();
        let names = self.repo.list_names().await?;

        let missing: Vec<String> = {
            let mut cache = self.cache.lock();
            cache.retain(|name, _| names.binary_search(name).is_ok());
            names.iter().filter(|n| !cache.contains_key(*n)).cloned().collect()
        };
        for name in missing {
            match self.repo.get_list(&name).await {
                Ok(list) => {
                    debug!(list = %name, words = list.trie.len(), "filter list loaded");
                    let _ = self.cache.lock().insert(name, Arc::new(list));
                }
                Err(StoreError::NotFound { .. }) => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(self.cache.lock().values().cloned().collect())
    }

    /// First list (in the given order) with a boundary-delimited match.
    pub fn find_match(lists: &[Arc<FilterList>], text: &str) -> Option<(Arc<FilterList>, String)> {
        lists.iter().find_map(|list| {
            list.trie
                .should_filter_text_content(text)
                .triggering_word
                .map(|word| (Arc::clone(list), word))
        })
    }

    /// Number of cached lists.
    pub fn cached_len(&self) -> usize {
        self.cache.lock().len()
    }

    fn invalidate_changed(&self) {
        let mut changes = self.changes.lock();
        let mut cache = self.cache.lock();
        loop {
            match changes.try_recv() {
                Ok(note) if note.store() == StoreName::FilterLists => {
                    let _ = cache.remove(note.key());
                }
                Ok(_) => {}
                Err(TryRecvError::Lagged(missed)) => {
                    warn!(missed, "filter list notifications lagged, dropping cache");
                    cache.clear();
                }
                Err(TryRecvError::Empty | TryRecvError::Closed) => break,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn seeded() -> (StoreGateway, FilterListRepository) {
        let gateway = StoreGateway::in_memory();
        let repo = FilterListRepository::new(gateway.clone());
        let _ = repo
            .create_list("alpha", &["trigger".to_string()])
            .await
            .unwrap();
        let _ = repo
            .create_list("beta", &["spoiler".to_string(), "trigger".to_string()])
            .await
            .unwrap();
        (gateway, repo)
    }

    #[tokio::test]
    async fn first_list_in_name_order_wins() {
        let (gateway, _) = seeded().await;
        let sets = FilterSets::new(&gateway);
        let lists = sets.load().await.unwrap();
        let (list, word) = FilterSets::find_match(&lists, "this is a trigger word").unwrap();
        assert_eq!(list.list_name, "alpha");
        assert_eq!(word, "trigger");
        assert!(FilterSets::find_match(&lists, "bigger triggering concept").is_none());
    }

    #[tokio::test]
    async fn lists_are_reused_until_changed() {
        let (gateway, repo) = seeded().await;
        let sets = FilterSets::new(&gateway);
        let first = sets.load().await.unwrap();
        let again = sets.load().await.unwrap();
        assert!(Arc::ptr_eq(&first[0], &again[0]));

        let _ = repo.add_word("alpha", "ending").await.unwrap();
        let after = sets.load().await.unwrap();
        assert!(!Arc::ptr_eq(&first[0], &after[0]));
        assert!(Arc::ptr_eq(&first[1], &after[1]));
        assert!(after[0].trie.word_exists("ending"));
    }

    #[tokio::test]
    async fn deleted_lists_drop_out() {
        let (gateway, repo) = seeded().await;
        let sets = FilterSets::new(&gateway);
        assert_eq!(sets.load().await.unwrap().len(), 2);
        repo.delete_list("alpha").await.unwrap();
        let lists = sets.load().await.unwrap();
        assert_eq!(lists.len(), 1);
        assert_eq!(sets.cached_len(), 1);
        let (list, _) = FilterSets::find_match(&lists, "a trigger").unwrap();
        assert_eq!(list.list_name, "beta");
    }
}
