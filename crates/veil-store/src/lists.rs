//! Filter list CRUD.

use tracing::info;
use veil_core::{FilterAction, FilterList, StoreName};

use crate::errors::{Result, StoreError, decode};
use crate::gateway::StoreGateway;

const STORE: StoreName = StoreName::FilterLists;

/// Typed access to persisted filter lists, keyed by list name.
#[derive(Clone)]
pub struct FilterListRepository {
    gateway: StoreGateway,
}

impl FilterListRepository {
    /// Create a repository over the gateway.
    pub fn new(gateway: StoreGateway) -> Self {
        Self { gateway }
    }

    /// Names of all lists, sorted.
    pub async fn list_names(&self) -> Result<Vec<String>> {
        Ok(self.gateway.get_all(STORE).await?.into_keys().collect())
    }

    /// All lists, sorted by name.
    pub async fn lists(&self) -> Result<Vec<FilterList>> {
        self.gateway
            .get_all(STORE)
            .await?
            .into_iter()
            .map(|(key, value)| decode(STORE, &key, value))
            .collect()
    }

    /// One list by name.
    pub async fn get_list(&self, name: &str) -> Result<FilterList> {
        match self.gateway.get(STORE, name).await? {
            Some(value) => decode(STORE, name, value),
            None => Err(StoreError::NotFound {
                store: STORE,
                key: name.to_string(),
            }),
        }
    }

    /// Words of one list, sorted.
    pub async fn words(&self, name: &str) -> Result<Vec<String>> {
        Ok(self.get_list(name).await?.trie.words())
    }

    /// Create a new list from a word array.
    pub async fn create_list(&self, name: &str, words: &[String]) -> Result<FilterList> {
        let name = clean_name(name)?;
        if self.gateway.get(STORE, &name).await?.is_some() {
            return Err(StoreError::Conflict { store: STORE, key: name });
        }
        let list = FilterList::new(name.clone(), words);
        self.save(&list).await?;
        info!(list = %name, words = list.trie.len(), "filter list created");
        Ok(list)
    }

    /// Delete a list. Deleting an absent list is a no-op.
    pub async fn delete_list(&self, name: &str) -> Result<()> {
        self.gateway.delete(STORE, name).await?;
        info!(list = %name, "filter list deleted");
        Ok(())
    }

    /// Rename a list, keeping its words and action override.
    pub async fn rename_list(&self, old: &str, new: &str) -> Result<FilterList> {
        let new = clean_name(new)?;
        let mut list = self.get_list(old).await?;
        if old == new {
            return Ok(list);
        }
        if self.gateway.get(STORE, &new).await?.is_some() {
            return Err(StoreError::Conflict { store: STORE, key: new });
        }
        list.list_name.clone_from(&new);
        self.save(&list).await?;
        self.gateway.delete(STORE, old).await?;
        info!(from = %old, to = %new, "filter list renamed");
        Ok(list)
    }

    /// Add one word. Returns `false` if it was blank or already present.
    pub async fn add_word(&self, name: &str, word: &str) -> Result<bool> {
        let mut list = self.get_list(name).await?;
        let added = list.trie.add_word(word);
        if added {
            self.save(&list).await?;
        }
        Ok(added)
    }

    /// Remove one word. Returns `false` if it was not present.
    pub async fn remove_word(&self, name: &str, word: &str) -> Result<bool> {
        let mut list = self.get_list(name).await?;
        let removed = list.trie.remove_word(word);
        if removed {
            self.save(&list).await?;
        }
        Ok(removed)
    }

    /// Replace the entire word set of a list.
    pub async fn replace_words(&self, name: &str, words: &[String]) -> Result<FilterList> {
        let existing = self.get_list(name).await?;
        let mut list = FilterList::new(existing.list_name, words);
        list.filter_action = existing.filter_action;
        self.save(&list).await?;
        Ok(list)
    }

    /// Set or clear the per-list action override.
    pub async fn set_list_action(&self, name: &str, action: Option<FilterAction>) -> Result<()> {
        let mut list = self.get_list(name).await?;
        list.filter_action = action;
        self.save(&list).await
    }

    async fn save(&self, list: &FilterList) -> Result<()> {
        let value = serde_json::to_value(list)?;
        self.gateway.set(STORE, &list.list_name, value).await
    }
}

fn clean_name(name: &str) -> Result<String> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(StoreError::InvalidInput("list name must not be blank".into()));
    }
    Ok(trimmed.to_string())
}
