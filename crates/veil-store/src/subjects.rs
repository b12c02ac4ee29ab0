//! Semantic subject CRUD.

use tracing::info;
use veil_core::{FilterAction, MlMethod, MlSubject, StoreName};

use crate::errors::{Result, StoreError, decode};
use crate::gateway::StoreGateway;

const STORE: StoreName = StoreName::MlSubjects;

/// Typed access to persisted subjects, keyed by description.
#[derive(Clone)]
pub struct SubjectRepository {
    gateway: StoreGateway,
}

impl SubjectRepository {
    /// Create a repository over the gateway.
    pub fn new(gateway: StoreGateway) -> Self {
        Self { gateway }
    }

    /// All subjects, sorted by description.
    pub async fn subjects(&self) -> Result<Vec<MlSubject>> {
        self.gateway
            .get_all(STORE)
            .await?
            .into_iter()
            .map(|(key, value)| decode(STORE, &key, value))
            .collect()
    }

    /// One subject by description.
    pub async fn get_subject(&self, description: &str) -> Result<MlSubject> {
        match self.gateway.get(STORE, description).await? {
            Some(value) => decode(STORE, description, value),
            None => Err(StoreError::NotFound {
                store: STORE,
                key: description.to_string(),
            }),
        }
    }

    /// Create an unpopulated subject.
    pub async fn add_subject(&self, description: &str) -> Result<MlSubject> {
        let description = clean_description(description)?;
        if self.gateway.get(STORE, &description).await?.is_some() {
            return Err(StoreError::Conflict {
                store: STORE,
                key: description,
            });
        }
        let subject = MlSubject::new(description);
        self.save_subject(&subject).await?;
        info!(subject = %subject.description, "subject created");
        Ok(subject)
    }

    /// Delete a subject. Deleting an absent subject is a no-op.
    pub async fn delete_subject(&self, description: &str) -> Result<()> {
        self.gateway.delete(STORE, description).await?;
        info!(subject = %description, "subject deleted");
        Ok(())
    }

    /// Change a subject's description, keeping keywords and embedding.
    pub async fn rename_subject(&self, old: &str, new: &str) -> Result<MlSubject> {
        let new = clean_description(new)?;
        let mut subject = self.get_subject(old).await?;
        if old == new {
            return Ok(subject);
        }
        if self.gateway.get(STORE, &new).await?.is_some() {
            return Err(StoreError::Conflict { store: STORE, key: new });
        }
        subject.description.clone_from(&new);
        self.save_subject(&subject).await?;
        self.gateway.delete(STORE, old).await?;
        Ok(subject)
    }

    /// Replace keywords; the stale embedding is dropped so it is recomputed.
    pub async fn update_keywords(&self, description: &str, keywords: Vec<String>) -> Result<MlSubject> {
        let mut subject = self.get_subject(description).await?;
        subject.set_keywords(keywords);
        self.save_subject(&subject).await?;
        Ok(subject)
    }

    /// Set or clear the per-subject action override.
    pub async fn set_subject_action(&self, description: &str, action: Option<FilterAction>) -> Result<()> {
        let mut subject = self.get_subject(description).await?;
        subject.filter_action = action;
        self.save_subject(&subject).await
    }

    /// Set or clear the per-subject classification method.
    pub async fn set_subject_method(&self, description: &str, method: Option<MlMethod>) -> Result<()> {
        let mut subject = self.get_subject(description).await?;
        subject.filter_method = method;
        self.save_subject(&subject).await
    }

    /// Persist a subject as-is (used after population).
    pub async fn save_subject(&self, subject: &MlSubject) -> Result<()> {
        let value = serde_json::to_value(subject)?;
        self.gateway.set(STORE, &subject.description, value).await
    }
}

fn clean_description(description: &str) -> Result<String> {
    let trimmed = description.trim();
    if trimmed.is_empty() {
        return Err(StoreError::InvalidInput("subject description must not be blank".into()));
    }
    Ok(trimmed.to_string())
}
