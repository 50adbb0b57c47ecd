//! Process-local construct store
//!
//! Records survive a `RetryService` being dropped and rebuilt, but not the
//! process exiting.

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::RwLock;
use retryflow_core::ConstructStore;
use retryflow_domain::{ConstructId, Result as DomainResult, RetryConstruct};
use tracing::error;

use super::error::StoreError;

#[derive(Debug, Default)]
pub struct InMemoryConstructStore {
    records: RwLock<HashMap<ConstructId, RetryConstruct>>,
}

impl InMemoryConstructStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }
}

#[async_trait]
impl ConstructStore for InMemoryConstructStore {
    async fn insert(&self, construct: &RetryConstruct) -> DomainResult<()> {
        let mut records = self.records.write();
        if records.contains_key(&construct.id()) {
            return Err(StoreError::AlreadyExists(construct.id()).into());
        }
        records.insert(construct.id(), construct.clone());
        Ok(())
    }

    async fn save(&self, construct: &RetryConstruct, expected_revision: u64) -> DomainResult<()> {
        let mut records = self.records.write();
        let stored =
            records.get_mut(&construct.id()).ok_or(StoreError::Missing(construct.id()))?;
        if stored.revision() != expected_revision {
            return Err(StoreError::RevisionConflict {
                id: construct.id(),
                expected: expected_revision,
                found: stored.revision(),
            }
            .into());
        }
        *stored = construct.clone();
        Ok(())
    }

    async fn load(&self, id: ConstructId) -> DomainResult<Option<RetryConstruct>> {
        let construct = self.records.read().get(&id).cloned();
        if let Some(construct) = &construct {
            construct.validate()?;
        }
        Ok(construct)
    }

    async fn list_unfinished(&self) -> DomainResult<Vec<RetryConstruct>> {
        let mut unfinished: Vec<_> = self
            .records
            .read()
            .values()
            .filter(|c| !c.is_finished())
            .filter(|c| match c.validate() {
                Ok(()) => true,
                Err(err) => {
                    error!(
                        construct_id = %c.id(),
                        error = %err,
                        "Skipping inconsistent construct record"
                    );
                    false
                }
            })
            .cloned()
            .collect();
        unfinished.sort_by_key(|c| c.created_at());
        Ok(unfinished)
    }

    async fn delete(&self, id: ConstructId) -> DomainResult<bool> {
        Ok(self.records.write().remove(&id).is_some())
    }
}
