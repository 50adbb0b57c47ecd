//! In-memory mock for `ConstructStore`

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::Mutex;
use retryflow_core::ConstructStore;
use retryflow_domain::{ConstructId, Result as DomainResult, RetryConstruct, RetryFlowError};

#[derive(Default)]
pub struct MockConstructStore {
    records: Mutex<HashMap<ConstructId, RetryConstruct>>,
}

impl MockConstructStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    /// Id of the single stored record
    pub fn only_id(&self) -> ConstructId {
        let records = self.records.lock();
        assert_eq!(records.len(), 1, "expected exactly one record");
        *records.keys().next().unwrap()
    }

    pub fn get(&self, id: ConstructId) -> Option<RetryConstruct> {
        self.records.lock().get(&id).cloned()
    }
}

#[async_trait]
impl ConstructStore for MockConstructStore {
    async fn insert(&self, construct: &RetryConstruct) -> DomainResult<()> {
        let mut records = self.records.lock();
        if records.contains_key(&construct.id()) {
            return Err(RetryFlowError::Conflict(format!("{} already exists", construct.id())));
        }
        records.insert(construct.id(), construct.clone());
        Ok(())
    }

    async fn save(&self, construct: &RetryConstruct, expected_revision: u64) -> DomainResult<()> {
        let mut records = self.records.lock();
        let stored = records
            .get_mut(&construct.id())
            .ok_or_else(|| RetryFlowError::NotFound(construct.id().to_string()))?;
        if stored.revision() != expected_revision {
            return Err(RetryFlowError::Conflict(format!(
                "expected revision {expected_revision}, found {}",
                stored.revision()
            )));
        }
        *stored = construct.clone();
        Ok(())
    }

    async fn load(&self, id: ConstructId) -> DomainResult<Option<RetryConstruct>> {
        let snapshot = self.records.lock().get(&id).cloned();
        // Let concurrent callers read the same revision before anyone saves
        tokio::task::yield_now().await;
        Ok(snapshot)
    }

    async fn list_unfinished(&self) -> DomainResult<Vec<RetryConstruct>> {
        Ok(self.records.lock().values().filter(|c| !c.is_finished()).cloned().collect())
    }

    async fn delete(&self, id: ConstructId) -> DomainResult<bool> {
        Ok(self.records.lock().remove(&id).is_some())
    }
}
