//! JSON file construct store
//!
//! One file per construct, `<construct-id>.json`, holding a versioned
//! envelope:
//!
//! ```json
//! { "metadata": { "version": 1, "written_at": "...", "checksum": "<sha256>" },
//!   "construct": { ... } }
//! ```
//!
//! Writes go to a temporary file which is synced and then renamed over the
//! record, so a crash leaves either the old or the new record. The checksum
//! covers the serialized construct and is verified on every load.
//!
//! Revision checks are serialized by an in-process lock; the directory must
//! not be shared between processes.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use retryflow_core::ConstructStore;
use retryflow_domain::constants::STORE_FORMAT_VERSION;
use retryflow_domain::{ConstructId, Result as DomainResult, RetryConstruct, RetryFlowError};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, error, instrument};

use super::error::{StoreError, StoreResult};

const RECORD_EXTENSION: &str = "json";
const TEMP_EXTENSION: &str = "tmp";

/// Envelope metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreMetadata {
    pub version: u32,
    pub written_at: DateTime<Utc>,
    pub checksum: String,
}

/// On-disk record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistedConstruct {
    pub metadata: StoreMetadata,
    pub construct: RetryConstruct,
}

pub struct FileConstructStore {
    dir: PathBuf,
    write_lock: Mutex<()>,
}

impl FileConstructStore {
    /// Open a store rooted at `dir`, creating the directory if needed
    pub async fn open(dir: impl Into<PathBuf>) -> DomainResult<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir).await.map_err(StoreError::from)?;
        debug!(dir = %dir.display(), "Opened file construct store");
        Ok(Self { dir, write_lock: Mutex::new(()) })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn record_path(&self, id: ConstructId) -> PathBuf {
        self.dir.join(format!("{id}.{RECORD_EXTENSION}"))
    }

    async fn read_record(&self, path: &Path) -> StoreResult<Option<RetryConstruct>> {
        let data = match fs::read(path).await {
            Ok(data) => data,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err.into()),
        };

        let persisted: PersistedConstruct = serde_json::from_slice(&data)?;
        if persisted.metadata.version != STORE_FORMAT_VERSION {
            return Err(StoreError::UnsupportedVersion {
                found: persisted.metadata.version,
                expected: STORE_FORMAT_VERSION,
            });
        }

        let actual = checksum(&serde_json::to_vec(&persisted.construct)?);
        if actual != persisted.metadata.checksum {
            return Err(StoreError::ChecksumMismatch { path: path.to_path_buf() });
        }
        Ok(Some(persisted.construct))
    }

    async fn write_record(&self, construct: &RetryConstruct) -> StoreResult<()> {
        let body = serde_json::to_vec(construct)?;
        let persisted = PersistedConstruct {
            metadata: StoreMetadata {
                version: STORE_FORMAT_VERSION,
                written_at: Utc::now(),
                checksum: checksum(&body),
            },
            construct: construct.clone(),
        };
        let data = serde_json::to_vec_pretty(&persisted)?;

        let path = self.record_path(construct.id());
        let temp_path = path.with_extension(TEMP_EXTENSION);

        let mut file = fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&temp_path)
            .await?;
        file.write_all(&data).await?;
        file.sync_all().await?;
        drop(file);

        fs::rename(&temp_path, &path).await?;
        debug!(
            construct_id = %construct.id(),
            revision = construct.revision(),
            bytes = data.len(),
            "Persisted construct record"
        );
        Ok(())
    }
}

#[async_trait]
impl ConstructStore for FileConstructStore {
    #[instrument(skip(self, construct), fields(construct_id = %construct.id()))]
    async fn insert(&self, construct: &RetryConstruct) -> DomainResult<()> {
        let _guard = self.write_lock.lock().await;
        if fs::try_exists(self.record_path(construct.id())).await.map_err(StoreError::from)? {
            return Err(StoreError::AlreadyExists(construct.id()).into());
        }
        Ok(self.write_record(construct).await?)
    }

    #[instrument(skip(self, construct), fields(construct_id = %construct.id()))]
    async fn save(&self, construct: &RetryConstruct, expected_revision: u64) -> DomainResult<()> {
        let _guard = self.write_lock.lock().await;
        let stored = self
            .read_record(&self.record_path(construct.id()))
            .await?
            .ok_or(StoreError::Missing(construct.id()))?;
        if stored.revision() != expected_revision {
            return Err(StoreError::RevisionConflict {
                id: construct.id(),
                expected: expected_revision,
                found: stored.revision(),
            }
            .into());
        }
        Ok(self.write_record(construct).await?)
    }

    async fn load(&self, id: ConstructId) -> DomainResult<Option<RetryConstruct>> {
        match self.read_record(&self.record_path(id)).await? {
            Some(construct) => {
                construct.validate()?;
                Ok(Some(construct))
            }
            None => Ok(None),
        }
    }

    async fn list_unfinished(&self) -> DomainResult<Vec<RetryConstruct>> {
        let mut entries = fs::read_dir(&self.dir).await.map_err(StoreError::from)?;
        let mut unfinished = Vec::new();

        while let Some(entry) = entries.next_entry().await.map_err(StoreError::from)? {
            let path = entry.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some(RECORD_EXTENSION) {
                continue;
            }
            let record = self
                .read_record(&path)
                .await
                .map_err(RetryFlowError::from)
                .and_then(|record| match record {
                    Some(construct) => construct.validate().map(|()| Some(construct)),
                    None => Ok(None),
                });
            match record {
                Ok(Some(construct)) if !construct.is_finished() => unfinished.push(construct),
                Ok(_) => {}
                Err(err) => {
                    error!(path = %path.display(), error = %err, "Skipping unreadable construct record");
                }
            }
        }

        unfinished.sort_by_key(|c| c.created_at());
        Ok(unfinished)
    }

    async fn delete(&self, id: ConstructId) -> DomainResult<bool> {
        let _guard = self.write_lock.lock().await;
        match fs::remove_file(self.record_path(id)).await {
            Ok(()) => Ok(true),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(err) => Err(StoreError::from(err).into()),
        }
    }
}

fn checksum(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}
