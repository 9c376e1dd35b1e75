use crate::config::{CheckpointBackend, CheckpointConfig};
use crate::{Error, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, instrument};

/// Last committed position of one worker of one source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub source: String,
    pub worker: usize,
    pub cursor: String,
    pub records_processed: u64,
    pub updated_at: DateTime<Utc>,
}

impl Checkpoint {
    pub fn new(source: impl Into<String>, worker: usize) -> Self {
        Self {
            source: source.into(),
            worker,
            cursor: String::new(),
            records_processed: 0,
            updated_at: Utc::now(),
        }
    }

    fn key(source: &str, worker: usize) -> String {
        format!("{}/{}", source, worker)
    }
}

#[async_trait]
pub trait CheckpointStore: Send + Sync {
    async fn get_checkpoint(&self, source: &str, worker: usize) -> Result<Option<Checkpoint>>;

    async fn save_checkpoint(&self, checkpoint: &Checkpoint) -> Result<()>;
}

pub fn open(config: &CheckpointConfig) -> Arc<dyn CheckpointStore> {
    match config.backend {
        CheckpointBackend::Memory => Arc::new(MemoryCheckpointStore::default()),
        CheckpointBackend::File => Arc::new(FileCheckpointStore::new(config.path.clone())),
    }
}

#[derive(Debug, Default)]
pub struct MemoryCheckpointStore {
    checkpoints: Mutex<BTreeMap<String, Checkpoint>>,
}

#[async_trait]
impl CheckpointStore for MemoryCheckpointStore {
    async fn get_checkpoint(&self, source: &str, worker: usize) -> Result<Option<Checkpoint>> {
        let checkpoints = self.checkpoints.lock().await;
        Ok(checkpoints.get(&Checkpoint::key(source, worker)).cloned())
    }

    async fn save_checkpoint(&self, checkpoint: &Checkpoint) -> Result<()> {
        let mut checkpoints = self.checkpoints.lock().await;
        checkpoints.insert(
            Checkpoint::key(&checkpoint.source, checkpoint.worker),
            checkpoint.clone(),
        );
        Ok(())
    }
}

/// Keeps every checkpoint in one JSON document, rewritten through a
/// temporary file and rename on each save.
#[derive(Debug)]
pub struct FileCheckpointStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileCheckpointStore {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            lock: Mutex::new(()),
        }
    }

    async fn read_all(&self) -> Result<BTreeMap<String, Checkpoint>> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) if bytes.is_empty() => Ok(BTreeMap::new()),
            Ok(bytes) => serde_json::from_slice(&bytes).map_err(|e| {
                Error::Checkpoint(format!(
                    "corrupt checkpoint file {}: {}",
                    self.path.display(),
                    e
                ))
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(BTreeMap::new()),
            Err(e) => Err(Error::Checkpoint(format!(
                "unable to read {}: {}",
                self.path.display(),
                e
            ))),
        }
    }
}

#[async_trait]
impl CheckpointStore for FileCheckpointStore {
    async fn get_checkpoint(&self, source: &str, worker: usize) -> Result<Option<Checkpoint>> {
        let _guard = self.lock.lock().await;
        let mut checkpoints = self.read_all().await?;
        Ok(checkpoints.remove(&Checkpoint::key(source, worker)))
    }

    #[instrument(skip(self, checkpoint), fields(source = %checkpoint.source, worker = checkpoint.worker))]
    async fn save_checkpoint(&self, checkpoint: &Checkpoint) -> Result<()> {
        let _guard = self.lock.lock().await;
        let mut checkpoints = self.read_all().await?;
        checkpoints.insert(
            Checkpoint::key(&checkpoint.source, checkpoint.worker),
            checkpoint.clone(),
        );

        let body = serde_json::to_vec_pretty(&checkpoints)?;
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, body)
            .await
            .map_err(|e| Error::Checkpoint(format!("unable to write {}: {}", tmp.display(), e)))?;
        tokio::fs::rename(&tmp, &self.path).await.map_err(|e| {
            Error::Checkpoint(format!("unable to replace {}: {}", self.path.display(), e))
        })?;

        debug!(cursor = %checkpoint.cursor, "Checkpoint saved");
        Ok(())
    }
}
