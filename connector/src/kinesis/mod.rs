//! Kinesis Data Streams as a [`Source`]: one worker per shard.

pub mod catalog;
pub mod client;
pub mod settings;

#[cfg(test)]
pub(crate) mod testing;

use async_trait::async_trait;
use bytes::Bytes;
use futures::future::BoxFuture;
use futures::FutureExt;
use source_core::{Error, Records, Registry, Result, Source, SourceType};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument};

pub use catalog::{ShardCatalog, ShardDescriptor};
pub use client::SdkKinesisClient;
pub use settings::KinesisSettings;

pub const SOURCE_TYPE: &str = "awskinesis";

/// Where a shard iterator starts reading.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StartPosition {
    /// Oldest record still retained by the stream
    TrimHorizon,
    /// Record immediately after the given sequence number
    AfterSequenceNumber(String),
}

impl StartPosition {
    pub fn from_cursor(cursor: &str) -> Self {
        if cursor.is_empty() {
            StartPosition::TrimHorizon
        } else {
            StartPosition::AfterSequenceNumber(cursor.to_string())
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamRecord {
    pub data: Bytes,
    pub sequence_number: String,
}

/// The three Kinesis calls the source is built on.
#[async_trait]
pub trait KinesisApi: Send + Sync {
    /// Ids of every shard of the stream, in whatever order the service reports them.
    async fn describe_stream_shards(&self, stream_name: &str) -> anyhow::Result<Vec<String>>;

    async fn get_shard_iterator(
        &self,
        stream_name: &str,
        shard_id: &str,
        position: &StartPosition,
    ) -> anyhow::Result<String>;

    async fn get_records(
        &self,
        shard_iterator: &str,
        limit: Option<i32>,
    ) -> anyhow::Result<Vec<StreamRecord>>;
}

/// A loaded Kinesis source.
///
/// Holds no read position: every fetch acquires a fresh shard iterator from
/// the cursor it is given, so workers can share one instance freely.
pub struct AwsKinesis {
    settings: KinesisSettings,
    catalog: ShardCatalog,
    client: Arc<dyn KinesisApi>,
}

impl std::fmt::Debug for AwsKinesis {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AwsKinesis")
            .field("settings", &self.settings)
            .field("catalog", &self.catalog)
            .finish_non_exhaustive()
    }
}

impl AwsKinesis {
    /// Discover the stream's shards through `client`.
    ///
    /// A failed discovery yields no source at all.
    pub async fn connect(settings: KinesisSettings, client: Arc<dyn KinesisApi>) -> Result<Self> {
        let catalog = ShardCatalog::discover(client.as_ref(), &settings.stream_name).await?;

        Ok(Self {
            settings,
            catalog,
            client,
        })
    }

    pub fn settings(&self) -> &KinesisSettings {
        &self.settings
    }

    pub fn catalog(&self) -> &ShardCatalog {
        &self.catalog
    }

    #[instrument(skip(self, shard), fields(stream = %self.settings.stream_name, shard_id = %shard.shard_id))]
    async fn fetch_batch(&self, shard: &ShardDescriptor, last_sequence: &str) -> Result<Records> {
        let position = StartPosition::from_cursor(last_sequence);

        let iterator = self
            .client
            .get_shard_iterator(&self.settings.stream_name, &shard.shard_id, &position)
            .await
            .map_err(|e| fetch_error(shard, "get shard iterator", e))?;

        let records = self
            .client
            .get_records(&iterator, self.settings.batch_limit)
            .await
            .map_err(|e| fetch_error(shard, "get records", e))?;

        let mut batch = Records::empty(last_sequence);
        batch.data.reserve(records.len());
        for record in records {
            batch.data.push(record.data);
            batch.last_sequence = record.sequence_number;
        }

        debug!(
            records = batch.len(),
            position = ?position,
            last_sequence = %batch.last_sequence,
            "Fetched batch"
        );

        Ok(batch)
    }
}

fn fetch_error(shard: &ShardDescriptor, operation: &str, err: anyhow::Error) -> Error {
    Error::Fetch {
        shard_id: shard.shard_id.clone(),
        details: format!("{}: {:#}", operation, err),
    }
}

#[async_trait]
impl Source for AwsKinesis {
    fn number_of_workers(&self) -> usize {
        self.catalog.len()
    }

    async fn fetch(
        &self,
        cancel: &CancellationToken,
        worker: usize,
        last_sequence: &str,
    ) -> Result<Records> {
        let shard = self.catalog.get(worker)?;

        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(Error::Cancelled),
            batch = self.fetch_batch(shard, last_sequence) => batch,
        }
    }

    fn close(&self, _worker: usize) -> Result<()> {
        Ok(())
    }
}

/// Decode `data` as [`KinesisSettings`], connect with the AWS SDK and
/// discover the stream's shards.
pub async fn load(data: &[u8]) -> Result<AwsKinesis> {
    let settings = KinesisSettings::from_json(data)?;
    let client = SdkKinesisClient::new(&settings).await;
    AwsKinesis::connect(settings, Arc::new(client)).await
}

fn load_source(data: Vec<u8>) -> BoxFuture<'static, Result<Arc<dyn Source>>> {
    async move {
        let source = load(&data).await?;
        Ok(Arc::new(source) as Arc<dyn Source>)
    }
    .boxed()
}

/// Register the Kinesis loader under [`SOURCE_TYPE`].
pub fn register(registry: &mut Registry) {
    registry.register(SourceType::new(SOURCE_TYPE), load_source);
}
