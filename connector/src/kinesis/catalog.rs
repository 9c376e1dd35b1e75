use super::KinesisApi;
use source_core::{Error, Result};
use tracing::{info, instrument, warn};

/// A shard and the worker index it is served by.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShardDescriptor {
    pub index: usize,
    pub shard_id: String,
}

/// Shards of one stream, sorted by shard id.
///
/// Hosts address shards only by index, and a resumed cursor must land on the
/// shard it came from, so the order depends on nothing but the ids.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShardCatalog {
    shards: Vec<ShardDescriptor>,
}

impl ShardCatalog {
    pub fn from_shard_ids<I>(ids: I) -> Self
    where
        I: IntoIterator<Item = String>,
    {
        let mut ids: Vec<String> = ids.into_iter().collect();
        ids.sort();

        let shards = ids
            .into_iter()
            .enumerate()
            .map(|(index, shard_id)| ShardDescriptor { index, shard_id })
            .collect();

        Self { shards }
    }

    #[instrument(skip(client))]
    pub async fn discover(client: &dyn KinesisApi, stream_name: &str) -> Result<Self> {
        let ids = client
            .describe_stream_shards(stream_name)
            .await
            .map_err(|e| Error::Discovery {
                stream: stream_name.to_string(),
                details: format!("{:#}", e),
            })?;

        let catalog = Self::from_shard_ids(ids);
        if catalog.is_empty() {
            warn!(stream = stream_name, "Stream reported no shards");
        } else {
            info!(stream = stream_name, shards = catalog.len(), "Discovered shards");
        }

        Ok(catalog)
    }

    pub fn len(&self) -> usize {
        self.shards.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shards.is_empty()
    }

    pub fn get(&self, index: usize) -> Result<&ShardDescriptor> {
        self.shards.get(index).ok_or(Error::InvalidIndex {
            index,
            workers: self.shards.len(),
        })
    }

    pub fn iter(&self) -> impl Iterator<Item = &ShardDescriptor> {
        self.shards.iter()
    }
}
