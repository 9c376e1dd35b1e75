use super::settings::KinesisSettings;
use super::{KinesisApi, StartPosition, StreamRecord};
use anyhow::anyhow;
use async_trait::async_trait;
use aws_sdk_kinesis::config::Credentials;
use aws_sdk_kinesis::error::DisplayErrorContext;
use aws_sdk_kinesis::types::ShardIteratorType;
use aws_sdk_kinesis::Client;
use bytes::Bytes;
use tracing::{debug, instrument};

/// [`KinesisApi`] backed by the AWS SDK.
#[derive(Debug, Clone)]
pub struct SdkKinesisClient {
    client: Client,
}

impl SdkKinesisClient {
    pub async fn new(settings: &KinesisSettings) -> Self {
        let mut config_loader = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .region(aws_config::Region::new(settings.region.clone()));

        if let Some(credentials) = settings.static_credentials() {
            config_loader = config_loader.credentials_provider(Credentials::new(
                credentials.access_key_id,
                credentials.secret_access_key,
                credentials.session_token,
                None,
                "awskinesis-static",
            ));
        }

        if let Some(endpoint) = &settings.endpoint_url {
            config_loader = config_loader.endpoint_url(endpoint);
        }

        let config = config_loader.load().await;

        Self::from_client(Client::new(&config))
    }

    pub fn from_client(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl KinesisApi for SdkKinesisClient {
    #[instrument(skip(self))]
    async fn describe_stream_shards(&self, stream_name: &str) -> anyhow::Result<Vec<String>> {
        let mut shard_ids = Vec::new();
        let mut exclusive_start_shard_id: Option<String> = None;

        // DescribeStream pages through shards in chunks of at most 100
        loop {
            let output = self
                .client
                .describe_stream()
                .stream_name(stream_name)
                .set_exclusive_start_shard_id(exclusive_start_shard_id.take())
                .send()
                .await
                .map_err(|e| anyhow!("describe stream: {}", DisplayErrorContext(e)))?;

            let description = output
                .stream_description
                .ok_or_else(|| anyhow!("describe stream returned no stream description"))?;

            let last_shard_id = description.shards.last().map(|s| s.shard_id.clone());
            shard_ids.extend(description.shards.into_iter().map(|s| s.shard_id));

            match (description.has_more_shards, last_shard_id) {
                (true, Some(last)) => exclusive_start_shard_id = Some(last),
                _ => break,
            }
        }

        debug!(shards = shard_ids.len(), "Described stream");
        Ok(shard_ids)
    }

    async fn get_shard_iterator(
        &self,
        stream_name: &str,
        shard_id: &str,
        position: &StartPosition,
    ) -> anyhow::Result<String> {
        let request = self
            .client
            .get_shard_iterator()
            .stream_name(stream_name)
            .shard_id(shard_id);

        let request = match position {
            StartPosition::TrimHorizon => request.shard_iterator_type(ShardIteratorType::TrimHorizon),
            StartPosition::AfterSequenceNumber(sequence) => request
                .shard_iterator_type(ShardIteratorType::AfterSequenceNumber)
                .starting_sequence_number(sequence.as_str()),
        };

        let output = request
            .send()
            .await
            .map_err(|e| anyhow!("{}", DisplayErrorContext(e)))?;

        output
            .shard_iterator
            .ok_or_else(|| anyhow!("no shard iterator returned for {}", shard_id))
    }

    async fn get_records(
        &self,
        shard_iterator: &str,
        limit: Option<i32>,
    ) -> anyhow::Result<Vec<StreamRecord>> {
        let output = self
            .client
            .get_records()
            .shard_iterator(shard_iterator)
            .set_limit(limit)
            .send()
            .await
            .map_err(|e| anyhow!("{}", DisplayErrorContext(e)))?;

        debug!(
            records = output.records.len(),
            millis_behind_latest = ?output.millis_behind_latest,
            "Pulled records"
        );

        Ok(output
            .records
            .into_iter()
            .map(|record| StreamRecord {
                data: Bytes::from(record.data.into_inner()),
                sequence_number: record.sequence_number,
            })
            .collect())
    }
}
