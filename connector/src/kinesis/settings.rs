use serde::{Deserialize, Serialize};
use source_core::{Error, Result};
use std::fmt;

/// GetRecords accepts at most this many records per call.
pub const MAX_BATCH_LIMIT: i32 = 10_000;

/// Definition of a Kinesis stream source, decoded from the JSON blob handed
/// to [`super::load`].
#[derive(Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct KinesisSettings {
    #[serde(default)]
    pub stream_name: String,
    #[serde(default)]
    pub region: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aws_access_key_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aws_secret_access_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aws_session_token: Option<String>,
    /// Overrides the regional endpoint, e.g. for LocalStack
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint_url: Option<String>,
    /// Upper bound on records returned by one fetch
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub batch_limit: Option<i32>,
}

/// Static key pair plus optional session token.
#[derive(Clone, PartialEq, Eq)]
pub struct StaticCredentials {
    pub access_key_id: String,
    pub secret_access_key: String,
    pub session_token: Option<String>,
}

impl KinesisSettings {
    pub fn from_json(data: &[u8]) -> Result<Self> {
        let settings: Self = serde_json::from_slice(data).map_err(|e| {
            Error::Config(format!("unable to load awskinesis source config: {}", e))
        })?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<()> {
        let mut missing = Vec::new();
        if self.stream_name.is_empty() {
            missing.push("streamName");
        }
        if self.region.is_empty() {
            missing.push("region");
        }
        if !missing.is_empty() {
            return Err(Error::Config(format!(
                "missing required fields for awskinesis source: {}",
                missing.join(", ")
            )));
        }

        if let Some(limit) = self.batch_limit {
            if !(1..=MAX_BATCH_LIMIT).contains(&limit) {
                return Err(Error::Config(format!(
                    "batchLimit must be between 1 and {}, got {}",
                    MAX_BATCH_LIMIT, limit
                )));
            }
        }

        Ok(())
    }

    /// Static credentials apply only when both halves of the key pair are set;
    /// otherwise the default provider chain resolves them.
    pub fn static_credentials(&self) -> Option<StaticCredentials> {
        let access_key_id = non_empty(&self.aws_access_key_id)?;
        let secret_access_key = non_empty(&self.aws_secret_access_key)?;

        Some(StaticCredentials {
            access_key_id: access_key_id.to_string(),
            secret_access_key: secret_access_key.to_string(),
            session_token: non_empty(&self.aws_session_token).map(str::to_string),
        })
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.is_empty())
}

fn redact(value: &Option<String>) -> Option<&'static str> {
    value.as_ref().map(|_| "<redacted>")
}

impl fmt::Debug for KinesisSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KinesisSettings")
            .field("stream_name", &self.stream_name)
            .field("region", &self.region)
            .field("aws_access_key_id", &self.aws_access_key_id)
            .field("aws_secret_access_key", &redact(&self.aws_secret_access_key))
            .field("aws_session_token", &redact(&self.aws_session_token))
            .field("endpoint_url", &self.endpoint_url)
            .field("batch_limit", &self.batch_limit)
            .finish()
    }
}

impl fmt::Debug for StaticCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StaticCredentials")
            .field("access_key_id", &self.access_key_id)
            .finish_non_exhaustive()
    }
}
