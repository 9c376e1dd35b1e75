use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("unable to discover shards of stream '{stream}': {details}")]
    Discovery { stream: String, details: String },

    #[error("fetch from shard {shard_id} failed: {details}")]
    Fetch { shard_id: String, details: String },

    #[error("worker index {index} out of range, source has {workers} workers")]
    InvalidIndex { index: usize, workers: usize },

    #[error("operation cancelled")]
    Cancelled,

    #[error("fetch for worker {worker} timed out after {after_ms}ms")]
    Timeout { worker: usize, after_ms: u64 },

    #[error("no source registered for type '{0}'")]
    UnknownSource(String),

    #[error("checkpoint error: {0}")]
    Checkpoint(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::Fetch { .. } | Error::Timeout { .. } | Error::Io(_)
        )
    }

    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Error::Config(_)
                | Error::Discovery { .. }
                | Error::InvalidIndex { .. }
                | Error::UnknownSource(_)
                | Error::Checkpoint(_)
        )
    }
}
