//! The shape every source connector is driven through.
//!
//! A source is split into a fixed number of workers, one per partition of
//! the underlying stream. The host runs one worker per index and owns the
//! cursor for each: it hands the last cursor to [`Source::fetch`] and
//! persists the cursor that comes back.

use crate::Result;
use async_trait::async_trait;
use bytes::Bytes;
use tokio_util::sync::CancellationToken;

/// One batch pulled from a single partition.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Records {
    /// Payloads in stream order.
    pub data: Vec<Bytes>,
    /// Cursor to resume after this batch. Equals the input cursor when the
    /// batch is empty.
    pub last_sequence: String,
}

impl Records {
    pub fn empty(last_sequence: impl Into<String>) -> Self {
        Self {
            data: Vec::new(),
            last_sequence: last_sequence.into(),
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

#[async_trait]
pub trait Source: Send + Sync {
    /// Number of independent workers, fixed for the lifetime of the source.
    fn number_of_workers(&self) -> usize;

    /// Pull the next batch for `worker`, resuming after `last_sequence`.
    ///
    /// An empty `last_sequence` starts from the oldest retained record.
    /// Calls for the same worker must not overlap.
    async fn fetch(
        &self,
        cancel: &CancellationToken,
        worker: usize,
        last_sequence: &str,
    ) -> Result<Records>;

    /// Release anything held for `worker`.
    fn close(&self, worker: usize) -> Result<()>;
}
