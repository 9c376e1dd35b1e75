//! Scripted [`Source`] for exercising the host without Kinesis.

use async_trait::async_trait;
use bytes::Bytes;
use source_core::{Error, Records, Result, Source};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// What one worker of a [`ScriptedSource`] does.
#[derive(Debug, Clone)]
pub(crate) enum Script {
    /// One record per fetch, forever
    Endless,
    /// One record per fetch up to the given count, then empty batches
    Batches(usize),
    /// Fails with a configuration error after the delay
    FailAfter(Duration),
}

/// Cursors are record counts: `""` before the first record, then `"1"`, `"2"`, ...
/// Payloads are `w<worker>-<n>`.
pub(crate) struct ScriptedSource {
    workers: Vec<Script>,
}

impl ScriptedSource {
    pub fn new(workers: Vec<Script>) -> Self {
        Self { workers }
    }
}

fn next_record(worker: usize, last_sequence: &str) -> Result<Records> {
    let n = if last_sequence.is_empty() {
        1
    } else {
        last_sequence
            .parse::<usize>()
            .map_err(|e| Error::Internal(format!("bad cursor {}: {}", last_sequence, e)))?
            + 1
    };

    Ok(Records {
        data: vec![Bytes::from(format!("w{}-{}", worker, n))],
        last_sequence: n.to_string(),
    })
}

#[async_trait]
impl Source for ScriptedSource {
    fn number_of_workers(&self) -> usize {
        self.workers.len()
    }

    async fn fetch(
        &self,
        cancel: &CancellationToken,
        worker: usize,
        last_sequence: &str,
    ) -> Result<Records> {
        let script = self.workers.get(worker).ok_or(Error::InvalidIndex {
            index: worker,
            workers: self.workers.len(),
        })?;

        match script {
            Script::Endless => next_record(worker, last_sequence),
            Script::Batches(total) => {
                let batch = next_record(worker, last_sequence)?;
                if batch.last_sequence.parse::<usize>().unwrap_or(usize::MAX) > *total {
                    Ok(Records::empty(last_sequence))
                } else {
                    Ok(batch)
                }
            }
            Script::FailAfter(delay) => {
                tokio::select! {
                    _ = cancel.cancelled() => Err(Error::Cancelled),
                    _ = tokio::time::sleep(*delay) => Err(Error::Config("boom".into())),
                }
            }
        }
    }

    fn close(&self, _worker: usize) -> Result<()> {
        Ok(())
    }
}
