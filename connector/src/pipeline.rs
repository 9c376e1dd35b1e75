use chrono::Utc;
use governor::{Quota, RateLimiter};
use metrics::{counter, gauge, histogram};
use source_core::backoff::retry_with_backoff;
use source_core::checkpoint::{Checkpoint, CheckpointStore};
use source_core::config::WorkerConfig;
use source_core::telemetry::{FETCH_DURATION_MS, FETCH_ERRORS, RECORDS_FETCHED, WORKERS};
use source_core::{Error, Records, Result, Source};
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

/// A batch handed downstream by one worker.
#[derive(Debug, Clone)]
pub struct Delivery {
    pub worker: usize,
    pub records: Records,
}

/// Drives a [`Source`]: one task per worker, each fetching sequentially from
/// its committed cursor.
///
/// A worker commits its checkpoint only after the batch has been handed to
/// the delivery channel, so a restart may redeliver but never skips.
pub struct Pipeline {
    source: Arc<dyn Source>,
    checkpoints: Arc<dyn CheckpointStore>,
    source_name: String,
    config: WorkerConfig,
}

impl Pipeline {
    pub fn new(
        source: Arc<dyn Source>,
        checkpoints: Arc<dyn CheckpointStore>,
        source_name: String,
        config: WorkerConfig,
    ) -> Self {
        Self {
            source,
            checkpoints,
            source_name,
            config,
        }
    }

    /// Run every worker until `cancel` fires or one of them fails fatally.
    #[instrument(skip_all, fields(source = %self.source_name))]
    pub async fn run(&self, cancel: CancellationToken, tx: mpsc::Sender<Delivery>) -> Result<()> {
        let workers = self.source.number_of_workers();
        gauge!(WORKERS, "source" => self.source_name.clone()).set(workers as f64);

        if workers == 0 {
            warn!("Source declared no workers, nothing to do");
            return Ok(());
        }

        info!(workers, "Starting pipeline");

        let mut tasks = JoinSet::new();
        for index in 0..workers {
            let worker = Worker {
                index,
                source: Arc::clone(&self.source),
                checkpoints: Arc::clone(&self.checkpoints),
                source_name: self.source_name.clone(),
                config: self.config.clone(),
                cancel: cancel.clone(),
                tx: tx.clone(),
            };
            tasks.spawn(worker.run());
        }
        drop(tx);

        let mut first_error = None;
        while let Some(joined) = tasks.join_next().await {
            let result = joined
                .map_err(|e| Error::Internal(format!("worker task panicked: {}", e)))
                .and_then(|r| r);

            if let Err(e) = result {
                if first_error.is_none() {
                    error!(error = %e, "Worker failed, stopping pipeline");
                    cancel.cancel();
                    first_error = Some(e);
                }
            }
        }

        for index in 0..workers {
            self.source.close(index)?;
        }

        match first_error {
            Some(e) => Err(e),
            None => {
                info!("Pipeline stopped");
                Ok(())
            }
        }
    }
}

struct Worker {
    index: usize,
    source: Arc<dyn Source>,
    checkpoints: Arc<dyn CheckpointStore>,
    source_name: String,
    config: WorkerConfig,
    cancel: CancellationToken,
    tx: mpsc::Sender<Delivery>,
}

impl Worker {
    #[instrument(skip(self), fields(worker = self.index))]
    async fn run(self) -> Result<()> {
        let mut checkpoint = self
            .checkpoints
            .get_checkpoint(&self.source_name, self.index)
            .await?
            .unwrap_or_else(|| Checkpoint::new(self.source_name.clone(), self.index));

        let rate = NonZeroU32::new(self.config.max_fetches_per_sec).unwrap_or(NonZeroU32::MIN);
        let limiter = RateLimiter::direct(Quota::per_second(rate));

        info!(cursor = %checkpoint.cursor, "Worker started");

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => break,
                _ = limiter.until_ready() => {}
            }

            let started = Instant::now();
            let result = retry_with_backoff(
                || self.fetch_once(&checkpoint.cursor),
                Error::is_retryable,
                &self.cancel,
                self.config.max_retries,
                self.config.retry_base_delay_ms,
                "fetch",
            )
            .await;

            let records = match result {
                Ok(records) => records,
                Err(Error::Cancelled) => break,
                Err(e) if !e.is_fatal() && self.cancel.is_cancelled() => {
                    debug!(error = %e, "Fetch abandoned during shutdown");
                    break;
                }
                Err(e) => return Err(e),
            };

            histogram!(FETCH_DURATION_MS, "source" => self.source_name.clone())
                .record(started.elapsed().as_millis() as f64);

            if records.is_empty() {
                tokio::select! {
                    _ = self.cancel.cancelled() => break,
                    _ = tokio::time::sleep(self.config.poll_interval()) => continue,
                }
            }

            let count = records.len();
            let cursor = records.last_sequence.clone();

            let delivery = Delivery {
                worker: self.index,
                records,
            };
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    debug!(records = count, "Shutdown while delivering, batch not committed");
                    break;
                }
                sent = self.tx.send(delivery) => {
                    if sent.is_err() {
                        warn!("Delivery channel closed, stopping worker");
                        break;
                    }
                }
            }

            checkpoint.cursor = cursor;
            checkpoint.records_processed += count as u64;
            checkpoint.updated_at = Utc::now();
            self.checkpoints.save_checkpoint(&checkpoint).await?;

            counter!(
                RECORDS_FETCHED,
                "source" => self.source_name.clone(),
                "worker" => self.index.to_string()
            )
            .increment(count as u64);

            debug!(
                records = count,
                cursor = %checkpoint.cursor,
                total = checkpoint.records_processed,
                "Committed batch"
            );
        }

        info!(
            cursor = %checkpoint.cursor,
            total = checkpoint.records_processed,
            "Worker stopped"
        );
        Ok(())
    }

    async fn fetch_once(&self, cursor: &str) -> Result<Records> {
        let fetch = self.source.fetch(&self.cancel, self.index, cursor);
        let result = match tokio::time::timeout(self.config.fetch_timeout(), fetch).await {
            Ok(result) => result,
            Err(_) => Err(Error::Timeout {
                worker: self.index,
                after_ms: self.config.fetch_timeout_ms,
            }),
        };

        if let Err(e) = &result {
            if !matches!(e, Error::Cancelled) {
                counter!(FETCH_ERRORS, "source" => self.source_name.clone()).increment(1);
            }
        }

        result
    }
}
