use crate::kinesis;
use crate::output::{self, Format};
use crate::pipeline::{Delivery, Pipeline};
use source_core::checkpoint;
use source_core::{Config, Registry, Result, Source, SourceType};
use std::sync::Arc;
use tokio::io::AsyncWrite;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument};

/// Every source type this binary can load.
pub fn registry() -> Registry {
    let mut registry = Registry::new();
    kinesis::register(&mut registry);
    registry
}

pub struct App {
    config: Config,
    pipeline: Pipeline,
}

impl App {
    #[instrument(skip(config), fields(kind = %config.source.kind, name = %config.source.name))]
    pub async fn new(config: Config) -> Result<Self> {
        info!("Initializing application");

        let definition = config.source.definition_bytes()?;
        let source = registry()
            .load(&SourceType::new(config.source.kind.clone()), definition)
            .await?;

        info!(workers = source.number_of_workers(), "Source loaded");

        Ok(Self::with_source(config, source))
    }

    /// Wire an already loaded source to the configured checkpoint store.
    pub fn with_source(config: Config, source: Arc<dyn Source>) -> Self {
        let checkpoints = checkpoint::open(&config.checkpoint);
        let pipeline = Pipeline::new(
            source,
            checkpoints,
            config.source.name.clone(),
            config.worker.clone(),
        );

        Self { config, pipeline }
    }

    /// Channel sized from `worker.channel_buffer_size` for [`App::run`].
    pub fn delivery_channel(&self) -> (mpsc::Sender<Delivery>, mpsc::Receiver<Delivery>) {
        mpsc::channel(self.config.worker.channel_buffer_size)
    }

    pub async fn run(&self, cancel: CancellationToken, tx: mpsc::Sender<Delivery>) -> Result<()> {
        self.pipeline.run(cancel, tx).await
    }

    /// Run the pipeline and write every delivery to `out`.
    ///
    /// Batches already on the channel when the pipeline stops are written
    /// before any pipeline error is returned, since their checkpoints are
    /// committed.
    pub async fn tail<W>(&self, cancel: CancellationToken, out: &mut W, format: Format) -> Result<()>
    where
        W: AsyncWrite + Unpin,
    {
        let (tx, rx) = self.delivery_channel();
        let (ran, written) = tokio::join!(
            self.run(cancel, tx),
            output::write_deliveries(rx, out, format)
        );

        ran?;
        written?;
        Ok(())
    }
}
