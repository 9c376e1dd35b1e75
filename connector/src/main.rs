use awskinesis::app::{self, App};
use awskinesis::output::{render, Format};
use clap::{Parser, Subcommand};
use source_core::{telemetry, Config, SourceType};
use std::path::PathBuf;
use std::process;
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

#[derive(Parser)]
#[clap(name = "kinesis-tail")]
#[clap(about = "Tail a Kinesis stream through the awskinesis source connector", version)]
struct Cli {
    /// Config file, defaults to ./kinesis-tail.toml when present
    #[clap(long, global = true, env = "KINESIS_TAIL_CONFIG")]
    config: Option<PathBuf>,

    /// How record payloads are written to stdout
    #[clap(long, global = true, value_enum, default_value_t = Format::Text)]
    format: Format,

    #[clap(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Read every shard continuously, resuming from stored checkpoints
    Run,

    /// List the stream's shards in worker order
    Shards,

    /// Fetch a single batch for one worker
    Fetch {
        /// Worker (shard) index
        #[clap(long)]
        worker: usize,

        /// Resume after this sequence number; omit to start at the trim horizon
        #[clap(long, default_value = "")]
        cursor: String,
    },
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!(error = %e, "Fatal error");
        eprintln!("kinesis-tail: {:#}", e);
        process::exit(1);
    }
}

async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = Config::load_from(cli.config.as_deref())
        .map_err(|e| anyhow::anyhow!("Failed to load config: {}", e))?;

    telemetry::init(&config.telemetry)?;

    match cli.command {
        Commands::Run => {
            let app = App::new(config).await?;
            let cancel = CancellationToken::new();

            let shutdown = cancel.clone();
            tokio::spawn(async move {
                match tokio::signal::ctrl_c().await {
                    Ok(()) => {
                        info!("Shutdown signal received");
                        shutdown.cancel();
                    }
                    Err(e) => error!(error = %e, "Failed to listen for shutdown signal"),
                }
            });

            let mut stdout = tokio::io::stdout();
            app.tail(cancel, &mut stdout, cli.format).await?;
        }

        Commands::Shards => {
            if config.source.kind != awskinesis::SOURCE_TYPE {
                anyhow::bail!(
                    "listing shards requires an {} source, configured kind is {}",
                    awskinesis::SOURCE_TYPE,
                    config.source.kind
                );
            }

            let source = awskinesis::load(&config.source.definition_bytes()?).await?;
            info!(
                stream = %source.settings().stream_name,
                shards = source.catalog().len(),
                "Listing shards"
            );
            let mut stdout = tokio::io::stdout();
            for shard in source.catalog().iter() {
                stdout
                    .write_all(format!("{}\t{}\n", shard.index, shard.shard_id).as_bytes())
                    .await?;
            }
            stdout.flush().await?;
        }

        Commands::Fetch { worker, cursor } => {
            let source = app::registry()
                .load(
                    &SourceType::new(config.source.kind.clone()),
                    config.source.definition_bytes()?,
                )
                .await?;

            let records = source
                .fetch(&CancellationToken::new(), worker, &cursor)
                .await?;

            let mut stdout = tokio::io::stdout();
            for payload in &records.data {
                stdout.write_all(&render(payload, cli.format)).await?;
            }
            stdout.flush().await?;

            info!(
                worker,
                records = records.len(),
                cursor = %records.last_sequence,
                "Fetched batch"
            );
            source.close(worker)?;
        }
    }

    telemetry::shutdown();
    Ok(())
}
