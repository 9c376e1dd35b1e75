use config::{ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

const DEFAULT_CONFIG_FILE: &str = "kinesis-tail.toml";

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    pub source: SourceConfig,
    pub worker: WorkerConfig,
    pub checkpoint: CheckpointConfig,
    pub telemetry: TelemetryConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SourceConfig {
    /// Registered source type, e.g. `awskinesis`
    pub kind: String,
    /// Name checkpoints are stored under
    pub name: String,
    /// Inline JSON definition handed to the source loader
    pub definition: Option<String>,
    /// Path to a JSON definition, used when `definition` is unset
    pub definition_file: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WorkerConfig {
    pub poll_interval_ms: u64,
    pub fetch_timeout_ms: u64,
    pub max_retries: u32,
    pub retry_base_delay_ms: u64,
    pub max_fetches_per_sec: u32,
    pub channel_buffer_size: usize,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CheckpointConfig {
    pub backend: CheckpointBackend,
    pub path: PathBuf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckpointBackend {
    Memory,
    File,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TelemetryConfig {
    pub log_level: String,
    pub log_format: LogFormat,
    pub metrics_enabled: bool,
    pub metrics_port: u16,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Json,
    Pretty,
}

impl Config {
    /// Layers defaults, the config file and `KINESIS_TAIL__*` environment variables.
    pub fn load_from(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut builder = config::Config::builder();

        builder = builder.add_source(config::Config::try_from(&Config::default())?);

        match path {
            Some(path) => {
                builder = builder.add_source(File::from(path));
            }
            None if Path::new(DEFAULT_CONFIG_FILE).exists() => {
                builder = builder.add_source(File::with_name(DEFAULT_CONFIG_FILE));
            }
            None => {}
        }

        builder = builder.add_source(
            Environment::with_prefix("KINESIS_TAIL")
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

        let settings: Config = builder.build()?.try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.source.kind.is_empty() {
            return Err(ConfigError::Message("source.kind is required".into()));
        }

        if self.source.name.is_empty() {
            return Err(ConfigError::Message("source.name is required".into()));
        }

        if self.source.definition.is_none() && self.source.definition_file.is_none() {
            return Err(ConfigError::Message(
                "one of source.definition or source.definition_file is required".into(),
            ));
        }

        if self.worker.max_fetches_per_sec == 0 {
            return Err(ConfigError::Message(
                "worker.max_fetches_per_sec must be greater than 0".into(),
            ));
        }

        if self.worker.channel_buffer_size == 0 {
            return Err(ConfigError::Message(
                "worker.channel_buffer_size must be greater than 0".into(),
            ));
        }

        if self.worker.fetch_timeout_ms == 0 {
            return Err(ConfigError::Message(
                "worker.fetch_timeout_ms must be greater than 0".into(),
            ));
        }

        Ok(())
    }
}

impl SourceConfig {
    /// Raw definition bytes; the inline definition wins over the file.
    pub fn definition_bytes(&self) -> crate::Result<Vec<u8>> {
        if let Some(definition) = &self.definition {
            return Ok(definition.clone().into_bytes());
        }

        match &self.definition_file {
            Some(path) => std::fs::read(path).map_err(|e| {
                crate::Error::Config(format!(
                    "unable to read source definition {}: {}",
                    path.display(),
                    e
                ))
            }),
            None => Err(crate::Error::Config(
                "source definition is not configured".into(),
            )),
        }
    }
}

impl WorkerConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_millis(self.fetch_timeout_ms)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            source: SourceConfig {
                kind: "awskinesis".to_string(),
                name: "default".to_string(),
                definition: None,
                definition_file: Some(PathBuf::from("source.json")),
            },
            worker: WorkerConfig {
                poll_interval_ms: 1000,
                fetch_timeout_ms: 30_000,
                max_retries: 5,
                retry_base_delay_ms: 500,
                // Kinesis allows five GetRecords calls per shard per second
                max_fetches_per_sec: 5,
                channel_buffer_size: 1024,
            },
            checkpoint: CheckpointConfig {
                backend: CheckpointBackend::File,
                path: PathBuf::from("checkpoints.json"),
            },
            telemetry: TelemetryConfig {
                log_level: "info".to_string(),
                log_format: LogFormat::Pretty,
                metrics_enabled: false,
                metrics_port: 9090,
            },
        }
    }
}
