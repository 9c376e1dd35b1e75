pub mod backoff;
pub mod checkpoint;
pub mod config;
pub mod error;
pub mod registry;
pub mod source;
pub mod telemetry;

pub use config::Config;
pub use error::{Error, Result};
pub use registry::{Registry, SourceType};
pub use source::{Records, Source};
