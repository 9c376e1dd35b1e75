//! Kinesis Data Streams source connector and the `kinesis-tail` host that drives it.

pub mod app;
pub mod kinesis;
pub mod output;
pub mod pipeline;

#[cfg(test)]
mod testing;

pub use kinesis::{load, register, AwsKinesis, KinesisApi, KinesisSettings, SOURCE_TYPE};
