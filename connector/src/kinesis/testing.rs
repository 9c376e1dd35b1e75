//! In-memory stand-in for Kinesis.

use super::{KinesisApi, StartPosition, StreamRecord};
use anyhow::{anyhow, bail};
use async_trait::async_trait;
use bytes::Bytes;
use std::collections::BTreeMap;
use std::sync::Mutex;

/// Fixed-width sequence number of the `n`th record of a shard, starting at 1.
pub(crate) fn sequence_number(n: usize) -> String {
    format!("4959033827149025660855969253836157109592157598{:06}", n)
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct Calls {
    pub describes: usize,
    pub iterators: usize,
    pub records: usize,
}

#[derive(Default)]
struct FakeShard {
    records: Vec<StreamRecord>,
    trimmed: usize,
    last_position: Option<StartPosition>,
}

#[derive(Default)]
struct State {
    shards: BTreeMap<String, FakeShard>,
    report_order: Option<Vec<String>>,
    describe_error: Option<String>,
    iterator_errors: Option<(String, usize)>,
    record_errors: Option<(String, usize)>,
    stall_records: bool,
    calls: Calls,
}

#[derive(Default)]
pub(crate) struct FakeKinesis {
    state: Mutex<State>,
}

fn take_failure(slot: &mut Option<(String, usize)>) -> Option<String> {
    let (message, remaining) = slot.as_mut()?;
    let message = message.clone();
    *remaining -= 1;
    if *remaining == 0 {
        *slot = None;
    }
    Some(message)
}

impl FakeKinesis {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_shard(self, shard_id: &str, payloads: &[&str]) -> Self {
        self.state
            .lock()
            .unwrap()
            .shards
            .insert(shard_id.to_string(), FakeShard::default());
        self.push_records(shard_id, payloads);
        self
    }

    pub fn push_records(&self, shard_id: &str, payloads: &[&str]) {
        let mut state = self.state.lock().unwrap();
        let shard = state.shards.get_mut(shard_id).expect("unknown shard");
        for payload in payloads {
            let n = shard.records.len() + 1;
            shard.records.push(StreamRecord {
                data: Bytes::copy_from_slice(payload.as_bytes()),
                sequence_number: sequence_number(n),
            });
        }
    }

    /// Expire the oldest `count` records of a shard.
    pub fn trim(&self, shard_id: &str, count: usize) {
        let mut state = self.state.lock().unwrap();
        let shard = state.shards.get_mut(shard_id).expect("unknown shard");
        shard.trimmed = (shard.trimmed + count).min(shard.records.len());
    }

    pub fn report_shards_in(&self, order: &[&str]) {
        self.state.lock().unwrap().report_order =
            Some(order.iter().map(|s| s.to_string()).collect());
    }

    pub fn fail_describe(&self, message: &str) {
        self.state.lock().unwrap().describe_error = Some(message.to_string());
    }

    pub fn fail_iterators(&self, message: &str, times: usize) {
        self.state.lock().unwrap().iterator_errors = Some((message.to_string(), times));
    }

    pub fn fail_records(&self, message: &str, times: usize) {
        self.state.lock().unwrap().record_errors = Some((message.to_string(), times));
    }

    /// Make every following GetRecords call hang.
    pub fn stall_records(&self) {
        self.state.lock().unwrap().stall_records = true;
    }

    pub fn calls(&self) -> Calls {
        self.state.lock().unwrap().calls
    }

    pub fn last_position(&self, shard_id: &str) -> Option<StartPosition> {
        let state = self.state.lock().unwrap();
        state.shards.get(shard_id)?.last_position.clone()
    }
}

#[async_trait]
impl KinesisApi for FakeKinesis {
    async fn describe_stream_shards(&self, _stream_name: &str) -> anyhow::Result<Vec<String>> {
        let mut state = self.state.lock().unwrap();
        state.calls.describes += 1;

        if let Some(message) = &state.describe_error {
            bail!("{}", message);
        }

        Ok(match &state.report_order {
            Some(order) => order.clone(),
            None => state.shards.keys().cloned().collect(),
        })
    }

    async fn get_shard_iterator(
        &self,
        _stream_name: &str,
        shard_id: &str,
        position: &StartPosition,
    ) -> anyhow::Result<String> {
        let mut state = self.state.lock().unwrap();
        state.calls.iterators += 1;

        if let Some(message) = take_failure(&mut state.iterator_errors) {
            bail!("{}", message);
        }

        let shard = state
            .shards
            .get_mut(shard_id)
            .ok_or_else(|| anyhow!("ResourceNotFoundException: shard {}", shard_id))?;
        shard.last_position = Some(position.clone());

        let offset = match position {
            StartPosition::TrimHorizon => shard.trimmed,
            StartPosition::AfterSequenceNumber(sequence) => {
                let found = shard
                    .records
                    .iter()
                    .position(|r| &r.sequence_number == sequence)
                    .ok_or_else(|| {
                        anyhow!("InvalidArgumentException: unknown sequence {}", sequence)
                    })?;
                (found + 1).max(shard.trimmed)
            }
        };

        Ok(format!("{}#{}", shard_id, offset))
    }

    async fn get_records(
        &self,
        shard_iterator: &str,
        limit: Option<i32>,
    ) -> anyhow::Result<Vec<StreamRecord>> {
        let stalled = {
            let mut state = self.state.lock().unwrap();
            state.calls.records += 1;
            state.stall_records
        };
        if stalled {
            std::future::pending::<()>().await;
        }

        let mut state = self.state.lock().unwrap();
        if let Some(message) = take_failure(&mut state.record_errors) {
            bail!("{}", message);
        }

        let (shard_id, offset) = shard_iterator
            .rsplit_once('#')
            .ok_or_else(|| anyhow!("InvalidArgumentException: bad iterator"))?;
        let offset: usize = offset.parse()?;
        let shard = state
            .shards
            .get(shard_id)
            .ok_or_else(|| anyhow!("ResourceNotFoundException: shard {}", shard_id))?;

        let limit = limit.map(|l| l as usize).unwrap_or(usize::MAX);
        Ok(shard
            .records
            .iter()
            .skip(offset)
            .take(limit)
            .cloned()
            .collect())
    }
}
