// Copyright 2025 Crrow
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Firehose sink: messages are concatenated with a delimiter inside a
//! record until `record_max_messages` is reached, then a new record is
//! appended. At most `batch_max_messages` records go out per
//! `put_record_batch`. A `send_timeframe` rate limit enforces a minimum
//! wall-clock interval between sends; a caller that would violate it sleeps
//! first instead of sending early.

use std::{
    sync::Mutex,
    time::{Duration, Instant},
};

use logship_core::Message;
use tracing::warn;

use crate::{error::Result, metrics::FIREHOSE_RECORDS_PER_SEC};

/// Thin seam over the Firehose SDK client so unit tests can substitute a
/// recording fake instead of calling AWS.
#[async_trait::async_trait]
pub trait FirehoseClient: Send + Sync {
    async fn put_record_batch(&self, delivery_stream: &str, records: Vec<Vec<u8>>) -> Result<()>;
}

pub struct AwsFirehoseClient {
    inner: aws_sdk_firehose::Client,
}

impl AwsFirehoseClient {
    #[must_use]
    pub fn new(inner: aws_sdk_firehose::Client) -> Self { AwsFirehoseClient { inner } }
}

#[async_trait::async_trait]
impl FirehoseClient for AwsFirehoseClient {
    async fn put_record_batch(&self, delivery_stream: &str, records: Vec<Vec<u8>>) -> Result<()> {
        let entries: Vec<_> = records
            .into_iter()
            .map(|bytes| {
                aws_sdk_firehose::types::Record::builder()
                    .data(aws_sdk_firehose::primitives::Blob::new(bytes))
                    .build()
                    .expect("data is always set")
            })
            .collect();
        self.inner
            .put_record_batch()
            .delivery_stream_name(delivery_stream)
            .set_records(Some(entries))
            .send()
            .await
            .map(drop)
            .map_err(|e| crate::error::Error::Firehose { source: Box::new(e), loc: snafu::Location::new(file!(), line!(), column!()) })
    }
}

pub struct FirehoseSinkConfig {
    pub delivery_stream: String,
    pub record_max_messages: usize,
    pub batch_max_messages: usize,
    pub send_timeframe: Duration,
    pub delimiter: Vec<u8>,
}

struct RecordBuffer {
    completed: Vec<Vec<u8>>,
    current: Vec<u8>,
    current_count: usize,
}

impl RecordBuffer {
    fn new() -> Self { RecordBuffer { completed: Vec::new(), current: Vec::new(), current_count: 0 } }
}

pub struct FirehoseSink<C: FirehoseClient> {
    name: String,
    client: C,
    cfg: FirehoseSinkConfig,
    buffer: Mutex<RecordBuffer>,
    last_send: Mutex<Instant>,
}

impl<C: FirehoseClient> FirehoseSink<C> {
    pub fn new(name: impl Into<String>, client: C, cfg: FirehoseSinkConfig) -> Self {
        FirehoseSink { name: name.into(), client, cfg, buffer: Mutex::new(RecordBuffer::new()), last_send: Mutex::new(Instant::now()) }
    }

    /// Appends `msg`'s payload into the current record, rolling over to a
    /// new record once `record_max_messages` is reached.
    pub fn append(&self, msg: &Message) {
        let mut buf = self.buffer.lock().unwrap();
        if buf.current_count >= self.cfg.record_max_messages {
            let record = std::mem::take(&mut buf.current);
            buf.completed.push(record);
            buf.current_count = 0;
        }
        if !buf.current.is_empty() {
            buf.current.extend_from_slice(&self.cfg.delimiter);
        }
        buf.current.extend_from_slice(msg.payload());
        buf.current_count += 1;
    }

    /// Sends up to `batch_max_messages` completed records, sleeping first
    /// if the configured `send_timeframe` hasn't elapsed since the last
    /// send. Incomplete trailing records are flushed into a record too.
    pub async fn flush(&self, fallback: impl FnOnce()) {
        let records = {
            let mut buf = self.buffer.lock().unwrap();
            if !buf.current.is_empty() {
                let record = std::mem::take(&mut buf.current);
                buf.completed.push(record);
                buf.current_count = 0;
            }
            if buf.completed.is_empty() {
                return;
            }
            let take = buf.completed.len().min(self.cfg.batch_max_messages);
            buf.completed.drain(..take).collect::<Vec<_>>()
        };

        let wait = {
            let last = *self.last_send.lock().unwrap();
            self.cfg.send_timeframe.saturating_sub(last.elapsed())
        };
        if !wait.is_zero() {
            tokio::time::sleep(wait).await;
        }

        let count = records.len();
        if let Err(e) = self.client.put_record_batch(&self.cfg.delivery_stream, records).await {
            warn!(sink = %self.name, error = %e, "firehose put_record_batch failed");
            fallback();
            return;
        }
        *self.last_send.lock().unwrap() = Instant::now();
        FIREHOSE_RECORDS_PER_SEC.with_label_values(&[&self.cfg.delivery_stream]).set(count as f64);
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;
    use logship_core::StreamId;

    use super::*;

    struct RecordingClient {
        batches: std::sync::Mutex<Vec<Vec<Vec<u8>>>>,
    }

    #[async_trait::async_trait]
    impl FirehoseClient for RecordingClient {
        async fn put_record_batch(&self, _delivery_stream: &str, records: Vec<Vec<u8>>) -> Result<()> {
            self.batches.lock().unwrap().push(records);
            Ok(())
        }
    }

    fn config() -> FirehoseSinkConfig {
        FirehoseSinkConfig {
            delivery_stream: "events".to_string(),
            record_max_messages: 2,
            batch_max_messages: 10,
            send_timeframe: Duration::ZERO,
            delimiter: b"\n".to_vec(),
        }
    }

    #[tokio::test]
    async fn messages_are_concatenated_until_record_max_then_rolled_over() {
        let client = RecordingClient { batches: std::sync::Mutex::new(Vec::new()) };
        let sink = FirehoseSink::new("firehose-test", client, config());
        for i in 0..3u8 {
            sink.append(&Message::new(StreamId::new(1), "events", Bytes::from(vec![b'a' + i])));
        }
        sink.flush(|| panic!("no fallback expected")).await;

        let batches = sink.client.batches.lock().unwrap();
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0], vec![b"a\nb".to_vec(), b"c".to_vec()]);
    }
}
