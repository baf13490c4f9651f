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

//! Kafka sink: produces each message to a partition chosen by
//! [`logship_core::murmur2::partition`], the Java-client-compatible hash
//! that keeps a key's records on the same partition across producer
//! languages. Unkeyed messages fall back to `rdkafka`'s own random
//! partitioner by leaving the partition unset on the record.

use logship_core::Message;
use rdkafka::{
    error::KafkaError,
    producer::{FutureProducer, FutureRecord},
};
use tracing::warn;

use crate::{error::Result, metrics::KAFKA_PARTITION_SELECTIONS};

/// Thin seam over an `rdkafka` producer so tests can substitute a
/// recording fake instead of a broker connection.
#[async_trait::async_trait]
pub trait KafkaClient: Send + Sync {
    async fn send(&self, topic: &str, partition: Option<i32>, key: Option<&[u8]>, payload: &[u8]) -> std::result::Result<(), KafkaError>;
}

pub struct RdKafkaClient {
    inner: FutureProducer,
}

impl RdKafkaClient {
    #[must_use]
    pub fn new(inner: FutureProducer) -> Self { RdKafkaClient { inner } }
}

#[async_trait::async_trait]
impl KafkaClient for RdKafkaClient {
    async fn send(&self, topic: &str, partition: Option<i32>, key: Option<&[u8]>, payload: &[u8]) -> std::result::Result<(), KafkaError> {
        let mut record = FutureRecord::to(topic).payload(payload);
        if let Some(key) = key {
            record = record.key(key);
        }
        if let Some(partition) = partition {
            record = record.partition(partition);
        }
        self.inner.send(record, rdkafka::util::Timeout::Never).await.map(drop).map_err(|(e, _owned)| e)
    }
}

pub struct KafkaSinkConfig {
    pub topic: String,
    pub num_partitions: u32,
    /// Metadata key whose value (if present) is used as the partition key;
    /// absent or empty keys use the random fallback, matching
    /// `murmur2::partition`'s own contract.
    pub key_metadata_key: Option<String>,
}

pub struct KafkaSink<C: KafkaClient> {
    name: String,
    client: C,
    cfg: KafkaSinkConfig,
}

impl<C: KafkaClient> KafkaSink<C> {
    pub fn new(name: impl Into<String>, client: C, cfg: KafkaSinkConfig) -> Self { KafkaSink { name: name.into(), client, cfg } }

    fn key<'m>(&self, msg: &'m Message) -> Option<&'m [u8]> {
        let key_field = self.cfg.key_metadata_key.as_deref()?;
        match msg.metadata().get(key_field)? {
            logship_core::MetaValue::Bytes(b) => Some(b.as_ref()),
            logship_core::MetaValue::String(s) => Some(s.as_bytes()),
            _ => None,
        }
    }

    /// Sends `msg`, pinning it to the Murmur2-derived partition for its key
    /// (if any); on any broker error the message is routed to `fallback`.
    pub async fn write_message(&self, msg: &Message, fallback: impl FnOnce(&Message)) {
        let key = self.key(msg);
        let partition = if logship_core::murmur2::requires_consistency(key) {
            KAFKA_PARTITION_SELECTIONS.with_label_values(&["keyed"]).inc();
            Some(logship_core::murmur2::partition(key, self.cfg.num_partitions) as i32)
        } else {
            KAFKA_PARTITION_SELECTIONS.with_label_values(&["random"]).inc();
            None
        };
        if let Err(e) = self.client.send(&self.cfg.topic, partition, key, msg.payload()).await {
            warn!(sink = %self.name, error = %e, "kafka produce failed");
            fallback(msg);
            return;
        }
        logship_core::metrics::MESSAGES_WRITTEN.with_label_values(&[&self.name, msg.stream_name()]).inc();
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;
    use logship_core::{MetaValue, StreamId};

    use super::*;

    #[derive(Default)]
    struct RecordingClient {
        sent: std::sync::Mutex<Vec<(Option<i32>, Option<Vec<u8>>)>>,
    }

    #[async_trait::async_trait]
    impl KafkaClient for RecordingClient {
        async fn send(&self, _topic: &str, partition: Option<i32>, key: Option<&[u8]>, _payload: &[u8]) -> std::result::Result<(), KafkaError> {
            self.sent.lock().unwrap().push((partition, key.map(<[u8]>::to_vec)));
            Ok(())
        }
    }

    fn config() -> KafkaSinkConfig { KafkaSinkConfig { topic: "events".to_string(), num_partitions: 50, key_metadata_key: Some("key".to_string()) } }

    #[tokio::test]
    async fn keyed_message_resolves_to_deterministic_partition() {
        let sink = KafkaSink::new("kafka-test", RecordingClient::default(), config());
        let mut msg = Message::new(StreamId::new(1), "events", Bytes::from_static(b"payload"));
        msg.metadata_mut().insert("key".to_string(), MetaValue::String("hello".to_string()));
        sink.write_message(&msg, |_| panic!("no fallback expected")).await;
        let sent = sink.client.sent.lock().unwrap();
        assert_eq!(sent[0].0, Some(38));
    }

    #[tokio::test]
    async fn unkeyed_message_leaves_partition_unset() {
        let sink = KafkaSink::new("kafka-test", RecordingClient::default(), config());
        let msg = Message::new(StreamId::new(1), "events", Bytes::from_static(b"payload"));
        sink.write_message(&msg, |_| panic!("no fallback expected")).await;
        let sent = sink.client.sent.lock().unwrap();
        assert_eq!(sent[0].0, None);
    }
}
