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

//! Stackdriver (Google Cloud Logging) sink: one logical logger per stream,
//! lazily resolved to a `log_name` (the stream name unless overridden by
//! `log_name_overrides`). Severity and labels are optionally pulled out of
//! message metadata; the payload field is chosen by the shape of an
//! optional metadata value — raw JSON text if it starts with `{`, a
//! structured payload if metadata holds a submap, otherwise the message
//! body unchanged.

use std::collections::HashMap;

use logship_core::{MetaValue, Message};
use tracing::warn;

use crate::error::Result;

/// One entry handed to the Cloud Logging `write_log_entries` RPC.
#[derive(Debug, Clone, PartialEq)]
pub struct LogEntry {
    pub log_name: String,
    pub severity: String,
    pub labels: HashMap<String, String>,
    pub payload: Payload,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Text(String),
    Json(String),
    Struct(HashMap<String, MetaValue>),
}

/// Thin seam over the Cloud Logging client.
#[async_trait::async_trait]
pub trait StackdriverClient: Send + Sync {
    async fn write_log_entries(&self, entries: Vec<LogEntry>) -> Result<()>;
}

pub struct StackdriverSinkConfig {
    /// Overrides the default `log_name` (the message's stream name) for
    /// specific streams.
    pub log_name_overrides: HashMap<String, String>,
    /// Metadata key holding the severity string; defaults to `"DEFAULT"`
    /// when absent.
    pub severity_metadata_key: Option<String>,
    /// Metadata key holding a submap of extra labels to attach.
    pub labels_metadata_key: Option<String>,
    /// Metadata key whose value becomes the structured payload instead of
    /// the raw message body.
    pub payload_metadata_key: Option<String>,
}

pub struct StackdriverSink<C: StackdriverClient> {
    name: String,
    client: C,
    cfg: StackdriverSinkConfig,
}

impl<C: StackdriverClient> StackdriverSink<C> {
    pub fn new(name: impl Into<String>, client: C, cfg: StackdriverSinkConfig) -> Self { StackdriverSink { name: name.into(), client, cfg } }

    fn log_name(&self, msg: &Message) -> String {
        self.cfg.log_name_overrides.get(msg.stream_name()).cloned().unwrap_or_else(|| msg.stream_name().to_string())
    }

    fn severity(&self, msg: &Message) -> String {
        self.cfg
            .severity_metadata_key
            .as_deref()
            .and_then(|key| msg.metadata().get(key))
            .and_then(MetaValue::as_str)
            .map(str::to_uppercase)
            .unwrap_or_else(|| "DEFAULT".to_string())
    }

    fn labels(&self, msg: &Message) -> HashMap<String, String> {
        let Some(key) = &self.cfg.labels_metadata_key else { return HashMap::new() };
        match msg.metadata().get(key) {
            Some(MetaValue::Map(map)) => map.iter().filter_map(|(k, v)| v.as_str().map(|s| (k.clone(), s.to_string()))).collect(),
            _ => HashMap::new(),
        }
    }

    /// Chooses the payload shape: raw JSON text if the metadata value is a
    /// string starting with `{`, a structured payload if it's a submap,
    /// the value as-is for anything else, falling back to the message body
    /// when no payload key is configured or present.
    fn payload(&self, msg: &Message) -> Payload {
        let Some(key) = &self.cfg.payload_metadata_key else {
            return Payload::Text(String::from_utf8_lossy(msg.payload()).into_owned());
        };
        match msg.metadata().get(key) {
            Some(MetaValue::String(s)) if s.trim_start().starts_with('{') => Payload::Json(s.clone()),
            Some(MetaValue::String(s)) => Payload::Text(s.clone()),
            Some(MetaValue::Map(map)) => Payload::Struct(map.clone()),
            _ => Payload::Text(String::from_utf8_lossy(msg.payload()).into_owned()),
        }
    }

    fn build_entry(&self, msg: &Message) -> LogEntry {
        LogEntry { log_name: self.log_name(msg), severity: self.severity(msg), labels: self.labels(msg), payload: self.payload(msg) }
    }

    /// Writes one message's log entry immediately (Stackdriver's own client
    /// batches internally; this sink does not layer a second batch on top).
    pub async fn write_message(&self, msg: &Message, fallback: impl FnOnce(&Message)) {
        let entry = self.build_entry(msg);
        if let Err(e) = self.client.write_log_entries(vec![entry]).await {
            warn!(sink = %self.name, error = %e, "stackdriver write_log_entries failed");
            fallback(msg);
            return;
        }
        logship_core::metrics::MESSAGES_WRITTEN.with_label_values(&[&self.name, msg.stream_name()]).inc();
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;
    use logship_core::StreamId;

    use super::*;

    #[derive(Default)]
    struct RecordingClient {
        entries: std::sync::Mutex<Vec<LogEntry>>,
    }

    #[async_trait::async_trait]
    impl StackdriverClient for RecordingClient {
        async fn write_log_entries(&self, entries: Vec<LogEntry>) -> Result<()> {
            self.entries.lock().unwrap().extend(entries);
            Ok(())
        }
    }

    fn sink(cfg: StackdriverSinkConfig) -> StackdriverSink<RecordingClient> { StackdriverSink::new("stackdriver-test", RecordingClient::default(), cfg) }

    fn base_config() -> StackdriverSinkConfig {
        StackdriverSinkConfig { log_name_overrides: HashMap::new(), severity_metadata_key: None, labels_metadata_key: None, payload_metadata_key: None }
    }

    #[tokio::test]
    async fn default_log_name_is_stream_name() {
        let sink = sink(base_config());
        let msg = Message::new(StreamId::new(1), "orders", Bytes::from_static(b"x"));
        sink.write_message(&msg, |_| panic!("no fallback expected")).await;
        assert_eq!(sink.client.entries.lock().unwrap()[0].log_name, "orders");
    }

    #[tokio::test]
    async fn log_name_override_takes_precedence() {
        let mut cfg = base_config();
        cfg.log_name_overrides.insert("orders".to_string(), "orders-prod".to_string());
        let sink = sink(cfg);
        let msg = Message::new(StreamId::new(1), "orders", Bytes::from_static(b"x"));
        sink.write_message(&msg, |_| panic!("no fallback expected")).await;
        assert_eq!(sink.client.entries.lock().unwrap()[0].log_name, "orders-prod");
    }

    #[tokio::test]
    async fn json_looking_metadata_string_becomes_json_payload() {
        let mut cfg = base_config();
        cfg.payload_metadata_key = Some("body".to_string());
        let sink = sink(cfg);
        let mut msg = Message::new(StreamId::new(1), "orders", Bytes::from_static(b"x"));
        msg.metadata_mut().insert("body".to_string(), MetaValue::String(r#"{"a":1}"#.to_string()));
        sink.write_message(&msg, |_| panic!("no fallback expected")).await;
        assert_eq!(sink.client.entries.lock().unwrap()[0].payload, Payload::Json(r#"{"a":1}"#.to_string()));
    }

    #[tokio::test]
    async fn missing_severity_key_defaults_to_default_severity() {
        let sink = sink(base_config());
        let msg = Message::new(StreamId::new(1), "orders", Bytes::from_static(b"x"));
        sink.write_message(&msg, |_| panic!("no fallback expected")).await;
        assert_eq!(sink.client.entries.lock().unwrap()[0].severity, "DEFAULT");
    }
}
