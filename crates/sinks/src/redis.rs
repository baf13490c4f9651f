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

//! Redis sink: binds a message to one of `{hash,list,set,sortedset,string}`
//! collection operations. `key` and, for `hash`/`sortedset`, `field`/`score`
//! come from auxiliary formatters over either the raw message or the
//! already-formatted payload, selected once at configuration time (tagged
//! variant, no dynamic dispatch on the hot path).

use logship_core::{Formatter, Message};
use snafu::ResultExt;
use tracing::warn;

use crate::error::{self, Result};

/// Redis collection operation a sink instance is bound to.
pub enum StoreOp {
    Hash,
    List,
    Set,
    SortedSet,
    String,
}

/// Thin seam over a live Redis connection so unit tests can substitute a
/// recording fake instead of a server.
pub trait RedisClient: Send + Sync {
    fn hset(&mut self, key: &str, field: &str, value: &[u8]) -> std::result::Result<(), redis::RedisError>;
    fn rpush(&mut self, key: &str, value: &[u8]) -> std::result::Result<(), redis::RedisError>;
    fn sadd(&mut self, key: &str, value: &[u8]) -> std::result::Result<(), redis::RedisError>;
    fn zadd(&mut self, key: &str, score: f64, member: &[u8]) -> std::result::Result<(), redis::RedisError>;
    fn set(&mut self, key: &str, value: &[u8]) -> std::result::Result<(), redis::RedisError>;
}

impl RedisClient for redis::Connection {
    fn hset(&mut self, key: &str, field: &str, value: &[u8]) -> std::result::Result<(), redis::RedisError> {
        use redis::Commands;
        self.hset::<_, _, _, ()>(key, field, value)
    }

    fn rpush(&mut self, key: &str, value: &[u8]) -> std::result::Result<(), redis::RedisError> {
        use redis::Commands;
        self.rpush::<_, _, ()>(key, value)
    }

    fn sadd(&mut self, key: &str, value: &[u8]) -> std::result::Result<(), redis::RedisError> {
        use redis::Commands;
        self.sadd::<_, _, ()>(key, value)
    }

    fn zadd(&mut self, key: &str, score: f64, member: &[u8]) -> std::result::Result<(), redis::RedisError> {
        use redis::Commands;
        self.zadd::<_, _, _, ()>(key, member, score)
    }

    fn set(&mut self, key: &str, value: &[u8]) -> std::result::Result<(), redis::RedisError> {
        use redis::Commands;
        self.set::<_, _, ()>(key, value)
    }
}

pub struct RedisSinkConfig {
    pub op: StoreOp,
    /// Feed the key formatter the post-format payload instead of the raw
    /// message payload.
    pub key_after_format: bool,
    /// Feed the field formatter (hash) the post-format payload.
    pub field_after_format: bool,
}

/// Scores for `zadd` come from a numeric extractor over a message rather
/// than a byte formatter.
pub trait ScoreSource: Send + Sync {
    fn score(&self, msg: &Message) -> f64;
}

pub struct RedisSink<C: RedisClient> {
    name: String,
    client: std::sync::Mutex<C>,
    cfg: RedisSinkConfig,
    key_formatter: Box<dyn Formatter>,
    field_formatter: Option<Box<dyn Formatter>>,
    score_source: Option<Box<dyn ScoreSource>>,
    value_formatter: Box<dyn Formatter>,
}

impl<C: RedisClient> RedisSink<C> {
    pub fn new(
        name: impl Into<String>,
        client: C,
        cfg: RedisSinkConfig,
        key_formatter: Box<dyn Formatter>,
        field_formatter: Option<Box<dyn Formatter>>,
        score_source: Option<Box<dyn ScoreSource>>,
        value_formatter: Box<dyn Formatter>,
    ) -> Self {
        RedisSink {
            name: name.into(),
            client: std::sync::Mutex::new(client),
            cfg,
            key_formatter,
            field_formatter,
            score_source,
            value_formatter,
        }
    }

    /// Writes `msg` through the bound collection operation. On any client
    /// error the message is routed to `fallback` and dropped from Redis.
    pub fn write_message(&self, msg: Message, fallback: impl FnOnce(Message)) {
        if let Err(e) = self.try_write(&msg) {
            warn!(sink = %self.name, error = %e, "redis write failed, routing to fallback");
            fallback(msg);
            return;
        }
        logship_core::metrics::MESSAGES_WRITTEN.with_label_values(&[&self.name, msg.stream_name()]).inc();
    }

    fn try_write(&self, msg: &Message) -> Result<()> {
        let value = self.value_formatter.format(std::slice::from_ref(msg));
        let key = {
            let key_input = if self.cfg.key_after_format { value.clone() } else { msg.payload().to_vec() };
            let key_bytes = self.key_formatter.format(&[msg.clone().with_payload(key_input)]);
            String::from_utf8_lossy(&key_bytes).into_owned()
        };

        let mut client = self.client.lock().unwrap();
        match self.cfg.op {
            StoreOp::Hash => {
                let field_formatter = self.field_formatter.as_ref().expect("hash op requires a field formatter");
                let field_input = if self.cfg.field_after_format { value.clone() } else { msg.payload().to_vec() };
                let field_bytes = field_formatter.format(&[msg.clone().with_payload(field_input)]);
                let field = String::from_utf8_lossy(&field_bytes).into_owned();
                client.hset(&key, &field, &value).context(error::RedisSnafu)
            }
            StoreOp::List => client.rpush(&key, &value).context(error::RedisSnafu),
            StoreOp::Set => client.sadd(&key, &value).context(error::RedisSnafu),
            StoreOp::SortedSet => {
                let score_source = self.score_source.as_ref().expect("sortedset op requires a score source");
                client.zadd(&key, score_source.score(msg), &value).context(error::RedisSnafu)
            }
            StoreOp::String => client.set(&key, &value).context(error::RedisSnafu),
        }
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;
    use logship_core::StreamId;

    use super::*;

    struct PassthroughFormatter;
    impl Formatter for PassthroughFormatter {
        fn format(&self, messages: &[Message]) -> Vec<u8> { messages[0].payload().to_vec() }
    }

    struct StreamNameAsKey;
    impl Formatter for StreamNameAsKey {
        fn format(&self, messages: &[Message]) -> Vec<u8> { messages[0].stream_name().as_bytes().to_vec() }
    }

    #[derive(Default)]
    struct RecordingClient {
        list_pushes: Vec<(String, Vec<u8>)>,
    }

    impl RedisClient for RecordingClient {
        fn hset(&mut self, _key: &str, _field: &str, _value: &[u8]) -> std::result::Result<(), redis::RedisError> { Ok(()) }

        fn rpush(&mut self, key: &str, value: &[u8]) -> std::result::Result<(), redis::RedisError> {
            self.list_pushes.push((key.to_string(), value.to_vec()));
            Ok(())
        }

        fn sadd(&mut self, _key: &str, _value: &[u8]) -> std::result::Result<(), redis::RedisError> { Ok(()) }

        fn zadd(&mut self, _key: &str, _score: f64, _member: &[u8]) -> std::result::Result<(), redis::RedisError> { Ok(()) }

        fn set(&mut self, _key: &str, _value: &[u8]) -> std::result::Result<(), redis::RedisError> { Ok(()) }
    }

    #[test]
    fn list_op_pushes_formatted_value_under_stream_name_key() {
        let sink = RedisSink::new(
            "redis-test",
            RecordingClient::default(),
            RedisSinkConfig { op: StoreOp::List, key_after_format: false, field_after_format: false },
            Box::new(StreamNameAsKey),
            None,
            None,
            Box::new(PassthroughFormatter),
        );
        sink.write_message(Message::new(StreamId::new(1), "orders", Bytes::from_static(b"payload")), |_| panic!("no fallback expected"));
        let client = sink.client.lock().unwrap();
        assert_eq!(client.list_pushes, vec![("orders".to_string(), b"payload".to_vec())]);
    }
}
