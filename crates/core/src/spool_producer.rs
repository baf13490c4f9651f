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

//! Wires `logship-common-spool`'s write and read sides to a stream's
//! message flow: the write side spools a message when its origin sink is
//! unavailable, the read side replays spooled messages back to that origin
//! once it reports itself unblocked.

use std::{sync::Arc, time::Duration};

use logship_common_spool::{SpoolConfig, SpoolReader, SpoolWriter};
use snafu::ResultExt;
use tokio::sync::Notify;
use tracing::warn;

use crate::{
    envelope,
    error::{self, Result},
    message::Message,
    metrics::{SPOOL_READS, SPOOL_WRITES},
    producer::{ProducerBase, ProducerHandle},
};

/// Write side of a stream's spool: encodes a [`Message`] into its binary
/// envelope and hands it to the spool's background writer thread.
pub struct SpoolProducer {
    stream: String,
    writer: SpoolWriter,
}

impl SpoolProducer {
    /// Spawns the background writer thread backing this stream's spool.
    ///
    /// # Errors
    /// Returns an error if the spool directory cannot be created or scanned.
    pub fn spawn(stream: impl Into<String>, config: SpoolConfig) -> Result<Self> {
        let stream = stream.into();
        let writer = SpoolWriter::spawn(config).context(error::SpoolSnafu)?;
        Ok(SpoolProducer { stream, writer })
    }

    /// Encodes and appends `msg`. Never blocks on disk I/O; routes to
    /// `fallback` only if the writer thread has already shut down.
    pub fn write_message(&self, msg: Message, fallback: impl FnOnce(Message)) {
        let bytes = envelope::encode(&msg);
        match self.writer.append(&bytes) {
            Ok(()) => SPOOL_WRITES.with_label_values(&[&self.stream]).inc(),
            Err(e) => {
                warn!(stream = %self.stream, error = %e, "spool append failed, routing to fallback");
                fallback(msg);
            }
        }
    }

    /// Builds the paired reader for this writer's stream.
    #[must_use]
    pub fn reader(&self, config: SpoolConfig) -> SpoolReader { SpoolReader::new(config, &self.writer) }

    /// Notification fired every time the writer rotates files, so a reader
    /// waiting on an empty spool wakes up as soon as there's something new.
    #[must_use]
    pub fn roll_notify(&self) -> Arc<Notify> { self.writer.roll_notify() }
}

/// Bridges a [`SpoolProducer`] into `logship_common_worker`'s scheduler. The
/// whole `message_control_loop` run is the single `work()` call of a
/// `Trigger::Once` worker; `Roll` is a no-op since the spool rotates on its
/// own size/age thresholds regardless of control messages.
pub struct SpoolProducerWorker {
    producer: Arc<SpoolProducer>,
    base: ProducerBase,
}

impl SpoolProducerWorker {
    pub fn new(
        name: impl Into<String>,
        stream: impl Into<String>,
        config: SpoolConfig,
        channel_capacity: usize,
    ) -> Result<(Self, ProducerHandle)> {
        let name = name.into();
        let (base, handle) = ProducerBase::new(name, channel_capacity, None);
        let producer = Arc::new(SpoolProducer::spawn(stream, config)?);
        Ok((SpoolProducerWorker { producer, base }, handle))
    }

    #[must_use]
    pub fn producer(&self) -> Arc<SpoolProducer> { self.producer.clone() }
}

#[async_trait::async_trait]
impl logship_common_worker::Worker for SpoolProducerWorker {
    fn name() -> &'static str { "SpoolProducer" }

    fn trigger() -> logship_common_worker::Trigger { logship_common_worker::Trigger::Once }

    async fn work(&mut self, _ctx: &logship_common_worker::WorkerContext) -> logship_common_worker::Result<()> {
        let producer = self.producer.clone();
        self.base
            .message_control_loop(
                move |msg| {
                    let producer = producer.clone();
                    async move {
                        producer.write_message(msg, |m| {
                            warn!(stream = m.stream_name(), "spooled message dropped, no further fallback");
                        });
                    }
                },
                || {},
                || {},
            )
            .await;
        Ok(())
    }
}

/// Destination a [`SpoolReplayWorker`] re-injects spooled messages into once
/// it reports itself able to accept more work.
#[async_trait::async_trait]
pub trait ReplayTarget: Send + Sync {
    /// Whether the origin is currently backpressured; while `true` the
    /// replay loop waits instead of reading further frames.
    fn is_blocked(&self) -> bool;

    /// Re-delivers one replayed message to its origin.
    async fn route_to_origin(&self, msg: Message) -> Result<()>;
}

/// Read side of a stream's spool: drains frames back to their origin,
/// retrying every 100ms while the origin reports itself blocked.
pub struct SpoolReplayWorker {
    stream: String,
    reader: SpoolReader,
    roll_notify: Arc<Notify>,
    target: Arc<dyn ReplayTarget>,
}

impl SpoolReplayWorker {
    pub fn new(stream: impl Into<String>, reader: SpoolReader, roll_notify: Arc<Notify>, target: Arc<dyn ReplayTarget>) -> Self {
        SpoolReplayWorker { stream: stream.into(), reader, roll_notify, target }
    }

    async fn replay_one(&self, bytes: bytes::Bytes) {
        match envelope::decode(&bytes) {
            Ok(msg) => {
                SPOOL_READS.with_label_values(&[&self.stream]).inc();
                if let Err(e) = self.target.route_to_origin(msg).await {
                    warn!(stream = %self.stream, error = %e, "replayed message could not be routed to origin");
                }
            }
            Err(e) => warn!(stream = %self.stream, error = %e, "skipping malformed spooled message"),
        }
    }
}

#[async_trait::async_trait]
impl logship_common_worker::Worker for SpoolReplayWorker {
    fn name() -> &'static str { "SpoolReplay" }

    fn trigger() -> logship_common_worker::Trigger { logship_common_worker::Trigger::Once }

    async fn work(&mut self, ctx: &logship_common_worker::WorkerContext) -> logship_common_worker::Result<()> {
        while !ctx.is_cancelled() {
            if self.target.is_blocked() {
                tokio::select! {
                    () = tokio::time::sleep(Duration::from_millis(100)) => {}
                    () = ctx.cancelled() => break,
                }
                continue;
            }

            match self.reader.read_next() {
                Ok(Some(bytes)) => self.replay_one(bytes).await,
                Ok(None) => {
                    tokio::select! {
                        () = self.roll_notify.notified() => {}
                        () = tokio::time::sleep(Duration::from_millis(500)) => {}
                        () = ctx.cancelled() => break,
                    }
                }
                Err(e) => {
                    warn!(stream = %self.stream, error = %e, "spool read failed");
                    tokio::select! {
                        () = tokio::time::sleep(Duration::from_millis(100)) => {}
                        () = ctx.cancelled() => break,
                    }
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    use bytes::Bytes;

    use super::*;
    use crate::message::StreamId;

    fn config(dir: &std::path::Path, stream: &str) -> SpoolConfig {
        SpoolConfig::builder().base_path(dir.to_path_buf()).stream(stream).max_file_size(16).build()
    }

    struct RecordingTarget {
        blocked: AtomicBool,
        received: std::sync::Mutex<Vec<u8>>,
        count: AtomicUsize,
    }

    #[async_trait::async_trait]
    impl ReplayTarget for RecordingTarget {
        fn is_blocked(&self) -> bool { self.blocked.load(Ordering::Acquire) }

        async fn route_to_origin(&self, msg: Message) -> Result<()> {
            self.received.lock().unwrap().extend_from_slice(msg.payload());
            self.count.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test]
    async fn spools_then_replays_to_origin() {
        let dir = tempfile::tempdir().unwrap();
        let producer = SpoolProducer::spawn("orders", config(dir.path(), "orders")).unwrap();
        producer.write_message(Message::new(StreamId::new(1), "orders", Bytes::from_static(b"one")), |_| panic!("no fallback expected"));
        producer.write_message(Message::new(StreamId::new(1), "orders", Bytes::from_static(b"two")), |_| panic!("no fallback expected"));
        tokio::time::sleep(Duration::from_millis(150)).await;

        let reader = producer.reader(config(dir.path(), "orders"));
        let target = Arc::new(RecordingTarget {
            blocked: AtomicBool::new(false),
            received: std::sync::Mutex::new(Vec::new()),
            count: AtomicUsize::new(0),
        });
        let worker = SpoolReplayWorker::new("orders", reader, producer.roll_notify(), target.clone());

        let mut manager = logship_common_worker::Manager::start(logship_common_worker::WorkerConfig::builder().build()).unwrap();
        manager.register(worker);
        tokio::time::sleep(Duration::from_millis(300)).await;
        manager.shutdown().await.unwrap();

        assert!(target.count.load(Ordering::SeqCst) >= 1);
    }
}
