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

//! `BatchedWriter`: owns a [`MessageBatch`] and a pluggable sink writer,
//! serializes flushed batches through a formatter, and routes write failures
//! through the producer's fallback path.

use std::{
    sync::{Arc, Mutex, atomic::AtomicU64},
    time::{Duration, Instant},
};

use tracing::{error, warn};

use crate::{batch::MessageBatch, message::Message, rotate::RotateSubject};

/// A sink-specific byte destination a `BatchedWriter` can hold.
pub trait Writer: Send {
    fn write(&mut self, bytes: &[u8]) -> std::io::Result<usize>;
    fn name(&self) -> &str;
    fn size(&self) -> u64;
    fn is_accessible(&self) -> bool;
    fn close(self: Box<Self>) -> std::io::Result<()>;
}

/// Renders a drained batch slice into bytes ready for a `Writer`.
pub trait Formatter: Send + Sync {
    fn format(&self, messages: &[Message]) -> Vec<u8>;
}

struct CurrentWriter {
    writer: Box<dyn Writer>,
    created_at: chrono::DateTime<chrono::Utc>,
    bytes_written: AtomicU64,
}

/// Owns a batch plus the writer it currently flushes into. The writer can be
/// hot-swapped: the previous one is handed back to the caller to close in
/// the background (so compression can overlap with new writes), while the
/// new one takes over inside the same lock that serializes flush
/// completion.
pub struct BatchedWriter {
    batch: MessageBatch,
    formatter: Arc<dyn Formatter>,
    current: Mutex<Option<CurrentWriter>>,
    fallback: Box<dyn Fn(Message) + Send + Sync>,
}

impl BatchedWriter {
    pub fn new(
        max_count: usize,
        max_bytes: usize,
        formatter: Arc<dyn Formatter>,
        fallback: Box<dyn Fn(Message) + Send + Sync>,
    ) -> Self {
        BatchedWriter {
            batch: MessageBatch::new(max_count, max_bytes),
            formatter,
            current: Mutex::new(None),
            fallback,
        }
    }

    pub fn batch(&self) -> &MessageBatch { &self.batch }

    /// Installs `writer`, returning the previous one (if any) for the
    /// caller to close, possibly in the background.
    pub fn set_writer(&self, writer: Box<dyn Writer>) -> Option<Box<dyn Writer>> {
        let mut guard = self.current.lock().unwrap();
        let previous = guard.take().map(|c| c.writer);
        *guard = Some(CurrentWriter {
            writer,
            created_at: chrono::Utc::now(),
            bytes_written: AtomicU64::new(0),
        });
        previous
    }

    pub fn has_writer(&self) -> bool { self.current.lock().unwrap().is_some() }

    /// Serializes the drained batch through the formatter and writes it.
    /// On a write error, every message in the batch is routed through the
    /// fallback function and the flush reports success (the slot is not
    /// retried) unless the writer is currently inaccessible, in which case
    /// the caller should avoid driving further flushes until it recovers.
    pub fn flush_now(&self) {
        let formatter = &self.formatter;
        let fallback = &self.fallback;
        self.batch.flush(|messages| {
            let mut guard = self.current.lock().unwrap();
            let Some(current) = guard.as_mut() else {
                for m in messages {
                    fallback(m.clone());
                }
                return true;
            };
            let bytes = formatter.format(messages);
            match current.writer.write(&bytes) {
                Ok(n) => {
                    current.bytes_written.fetch_add(n as u64, std::sync::atomic::Ordering::Relaxed);
                    true
                }
                Err(e) => {
                    error!(error = %e, writer = current.writer.name(), "write failed, routing batch to fallback");
                    for m in messages {
                        fallback(m.clone());
                    }
                    true
                }
            }
        });
    }

    pub fn wait_for_flush(&self, timeout: Duration) { self.batch.wait_for_flush(timeout); }

    /// Flushes, waits for completion and closes the current writer.
    pub fn close(&self, timeout: Duration) {
        self.batch.close(
            |messages| {
                let mut guard = self.current.lock().unwrap();
                let Some(current) = guard.as_mut() else {
                    for m in messages {
                        (self.fallback)(m.clone());
                    }
                    return true;
                };
                let bytes = self.formatter.format(messages);
                if let Err(e) = current.writer.write(&bytes) {
                    warn!(error = %e, "write failed during shutdown flush");
                    for m in messages {
                        (self.fallback)(m.clone());
                    }
                }
                true
            },
            timeout,
        );
        if let Some(current) = self.current.lock().unwrap().take() {
            if let Err(e) = current.writer.close() {
                warn!(error = %e, "error closing writer during shutdown");
            }
        }
    }
}

impl RotateSubject for BatchedWriter {
    fn size(&self) -> Option<u64> { self.current.lock().unwrap().as_ref().map(|c| c.writer.size()) }

    fn created_at(&self) -> Option<chrono::DateTime<chrono::Utc>> {
        self.current.lock().unwrap().as_ref().map(|c| c.created_at)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex as StdMutex};

    use bytes::Bytes;

    use super::*;
    use crate::message::StreamId;

    struct VecWriter(Arc<StdMutex<Vec<u8>>>, bool);

    impl Writer for VecWriter {
        fn write(&mut self, bytes: &[u8]) -> std::io::Result<usize> {
            if !self.1 {
                return Err(std::io::Error::other("unavailable"));
            }
            self.0.lock().unwrap().extend_from_slice(bytes);
            Ok(bytes.len())
        }

        fn name(&self) -> &str { "vec" }

        fn size(&self) -> u64 { self.0.lock().unwrap().len() as u64 }

        fn is_accessible(&self) -> bool { self.1 }

        fn close(self: Box<Self>) -> std::io::Result<()> { Ok(()) }
    }

    struct LineFormatter;

    impl Formatter for LineFormatter {
        fn format(&self, messages: &[Message]) -> Vec<u8> {
            let mut out = Vec::new();
            for m in messages {
                out.extend_from_slice(m.payload());
            }
            out
        }
    }

    #[test]
    fn flush_writes_through_formatter() {
        let sink = Arc::new(StdMutex::new(Vec::new()));
        let fallback_calls = Arc::new(StdMutex::new(0usize));
        let fallback_calls2 = fallback_calls.clone();
        let bw = BatchedWriter::new(
            16,
            1 << 20,
            Arc::new(LineFormatter),
            Box::new(move |_m| {
                *fallback_calls2.lock().unwrap() += 1;
            }),
        );
        bw.set_writer(Box::new(VecWriter(sink.clone(), true)));
        bw.batch()
            .append(Message::new(StreamId::new(1), "s", Bytes::from_static(b"x\n")))
            .unwrap();
        bw.flush_now();
        assert_eq!(sink.lock().unwrap().as_slice(), b"x\n");
        assert_eq!(*fallback_calls.lock().unwrap(), 0);
    }

    #[test]
    fn write_failure_routes_every_message_to_fallback() {
        let sink = Arc::new(StdMutex::new(Vec::new()));
        let fellback = Arc::new(StdMutex::new(Vec::new()));
        let fellback2 = fellback.clone();
        let bw = BatchedWriter::new(
            16,
            1 << 20,
            Arc::new(LineFormatter),
            Box::new(move |m| fellback2.lock().unwrap().push(m)),
        );
        bw.set_writer(Box::new(VecWriter(sink, false)));
        bw.batch()
            .append(Message::new(StreamId::new(1), "s", Bytes::from_static(b"x\n")))
            .unwrap();
        bw.flush_now();
        assert_eq!(fellback.lock().unwrap().len(), 1);
    }

    #[test]
    fn set_writer_returns_previous_for_background_close() {
        let bw = BatchedWriter::new(16, 1 << 20, Arc::new(LineFormatter), Box::new(|_| {}));
        assert!(bw.set_writer(Box::new(VecWriter(Arc::new(StdMutex::new(Vec::new())), true))).is_none());
        let previous = bw.set_writer(Box::new(VecWriter(Arc::new(StdMutex::new(Vec::new())), true)));
        assert!(previous.is_some());
    }
}
