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

//! Scribe sink: a double-buffered categorized batch with the same
//! swap-and-wait discipline as [`logship_core::MessageBatch`], but flushing
//! invokes the Scribe RPC `log(entries)` instead of a byte-oriented writer.
//! On error the producer calls `on_error` and leaves the slot to retry on
//! the next flush cycle.

use logship_core::{Message, MessageBatch};
use tracing::warn;

/// One row of the Scribe `log` RPC.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    pub category: String,
    pub message: String,
}

/// Thin seam over a Scribe Thrift client.
pub trait ScribeClient: Send + Sync {
    fn log(&self, entries: &[LogEntry]) -> std::result::Result<(), String>;
}

pub struct ScribeSink<C: ScribeClient> {
    name: String,
    client: C,
    batch: MessageBatch,
    /// At most this many entries are sent per `log` call; a flush larger
    /// than this is sent as multiple calls.
    writer_count: usize,
}

impl<C: ScribeClient> ScribeSink<C> {
    pub fn new(name: impl Into<String>, client: C, max_count: usize, max_bytes: usize, writer_count: usize) -> Self {
        ScribeSink { name: name.into(), client, batch: MessageBatch::new(max_count, max_bytes), writer_count }
    }

    /// Appends `msg`, flushing first if `on_full` decides the batch is full.
    /// `fallback` receives messages that still don't fit after a flush.
    pub fn append_or_block(&self, msg: Message, mut fallback: impl FnMut(Message)) {
        let _ = self.batch.append_or_flush(msg, || self.flush(), || true, |m| fallback(m));
    }

    /// Drains both slots and issues one `log` RPC per `writer_count`-sized
    /// chunk. A failing chunk calls `on_error` and its messages are put
    /// back for the next flush to retry.
    pub fn flush(&self) {
        let name = &self.name;
        let client = &self.client;
        let writer_count = self.writer_count;
        self.batch.flush(move |messages| {
            for chunk in messages.chunks(writer_count.max(1)) {
                let entries: Vec<LogEntry> = chunk
                    .iter()
                    .map(|m| LogEntry { category: m.stream_name().to_string(), message: String::from_utf8_lossy(m.payload()).into_owned() })
                    .collect();
                if let Err(e) = client.log(&entries) {
                    warn!(sink = %name, error = %e, "scribe log call failed, will retry on next flush");
                    return false;
                }
            }
            true
        });
    }

    /// Flushes everything and refuses further appends.
    pub fn close(&self, timeout: std::time::Duration) {
        let name = &self.name;
        let client = &self.client;
        let writer_count = self.writer_count;
        self.batch.close(
            move |messages| {
                for chunk in messages.chunks(writer_count.max(1)) {
                    let entries: Vec<LogEntry> = chunk
                        .iter()
                        .map(|m| LogEntry { category: m.stream_name().to_string(), message: String::from_utf8_lossy(m.payload()).into_owned() })
                        .collect();
                    if let Err(e) = client.log(&entries) {
                        warn!(sink = %name, error = %e, "scribe log call failed during close");
                        return false;
                    }
                }
                true
            },
            timeout,
        );
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;
    use logship_core::StreamId;

    use super::*;

    struct RecordingClient {
        calls: std::sync::Mutex<Vec<Vec<LogEntry>>>,
    }

    impl ScribeClient for RecordingClient {
        fn log(&self, entries: &[LogEntry]) -> std::result::Result<(), String> {
            self.calls.lock().unwrap().push(entries.to_vec());
            Ok(())
        }
    }

    #[test]
    fn close_flushes_all_appended_messages_in_one_call() {
        let client = RecordingClient { calls: std::sync::Mutex::new(Vec::new()) };
        let sink = ScribeSink::new("scribe-test", client, 16, 1 << 20, 16);
        for i in 0..5u8 {
            sink.append_or_block(Message::new(StreamId::new(1), "app", Bytes::from(vec![i])), |_| panic!("no fallback expected"));
        }
        sink.close(std::time::Duration::from_millis(100));

        let calls = sink.client.calls.lock().unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].len(), 5);
        assert_eq!(calls[0].iter().map(|e| e.category.clone()).collect::<Vec<_>>(), vec!["app"; 5]);
    }
}
