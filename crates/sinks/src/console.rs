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

//! Console sink: the simplest adapter in the pack. No batching, no
//! formatter chain beyond the one byte blob it's handed — each message is
//! written straight through with `write_all` as soon as it arrives.

use std::io::Write;

use logship_core::Message;

/// Thin seam over `Write` so tests can substitute an in-memory buffer for
/// stdout.
pub struct ConsoleSink<W: Write + Send> {
    name: String,
    out: std::sync::Mutex<W>,
    /// Appended after every message; matches the destination's own
    /// newline convention rather than assuming one.
    terminator: Vec<u8>,
}

impl<W: Write + Send> ConsoleSink<W> {
    pub fn new(name: impl Into<String>, out: W, terminator: impl Into<Vec<u8>>) -> Self {
        ConsoleSink { name: name.into(), out: std::sync::Mutex::new(out), terminator: terminator.into() }
    }

    /// Writes `msg`'s payload directly, ignoring the fallback path since a
    /// write to stdout either always succeeds or the process is already in
    /// trouble; kept for API symmetry with the other sinks.
    pub fn write_message(&self, msg: &Message, fallback: impl FnOnce(&Message)) {
        let mut out = self.out.lock().unwrap();
        if out.write_all(msg.payload()).and_then(|()| out.write_all(&self.terminator)).is_err() {
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

    #[test]
    fn writes_payload_followed_by_terminator() {
        let buf = Vec::new();
        let sink = ConsoleSink::new("console-test", buf, b"\n".to_vec());
        sink.write_message(&Message::new(StreamId::new(1), "app", Bytes::from_static(b"hello")), |_| panic!("no fallback expected"));
        let out = sink.out.lock().unwrap();
        assert_eq!(out.as_slice(), b"hello\n");
    }
}
