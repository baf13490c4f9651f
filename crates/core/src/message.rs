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

//! The message a producer consumes from the bus and hands to a sink.

use std::collections::HashMap;

use bytes::Bytes;

/// A value inside a message's metadata map.
///
/// Polymorphic over the handful of shapes a formatter or sink needs to read
/// out of metadata: plain scalars, nested maps, and lists of the same.
#[derive(Debug, Clone, PartialEq)]
pub enum MetaValue {
    String(String),
    Bytes(Bytes),
    Number(f64),
    Bool(bool),
    Map(HashMap<String, MetaValue>),
    List(Vec<MetaValue>),
}

impl MetaValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            MetaValue::String(s) => Some(s.as_str()),
            _ => None,
        }
    }
}

pub type Metadata = HashMap<String, MetaValue>;

/// An opaque, numeric stream identifier paired with its human-readable name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StreamId(pub u64);

impl StreamId {
    pub fn new(id: u64) -> Self { StreamId(id) }
}

/// A single record flowing from the bus through a producer to a sink.
///
/// Cloning copies the payload by value; creation time and stream id are
/// `Copy`. The payload may be locally substituted by a sink that runs a
/// second formatter over the original bytes (the "format-before-field"
/// option), but nothing upstream of the sink ever mutates a `Message` in
/// place.
#[derive(Debug, Clone)]
pub struct Message {
    payload: Bytes,
    stream_id: StreamId,
    stream_name: String,
    created_at: chrono::DateTime<chrono::Utc>,
    metadata: Metadata,
}

impl Message {
    pub fn new(stream_id: StreamId, stream_name: impl Into<String>, payload: impl Into<Bytes>) -> Self {
        Message {
            payload: payload.into(),
            stream_id,
            stream_name: stream_name.into(),
            created_at: chrono::Utc::now(),
            metadata: Metadata::new(),
        }
    }

    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn payload(&self) -> &Bytes { &self.payload }

    /// Byte length of the payload, the unit the batch size threshold counts.
    pub fn len(&self) -> usize { self.payload.len() }

    pub fn is_empty(&self) -> bool { self.payload.is_empty() }

    pub fn stream_id(&self) -> StreamId { self.stream_id }

    pub fn stream_name(&self) -> &str { &self.stream_name }

    pub fn created_at(&self) -> chrono::DateTime<chrono::Utc> { self.created_at }

    pub fn metadata(&self) -> &Metadata { &self.metadata }

    pub fn metadata_mut(&mut self) -> &mut Metadata { &mut self.metadata }

    /// Replaces the payload, leaving stream id, creation time and metadata
    /// untouched. Used by sinks that run a second formatter over the
    /// already-formatted bytes.
    pub fn with_payload(mut self, payload: impl Into<Bytes>) -> Self {
        self.payload = payload.into();
        self
    }

    /// Overrides the creation timestamp. Only the envelope decoder needs
    /// this, to restore the original timestamp of a spooled message instead
    /// of stamping it with the time of replay.
    pub(crate) fn with_created_at(mut self, created_at: chrono::DateTime<chrono::Utc>) -> Self {
        self.created_at = created_at;
        self
    }

    /// Overrides the creation timestamp for tests that need to control
    /// ordering (e.g. CloudWatch's sort-before-batch behaviour) without
    /// sleeping between `Message::new` calls.
    pub fn with_created_at_for_test(mut self, created_at: chrono::DateTime<chrono::Utc>) -> Self {
        self.created_at = created_at;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clone_copies_payload_by_value() {
        let m = Message::new(StreamId::new(1), "app", Bytes::from_static(b"hello"));
        let cloned = m.clone();
        assert_eq!(m.payload(), cloned.payload());
        assert_eq!(m.stream_id(), cloned.stream_id());
    }

    #[test]
    fn with_payload_preserves_identity_fields() {
        let m = Message::new(StreamId::new(7), "app", Bytes::from_static(b"raw"));
        let created = m.created_at();
        let m2 = m.with_payload(Bytes::from_static(b"formatted"));
        assert_eq!(m2.payload().as_ref(), b"formatted");
        assert_eq!(m2.stream_id(), StreamId::new(7));
        assert_eq!(m2.created_at(), created);
    }
}
