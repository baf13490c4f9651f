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

//! Length-prefixed binary envelope used to serialize a [`Message`] for the
//! spool. The wire shape is `{stream_id, stream_name, creation_time_unix_nanos,
//! metadata, payload}`, each variable-length field preceded by a `u32`
//! little-endian byte count. `logship-common-spool` only ever sees the
//! resulting bytes as an opaque frame; this module is what gives them
//! meaning.

use std::collections::HashMap;

use bytes::Bytes;

use crate::{
    error::{self, Result},
    message::{MetaValue, Message, Metadata, StreamId},
};

const TAG_STRING: u8 = 0;
const TAG_BYTES: u8 = 1;
const TAG_NUMBER: u8 = 2;
const TAG_BOOL: u8 = 3;
const TAG_MAP: u8 = 4;
const TAG_LIST: u8 = 5;

/// Serializes `msg` into the spool's binary envelope.
pub fn encode(msg: &Message) -> Vec<u8> {
    let mut out = Vec::with_capacity(msg.payload().len() + 64);
    out.extend_from_slice(&msg.stream_id().0.to_le_bytes());
    write_bytes(&mut out, msg.stream_name().as_bytes());
    out.extend_from_slice(&msg.created_at().timestamp_nanos_opt().unwrap_or(0).to_le_bytes());
    let metadata_bytes = encode_metadata(msg.metadata());
    write_bytes(&mut out, &metadata_bytes);
    write_bytes(&mut out, msg.payload());
    out
}

/// Inverse of [`encode`]. Malformed input is reported, never panics.
pub fn decode(bytes: &[u8]) -> Result<Message> {
    let mut cursor = Cursor::new(bytes);
    let stream_id = StreamId::new(cursor.read_u64()?);
    let stream_name = String::from_utf8(cursor.read_bytes()?.to_vec())
        .map_err(|e| error::MalformedEnvelopeSnafu { detail: format!("stream name is not utf-8: {e}") }.build())?;
    let nanos = cursor.read_i64()?;
    let created_at = chrono::DateTime::from_timestamp(nanos / 1_000_000_000, (nanos.rem_euclid(1_000_000_000)) as u32)
        .unwrap_or_else(chrono::Utc::now);
    let metadata_bytes = cursor.read_bytes()?;
    let metadata = decode_metadata(metadata_bytes)?;
    let payload = Bytes::copy_from_slice(cursor.read_bytes()?);
    Ok(Message::new(stream_id, stream_name, payload).with_metadata(metadata).with_created_at(created_at))
}

fn write_bytes(out: &mut Vec<u8>, bytes: &[u8]) {
    out.extend_from_slice(&(bytes.len() as u32).to_le_bytes());
    out.extend_from_slice(bytes);
}

fn encode_metadata(metadata: &Metadata) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(&(metadata.len() as u32).to_le_bytes());
    for (key, value) in metadata {
        write_bytes(&mut out, key.as_bytes());
        encode_value(&mut out, value);
    }
    out
}

fn encode_value(out: &mut Vec<u8>, value: &MetaValue) {
    match value {
        MetaValue::String(s) => {
            out.push(TAG_STRING);
            write_bytes(out, s.as_bytes());
        }
        MetaValue::Bytes(b) => {
            out.push(TAG_BYTES);
            write_bytes(out, b);
        }
        MetaValue::Number(n) => {
            out.push(TAG_NUMBER);
            out.extend_from_slice(&n.to_le_bytes());
        }
        MetaValue::Bool(b) => {
            out.push(TAG_BOOL);
            out.push(u8::from(*b));
        }
        MetaValue::Map(m) => {
            out.push(TAG_MAP);
            out.extend_from_slice(&encode_metadata(m));
        }
        MetaValue::List(items) => {
            out.push(TAG_LIST);
            out.extend_from_slice(&(items.len() as u32).to_le_bytes());
            for item in items {
                encode_value(out, item);
            }
        }
    }
}

fn decode_metadata(bytes: &[u8]) -> Result<Metadata> {
    let mut cursor = Cursor::new(bytes);
    decode_metadata_from(&mut cursor)
}

fn decode_metadata_from(cursor: &mut Cursor<'_>) -> Result<Metadata> {
    let count = cursor.read_u32()?;
    let mut map = HashMap::with_capacity(count as usize);
    for _ in 0..count {
        let key = String::from_utf8(cursor.read_bytes()?.to_vec())
            .map_err(|e| error::MalformedEnvelopeSnafu { detail: format!("metadata key is not utf-8: {e}") }.build())?;
        let value = decode_value(cursor)?;
        map.insert(key, value);
    }
    Ok(map)
}

fn decode_value(cursor: &mut Cursor<'_>) -> Result<MetaValue> {
    match cursor.read_u8()? {
        TAG_STRING => {
            let s = String::from_utf8(cursor.read_bytes()?.to_vec())
                .map_err(|e| error::MalformedEnvelopeSnafu { detail: format!("metadata string is not utf-8: {e}") }.build())?;
            Ok(MetaValue::String(s))
        }
        TAG_BYTES => Ok(MetaValue::Bytes(Bytes::copy_from_slice(cursor.read_bytes()?))),
        TAG_NUMBER => Ok(MetaValue::Number(f64::from_le_bytes(cursor.read_array()?))),
        TAG_BOOL => Ok(MetaValue::Bool(cursor.read_u8()? != 0)),
        TAG_MAP => Ok(MetaValue::Map(decode_metadata_from(cursor)?)),
        TAG_LIST => {
            let count = cursor.read_u32()?;
            let mut items = Vec::with_capacity(count as usize);
            for _ in 0..count {
                items.push(decode_value(cursor)?);
            }
            Ok(MetaValue::List(items))
        }
        other => error::MalformedEnvelopeSnafu { detail: format!("unknown metadata tag {other}") }.fail(),
    }
}

struct Cursor<'a> {
    bytes: &'a [u8],
    pos:   usize,
}

impl<'a> Cursor<'a> {
    fn new(bytes: &'a [u8]) -> Self { Cursor { bytes, pos: 0 } }

    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        if self.pos + n > self.bytes.len() {
            return error::MalformedEnvelopeSnafu { detail: "unexpected end of envelope".to_string() }.fail();
        }
        let slice = &self.bytes[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    fn read_array<const N: usize>(&mut self) -> Result<[u8; N]> {
        self.take(N).map(|s| s.try_into().expect("length checked by take"))
    }

    fn read_u8(&mut self) -> Result<u8> { Ok(self.read_array::<1>()?[0]) }

    fn read_u32(&mut self) -> Result<u32> { Ok(u32::from_le_bytes(self.read_array()?)) }

    fn read_u64(&mut self) -> Result<u64> { Ok(u64::from_le_bytes(self.read_array()?)) }

    fn read_i64(&mut self) -> Result<i64> { Ok(i64::from_le_bytes(self.read_array()?)) }

    fn read_bytes(&mut self) -> Result<&'a [u8]> {
        let len = self.read_u32()? as usize;
        self.take(len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_payload_stream_id_and_metadata() {
        let mut meta = Metadata::new();
        meta.insert("k".to_string(), MetaValue::String("v".to_string()));
        meta.insert("n".to_string(), MetaValue::Number(3.5));
        meta.insert("flag".to_string(), MetaValue::Bool(true));
        meta.insert(
            "list".to_string(),
            MetaValue::List(vec![MetaValue::String("a".to_string()), MetaValue::Number(1.0)]),
        );
        let mut nested = Metadata::new();
        nested.insert("inner".to_string(), MetaValue::Bytes(Bytes::from_static(b"raw")));
        meta.insert("nested".to_string(), MetaValue::Map(nested));

        let msg = Message::new(StreamId::new(42), "events", Bytes::from_static(b"payload")).with_metadata(meta);
        let encoded = encode(&msg);
        let decoded = decode(&encoded).unwrap();

        assert_eq!(decoded.stream_id(), msg.stream_id());
        assert_eq!(decoded.stream_name(), msg.stream_name());
        assert_eq!(decoded.payload(), msg.payload());
        assert_eq!(decoded.metadata(), msg.metadata());
        assert_eq!(decoded.created_at().timestamp_nanos_opt(), msg.created_at().timestamp_nanos_opt());
    }

    #[test]
    fn truncated_envelope_is_reported_not_panicked() {
        let msg = Message::new(StreamId::new(1), "s", Bytes::from_static(b"x"));
        let mut encoded = encode(&msg);
        encoded.truncate(encoded.len() - 1);
        assert!(decode(&encoded).is_err());
    }

    #[test]
    fn unknown_metadata_tag_is_reported() {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&1u64.to_le_bytes());
        write_bytes(&mut bytes, b"s");
        bytes.extend_from_slice(&0i64.to_le_bytes());
        let mut meta_bytes = Vec::new();
        meta_bytes.extend_from_slice(&1u32.to_le_bytes());
        write_bytes(&mut meta_bytes, b"k");
        meta_bytes.push(0xEE);
        write_bytes(&mut bytes, &meta_bytes);
        write_bytes(&mut bytes, b"payload");
        assert!(decode(&bytes).is_err());
    }
}
