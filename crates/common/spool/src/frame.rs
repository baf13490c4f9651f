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

//! Spool frame: `base64(payload) + "\n"`.
//!
//! The spool itself is agnostic of what the payload means — it is the job of
//! `logship-core` to serialize a `Message` into bytes before handing it to
//! the writer, and to deserialize the bytes handed back by the reader.

use base64::{Engine as _, engine::general_purpose::STANDARD};
use bytes::Bytes;

use crate::error::CorruptedFrameSnafu;
use crate::Result;
use snafu::ResultExt;

/// Encodes a single frame as a base64 line, including the trailing newline.
pub fn encode(payload: &[u8]) -> Vec<u8> {
    let mut out = STANDARD.encode(payload).into_bytes();
    out.push(b'\n');
    out
}

/// Decodes a single frame line (without the trailing newline) back to bytes.
pub fn decode(line: &str) -> Result<Bytes> {
    let line = line.trim_end_matches(['\n', '\r']);
    let decoded = STANDARD
        .decode(line)
        .context(CorruptedFrameSnafu { reason: "invalid base64".to_string() })?;
    Ok(Bytes::from(decoded))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_arbitrary_bytes() {
        let payload = b"hello, spool\x00\x01\x02";
        let encoded = encode(payload);
        let line = std::str::from_utf8(&encoded).unwrap();
        let decoded = decode(line.trim_end_matches('\n')).unwrap();
        assert_eq!(decoded.as_ref(), payload);
    }

    #[test]
    fn rejects_malformed_base64() {
        assert!(decode("not valid base64!!").is_err());
    }
}
