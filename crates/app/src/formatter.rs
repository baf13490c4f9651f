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

//! The formatter/modulator pipeline that would otherwise shape a message's
//! bytes before it reaches a producer is a separate collaborator this crate
//! does not own. Every file producer here gets a passthrough formatter that
//! concatenates already-formatted payloads unchanged.

use logship_core::{Formatter, Message};

pub struct PassthroughFormatter;

impl Formatter for PassthroughFormatter {
    fn format(&self, messages: &[Message]) -> Vec<u8> {
        let mut out = Vec::new();
        for m in messages {
            out.extend_from_slice(m.payload());
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;
    use logship_core::StreamId;

    use super::*;

    #[test]
    fn concatenates_payloads_in_order() {
        let formatter = PassthroughFormatter;
        let messages = vec![
            Message::new(StreamId::new(1), "s", Bytes::from_static(b"a\n")),
            Message::new(StreamId::new(1), "s", Bytes::from_static(b"b\n")),
        ];
        assert_eq!(formatter.format(&messages), b"a\nb\n");
    }
}
