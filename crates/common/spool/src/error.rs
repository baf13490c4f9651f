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

use std::{io, path::PathBuf};

use snafu::Snafu;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum SpoolError {
    #[snafu(display("IO error on spool file"))]
    Io {
        #[snafu(source)]
        source: io::Error,
        #[snafu(implicit)]
        loc: snafu::Location,
    },

    #[snafu(display("Failed to send frame to the spool writer thread"))]
    ChannelSend {
        #[snafu(implicit)]
        loc: snafu::Location,
    },

    #[snafu(display("Malformed spool frame: {reason}"))]
    CorruptedFrame {
        reason: String,
        #[snafu(implicit)]
        loc: snafu::Location,
    },

    #[snafu(display("Invalid spool file path: {path:?}"))]
    InvalidPath {
        path: PathBuf,
        #[snafu(implicit)]
        loc: snafu::Location,
    },

    #[snafu(display("Spool file suffix space exhausted for stream {stream}"))]
    SuffixExhausted {
        stream: String,
        #[snafu(implicit)]
        loc: snafu::Location,
    },

    #[snafu(display("Internal spool error: {message}"))]
    Internal {
        message: String,
        #[snafu(implicit)]
        loc: snafu::Location,
    },
}

impl From<io::Error> for SpoolError {
    fn from(source: io::Error) -> Self {
        // snafu::Location is only available via an implicit capture at a call
        // site; when converting from a bare `?`-propagated io::Error we have
        // no call-site context to attach, so we fall back to a synthetic one.
        Self::Io {
            source,
            loc: snafu::Location::new(file!(), line!(), column!()),
        }
    }
}

pub type Result<T> = std::result::Result<T, SpoolError>;
