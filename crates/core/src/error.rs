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

use snafu::Snafu;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum Error {
    #[snafu(display("append to closed batch"))]
    ClosedBatch {
        #[snafu(implicit)]
        loc: snafu::Location,
    },

    #[snafu(display("message of {size} bytes exceeds batch capacity of {capacity} bytes"))]
    MessageTooLarge {
        size: usize,
        capacity: usize,
        #[snafu(implicit)]
        loc: snafu::Location,
    },

    #[snafu(display("failed to open writer for {path}"))]
    Open {
        path: String,
        source: std::io::Error,
        #[snafu(implicit)]
        loc: snafu::Location,
    },

    #[snafu(display("failed to write to {path}"))]
    Write {
        path: String,
        source: std::io::Error,
        #[snafu(implicit)]
        loc: snafu::Location,
    },

    #[snafu(display("failed to compress {path}"))]
    Compress {
        path: String,
        source: std::io::Error,
        #[snafu(implicit)]
        loc: snafu::Location,
    },

    #[snafu(display("spool file number space is exhausted"))]
    SpoolExhausted {
        #[snafu(implicit)]
        loc: snafu::Location,
    },

    #[snafu(display("invalid configuration: {detail}"))]
    InvalidConfig {
        detail: String,
        #[snafu(implicit)]
        loc: snafu::Location,
    },

    #[snafu(display("malformed message envelope: {detail}"))]
    MalformedEnvelope {
        detail: String,
        #[snafu(implicit)]
        loc: snafu::Location,
    },

    #[snafu(display("spool operation failed"))]
    Spool {
        source: logship_common_spool::SpoolError,
        #[snafu(implicit)]
        loc: snafu::Location,
    },
}

pub type Result<T> = std::result::Result<T, Error>;
