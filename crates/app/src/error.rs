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
    #[snafu(display("failed to read daemon config at {path}"))]
    ReadConfig {
        path: String,
        source: std::io::Error,
        #[snafu(implicit)]
        loc: snafu::Location,
    },

    #[snafu(display("failed to parse daemon config at {path}"))]
    ParseConfig {
        path: String,
        source: toml::de::Error,
        #[snafu(implicit)]
        loc: snafu::Location,
    },

    #[snafu(display("producer {name} is configured with fallback_stream {target:?}, which does not name another producer in this file"))]
    UnresolvedFallback { name: String, target: String },

    #[snafu(display("failed to start worker manager"))]
    WorkerManager {
        source: logship_common_worker::WorkError,
        #[snafu(implicit)]
        loc: snafu::Location,
    },

    #[snafu(display("failed to start producer {name}"))]
    Producer {
        name: String,
        source: logship_core::Error,
        #[snafu(implicit)]
        loc: snafu::Location,
    },
}

pub type Result<T> = std::result::Result<T, Error>;
