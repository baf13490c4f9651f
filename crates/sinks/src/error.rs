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
    #[snafu(display("redis command failed"))]
    Redis {
        source: redis::RedisError,
        #[snafu(implicit)]
        loc: snafu::Location,
    },

    #[snafu(display("scribe log call failed: {reason}"))]
    Scribe {
        reason: String,
        #[snafu(implicit)]
        loc: snafu::Location,
    },

    #[snafu(display("firehose put_record_batch failed: {source}"))]
    Firehose {
        source: Box<dyn std::error::Error + Send + Sync>,
        #[snafu(implicit)]
        loc: snafu::Location,
    },

    #[snafu(display("cloudwatch logs call failed: {source}"))]
    CloudWatch {
        source: Box<dyn std::error::Error + Send + Sync>,
        #[snafu(implicit)]
        loc: snafu::Location,
    },

    #[snafu(display("stackdriver log call failed: {reason}"))]
    Stackdriver {
        reason: String,
        #[snafu(implicit)]
        loc: snafu::Location,
    },

    #[snafu(display("s3 operation failed: {source}"))]
    S3 {
        source: Box<dyn std::error::Error + Send + Sync>,
        #[snafu(implicit)]
        loc: snafu::Location,
    },

    #[snafu(display("kafka produce failed: {reason}"))]
    Kafka {
        reason: String,
        #[snafu(implicit)]
        loc: snafu::Location,
    },

    #[snafu(display("io error writing to console"))]
    Console {
        source: std::io::Error,
        #[snafu(implicit)]
        loc: snafu::Location,
    },
}

pub type Result<T> = std::result::Result<T, Error>;
