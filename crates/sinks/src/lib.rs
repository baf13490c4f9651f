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

//! Remote-sink adapters built on top of `logship-core`'s batching and
//! producer primitives. Each module binds one external system's wire
//! protocol at the contract level: the fields it populates from a
//! [`logship_core::Message`] and the framing rules it imposes, behind a
//! thin client trait so unit tests substitute a recording fake instead of
//! a live connection.

pub mod cloudwatch;
pub mod console;
pub mod error;
pub mod firehose;
pub mod kafka;
pub mod metrics;
pub mod redis;
pub mod s3;
pub mod scribe;
pub mod stackdriver;

pub use error::{Error, Result};
