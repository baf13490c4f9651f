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

//! On-disk FIFO spool used as a durable fallback when a producer's target
//! sink is unavailable.
//!
//! Each stream owns a directory of numbered `NNNNNNNN.spl` files. A
//! [`SpoolWriter`] appends base64-framed payloads to the highest-numbered
//! file, rotating by size or age. A [`SpoolReader`] always consumes the
//! lowest-numbered file that isn't the writer's current target, deleting
//! each file once fully read. Recovery after a crash is just a directory
//! scan: the lowest-numbered file on disk is the reader's next target,
//! and the writer resumes numbering from the highest suffix found.

mod config;
mod error;
mod frame;
mod path;
mod reader;
mod writer;

pub use config::SpoolConfig;
pub use error::{Result, SpoolError};
pub use reader::SpoolReader;
pub use writer::SpoolWriter;
