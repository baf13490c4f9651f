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

//! Message-producer runtime shared by every sink: batching, rotation,
//! pruning, the generic producer lifecycle, the on-disk spool and the
//! binary envelope used to serialize a [`Message`] across both.
//!
//! A concrete producer (file, remote sink) is built from these pieces: it
//! embeds a [`producer::ProducerBase`] for its inbound/control channels, a
//! [`writer::BatchedWriter`] per destination for batching and hot-swappable
//! writers, [`rotate`] and [`prune`] for file-producer rotation policy, and
//! [`spool_producer`] when the destination needs a durable fallback. Each
//! producer kind then wraps itself in a small `logship_common_worker::Worker`
//! implementation, as [`file_producer::FileProducerWorker`] does.

pub mod batch;
pub mod config;
pub mod envelope;
pub mod error;
pub mod file_producer;
pub mod message;
pub mod metrics;
pub mod murmur2;
pub mod producer;
pub mod prune;
pub mod rotate;
pub mod spool_producer;
pub mod writer;

pub use batch::{AppendOutcome, MessageBatch};
pub use config::{BatchSettings, ProducerConfig, PruneSettings, RotationSettings};
pub use error::{Error, Result};
pub use file_producer::{FileProducer, FileProducerWorker};
pub use message::{MetaValue, Message, Metadata, StreamId};
pub use producer::{ControlMessage, ProducerBase, ProducerHandle};
pub use prune::{Candidate, PruneConfig};
pub use rotate::{RotateConfig, RotateSubject};
pub use spool_producer::{ReplayTarget, SpoolProducer, SpoolProducerWorker, SpoolReplayWorker};
pub use writer::{BatchedWriter, Formatter, Writer};
