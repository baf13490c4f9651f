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

//! Sink-specific metrics. Generic per-message counters (written/dropped)
//! are shared with file producers via `logship_core::metrics`, keyed by
//! sink name under the same `producer` label.

use lazy_static::lazy_static;
use prometheus::*;

lazy_static! {
    pub static ref FIREHOSE_RECORDS_PER_SEC: GaugeVec = register_gauge_vec!(
        "logship_sink_firehose_records_per_second",
        "Records per second sent to Firehose, per stream",
        &["stream"]
    )
    .unwrap();
    pub static ref CLOUDWATCH_BATCH_SPLITS: IntCounterVec = register_int_counter_vec!(
        "logship_sink_cloudwatch_batch_splits_total",
        "Number of times a CloudWatch batch was split on count/size/time-span limits",
        &["stream"]
    )
    .unwrap();
    pub static ref KAFKA_PARTITION_SELECTIONS: IntCounterVec = register_int_counter_vec!(
        "logship_sink_kafka_partition_selections_total",
        "Number of messages routed to a partition, by selection method (keyed/random)",
        &["method"]
    )
    .unwrap();
}
