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

//! Producer and spool metrics, exported through `prometheus` the way
//! `logship-common-worker::metrics` exports its own gauges.

use lazy_static::lazy_static;
use prometheus::*;

pub const PRODUCER_LABEL: &str = "producer";
pub const STREAM_LABEL: &str = "stream";

lazy_static! {
    pub static ref MESSAGES_WRITTEN: IntCounterVec = register_int_counter_vec!(
        "logship_producer_messages_written_total",
        "Total number of messages successfully written to a sink",
        &[PRODUCER_LABEL, STREAM_LABEL]
    )
    .unwrap();
    pub static ref MESSAGES_DROPPED: IntCounterVec = register_int_counter_vec!(
        "logship_producer_messages_dropped_total",
        "Total number of messages dropped (no fallback available or fallback failed)",
        &[PRODUCER_LABEL, STREAM_LABEL]
    )
    .unwrap();
    pub static ref MESSAGES_FALLBACK: IntCounterVec = register_int_counter_vec!(
        "logship_producer_messages_fallback_total",
        "Total number of messages re-routed through the fallback stream",
        &[PRODUCER_LABEL, STREAM_LABEL]
    )
    .unwrap();
    pub static ref MESSAGES_PER_SEC: GaugeVec = register_gauge_vec!(
        "logship_producer_messages_per_second",
        "Sliding-window messages/sec written to the sink",
        &[PRODUCER_LABEL, STREAM_LABEL]
    )
    .unwrap();
    pub static ref ROTATIONS: IntCounterVec = register_int_counter_vec!(
        "logship_producer_rotations_total",
        "Total number of rotations performed",
        &[PRODUCER_LABEL]
    )
    .unwrap();
    pub static ref PRUNED_FILES: IntCounterVec = register_int_counter_vec!(
        "logship_producer_pruned_files_total",
        "Total number of rotated files removed by the pruner",
        &[PRODUCER_LABEL]
    )
    .unwrap();
    pub static ref SPOOL_WRITES: IntCounterVec = register_int_counter_vec!(
        "logship_spool_writes_total",
        "Total number of messages spooled to disk",
        &[STREAM_LABEL]
    )
    .unwrap();
    pub static ref SPOOL_READS: IntCounterVec = register_int_counter_vec!(
        "logship_spool_reads_total",
        "Total number of messages replayed from the spool",
        &[STREAM_LABEL]
    )
    .unwrap();
}

/// Tracks a 10-sample sliding window of per-interval counts, refreshed into
/// a messages/sec gauge. Not thread-safe by itself; owned by the single
/// task that drives a producer's ticker.
pub struct ThroughputWindow {
    samples: std::collections::VecDeque<u64>,
    capacity: usize,
}

impl ThroughputWindow {
    pub fn new() -> Self { ThroughputWindow { samples: std::collections::VecDeque::with_capacity(10), capacity: 10 } }

    /// Records `count` messages written in the most recent interval and
    /// returns the updated average.
    pub fn record(&mut self, count: u64) -> f64 {
        if self.samples.len() == self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(count);
        self.samples.iter().sum::<u64>() as f64 / self.samples.len() as f64
    }
}

impl Default for ThroughputWindow {
    fn default() -> Self { Self::new() }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn window_averages_over_at_most_ten_samples() {
        let mut w = ThroughputWindow::new();
        for _ in 0..15 {
            w.record(10);
        }
        assert_eq!(w.record(10), 10.0);
    }

    #[test]
    fn window_reflects_changing_throughput() {
        let mut w = ThroughputWindow::new();
        assert_eq!(w.record(0), 0.0);
        assert_eq!(w.record(10), 5.0);
    }
}
