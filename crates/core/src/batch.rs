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

//! Double-buffered, bounded batch accumulator.
//!
//! Appends are lock-free against each other: a single 32-bit word packs the
//! active-slot index into the high bit and a running append count into the
//! low 31 bits, so each appender claims its slot position with one
//! compare-and-swap. A flush CAS-swaps the active bit, captures how many
//! appenders had already claimed a position in the slot it just deactivated,
//! then spins until that many appenders report done before handing the slot
//! to the writer. Per-slot message storage itself uses one `Mutex` per
//! position rather than raw pointers, since this workspace denies
//! `unsafe_code`; distinct positions never contend, so this keeps the
//! lock-free claim true in effect.

use std::{
    sync::{
        Mutex,
        atomic::{AtomicU32, AtomicUsize, Ordering},
    },
    time::{Duration, Instant},
};

use tracing::warn;

use crate::{error, message::Message};

const ACTIVE_BIT: u32 = 1 << 31;
const COUNT_MASK: u32 = !ACTIVE_BIT;

struct Slot {
    messages: Box<[Mutex<Option<Message>>]>,
    bytes: AtomicUsize,
    done: AtomicU32,
}

impl Slot {
    fn new(capacity: usize) -> Self {
        Slot {
            messages: (0..capacity).map(|_| Mutex::new(None)).collect(),
            bytes: AtomicUsize::new(0),
            done: AtomicU32::new(0),
        }
    }

    fn reset(&self) {
        self.bytes.store(0, Ordering::Relaxed);
        self.done.store(0, Ordering::Relaxed);
    }
}

/// Outcome of a single [`MessageBatch::append`] call.
#[derive(Debug, PartialEq, Eq)]
pub enum AppendOutcome {
    /// The message was placed into the active slot.
    Accepted,
    /// The active slot is full; the caller should flush and retry.
    SlotFull,
    /// The message alone exceeds the batch's byte capacity; it was dropped.
    Rejected,
}

pub struct MessageBatch {
    slots: [Slot; 2],
    state: AtomicU32,
    max_count: usize,
    max_bytes: usize,
    flush_lock: Mutex<()>,
    last_flush_time: Mutex<Instant>,
    closed: std::sync::atomic::AtomicBool,
}

impl MessageBatch {
    pub fn new(max_count: usize, max_bytes: usize) -> Self {
        MessageBatch {
            slots: [Slot::new(max_count), Slot::new(max_count)],
            state: AtomicU32::new(0),
            max_count,
            max_bytes,
            flush_lock: Mutex::new(()),
            last_flush_time: Mutex::new(Instant::now()),
            closed: std::sync::atomic::AtomicBool::new(false),
        }
    }

    /// Records `message` into the active slot.
    pub fn append(&self, message: Message) -> std::result::Result<AppendOutcome, error::Error> {
        if self.closed.load(Ordering::Acquire) {
            return error::ClosedBatchSnafu.fail();
        }
        if message.len() > self.max_bytes {
            warn!(size = message.len(), capacity = self.max_bytes, "message exceeds batch capacity, dropping");
            return Ok(AppendOutcome::Rejected);
        }

        loop {
            let old = self.state.load(Ordering::Acquire);
            let active = (old & ACTIVE_BIT != 0) as usize;
            let started = old & COUNT_MASK;
            if started as usize >= self.max_count {
                return Ok(AppendOutcome::SlotFull);
            }
            let bytes_so_far = self.slots[active].bytes.load(Ordering::Relaxed);
            if bytes_so_far + message.len() > self.max_bytes {
                return Ok(AppendOutcome::SlotFull);
            }
            let new = (old & ACTIVE_BIT) | (started + 1);
            if self
                .state
                .compare_exchange_weak(old, new, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                let position = started as usize;
                let len = message.len();
                *self.slots[active].messages[position].lock().unwrap() = Some(message);
                self.slots[active].bytes.fetch_add(len, Ordering::Relaxed);
                self.slots[active].done.fetch_add(1, Ordering::AcqRel);
                return Ok(AppendOutcome::Accepted);
            }
        }
    }

    /// Appends, and on a full slot invokes `flush_fn`, retries once, then
    /// falls back to `fallback_fn` while `still_active_fn()` is true.
    pub fn append_or_flush(
        &self,
        message: Message,
        mut flush_fn: impl FnMut(),
        mut still_active_fn: impl FnMut() -> bool,
        mut fallback_fn: impl FnMut(Message),
    ) -> std::result::Result<(), error::Error> {
        match self.append(message.clone())? {
            AppendOutcome::Accepted | AppendOutcome::Rejected => Ok(()),
            AppendOutcome::SlotFull => {
                flush_fn();
                match self.append(message.clone())? {
                    AppendOutcome::Accepted | AppendOutcome::Rejected => Ok(()),
                    AppendOutcome::SlotFull => {
                        if still_active_fn() {
                            fallback_fn(message);
                        }
                        Ok(())
                    }
                }
            }
        }
    }

    /// Swaps active/idle, waits for in-flight appenders on the drained slot,
    /// then invokes `writer_fn` with the drained messages. Only one flush
    /// runs at a time.
    pub fn flush(&self, mut writer_fn: impl FnMut(&[Message]) -> bool) {
        let _guard = self.flush_lock.lock().unwrap();

        let (drained_idx, captured) = loop {
            let old = self.state.load(Ordering::Acquire);
            let active = (old & ACTIVE_BIT != 0) as usize;
            let started = old & COUNT_MASK;
            let new_active = 1 - active;
            let new = if new_active == 1 { ACTIVE_BIT } else { 0 };
            if self
                .state
                .compare_exchange(old, new, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                break (active, started);
            }
        };

        while self.slots[drained_idx].done.load(Ordering::Acquire) < captured {
            std::thread::yield_now();
        }

        let messages: Vec<Message> = (0..captured as usize)
            .map(|i| self.slots[drained_idx].messages[i].lock().unwrap().take().unwrap())
            .collect();

        let retry = !messages.is_empty() && !writer_fn(&messages);
        if !retry {
            self.slots[drained_idx].reset();
            *self.last_flush_time.lock().unwrap() = Instant::now();
        } else {
            // Writer asked for retry: put the messages back so the next flush
            // cycle picks them up again. The slot is idle so this is safe.
            for (i, m) in messages.into_iter().enumerate() {
                *self.slots[drained_idx].messages[i].lock().unwrap() = Some(m);
            }
        }
    }

    /// Blocks until any in-flight flush completes, or `timeout` elapses.
    /// `Duration::ZERO` waits forever.
    pub fn wait_for_flush(&self, timeout: Duration) {
        if timeout.is_zero() {
            let _ = self.flush_lock.lock().unwrap();
            return;
        }
        let deadline = Instant::now() + timeout;
        loop {
            if let Ok(guard) = self.flush_lock.try_lock() {
                drop(guard);
                return;
            }
            if Instant::now() >= deadline {
                return;
            }
            std::thread::sleep(Duration::from_millis(1));
        }
    }

    pub fn reached_size_threshold(&self, n: usize) -> bool {
        let old = self.state.load(Ordering::Acquire);
        let active = (old & ACTIVE_BIT != 0) as usize;
        self.slots[active].bytes.load(Ordering::Relaxed) >= n
    }

    pub fn reached_time_threshold(&self, d: Duration) -> bool {
        self.last_flush_time.lock().unwrap().elapsed() >= d
    }

    /// Flushes both slots and refuses further appends.
    pub fn close(&self, mut writer_fn: impl FnMut(&[Message]) -> bool, timeout: Duration) {
        self.closed.store(true, Ordering::Release);
        self.flush(&mut writer_fn);
        self.flush(&mut writer_fn);
        self.wait_for_flush(timeout);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex as StdMutex};

    use bytes::Bytes;

    use super::*;
    use crate::message::StreamId;

    fn msg(payload: &'static [u8]) -> Message {
        Message::new(StreamId::new(1), "s", Bytes::from_static(payload))
    }

    #[test]
    fn append_then_flush_preserves_order() {
        let batch = MessageBatch::new(16, 1 << 20);
        for i in 0..4 {
            let m = Message::new(StreamId::new(1), "s", Bytes::from(vec![i as u8]));
            assert_eq!(batch.append(m).unwrap(), AppendOutcome::Accepted);
        }
        let seen = Arc::new(StdMutex::new(Vec::new()));
        let seen2 = seen.clone();
        batch.flush(move |msgs| {
            seen2.lock().unwrap().extend(msgs.iter().map(|m| m.payload()[0]));
            true
        });
        assert_eq!(*seen.lock().unwrap(), vec![0, 1, 2, 3]);
    }

    #[test]
    fn full_slot_reports_slot_full_not_rejected() {
        let batch = MessageBatch::new(2, 1 << 20);
        assert_eq!(batch.append(msg(b"a")).unwrap(), AppendOutcome::Accepted);
        assert_eq!(batch.append(msg(b"b")).unwrap(), AppendOutcome::Accepted);
        assert_eq!(batch.append(msg(b"c")).unwrap(), AppendOutcome::SlotFull);
    }

    #[test]
    fn oversized_message_is_rejected_without_blocking_batch() {
        let batch = MessageBatch::new(16, 4);
        assert_eq!(batch.append(msg(b"too-large")).unwrap(), AppendOutcome::Rejected);
        assert_eq!(batch.append(msg(b"ok")).unwrap(), AppendOutcome::Accepted);
    }

    #[test]
    fn append_or_flush_falls_back_when_still_full_after_retry() {
        let batch = MessageBatch::new(1, 1 << 20);
        assert_eq!(batch.append(msg(b"a")).unwrap(), AppendOutcome::Accepted);

        let fellback = Arc::new(StdMutex::new(None));
        let fellback2 = fellback.clone();
        // flush_fn is a no-op, so the retry still finds the slot full (the
        // first message hasn't been drained) and the fallback fires.
        batch
            .append_or_flush(msg(b"b"), || {}, || true, move |m| {
                *fellback2.lock().unwrap() = Some(m.payload().clone());
            })
            .unwrap();
        assert_eq!(fellback.lock().unwrap().as_deref(), Some(&b"b"[..]));
    }

    #[test]
    fn close_refuses_further_appends() {
        let batch = MessageBatch::new(4, 1 << 20);
        batch.append(msg(b"a")).unwrap();
        batch.close(|_| true, Duration::from_millis(50));
        assert!(batch.append(msg(b"b")).is_err());
    }

    #[test]
    fn concurrent_appenders_each_claim_a_distinct_slot_position() {
        let batch = Arc::new(MessageBatch::new(64, 1 << 20));
        let handles: Vec<_> = (0..32)
            .map(|i| {
                let batch = batch.clone();
                std::thread::spawn(move || {
                    batch
                        .append(Message::new(StreamId::new(1), "s", Bytes::from(vec![i as u8])))
                        .unwrap()
                })
            })
            .collect();
        for h in handles {
            assert_eq!(h.join().unwrap(), AppendOutcome::Accepted);
        }
        let mut seen = Vec::new();
        batch.flush(|msgs| {
            seen = msgs.iter().map(|m| m.payload()[0]).collect();
            true
        });
        seen.sort_unstable();
        assert_eq!(seen, (0u8..32).collect::<Vec<_>>());
    }
}
