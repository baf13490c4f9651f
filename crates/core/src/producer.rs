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

//! Generic producer lifecycle: an inbound message channel, a control
//! channel carrying `Stop`/`Roll`, and the two control-loop shapes concrete
//! producers drive. A producer is registered with
//! `logship_common_worker::Manager` as a `Trigger::Once` worker whose single
//! `work()` call *is* one of these loops; the loop itself multiplexes
//! messages, ticks and control commands until `Stop` or channel closure.

use std::{future::Future, time::Duration};

use tokio::sync::mpsc;
use tracing::warn;

use crate::{
    message::Message,
    metrics::{MESSAGES_DROPPED, MESSAGES_FALLBACK},
};

/// Commands a supervisor or another producer can send on the control
/// channel. No other values are defined.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlMessage {
    /// Drain the batch, close writers, exit the loop.
    Stop,
    /// Force-rotate without exiting.
    Roll,
}

/// The sending half a bus hands out to feed a producer; kept separate from
/// `ProducerBase` so the receiving task can own its receivers exclusively.
#[derive(Clone)]
pub struct ProducerHandle {
    pub inbound: mpsc::Sender<Message>,
    pub control: mpsc::Sender<ControlMessage>,
}

/// Owns the receiving ends of a producer's channels plus its fallback
/// route. Concrete producers (file, spool, remote sinks) embed one of
/// these and drive it with [`ProducerBase::message_control_loop`] or
/// [`ProducerBase::ticker_message_control_loop`].
pub struct ProducerBase {
    name: String,
    inbound: mpsc::Receiver<Message>,
    control: mpsc::Receiver<ControlMessage>,
    fallback: Option<mpsc::Sender<Message>>,
}

impl ProducerBase {
    pub fn new(
        name: impl Into<String>,
        channel_capacity: usize,
        fallback: Option<mpsc::Sender<Message>>,
    ) -> (Self, ProducerHandle) {
        let (inbound_tx, inbound_rx) = mpsc::channel(channel_capacity);
        let (control_tx, control_rx) = mpsc::channel(16);
        let base = ProducerBase { name: name.into(), inbound: inbound_rx, control: control_rx, fallback };
        let handle = ProducerHandle { inbound: inbound_tx, control: control_tx };
        (base, handle)
    }

    pub fn name(&self) -> &str { &self.name }

    /// Re-routes `msg` to the configured fallback stream. Falls through to
    /// the drop counter if there is no fallback, or the fallback channel
    /// itself has no room (a blocked fallback target is not worth blocking
    /// the producer over).
    pub fn try_fallback(&self, msg: Message) {
        let Some(fallback) = &self.fallback else {
            self.drop_message(&msg);
            return;
        };
        match fallback.try_send(msg) {
            Ok(()) => {
                MESSAGES_FALLBACK.with_label_values(&[&self.name, "fallback"]).inc();
            }
            Err(mpsc::error::TrySendError::Full(m) | mpsc::error::TrySendError::Closed(m)) => {
                self.drop_message(&m);
            }
        }
    }

    pub fn drop_message(&self, msg: &Message) {
        warn!(producer = %self.name, stream = msg.stream_name(), "dropping message, no fallback available");
        MESSAGES_DROPPED.with_label_values(&[&self.name, msg.stream_name()]).inc();
    }

    /// Calls `on_message(msg)` for every inbound message; exits on `Stop`
    /// or when the bus closes the inbound channel. `Roll` invokes
    /// `on_roll` without exiting. `on_stop` always runs before returning.
    pub async fn message_control_loop<M, MFut>(&mut self, mut on_message: M, mut on_roll: impl FnMut(), mut on_stop: impl FnMut())
    where
        M: FnMut(Message) -> MFut,
        MFut: Future<Output = ()>,
    {
        loop {
            tokio::select! {
                biased;
                ctrl = self.control.recv() => {
                    match ctrl {
                        Some(ControlMessage::Stop) | None => break,
                        Some(ControlMessage::Roll) => on_roll(),
                    }
                }
                msg = self.inbound.recv() => {
                    match msg {
                        Some(msg) => on_message(msg).await,
                        None => break,
                    }
                }
            }
        }
        on_stop();
    }

    /// As [`Self::message_control_loop`], plus `on_tick` every `interval`
    /// (used for time-based flush and rotation checks).
    pub async fn ticker_message_control_loop<M, MFut>(
        &mut self,
        mut on_message: M,
        interval: Duration,
        mut on_tick: impl FnMut(),
        mut on_roll: impl FnMut(),
        mut on_stop: impl FnMut(),
    ) where
        M: FnMut(Message) -> MFut,
        MFut: Future<Output = ()>,
    {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                biased;
                ctrl = self.control.recv() => {
                    match ctrl {
                        Some(ControlMessage::Stop) | None => break,
                        Some(ControlMessage::Roll) => on_roll(),
                    }
                }
                msg = self.inbound.recv() => {
                    match msg {
                        Some(msg) => on_message(msg).await,
                        None => break,
                    }
                }
                _ = ticker.tick() => {
                    on_tick();
                }
            }
        }
        on_stop();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    };

    use bytes::Bytes;

    use super::*;
    use crate::message::StreamId;

    #[tokio::test]
    async fn stop_exits_loop_and_runs_stop_callback() {
        let (mut base, handle) = ProducerBase::new("test", 8, None);
        let stopped = Arc::new(AtomicUsize::new(0));
        let stopped2 = stopped.clone();
        handle.control.send(ControlMessage::Stop).await.unwrap();
        base.message_control_loop(|_m| async {}, || {}, || {
            stopped2.fetch_add(1, Ordering::SeqCst);
        })
        .await;
        assert_eq!(stopped.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn channel_closure_exits_loop_like_stop() {
        let (mut base, handle) = ProducerBase::new("test", 8, None);
        drop(handle);
        let seen = Arc::new(AtomicUsize::new(0));
        let seen2 = seen.clone();
        base.message_control_loop(|_m| async {}, || {}, move || {
            seen2.fetch_add(1, Ordering::SeqCst);
        })
        .await;
        assert_eq!(seen.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn roll_invokes_callback_without_exiting() {
        let (mut base, handle) = ProducerBase::new("test", 8, None);
        let rolls = Arc::new(AtomicUsize::new(0));
        let rolls2 = rolls.clone();
        handle.control.send(ControlMessage::Roll).await.unwrap();
        handle.control.send(ControlMessage::Stop).await.unwrap();
        base.message_control_loop(|_m| async {}, move || { rolls2.fetch_add(1, Ordering::SeqCst); }, || {}).await;
        assert_eq!(rolls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn messages_are_delivered_in_order() {
        let (mut base, handle) = ProducerBase::new("test", 8, None);
        for i in 0..3u8 {
            handle
                .inbound
                .send(Message::new(StreamId::new(1), "s", Bytes::from(vec![i])))
                .await
                .unwrap();
        }
        handle.control.send(ControlMessage::Stop).await.unwrap();
        let seen = Arc::new(std::sync::Mutex::new(Vec::new()));
        let seen2 = seen.clone();
        base.message_control_loop(
            move |m| {
                let seen = seen2.clone();
                async move { seen.lock().unwrap().push(m.payload()[0]) }
            },
            || {},
            || {},
        )
        .await;
        assert_eq!(*seen.lock().unwrap(), vec![0, 1, 2]);
    }

    #[tokio::test]
    async fn fallback_without_configured_stream_increments_drop_counter() {
        let (base, _handle) = ProducerBase::new("no-fallback-test", 8, None);
        base.try_fallback(Message::new(StreamId::new(1), "s", Bytes::from_static(b"x")));
    }

    #[tokio::test]
    async fn fallback_with_configured_stream_routes_message() {
        let (fallback_tx, mut fallback_rx) = mpsc::channel(8);
        let (base, _handle) = ProducerBase::new("with-fallback-test", 8, Some(fallback_tx));
        base.try_fallback(Message::new(StreamId::new(1), "s", Bytes::from_static(b"x")));
        let received = fallback_rx.recv().await.unwrap();
        assert_eq!(received.payload().as_ref(), b"x");
    }
}
