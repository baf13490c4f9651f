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

use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use tokio::sync::Notify;

use crate::{
    context::WorkerContext,
    err::Result,
    metrics::{WORKER_PAUSED, WORKER_RESUMED},
};

/// Execution schedule a registered worker runs under.
#[derive(Debug, Clone)]
pub enum Trigger {
    /// Runs `work` exactly once, then the registration task exits.
    Once,
    /// Runs `work` each time `WorkerHandle::notify` is called.
    Notify,
    /// Runs `work` on a fixed period, skipping missed ticks rather than
    /// bursting to catch up.
    Interval(Duration),
}

/// Core worker trait: a stateful task run by a [`crate::Manager`] according
/// to its [`Trigger`]. Configuration (name, trigger, blocking) is exposed as
/// associated functions rather than constructor arguments so the manager can
/// query it before the worker is moved onto its task.
#[async_trait::async_trait]
pub trait Worker: Send + 'static {
    /// Stable identifier used in logs and metric labels.
    fn name() -> &'static str;

    /// Schedule this worker runs under.
    fn trigger() -> Trigger;

    /// Whether `work` performs blocking I/O and should run on the blocking
    /// thread pool instead of being polled directly on the async runtime.
    fn is_blocking() -> bool { false }

    /// Called once before the first `work` execution. Errors abort the
    /// worker before it ever runs.
    async fn on_start(&mut self, _ctx: &WorkerContext) -> Result<()> { Ok(()) }

    /// The unit of work, invoked according to `trigger()`.
    async fn work(&mut self, ctx: &WorkerContext) -> Result<()>;

    /// Called once after the worker loop exits, whether cleanly or on
    /// error. Use for flushing buffers or releasing resources.
    async fn on_shutdown(&mut self, _ctx: &WorkerContext) -> Result<()> { Ok(()) }
}

/// Handle returned by `Manager::register`. Lets the caller notify, pause and
/// resume the worker without holding a reference to it.
pub struct WorkerHandle {
    name:   &'static str,
    notify: Arc<Notify>,
    paused: Arc<AtomicBool>,
}

impl WorkerHandle {
    pub(crate) fn new(name: &'static str, notify: Arc<Notify>, paused: Arc<AtomicBool>) -> Self {
        WorkerHandle { name, notify, paused }
    }

    pub fn name(&self) -> &'static str { self.name }

    /// Wakes a `Trigger::Notify` worker waiting on its next execution.
    pub fn notify(&self) { self.notify.notify_one(); }

    /// Soft-pauses the worker: its loop keeps ticking but `work` is skipped
    /// until `resume` is called.
    pub fn pause(&self) {
        self.paused.store(true, Ordering::Release);
        WORKER_PAUSED.with_label_values(&[self.name]).inc();
    }

    pub fn resume(&self) {
        self.paused.store(false, Ordering::Release);
        WORKER_RESUMED.with_label_values(&[self.name]).inc();
    }

    pub fn is_paused(&self) -> bool { self.paused.load(Ordering::Acquire) }
}
