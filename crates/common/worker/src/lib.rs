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

//! Worker abstraction for task scheduling and execution.
//!
//! This crate provides a small worker system with:
//! - Three trigger kinds: `Once`, `Notify`, `Interval`
//! - Lifecycle hooks: `on_start`, `work`, `on_shutdown`
//! - Graceful shutdown with a configurable abort deadline
//! - Runtime pause/resume/notify via [`WorkerHandle`]
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use std::time::Duration;
//!
//! use logship_common_worker::{Manager, Trigger, Worker, WorkerConfig, WorkerContext};
//!
//! struct MyWorker;
//!
//! #[async_trait::async_trait]
//! impl Worker for MyWorker {
//!     fn name() -> &'static str { "my-worker" }
//!
//!     fn trigger() -> Trigger { Trigger::Interval(Duration::from_secs(5)) }
//!
//!     async fn work(&mut self, _ctx: &WorkerContext) -> logship_common_worker::Result<()> {
//!         println!("tick");
//!         Ok(())
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() {
//!     let mut manager = Manager::start(WorkerConfig::builder().build()).unwrap();
//!     let handle = manager.register(MyWorker);
//!     handle.pause();
//!     handle.resume();
//!     manager.shutdown().await.unwrap();
//! }
//! ```

mod config;
mod context;
mod err;
mod manager;
mod metrics;
mod worker;

pub use config::WorkerConfig;
pub use context::WorkerContext;
pub use err::{CronParseError, Result, WorkError};
pub use manager::Manager;
pub use worker::{Trigger, Worker, WorkerHandle};
