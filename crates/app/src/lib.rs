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

//! Supervisor wiring a daemon config into running producers.
//!
//! The message bus that would normally feed streams to producers and route
//! their fallbacks lives outside this crate. In its absence, a producer's
//! `fallback_stream` is resolved against the names of sibling sections in
//! the same configuration file: a one-level lookup, not a general routing
//! table. Chains of fallbacks (A falls back to B, which itself falls back
//! to C) are not supported; `B` must be declared without a `fallback_stream`
//! of its own.

pub mod config;
pub mod error;
pub mod formatter;

use std::{collections::HashMap, path::Path};

use config::{DaemonConfig, ProducerSection};
pub use error::{Error, Result};
use error::{ParseConfigSnafu, ProducerSnafu, ReadConfigSnafu, UnresolvedFallbackSnafu, WorkerManagerSnafu};
use logship_common_spool::SpoolConfig;
use logship_common_telemetry::logging::{TracingOptions, init_global_logging};
use logship_common_worker::{Manager, WorkerConfig};
use logship_core::{ControlMessage, FileProducerWorker, SpoolProducerWorker};
use snafu::{OptionExt, ResultExt};
use tokio::sync::mpsc;
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;

/// Runs the daemon until a shutdown signal is observed, then drains every
/// producer and waits for its worker to finish.
pub struct App {
    manager: Manager,
    control_senders: Vec<(String, mpsc::Sender<ControlMessage>)>,
    shutdown_timeout: std::time::Duration,
    _logging_guards: Vec<WorkerGuard>,
}

impl App {
    /// Reads and parses `config_path`, initializes logging and constructs
    /// every configured producer, registering it with the worker manager.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or parsed, if a
    /// `fallback_stream` names no sibling producer, or if the worker
    /// manager fails to start.
    pub fn bootstrap(app_name: &str, config_path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(config_path)
            .context(ReadConfigSnafu { path: config_path.display().to_string() })?;
        let cfg: DaemonConfig =
            toml::from_str(&raw).context(ParseConfigSnafu { path: config_path.display().to_string() })?;

        let guards = init_global_logging(app_name, &cfg.logging, &TracingOptions::default(), None);

        let mut manager = Manager::start(WorkerConfig::builder().shutdown_timeout(cfg.shutdown_timeout()).build())
            .context(WorkerManagerSnafu)?;

        let control_senders = wire_producers(&mut manager, &cfg)?;

        Ok(App { manager, control_senders, shutdown_timeout: cfg.shutdown_timeout(), _logging_guards: guards })
    }

    /// Blocks until Ctrl-C is observed, asks every producer to stop and
    /// drain, then tears down the worker manager.
    ///
    /// # Errors
    /// Returns an error if the worker manager reports a shutdown failure.
    pub async fn run(self) -> Result<()> {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to install ctrl-c handler, shutting down immediately");
        } else {
            info!("shutdown signal received");
        }
        self.shutdown().await
    }

    /// Stops every producer and waits (up to the configured timeout) for
    /// its worker task to exit cleanly.
    ///
    /// # Errors
    /// Returns an error if the worker manager reports a shutdown failure.
    pub async fn shutdown(self) -> Result<()> {
        for (name, control) in &self.control_senders {
            if control.send(ControlMessage::Stop).await.is_err() {
                warn!(producer = %name, "control channel already closed when sending stop");
            }
        }
        info!(timeout = ?self.shutdown_timeout, "waiting for producers to drain");
        self.manager.shutdown().await.context(WorkerManagerSnafu)
    }
}

/// Lets [`wire_producers`] hold a heterogeneous list of not-yet-registered
/// workers (file vs. spool) without committing to a common concrete type.
trait RegisterableWorker {
    fn register(self: Box<Self>, manager: &mut Manager);
}

impl RegisterableWorker for SpoolProducerWorker {
    fn register(self: Box<Self>, manager: &mut Manager) { manager.register(*self); }
}

/// Constructs every configured producer and registers it with `manager`,
/// returning each producer's control-channel sender for later shutdown.
fn wire_producers(manager: &mut Manager, cfg: &DaemonConfig) -> Result<Vec<(String, mpsc::Sender<ControlMessage>)>> {
    // First pass: construct every producer without a resolved fallback, so
    // their inbound senders are available to whichever sibling names them
    // as a fallback target in the second pass.
    let mut inbound_senders = HashMap::new();
    let mut file_workers = HashMap::new();
    let mut other_workers = Vec::new();

    for (name, section) in &cfg.producers {
        match section {
            ProducerSection::File(file_section) => {
                let (worker, handle) = FileProducerWorker::new(
                    name.clone(),
                    file_section.common.clone(),
                    Box::new(formatter::PassthroughFormatter),
                    cfg.channel_capacity,
                    None,
                );
                inbound_senders.insert(name.clone(), handle.inbound.clone());
                file_workers.insert(name.clone(), (worker, handle));
            }
            ProducerSection::Spool(spool_section) => {
                let stream = spool_section.stream.clone().unwrap_or_else(|| name.clone());
                let spool_cfg = SpoolConfig::builder()
                    .base_path(cfg.spool_dir.clone())
                    .stream(stream.clone())
                    .max_file_size(spool_section.max_file_size)
                    .max_file_age(std::time::Duration::from_secs(spool_section.max_file_age_sec))
                    .build();
                let (worker, handle) = SpoolProducerWorker::new(name.clone(), stream, spool_cfg, cfg.channel_capacity)
                    .context(ProducerSnafu { name: name.clone() })?;
                other_workers.push((name.clone(), handle, Box::new(worker) as Box<dyn RegisterableWorker>));
            }
        }
    }

    // Second pass: rebuild every file producer that declares a
    // `fallback_stream`, this time with the resolved sender. Producers
    // without a fallback keep their first-pass instance.
    for (name, section) in &cfg.producers {
        let ProducerSection::File(file_section) = section else { continue };
        let Some(target) = section.fallback_stream() else { continue };
        let sender = inbound_senders
            .get(target)
            .cloned()
            .context(UnresolvedFallbackSnafu { name: name.clone(), target: target.to_string() })?;
        let (worker, handle) = FileProducerWorker::new(
            name.clone(),
            file_section.common.clone(),
            Box::new(formatter::PassthroughFormatter),
            cfg.channel_capacity,
            Some(sender),
        );
        file_workers.insert(name.clone(), (worker, handle));
    }

    let mut control_senders = Vec::new();
    for (name, (worker, handle)) in file_workers {
        manager.register(worker);
        control_senders.push((name, handle.control));
    }
    for (name, handle, worker) in other_workers {
        worker.register(manager);
        control_senders.push((name, handle.control));
    }

    Ok(control_senders)
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    fn write_config(dir: &Path, contents: &str) -> std::path::PathBuf {
        let path = dir.join("logship.toml");
        let mut f = std::fs::File::create(&path).unwrap();
        f.write_all(contents.as_bytes()).unwrap();
        path
    }

    #[tokio::test]
    async fn bootstrap_wires_a_single_file_producer_and_shuts_down_cleanly() {
        let dir = tempfile::tempdir().unwrap();
        let log_dir = dir.path().join("logs");
        let config_path = write_config(
            dir.path(),
            &format!(
                r#"
                spool_dir = "{spool}"

                [producers.app]
                kind = "file"
                streams = ["app"]
                file = "{file}"
                "#,
                spool = dir.path().join("spool").display(),
                file = log_dir.join("app.log").display(),
            ),
        );

        let app = App::bootstrap("logship-test", &config_path).unwrap();
        app.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn unresolved_fallback_stream_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let config_path = write_config(
            dir.path(),
            &format!(
                r#"
                spool_dir = "{spool}"

                [producers.app]
                kind = "file"
                streams = ["app"]
                file = "{file}"
                fallback_stream = "does-not-exist"
                "#,
                spool = dir.path().join("spool").display(),
                file = dir.path().join("app.log").display(),
            ),
        );

        let err = App::bootstrap("logship-test", &config_path).unwrap_err();
        assert!(matches!(err, Error::UnresolvedFallback { .. }));
    }
}
