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

//! Write side of the spool: a background thread owns the currently-open
//! `.spl` file and appends base64-framed payloads to it, rotating by size or
//! age. Modeled on the teacher queue's `IOWorker` — a dedicated OS thread fed
//! by a crossbeam channel so append latency never waits on disk I/O.

use std::{
    fs::{File, OpenOptions},
    io::{BufWriter, Write},
    sync::{
        Arc,
        atomic::{AtomicU32, AtomicU64, Ordering},
    },
    thread::{self, JoinHandle},
    time::{Duration, Instant},
};

use crossbeam::channel::{Receiver, Sender, unbounded};
use snafu::ensure;
use tokio::sync::Notify;
use tracing::{info, warn};

use crate::{
    config::SpoolConfig,
    error::{ChannelSendSnafu, SuffixExhaustedSnafu},
    frame, path,
    Result,
};

struct CurrentFile {
    suffix: u32,
    file: BufWriter<File>,
    size: u64,
    created_at: Instant,
}

/// Handle to a stream's spool writer. Cheap to clone; every clone shares the
/// same background thread and the same current-file state.
#[derive(Clone)]
pub struct SpoolWriter {
    tx: Sender<Vec<u8>>,
    /// Suffix of the file currently being written, so the reader never opens
    /// the writer's own file (the spool's I2 invariant).
    active_suffix: Arc<AtomicU32>,
    /// Pinged on every rotation so an idle reader wakes up immediately
    /// instead of waiting out its poll interval.
    roll_notify: Arc<Notify>,
    bytes_written: Arc<AtomicU64>,
}

impl SpoolWriter {
    /// Spawns the background writer thread for one stream's spool.
    ///
    /// # Errors
    /// Returns an error if the stream directory cannot be created or an
    /// existing spool directory cannot be scanned for its highest suffix.
    pub fn spawn(config: SpoolConfig) -> Result<Self> {
        let dir = config.stream_dir();
        std::fs::create_dir_all(&dir)?;
        let existing = path::scan_spool_files(&dir)?;
        let next_suffix = existing.last().map_or(0, |(s, _)| s + 1);

        let (tx, rx) = unbounded();
        let active_suffix = Arc::new(AtomicU32::new(next_suffix));
        let roll_notify = Arc::new(Notify::new());
        let bytes_written = Arc::new(AtomicU64::new(0));

        let mut worker = IOWorker {
            rx,
            config: Arc::new(config),
            current: None,
            next_suffix,
            active_suffix: active_suffix.clone(),
            roll_notify: roll_notify.clone(),
            bytes_written: bytes_written.clone(),
        };

        thread::Builder::new()
            .name("spool-writer".into())
            .spawn(move || worker.run())?;

        Ok(Self { tx, active_suffix, roll_notify, bytes_written })
    }

    /// Appends one already-serialized message envelope. Never blocks on
    /// disk I/O; the payload is handed to the background thread.
    ///
    /// # Errors
    /// Returns an error if the writer thread has already shut down.
    pub fn append(&self, payload: &[u8]) -> Result<()> {
        self.tx
            .send(frame::encode(payload))
            .map_err(|_| ChannelSendSnafu.build())
    }

    /// Suffix of the file currently open for writing.
    #[must_use]
    pub fn active_suffix(&self) -> u32 { self.active_suffix.load(Ordering::Acquire) }

    /// Shared handle to the active-suffix counter, so a [`crate::SpoolReader`]
    /// can avoid ever opening the writer's current file.
    #[must_use]
    pub fn active_suffix_handle(&self) -> Arc<AtomicU32> { self.active_suffix.clone() }

    /// Notification fired every time the writer rotates to a new file.
    #[must_use]
    pub fn roll_notify(&self) -> Arc<Notify> { self.roll_notify.clone() }

    /// Total bytes appended (post base64 encoding) since this writer started.
    #[must_use]
    pub fn bytes_written(&self) -> u64 { self.bytes_written.load(Ordering::Relaxed) }
}

struct IOWorker {
    rx: Receiver<Vec<u8>>,
    config: Arc<SpoolConfig>,
    current: Option<CurrentFile>,
    next_suffix: u32,
    active_suffix: Arc<AtomicU32>,
    roll_notify: Arc<Notify>,
    bytes_written: Arc<AtomicU64>,
}

impl IOWorker {
    fn run(&mut self) {
        loop {
            match self.rx.recv_timeout(Duration::from_millis(100)) {
                Ok(frame) => {
                    if let Err(err) = self.write_frame(&frame) {
                        warn!(stream = %self.config.stream, error = ?err, "spool write failed");
                    }
                }
                Err(crossbeam::channel::RecvTimeoutError::Timeout) => self.maybe_age_rotate(),
                Err(crossbeam::channel::RecvTimeoutError::Disconnected) => break,
            }
        }
        if let Some(cur) = self.current.as_mut() {
            let _ = cur.file.flush();
        }
        info!(stream = %self.config.stream, "spool writer stopped");
    }

    fn needs_rotate(&self) -> bool {
        match &self.current {
            None => true,
            Some(cur) => {
                cur.size >= self.config.max_file_size
                    || cur.created_at.elapsed() >= self.config.max_file_age
            }
        }
    }

    fn maybe_age_rotate(&mut self) {
        if let Some(cur) = &self.current
            && cur.created_at.elapsed() >= self.config.max_file_age
        {
            let _ = self.rotate();
        }
    }

    fn rotate(&mut self) -> Result<()> {
        if let Some(mut cur) = self.current.take() {
            let _ = cur.file.flush();
        }
        ensure!(
            self.next_suffix <= path::MAX_SUFFIX,
            SuffixExhaustedSnafu { stream: self.config.stream.clone() }
        );
        let suffix = self.next_suffix;
        self.next_suffix += 1;
        let path = path::file_path(self.config.stream_dir(), suffix);
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        self.current = Some(CurrentFile {
            suffix,
            file: BufWriter::new(file),
            size: 0,
            created_at: Instant::now(),
        });
        self.active_suffix.store(suffix, Ordering::Release);
        self.roll_notify.notify_one();
        info!(stream = %self.config.stream, suffix, "spool rotated");
        Ok(())
    }

    fn write_frame(&mut self, frame: &[u8]) -> Result<()> {
        if self.needs_rotate() {
            self.rotate()?;
        }
        let cur = self.current.as_mut().expect("rotate() always installs a current file");
        cur.file.write_all(frame)?;
        cur.file.flush()?;
        cur.size += frame.len() as u64;
        self.bytes_written.fetch_add(frame.len() as u64, Ordering::Relaxed);
        Ok(())
    }

    #[allow(dead_code)]
    fn current_suffix(&self) -> Option<u32> { self.current.as_ref().map(|c| c.suffix) }
}

#[cfg(test)]
mod tests {
    use std::time::Duration as StdDuration;

    use super::*;

    fn config(dir: &std::path::Path, stream: &str) -> SpoolConfig {
        SpoolConfig::builder()
            .base_path(dir.to_path_buf())
            .stream(stream)
            .max_file_size(1024)
            .max_file_age(StdDuration::from_secs(3600))
            .build()
    }

    #[test]
    fn appends_create_and_grow_current_file() {
        let dir = tempfile::tempdir().unwrap();
        let writer = SpoolWriter::spawn(config(dir.path(), "orders")).unwrap();
        writer.append(b"hello").unwrap();
        writer.append(b"world").unwrap();
        thread::sleep(StdDuration::from_millis(150));

        let files = path::scan_spool_files(&config(dir.path(), "orders").stream_dir()).unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(writer.active_suffix(), 0);
    }

    #[test]
    fn rotates_on_size_threshold() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = config(dir.path(), "orders");
        cfg.max_file_size = 8; // force a rotation on nearly every frame
        let writer = SpoolWriter::spawn(cfg.clone()).unwrap();
        for i in 0..5 {
            writer.append(format!("msg-{i}").as_bytes()).unwrap();
            thread::sleep(StdDuration::from_millis(20));
        }
        thread::sleep(StdDuration::from_millis(150));

        let files = path::scan_spool_files(&cfg.stream_dir()).unwrap();
        assert!(files.len() > 1, "expected multiple rotated files, got {}", files.len());
    }

    #[test]
    fn resumes_suffix_numbering_after_restart() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = config(dir.path(), "orders");
        std::fs::create_dir_all(cfg.stream_dir()).unwrap();
        std::fs::File::create(path::file_path(cfg.stream_dir(), 0)).unwrap();
        std::fs::File::create(path::file_path(cfg.stream_dir(), 1)).unwrap();

        let writer = SpoolWriter::spawn(cfg).unwrap();
        writer.append(b"after-restart").unwrap();
        thread::sleep(StdDuration::from_millis(150));
        assert_eq!(writer.active_suffix(), 2);
    }
}
