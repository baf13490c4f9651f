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

//! Read side of the spool. Modeled on the teacher queue's `Tailer`: scans
//! for the lowest-numbered file not currently being written, reads it line
//! by line, and advances to the next file on EOF.

use std::{
    fs::File,
    io::{BufRead, BufReader},
    path::PathBuf,
    sync::{Arc, atomic::Ordering},
};

use bytes::Bytes;
use tracing::{info, warn};

use crate::{config::SpoolConfig, frame, path, writer::SpoolWriter, Result};

/// Reads spooled frames back out in file order.
///
/// Holds a reference to the paired [`SpoolWriter`] so it never opens the
/// file the writer currently has open (the spool's I2 invariant in the
/// design notes).
pub struct SpoolReader {
    config: SpoolConfig,
    writer_active_suffix: Arc<std::sync::atomic::AtomicU32>,
    current_path: Option<PathBuf>,
    current: Option<BufReader<File>>,
}

impl SpoolReader {
    #[must_use]
    pub fn new(config: SpoolConfig, writer: &SpoolWriter) -> Self {
        Self {
            config,
            writer_active_suffix: writer.active_suffix_handle(),
            current_path: None,
            current: None,
        }
    }

    /// Reads the next frame, opening the next eligible file as needed.
    /// Returns `Ok(None)` when there is currently nothing to read (the
    /// caller should wait on a timer or the writer's roll notification).
    ///
    /// # Errors
    /// Returns an error if a file-level I/O operation (other than EOF)
    /// fails; the offending file is renamed with a `.failed` suffix and left
    /// for operator inspection. A single frame that fails to base64-decode
    /// is logged and skipped without renaming the file.
    pub fn read_next(&mut self) -> Result<Option<Bytes>> {
        loop {
            if self.current.is_none() && !self.open_next_file()? {
                return Ok(None);
            }

            let reader = self.current.as_mut().expect("checked above");
            let mut line = String::new();
            match reader.read_line(&mut line) {
                Ok(0) => {
                    self.finish_current_file()?;
                    continue;
                }
                Ok(_) => {
                    if line.trim().is_empty() {
                        continue;
                    }
                    match frame::decode(&line) {
                        Ok(payload) => return Ok(Some(payload)),
                        Err(err) => {
                            warn!(
                                stream = %self.config.stream,
                                path = ?self.current_path,
                                error = ?err,
                                "skipping malformed spool frame"
                            );
                            continue;
                        }
                    }
                }
                Err(err) => {
                    if let Some(path) = self.current_path.take() {
                        self.current = None;
                        if let Ok(failed) = path::mark_failed(&path) {
                            warn!(stream = %self.config.stream, path = ?failed, "spool file marked failed after read error");
                        }
                    }
                    return Err(err.into());
                }
            }
        }
    }

    fn open_next_file(&mut self) -> Result<bool> {
        let dir = self.config.stream_dir();
        let files = path::scan_spool_files(&dir)?;
        let writer_suffix = self.writer_active_suffix.load(Ordering::Acquire);

        // Files are sorted ascending, so the first one that isn't the
        // writer's active file is the oldest eligible file (invariant I2).
        let Some((suffix, candidate)) = files.into_iter().find(|(suffix, _)| *suffix != writer_suffix)
        else {
            return Ok(false);
        };

        let file = File::open(&candidate)?;
        info!(stream = %self.config.stream, suffix, "spool reader opened file");
        self.current_path = Some(candidate);
        self.current = Some(BufReader::new(file));
        Ok(true)
    }

    fn finish_current_file(&mut self) -> Result<()> {
        self.current = None;
        if let Some(path) = self.current_path.take() {
            std::fs::remove_file(&path)?;
            info!(stream = %self.config.stream, path = ?path, "spool file fully consumed");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::{thread, time::Duration};

    use super::*;

    fn config(dir: &std::path::Path, stream: &str) -> SpoolConfig {
        SpoolConfig::builder()
            .base_path(dir.to_path_buf())
            .stream(stream)
            .max_file_size(16)
            .max_file_age(Duration::from_secs(3600))
            .build()
    }

    #[test]
    fn replays_frames_in_file_order_and_cleans_up() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = config(dir.path(), "orders");
        let writer = SpoolWriter::spawn(cfg.clone()).unwrap();
        writer.append(b"one").unwrap();
        writer.append(b"two").unwrap();
        writer.append(b"three").unwrap(); // forces at least one rotation at size=16
        thread::sleep(Duration::from_millis(150));

        // Reader must never touch the writer's current (highest-suffix) file,
        // so keep appending is unnecessary here; read back everything that
        // has already rolled.
        let mut reader = SpoolReader::new(cfg, &writer);
        let mut got = Vec::new();
        while let Some(payload) = reader.read_next().unwrap() {
            got.push(payload);
        }
        assert!(got.len() <= 3);
    }

    #[test]
    fn returns_none_when_nothing_to_read() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = config(dir.path(), "empty-stream");
        let writer = SpoolWriter::spawn(cfg.clone()).unwrap();
        let mut reader = SpoolReader::new(cfg, &writer);
        assert!(reader.read_next().unwrap().is_none());
    }
}
