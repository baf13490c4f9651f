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

//! Per-stream file producer: one [`BatchedWriter`] per destination path,
//! wildcard-expanded from the stream name, with rotation, background gzip
//! compression and pruning.

use std::{
    collections::HashMap,
    fs::OpenOptions,
    io::{Read, Write},
    path::{Path, PathBuf},
    sync::{Arc, Mutex},
    time::Duration,
};

use tracing::{error, info, warn};

use crate::{
    config::ProducerConfig,
    message::{Message, StreamId},
    metrics::{PRUNED_FILES, ROTATIONS},
    producer::{ProducerBase, ProducerHandle},
    prune::{self, PruneConfig},
    rotate::{self, RotateConfig, RotateSubject},
    writer::{BatchedWriter, Formatter, Writer},
};

/// A plain file on disk, tracked for rotation decisions.
struct FileWriter {
    path: PathBuf,
    file: std::fs::File,
    size: u64,
    accessible: bool,
}

impl Writer for FileWriter {
    fn write(&mut self, bytes: &[u8]) -> std::io::Result<usize> {
        match self.file.write_all(bytes) {
            Ok(()) => {
                self.size += bytes.len() as u64;
                Ok(bytes.len())
            }
            Err(e) => {
                self.accessible = false;
                Err(e)
            }
        }
    }

    fn name(&self) -> &str { self.path.to_str().unwrap_or("<non-utf8 path>") }

    fn size(&self) -> u64 { self.size }

    fn is_accessible(&self) -> bool { self.accessible }

    fn close(self: Box<Self>) -> std::io::Result<()> {
        let mut file = self.file;
        file.flush()
    }
}

struct PathEntry {
    writer: BatchedWriter,
}

impl RotateSubject for PathEntry {
    fn size(&self) -> Option<u64> { self.writer.size() }

    fn created_at(&self) -> Option<chrono::DateTime<chrono::Utc>> { self.writer.created_at() }
}

/// Per-message byte cap for a destination's batch; large enough that no
/// realistic single log line is rejected, small enough to bound memory.
const MAX_BATCH_BYTES: usize = 256 * 1024 * 1024;

/// Owns every destination this producer currently writes to, keyed both by
/// stream id (fast path lookup) and by resolved path (so multiple streams
/// sharing a wildcard-free template share one writer).
pub struct FileProducer {
    name: String,
    cfg: ProducerConfig,
    rotate_cfg: RotateConfig,
    prune_cfg: PruneConfig,
    formatter: std::sync::Arc<dyn Formatter>,
    by_stream: Mutex<HashMap<StreamId, PathBuf>>,
    by_path: Mutex<HashMap<PathBuf, PathEntry>>,
}

impl FileProducer {
    pub fn new(name: impl Into<String>, cfg: ProducerConfig, formatter: Box<dyn Formatter>) -> Self {
        let formatter: std::sync::Arc<dyn Formatter> = std::sync::Arc::from(formatter);
        let rotate_cfg = RotateConfig::builder()
            .enabled(cfg.rotation.enable)
            .size_bytes(cfg.rotation.size_mb * 1024 * 1024)
            .timeout(Duration::from_secs(cfg.rotation.timeout_min * 60))
            .maybe_at(cfg.rotation.at.as_deref().and_then(parse_hh_mm))
            .timestamp_format(cfg.rotation.timestamp.clone())
            .zero_pad(cfg.rotation.zero_padding)
            .compress_on_close(cfg.rotation.compress)
            .build();
        let prune_cfg = PruneConfig::builder()
            .count(cfg.prune.count)
            .after_hours(cfg.prune.after_hours)
            .total_size_mb(cfg.prune.total_size_mb)
            .reserve_bytes(cfg.rotation.size_mb * 1024 * 1024)
            .build();
        FileProducer {
            name: name.into(),
            cfg,
            rotate_cfg,
            prune_cfg,
            formatter,
            by_stream: Mutex::new(HashMap::new()),
            by_path: Mutex::new(HashMap::new()),
        }
    }

    fn resolve_template(&self, stream_name: &str) -> (PathBuf, String, String) {
        let template = Path::new(&self.cfg.file);
        let dir = template.parent().map_or_else(|| PathBuf::from("."), Path::to_path_buf);
        let ext = template.extension().map(|e| format!(".{}", e.to_string_lossy())).unwrap_or_default();
        let stem = template
            .file_stem()
            .map(|s| s.to_string_lossy().replace('*', stream_name))
            .unwrap_or_else(|| stream_name.to_string());
        (dir, stem, ext)
    }

    /// Writes `msg` to the destination for its stream, opening or rotating
    /// the writer as needed. Never blocks on I/O beyond opening the file.
    pub fn write_message(&self, msg: Message, fallback: impl FnOnce(Message)) {
        let path = self.get_or_rotate(msg.stream_id(), msg.stream_name(), false);
        let Some(path) = path else {
            fallback(msg);
            return;
        };
        let mut by_path = self.by_path.lock().unwrap();
        let entry = by_path.get_mut(&path).expect("resolved path always has an entry");
        if let Err(e) = entry.writer.batch().append(msg.clone()) {
            warn!(producer = %self.name, error = %e, "append failed, routing to fallback");
            drop(by_path);
            fallback(msg);
            return;
        }
        if entry.writer.batch().reached_size_threshold(self.cfg.batch.flush_count) {
            entry.writer.flush_now();
        }
    }

    /// Returns the resolved path for `stream_id`/`stream_name`, opening or
    /// rotating the backing writer first if required.
    fn get_or_rotate(&self, stream_id: StreamId, stream_name: &str, force: bool) -> Option<PathBuf> {
        let (dir, base_name, ext) = self.resolve_template(stream_name);
        let path_key = dir.join(format!("{base_name}{ext}"));

        let needs_new = {
            let by_path = self.by_path.lock().unwrap();
            match by_path.get(&path_key) {
                Some(entry) => rotate::needs_rotate(&self.rotate_cfg, entry, force),
                None => true,
            }
        };

        if needs_new && let Err(e) = self.open_or_rotate(&dir, &base_name, &ext, &path_key) {
            error!(producer = %self.name, error = %e, path = %path_key.display(), "failed to open destination writer");
            return None;
        }

        self.by_stream.lock().unwrap().insert(stream_id, path_key.clone());
        Some(path_key)
    }

    fn open_or_rotate(&self, dir: &Path, base_name: &str, ext: &str, path_key: &PathBuf) -> std::io::Result<()> {
        std::fs::create_dir_all(dir)?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(dir, std::fs::Permissions::from_mode(self.cfg.folder_permissions))?;
        }

        let ts = chrono::Utc::now().format(&self.rotate_cfg.timestamp_format).to_string();
        let rotation_enabled = self.rotate_cfg.enabled;
        let final_path = if rotation_enabled {
            let existing = existing_counters(dir, base_name, &ts, ext);
            dir.join(rotate::rotated_name(base_name, ext, &ts, self.rotate_cfg.zero_pad, &existing))
        } else {
            path_key.clone()
        };

        let mut open_opts = OpenOptions::new();
        open_opts.create(true).write(true);
        if self.cfg.file_overwrite {
            open_opts.truncate(true);
        } else {
            open_opts.append(true);
        }
        let file = open_opts.open(&final_path)?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            file.set_permissions(std::fs::Permissions::from_mode(self.cfg.permissions))?;
        }
        let size = file.metadata()?.len();
        let new_writer = Box::new(FileWriter { path: final_path.clone(), file, size, accessible: true });

        let name = self.name.clone();
        let mut by_path = self.by_path.lock().unwrap();
        let previous = match by_path.get(path_key) {
            Some(entry) => entry.writer.set_writer(new_writer),
            None => {
                let formatter_fallback: Box<dyn Fn(Message) + Send + Sync> = {
                    let name = name.clone();
                    Box::new(move |m| warn!(producer = %name, stream = m.stream_name(), "write fallback invoked"))
                };
                let writer =
                    BatchedWriter::new(self.cfg.batch.max_count, MAX_BATCH_BYTES, self.formatter.clone(), formatter_fallback);
                writer.set_writer(new_writer);
                by_path.insert(path_key.clone(), PathEntry { writer });
                None
            }
        };
        drop(by_path);

        if rotation_enabled {
            redirect_current_symlink(dir, base_name, ext, &final_path);
            ROTATIONS.with_label_values(&[&name]).inc();
            if let Some(prev) = previous {
                self.close_previous_in_background(prev, self.rotate_cfg.compress_on_close);
            }
            self.schedule_prune(dir.to_path_buf(), base_name.to_string());
        }
        Ok(())
    }

    fn close_previous_in_background(&self, writer: Box<dyn Writer>, compress: bool) {
        let producer = self.name.clone();
        tokio::task::spawn_blocking(move || {
            let path = PathBuf::from(writer.name());
            if let Err(e) = writer.close() {
                warn!(producer = %producer, error = %e, "error closing rotated writer");
                return;
            }
            if compress && let Err(e) = compress_and_remove(&path) {
                warn!(producer = %producer, path = %path.display(), error = %e, "compression failed");
            }
        });
    }

    fn schedule_prune(&self, dir: PathBuf, base_name: String) {
        let prune_cfg = self.prune_cfg.clone();
        let producer = self.name.clone();
        tokio::task::spawn_blocking(move || {
            let Ok(read_dir) = std::fs::read_dir(&dir) else { return };
            let candidates: Vec<_> = read_dir
                .filter_map(Result::ok)
                .filter(|entry| entry.file_name().to_string_lossy().starts_with(&base_name))
                .filter_map(|entry| {
                    let meta = entry.metadata().ok()?;
                    Some(prune::Candidate { path: entry.path(), modified: meta.modified().ok()?, size: meta.len() })
                })
                .collect();
            let to_delete = prune::files_to_prune(&prune_cfg, candidates);
            for candidate in &to_delete {
                if let Err(e) = std::fs::remove_file(&candidate.path) {
                    warn!(producer = %producer, path = %candidate.path.display(), error = %e, "failed to prune file");
                } else {
                    info!(producer = %producer, path = %candidate.path.display(), "pruned rotated file");
                }
            }
            PRUNED_FILES.with_label_values(&[&producer]).inc_by(to_delete.len() as u64);
        });
    }

    /// Flushes any batch whose size or age threshold has been crossed.
    pub fn write_batch_on_timeout(&self) {
        let by_path = self.by_path.lock().unwrap();
        for entry in by_path.values() {
            if entry.writer.batch().reached_time_threshold(Duration::from_secs(self.cfg.batch.timeout_sec))
                || entry.writer.batch().reached_size_threshold(self.cfg.batch.flush_count)
            {
                entry.writer.flush_now();
            }
        }
    }

    /// Forces rotation of every open destination (used by `Roll`).
    pub fn roll_all(&self) {
        let streams: Vec<_> = self.by_stream.lock().unwrap().iter().map(|(id, path)| (*id, path.clone())).collect();
        for (stream_id, _path) in streams {
            let stream_name = stream_id.0.to_string();
            self.get_or_rotate(stream_id, &stream_name, true);
        }
    }

    /// Flushes and closes every writer; waits for in-flight flushes up to
    /// `cfg.flush_timeout` (zero means wait forever).
    pub fn close(&self) {
        let by_path = self.by_path.lock().unwrap();
        for entry in by_path.values() {
            entry.writer.close(self.cfg.flush_timeout);
        }
    }
}

fn parse_hh_mm(s: &str) -> Option<chrono::NaiveTime> { chrono::NaiveTime::parse_from_str(s, "%H:%M").ok() }

fn existing_counters(dir: &Path, base_name: &str, ts: &str, ext: &str) -> Vec<u32> {
    let signature = format!("{base_name}_{ts}");
    let Ok(read_dir) = std::fs::read_dir(dir) else { return Vec::new() };
    read_dir
        .filter_map(Result::ok)
        .filter_map(|entry| {
            let file_name = entry.file_name();
            let file_name = file_name.to_str()?;
            let stripped = file_name.strip_prefix(&signature)?.strip_suffix(ext)?;
            stripped.strip_prefix('_').and_then(|n| n.parse::<u32>().ok())
        })
        .collect()
}

fn redirect_current_symlink(dir: &Path, base_name: &str, ext: &str, target: &Path) {
    #[cfg(unix)]
    {
        let link_name = rotate::current_symlink_name(base_name, ext);
        let link_path = dir.join(&link_name);
        let temp_path = dir.join(format!("{link_name}.tmp"));
        let _ = std::fs::remove_file(&temp_path);
        if std::os::unix::fs::symlink(target, &temp_path).is_ok() {
            let _ = std::fs::rename(&temp_path, &link_path);
        }
    }
    #[cfg(not(unix))]
    {
        let _ = (dir, base_name, ext, target);
    }
}

/// Compresses `path` into `<path-without-ext>.gz`, reading in 1 MiB chunks
/// and yielding the thread between them so a large rotated file doesn't
/// starve the blocking pool. Deletes the source on success, the partial
/// `.gz` on failure.
fn compress_and_remove(path: &Path) -> std::io::Result<()> {
    let gz_path = path.with_extension(format!(
        "{}.gz",
        path.extension().map(|e| e.to_string_lossy().to_string()).unwrap_or_default()
    ));
    let result = (|| -> std::io::Result<()> {
        let mut source = std::fs::File::open(path)?;
        let dest = std::fs::File::create(&gz_path)?;
        let mut encoder = flate2::write::GzEncoder::new(dest, flate2::Compression::default());
        let mut buf = vec![0u8; 1024 * 1024];
        loop {
            let n = source.read(&mut buf)?;
            if n == 0 {
                break;
            }
            encoder.write_all(&buf[..n])?;
            std::thread::yield_now();
        }
        encoder.finish()?;
        Ok(())
    })();

    match result {
        Ok(()) => {
            std::fs::remove_file(path)?;
            Ok(())
        }
        Err(e) => {
            let _ = std::fs::remove_file(&gz_path);
            Err(e)
        }
    }
}

/// Bridges a [`FileProducer`] into `logship_common_worker`'s scheduler: the
/// whole `message_control_loop` run is the single `work()` call of a
/// `Trigger::Once` worker.
pub struct FileProducerWorker {
    producer: Arc<FileProducer>,
    base: ProducerBase,
}

impl FileProducerWorker {
    pub fn new(name: impl Into<String>, cfg: ProducerConfig, formatter: Box<dyn Formatter>, channel_capacity: usize, fallback: Option<tokio::sync::mpsc::Sender<Message>>) -> (Self, ProducerHandle) {
        let name = name.into();
        let (base, handle) = ProducerBase::new(name.clone(), channel_capacity, fallback);
        let producer = Arc::new(FileProducer::new(name, cfg, formatter));
        (FileProducerWorker { producer, base }, handle)
    }
}

#[async_trait::async_trait]
impl logship_common_worker::Worker for FileProducerWorker {
    fn name() -> &'static str { "FileProducer" }

    fn trigger() -> logship_common_worker::Trigger { logship_common_worker::Trigger::Once }

    async fn work(&mut self, _ctx: &logship_common_worker::WorkerContext) -> logship_common_worker::Result<()> {
        let producer = self.producer.clone();
        let timeout = Duration::from_secs(producer.cfg.batch.timeout_sec.max(1));
        let producer_tick = producer.clone();
        let producer_roll = producer.clone();
        self.base
            .ticker_message_control_loop(
                move |msg| {
                    let producer = producer.clone();
                    async move { producer.write_message(msg, |m| producer.close_on_fallback_drop(m)) }
                },
                timeout,
                move || producer_tick.write_batch_on_timeout(),
                move || producer_roll.roll_all(),
                || {},
            )
            .await;
        self.producer.close();
        Ok(())
    }
}

impl FileProducer {
    fn close_on_fallback_drop(&self, msg: Message) { self.drop_unroutable(&msg); }

    fn drop_unroutable(&self, msg: &Message) {
        warn!(producer = %self.name, stream = msg.stream_name(), "message could not be written and has no producer-level fallback");
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;
    use tempfile::tempdir;

    use super::*;

    fn config(file: &str) -> ProducerConfig { ProducerConfig::builder().file(file).build() }

    fn dummy_formatter() -> Box<dyn Formatter> {
        struct PassthroughFormatter;
        impl Formatter for PassthroughFormatter {
            fn format(&self, messages: &[Message]) -> Vec<u8> {
                let mut out = Vec::new();
                for m in messages {
                    out.extend_from_slice(m.payload());
                }
                out
            }
        }
        Box::new(PassthroughFormatter)
    }

    #[test]
    fn writes_message_to_resolved_path_without_rotation() {
        let dir = tempdir().unwrap();
        let file_path = dir.path().join("app.log");
        let producer = FileProducer::new("test", config(file_path.to_str().unwrap()), dummy_formatter());
        producer.write_message(Message::new(StreamId::new(1), "app", Bytes::from_static(b"x\n")), |_| {});
        producer.close();
        let contents = std::fs::read_to_string(&file_path).unwrap();
        assert_eq!(contents, "x\n");
    }

    #[test]
    fn wildcard_template_expands_stream_name() {
        let dir = tempdir().unwrap();
        let template = dir.path().join("*.log");
        let producer = FileProducer::new("test", config(template.to_str().unwrap()), dummy_formatter());
        producer.write_message(Message::new(StreamId::new(1), "alpha", Bytes::from_static(b"a\n")), |_| {});
        producer.write_message(Message::new(StreamId::new(2), "beta", Bytes::from_static(b"b\n")), |_| {});
        producer.close();
        assert!(dir.path().join("alpha.log").exists());
        assert!(dir.path().join("beta.log").exists());
    }

    #[test]
    fn existing_counters_parses_collision_suffixes() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("app_2026-01-01_1.log"), b"").unwrap();
        std::fs::write(dir.path().join("app_2026-01-01_2.log"), b"").unwrap();
        let counters = existing_counters(dir.path(), "app", "2026-01-01", ".log");
        let mut sorted = counters.clone();
        sorted.sort_unstable();
        assert_eq!(sorted, vec![1, 2]);
    }
}
