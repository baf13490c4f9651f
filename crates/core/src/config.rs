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

//! Common per-producer configuration surface. Sink-specific keys live next
//! to each sink; this struct only covers what every producer understands:
//! which streams it consumes, batching thresholds, rotation, pruning and
//! filesystem permissions.

use std::time::Duration;

use bon::Builder;
use serde::Deserialize;

fn default_true() -> bool { true }

fn default_batch_max_count() -> usize { 8192 }

fn default_batch_flush_count() -> usize { 4096 }

fn default_batch_timeout_sec() -> u64 { 5 }

fn default_rotation_size_mb() -> u64 { 1024 }

fn default_rotation_timeout_min() -> u64 { 1440 }

fn default_rotation_timestamp() -> String { "%Y-%m-%d_%H".to_string() }

fn default_permissions() -> u32 { 0o644 }

fn default_folder_permissions() -> u32 { 0o755 }

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BatchSettings {
    pub max_count: usize,
    pub flush_count: usize,
    pub timeout_sec: u64,
}

impl Default for BatchSettings {
    fn default() -> Self {
        BatchSettings {
            max_count: default_batch_max_count(),
            flush_count: default_batch_flush_count(),
            timeout_sec: default_batch_timeout_sec(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RotationSettings {
    pub enable: bool,
    pub size_mb: u64,
    pub timeout_min: u64,
    pub at: Option<String>,
    pub timestamp: String,
    pub zero_padding: usize,
    pub compress: bool,
}

impl Default for RotationSettings {
    fn default() -> Self {
        RotationSettings {
            enable: false,
            size_mb: default_rotation_size_mb(),
            timeout_min: default_rotation_timeout_min(),
            at: None,
            timestamp: default_rotation_timestamp(),
            zero_padding: 0,
            compress: false,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PruneSettings {
    pub count: usize,
    pub after_hours: u64,
    pub total_size_mb: u64,
}

/// Configuration shared by every producer kind, matching the table in the
/// daemon's TOML configuration file (one section per producer).
#[derive(Debug, Clone, Builder, Deserialize)]
#[serde(default)]
pub struct ProducerConfig {
    #[serde(default = "default_true")]
    #[builder(default = true)]
    pub enable: bool,

    #[builder(default, into)]
    pub streams: Vec<String>,

    #[builder(default)]
    pub batch: BatchSettings,

    #[builder(default = Duration::ZERO)]
    pub flush_timeout: Duration,

    #[builder(default)]
    pub rotation: RotationSettings,

    #[builder(default)]
    pub prune: PruneSettings,

    #[serde(default = "default_permissions")]
    #[builder(default = default_permissions())]
    pub permissions: u32,

    #[serde(default = "default_folder_permissions")]
    #[builder(default = default_folder_permissions())]
    pub folder_permissions: u32,

    #[builder(default, into)]
    pub file: String,

    #[builder(default = false)]
    pub file_overwrite: bool,

    /// Stream fallback failed deliveries are re-routed to; `None` means
    /// only the drop counter is incremented.
    #[builder(default)]
    pub fallback_stream: Option<String>,
}

impl Default for ProducerConfig {
    fn default() -> Self { ProducerConfig::builder().build() }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_documented_table() {
        let cfg = ProducerConfig::default();
        assert!(cfg.enable);
        assert_eq!(cfg.batch.max_count, 8192);
        assert_eq!(cfg.batch.flush_count, 4096);
        assert_eq!(cfg.batch.timeout_sec, 5);
        assert_eq!(cfg.flush_timeout, Duration::ZERO);
        assert!(!cfg.rotation.enable);
        assert_eq!(cfg.rotation.size_mb, 1024);
        assert_eq!(cfg.rotation.timeout_min, 1440);
        assert_eq!(cfg.permissions, 0o644);
        assert_eq!(cfg.folder_permissions, 0o755);
        assert!(!cfg.file_overwrite);
    }

    #[test]
    fn toml_section_deserializes_with_defaults_for_missing_keys() {
        let toml_str = r#"
            streams = ["app"]
            file = "/var/log/app/*.log"
            [rotation]
            enable = true
            size_mb = 64
        "#;
        let cfg: ProducerConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(cfg.streams, vec!["app".to_string()]);
        assert!(cfg.rotation.enable);
        assert_eq!(cfg.rotation.size_mb, 64);
        assert_eq!(cfg.rotation.timeout_min, 1440);
        assert_eq!(cfg.batch.max_count, 8192);
    }
}
