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

//! Daemon-level TOML configuration: one `[producers.<name>]` section per
//! producer, tagged by `kind`. The message bus that would otherwise assign
//! streams to producers is out of scope, so `fallback_stream` and the
//! `streams` list are resolved against sibling sections in the same file.

use std::{collections::HashMap, path::PathBuf, time::Duration};

use logship_common_telemetry::logging::LoggingOptions;
use logship_core::ProducerConfig;
use serde::Deserialize;

fn default_spool_dir() -> PathBuf { PathBuf::from("/var/lib/logship/spool") }

fn default_channel_capacity() -> usize { 1024 }

fn default_shutdown_timeout_sec() -> u64 { 30 }

fn default_spool_max_file_size() -> u64 { 128 * 1024 * 1024 }

fn default_spool_max_file_age_sec() -> u64 { 3600 }

/// Top-level daemon configuration, deserialized from the file named on the
/// command line.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DaemonConfig {
    /// Base directory under which each spool producer gets its own
    /// `<spool_dir>/<stream>/` subdirectory.
    #[serde(default = "default_spool_dir")]
    pub spool_dir: PathBuf,

    /// Bound applied to every producer's inbound channel.
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,

    /// How long `Manager::shutdown` waits for in-flight work before
    /// aborting remaining worker tasks.
    #[serde(default = "default_shutdown_timeout_sec")]
    pub shutdown_timeout_sec: u64,

    #[serde(default)]
    pub logging: LoggingOptions,

    /// Producer sections, keyed by the name used in logs, metrics and
    /// `fallback_stream` references.
    #[serde(default)]
    pub producers: HashMap<String, ProducerSection>,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        DaemonConfig {
            spool_dir: default_spool_dir(),
            channel_capacity: default_channel_capacity(),
            shutdown_timeout_sec: default_shutdown_timeout_sec(),
            logging: LoggingOptions::default(),
            producers: HashMap::new(),
        }
    }
}

impl DaemonConfig {
    #[must_use]
    pub fn shutdown_timeout(&self) -> Duration { Duration::from_secs(self.shutdown_timeout_sec) }
}

/// One producer section. The `kind` tag picks which concrete producer the
/// supervisor constructs; `Spool` sections additionally get a durable
/// write-ahead spool instead of a generic `ProducerConfig`, since spooling
/// has its own roll thresholds rather than rotation/prune ones.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ProducerSection {
    File(FileProducerSection),
    Spool(SpoolProducerSection),
}

impl ProducerSection {
    #[must_use]
    pub fn fallback_stream(&self) -> Option<&str> {
        match self {
            ProducerSection::File(s) => s.common.fallback_stream.as_deref(),
            ProducerSection::Spool(_) => None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct FileProducerSection {
    #[serde(flatten)]
    pub common: ProducerConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SpoolProducerSection {
    /// Stream name backing this spool; defaults to the section's own name
    /// (the map key) when absent.
    pub stream: Option<String>,
    #[serde(default = "default_spool_max_file_size")]
    pub max_file_size: u64,
    #[serde(default = "default_spool_max_file_age_sec")]
    pub max_file_age_sec: u64,
}

impl Default for SpoolProducerSection {
    fn default() -> Self {
        SpoolProducerSection {
            stream: None,
            max_file_size: default_spool_max_file_size(),
            max_file_age_sec: default_spool_max_file_age_sec(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_section_deserializes_with_flattened_producer_config() {
        let toml_str = r#"
            spool_dir = "/tmp/spool"

            [producers.app]
            kind = "file"
            streams = ["app"]
            file = "/var/log/app/*.log"
        "#;
        let cfg: DaemonConfig = toml::from_str(toml_str).unwrap();
        let ProducerSection::File(section) = &cfg.producers["app"] else { panic!("expected file section") };
        assert_eq!(section.common.streams, vec!["app".to_string()]);
        assert_eq!(section.common.file, "/var/log/app/*.log");
    }

    #[test]
    fn spool_section_defaults_stream_to_section_name_when_absent() {
        let toml_str = r#"
            [producers.orders]
            kind = "spool"
        "#;
        let cfg: DaemonConfig = toml::from_str(toml_str).unwrap();
        let ProducerSection::Spool(section) = &cfg.producers["orders"] else { panic!("expected spool section") };
        assert!(section.stream.is_none());
        assert_eq!(section.max_file_size, default_spool_max_file_size());
    }

    #[test]
    fn missing_producers_table_defaults_to_empty() {
        let cfg: DaemonConfig = toml::from_str("spool_dir = \"/tmp/spool\"").unwrap();
        assert!(cfg.producers.is_empty());
    }
}
