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

use std::{path::PathBuf, time::Duration};

use bon::Builder;

/// Configuration shared by a stream's [`crate::SpoolWriter`] and
/// [`crate::SpoolReader`].
#[derive(Debug, Clone, Builder)]
pub struct SpoolConfig {
    /// Root directory holding all spools; the stream's files live under
    /// `base_path/<stream>/`.
    pub base_path: PathBuf,
    /// Stream name, used both as the subdirectory and for log fields.
    #[builder(into)]
    pub stream: String,
    /// Roll to a new file once the current one reaches this size.
    #[builder(default = 128 * 1024 * 1024)]
    pub max_file_size: u64,
    /// Roll to a new file once the current one is older than this, even if
    /// still under the size threshold.
    #[builder(default = Duration::from_secs(3600))]
    pub max_file_age: Duration,
}

impl SpoolConfig {
    #[must_use]
    pub fn stream_dir(&self) -> PathBuf { crate::path::stream_dir(&self.base_path, &self.stream) }
}
