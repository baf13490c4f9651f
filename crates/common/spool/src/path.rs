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

//! Path layout for the on-disk spool: `<base>/<stream>/NNNNNNNN.spl`.

use std::path::{Path, PathBuf};

use crate::{Result, error::InvalidPathSnafu};
use snafu::OptionExt;

/// Highest file suffix a spool will ever allocate. Wrapping past this is a
/// fatal configuration error (the stream should have been pruned long before).
pub const MAX_SUFFIX: u32 = 99_999_999;

pub const SPOOL_EXTENSION: &str = "spl";
pub const FAILED_EXTENSION: &str = "failed";

/// Directory holding a single stream's spool files.
pub fn stream_dir<P: AsRef<Path>>(base: P, stream: &str) -> PathBuf { base.as_ref().join(stream) }

/// Formats a spool file name from a suffix: `NNNNNNNN.spl`.
pub fn file_name(suffix: u32) -> String { format!("{suffix:08}.{SPOOL_EXTENSION}") }

/// Full path to a numbered spool file.
pub fn file_path<P: AsRef<Path>>(stream_dir: P, suffix: u32) -> PathBuf {
    stream_dir.as_ref().join(file_name(suffix))
}

/// Parses the numeric suffix out of a `NNNNNNNN.spl` file name.
pub fn parse_suffix(path: &Path) -> Result<u32> {
    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .context(InvalidPathSnafu { path: path.to_path_buf() })?;
    stem.parse().ok().context(InvalidPathSnafu { path: path.to_path_buf() })
}

/// Lists every `.spl` file in a stream directory, sorted ascending by suffix.
pub fn scan_spool_files(dir: &Path) -> Result<Vec<(u32, PathBuf)>> {
    if !dir.exists() {
        return Ok(Vec::new());
    }
    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if path.extension().and_then(|s| s.to_str()) == Some(SPOOL_EXTENSION) {
            let suffix = parse_suffix(&path)?;
            files.push((suffix, path));
        }
    }
    files.sort_by_key(|(suffix, _)| *suffix);
    Ok(files)
}

/// Renames a corrupted spool file out of the read path, per the spool's
/// I/O-error recovery contract: leave it for operator inspection rather than
/// losing data silently.
pub fn mark_failed(path: &Path) -> Result<PathBuf> {
    let failed = path.with_extension(FAILED_EXTENSION);
    std::fs::rename(path, &failed)?;
    Ok(failed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_zero_padded_suffix() {
        assert_eq!(file_name(1), "00000001.spl");
        assert_eq!(file_name(99_999_999), "99999999.spl");
    }

    #[test]
    fn parses_suffix_back_out() {
        let path = PathBuf::from("/spool/orders/00000042.spl");
        assert_eq!(parse_suffix(&path).unwrap(), 42);
    }

    #[test]
    fn scan_sorts_ascending() {
        let dir = tempfile::tempdir().unwrap();
        for suffix in [5u32, 1, 3] {
            std::fs::File::create(file_path(dir.path(), suffix)).unwrap();
        }
        let files = scan_spool_files(dir.path()).unwrap();
        assert_eq!(files.iter().map(|(s, _)| *s).collect::<Vec<_>>(), vec![1, 3, 5]);
    }
}
