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

//! Retention policies applied to rotated artifacts after a successful
//! rotation. Candidates are sorted oldest-first; each policy narrows the
//! surviving set independently, in order: age, count, total size.

use std::time::SystemTime;

use bon::Builder;

#[derive(Debug, Clone, Builder)]
pub struct PruneConfig {
    #[builder(default = 0)]
    pub count: usize,
    #[builder(default = 0)]
    pub after_hours: u64,
    #[builder(default = 0)]
    pub total_size_mb: u64,
    /// Subtracted from the total-size budget so a newly-created rotation
    /// file always fits; normally the configured rotation size.
    #[builder(default = 0)]
    pub reserve_bytes: u64,
}

#[derive(Debug, Clone)]
pub struct Candidate {
    pub path: std::path::PathBuf,
    pub modified: SystemTime,
    pub size: u64,
}

/// Returns the subset of `candidates` (sorted oldest-first by caller) that
/// should be deleted.
pub fn files_to_prune(cfg: &PruneConfig, mut candidates: Vec<Candidate>) -> Vec<Candidate> {
    candidates.sort_by_key(|c| c.modified);
    let mut to_delete = Vec::new();

    if cfg.after_hours > 0 {
        let cutoff = SystemTime::now()
            .checked_sub(std::time::Duration::from_secs(cfg.after_hours * 3600))
            .unwrap_or(SystemTime::UNIX_EPOCH);
        let (old, kept): (Vec<_>, Vec<_>) = candidates.into_iter().partition(|c| c.modified < cutoff);
        to_delete.extend(old);
        candidates = kept;
    }

    if cfg.count > 0 && candidates.len() > cfg.count {
        let overflow = candidates.len() - cfg.count;
        to_delete.extend(candidates.drain(..overflow));
    }

    if cfg.total_size_mb > 0 {
        let budget = (cfg.total_size_mb * 1024 * 1024).saturating_sub(cfg.reserve_bytes);
        let mut total: u64 = candidates.iter().map(|c| c.size).sum();
        let mut idx = 0;
        while total > budget && idx < candidates.len() {
            total = total.saturating_sub(candidates[idx].size);
            idx += 1;
        }
        to_delete.extend(candidates.drain(..idx));
    }

    to_delete
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    fn candidate(name: &str, age_secs: u64, size: u64) -> Candidate {
        Candidate {
            path: std::path::PathBuf::from(name),
            modified: SystemTime::now() - Duration::from_secs(age_secs),
            size,
        }
    }

    #[test]
    fn by_count_keeps_newest_n() {
        let cfg = PruneConfig::builder().count(3).build();
        let files = vec![
            candidate("a", 700, 1),
            candidate("b", 600, 1),
            candidate("c", 500, 1),
            candidate("d", 400, 1),
            candidate("e", 300, 1),
            candidate("f", 200, 1),
            candidate("g", 100, 1),
        ];
        let deleted = files_to_prune(&cfg, files);
        assert_eq!(deleted.len(), 4);
        let names: Vec<_> = deleted.iter().map(|c| c.path.to_str().unwrap()).collect();
        assert_eq!(names, vec!["a", "b", "c", "d"]);
    }

    #[test]
    fn by_age_removes_only_files_older_than_cutoff() {
        let cfg = PruneConfig::builder().after_hours(1).build();
        let files = vec![candidate("old", 7200, 1), candidate("new", 10, 1)];
        let deleted = files_to_prune(&cfg, files);
        assert_eq!(deleted.len(), 1);
        assert_eq!(deleted[0].path.to_str().unwrap(), "old");
    }

    #[test]
    fn by_total_size_reserves_room_for_the_next_rotation() {
        let cfg = PruneConfig::builder().total_size_mb(1).reserve_bytes(512 * 1024).build();
        let files = vec![
            candidate("a", 300, 256 * 1024),
            candidate("b", 200, 256 * 1024),
            candidate("c", 100, 256 * 1024),
        ];
        // budget = 1MiB - 512KiB = 512KiB; total 768KiB must drop the oldest.
        let deleted = files_to_prune(&cfg, files);
        assert_eq!(deleted.len(), 1);
        assert_eq!(deleted[0].path.to_str().unwrap(), "a");
    }

    #[test]
    fn disabled_policies_keep_everything() {
        let cfg = PruneConfig::builder().build();
        let files = vec![candidate("a", 100_000, 1), candidate("b", 1, 1)];
        assert!(files_to_prune(&cfg, files).is_empty());
    }
}
