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

use shadow_rs::shadow;

shadow!(build);

/// Package author list, taken from `Cargo.toml` at compile time.
pub const AUTHOR: &str = env!("CARGO_PKG_AUTHORS");

/// Version string shown by `--version`: the crate version plus the short
/// commit hash shadow-rs captured at build time.
pub const FULL_VERSION: &str = build::VERSION;
