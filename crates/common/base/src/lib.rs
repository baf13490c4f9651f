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

//! Environment loading shared by the daemon and its CLI.
//!
//! Sink credentials (Redis URLs, AWS profile names, Kafka broker lists) are
//! conventionally supplied through the environment rather than the daemon's
//! TOML config file, so this crate loads an optional `.env` once at process
//! start.

use snafu::{ResultExt, Snafu};

#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum Error {
    #[snafu(display("Failed to load .env file"))]
    DotenvLoad { source: dotenvy::Error },
}

pub type Result<T> = std::result::Result<T, Error>;

/// Loads a `.env` file if present. A missing file is not an error; a
/// malformed one is.
pub fn load_dotenv() -> Result<()> {
    match dotenvy::dotenv() {
        Ok(_) => Ok(()),
        Err(dotenvy::Error::Io(_)) => Ok(()),
        Err(source) => Err(source).context(DotenvLoadSnafu),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_dotenv_is_not_an_error() {
        let dir = tempfile::tempdir().unwrap();
        std::env::set_current_dir(dir.path()).unwrap();
        assert!(load_dotenv().is_ok());
    }
}
