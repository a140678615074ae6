/*
 * Copyright (C) 2026 Mark Wells Dev
 *
 * This program is free software: you can redistribute it and/or modify
 * it under the terms of the GNU General Public License as published by
 * the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * This program is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 * GNU General Public License for more details.
 *
 * You should have received a copy of the GNU General Public License
 * along with this program.  If not, see <https://www.gnu.org/licenses/>.
 */

//! Gateway configuration: allowed directories, size ceilings, rate limits.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::PathBuf;

/// Default read ceiling: 100 MB.
const DEFAULT_MAX_FILE_SIZE: u64 = 100 * 1024 * 1024;

/// Default write ceiling: 10 MB.
const DEFAULT_MAX_WRITE_SIZE: u64 = 10 * 1024 * 1024;

/// Gateway configuration, merged from defaults, config files, and
/// `BULKHEAD_*` environment variables.
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    /// Raw allowed-directory value: a JSON array of strings or a
    /// comma-separated string. Parsed once at startup by the allowlist
    /// parser. Defaults to a single conservative user directory.
    #[serde(default = "default_allowed_directories")]
    pub allowed_directories: String,

    /// Read ceiling in bytes (default: 100 MB).
    #[serde(default = "default_max_file_size")]
    pub max_file_size: u64,

    /// Write ceiling in bytes (default: 10 MB).
    #[serde(default = "default_max_write_size")]
    pub max_write_size: u64,

    /// Requests admitted per client per window (default: 60).
    #[serde(default = "default_rate_limit")]
    pub rate_limit: u32,

    /// Rate-limit window duration in seconds (default: 60).
    #[serde(default = "default_rate_window_secs")]
    pub rate_window_secs: u64,
}

fn default_allowed_directories() -> String {
    "~/Desktop".to_string()
}

const fn default_max_file_size() -> u64 {
    DEFAULT_MAX_FILE_SIZE
}

const fn default_max_write_size() -> u64 {
    DEFAULT_MAX_WRITE_SIZE
}

const fn default_rate_limit() -> u32 {
    60
}

const fn default_rate_window_secs() -> u64 {
    60
}

impl Config {
    /// Load configuration from standard paths or a specific file.
    ///
    /// Later sources override earlier ones: defaults, then
    /// `~/.config/bulkhead/config.toml`, then the explicit file, then
    /// `BULKHEAD_*` environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if a source cannot be read or a value fails to
    /// deserialize.
    pub fn load(explicit_file: Option<PathBuf>) -> Result<Self> {
        let mut builder = config::Config::builder();

        // 1. Start with defaults
        builder = builder
            .set_default("allowed_directories", default_allowed_directories())?
            .set_default("max_file_size", DEFAULT_MAX_FILE_SIZE)?
            .set_default("max_write_size", DEFAULT_MAX_WRITE_SIZE)?
            .set_default("rate_limit", i64::from(default_rate_limit()))?
            .set_default("rate_window_secs", default_rate_window_secs())?;

        // 2. Load from user config directory (~/.config/bulkhead/config.toml)
        if let Some(config_dir) = dirs::config_dir() {
            let config_path = config_dir.join("bulkhead").join("config.toml");
            if config_path.exists() {
                builder = builder.add_source(config::File::from(config_path));
            }
        }

        // 3. Load from explicit file if provided
        if let Some(path) = explicit_file {
            builder = builder.add_source(config::File::from(path));
        }

        // 4. Load from environment variables (BULKHEAD_MAX_FILE_SIZE, etc.)
        builder = builder.add_source(config::Environment::with_prefix("BULKHEAD"));

        let config = builder.build().context("Failed to build configuration")?;

        config
            .try_deserialize()
            .context("Failed to deserialize configuration")
    }
}
