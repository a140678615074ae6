// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Mark Wells <contact@markwells.dev>

//! Parsing of the allowed-directory configuration value.
//!
//! The raw value is either a JSON array of strings or a comma-separated
//! string. Entries are home-expanded and canonicalized once at startup;
//! the resulting [`AllowList`] is immutable for the process lifetime.

use std::path::PathBuf;
use tracing::{debug, warn};

/// The fixed set of base directories the gateway may touch.
///
/// An empty list permits nothing; the validator fails closed.
#[derive(Debug, Clone, Default)]
pub struct AllowList {
    entries: Vec<PathBuf>,
}

impl AllowList {
    /// Parses a raw configuration value into an `AllowList`.
    ///
    /// A well-formed JSON array of strings is used verbatim; anything else
    /// is split on commas with whitespace trimmed and empty segments
    /// discarded. `None` produces an empty list.
    ///
    /// Each entry is home-expanded and canonicalized. Entries that cannot
    /// be canonicalized (typically: the directory does not exist) are
    /// dropped with a warning rather than kept un-resolved.
    #[must_use]
    pub fn parse(raw: Option<&str>) -> Self {
        let segments = match raw {
            None => Vec::new(),
            Some(raw) => raw_segments(raw),
        };

        let mut entries = Vec::new();
        for segment in segments {
            let expanded = expand_home(&segment);
            match expanded.canonicalize() {
                Ok(canonical) => {
                    debug!("allowlist entry: {}", canonical.display());
                    entries.push(canonical);
                }
                Err(e) => {
                    warn!("dropping allowlist entry {segment}: {e}");
                }
            }
        }

        Self { entries }
    }

    /// Builds an `AllowList` from already-canonical directories.
    ///
    /// Used by the CLI `--allow` override and by tests, where the caller
    /// has canonicalized the paths itself.
    #[must_use]
    pub fn from_canonical(entries: Vec<PathBuf>) -> Self {
        Self { entries }
    }

    /// The canonical base directories, in configuration order.
    #[must_use]
    pub fn entries(&self) -> &[PathBuf] {
        &self.entries
    }

    /// Whether the list permits nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of base directories.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

/// Splits a raw value into entry strings without resolving them: a JSON
/// array of strings is used verbatim, anything else is comma-split. The
/// doctor command uses this to report each entry's resolution status.
#[must_use]
pub fn raw_segments(raw: &str) -> Vec<String> {
    if let Ok(parsed) = serde_json::from_str::<Vec<String>>(raw) {
        return parsed;
    }
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Expands a leading `~` to the user's home directory.
///
/// Returns the path unchanged when it has no `~` prefix or when the home
/// directory cannot be determined.
#[must_use]
pub fn expand_home(path: &str) -> PathBuf {
    if path == "~" {
        return dirs::home_dir().unwrap_or_else(|| PathBuf::from(path));
    }
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(path)
}
