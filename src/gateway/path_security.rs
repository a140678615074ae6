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

//! Path validation against the allowed-directory set.
//!
//! All containment decisions are made on fully canonicalized paths:
//! symlinks followed, `.`/`..` collapsed. Nothing is cached across calls:
//! a symlink target can change between requests, so every call re-derives
//! the canonical form.

use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

use super::allowlist::{AllowList, expand_home};
use super::error::GatewayError;

/// The canonical form of a caller-supplied path, plus the allowlist entry
/// that admitted it. Produced per request, never retained.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedPath {
    /// Canonical absolute path.
    pub canonical: PathBuf,
    /// The allowlist entry the path fell under.
    pub base: PathBuf,
}

/// Validates that caller-supplied paths stay within the allowed directories.
pub struct PathValidator {
    allowlist: Arc<AllowList>,
}

impl PathValidator {
    /// Creates a validator over a fixed allowlist.
    #[must_use]
    pub fn new(allowlist: Arc<AllowList>) -> Self {
        debug!("PathValidator initialized with {} entries", allowlist.len());
        Self { allowlist }
    }

    /// Validates a path for read access.
    ///
    /// Canonicalizes the path (resolving symlinks) and checks that the
    /// canonical form is contained in at least one allowed directory.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::NotFound`] if the target does not exist,
    /// [`GatewayError::OutsideSandbox`] if containment fails, or
    /// [`GatewayError::Unexpected`] for other resolution failures.
    pub fn validate_read(&self, requested: &str) -> Result<ResolvedPath, GatewayError> {
        let expanded = expand_home(requested);
        let canonical = canonicalize(&expanded, requested)?;
        self.contain(canonical, requested)
    }

    /// Validates a path for write access.
    ///
    /// For targets that do not exist yet, the deepest existing ancestor is
    /// canonicalized and the remaining components are rejoined (with
    /// `.`/`..` collapsed) before the containment check, so writes into
    /// to-be-created subdirectories are still resolved through real
    /// symlinks.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::OutsideSandbox`] if containment fails, or
    /// [`GatewayError::Unexpected`] for resolution failures.
    pub fn validate_write(&self, requested: &str) -> Result<ResolvedPath, GatewayError> {
        let expanded = expand_home(requested);

        let canonical = if expanded.exists() {
            canonicalize(&expanded, requested)?
        } else {
            let ancestor = find_existing_ancestor(&expanded);
            let canonical_ancestor = canonicalize(&ancestor, requested)?;
            let remaining = expanded.strip_prefix(&ancestor).map_err(|_| {
                GatewayError::InvalidArgument {
                    reason: format!("cannot resolve path: {requested}"),
                }
            })?;
            rejoin_normalized(canonical_ancestor, remaining)
        };

        self.contain(canonical, requested)
    }

    /// Containment check: the canonical path must equal an allowlist entry
    /// or sit strictly beneath one. `Path::starts_with` compares whole
    /// components, so `/allowed-evil` never matches base `/allowed`.
    fn contain(&self, canonical: PathBuf, requested: &str) -> Result<ResolvedPath, GatewayError> {
        for base in self.allowlist.entries() {
            if canonical.starts_with(base) {
                return Ok(ResolvedPath {
                    canonical,
                    base: base.clone(),
                });
            }
        }
        Err(GatewayError::OutsideSandbox {
            path: requested.to_string(),
        })
    }
}

/// Canonicalizes a path, classifying a missing target as `NotFound`.
fn canonicalize(path: &Path, requested: &str) -> Result<PathBuf, GatewayError> {
    path.canonicalize().map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            GatewayError::NotFound {
                path: requested.to_string(),
            }
        } else {
            GatewayError::Unexpected(e)
        }
    })
}

/// Walks up the directory tree to the deepest ancestor that exists.
///
/// The filesystem root always exists, so the walk terminates; a fully
/// relative path that never hits an existing ancestor degrades to an
/// empty path, which canonicalize then rejects.
fn find_existing_ancestor(path: &Path) -> PathBuf {
    let mut current = path;
    loop {
        if current.exists() {
            return current.to_path_buf();
        }
        match current.parent() {
            Some(parent) => current = parent,
            None => return PathBuf::new(),
        }
    }
}

/// Joins the not-yet-existing remainder onto a canonical ancestor,
/// collapsing `.` and `..` lexically. The ancestor is symlink-free, so
/// a lexical `..` pop cannot be fooled by a link.
fn rejoin_normalized(base: PathBuf, remaining: &Path) -> PathBuf {
    let mut result = base;
    for component in remaining.components() {
        match component {
            Component::Normal(part) => result.push(part),
            Component::ParentDir => {
                result.pop();
            }
            Component::CurDir => {}
            // Prefix/RootDir cannot occur in a strip_prefix remainder
            _ => {}
        }
    }
    result
}
