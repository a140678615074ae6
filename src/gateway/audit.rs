// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Mark Wells <contact@markwells.dev>

//! Redacted audit records, one JSON line per tool invocation.
//!
//! Audit entries never carry raw paths, file content, or argument values.
//! A path is represented only by a truncated SHA-256 of its canonical
//! string; an error only by its stable classification code. The details
//! struct is a closed set; anything else cannot be expressed in it.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::fmt::Write as _;
use std::io::Write;
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tracing::warn;

/// Hex characters kept from the path hash.
const PATH_HASH_LEN: usize = 8;

/// Outcome of a tool invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    /// The tool completed and returned a result.
    Success,
    /// The pipeline terminated with an error.
    Error,
}

/// The closed set of safe fields an audit entry may carry.
#[derive(Debug, Clone, Default, Serialize)]
pub struct AuditDetails {
    /// Stable error classification, present on failures.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<&'static str>,
    /// Truncated one-way hash of the canonical path string.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path_hash: Option<String>,
}

impl AuditDetails {
    /// Details carrying only a path hash.
    #[must_use]
    pub fn for_path(canonical: &str) -> Self {
        Self {
            error_code: None,
            path_hash: Some(path_hash(canonical)),
        }
    }

    /// Details carrying an error classification.
    #[must_use]
    pub const fn for_error(code: &'static str) -> Self {
        Self {
            error_code: Some(code),
            path_hash: None,
        }
    }

    /// Attaches a path hash, when a path was involved in the failure.
    #[must_use]
    pub fn with_path(mut self, canonical: &str) -> Self {
        self.path_hash = Some(path_hash(canonical));
        self
    }

    /// Whether there is anything to externalize.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.error_code.is_none() && self.path_hash.is_none()
    }
}

/// A single audit record, externalized immediately and never retained.
#[derive(Debug, Serialize)]
pub struct AuditEntry {
    /// Wall-clock time the entry was created.
    pub timestamp: DateTime<Utc>,
    /// The tool that was invoked.
    pub tool: String,
    /// Success or error.
    pub outcome: Outcome,
    /// Milliseconds elapsed since the recorder (process) started.
    pub duration_ms: u64,
    /// Monotonically increasing invocation counter, never reset.
    pub request_number: u64,
    /// Redacted details, omitted when empty.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<AuditDetails>,
}

/// Truncated hex SHA-256 of a canonical path string.
#[must_use]
pub fn path_hash(canonical: &str) -> String {
    let digest = Sha256::digest(canonical.as_bytes());
    let mut hex = String::with_capacity(PATH_HASH_LEN);
    for byte in digest.iter().take(PATH_HASH_LEN.div_ceil(2)) {
        let _ = write!(hex, "{byte:02x}");
    }
    hex.truncate(PATH_HASH_LEN);
    hex
}

struct RecorderInner {
    sink: Box<dyn Write + Send>,
    sequence: u64,
}

/// Writes one redacted JSON line per tool invocation to a side channel.
///
/// The sequence counter and the sink share one lock, so request numbers
/// appear in the output in order even under concurrent callers.
pub struct AuditRecorder {
    start: Instant,
    inner: Mutex<RecorderInner>,
}

impl AuditRecorder {
    /// Recorder writing to standard error (the production side channel).
    #[must_use]
    pub fn stderr() -> Self {
        Self::with_sink(Box::new(std::io::stderr()))
    }

    /// Recorder writing to an arbitrary sink; tests inject a buffer here.
    #[must_use]
    pub fn with_sink(sink: Box<dyn Write + Send>) -> Self {
        Self {
            start: Instant::now(),
            inner: Mutex::new(RecorderInner { sink, sequence: 0 }),
        }
    }

    /// Records one invocation outcome. Called exactly once per tool call,
    /// as the final pipeline stage on every exit path.
    ///
    /// Returns the assigned request number. Sink failures are reported as
    /// a warning and otherwise swallowed; a broken audit channel must not
    /// take down the serving process.
    pub fn record(&self, tool: &str, outcome: Outcome, details: Option<AuditDetails>) -> u64 {
        let entry_details = details.filter(|d| !d.is_empty());

        let mut inner = self
            .inner
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        inner.sequence += 1;

        let entry = AuditEntry {
            timestamp: Utc::now(),
            tool: tool.to_string(),
            outcome,
            duration_ms: u64::try_from(self.start.elapsed().as_millis()).unwrap_or(u64::MAX),
            request_number: inner.sequence,
            details: entry_details,
        };

        match serde_json::to_string(&entry) {
            Ok(mut line) => {
                line.push('\n');
                if let Err(e) = inner
                    .sink
                    .write_all(line.as_bytes())
                    .and_then(|()| inner.sink.flush())
                {
                    warn!("failed to write audit entry: {e}");
                }
            }
            Err(e) => warn!("failed to serialize audit entry: {e}"),
        }

        inner.sequence
    }

    /// Total invocations recorded so far.
    #[must_use]
    pub fn request_count(&self) -> u64 {
        self.inner
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .sequence
    }

    /// Time elapsed since the recorder was created.
    #[must_use]
    pub fn uptime(&self) -> Duration {
        self.start.elapsed()
    }
}
