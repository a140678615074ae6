// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Mark Wells <contact@markwells.dev>

//! Error taxonomy shared by every stage of the gateway pipeline.
//!
//! Each kind maps to a stable classification string via [`GatewayError::code`].
//! The classification is what reaches the audit log; the display message is
//! what reaches the caller. Messages may echo the requester's own input but
//! never paths belonging to other requests.

use thiserror::Error;

/// Errors produced by the gateway pipeline.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// The requested path resolves outside every allowed directory.
    #[error("path is outside the allowed directories: {path}")]
    OutsideSandbox {
        /// The path as the caller supplied it.
        path: String,
    },

    /// A size ceiling was exceeded, for a read or a write.
    #[error("size {size} exceeds the configured limit of {limit} bytes")]
    TooLarge {
        /// The observed (or declared) size in bytes.
        size: u64,
        /// The configured ceiling in bytes.
        limit: u64,
    },

    /// The client exhausted its request window.
    #[error("rate limit exceeded, try again later")]
    RateLimited,

    /// The target does not exist.
    #[error("path does not exist: {path}")]
    NotFound {
        /// The path as the caller supplied it.
        path: String,
    },

    /// The target exists but is not a directory.
    #[error("not a directory: {path}")]
    NotADirectory {
        /// The path as the caller supplied it.
        path: String,
    },

    /// The tool arguments were malformed.
    #[error("invalid arguments: {reason}")]
    InvalidArgument {
        /// What was wrong with the arguments.
        reason: String,
    },

    /// Any other failure, wrapping the underlying I/O error.
    #[error("unexpected I/O error: {0}")]
    Unexpected(#[from] std::io::Error),
}

impl GatewayError {
    /// Stable classification string used in audit records and error responses.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::OutsideSandbox { .. } => "outside_sandbox",
            Self::TooLarge { .. } => "too_large",
            Self::RateLimited => "rate_limited",
            Self::NotFound { .. } => "not_found",
            Self::NotADirectory { .. } => "not_a_directory",
            Self::InvalidArgument { .. } => "invalid_argument",
            Self::Unexpected(_) => "unexpected",
        }
    }
}
