// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Mark Wells <contact@markwells.dev>

/// Allowed-directory configuration parsing.
pub mod allowlist;
/// Redacted audit records for tool invocations.
pub mod audit;
/// Size ceilings for reads and writes.
pub mod capacity;
/// Error taxonomy for the gateway pipeline.
pub mod error;
/// Tool handlers composing the pipeline stages.
mod handler;
/// Path validation against the allowed directories.
pub mod path_security;
/// Per-client sliding-window admission control.
pub mod rate_limit;

pub use allowlist::AllowList;
pub use audit::{AuditDetails, AuditRecorder, Outcome};
pub use capacity::CapacityGuard;
pub use error::GatewayError;
pub use handler::{Encoding, GatewayHandler, GatewayState};
pub use path_security::{PathValidator, ResolvedPath};
pub use rate_limit::{RateLimitConfig, RateLimiter};
