// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Mark Wells <contact@markwells.dev>

//! Bulkhead is a sandboxed filesystem gateway for MCP (Model Context Protocol).
//!
//! It exposes read/write/list tools to AI agents while constraining every
//! operation to an allowlist of base directories, enforcing size ceilings
//! and per-client rate limits, and emitting redacted audit records.

/// CLI utilities for terminal output formatting.
pub mod cli;
/// Configuration loading and defaults.
pub mod config;
/// The sandboxed path-access gateway: validation, limits, auditing.
pub mod gateway;
/// MCP server implementation and type definitions.
pub mod mcp;
