// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Mark Wells <contact@markwells.dev>

//! Gateway tool handlers: `read_file`, `write_file`, `list_directory`,
//! `health_check`, `capabilities`.
//!
//! Every call runs the same pipeline: admit → validate → size-check →
//! perform I/O → record. Any stage short-circuits to a terminal error;
//! the audit record is written on every exit path, success or failure.

use anyhow::Result;
use base64::{Engine as _, engine::general_purpose};
use serde::Deserialize;
use serde_json::json;
use std::path::Path;
use std::sync::Arc;
use tokio::runtime::Handle;
use tracing::debug;

use super::allowlist::AllowList;
use super::audit::{AuditDetails, AuditRecorder, Outcome};
use super::capacity::CapacityGuard;
use super::error::GatewayError;
use super::path_security::PathValidator;
use super::rate_limit::RateLimiter;
use crate::mcp::{CallToolResult, Tool, ToolHandler};

/// Client identity used when the transport carries none.
const DEFAULT_CLIENT_ID: &str = "default";

/// Content encoding for file reads and writes.
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Encoding {
    /// Raw text, decoded lossily on read.
    #[default]
    Utf8,
    /// Binary-safe textual encoding (standard alphabet, padded).
    Base64,
}

/// Input for `read_file`.
#[derive(Debug, Deserialize)]
pub struct ReadFileInput {
    /// Path to the file (absolute, or `~`-prefixed).
    pub path: String,
    /// Content encoding for the response.
    #[serde(default)]
    pub encoding: Encoding,
}

/// Input for `write_file`.
#[derive(Debug, Deserialize)]
pub struct WriteFileInput {
    /// Path to the file (absolute, or `~`-prefixed).
    pub path: String,
    /// Content to write, encoded per `encoding`.
    pub content: String,
    /// How `content` is encoded.
    #[serde(default)]
    pub encoding: Encoding,
}

/// Input for `list_directory`.
#[derive(Debug, Deserialize)]
pub struct ListDirectoryInput {
    /// Path to the directory.
    pub path: String,
}

/// Shared mutable gateway state: the rate-limit table and the audit
/// recorder. Owned explicitly and injected into the handler so tests can
/// construct a fresh instance instead of touching process-wide globals.
pub struct GatewayState {
    /// Per-client admission control.
    pub limiter: RateLimiter,
    /// Redacted invocation log.
    pub audit: AuditRecorder,
}

impl GatewayState {
    /// Bundles a limiter and a recorder.
    #[must_use]
    pub const fn new(limiter: RateLimiter, audit: AuditRecorder) -> Self {
        Self { limiter, audit }
    }
}

/// Maps MCP tool calls onto sandboxed filesystem operations.
pub struct GatewayHandler {
    allowlist: Arc<AllowList>,
    validator: PathValidator,
    capacity: CapacityGuard,
    state: Arc<GatewayState>,
    runtime: Handle,
}

impl GatewayHandler {
    /// Creates a handler over a fixed allowlist and shared gateway state.
    #[must_use]
    pub fn new(
        allowlist: Arc<AllowList>,
        capacity: CapacityGuard,
        state: Arc<GatewayState>,
        runtime: Handle,
    ) -> Self {
        let validator = PathValidator::new(allowlist.clone());
        Self {
            allowlist,
            validator,
            capacity,
            state,
            runtime,
        }
    }

    /// Runs one tool call through the pipeline and returns the audited
    /// outcome. `audit_path` carries the best path form known so far: the
    /// caller's input until validation, the canonical form after.
    fn dispatch(
        &self,
        name: &str,
        arguments: Option<serde_json::Value>,
        audit_path: &mut Option<String>,
    ) -> Result<serde_json::Value, GatewayError> {
        self.state.limiter.admit(DEFAULT_CLIENT_ID)?;

        match name {
            "read_file" => self.handle_read_file(arguments, audit_path),
            "write_file" => self.handle_write_file(arguments, audit_path),
            "list_directory" => self.handle_list_directory(arguments, audit_path),
            "health_check" => Ok(self.handle_health_check()),
            "capabilities" => Ok(self.handle_capabilities()),
            _ => Err(GatewayError::InvalidArgument {
                reason: format!("unknown tool: {name}"),
            }),
        }
    }

    fn handle_read_file(
        &self,
        arguments: Option<serde_json::Value>,
        audit_path: &mut Option<String>,
    ) -> Result<serde_json::Value, GatewayError> {
        let input: ReadFileInput = parse_arguments(arguments)?;
        *audit_path = Some(input.path.clone());

        let resolved = self.validator.validate_read(&input.path)?;
        let canonical = resolved.canonical;
        *audit_path = Some(canonical.display().to_string());

        debug!("read_file: {}", canonical.display());

        // Stat before reading: an oversized file costs a metadata call,
        // never a content load
        let metadata = self.runtime.block_on(tokio::fs::metadata(&canonical))?;
        self.capacity.check_read(metadata.len())?;

        let bytes = self.runtime.block_on(tokio::fs::read(&canonical))?;
        let content = match input.encoding {
            Encoding::Utf8 => String::from_utf8_lossy(&bytes).into_owned(),
            Encoding::Base64 => general_purpose::STANDARD.encode(&bytes),
        };

        Ok(json!({
            "path": canonical.display().to_string(),
            "size": bytes.len(),
            "content": content,
        }))
    }

    fn handle_write_file(
        &self,
        arguments: Option<serde_json::Value>,
        audit_path: &mut Option<String>,
    ) -> Result<serde_json::Value, GatewayError> {
        let input: WriteFileInput = parse_arguments(arguments)?;
        *audit_path = Some(input.path.clone());

        let resolved = self.validator.validate_write(&input.path)?;
        let canonical = resolved.canonical;
        *audit_path = Some(canonical.display().to_string());

        debug!("write_file: {}", canonical.display());

        let bytes = match input.encoding {
            Encoding::Utf8 => input.content.into_bytes(),
            Encoding::Base64 => general_purpose::STANDARD
                .decode(&input.content)
                .map_err(|e| GatewayError::InvalidArgument {
                    reason: format!("invalid base64 content: {e}"),
                })?,
        };

        // All-or-nothing: the ceiling is checked before any byte (or
        // parent directory) lands on disk
        self.capacity
            .check_write(u64::try_from(bytes.len()).unwrap_or(u64::MAX))?;

        let written = bytes.len();
        self.runtime.block_on(async {
            if let Some(parent) = canonical.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }
            tokio::fs::write(&canonical, &bytes).await
        })?;

        Ok(json!({
            "path": canonical.display().to_string(),
            "message": format!("wrote {written} bytes"),
        }))
    }

    fn handle_list_directory(
        &self,
        arguments: Option<serde_json::Value>,
        audit_path: &mut Option<String>,
    ) -> Result<serde_json::Value, GatewayError> {
        let input: ListDirectoryInput = parse_arguments(arguments)?;
        *audit_path = Some(input.path.clone());

        let resolved = self.validator.validate_read(&input.path)?;
        let canonical = resolved.canonical;
        *audit_path = Some(canonical.display().to_string());

        debug!("list_directory: {}", canonical.display());

        let metadata = self.runtime.block_on(tokio::fs::metadata(&canonical))?;
        if !metadata.is_dir() {
            return Err(GatewayError::NotADirectory { path: input.path });
        }

        let mut entries = self.runtime.block_on(list_children(&canonical))?;
        entries.sort_by(|a, b| a.0.cmp(&b.0));

        let listing: Vec<serde_json::Value> = entries
            .into_iter()
            .map(|(name, kind)| json!({ "name": name, "kind": kind }))
            .collect();
        Ok(serde_json::Value::Array(listing))
    }

    fn handle_health_check(&self) -> serde_json::Value {
        json!({
            "status": "ok",
            "version": env!("BULKHEAD_VERSION"),
            "uptime_seconds": self.state.audit.uptime().as_secs(),
            "request_count": self.state.audit.request_count(),
        })
    }

    fn handle_capabilities(&self) -> serde_json::Value {
        let rate = self.state.limiter.config();
        json!({
            "tools": self
                .list_tools()
                .iter()
                .map(|t| json!({ "name": t.name, "description": t.description }))
                .collect::<Vec<_>>(),
            "limits": {
                "max_file_size": self.capacity.max_read_bytes(),
                "max_write_size": self.capacity.max_write_bytes(),
                "rate_limit_per_minute": rate.max_requests,
                "allowed_directories": self
                    .allowlist
                    .entries()
                    .iter()
                    .map(|p| p.display().to_string())
                    .collect::<Vec<_>>(),
            },
        })
    }
}

/// Enumerates immediate children of a directory as `(name, kind)` pairs.
async fn list_children(dir: &Path) -> Result<Vec<(String, &'static str)>, GatewayError> {
    let mut reader = tokio::fs::read_dir(dir).await?;
    let mut entries = Vec::new();

    while let Some(entry) = reader.next_entry().await? {
        let name = entry.file_name().to_string_lossy().into_owned();
        // Follows symlinks so a link to a directory lists as one; a broken
        // link degrades to "file"
        let kind = match tokio::fs::metadata(entry.path()).await {
            Ok(meta) if meta.is_dir() => "directory",
            _ => "file",
        };
        entries.push((name, kind));
    }

    Ok(entries)
}

/// Decodes tool arguments, mapping every failure to `InvalidArgument`.
fn parse_arguments<T: serde::de::DeserializeOwned>(
    arguments: Option<serde_json::Value>,
) -> Result<T, GatewayError> {
    let value = arguments.ok_or_else(|| GatewayError::InvalidArgument {
        reason: "missing arguments".to_string(),
    })?;
    serde_json::from_value(value).map_err(|e| GatewayError::InvalidArgument {
        reason: e.to_string(),
    })
}

impl ToolHandler for GatewayHandler {
    fn list_tools(&self) -> Vec<Tool> {
        vec![
            Tool {
                name: "read_file".to_string(),
                description: Some("Read a file within the allowed directories".to_string()),
                input_schema: json!({
                    "type": "object",
                    "properties": {
                        "path": {
                            "type": "string",
                            "description": "File path to read"
                        },
                        "encoding": {
                            "type": "string",
                            "enum": ["utf8", "base64"],
                            "default": "utf8",
                            "description": "Content encoding for the response"
                        }
                    },
                    "required": ["path"]
                }),
            },
            Tool {
                name: "write_file".to_string(),
                description: Some("Write a file within the allowed directories".to_string()),
                input_schema: json!({
                    "type": "object",
                    "properties": {
                        "path": {
                            "type": "string",
                            "description": "File path to write"
                        },
                        "content": {
                            "type": "string",
                            "description": "Content to write"
                        },
                        "encoding": {
                            "type": "string",
                            "enum": ["utf8", "base64"],
                            "default": "utf8",
                            "description": "How content is encoded"
                        }
                    },
                    "required": ["path", "content"]
                }),
            },
            Tool {
                name: "list_directory".to_string(),
                description: Some(
                    "List the immediate children of a directory within the allowed directories"
                        .to_string(),
                ),
                input_schema: json!({
                    "type": "object",
                    "properties": {
                        "path": {
                            "type": "string",
                            "description": "Directory path"
                        }
                    },
                    "required": ["path"]
                }),
            },
            Tool {
                name: "health_check".to_string(),
                description: Some("Check server health and status".to_string()),
                input_schema: json!({
                    "type": "object",
                    "properties": {}
                }),
            },
            Tool {
                name: "capabilities".to_string(),
                description: Some("List available operations and configured limits".to_string()),
                input_schema: json!({
                    "type": "object",
                    "properties": {}
                }),
            },
        ]
    }

    fn call_tool(
        &self,
        name: &str,
        arguments: Option<serde_json::Value>,
    ) -> Result<CallToolResult> {
        let mut audit_path: Option<String> = None;
        let result = self.dispatch(name, arguments, &mut audit_path);

        // The audit record is the unconditional final stage, the
        // equivalent of a finally-block on every exit path
        let (outcome, details) = match &result {
            Ok(_) => (
                Outcome::Success,
                audit_path.as_deref().map(AuditDetails::for_path),
            ),
            Err(e) => {
                let mut details = AuditDetails::for_error(e.code());
                if let Some(path) = audit_path.as_deref() {
                    details = details.with_path(path);
                }
                (Outcome::Error, Some(details))
            }
        };
        self.state.audit.record(name, outcome, details);

        match result {
            Ok(value) => Ok(CallToolResult::text(serde_json::to_string_pretty(&value)?)),
            Err(e) => Ok(CallToolResult::error(format!("{}: {e}", e.code()))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::rate_limit::RateLimitConfig;
    use anyhow::{Context, anyhow};
    use std::fs;
    use std::path::PathBuf;
    use tempfile::TempDir;

    /// Audit sink for tests that only care about pipeline behavior.
    struct NullSink;

    impl std::io::Write for NullSink {
        fn write(&mut self, data: &[u8]) -> std::io::Result<usize> {
            Ok(data.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    struct Fixture {
        // Keeps the sandbox directory alive for the handler's lifetime
        _dir: TempDir,
        root: PathBuf,
        handler: GatewayHandler,
        state: Arc<GatewayState>,
        // Keeps the runtime alive so Handle::block_on works
        _runtime: tokio::runtime::Runtime,
    }

    fn fixture() -> Result<Fixture> {
        fixture_with_limits(100 * 1024, 10 * 1024, 1000)
    }

    fn fixture_with_limits(
        max_read: u64,
        max_write: u64,
        rate_limit: u32,
    ) -> Result<Fixture> {
        let dir = TempDir::new()?;
        let root = dir.path().canonicalize()?;

        let allowlist = Arc::new(AllowList::from_canonical(vec![root.clone()]));
        let state = Arc::new(GatewayState::new(
            RateLimiter::new(RateLimitConfig {
                max_requests: rate_limit,
                window_secs: 60,
                ..Default::default()
            }),
            AuditRecorder::with_sink(Box::new(NullSink)),
        ));

        let runtime = tokio::runtime::Runtime::new()?;
        let handler = GatewayHandler::new(
            allowlist,
            CapacityGuard::new(max_read, max_write),
            state.clone(),
            runtime.handle().clone(),
        );

        Ok(Fixture {
            _dir: dir,
            root,
            handler,
            state,
            _runtime: runtime,
        })
    }

    /// Calls a tool and returns the text payload plus the error flag.
    fn call(fx: &Fixture, name: &str, args: serde_json::Value) -> Result<(String, bool)> {
        let result = fx.handler.call_tool(name, Some(args))?;
        let is_error = result.is_error == Some(true);
        let crate::mcp::ToolContent::Text { text } = result
            .content
            .first()
            .ok_or_else(|| anyhow!("empty content"))?
            .clone();
        Ok((text, is_error))
    }

    #[test]
    fn test_write_then_read_round_trip() -> Result<()> {
        let fx = fixture()?;
        let path = fx.root.join("a.txt").display().to_string();

        let (text, is_error) = call(
            &fx,
            "write_file",
            json!({ "path": path, "content": "hello", "encoding": "utf8" }),
        )?;
        assert!(!is_error, "write failed: {text}");

        let (text, is_error) = call(&fx, "read_file", json!({ "path": path }))?;
        assert!(!is_error, "read failed: {text}");
        let value: serde_json::Value = serde_json::from_str(&text)?;
        assert_eq!(value["content"], "hello");
        assert_eq!(value["size"], 5);
        Ok(())
    }

    #[test]
    fn test_base64_round_trip() -> Result<()> {
        let fx = fixture()?;
        let path = fx.root.join("blob.bin").display().to_string();
        let payload: Vec<u8> = vec![0, 159, 146, 150];
        let encoded = general_purpose::STANDARD.encode(&payload);

        let (_, is_error) = call(
            &fx,
            "write_file",
            json!({ "path": path, "content": encoded, "encoding": "base64" }),
        )?;
        assert!(!is_error);

        let (text, is_error) =
            call(&fx, "read_file", json!({ "path": path, "encoding": "base64" }))?;
        assert!(!is_error);
        let value: serde_json::Value = serde_json::from_str(&text)?;
        let round_tripped = general_purpose::STANDARD
            .decode(value["content"].as_str().context("missing content")?)?;
        assert_eq!(round_tripped, payload);
        assert_eq!(value["size"], 4);
        Ok(())
    }

    #[test]
    fn test_invalid_base64_rejected_before_write() -> Result<()> {
        let fx = fixture()?;
        let path = fx.root.join("bad.bin");

        let (text, is_error) = call(
            &fx,
            "write_file",
            json!({
                "path": path.display().to_string(),
                "content": "not-base64!!!",
                "encoding": "base64"
            }),
        )?;
        assert!(is_error);
        assert!(text.starts_with("invalid_argument"), "got: {text}");
        assert!(!path.exists(), "no partial write on rejection");
        Ok(())
    }

    #[test]
    fn test_read_outside_sandbox_rejected() -> Result<()> {
        let fx = fixture()?;
        let (text, is_error) = call(&fx, "read_file", json!({ "path": "/etc/hostname" }))?;
        assert!(is_error);
        assert!(text.starts_with("outside_sandbox"), "got: {text}");
        Ok(())
    }

    #[test]
    fn test_read_missing_file_not_found() -> Result<()> {
        let fx = fixture()?;
        let path = fx.root.join("missing.txt").display().to_string();
        let (text, is_error) = call(&fx, "read_file", json!({ "path": path }))?;
        assert!(is_error);
        assert!(text.starts_with("not_found"), "got: {text}");
        Ok(())
    }

    #[test]
    fn test_read_at_exact_limit_succeeds() -> Result<()> {
        let fx = fixture_with_limits(16, 1024, 1000)?;
        let path = fx.root.join("exact.bin");
        fs::write(&path, vec![b'x'; 16])?;

        let (text, is_error) =
            call(&fx, "read_file", json!({ "path": path.display().to_string() }))?;
        assert!(!is_error, "exact-limit read failed: {text}");
        Ok(())
    }

    #[test]
    fn test_read_over_limit_rejected() -> Result<()> {
        let fx = fixture_with_limits(16, 1024, 1000)?;
        let path = fx.root.join("big.bin");
        fs::write(&path, vec![b'x'; 17])?;

        let (text, is_error) =
            call(&fx, "read_file", json!({ "path": path.display().to_string() }))?;
        assert!(is_error);
        assert!(text.starts_with("too_large"), "got: {text}");
        Ok(())
    }

    #[test]
    fn test_oversized_write_leaves_no_file() -> Result<()> {
        let fx = fixture_with_limits(1024, 8, 1000)?;
        let path = fx.root.join("sub/over.txt");

        let (text, is_error) = call(
            &fx,
            "write_file",
            json!({
                "path": path.display().to_string(),
                "content": "nine bytes",
            }),
        )?;
        assert!(is_error);
        assert!(text.starts_with("too_large"), "got: {text}");
        assert!(!path.exists());
        // The ceiling check runs before directory creation too
        assert!(!fx.root.join("sub").exists());
        Ok(())
    }

    #[test]
    fn test_write_creates_missing_parents() -> Result<()> {
        let fx = fixture()?;
        let path = fx.root.join("deep/nested/file.txt");

        let (_, is_error) = call(
            &fx,
            "write_file",
            json!({ "path": path.display().to_string(), "content": "x" }),
        )?;
        assert!(!is_error);
        assert_eq!(fs::read_to_string(&path)?, "x");
        Ok(())
    }

    #[test]
    fn test_list_directory_names_and_kinds() -> Result<()> {
        let fx = fixture()?;
        fs::write(fx.root.join("a.txt"), "a")?;
        fs::create_dir(fx.root.join("d"))?;

        let (text, is_error) = call(
            &fx,
            "list_directory",
            json!({ "path": fx.root.display().to_string() }),
        )?;
        assert!(!is_error);

        let value: serde_json::Value = serde_json::from_str(&text)?;
        let entries = value.as_array().context("expected array")?;
        assert_eq!(entries.len(), 2);
        assert!(entries.contains(&json!({ "name": "a.txt", "kind": "file" })));
        assert!(entries.contains(&json!({ "name": "d", "kind": "directory" })));
        Ok(())
    }

    #[test]
    fn test_list_on_file_not_a_directory() -> Result<()> {
        let fx = fixture()?;
        fs::write(fx.root.join("f.txt"), "f")?;

        let (text, is_error) = call(
            &fx,
            "list_directory",
            json!({ "path": fx.root.join("f.txt").display().to_string() }),
        )?;
        assert!(is_error);
        assert!(text.starts_with("not_a_directory"), "got: {text}");
        Ok(())
    }

    #[test]
    fn test_rate_limit_rejects_after_quota() -> Result<()> {
        let fx = fixture_with_limits(1024, 1024, 3)?;

        for _ in 0..3 {
            let (_, is_error) = call(&fx, "health_check", json!({}))?;
            assert!(!is_error);
        }
        let (text, is_error) = call(&fx, "health_check", json!({}))?;
        assert!(is_error);
        assert!(text.starts_with("rate_limited"), "got: {text}");
        Ok(())
    }

    #[test]
    fn test_every_outcome_is_audited() -> Result<()> {
        let fx = fixture()?;
        assert_eq!(fx.state.audit.request_count(), 0);

        let _ = call(&fx, "health_check", json!({}))?;
        let _ = call(&fx, "read_file", json!({ "path": "/etc/hostname" }))?;
        let _ = call(&fx, "no_such_tool", json!({}))?;

        assert_eq!(fx.state.audit.request_count(), 3);
        Ok(())
    }

    #[test]
    fn test_unknown_tool_reports_error() -> Result<()> {
        let fx = fixture()?;
        let (text, is_error) = call(&fx, "probe_media", json!({}))?;
        assert!(is_error);
        assert!(text.contains("unknown tool"), "got: {text}");
        Ok(())
    }

    #[test]
    fn test_health_check_shape() -> Result<()> {
        let fx = fixture()?;
        let (text, is_error) = call(&fx, "health_check", json!({}))?;
        assert!(!is_error);
        let value: serde_json::Value = serde_json::from_str(&text)?;
        assert_eq!(value["status"], "ok");
        assert!(value["version"].is_string());
        assert!(value["uptime_seconds"].is_u64());
        Ok(())
    }

    #[test]
    fn test_capabilities_reports_limits() -> Result<()> {
        let fx = fixture_with_limits(2048, 512, 7)?;
        let (text, is_error) = call(&fx, "capabilities", json!({}))?;
        assert!(!is_error);
        let value: serde_json::Value = serde_json::from_str(&text)?;
        assert_eq!(value["limits"]["max_file_size"], 2048);
        assert_eq!(value["limits"]["max_write_size"], 512);
        assert_eq!(value["limits"]["rate_limit_per_minute"], 7);
        assert_eq!(
            value["limits"]["allowed_directories"],
            json!([fx.root.display().to_string()])
        );
        assert_eq!(
            value["tools"].as_array().map(Vec::len),
            Some(fx.handler.list_tools().len())
        );
        Ok(())
    }

    #[test]
    fn test_missing_arguments_invalid() -> Result<()> {
        let fx = fixture()?;
        let result = fx.handler.call_tool("read_file", None)?;
        assert_eq!(result.is_error, Some(true));
        Ok(())
    }
}
