// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Mark Wells <contact@markwells.dev>

//! Bulkhead MCP server and CLI.
//!
//! This is the main entry point for the Bulkhead sandboxed filesystem
//! gateway. It can be run as an MCP server over stdio or as a CLI tool to
//! check the effective configuration.

#![allow(clippy::print_stdout, reason = "CLI tool needs to output to stdout")]
#![allow(clippy::print_stderr, reason = "CLI tool needs to output to stderr")]

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use bulkhead_mcp::cli::{ColorConfig, format_bytes};
use bulkhead_mcp::config::Config;
use bulkhead_mcp::gateway::{
    AllowList, AuditRecorder, CapacityGuard, GatewayHandler, GatewayState, RateLimitConfig,
    RateLimiter, allowlist,
};
use bulkhead_mcp::mcp::McpServer;

/// Command-line arguments for Bulkhead.
#[derive(Parser, Debug)]
#[command(name = "bulkhead")]
#[command(about = "Sandboxed filesystem gateway between MCP agents and local files")]
#[command(version = env!("BULKHEAD_VERSION"))]
struct Args {
    /// The subcommand to run.
    #[command(subcommand)]
    command: Option<Command>,

    /// Path to configuration file.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Allowed base directories. Can be specified multiple times; overrides
    /// the configured allowlist.
    #[arg(short, long = "allow", global = true)]
    allow: Vec<PathBuf>,
}

/// Subcommands supported by Bulkhead.
#[derive(Subcommand, Debug)]
enum Command {
    /// Run the MCP server (default if no subcommand given).
    Serve,

    /// Check the effective configuration and allowlist health.
    Doctor {
        /// Disable colored output.
        #[arg(long)]
        nocolor: bool,
    },
}

/// Entry point for the Bulkhead binary.
///
/// # Errors
///
/// Returns an error if the subcommand fails.
#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    match args.command {
        None | Some(Command::Serve) => run_server(args).await,
        Some(Command::Doctor { nocolor }) => run_doctor(&args, nocolor),
    }
}

/// Runs the MCP server over stdio.
///
/// # Errors
///
/// Returns an error if the server fails to start or encounters an internal
/// error.
async fn run_server(args: Args) -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("bulkhead=info".parse()?))
        .with_writer(std::io::stderr)
        .init();

    // Load configuration
    let config = Config::load(args.config.clone())?;
    let allowlist = Arc::new(build_allowlist(&args.allow, &config));

    if allowlist.is_empty() {
        warn!("allowlist is empty: every path access will be rejected");
    }

    info!("Starting bulkhead gateway");
    info!("Allowed directories: {}", allowlist.len());
    info!(
        "Size ceilings: read {} bytes, write {} bytes",
        config.max_file_size, config.max_write_size
    );
    info!(
        "Rate limit: {} requests per {}s window",
        config.rate_limit, config.rate_window_secs
    );

    // Shared mutable gateway state, owned here rather than living in
    // process-wide globals
    let state = Arc::new(GatewayState::new(
        RateLimiter::new(RateLimitConfig {
            max_requests: config.rate_limit,
            window_secs: config.rate_window_secs,
            ..Default::default()
        }),
        AuditRecorder::stderr(),
    ));

    let handler = GatewayHandler::new(
        allowlist,
        CapacityGuard::new(config.max_file_size, config.max_write_size),
        state,
        tokio::runtime::Handle::current(),
    );

    // Run in a blocking task since the MCP server uses synchronous I/O
    let mut mcp_server = McpServer::new(handler);
    let mcp_task = tokio::task::spawn_blocking(move || mcp_server.run());

    // Wait for either the MCP task to finish or a termination signal
    tokio::select! {
        res = mcp_task => {
            res?
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received shutdown signal");
            Ok(())
        }
    }
}

/// Builds the allowlist: CLI `--allow` directories win over configuration.
fn build_allowlist(cli_allow: &[PathBuf], config: &Config) -> AllowList {
    if cli_allow.is_empty() {
        return AllowList::parse(Some(config.allowed_directories.as_str()));
    }

    let mut entries = Vec::new();
    for dir in cli_allow {
        match dir.canonicalize() {
            Ok(canonical) => entries.push(canonical),
            Err(e) => warn!("dropping --allow directory {}: {e}", dir.display()),
        }
    }
    AllowList::from_canonical(entries)
}

/// Run the doctor command: report the effective configuration and whether
/// each allowlist entry resolves.
///
/// # Errors
///
/// Returns an error if the configuration cannot be loaded.
fn run_doctor(args: &Args, nocolor: bool) -> Result<()> {
    let colors = ColorConfig::new(nocolor);

    println!("Bulkhead {}", env!("BULKHEAD_VERSION"));
    println!();

    let config = Config::load(args.config.clone())?;
    let config_source = args
        .config
        .as_ref()
        .map_or_else(|| "default paths".to_string(), |p| p.display().to_string());

    println!("{} {config_source}", colors.bold("Config:"));
    println!(
        "{} read {}, write {}",
        colors.bold("Limits:"),
        format_bytes(config.max_file_size),
        format_bytes(config.max_write_size),
    );
    println!(
        "{} {} requests per {}s window",
        colors.bold("Rate:  "),
        config.rate_limit,
        config.rate_window_secs,
    );
    println!();

    println!("{}", colors.bold("Allowed directories:"));

    let segments: Vec<String> = if args.allow.is_empty() {
        allowlist::raw_segments(&config.allowed_directories)
    } else {
        args.allow
            .iter()
            .map(|p| p.to_string_lossy().into_owned())
            .collect()
    };

    if segments.is_empty() {
        println!(
            "  {}",
            colors.red("✗ none configured: every request will be rejected"),
        );
        return Ok(());
    }

    let mut resolved = 0usize;
    for segment in &segments {
        let expanded = allowlist::expand_home(segment);
        match expanded.canonicalize() {
            Ok(canonical) => {
                resolved += 1;
                println!(
                    "  {} {}",
                    colors.green("✓"),
                    canonical.display(),
                );
            }
            Err(e) => {
                println!(
                    "  {} {}  {}",
                    colors.red("✗"),
                    segment,
                    colors.dim(&e.to_string()),
                );
            }
        }
    }

    if resolved == 0 {
        println!();
        println!(
            "  {}",
            colors.red("✗ no entry resolved: every request will be rejected"),
        );
    }

    Ok(())
}
