// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Mark Wells <contact@markwells.dev>

//! Per-client sliding-window admission control.
//!
//! The limiter tracks request timestamps per client identity and rejects
//! requests that would exceed the configured count within the trailing
//! window. Pruning happens on every admission check, so the algorithm is a
//! fixed window with pruning; bursts up to the limit are possible at
//! window edges. That coarseness is accepted; this is not a token bucket.
//!
//! Client entries whose windows have emptied are dropped by a periodic
//! cleanup pass (every `cleanup_interval` admissions), so the table does
//! not grow without bound across long-idle clients.

use std::collections::HashMap;
use std::sync::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use super::error::GatewayError;

/// Configuration for the rate limiter.
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    /// Maximum number of requests allowed in the window.
    pub max_requests: u32,

    /// Size of the sliding window in seconds.
    pub window_secs: u64,

    /// How often to run cleanup (every N admission checks).
    pub cleanup_interval: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            // 60 requests per minute, matching the gateway default
            max_requests: 60,
            window_secs: 60,
            cleanup_interval: 100,
        }
    }
}

/// An in-memory sliding-window rate limiter keyed by client identity.
pub struct RateLimiter {
    config: RateLimitConfig,
    // Maps client ids to request timestamps inside the window
    state: RwLock<HashMap<String, Vec<Instant>>>,
    // Counter driving the periodic cleanup
    check_count: AtomicU64,
}

impl RateLimiter {
    /// Creates a new rate limiter with the given configuration.
    #[must_use]
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            state: RwLock::new(HashMap::new()),
            check_count: AtomicU64::new(0),
        }
    }

    /// Checks whether a request from `client_id` may proceed.
    ///
    /// Timestamps older than the window are pruned first. If the pruned
    /// count has already reached the limit the request is rejected
    /// *without being recorded*; otherwise the current instant is appended
    /// and the request admitted; the request that reaches the limit is
    /// the last one admitted.
    ///
    /// Admissions for the same client serialize through the table's write
    /// lock, so two concurrent calls cannot both squeak under the limit.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::RateLimited`] when the window is exhausted.
    pub fn admit(&self, client_id: &str) -> Result<(), GatewayError> {
        let now = Instant::now();
        let window = Duration::from_secs(self.config.window_secs);
        let cutoff = now.checked_sub(window).unwrap_or(now);

        // Periodic cleanup keeps idle clients from accumulating. Relaxed
        // ordering: a missed or duplicate cleanup pass is harmless.
        let count = self.check_count.fetch_add(1, Ordering::Relaxed);
        if count > 0 && count % self.config.cleanup_interval == 0 {
            self.cleanup();
        }

        let mut state = self
            .state
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner);

        let timestamps = state.entry(client_id.to_string()).or_default();
        timestamps.retain(|&t| t > cutoff);

        if timestamps.len() >= self.config.max_requests as usize {
            tracing::warn!(
                client = client_id,
                requests = timestamps.len(),
                max = self.config.max_requests,
                "rate limit exceeded"
            );
            return Err(GatewayError::RateLimited);
        }

        timestamps.push(now);
        Ok(())
    }

    /// Drops client entries whose windows have emptied.
    pub fn cleanup(&self) {
        let now = Instant::now();
        let window = Duration::from_secs(self.config.window_secs);
        let cutoff = now.checked_sub(window).unwrap_or(now);

        let mut state = self
            .state
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner);

        state.retain(|_, timestamps| {
            timestamps.retain(|&t| t > cutoff);
            !timestamps.is_empty()
        });
    }

    /// Number of client identities currently tracked.
    #[must_use]
    pub fn tracked_clients(&self) -> usize {
        let state = self
            .state
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        state.len()
    }

    /// The limiter's configuration.
    #[must_use]
    pub const fn config(&self) -> &RateLimitConfig {
        &self.config
    }
}
