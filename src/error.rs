// Copyright 2026 bulkdns contributors
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// https://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// https://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! Error taxonomy for bulkdns.
//!
//! Per the failure-semantics table: configuration problems exit 1, worker
//! spawn failures exit 2, and anything that leaves the scan unable to
//! continue is a fatal abort. Per-query failures (decode errors, timeouts,
//! encode failures) are never represented here — they are dropped silently
//! at the call site and logged at `debug` level.

use thiserror::Error;

/// Top-level error type returned by the scan and server drivers.
#[derive(Debug, Error)]
pub enum BulkdnsError {
    /// A configuration value failed validation at startup.
    #[error("configuration error: {0}")]
    Config(String),

    /// A worker task could not be started.
    #[error("failed to start worker: {0}")]
    WorkerSpawn(String),

    /// A condition the scan cannot continue past (socket pool exhausted at
    /// startup, runtime setup failure).
    #[error("fatal error: {0}")]
    Fatal(String),
}

impl BulkdnsError {
    /// Process exit code this error should map to in `main`.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Config(_) => 1,
            Self::WorkerSpawn(_) => 2,
            Self::Fatal(_) => 70, // EX_SOFTWARE, matches the "abort" semantics
        }
    }
}

/// Errors returned by [`crate::queue::BoundedQueue`].
#[derive(Debug, Error, PartialEq, Eq, Clone, Copy)]
pub enum QueueError {
    /// The queue is at capacity; `put` had no side effect.
    #[error("queue is full")]
    Full,
}
