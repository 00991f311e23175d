// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Unified error types for Spoolwerk.

use thiserror::Error;

use crate::types::JobId;

/// Top-level error type for all Spoolwerk operations.
#[derive(Debug, Error)]
pub enum SpoolError {
    // -- Admission errors --
    /// The submitted payload carried neither text nor raw bytes.  Rejected
    /// before any row is created.
    #[error("invalid payload: {0}")]
    InvalidPayload(String),

    // -- Dispatch errors --
    /// A raw payload's base64 blob could not be decoded.  Recorded as the
    /// job's failure and consumes a dispatch attempt.
    #[error("payload decode failed: {0}")]
    Decode(String),

    /// Transport connect/write/timeout failure.  Recorded as the job's
    /// failure and triggers the retry policy.
    #[error("delivery failed: {0}")]
    Delivery(String),

    // -- Lookup --
    #[error("job {0} not found")]
    NotFound(JobId),

    // -- HTTP front end --
    #[error("HTTP server error: {0}")]
    Http(String),

    // -- Storage / persistence --
    #[error("database error: {0}")]
    Database(String),

    #[error("file I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, SpoolError>;
