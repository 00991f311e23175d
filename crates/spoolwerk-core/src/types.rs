// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Core domain types for the Spoolwerk print spooler.

use serde::{Deserialize, Serialize};

use crate::error::{Result, SpoolError};

/// Unique identifier for a print job.
///
/// Assigned monotonically by the store (SQLite rowid) and immutable once
/// created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct JobId(pub i64);

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle states of a print job.
///
/// Transitions: `Queued → Processing → {Done, Error}`, plus the automatic
/// `Error → Queued` re-enqueue while attempts remain.  `Done` and exhausted
/// `Error` are terminal for that job row; a reprint creates a new row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    /// Persisted and waiting to be dispatched.
    Queued,
    /// A dispatch attempt is in flight.
    Processing,
    /// Delivered successfully.
    Done,
    /// The most recent attempt failed -- see the job's `last_error`.
    Error,
}

impl JobStatus {
    /// Lower-case text stored in the `status` column.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Processing => "processing",
            Self::Done => "done",
            Self::Error => "error",
        }
    }

    /// Parse the stored column text back into a status.
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "queued" => Some(Self::Queued),
            "processing" => Some(Self::Processing),
            "done" => Some(Self::Done),
            "error" => Some(Self::Error),
            _ => None,
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An explicit delivery target carried on a payload.
///
/// A missing or empty `host` falls back to the configured default printer;
/// a missing `port` falls back to the configured default port.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrinterTarget {
    pub host: String,
    #[serde(default)]
    pub port: Option<u16>,
}

/// The logical content of a print job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PayloadBody {
    /// Plain text, rendered to printer bytes by the encoder.
    Text(String),
    /// Pre-rendered printer bytes, kept as the caller-supplied base64 text.
    /// Decoded at encode time, so a malformed blob fails per attempt.
    RawBase64(String),
}

/// A validated print payload: content plus an optional delivery target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrintPayload {
    pub body: PayloadBody,
    #[serde(default)]
    pub printer: Option<PrinterTarget>,
}

/// A complete print job as persisted in the store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrintJob {
    pub id: JobId,
    pub payload: PrintPayload,
    pub status: JobStatus,
    /// Incremented exactly once per dispatch attempt.  Never decreases.
    pub attempts: u32,
    /// Diagnostic from the most recent failed attempt.
    pub last_error: Option<String>,
    /// Epoch seconds; immutable once created.
    pub created_at: i64,
    /// Epoch seconds; refreshed on every mutation.
    pub updated_at: i64,
}

/// The raw admission request as submitted by a client.
///
/// Mirrors the JSON body of `POST /print`.  `mode` selects raw transmission
/// only when it is `"raw"` and a blob is actually present; otherwise a
/// present `text` wins.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PrintRequest {
    #[serde(default)]
    pub mode: Option<String>,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub raw_bytes_base64: Option<String>,
    #[serde(default)]
    pub printer: Option<PrinterTarget>,
}

impl PrintRequest {
    /// Validate the request into a typed payload.
    ///
    /// # Errors
    ///
    /// Returns [`SpoolError::InvalidPayload`] when the request carries
    /// neither text nor raw bytes.  No job row is created in that case.
    pub fn into_payload(self) -> Result<PrintPayload> {
        let raw_mode = self.mode.as_deref() == Some("raw");
        let body = match (self.text, self.raw_bytes_base64) {
            (_, Some(raw)) if raw_mode => PayloadBody::RawBase64(raw),
            (Some(text), _) => PayloadBody::Text(text),
            (None, Some(raw)) => PayloadBody::RawBase64(raw),
            (None, None) => {
                return Err(SpoolError::InvalidPayload(
                    "no text or raw bytes provided".into(),
                ));
            }
        };

        Ok(PrintPayload {
            body,
            printer: self.printer,
        })
    }
}

/// Snapshot counters exposed by the service.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct AgentStats {
    /// Jobs that are queued or mid-dispatch (not yet terminal).
    pub pending_count: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_text_round_trips() {
        for status in [
            JobStatus::Queued,
            JobStatus::Processing,
            JobStatus::Done,
            JobStatus::Error,
        ] {
            assert_eq!(JobStatus::from_str(status.as_str()), Some(status));
        }
        assert_eq!(JobStatus::from_str("cancelled"), None);
    }

    #[test]
    fn text_request_becomes_text_payload() {
        let request = PrintRequest {
            text: Some("hello".into()),
            ..Default::default()
        };
        let payload = request.into_payload().expect("valid");
        assert_eq!(payload.body, PayloadBody::Text("hello".into()));
        assert!(payload.printer.is_none());
    }

    #[test]
    fn raw_mode_selects_raw_bytes() {
        let request = PrintRequest {
            mode: Some("raw".into()),
            text: Some("ignored".into()),
            raw_bytes_base64: Some("aGVsbG8=".into()),
            ..Default::default()
        };
        let payload = request.into_payload().expect("valid");
        assert_eq!(payload.body, PayloadBody::RawBase64("aGVsbG8=".into()));
    }

    #[test]
    fn raw_mode_without_blob_falls_back_to_text() {
        let request = PrintRequest {
            mode: Some("raw".into()),
            text: Some("still here".into()),
            ..Default::default()
        };
        let payload = request.into_payload().expect("valid");
        assert_eq!(payload.body, PayloadBody::Text("still here".into()));
    }

    #[test]
    fn empty_request_is_rejected() {
        let request = PrintRequest::default();
        assert!(matches!(
            request.into_payload(),
            Err(SpoolError::InvalidPayload(_))
        ));
    }

    #[test]
    fn payload_json_round_trips() {
        let payload = PrintPayload {
            body: PayloadBody::Text("receipt".into()),
            printer: Some(PrinterTarget {
                host: "192.168.1.50".into(),
                port: Some(9100),
            }),
        };
        let json = serde_json::to_string(&payload).expect("serialize");
        let back: PrintPayload = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back, payload);
    }
}
