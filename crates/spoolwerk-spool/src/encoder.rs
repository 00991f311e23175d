// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Payload-to-wire encoder.
//
// Produces the exact byte sequence handed to the delivery transport.  Text
// payloads are rendered for ESC/POS thermal printers: UTF-8 bytes, one line
// feed, then a partial paper cut.  Raw payloads pass through verbatim after
// base64 decoding.  No other control codes are interpreted -- this is a
// minimal, non-extensible encoder.

use base64::{Engine as _, engine::general_purpose};

use spoolwerk_core::error::{Result, SpoolError};
use spoolwerk_core::types::PayloadBody;

/// ESC/POS partial paper cut: GS V '1'.
pub const PAPER_CUT: [u8; 3] = [0x1D, 0x56, 0x31];

/// Encode a payload body into transport-ready bytes.
///
/// # Errors
///
/// Returns [`SpoolError::Decode`] when a raw payload's base64 blob is
/// malformed.  The dispatcher records this as the job's failure like any
/// other attempt error.
pub fn encode(body: &PayloadBody) -> Result<Vec<u8>> {
    match body {
        PayloadBody::Text(text) => {
            let mut bytes = Vec::with_capacity(text.len() + 1 + PAPER_CUT.len());
            bytes.extend_from_slice(text.as_bytes());
            bytes.push(b'\n');
            bytes.extend_from_slice(&PAPER_CUT);
            Ok(bytes)
        }
        PayloadBody::RawBase64(blob) => general_purpose::STANDARD
            .decode(blob)
            .map_err(|e| SpoolError::Decode(format!("base64: {e}"))),
    }
}
