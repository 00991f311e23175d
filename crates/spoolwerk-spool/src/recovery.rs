// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Startup recovery.
//
// Re-admits persisted jobs left in `queued` or `error` into the work queue,
// oldest first, so nothing accepted before a crash is stranded.  Stored
// fields are not touched.  Jobs interrupted mid-delivery (`processing` at
// crash time) stay as they are until a reprint or manual intervention.

use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;
use tracing::info;

use spoolwerk_core::error::Result;
use spoolwerk_core::types::JobId;

use crate::store::JobStore;

/// Push every pending job id onto the work queue in creation order.
///
/// Returns the number of jobs re-queued.
pub fn recover_pending(
    store: &Arc<Mutex<JobStore>>,
    tx: &mpsc::UnboundedSender<JobId>,
) -> Result<usize> {
    let ids = store.lock().expect("store lock poisoned").pending_ids()?;
    let count = ids.len();

    for id in ids {
        if tx.send(id).is_err() {
            break;
        }
    }

    if count > 0 {
        info!(count, "re-queued persisted jobs after restart");
    }
    Ok(count)
}
