// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Dispatch engine.
//
// Workers pull job ids off the in-memory work queue and drive each job
// through `queued → processing → {done, error}`.  A failed attempt records
// `last_error` and, while attempts remain, re-enqueues the id after a fixed
// backoff.  A single job's failure never terminates a worker loop.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use spoolwerk_core::config::AgentConfig;
use spoolwerk_core::error::Result;
use spoolwerk_core::types::{JobId, JobStatus, PrintJob};

use crate::encoder;
use crate::store::{JobStore, JobUpdate};
use crate::transport::{self, DeliveryTarget};

/// Shared single-consumer end of the work queue.
///
/// Wrapped in an async mutex so `worker_count > 1` workers can take turns
/// receiving; the lock is held only across the receive, never across a
/// dispatch.
pub(crate) type WorkReceiver = Arc<tokio::sync::Mutex<mpsc::UnboundedReceiver<JobId>>>;

/// One dispatch worker.  Cheap to construct; the service spawns
/// `worker_count` of them over the same store and queue.
pub(crate) struct Dispatcher {
    pub(crate) store: Arc<Mutex<JobStore>>,
    pub(crate) tx: mpsc::UnboundedSender<JobId>,
    pub(crate) config: AgentConfig,
}

impl Dispatcher {
    /// Run the dispatch loop until the shutdown flag is set or the queue
    /// closes.
    ///
    /// The receive blocks at most `poll_interval` so the flag is observed
    /// without busy-waiting.  An in-flight delivery is never aborted; it
    /// runs to completion or to its own timeout before the flag is
    /// re-checked.
    pub(crate) async fn run(self, rx: WorkReceiver, shutdown: Arc<AtomicBool>, worker: usize) {
        debug!(worker, "dispatch loop started");
        loop {
            if shutdown.load(Ordering::Relaxed) {
                break;
            }

            let received = {
                let mut rx = rx.lock().await;
                tokio::time::timeout(self.config.poll_interval, rx.recv()).await
            };

            match received {
                Ok(Some(id)) => self.process(id).await,
                // All senders dropped: nothing can ever arrive again.
                Ok(None) => break,
                // Poll timeout -- loop around and re-check the flag.
                Err(_) => continue,
            }
        }
        debug!(worker, "dispatch loop stopped");
    }

    /// Drive one dequeued job to a terminal or retry outcome.
    ///
    /// Never propagates an error: every failure is captured on the job row
    /// (or logged, for store failures) so other jobs keep flowing.
    async fn process(&self, id: JobId) {
        let job = match self.load(id) {
            Ok(Some(job)) => job,
            Ok(None) => {
                // Row vanished between enqueue and dispatch.
                debug!(job_id = %id, "job not found -- dropping");
                return;
            }
            Err(e) => {
                warn!(job_id = %id, error = %e, "could not load job");
                return;
            }
        };

        let attempts = job.attempts + 1;
        if let Err(e) = self.update(
            id,
            &JobUpdate {
                status: Some(JobStatus::Processing),
                attempts: Some(attempts),
                ..Default::default()
            },
        ) {
            warn!(job_id = %id, error = %e, "could not mark job processing");
            return;
        }

        match self.attempt(&job).await {
            Ok(()) => {
                if let Err(e) = self.update(
                    id,
                    &JobUpdate {
                        status: Some(JobStatus::Done),
                        last_error: Some(None),
                        ..Default::default()
                    },
                ) {
                    warn!(job_id = %id, error = %e, "could not mark job done");
                }
                info!(job_id = %id, attempts, "job delivered");
            }
            Err(e) => {
                let detail = e.to_string();
                warn!(job_id = %id, attempts, error = %detail, "dispatch attempt failed");
                if let Err(e) = self.update(
                    id,
                    &JobUpdate {
                        status: Some(JobStatus::Error),
                        last_error: Some(Some(&detail)),
                        ..Default::default()
                    },
                ) {
                    warn!(job_id = %id, error = %e, "could not record job failure");
                }

                if attempts < self.config.max_attempts {
                    // Fixed delay, then back onto the queue.
                    tokio::time::sleep(self.config.retry_backoff).await;
                    if self.tx.send(id).is_err() {
                        debug!(job_id = %id, "work queue closed -- retry dropped");
                    }
                } else {
                    warn!(job_id = %id, attempts, "retries exhausted -- manual reprint required");
                }
            }
        }
    }

    /// Encode the payload, resolve the target, and deliver.
    async fn attempt(&self, job: &PrintJob) -> Result<()> {
        let bytes = encoder::encode(&job.payload.body)?;
        let target = DeliveryTarget::resolve(&job.payload, &self.config);
        transport::deliver(&target, job.id, &bytes, self.config.delivery_timeout).await
    }

    fn load(&self, id: JobId) -> Result<Option<PrintJob>> {
        self.store.lock().expect("store lock poisoned").get(id)
    }

    fn update(&self, id: JobId, update: &JobUpdate<'_>) -> Result<()> {
        self.store.lock().expect("store lock poisoned").update(id, update)
    }
}
