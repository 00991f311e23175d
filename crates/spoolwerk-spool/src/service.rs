// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Service facade.
//
// `SpoolService` is the core-facing API the HTTP layer talks to: admission,
// lookup, listing, reprint, and counters.  Each instance owns its store
// handle, its work queue, and its shutdown flag, with an explicit
// start/stop lifecycle -- no process-wide state.
//
// The rusqlite-backed store is `Send` but not `Sync`, so it sits behind
// `Arc<Mutex<_>>`.  Contention is minimal: every operation is a fast
// SQLite call.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use spoolwerk_core::config::AgentConfig;
use spoolwerk_core::error::{Result, SpoolError};
use spoolwerk_core::types::{AgentStats, JobId, PrintJob, PrintRequest};

use crate::dispatcher::Dispatcher;
use crate::recovery;
use crate::store::JobStore;

/// The durable print spooler: persistent queue plus dispatch workers.
pub struct SpoolService {
    config: AgentConfig,
    store: Arc<Mutex<JobStore>>,
    tx: mpsc::UnboundedSender<JobId>,
    /// Receiver slot, taken by the first `start`.
    rx: Mutex<Option<mpsc::UnboundedReceiver<JobId>>>,
    /// Cooperative shutdown flag checked once per dispatch-loop iteration.
    shutdown: Arc<AtomicBool>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl SpoolService {
    /// Open the job database and prepare the work queue.
    ///
    /// Dispatch workers do not run until [`start`](Self::start) is called,
    /// but admission already works: jobs persist and their ids buffer on
    /// the queue.
    pub fn new(config: AgentConfig) -> Result<Self> {
        let store = JobStore::open(&config.db_path)?;
        let (tx, rx) = mpsc::unbounded_channel();

        Ok(Self {
            config,
            store: Arc::new(Mutex::new(store)),
            tx,
            rx: Mutex::new(Some(rx)),
            shutdown: Arc::new(AtomicBool::new(false)),
            workers: Mutex::new(Vec::new()),
        })
    }

    /// The configuration this instance was constructed with.
    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    /// Run startup recovery and spawn the dispatch workers.
    ///
    /// Persisted jobs left `queued` or `error` re-enter the work queue in
    /// creation order before any worker starts.  Returns the number of
    /// recovered jobs.  Calling `start` twice is a no-op.
    pub fn start(&self) -> Result<usize> {
        let rx = match self.rx.lock().expect("receiver slot poisoned").take() {
            Some(rx) => rx,
            None => {
                debug!("service already started");
                return Ok(0);
            }
        };

        let recovered = recovery::recover_pending(&self.store, &self.tx)?;

        let rx = Arc::new(tokio::sync::Mutex::new(rx));
        let worker_count = self.config.worker_count.max(1);
        let mut workers = self.workers.lock().expect("worker list poisoned");
        for worker in 0..worker_count {
            let dispatcher = Dispatcher {
                store: Arc::clone(&self.store),
                tx: self.tx.clone(),
                config: self.config.clone(),
            };
            workers.push(tokio::spawn(dispatcher.run(
                Arc::clone(&rx),
                Arc::clone(&self.shutdown),
                worker,
            )));
        }

        info!(workers = worker_count, recovered, "spool service started");
        Ok(recovered)
    }

    /// Signal the workers to stop and wait for them to finish.
    ///
    /// Cooperative: a delivery already in flight runs to completion or to
    /// its own timeout before the loop observes the flag.
    pub async fn stop(&self) {
        self.shutdown.store(true, Ordering::Relaxed);

        let handles: Vec<_> = self
            .workers
            .lock()
            .expect("worker list poisoned")
            .drain(..)
            .collect();
        for handle in handles {
            if let Err(e) = handle.await {
                warn!(error = %e, "dispatch worker panicked");
            }
        }

        info!("spool service stopped");
    }

    /// Validate and accept a print job.
    ///
    /// The job row is durably persisted (status `queued`) before this
    /// returns; the queue push afterwards is non-blocking.
    ///
    /// # Errors
    ///
    /// [`SpoolError::InvalidPayload`] when the request carries neither
    /// text nor raw bytes -- rejected before any row is created.
    pub fn admit(&self, request: PrintRequest) -> Result<JobId> {
        let payload = request.into_payload()?;
        let id = self
            .store
            .lock()
            .expect("store lock poisoned")
            .insert(&payload)?;

        if self.tx.send(id).is_err() {
            // Queue closed mid-shutdown; the row is safe and recovery
            // picks it up on the next start.
            warn!(job_id = %id, "work queue closed -- job deferred to next start");
        }

        info!(job_id = %id, "job admitted");
        Ok(id)
    }

    /// Fetch one job.
    ///
    /// # Errors
    ///
    /// [`SpoolError::NotFound`] if the id does not exist.
    pub fn fetch(&self, id: JobId) -> Result<PrintJob> {
        self.store
            .lock()
            .expect("store lock poisoned")
            .get(id)?
            .ok_or(SpoolError::NotFound(id))
    }

    /// Most recent jobs, newest first.
    pub fn list(&self, limit: u32) -> Result<Vec<PrintJob>> {
        self.store.lock().expect("store lock poisoned").list(limit)
    }

    /// Clone an existing job's payload into a brand-new job and enqueue it.
    ///
    /// The original row is untouched -- same status, attempts, and error.
    ///
    /// # Errors
    ///
    /// [`SpoolError::NotFound`] if the original id does not exist.
    pub fn reprint(&self, id: JobId) -> Result<JobId> {
        let payload = {
            let store = self.store.lock().expect("store lock poisoned");
            let original = store.get(id)?.ok_or(SpoolError::NotFound(id))?;
            original.payload
        };

        let new_id = self
            .store
            .lock()
            .expect("store lock poisoned")
            .insert(&payload)?;
        if self.tx.send(new_id).is_err() {
            warn!(job_id = %new_id, "work queue closed -- job deferred to next start");
        }

        info!(original = %id, job_id = %new_id, "job reprinted");
        Ok(new_id)
    }

    /// Snapshot counters.
    pub fn stats(&self) -> Result<AgentStats> {
        let pending_count = self
            .store
            .lock()
            .expect("store lock poisoned")
            .pending_count()?;
        Ok(AgentStats { pending_count })
    }
}
