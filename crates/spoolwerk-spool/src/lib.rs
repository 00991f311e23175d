// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Spoolwerk Spool -- the persistent job queue and its retrying dispatch
// engine.  This crate bridges between the core domain types defined in
// `spoolwerk-core` and the durable SQLite store, the payload encoder, and
// the network/file delivery transports.

pub mod dispatcher;
pub mod encoder;
pub mod recovery;
pub mod service;
pub mod store;
pub mod transport;

pub use service::SpoolService;
pub use store::{JobStore, JobUpdate};
