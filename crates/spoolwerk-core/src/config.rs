// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Agent configuration.
//
// The agent is configured through environment variables so it can run as an
// unattended service.  Every service instance is constructed with an explicit
// `AgentConfig` -- there is no process-wide configuration state.

use std::path::PathBuf;
use std::time::Duration;

/// Configuration for one spooler service instance.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// Default printer host.  Empty means no network printer is configured
    /// and jobs without an explicit target fall back to the spool directory.
    pub printer_host: String,
    /// Default printer port (raw TCP / JetDirect).
    pub printer_port: u16,
    /// Path of the SQLite job database.
    pub db_path: PathBuf,
    /// Directory receiving spool files when no printer host is resolved.
    pub spool_dir: PathBuf,
    /// Optional static API token.  When set, mutating HTTP endpoints
    /// require it; the core itself does not enforce it.
    pub auth_token: Option<String>,
    /// Address the HTTP API binds to.
    pub bind_addr: String,
    /// Port the HTTP API listens on.
    pub http_port: u16,
    /// Dispatch attempts per job before the error state becomes terminal.
    pub max_attempts: u32,
    /// Bound on a single transport write (connect included).
    pub delivery_timeout: Duration,
    /// Delay before a failed job is re-enqueued.  Deliberately a fixed
    /// delay -- no exponential growth, no jitter.  This agent feeds a single
    /// low-volume printer and a constant 1s pause is the intended policy.
    pub retry_backoff: Duration,
    /// How long a worker blocks on the work queue before re-checking the
    /// shutdown flag.
    pub poll_interval: Duration,
    /// Number of parallel dispatch workers.
    pub worker_count: usize,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            printer_host: String::new(),
            printer_port: 9100,
            db_path: PathBuf::from("printer_agent.db"),
            spool_dir: std::env::temp_dir().join("printer_agent_out"),
            auth_token: None,
            bind_addr: "0.0.0.0".into(),
            http_port: 9100,
            max_attempts: 3,
            delivery_timeout: Duration::from_secs(5),
            retry_backoff: Duration::from_secs(1),
            poll_interval: Duration::from_secs(1),
            worker_count: 1,
        }
    }
}

impl AgentConfig {
    /// Build a configuration from the process environment.
    ///
    /// Recognised variables: `PRINTER_HOST`, `PRINTER_PORT`,
    /// `PRINTER_AGENT_DB`, `PRINTER_OUTDIR`, `PRINT_AGENT_TOKEN`,
    /// `PRINTER_AGENT_BIND`, `PRINTER_AGENT_PORT`.  Unset or unparsable
    /// values keep their defaults.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(host) = std::env::var("PRINTER_HOST") {
            config.printer_host = host;
        }
        if let Some(port) = env_parse::<u16>("PRINTER_PORT") {
            config.printer_port = port;
        }
        if let Ok(path) = std::env::var("PRINTER_AGENT_DB") {
            config.db_path = PathBuf::from(path);
        }
        if let Ok(dir) = std::env::var("PRINTER_OUTDIR") {
            config.spool_dir = PathBuf::from(dir);
        }
        if let Ok(token) = std::env::var("PRINT_AGENT_TOKEN") {
            if !token.is_empty() {
                config.auth_token = Some(token);
            }
        }
        if let Ok(bind) = std::env::var("PRINTER_AGENT_BIND") {
            config.bind_addr = bind;
        }
        if let Some(port) = env_parse::<u16>("PRINTER_AGENT_PORT") {
            config.http_port = port;
        }

        config
    }
}

/// Read and parse an environment variable, `None` on absence or parse error.
fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|v| v.parse().ok())
}
