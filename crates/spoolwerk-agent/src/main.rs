// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Spoolwerk agent -- durable store-and-forward print spooler.
//
// Entry point.  Initialises logging, builds the service from environment
// configuration, runs startup recovery, and serves the HTTP API until
// Ctrl-C or a local POST /stop.

mod http;

use std::sync::Arc;

use tokio::sync::Notify;
use tracing::{error, info};

use spoolwerk_core::config::AgentConfig;
use spoolwerk_core::error::Result;
use spoolwerk_spool::SpoolService;

use http::HttpServer;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    info!("spoolwerk agent starting");

    if let Err(e) = run().await {
        error!(error = %e, "agent terminated");
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let config = AgentConfig::from_env();
    let printer = if config.printer_host.is_empty() {
        "<file fallback>".to_string()
    } else {
        format!("{}:{}", config.printer_host, config.printer_port)
    };
    info!(db = %config.db_path.display(), printer = %printer, "configuration loaded");

    let service = Arc::new(SpoolService::new(config.clone())?);
    let recovered = service.start()?;
    if recovered > 0 {
        info!(recovered, "pending jobs recovered from previous run");
    }

    let stop_requested = Arc::new(Notify::new());
    let mut server = HttpServer::new(config.bind_addr.clone(), config.http_port);
    server
        .start(Arc::clone(&service), Arc::clone(&stop_requested))
        .await?;

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("interrupt received -- shutting down");
        }
        _ = stop_requested.notified() => {
            info!("stop requested via API -- shutting down");
        }
    }

    server.stop().await?;
    service.stop().await;
    info!("spoolwerk agent stopped");
    Ok(())
}
