// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Delivery transports.
//
// A job's encoded bytes reach the outside world one of two ways: a raw TCP
// connection to the printer (JetDirect, port 9100) or, when no printer host
// is configured at all, a spool file on local disk for manual printing.
// Every failure becomes a `Delivery` error carrying the underlying cause so
// the dispatcher can record it on the job.

use std::path::PathBuf;
use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tracing::{debug, info};

use spoolwerk_core::config::AgentConfig;
use spoolwerk_core::error::{Result, SpoolError};
use spoolwerk_core::types::{JobId, PrintPayload};

/// Where one job's bytes are delivered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryTarget {
    /// Raw TCP to a network printer.
    Network { host: String, port: u16 },
    /// Spool file in the output directory (no printer host resolved).
    File { dir: PathBuf },
}

impl DeliveryTarget {
    /// Resolve the target for a payload.
    ///
    /// An explicit target on the payload wins; empty or missing fields fall
    /// back to the configured defaults.  If no host resolves at all, the
    /// job goes to the spool directory.
    pub fn resolve(payload: &PrintPayload, config: &AgentConfig) -> Self {
        let (host, port) = match &payload.printer {
            Some(target) => {
                let host = if target.host.is_empty() {
                    config.printer_host.clone()
                } else {
                    target.host.clone()
                };
                (host, target.port.unwrap_or(config.printer_port))
            }
            None => (config.printer_host.clone(), config.printer_port),
        };

        if host.is_empty() {
            Self::File {
                dir: config.spool_dir.clone(),
            }
        } else {
            Self::Network { host, port }
        }
    }
}

/// Deliver encoded bytes to the target, bounded by `timeout` for the
/// network path.
pub async fn deliver(
    target: &DeliveryTarget,
    job_id: JobId,
    bytes: &[u8],
    timeout: Duration,
) -> Result<()> {
    match target {
        DeliveryTarget::Network { host, port } => {
            send_network(host, *port, bytes, timeout).await
        }
        DeliveryTarget::File { dir } => write_spool_file(dir, job_id, bytes).await,
    }
}

/// Open a TCP connection, write the full buffer, and close cleanly.
///
/// The whole operation -- connect included -- runs inside a single timeout.
async fn send_network(host: &str, port: u16, bytes: &[u8], timeout: Duration) -> Result<()> {
    let addr = format!("{host}:{port}");
    debug!(addr = %addr, total = bytes.len(), "connecting to printer");

    let send = async {
        let mut stream = TcpStream::connect(&addr)
            .await
            .map_err(|e| SpoolError::Delivery(format!("connect to {addr}: {e}")))?;

        stream
            .write_all(bytes)
            .await
            .map_err(|e| SpoolError::Delivery(format!("write to {addr}: {e}")))?;

        stream
            .flush()
            .await
            .map_err(|e| SpoolError::Delivery(format!("flush to {addr}: {e}")))?;
        stream
            .shutdown()
            .await
            .map_err(|e| SpoolError::Delivery(format!("shutdown to {addr}: {e}")))?;

        Ok::<(), SpoolError>(())
    };

    tokio::time::timeout(timeout, send).await.map_err(|_| {
        SpoolError::Delivery(format!(
            "delivery to {addr} timed out after {}s",
            timeout.as_secs()
        ))
    })??;

    info!(addr = %addr, total = bytes.len(), "job bytes sent to printer");
    Ok(())
}

/// Fallback: write the bytes to the spool directory as `ticket_<id>.txt`.
async fn write_spool_file(dir: &PathBuf, job_id: JobId, bytes: &[u8]) -> Result<()> {
    tokio::fs::create_dir_all(dir)
        .await
        .map_err(|e| SpoolError::Delivery(format!("create {}: {e}", dir.display())))?;

    let path = dir.join(format!("ticket_{job_id}.txt"));
    tokio::fs::write(&path, bytes)
        .await
        .map_err(|e| SpoolError::Delivery(format!("write {}: {e}", path.display())))?;

    info!(path = %path.display(), total = bytes.len(), "job bytes spooled to file");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use spoolwerk_core::types::{PayloadBody, PrinterTarget};
    use tokio::io::AsyncReadExt;
    use tokio::net::TcpListener;

    fn payload_with(printer: Option<PrinterTarget>) -> PrintPayload {
        PrintPayload {
            body: PayloadBody::Text("x".into()),
            printer,
        }
    }

    #[test]
    fn explicit_target_wins_over_defaults() {
        let config = AgentConfig {
            printer_host: "10.0.0.9".into(),
            ..Default::default()
        };
        let payload = payload_with(Some(PrinterTarget {
            host: "192.168.1.50".into(),
            port: Some(9101),
        }));

        assert_eq!(
            DeliveryTarget::resolve(&payload, &config),
            DeliveryTarget::Network {
                host: "192.168.1.50".into(),
                port: 9101,
            }
        );
    }

    #[test]
    fn missing_port_falls_back_to_default() {
        let config = AgentConfig::default();
        let payload = payload_with(Some(PrinterTarget {
            host: "192.168.1.50".into(),
            port: None,
        }));

        assert_eq!(
            DeliveryTarget::resolve(&payload, &config),
            DeliveryTarget::Network {
                host: "192.168.1.50".into(),
                port: 9100,
            }
        );
    }

    #[test]
    fn no_host_anywhere_resolves_to_file() {
        let config = AgentConfig::default();
        let payload = payload_with(None);

        assert!(matches!(
            DeliveryTarget::resolve(&payload, &config),
            DeliveryTarget::File { .. }
        ));
    }

    #[test]
    fn empty_payload_host_uses_default_host() {
        let config = AgentConfig {
            printer_host: "10.0.0.9".into(),
            ..Default::default()
        };
        let payload = payload_with(Some(PrinterTarget {
            host: String::new(),
            port: None,
        }));

        assert_eq!(
            DeliveryTarget::resolve(&payload, &config),
            DeliveryTarget::Network {
                host: "10.0.0.9".into(),
                port: 9100,
            }
        );
    }

    #[tokio::test]
    async fn network_delivery_sends_exact_bytes() {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("local addr");

        let server = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.expect("accept");
            let mut received = Vec::new();
            stream.read_to_end(&mut received).await.expect("read");
            received
        });

        let target = DeliveryTarget::Network {
            host: addr.ip().to_string(),
            port: addr.port(),
        };
        deliver(&target, JobId(1), b"ticket bytes", Duration::from_secs(5))
            .await
            .expect("deliver");

        let received = server.await.expect("join");
        assert_eq!(received, b"ticket bytes");
    }

    #[tokio::test]
    async fn refused_connection_is_a_delivery_error() {
        // Bind then drop to find a port with no listener.
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("local addr");
        drop(listener);

        let target = DeliveryTarget::Network {
            host: addr.ip().to_string(),
            port: addr.port(),
        };
        let result = deliver(&target, JobId(1), b"x", Duration::from_secs(5)).await;

        match result {
            Err(SpoolError::Delivery(detail)) => assert!(detail.contains("connect")),
            other => panic!("expected delivery error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn file_delivery_writes_deterministic_name() {
        let dir = tempfile::tempdir().expect("tempdir");
        let target = DeliveryTarget::File {
            dir: dir.path().to_path_buf(),
        };

        deliver(&target, JobId(42), b"Hello\n\x1DV1", Duration::from_secs(5))
            .await
            .expect("deliver");

        let content = std::fs::read(dir.path().join("ticket_42.txt")).expect("read");
        assert_eq!(content, b"Hello\n\x1DV1");
    }

    #[tokio::test]
    async fn file_delivery_creates_missing_directory() {
        let dir = tempfile::tempdir().expect("tempdir");
        let nested = dir.path().join("spool").join("out");
        let target = DeliveryTarget::File { dir: nested.clone() };

        deliver(&target, JobId(7), b"x", Duration::from_secs(5))
            .await
            .expect("deliver");

        assert!(nested.join("ticket_7.txt").exists());
    }
}
