//! Delivery of encoded batches
//!
//! The pipeline hands the encoded line-protocol buffer to a [`Sink`] and
//! only advances the poll state when the sink reports success.

use crate::error::SinkError;
use async_trait::async_trait;
use std::io::Write;
use std::path::PathBuf;
use tempfile::NamedTempFile;
use tokio::process::Command;
use tracing::{debug, warn};

/// Output captured from a successful delivery
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeliveryReport {
    pub stdout: String,
    pub stderr: String,
}

/// Accepts an encoded batch and reports whether it was delivered
#[async_trait]
pub trait Sink: Send + Sync {
    async fn deliver(&self, payload: &[u8]) -> Result<DeliveryReport, SinkError>;
}

/// Delivers batches by running the external `zabbix_sender` program
#[derive(Debug, Clone)]
pub struct ZabbixSender {
    program: PathBuf,
    server: String,
}

impl ZabbixSender {
    pub fn new(program: impl Into<PathBuf>, server: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            server: server.into(),
        }
    }

    pub fn program(&self) -> &std::path::Path {
        &self.program
    }

    pub fn server(&self) -> &str {
        &self.server
    }
}

#[async_trait]
impl Sink for ZabbixSender {
    async fn deliver(&self, payload: &[u8]) -> Result<DeliveryReport, SinkError> {
        if payload.is_empty() {
            return Err(SinkError::EmptyBatch);
        }

        // Removed when dropped at the end of this call
        let mut input = NamedTempFile::new()?;
        input.write_all(payload)?;
        input.flush()?;

        debug!(
            program = %self.program.display(),
            server = %self.server,
            input = %input.path().display(),
            bytes = payload.len(),
            "Invoking sender"
        );

        let output = Command::new(&self.program)
            .arg("-z")
            .arg(&self.server)
            .arg("-i")
            .arg(input.path())
            .arg("-vv")
            .arg("-T")
            .output()
            .await
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => {
                    SinkError::NotFound(self.program.display().to_string())
                }
                _ => SinkError::Io(e),
            })?;

        let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();

        if output.status.success() {
            debug!(stdout = %stdout, "Sender finished");
            Ok(DeliveryReport { stdout, stderr })
        } else {
            warn!(
                status = %output.status,
                stdout = %stdout,
                stderr = %stderr,
                "Sender reported failure"
            );
            Err(SinkError::Failed {
                status: output.status.to_string(),
                stdout,
                stderr,
            })
        }
    }
}
