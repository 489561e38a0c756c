//! Periodic health probe.

use autoforge_core::Result;
use autoforge_core::backend::BuildBackend;
use autoforge_core::collaborator::Publisher;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tracing::{error, info, warn};

/// One health check, as appended to the health log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthReport {
    pub timestamp: DateTime<Utc>,
    pub backend: bool,
    pub publisher: bool,
    pub llm: bool,
}

impl HealthReport {
    pub fn is_healthy(&self) -> bool {
        self.backend && self.publisher && self.llm
    }
}

pub struct HealthProbe {
    backend: Arc<dyn BuildBackend>,
    publisher: Arc<dyn Publisher>,
    llm_configured: bool,
    log_file: PathBuf,
}

impl HealthProbe {
    pub fn new(
        backend: Arc<dyn BuildBackend>,
        publisher: Arc<dyn Publisher>,
        llm_configured: bool,
        log_file: impl Into<PathBuf>,
    ) -> Self {
        Self {
            backend,
            publisher,
            llm_configured,
            log_file: log_file.into(),
        }
    }

    pub async fn check(&self) -> HealthReport {
        let backend = match self.backend.health().await {
            Ok(healthy) => healthy,
            Err(e) => {
                warn!(backend = self.backend.name(), error = %e, "Backend health check failed");
                false
            }
        };

        HealthReport {
            timestamp: Utc::now(),
            backend,
            publisher: self.publisher.is_configured(),
            llm: self.llm_configured,
        }
    }

    /// Check, append the report to the health log and warn when anything is down.
    pub async fn run(&self) -> HealthReport {
        let report = self.check().await;

        if let Err(e) = self.append(&report).await {
            error!(path = %self.log_file.display(), error = %e, "Failed to write health log");
        }

        if report.is_healthy() {
            info!("Health check passed");
        } else {
            warn!(
                backend = report.backend,
                publisher = report.publisher,
                llm = report.llm,
                "Health check found problems"
            );
        }
        report
    }

    async fn append(&self, report: &HealthReport) -> Result<()> {
        if let Some(parent) = self.log_file.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let mut line = serde_json::to_string(report)?;
        line.push('\n');

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.log_file)
            .await?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{CountingPublisher, ScriptedBackend};

    #[tokio::test]
    async fn test_healthy_report_is_logged() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("logs/health_check.log");
        let probe = HealthProbe::new(
            Arc::new(ScriptedBackend::new(vec![])),
            Arc::new(CountingPublisher::succeeding()),
            true,
            &path,
        );

        let first = probe.run().await;
        probe.run().await;
        assert!(first.is_healthy());

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<_> = content.lines().collect();
        assert_eq!(lines.len(), 2);
        let logged: HealthReport = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(logged, first);
    }

    #[tokio::test]
    async fn test_unreachable_backend_is_unhealthy() {
        let dir = tempfile::tempdir().unwrap();
        let probe = HealthProbe::new(
            Arc::new(ScriptedBackend::unreachable()),
            Arc::new(CountingPublisher::succeeding()),
            false,
            dir.path().join("health_check.log"),
        );

        let report = probe.run().await;
        assert!(!report.backend);
        assert!(!report.llm);
        assert!(report.publisher);
        assert!(!report.is_healthy());
    }
}
