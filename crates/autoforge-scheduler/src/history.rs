//! Append-only run history.
//!
//! One JSON object per line, one line per pipeline run. Lines are never
//! rewritten; a line that does not parse is skipped when loading.

use autoforge_core::run::{PipelineRun, RunOutcome};
use autoforge_core::Result;
use chrono::{DateTime, Utc};
use std::collections::HashSet;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

/// What the journal says about past runs.
#[derive(Debug, Default)]
pub struct HistorySummary {
    /// Names of ideas that must not be built again.
    pub built: HashSet<String>,
    pub last_run: Option<DateTime<Utc>>,
    pub runs: usize,
}

#[derive(Debug, Clone)]
pub struct HistoryJournal {
    path: PathBuf,
}

impl HistoryJournal {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one run record.
    pub async fn append(&self, run: &PipelineRun) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }

        let mut line = serde_json::to_string(run)?;
        line.push('\n');

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;

        debug!(run_id = %run.id, path = %self.path.display(), "Appended run to history");
        Ok(())
    }

    /// Read every well-formed record, oldest first.
    pub async fn runs(&self) -> Result<Vec<PipelineRun>> {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut runs = Vec::new();
        for (index, line) in content.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<PipelineRun>(line) {
                Ok(run) => runs.push(run),
                Err(e) => warn!(
                    path = %self.path.display(),
                    line = index + 1,
                    error = %e,
                    "Skipping malformed history record"
                ),
            }
        }
        Ok(runs)
    }

    pub async fn load(&self) -> Result<HistorySummary> {
        let runs = self.runs().await?;

        let mut summary = HistorySummary {
            runs: runs.len(),
            ..Default::default()
        };
        for run in &runs {
            summary.last_run = summary.last_run.max(Some(run.timestamp));
            // A build whose publish failed may already have created the repository.
            let built = run.outcome == RunOutcome::Success || run.is_unpublished_build();
            if let (true, Some(idea)) = (built, &run.idea) {
                summary.built.insert(idea.name.clone());
            }
        }
        Ok(summary)
    }
}
