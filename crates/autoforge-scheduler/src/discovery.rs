//! Catalog-based idea discovery.

use async_trait::async_trait;
use autoforge_config::catalog::parse_catalog;
use autoforge_core::collaborator::Discoverer;
use autoforge_core::{Error, Idea, Result};
use std::collections::HashSet;
use tracing::debug;

use crate::history::HistoryJournal;

const BUILTIN_CATALOG: &str = include_str!("builtin_ideas.kdl");

/// Picks ideas from a fixed catalog, highest priority first.
///
/// Ideas already built according to the history journal are never offered
/// again. The journal is re-read on every call, so a daemon sees its own
/// earlier runs.
pub struct CatalogDiscoverer {
    ideas: Vec<Idea>,
    journal: Option<HistoryJournal>,
}

impl CatalogDiscoverer {
    pub fn new(ideas: Vec<Idea>) -> Self {
        Self {
            ideas,
            journal: None,
        }
    }

    /// Discoverer over the built-in idea pool.
    pub fn builtin() -> Result<Self> {
        let ideas = parse_catalog(BUILTIN_CATALOG)
            .map_err(|e| Error::Discovery(format!("built-in catalog: {}", e)))?;
        Ok(Self::new(ideas))
    }

    /// Put `ideas` in front of the current pool. They win over existing
    /// ideas with the same name.
    pub fn with_catalog(mut self, ideas: Vec<Idea>) -> Self {
        let mut merged = ideas;
        merged.append(&mut self.ideas);
        self.ideas = merged;
        self
    }

    pub fn with_history(mut self, journal: HistoryJournal) -> Self {
        self.journal = Some(journal);
        self
    }

    async fn built_names(&self) -> Result<HashSet<String>> {
        match &self.journal {
            Some(journal) => Ok(journal
                .load()
                .await
                .map_err(|e| Error::Discovery(format!("reading history: {}", e)))?
                .built),
            None => Ok(HashSet::new()),
        }
    }
}

#[async_trait]
impl Discoverer for CatalogDiscoverer {
    async fn discover(&self, limit: usize) -> Result<Vec<Idea>> {
        let built = self.built_names().await?;

        let mut seen = HashSet::new();
        let mut candidates: Vec<&Idea> = self
            .ideas
            .iter()
            .filter(|idea| seen.insert(idea.name.as_str()))
            .filter(|idea| !built.contains(&idea.name))
            .collect();
        // Stable, so catalog order breaks ties.
        candidates.sort_by(|a, b| b.priority.cmp(&a.priority));

        debug!(
            pool = self.ideas.len(),
            built = built.len(),
            candidates = candidates.len(),
            "Discovered ideas"
        );

        Ok(candidates.into_iter().take(limit).cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use autoforge_core::run::PendingRun;
    use autoforge_core::{Priority, ProjectType};

    #[tokio::test]
    async fn test_builtin_pool_prefers_high_priority() {
        let discoverer = CatalogDiscoverer::builtin().unwrap();
        let ideas = discoverer.discover(7).await.unwrap();

        let names: Vec<_> = ideas.iter().map(|i| i.name.as_str()).collect();
        assert_eq!(
            names,
            vec![
                "secrets-leak-scanner",
                "sbom-generator",
                "container-vulnerability-scanner",
                "api-security-tester",
                "log-anomaly-detector",
                "code-complexity-analyzer",
                "git-commit-analyzer",
            ]
        );
        assert_eq!(ideas[0].project_type, ProjectType::SecurityTool);
        assert_eq!(ideas[0].requirements.len(), 4);
        assert_eq!(ideas[5].priority, Priority::Medium);
    }

    #[tokio::test]
    async fn test_builtin_pool_size() {
        let discoverer = CatalogDiscoverer::builtin().unwrap();
        assert_eq!(discoverer.discover(100).await.unwrap().len(), 15);
        assert!(discoverer.discover(0).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_catalog_overrides_builtin() {
        let custom = Idea::new("sbom-generator", "Custom SBOM tool")
            .unwrap()
            .with_priority(Priority::High);
        let low = Idea::new("todo-tracker", "Track TODOs")
            .unwrap()
            .with_priority(Priority::Low);

        let discoverer = CatalogDiscoverer::builtin()
            .unwrap()
            .with_catalog(vec![low, custom]);
        let ideas = discoverer.discover(100).await.unwrap();

        assert_eq!(ideas.len(), 16);
        // catalog ideas come first among equal priorities
        assert_eq!(ideas[0].name, "sbom-generator");
        assert_eq!(ideas[0].description, "Custom SBOM tool");
        assert_eq!(ideas.last().unwrap().name, "todo-tracker");
    }

    #[tokio::test]
    async fn test_built_ideas_are_excluded() {
        let dir = tempfile::tempdir().unwrap();
        let journal = HistoryJournal::new(dir.path().join("project_history.jsonl"));

        let mut pending = PendingRun::start("daily_development");
        pending.set_idea(Idea::new("secrets-leak-scanner", "x").unwrap());
        journal.append(&pending.succeed()).await.unwrap();

        let discoverer = CatalogDiscoverer::builtin().unwrap().with_history(journal);
        let ideas = discoverer.discover(1).await.unwrap();
        assert_eq!(ideas[0].name, "sbom-generator");
    }
}
