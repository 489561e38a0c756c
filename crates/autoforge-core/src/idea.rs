//! Project ideas.

use chrono::{DateTime, Utc};
use derive_more::Display;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::str::FromStr;

use crate::{Error, Result};

const MAX_SLUG_LEN: usize = 40;

/// Priority of an idea. Orders `Low < Medium < High`.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Display,
)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    #[display("LOW")]
    Low,
    #[default]
    #[display("MEDIUM")]
    Medium,
    #[display("HIGH")]
    High,
}

impl FromStr for Priority {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "low" => Ok(Priority::Low),
            "medium" => Ok(Priority::Medium),
            "high" => Ok(Priority::High),
            other => Err(Error::InvalidInput(format!("unknown priority: {}", other))),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    #[display("easy")]
    Easy,
    #[default]
    #[display("medium")]
    Medium,
    #[display("hard")]
    Hard,
}

impl FromStr for Difficulty {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "easy" => Ok(Difficulty::Easy),
            "medium" => Ok(Difficulty::Medium),
            "hard" => Ok(Difficulty::Hard),
            other => Err(Error::InvalidInput(format!("unknown difficulty: {}", other))),
        }
    }
}

/// Kind of project an idea describes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
pub enum ProjectType {
    #[display("security_tool")]
    SecurityTool,
    #[display("development_tool")]
    DevelopmentTool,
    #[display("data_analysis")]
    DataAnalysis,
    #[display("automation")]
    Automation,
    #[default]
    #[display("cli_app")]
    CliApp,
    #[display("web_app")]
    WebApp,
    #[display("api_service")]
    ApiService,
    #[display("library")]
    Library,
}

impl FromStr for ProjectType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let kind = match s.to_ascii_lowercase().replace('-', "_").as_str() {
            "security_tool" => ProjectType::SecurityTool,
            "development_tool" => ProjectType::DevelopmentTool,
            "data_analysis" => ProjectType::DataAnalysis,
            "automation" => ProjectType::Automation,
            "cli_app" => ProjectType::CliApp,
            "web_app" => ProjectType::WebApp,
            "api_service" => ProjectType::ApiService,
            "library" => ProjectType::Library,
            other => {
                return Err(Error::InvalidInput(format!("unknown project type: {}", other)));
            }
        };
        Ok(kind)
    }
}

/// A candidate project to be built.
///
/// Ideas are produced by a discoverer and treated as immutable afterwards;
/// components share them by reference or clone.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Idea {
    /// Unique, URL-safe slug. Also used as the repository name.
    pub name: String,
    pub description: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub tags: BTreeSet<String>,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default)]
    pub requirements: Vec<String>,
    #[serde(default)]
    pub technical_stack: Vec<String>,
    #[serde(default)]
    pub difficulty: Difficulty,
    #[serde(default)]
    pub project_type: ProjectType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference_url: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Idea {
    /// Create an idea with default classification. The name must already be a valid slug.
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Result<Self> {
        let name = name.into();
        if !is_valid_slug(&name) {
            return Err(Error::InvalidInput(format!(
                "idea name '{}' is not a URL-safe slug",
                name
            )));
        }

        Ok(Self {
            name,
            description: description.into(),
            category: String::new(),
            tags: BTreeSet::new(),
            priority: Priority::default(),
            requirements: Vec::new(),
            technical_stack: Vec::new(),
            difficulty: Difficulty::default(),
            project_type: ProjectType::default(),
            reference_url: None,
            created_at: Utc::now(),
        })
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = category.into();
        self
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_requirements<I, S>(mut self, requirements: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.requirements = requirements.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_stack<I, S>(mut self, stack: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.technical_stack = stack.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_difficulty(mut self, difficulty: Difficulty) -> Self {
        self.difficulty = difficulty;
        self
    }

    pub fn with_project_type(mut self, project_type: ProjectType) -> Self {
        self.project_type = project_type;
        self
    }

    pub fn with_reference_url(mut self, url: impl Into<String>) -> Self {
        self.reference_url = Some(url.into());
        self
    }
}

/// Check that a name only contains lowercase ASCII letters, digits and single dashes.
pub fn is_valid_slug(name: &str) -> bool {
    !name.is_empty()
        && name.len() <= MAX_SLUG_LEN
        && !name.starts_with('-')
        && !name.ends_with('-')
        && !name.contains("--")
        && name
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
}

/// Turn arbitrary text into a valid idea name.
pub fn slugify(text: &str) -> String {
    let mut slug = String::with_capacity(text.len());
    for c in text.chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
        } else if !slug.ends_with('-') {
            slug.push('-');
        }
    }

    let mut slug: String = slug.trim_matches('-').chars().take(MAX_SLUG_LEN).collect();
    while slug.ends_with('-') {
        slug.pop();
    }

    if slug.is_empty() {
        "project".to_string()
    } else {
        slug
    }
}
