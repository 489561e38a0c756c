//! Task prompt templates.
//!
//! Supported variables:
//! - `${idea.name}`, `${idea.description}`, `${idea.category}`
//! - `${idea.requirements}` - one `- item` per line
//! - `${idea.stack}`, `${idea.tags}` - comma separated
//! - `${idea.difficulty}`, `${idea.type}`
//! - `${date}` - ISO date (YYYY-MM-DD)
//!
//! Unknown variables are left in place.

use autoforge_core::Idea;
use chrono::NaiveDate;
use regex::Regex;
use std::sync::LazyLock;

/// Template used when no other is configured.
pub const DEFAULT_TASK_TEMPLATE: &str = "\
Build a project named '${idea.name}'.

${idea.description}

Project type: ${idea.type}
Category: ${idea.category}
Difficulty: ${idea.difficulty}
Technical stack: ${idea.stack}
Tags: ${idea.tags}

Requirements:
${idea.requirements}

Include a README with installation and usage instructions, and tests for the core functionality.
Generated on ${date}.";

// Matches ${name} and ${namespace.name}
static VAR_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\$\{([a-zA-Z_][a-zA-Z0-9_]*(?:\.[a-zA-Z_][a-zA-Z0-9_]*)?)\}").unwrap()
});

/// Values available to a task prompt template.
#[derive(Debug, Clone)]
pub struct PromptContext<'a> {
    idea: &'a Idea,
    date: NaiveDate,
}

impl<'a> PromptContext<'a> {
    pub fn new(idea: &'a Idea, date: NaiveDate) -> Self {
        Self { idea, date }
    }

    /// Context dated today (UTC).
    pub fn today(idea: &'a Idea) -> Self {
        Self::new(idea, chrono::Utc::now().date_naive())
    }

    pub fn resolve(&self, var_name: &str) -> Option<String> {
        let idea = self.idea;
        let parts: Vec<&str> = var_name.split('.').collect();

        match parts.as_slice() {
            ["idea", "name"] => Some(idea.name.clone()),
            ["idea", "description"] => Some(idea.description.clone()),
            ["idea", "category"] => Some(idea.category.clone()),
            ["idea", "requirements"] => Some(
                idea.requirements
                    .iter()
                    .map(|r| format!("- {}", r))
                    .collect::<Vec<_>>()
                    .join("\n"),
            ),
            ["idea", "stack"] => Some(idea.technical_stack.join(", ")),
            ["idea", "tags"] => Some(idea.tags.iter().cloned().collect::<Vec<_>>().join(", ")),
            ["idea", "difficulty"] => Some(idea.difficulty.to_string()),
            ["idea", "type"] => Some(idea.project_type.to_string()),
            ["date"] => Some(self.date.format("%Y-%m-%d").to_string()),
            _ => None,
        }
    }

    /// Interpolate all variables in a template.
    pub fn interpolate(&self, template: &str) -> String {
        VAR_REGEX
            .replace_all(template, |caps: &regex::Captures| {
                let var_name = &caps[1];
                self.resolve(var_name)
                    .unwrap_or_else(|| format!("${{{}}}", var_name))
            })
            .to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use autoforge_core::{Difficulty, ProjectType};

    fn idea() -> Idea {
        Idea::new("secrets-leak-scanner", "Detect leaked credentials in git history")
            .unwrap()
            .with_category("security")
            .with_project_type(ProjectType::SecurityTool)
            .with_difficulty(Difficulty::Hard)
            .with_tags(["security", "git"])
            .with_requirements(["Scan commits", "Report findings as JSON"])
            .with_stack(["python", "gitpython"])
    }

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, 2).unwrap()
    }

    #[test]
    fn test_basic_interpolation() {
        let idea = idea();
        let ctx = PromptContext::new(&idea, date());
        assert_eq!(
            ctx.interpolate("${idea.name} (${idea.type}, ${idea.difficulty}) on ${date}"),
            "secrets-leak-scanner (security_tool, hard) on 2026-03-02"
        );
    }

    #[test]
    fn test_list_variables() {
        let idea = idea();
        let ctx = PromptContext::new(&idea, date());
        assert_eq!(ctx.interpolate("${idea.stack}"), "python, gitpython");
        // tags are a set, rendered sorted
        assert_eq!(ctx.interpolate("${idea.tags}"), "git, security");
        assert_eq!(
            ctx.interpolate("${idea.requirements}"),
            "- Scan commits\n- Report findings as JSON"
        );
    }

    #[test]
    fn test_unknown_variables_untouched() {
        let idea = idea();
        let ctx = PromptContext::new(&idea, date());
        assert_eq!(
            ctx.interpolate("${idea.owner} ${env.HOME} ${idea.name}"),
            "${idea.owner} ${env.HOME} secrets-leak-scanner"
        );
    }

    #[test]
    fn test_default_template_resolves_everything() {
        let idea = idea();
        let prompt = PromptContext::new(&idea, date()).interpolate(DEFAULT_TASK_TEMPLATE);
        assert!(!prompt.contains("${"));
        assert!(prompt.contains("Detect leaked credentials in git history"));
        assert!(prompt.contains("- Report findings as JSON"));
    }
}
