//! Idea catalog parsing.
//!
//! ```kdl
//! idea "markdown-link-checker" {
//!     description "Find broken links in Markdown files"
//!     category "documentation"
//!     type "cli_app"
//!     priority "high"
//!     difficulty "easy"
//!     tags "markdown" "docs"
//!     requirements "Scan directories recursively" "Report HTTP status"
//!     stack "python" "aiohttp"
//!     reference "https://example.com/idea"
//! }
//! ```

use autoforge_core::{Difficulty, Idea, Priority, ProjectType};
use kdl::{KdlDocument, KdlNode};
use std::collections::HashSet;
use std::path::Path;

use crate::kdl_util::{all_string_args, first_string_arg};
use crate::{ConfigError, ConfigResult};

/// Parse every `idea` node of a catalog.
pub fn parse_catalog(kdl: &str) -> ConfigResult<Vec<Idea>> {
    let doc: KdlDocument = kdl.parse()?;

    let mut ideas = Vec::new();
    let mut seen = HashSet::new();

    for node in doc.nodes() {
        if node.name().value() != "idea" {
            continue;
        }
        let idea = parse_idea(node)?;
        if !seen.insert(idea.name.clone()) {
            return Err(ConfigError::Duplicate(format!("idea '{}'", idea.name)));
        }
        ideas.push(idea);
    }

    Ok(ideas)
}

/// Read and parse a catalog file.
pub fn load_catalog(path: &Path) -> ConfigResult<Vec<Idea>> {
    let text = std::fs::read_to_string(path)?;
    parse_catalog(&text)
}

fn parse_idea(node: &KdlNode) -> ConfigResult<Idea> {
    let name =
        first_string_arg(node).ok_or_else(|| ConfigError::MissingField("idea name".to_string()))?;

    let invalid = |field: &str, message: String| ConfigError::InvalidValue {
        field: format!("{} of idea '{}'", field, name),
        message,
    };

    let mut description = None;
    let mut category = None;
    let mut project_type = None;
    let mut priority = None;
    let mut difficulty = None;
    let mut tags = Vec::new();
    let mut requirements = Vec::new();
    let mut stack = Vec::new();
    let mut reference = None;

    if let Some(children) = node.children() {
        for child in children.nodes() {
            match child.name().value() {
                "description" => description = first_string_arg(child),
                "category" => category = first_string_arg(child),
                "type" => project_type = first_string_arg(child),
                "priority" => priority = first_string_arg(child),
                "difficulty" => difficulty = first_string_arg(child),
                "tags" => tags.extend(all_string_args(child)),
                "requirements" => requirements.extend(all_string_args(child)),
                "stack" => stack.extend(all_string_args(child)),
                "reference" => reference = first_string_arg(child),
                _ => {}
            }
        }
    }

    let description = description
        .ok_or_else(|| ConfigError::MissingField(format!("description of idea '{}'", name)))?;

    let mut idea = Idea::new(name.clone(), description)
        .map_err(|e| invalid("name", e.to_string()))?
        .with_tags(tags)
        .with_requirements(requirements)
        .with_stack(stack);

    if let Some(category) = category {
        idea = idea.with_category(category);
    }
    if let Some(value) = project_type {
        let kind = value
            .parse::<ProjectType>()
            .map_err(|e| invalid("type", e.to_string()))?;
        idea = idea.with_project_type(kind);
    }
    if let Some(value) = priority {
        let priority = value
            .parse::<Priority>()
            .map_err(|e| invalid("priority", e.to_string()))?;
        idea = idea.with_priority(priority);
    }
    if let Some(value) = difficulty {
        let difficulty = value
            .parse::<Difficulty>()
            .map_err(|e| invalid("difficulty", e.to_string()))?;
        idea = idea.with_difficulty(difficulty);
    }
    if let Some(url) = reference {
        idea = idea.with_reference_url(url);
    }

    Ok(idea)
}
