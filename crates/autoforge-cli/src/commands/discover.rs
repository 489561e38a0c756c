//! Idea discovery command.

use anyhow::{Context, Result};
use autoforge_config::SystemConfig;
use autoforge_core::collaborator::Discoverer;

pub async fn run(config: &SystemConfig, limit: usize) -> Result<()> {
    let ideas = super::discoverer(config)?
        .discover(limit)
        .await
        .context("Discovery failed")?;

    if ideas.is_empty() {
        println!("No ideas left to build.");
        return Ok(());
    }

    for (i, idea) in ideas.iter().enumerate() {
        println!("{}. {} [{}]", i + 1, idea.name, idea.priority);
        println!("   Type:        {}", idea.project_type);
        println!("   Difficulty:  {}", idea.difficulty);
        println!("   Description: {}", idea.description);
        if !idea.technical_stack.is_empty() {
            println!("   Stack:       {}", idea.technical_stack.join(", "));
        }
    }
    Ok(())
}
