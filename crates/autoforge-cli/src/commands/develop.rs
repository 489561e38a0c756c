//! Build a single idea on demand.

use anyhow::{Result, bail};
use autoforge_config::SystemConfig;
use autoforge_core::idea::slugify;
use autoforge_core::run::RunOutcome;
use autoforge_core::{Idea, ProjectType};
use autoforge_scheduler::runner::MANUAL_TRIGGER;

use super::{Services, interrupt_token, print_run};

const DEFAULT_REQUIREMENTS: [&str; 3] = ["Clean code", "Documentation", "Error handling"];
const DEFAULT_STACK: [&str; 3] = ["Python", "Click", "Rich"];

pub async fn run(
    config: SystemConfig,
    name: &str,
    description: &str,
    project_type: &str,
) -> Result<()> {
    config.require_credentials()?;

    let project_type: ProjectType = project_type.parse()?;
    let idea = Idea::new(slugify(name), description)?
        .with_project_type(project_type)
        .with_requirements(DEFAULT_REQUIREMENTS)
        .with_stack(DEFAULT_STACK);

    println!("Developing {} ({})", idea.name, idea.project_type);

    let services = Services::build(&config)?;
    let cancel = interrupt_token();
    let run = services
        .coordinator
        .run_idea(idea, MANUAL_TRIGGER, &cancel)
        .await;

    print_run(&run);
    if run.outcome == RunOutcome::Failed {
        let reason = run.reason.as_deref().unwrap_or("unknown error");
        bail!("Development failed: {}", reason);
    }
    Ok(())
}
