use clap::Args;

use crate::context::AppContext;
use crate::error::AppResult;
use crate::workflow::probe::probe_capabilities;
use crate::workflow::sync::resolve_project;

#[derive(Args, Debug, Clone)]
pub struct ProbeArgs {
    /// Jira project key; defaults to the configured project.
    #[arg(short, long)]
    pub project: Option<String>,
}

pub async fn run(ctx: &AppContext, args: ProbeArgs) -> AppResult<()> {
    let project = resolve_project(ctx, args.project)?;
    let capabilities = probe_capabilities(
        ctx.issue_tracker.as_ref(),
        &ctx.capabilities,
        &project,
        &ctx.config.issue_types,
    )
    .await;

    println!("Project: {project}");
    println!("{}", serde_json::to_string_pretty(&capabilities)?);
    Ok(())
}
