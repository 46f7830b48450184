use std::fs;
use std::path::PathBuf;

use clap::Args;
use serde_json::json;

use crate::cmd::input::RequirementArgs;
use crate::context::AppContext;
use crate::error::AppResult;
use crate::workflow::synthesize::synthesize_tickets;

#[derive(Args, Debug, Clone)]
pub struct GenerateArgs {
    #[command(flatten)]
    pub input: RequirementArgs,
    /// Write the ticket tree here (readable by `genie sync --tree`).
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

pub async fn run(ctx: &AppContext, args: GenerateArgs) -> AppResult<()> {
    let request = args.input.into_request()?;
    let outcome = synthesize_tickets(ctx, request).await?;
    let stats = outcome.stats();

    match args.output {
        Some(path) => {
            fs::write(&path, serde_json::to_string_pretty(&outcome.tree.to_json())?)?;
            println!(
                "Analyzed requirements: {} epics, {} stories, {} subtasks ({} images). Tree written to {}",
                stats.epics,
                stats.stories,
                stats.subtasks,
                stats.images_processed,
                path.display()
            );
        }
        None => {
            let report = json!({
                "message": "Requirements analyzed successfully!",
                "stats": stats,
                "aiOutput": outcome.tree.to_json(),
            });
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
    }
    Ok(())
}
