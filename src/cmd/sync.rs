use std::fs;
use std::path::{Path, PathBuf};

use clap::Args;
use tracing::info;

use crate::cmd::input::RequirementArgs;
use crate::context::AppContext;
use crate::domain::sync::SyncResult;
use crate::domain::ticket::TicketTree;
use crate::error::{AppError, AppResult};
use crate::workflow::normalize::normalize_response;
use crate::workflow::sync::sync_ticket_tree;
use crate::workflow::synthesize::synthesize_tickets;

#[derive(Args, Debug, Clone)]
pub struct SyncArgs {
    /// Ticket tree written by `genie generate --output`.
    #[arg(short, long)]
    pub tree: PathBuf,
    /// Jira project key; defaults to the configured project.
    #[arg(short, long)]
    pub project: Option<String>,
}

#[derive(Args, Debug, Clone)]
pub struct CreateArgs {
    #[command(flatten)]
    pub input: RequirementArgs,
    /// Jira project key; defaults to the configured project.
    #[arg(short, long)]
    pub project: Option<String>,
}

pub async fn run_sync(ctx: &AppContext, args: SyncArgs) -> AppResult<SyncResult> {
    let tree = read_tree_file(&args.tree)?;
    sync_ticket_tree(ctx, &tree, args.project).await
}

pub async fn run_create(ctx: &AppContext, args: CreateArgs) -> AppResult<SyncResult> {
    let request = args.input.into_request()?;
    let outcome = synthesize_tickets(ctx, request).await?;
    info!("creating synthesized tickets in Jira");
    sync_ticket_tree(ctx, &outcome.tree, args.project).await
}

pub fn print_report(result: &SyncResult) -> AppResult<()> {
    println!("{}", serde_json::to_string_pretty(&result.report())?);
    Ok(())
}

/// Saved trees go through the same validation as model output; a `generate`
/// report with an `aiOutput` section is accepted too.
fn read_tree_file(path: &Path) -> AppResult<TicketTree> {
    let contents = fs::read_to_string(path)?;
    let contents = match serde_json::from_str::<serde_json::Value>(&contents) {
        Ok(serde_json::Value::Object(mut object)) if object.contains_key("aiOutput") => object
            .remove("aiOutput")
            .map(|tree| tree.to_string())
            .unwrap_or(contents),
        _ => contents,
    };
    normalize_response(&contents).map_err(|err| match err {
        AppError::Normalization { reason, .. } => {
            AppError::InvalidInput(format!("{}: {reason}", path.display()))
        }
        other => other,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_plain_tree_and_generate_report() {
        let dir = tempfile::tempdir().expect("tempdir");
        let plain = dir.path().join("tree.json");
        let report = dir.path().join("report.json");
        fs::write(&plain, r#"{"epics":[{"summary":"Auth","stories":[]}]}"#).expect("write");
        fs::write(
            &report,
            r#"{"message":"ok","stats":{},"aiOutput":{"epics":[{"summary":"Auth"},{"summary":"Auth"}]}}"#,
        )
        .expect("write");

        assert_eq!(read_tree_file(&plain).expect("tree").stats().epics, 1);
        let tree = read_tree_file(&report).expect("tree");
        assert_eq!(tree.epics()[1].title, "Auth (2)");
    }

    #[test]
    fn malformed_tree_file_is_invalid_input() {
        let dir = tempfile::tempdir().expect("tempdir");
        let broken = dir.path().join("tree.json");
        fs::write(&broken, r#"{"epics": [{"summary": "Auth""#).expect("write");

        let err = read_tree_file(&broken).expect_err("broken");
        assert!(matches!(err, AppError::InvalidInput(message) if message.contains("tree.json")));
    }
}
