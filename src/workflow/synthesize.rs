use std::time::Instant;

use serde::Serialize;
use tracing::{error, info, warn};

use crate::context::AppContext;
use crate::domain::ticket::{TicketTree, TreeStats};
use crate::error::{AppError, AppResult};
use crate::workflow::assemble::{ImageUpload, assemble_requirements};
use crate::workflow::normalize::normalize_response;

const RAW_PREVIEW_CHARS: usize = 500;

#[derive(Debug, Clone)]
pub struct SynthesisRequest {
    pub requirements_text: String,
    pub images: Vec<ImageUpload>,
    pub instruction: Option<String>,
}

#[derive(Debug, Clone)]
pub struct SynthesisOutcome {
    pub tree: TicketTree,
    pub images_processed: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SynthesisStats {
    pub epics: usize,
    pub stories: usize,
    pub subtasks: usize,
    pub images_processed: usize,
}

impl SynthesisOutcome {
    pub fn stats(&self) -> SynthesisStats {
        let TreeStats {
            epics,
            stories,
            subtasks,
        } = self.tree.stats();
        SynthesisStats {
            epics,
            stories,
            subtasks,
            images_processed: self.images_processed,
        }
    }
}

/// Requirements in, validated ticket tree out. Any failure aborts the whole
/// request.
pub async fn synthesize_tickets(
    ctx: &AppContext,
    request: SynthesisRequest,
) -> AppResult<SynthesisOutcome> {
    let instruction = request
        .instruction
        .as_deref()
        .or(ctx.config.system_prompt.as_deref());
    let input = assemble_requirements(
        &request.requirements_text,
        request.images,
        instruction,
        ctx.config.max_image_bytes,
    )?;
    let images_processed = input.image_count();

    info!(
        images = images_processed,
        text_chars = input.text_len(),
        custom_instruction = request.instruction.is_some(),
        "sending requirements to language model"
    );
    let started = Instant::now();
    let raw = ctx.language_model.generate(&input).await?;
    info!(
        elapsed_ms = started.elapsed().as_millis() as u64,
        response_chars = raw.len(),
        "language model responded"
    );

    let tree = normalize_response(&raw).inspect_err(log_unreadable_response)?;
    let outcome = SynthesisOutcome {
        tree,
        images_processed,
    };
    if outcome.tree.is_empty() {
        warn!("language model found no epics in the requirements");
    }
    let stats = outcome.stats();
    info!(
        epics = stats.epics,
        stories = stats.stories,
        subtasks = stats.subtasks,
        "requirements analyzed"
    );
    Ok(outcome)
}

fn log_unreadable_response(err: &AppError) {
    if let Some(raw) = err.raw_response() {
        let head = raw.chars().take(RAW_PREVIEW_CHARS).collect::<String>();
        let total = raw.chars().count();
        let tail = raw
            .chars()
            .skip(total.saturating_sub(RAW_PREVIEW_CHARS))
            .collect::<String>();
        error!(%head, %tail, "model response could not be normalized");
    }
}
