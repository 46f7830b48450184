use std::fs;
use std::path::{Path, PathBuf};

use clap::Args;
use tracing::info;

use crate::domain::requirements::ImageMime;
use crate::error::{AppError, AppResult};
use crate::workflow::assemble::ImageUpload;
use crate::workflow::synthesize::SynthesisRequest;

const TEXT_EXTENSIONS: &[&str] = &["txt", "md"];

const IMAGE_ONLY_REQUIREMENTS: &str = "The upload contains only architecture diagrams or images. \
Analyze these diagrams carefully and extract ALL possible EPICS, STORIES, and SUBTASKS that could be \
inferred from the system, workflows, modules, integrations, or features depicted. If there are \
swimlanes, modules, or components, treat them as potential epics or stories. For each, provide a \
summary, description, and any subtasks that can be logically deduced. If you cannot extract \
anything, return an empty epics array.";

#[derive(Args, Debug, Clone)]
pub struct RequirementArgs {
    /// Requirement files: .txt/.md text, png/jpeg/webp/heic/heif images.
    #[arg(required = true)]
    pub files: Vec<PathBuf>,
    /// Instruction to send instead of the default prompt.
    #[arg(long, conflicts_with = "prompt_file")]
    pub prompt: Option<String>,
    /// Read the instruction from a file.
    #[arg(long)]
    pub prompt_file: Option<PathBuf>,
}

impl RequirementArgs {
    pub fn into_request(self) -> AppResult<SynthesisRequest> {
        let instruction = match (self.prompt, self.prompt_file) {
            (Some(prompt), _) => Some(prompt),
            (None, Some(path)) => Some(fs::read_to_string(&path)?),
            (None, None) => None,
        };
        let files = load_requirement_files(&self.files)?;
        Ok(SynthesisRequest {
            requirements_text: files.text,
            images: files.images,
            instruction,
        })
    }
}

#[derive(Debug)]
pub struct RequirementFiles {
    pub text: String,
    pub images: Vec<ImageUpload>,
}

/// Splits uploads into requirements text and images, in argument order.
pub fn load_requirement_files(paths: &[PathBuf]) -> AppResult<RequirementFiles> {
    let mut text = String::new();
    let mut images = Vec::new();

    for path in paths {
        let extension = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(str::to_lowercase)
            .unwrap_or_default();

        if TEXT_EXTENSIONS.contains(&extension.as_str()) {
            let bytes = fs::read(path)?;
            let contents = String::from_utf8(bytes).map_err(|_| {
                AppError::InvalidInput(format!("{} is not valid UTF-8 text", path.display()))
            })?;
            info!(file = %path.display(), "read requirements text");
            text.push_str(&contents);
            text.push_str("\n\n");
        } else {
            let data = fs::read(path)?;
            info!(file = %path.display(), bytes = data.len(), "read image");
            images.push(ImageUpload {
                name: display_name(path),
                data,
                mime_type: ImageMime::from_extension(&extension).map(|mime| mime.as_str().to_string()),
            });
        }
    }

    if text.trim().is_empty() {
        if images.is_empty() {
            return Err(AppError::InvalidInput(
                "no requirements found; provide at least one text file or image".to_string(),
            ));
        }
        text = IMAGE_ONLY_REQUIREMENTS.to_string();
    }

    Ok(RequirementFiles { text, images })
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}
