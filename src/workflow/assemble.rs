use tracing::debug;

use crate::domain::requirements::{ImageMime, RequirementPart, RequirementsInput};
use crate::error::{AppError, AppResult};

pub const DEFAULT_INSTRUCTION: &str = r#"Analyze the requirements document and extract ALL EPICS, STORIES, and SUBTASKS into JSON format.

IMPORTANT INSTRUCTIONS:
1. Extract ALL epics from the requirements (both functional and non-functional).
2. For each epic, extract ALL stories listed under it.
3. For each story, extract ALL subtasks listed under it.
4. Preserve the priority levels mentioned in stories.
5. Keep the exact structure and hierarchy from the requirements.
6. Give every sibling a distinct summary.

Output Format:
{
  "epics": [
    {
      "summary": "Epic title",
      "description": "Epic description",
      "stories": [
        {
          "summary": "Story title",
          "description": "Story description",
          "priority": "High, Medium or Low if mentioned",
          "subtasks": [
            { "summary": "Subtask title", "description": "Optional detail" }
          ]
        }
      ]
    }
  ]
}

Extract EVERY epic from the requirements. Do not limit the number of epics.
If nothing can be extracted, return {"epics": []}.

Return ONLY valid JSON. No additional text or explanations."#;

/// Image as received from the caller, before validation.
#[derive(Debug, Clone)]
pub struct ImageUpload {
    pub name: String,
    pub data: Vec<u8>,
    pub mime_type: Option<String>,
}

/// Builds the ordered model payload: instruction, requirements text, then
/// images in upload order.
pub fn assemble_requirements(
    requirements_text: &str,
    images: Vec<ImageUpload>,
    instruction: Option<&str>,
    max_image_bytes: usize,
) -> AppResult<RequirementsInput> {
    let requirements = requirements_text.trim();
    if requirements.is_empty() {
        return Err(AppError::InvalidInput(
            "requirements text must not be empty".to_string(),
        ));
    }

    let mut validated = Vec::with_capacity(images.len());
    for image in images {
        if image.data.is_empty() {
            return Err(AppError::InvalidInput(format!(
                "image '{}' is empty",
                image.name
            )));
        }
        if image.data.len() > max_image_bytes {
            return Err(AppError::InvalidInput(format!(
                "image '{}' is {} bytes, above the {} byte limit",
                image.name,
                image.data.len(),
                max_image_bytes
            )));
        }
        let mime_type = image
            .mime_type
            .as_deref()
            .and_then(ImageMime::from_mime)
            .ok_or_else(|| {
                AppError::InvalidInput(format!(
                    "image '{}' has unsupported type {}",
                    image.name,
                    image.mime_type.as_deref().unwrap_or("<unknown>")
                ))
            })?;
        validated.push(RequirementPart::Image {
            data: image.data,
            mime_type,
        });
    }

    let instruction = instruction
        .filter(|custom| !custom.trim().is_empty())
        .unwrap_or(DEFAULT_INSTRUCTION);

    let mut body = format!("**Requirements:**\n{requirements}");
    if !validated.is_empty() {
        body.push_str("\n\n**Architecture Diagrams:** attached below.");
    }

    let mut parts = Vec::with_capacity(validated.len() + 2);
    parts.push(RequirementPart::Text(instruction.to_string()));
    parts.push(RequirementPart::Text(body));
    parts.extend(validated);

    debug!(
        parts = parts.len(),
        images = parts.len() - 2,
        "assembled requirements payload"
    );
    Ok(RequirementsInput::from_parts(parts))
}
