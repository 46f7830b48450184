/// Image formats the generative model accepts as inline data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageMime {
    Png,
    Jpeg,
    Webp,
    Heic,
    Heif,
}

impl ImageMime {
    pub fn as_str(&self) -> &'static str {
        match self {
            ImageMime::Png => "image/png",
            ImageMime::Jpeg => "image/jpeg",
            ImageMime::Webp => "image/webp",
            ImageMime::Heic => "image/heic",
            ImageMime::Heif => "image/heif",
        }
    }

    pub fn from_mime(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "image/png" => Some(ImageMime::Png),
            "image/jpeg" | "image/jpg" => Some(ImageMime::Jpeg),
            "image/webp" => Some(ImageMime::Webp),
            "image/heic" => Some(ImageMime::Heic),
            "image/heif" => Some(ImageMime::Heif),
            _ => None,
        }
    }

    pub fn from_extension(extension: &str) -> Option<Self> {
        match extension.trim().to_lowercase().as_str() {
            "png" => Some(ImageMime::Png),
            "jpg" | "jpeg" => Some(ImageMime::Jpeg),
            "webp" => Some(ImageMime::Webp),
            "heic" => Some(ImageMime::Heic),
            "heif" => Some(ImageMime::Heif),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequirementPart {
    Text(String),
    Image { data: Vec<u8>, mime_type: ImageMime },
}

/// Ordered multi-part payload for one synthesis request.
///
/// Only the content assembler builds one, so the instruction is always the
/// first part and images always trail the requirements text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequirementsInput {
    parts: Vec<RequirementPart>,
}

impl RequirementsInput {
    pub(crate) fn from_parts(parts: Vec<RequirementPart>) -> Self {
        Self { parts }
    }

    pub fn parts(&self) -> &[RequirementPart] {
        &self.parts
    }

    pub fn image_count(&self) -> usize {
        self.parts
            .iter()
            .filter(|part| matches!(part, RequirementPart::Image { .. }))
            .count()
    }

    pub fn text_len(&self) -> usize {
        self.parts
            .iter()
            .map(|part| match part {
                RequirementPart::Text(text) => text.len(),
                RequirementPart::Image { .. } => 0,
            })
            .sum()
    }
}
