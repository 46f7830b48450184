use async_trait::async_trait;

use crate::domain::requirements::RequirementsInput;
use crate::error::AppResult;

#[async_trait]
pub trait LanguageModelService: Send + Sync {
    /// One content-generation call. The returned text is untrusted and may
    /// not be JSON at all.
    async fn generate(&self, input: &RequirementsInput) -> AppResult<String>;
}
