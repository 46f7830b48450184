use async_trait::async_trait;

use crate::domain::issue::{FieldMeta, IssueDraft};
use crate::domain::ticket::IssueRef;
use crate::error::AppResult;

#[async_trait]
pub trait IssueTrackerService: Send + Sync {
    /// Creation metadata for one issue type of a project: which fields exist
    /// and which of them are mandatory.
    async fn creation_fields(&self, project: &str, issue_type: &str) -> AppResult<Vec<FieldMeta>>;

    /// Every custom field defined on the tracker instance.
    async fn custom_fields(&self) -> AppResult<Vec<FieldMeta>>;

    async fn create_issue(&self, draft: &IssueDraft) -> AppResult<IssueRef>;
}
