use std::sync::Arc;

use crate::cache::CapabilityCache;
use crate::config::AppConfig;
use crate::services::{IssueTrackerService, LanguageModelService};

#[derive(Clone)]
pub struct AppContext {
    pub config: AppConfig,
    pub issue_tracker: Arc<dyn IssueTrackerService>,
    pub language_model: Arc<dyn LanguageModelService>,
    pub capabilities: Arc<CapabilityCache>,
}

impl AppContext {
    pub fn new(
        config: AppConfig,
        issue_tracker: Arc<dyn IssueTrackerService>,
        language_model: Arc<dyn LanguageModelService>,
        capabilities: Arc<CapabilityCache>,
    ) -> Self {
        Self {
            config,
            issue_tracker,
            language_model,
            capabilities,
        }
    }
}
