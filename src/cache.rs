use std::collections::HashMap;

use tokio::sync::RwLock;

use crate::domain::capabilities::TrackerCapabilities;

/// Per-project capability cache for the lifetime of the process.
///
/// Keyed by upper-cased project key. Two probes of the same uncached project
/// may race; the last write wins.
#[derive(Debug, Default)]
pub struct CapabilityCache {
    entries: RwLock<HashMap<String, TrackerCapabilities>>,
}

impl CapabilityCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, project: &str) -> Option<TrackerCapabilities> {
        self.entries.read().await.get(&Self::key(project)).cloned()
    }

    pub async fn insert(&self, project: &str, capabilities: TrackerCapabilities) {
        self.entries
            .write()
            .await
            .insert(Self::key(project), capabilities);
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    fn key(project: &str) -> String {
        project.trim().to_uppercase()
    }
}
