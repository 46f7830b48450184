use serde::Serialize;

use crate::domain::ticket::{IssueRef, TicketLevel};

/// Position of a node in its tree: sibling indices from the root Epic down.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NodeRef {
    pub path: Vec<usize>,
    pub level: TicketLevel,
    pub title: String,
}

impl NodeRef {
    pub fn epic(index: usize, title: &str) -> Self {
        Self {
            path: vec![index],
            level: TicketLevel::Epic,
            title: title.to_string(),
        }
    }

    /// Reference to the `index`-th child of this node.
    pub fn child(&self, index: usize, title: &str) -> Self {
        let mut path = self.path.clone();
        path.push(index);
        let level = TicketLevel::from_depth(path.len() - 1).unwrap_or(TicketLevel::Subtask);
        Self {
            path,
            level,
            title: title.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CreatedIssue {
    pub node: NodeRef,
    pub key: String,
    pub url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncFailure {
    pub node: NodeRef,
    pub reason: String,
    /// True when no creation was attempted because an ancestor failed.
    pub skipped: bool,
}

/// Outcome of one synchronization run: everything created and everything not.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncResult {
    created_epics: Vec<CreatedIssue>,
    created_stories: Vec<CreatedIssue>,
    created_subtasks: Vec<CreatedIssue>,
    errors: Vec<SyncFailure>,
}

impl SyncResult {
    pub(crate) fn record_created(&mut self, node: NodeRef, issue: IssueRef) {
        let created = CreatedIssue {
            key: issue.key,
            url: issue.url,
            node,
        };
        match created.node.level {
            TicketLevel::Epic => self.created_epics.push(created),
            TicketLevel::Story => self.created_stories.push(created),
            TicketLevel::Subtask => self.created_subtasks.push(created),
        }
    }

    pub(crate) fn record_failure(&mut self, node: NodeRef, reason: String) {
        self.errors.push(SyncFailure {
            node,
            reason,
            skipped: false,
        });
    }

    pub(crate) fn record_skipped(&mut self, node: NodeRef, reason: String) {
        self.errors.push(SyncFailure {
            node,
            reason,
            skipped: true,
        });
    }

    pub fn created_epics(&self) -> &[CreatedIssue] {
        &self.created_epics
    }

    pub fn created_stories(&self) -> &[CreatedIssue] {
        &self.created_stories
    }

    pub fn created_subtasks(&self) -> &[CreatedIssue] {
        &self.created_subtasks
    }

    pub fn errors(&self) -> &[SyncFailure] {
        &self.errors
    }

    pub fn created_count(&self) -> usize {
        self.created_epics.len() + self.created_stories.len() + self.created_subtasks.len()
    }

    /// A run succeeds when at least one issue reached the tracker.
    pub fn success(&self) -> bool {
        self.created_count() > 0
    }

    pub fn report(&self) -> SyncReport<'_> {
        let message = if self.errors.is_empty() {
            format!(
                "Created {} epics, {} stories and {} subtasks.",
                self.created_epics.len(),
                self.created_stories.len(),
                self.created_subtasks.len()
            )
        } else {
            format!(
                "Created {} epics, {} stories and {} subtasks; {} issues were not created.",
                self.created_epics.len(),
                self.created_stories.len(),
                self.created_subtasks.len(),
                self.errors.len()
            )
        };
        SyncReport {
            success: self.success(),
            message,
            created_issues: CreatedIssues {
                epics: &self.created_epics,
                stories: &self.created_stories,
                subtasks: &self.created_subtasks,
            },
            errors: &self.errors,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncReport<'a> {
    pub success: bool,
    pub message: String,
    pub created_issues: CreatedIssues<'a>,
    pub errors: &'a [SyncFailure],
}

#[derive(Debug, Serialize)]
pub struct CreatedIssues<'a> {
    pub epics: &'a [CreatedIssue],
    pub stories: &'a [CreatedIssue],
    pub subtasks: &'a [CreatedIssue],
}
