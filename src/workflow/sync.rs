use serde_json::Value;
use tracing::{error, info, warn};

use crate::config::IssueTypeNames;
use crate::context::AppContext;
use crate::domain::capabilities::TrackerCapabilities;
use crate::domain::issue::IssueDraft;
use crate::domain::sync::{NodeRef, SyncResult};
use crate::domain::ticket::{TicketNode, TicketTree};
use crate::error::{AppError, AppResult};
use crate::services::IssueTrackerService;
use crate::workflow::probe::probe_capabilities;

#[derive(Debug, Clone)]
pub struct SyncTarget {
    pub project_key: String,
    pub issue_types: IssueTypeNames,
}

/// Resolves the target project, probes it, and pushes the tree.
pub async fn sync_ticket_tree(
    ctx: &AppContext,
    tree: &TicketTree,
    project_override: Option<String>,
) -> AppResult<SyncResult> {
    let target = SyncTarget {
        project_key: resolve_project(ctx, project_override)?,
        issue_types: ctx.config.issue_types.clone(),
    };

    let capabilities = probe_capabilities(
        ctx.issue_tracker.as_ref(),
        &ctx.capabilities,
        &target.project_key,
        &target.issue_types,
    )
    .await;

    Ok(synchronize_tree(ctx.issue_tracker.as_ref(), tree, &capabilities, &target).await)
}

/// Explicit project wins over the configured default.
pub fn resolve_project(ctx: &AppContext, project_override: Option<String>) -> AppResult<String> {
    project_override
        .or_else(|| ctx.config.default_project.clone())
        .map(|key| key.trim().to_string())
        .filter(|key| !key.is_empty())
        .ok_or_else(|| {
            AppError::Configuration(
                "no Jira project configured; pass --project or set JIRA_PROJECT_KEY".to_string(),
            )
        })
}

/// Creates every node top-down, parents before children.
///
/// A failed node is recorded and its whole subtree is skipped without any
/// tracker call; siblings and other Epics carry on. Re-running creates new
/// issues: nothing here looks for earlier copies.
pub async fn synchronize_tree(
    tracker: &dyn IssueTrackerService,
    tree: &TicketTree,
    capabilities: &TrackerCapabilities,
    target: &SyncTarget,
) -> SyncResult {
    let mut result = SyncResult::default();
    let types = &target.issue_types;

    for (epic_index, epic) in tree.epics().iter().enumerate() {
        let epic_ref = NodeRef::epic(epic_index, &epic.title);
        let mut draft = node_draft(target, &types.epic, epic);
        if let Some(field) = capabilities.required_epic_name_field() {
            draft
                .custom_fields
                .push((field.to_string(), Value::String(epic.title.clone())));
        }

        let Some(epic_key) = create_node(tracker, &draft, None, epic, &epic_ref, &mut result).await
        else {
            continue;
        };

        for (story_index, story) in epic.children.iter().enumerate() {
            let story_ref = epic_ref.child(story_index, &story.title);
            let mut draft = node_draft(target, &types.story, story);
            match capabilities.epic_link_field_id.as_deref() {
                Some(field) => draft
                    .custom_fields
                    .push((field.to_string(), Value::String(epic_key.clone()))),
                None => draft.parent_key = Some(epic_key.clone()),
            }

            let Some(story_key) =
                create_node(tracker, &draft, Some(&epic_key), story, &story_ref, &mut result).await
            else {
                continue;
            };

            for (subtask_index, subtask) in story.children.iter().enumerate() {
                let subtask_ref = story_ref.child(subtask_index, &subtask.title);
                let mut draft = node_draft(target, &types.subtask, subtask);
                draft.parent_key = Some(story_key.clone());
                create_node(tracker, &draft, None, subtask, &subtask_ref, &mut result).await;
            }
        }
    }

    info!(
        project = %target.project_key,
        created = result.created_count(),
        failed = result.errors().len(),
        "synchronization finished"
    );
    result
}

fn node_draft(target: &SyncTarget, issue_type: &str, node: &TicketNode) -> IssueDraft {
    let mut draft = IssueDraft::new(&target.project_key, issue_type, &node.title, &node.description);
    draft.priority = node.priority.clone();
    draft
}

/// Submits one node. On failure the node and all its descendants are
/// recorded and `None` tells the caller not to descend.
///
/// A "cannot be set" rejection is retried once without the optional fields;
/// `fallback_parent` then replaces an Epic Link value.
async fn create_node(
    tracker: &dyn IssueTrackerService,
    draft: &IssueDraft,
    fallback_parent: Option<&str>,
    node: &TicketNode,
    node_ref: &NodeRef,
    result: &mut SyncResult,
) -> Option<String> {
    let outcome = match tracker.create_issue(draft).await {
        Err(err) if is_field_rejection(&err) => match without_optional_fields(draft, fallback_parent) {
            Some(relaxed) => {
                warn!(
                    kind = node_ref.level.as_str(),
                    title = %node.title,
                    error = %err,
                    "field rejected, retrying without optional fields"
                );
                tracker.create_issue(&relaxed).await
            }
            None => Err(err),
        },
        other => other,
    };

    match outcome {
        Ok(issue) => {
            info!(key = %issue.key, kind = node_ref.level.as_str(), title = %node.title, "created issue");
            let key = issue.key.clone();
            result.record_created(node_ref.clone(), issue);
            Some(key)
        }
        Err(err) => {
            error!(kind = node_ref.level.as_str(), title = %node.title, error = %err, "issue creation failed");
            result.record_failure(node_ref.clone(), err.to_string());
            if !node.children.is_empty() {
                warn!(
                    title = %node.title,
                    skipped = node.descendant_count(),
                    "skipping subtree of failed issue"
                );
                let reason = format!("skipped: parent {} '{}' was not created", node_ref.level.as_str(), node.title);
                skip_subtree(node, node_ref, &reason, result);
            }
            None
        }
    }
}

fn is_field_rejection(err: &AppError) -> bool {
    matches!(err, AppError::TrackerCreation(message) if message.to_lowercase().contains("cannot be set"))
}

/// The draft minus priority and custom fields, or `None` if it carries none.
fn without_optional_fields(draft: &IssueDraft, fallback_parent: Option<&str>) -> Option<IssueDraft> {
    if draft.priority.is_none() && draft.custom_fields.is_empty() {
        return None;
    }
    let mut relaxed = draft.clone();
    relaxed.priority = None;
    relaxed.custom_fields.clear();
    if relaxed.parent_key.is_none() {
        relaxed.parent_key = fallback_parent.map(str::to_string);
    }
    Some(relaxed)
}

fn skip_subtree(node: &TicketNode, node_ref: &NodeRef, reason: &str, result: &mut SyncResult) {
    for (index, child) in node.children.iter().enumerate() {
        let child_ref = node_ref.child(index, &child.title);
        result.record_skipped(child_ref.clone(), reason.to_string());
        skip_subtree(child, &child_ref, reason, result);
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use serde_json::json;

    use super::*;
    use crate::domain::issue::FieldMeta;
    use crate::domain::ticket::{IssueRef, TicketLevel};
    use crate::workflow::normalize::normalize_response;

    /// Records every creation call and fails the summaries it is told to.
    #[derive(Default)]
    struct RecordingTracker {
        fail_summaries: HashSet<String>,
        metadata_down: bool,
        rejects_optional_fields: bool,
        catalogue: Vec<FieldMeta>,
        drafts: Mutex<Vec<IssueDraft>>,
    }

    impl RecordingTracker {
        fn failing(summaries: &[&str]) -> Self {
            Self {
                fail_summaries: summaries.iter().map(|s| s.to_string()).collect(),
                ..Self::default()
            }
        }

        fn drafts(&self) -> Vec<IssueDraft> {
            self.drafts.lock().unwrap().clone()
        }

        fn summaries(&self) -> Vec<String> {
            self.drafts().into_iter().map(|draft| draft.summary).collect()
        }
    }

    #[async_trait]
    impl IssueTrackerService for RecordingTracker {
        async fn creation_fields(&self, _project: &str, _issue_type: &str) -> AppResult<Vec<FieldMeta>> {
            if self.metadata_down {
                return Err(AppError::TrackerCapability("network unreachable".to_string()));
            }
            Ok(Vec::new())
        }

        async fn custom_fields(&self) -> AppResult<Vec<FieldMeta>> {
            if self.metadata_down {
                return Err(AppError::TrackerCapability("network unreachable".to_string()));
            }
            Ok(self.catalogue.clone())
        }

        async fn create_issue(&self, draft: &IssueDraft) -> AppResult<IssueRef> {
            let mut drafts = self.drafts.lock().unwrap();
            drafts.push(draft.clone());
            if self.rejects_optional_fields {
                if let Some((field, _)) = draft.custom_fields.first() {
                    return Err(AppError::TrackerCreation(format!(
                        "Jira responded with 400 Bad Request: {field}: Field '{field}' cannot be set. \
                         It is not on the appropriate screen, or unknown."
                    )));
                }
                if draft.priority.is_some() {
                    return Err(AppError::TrackerCreation(
                        "Jira responded with 400 Bad Request: priority: Field 'priority' cannot be set."
                            .to_string(),
                    ));
                }
            }
            if self.fail_summaries.contains(&draft.summary) {
                return Err(AppError::TrackerCreation(format!(
                    "Jira responded with 400: cannot create {}",
                    draft.summary
                )));
            }
            Ok(IssueRef {
                key: format!("PRJ-{}", drafts.len()),
                url: None,
            })
        }
    }

    fn target() -> SyncTarget {
        SyncTarget {
            project_key: "PRJ".to_string(),
            issue_types: IssueTypeNames::default(),
        }
    }

    /// Two epics, two stories each, two subtasks per story.
    fn tree() -> TicketTree {
        let epics = ["Auth", "Billing"]
            .iter()
            .map(|epic| {
                let stories = (1..=2)
                    .map(|s| {
                        let subtasks = (1..=2)
                            .map(|t| json!({ "summary": format!("{epic} task {s}.{t}") }))
                            .collect::<Vec<_>>();
                        json!({ "summary": format!("{epic} story {s}"), "subtasks": subtasks })
                    })
                    .collect::<Vec<_>>();
                json!({ "summary": epic, "description": format!("{epic} work"), "stories": stories })
            })
            .collect::<Vec<_>>();
        normalize_response(&json!({ "epics": epics }).to_string()).expect("valid tree")
    }

    #[tokio::test]
    async fn creates_everything_in_dependency_order() {
        let tracker = RecordingTracker::default();
        let result = synchronize_tree(&tracker, &tree(), &TrackerCapabilities::default(), &target()).await;

        assert_eq!(result.created_epics().len(), 2);
        assert_eq!(result.created_stories().len(), 4);
        assert_eq!(result.created_subtasks().len(), 8);
        assert!(result.errors().is_empty());
        assert_eq!(
            &tracker.summaries()[..4],
            ["Auth", "Auth story 1", "Auth task 1.1", "Auth task 1.2"]
        );

        let drafts = tracker.drafts();
        assert_eq!(drafts[0].issue_type, "Epic");
        assert_eq!(drafts[0].description, "Auth work");
        assert_eq!(drafts[1].issue_type, "Story");
        assert_eq!(drafts[1].parent_key.as_deref(), Some("PRJ-1"));
        assert_eq!(drafts[2].issue_type, "Sub-task");
        assert_eq!(drafts[2].parent_key.as_deref(), Some("PRJ-2"));
    }

    #[tokio::test]
    async fn failed_epic_skips_exactly_its_subtree() {
        let tracker = RecordingTracker::failing(&["Auth"]);
        let result = synchronize_tree(&tracker, &tree(), &TrackerCapabilities::default(), &target()).await;

        // One attempt for Auth, then seven calls for the Billing subtree.
        let summaries = tracker.summaries();
        assert_eq!(summaries.len(), 8);
        assert!(summaries.iter().skip(1).all(|s| s.starts_with("Billing")));

        assert_eq!(result.created_epics().len(), 1);
        assert_eq!(result.created_stories().len(), 2);
        assert_eq!(result.created_subtasks().len(), 4);

        let errors = result.errors();
        assert_eq!(errors.len(), 7);
        assert!(!errors[0].skipped);
        assert_eq!(errors[0].node.title, "Auth");
        assert!(errors[1..].iter().all(|failure| failure.skipped));
        assert_eq!(
            errors.iter().filter(|f| f.node.level == TicketLevel::Story).count(),
            2
        );
        assert_eq!(
            errors.iter().filter(|f| f.node.level == TicketLevel::Subtask).count(),
            4
        );
        assert!(result.success());
    }

    #[tokio::test]
    async fn failed_story_skips_only_its_subtasks() {
        let tracker = RecordingTracker::failing(&["Auth story 1", "Billing task 2.1"]);
        let result = synchronize_tree(&tracker, &tree(), &TrackerCapabilities::default(), &target()).await;

        let summaries = tracker.summaries();
        assert!(!summaries.iter().any(|s| s.starts_with("Auth task 1.")));
        assert!(summaries.contains(&"Auth task 2.1".to_string()));
        assert!(summaries.contains(&"Billing task 2.2".to_string()));

        assert_eq!(result.created_stories().len(), 3);
        assert_eq!(result.created_subtasks().len(), 5);
        let skipped = result.errors().iter().filter(|f| f.skipped).count();
        assert_eq!(skipped, 2);
        assert_eq!(result.errors().len(), 4);
    }

    #[tokio::test]
    async fn never_creates_children_of_uncreated_parents() {
        let tracker = RecordingTracker::failing(&["Billing", "Auth story 2"]);
        let result = synchronize_tree(&tracker, &tree(), &TrackerCapabilities::default(), &target()).await;

        let epic_keys = result
            .created_epics()
            .iter()
            .map(|issue| issue.key.clone())
            .collect::<HashSet<_>>();
        let story_keys = result
            .created_stories()
            .iter()
            .map(|issue| issue.key.clone())
            .collect::<HashSet<_>>();

        for draft in tracker.drafts() {
            match draft.issue_type.as_str() {
                "Story" => assert!(epic_keys.contains(draft.parent_key.as_deref().unwrap())),
                "Sub-task" => assert!(story_keys.contains(draft.parent_key.as_deref().unwrap())),
                _ => assert!(draft.parent_key.is_none()),
            }
        }
    }

    #[tokio::test]
    async fn applies_discovered_epic_fields() {
        let tracker = RecordingTracker::default();
        let capabilities = TrackerCapabilities {
            epic_name_field_id: Some("customfield_10011".to_string()),
            epic_link_field_id: Some("customfield_10014".to_string()),
            requires_epic_name_field: true,
        };
        synchronize_tree(&tracker, &tree(), &capabilities, &target()).await;

        let drafts = tracker.drafts();
        assert_eq!(drafts[0].custom_field("customfield_10011"), Some(&json!("Auth")));
        assert_eq!(drafts[1].custom_field("customfield_10014"), Some(&json!("PRJ-1")));
        assert_eq!(drafts[1].parent_key, None);
        assert_eq!(drafts[2].parent_key.as_deref(), Some("PRJ-2"));
    }

    #[tokio::test]
    async fn optional_epic_name_field_is_not_sent() {
        let tracker = RecordingTracker::default();
        let capabilities = TrackerCapabilities {
            epic_name_field_id: Some("customfield_10011".to_string()),
            ..TrackerCapabilities::default()
        };
        synchronize_tree(&tracker, &tree(), &capabilities, &target()).await;
        assert!(tracker.drafts()[0].custom_fields.is_empty());
    }

    #[tokio::test]
    async fn probe_failure_does_not_block_sync() {
        let tracker = RecordingTracker {
            metadata_down: true,
            ..RecordingTracker::default()
        };
        let cache = crate::cache::CapabilityCache::new();
        let capabilities = probe_capabilities(&tracker, &cache, "PRJ", &IssueTypeNames::default()).await;
        assert!(!capabilities.requires_epic_name_field);

        let result = synchronize_tree(&tracker, &tree(), &capabilities, &target()).await;
        assert_eq!(result.created_count(), 14);
        assert!(tracker.drafts()[0].custom_fields.is_empty());
    }

    #[tokio::test]
    async fn rejected_epic_link_retries_through_parent() {
        let tracker = RecordingTracker {
            rejects_optional_fields: true,
            ..RecordingTracker::default()
        };
        let capabilities = TrackerCapabilities {
            epic_link_field_id: Some("customfield_10014".to_string()),
            ..TrackerCapabilities::default()
        };
        let result = synchronize_tree(&tracker, &tree(), &capabilities, &target()).await;

        assert_eq!(result.created_epics().len(), 2);
        assert_eq!(result.created_stories().len(), 4);
        assert_eq!(result.created_subtasks().len(), 8);
        assert!(result.errors().is_empty());

        // Each story is attempted twice: with Epic Link, then with parent.
        let drafts = tracker.drafts();
        assert_eq!(drafts.len(), 18);
        assert_eq!(drafts[1].custom_field("customfield_10014"), Some(&json!("PRJ-1")));
        assert_eq!(drafts[2].summary, "Auth story 1");
        assert!(drafts[2].custom_fields.is_empty());
        assert_eq!(drafts[2].parent_key.as_deref(), Some("PRJ-1"));
        assert_eq!(drafts[3].parent_key.as_deref(), Some("PRJ-3"));
    }

    #[tokio::test]
    async fn site_epic_link_off_the_story_screen_links_through_parent() {
        let tracker = RecordingTracker {
            rejects_optional_fields: true,
            catalogue: vec![FieldMeta {
                id: "customfield_10014".to_string(),
                name: "Epic Link".to_string(),
                schema_type: Some("any".to_string()),
                schema_custom: Some(crate::workflow::probe::EPIC_LINK_SCHEMA.to_string()),
                ..FieldMeta::default()
            }],
            ..RecordingTracker::default()
        };
        let cache = crate::cache::CapabilityCache::new();
        let capabilities = probe_capabilities(&tracker, &cache, "PRJ", &IssueTypeNames::default()).await;
        assert_eq!(capabilities.epic_link_field_id, None);

        let result = synchronize_tree(&tracker, &tree(), &capabilities, &target()).await;
        assert_eq!(result.created_stories().len(), 4);
        assert_eq!(result.created_subtasks().len(), 8);
        assert!(result.errors().is_empty());
        assert_eq!(tracker.drafts().len(), 14);
        assert_eq!(tracker.drafts()[1].parent_key.as_deref(), Some("PRJ-1"));
    }

    #[tokio::test]
    async fn rejected_priority_is_dropped_on_retry() {
        let tree = normalize_response(
            r#"{"epics":[{"summary":"Auth","priority":"Highest","stories":[
                {"summary":"Login","priority":"High","subtasks":[{"summary":"Form"}]}]}]}"#,
        )
        .expect("valid tree");
        let tracker = RecordingTracker {
            rejects_optional_fields: true,
            ..RecordingTracker::default()
        };
        let result = synchronize_tree(&tracker, &tree, &TrackerCapabilities::default(), &target()).await;

        assert_eq!(result.created_count(), 3);
        assert!(result.errors().is_empty());
        let summaries = tracker.summaries();
        assert_eq!(summaries, ["Auth", "Auth", "Login", "Login", "Form"]);
        assert!(tracker.drafts()[1].priority.is_none());
    }

    #[tokio::test]
    async fn other_rejections_are_not_retried() {
        let tracker = RecordingTracker::failing(&["Auth"]);
        let mut draft = IssueDraft::new("PRJ", "Epic", "Auth", "");
        draft.priority = Some("High".to_string());
        let node = TicketNode::new("Auth", "");
        let mut result = SyncResult::default();

        let key = create_node(&tracker, &draft, None, &node, &NodeRef::epic(0, "Auth"), &mut result).await;
        assert_eq!(key, None);
        assert_eq!(tracker.drafts().len(), 1);
        assert_eq!(result.errors().len(), 1);
    }

    #[test]
    fn nothing_optional_means_no_retry_draft() {
        let draft = IssueDraft::new("PRJ", "Sub-task", "Form", "");
        assert_eq!(without_optional_fields(&draft, Some("PRJ-1")), None);
        assert!(is_field_rejection(&AppError::TrackerCreation(
            "Field 'priority' Cannot Be Set".to_string()
        )));
        assert!(!is_field_rejection(&AppError::TrackerCapability("cannot be set".to_string())));
    }

    #[tokio::test]
    async fn epic_without_stories_is_created_alone() {
        let tree = normalize_response(r#"{"epics":[{"summary":"Lonely"}]}"#).expect("valid tree");
        let tracker = RecordingTracker::default();
        let result = synchronize_tree(&tracker, &tree, &TrackerCapabilities::default(), &target()).await;
        assert_eq!(tracker.summaries(), vec!["Lonely"]);
        assert_eq!(result.created_epics()[0].node.path, vec![0]);
    }
}
