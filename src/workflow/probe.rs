use tracing::{debug, info, warn};

use crate::cache::CapabilityCache;
use crate::config::IssueTypeNames;
use crate::domain::capabilities::TrackerCapabilities;
use crate::domain::issue::FieldMeta;
use crate::services::IssueTrackerService;

pub const EPIC_NAME_SCHEMA: &str = "com.pyxis.greenhopper.jira:gh-epic-label";
pub const EPIC_LINK_SCHEMA: &str = "com.pyxis.greenhopper.jira:gh-epic-link";

/// Discovers Epic Name / Epic Link handling for a project.
///
/// Never fails: any query error degrades that half of the result to the
/// modern default. Only a fully successful probe is cached, so a transient
/// error is retried by the next run in this process.
///
/// The field catalogue is site-wide, so an Epic Link field only counts when
/// the project's Story create screen offers it too.
pub async fn probe_capabilities(
    tracker: &dyn IssueTrackerService,
    cache: &CapabilityCache,
    project: &str,
    issue_types: &IssueTypeNames,
) -> TrackerCapabilities {
    if let Some(cached) = cache.get(project).await {
        debug!(project, "using cached tracker capabilities");
        return cached;
    }

    let mut capabilities = TrackerCapabilities::default();
    let mut complete = true;

    match tracker.creation_fields(project, &issue_types.epic).await {
        Ok(fields) => {
            if let Some(field) = fields.iter().find(|field| is_epic_name_field(field)) {
                capabilities.epic_name_field_id = Some(field.id.clone());
                capabilities.requires_epic_name_field = field.required;
            }
        }
        Err(err) => {
            complete = false;
            warn!(project, error = %err, "epic metadata unavailable, assuming no Epic Name field is required");
        }
    }

    let epic_link = match tracker.custom_fields().await {
        Ok(fields) => fields
            .into_iter()
            .find(is_epic_link_field)
            .map(|field| field.id),
        Err(err) => {
            complete = false;
            warn!(project, error = %err, "field catalogue unavailable, linking stories through parent");
            None
        }
    };

    if let Some(field_id) = epic_link {
        match tracker.creation_fields(project, &issue_types.story).await {
            Ok(story_fields) if story_fields.iter().any(|field| field.id == field_id) => {
                capabilities.epic_link_field_id = Some(field_id);
            }
            Ok(_) => {
                debug!(project, field = %field_id, "Epic Link is not on the story screen, linking stories through parent");
            }
            Err(err) => {
                complete = false;
                warn!(project, error = %err, "story metadata unavailable, linking stories through parent");
            }
        }
    }

    info!(
        project,
        requires_epic_name = capabilities.requires_epic_name_field,
        epic_name_field = capabilities.epic_name_field_id.as_deref().unwrap_or("-"),
        epic_link_field = capabilities.epic_link_field_id.as_deref().unwrap_or("-"),
        "probed tracker capabilities"
    );

    if complete {
        cache.insert(project, capabilities.clone()).await;
        debug!(cached_projects = cache.len().await, "cached tracker capabilities");
    }
    capabilities
}

fn is_epic_name_field(field: &FieldMeta) -> bool {
    matches_custom_field(field, EPIC_NAME_SCHEMA, "epic name", "string")
}

fn is_epic_link_field(field: &FieldMeta) -> bool {
    matches_custom_field(field, EPIC_LINK_SCHEMA, "epic link", "any")
}

/// Schema id match, or a name match whose value type (when reported) fits.
fn matches_custom_field(field: &FieldMeta, schema: &str, name: &str, value_type: &str) -> bool {
    if !field.is_custom() {
        return false;
    }
    if field.schema_custom.as_deref() == Some(schema) {
        return true;
    }
    field.name.trim().eq_ignore_ascii_case(name)
        && field
            .schema_type
            .as_deref()
            .is_none_or(|reported| reported == value_type)
}
