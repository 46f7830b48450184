use serde_json::Value;

/// Tracker-agnostic creation request for a single issue.
#[derive(Debug, Clone, PartialEq)]
pub struct IssueDraft {
    pub project_key: String,
    pub issue_type: String,
    pub summary: String,
    pub description: String,
    pub priority: Option<String>,
    pub parent_key: Option<String>,
    pub custom_fields: Vec<(String, Value)>,
}

impl IssueDraft {
    pub fn new(project_key: &str, issue_type: &str, summary: &str, description: &str) -> Self {
        Self {
            project_key: project_key.to_string(),
            issue_type: issue_type.to_string(),
            summary: summary.to_string(),
            description: description.to_string(),
            priority: None,
            parent_key: None,
            custom_fields: Vec::new(),
        }
    }

    #[cfg(test)]
    pub fn custom_field(&self, field_id: &str) -> Option<&Value> {
        self.custom_fields
            .iter()
            .find(|(id, _)| id == field_id)
            .map(|(_, value)| value)
    }
}

/// Field description as reported by tracker metadata endpoints.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FieldMeta {
    pub id: String,
    pub name: String,
    pub required: bool,
    pub schema_type: Option<String>,
    pub schema_custom: Option<String>,
}

impl FieldMeta {
    pub fn is_custom(&self) -> bool {
        self.schema_custom.is_some() || self.id.starts_with("customfield_")
    }
}
