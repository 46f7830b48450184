use serde::Serialize;

/// Project-specific field requirements discovered by the capability probe.
///
/// The default is the safe assumption for modern cloud projects: no Epic Name
/// field is required and Stories are linked through `parent`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackerCapabilities {
    pub epic_name_field_id: Option<String>,
    pub epic_link_field_id: Option<String>,
    pub requires_epic_name_field: bool,
}

impl TrackerCapabilities {
    /// Field to fill with the Epic's title, present only when the project
    /// refuses Epics without it.
    pub fn required_epic_name_field(&self) -> Option<&str> {
        if self.requires_epic_name_field {
            self.epic_name_field_id.as_deref()
        } else {
            None
        }
    }
}
