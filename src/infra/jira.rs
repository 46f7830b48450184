use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use base64::prelude::{BASE64_STANDARD, Engine as _};
use reqwest::{
    Client,
    header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE},
};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

use crate::domain::issue::{FieldMeta, IssueDraft};
use crate::domain::ticket::IssueRef;
use crate::error::{AppError, AppResult};
use crate::services::IssueTrackerService;

const METADATA_PAGE_SIZE: u32 = 200;

pub struct JiraClient {
    http: Client,
    base_url: Option<String>,
    email: Option<String>,
    token: Option<String>,
}

impl JiraClient {
    pub fn new(
        base_url: Option<String>,
        email: Option<String>,
        token: Option<String>,
        timeout: Duration,
    ) -> AppResult<Self> {
        let http = Client::builder().timeout(timeout).build().map_err(|err| {
            AppError::Configuration(format!("failed to build Jira HTTP client: {err}"))
        })?;
        Ok(Self {
            http,
            base_url,
            email,
            token,
        })
    }

    fn api_details(&self) -> AppResult<(&str, &str, &str)> {
        let base_url = self
            .base_url
            .as_deref()
            .ok_or_else(|| AppError::Configuration("Jira base URL not configured".to_string()))?;
        let email = self
            .email
            .as_deref()
            .ok_or_else(|| AppError::Configuration("Jira email not configured".to_string()))?;
        let token = self
            .token
            .as_deref()
            .ok_or_else(|| AppError::Configuration("Jira API token not configured".to_string()))?;
        Ok((base_url, email, token))
    }

    fn auth_header(email: &str, token: &str) -> String {
        let credentials = format!("{email}:{token}");
        let encoded = BASE64_STANDARD.encode(credentials);
        format!("Basic {encoded}")
    }

    fn api_url(base_url: &str, path: &str) -> String {
        format!("{}/rest/api/3/{}", base_url.trim_end_matches('/'), path)
    }

    fn browse_url(base_url: &str, key: &str) -> String {
        format!("{}/browse/{}", base_url.trim_end_matches('/'), key)
    }

    /// GET against a metadata endpoint. Failures are capability errors: the
    /// caller degrades instead of aborting.
    async fn get_metadata<T: DeserializeOwned>(&self, path: &str) -> AppResult<T> {
        let (base_url, email, token) = self.api_details()?;
        let url = Self::api_url(base_url, path);
        debug!(%url, "querying Jira metadata");

        let response = self
            .http
            .get(&url)
            .header(AUTHORIZATION, Self::auth_header(email, token))
            .header(ACCEPT, "application/json")
            .send()
            .await
            .map_err(|err| AppError::TrackerCapability(format!("failed to call Jira: {err}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::TrackerCapability(format!(
                "Jira responded with {status}: {}",
                describe_error(&body)
            )));
        }

        response.json::<T>().await.map_err(|err| {
            AppError::TrackerCapability(format!("failed to parse Jira metadata: {err}"))
        })
    }
}

#[async_trait]
impl IssueTrackerService for JiraClient {
    async fn creation_fields(&self, project: &str, issue_type: &str) -> AppResult<Vec<FieldMeta>> {
        let project = project.trim();
        let types: JiraIssueTypePage = self
            .get_metadata(&format!(
                "issue/createmeta/{project}/issuetypes?maxResults={METADATA_PAGE_SIZE}"
            ))
            .await?;

        let entry = types
            .issue_types
            .iter()
            .find(|entry| entry.name.eq_ignore_ascii_case(issue_type.trim()))
            .ok_or_else(|| {
                AppError::TrackerCapability(format!(
                    "issue type '{issue_type}' is not available in project {project}"
                ))
            })?;

        let fields: JiraCreateMetaFieldPage = self
            .get_metadata(&format!(
                "issue/createmeta/{project}/issuetypes/{}?maxResults={METADATA_PAGE_SIZE}",
                entry.id
            ))
            .await?;

        Ok(fields
            .fields
            .into_iter()
            .map(|field| {
                let (schema_type, schema_custom) = field.schema.unwrap_or_default().into_parts();
                FieldMeta {
                    id: field.field_id,
                    name: field.name,
                    required: field.required,
                    schema_type,
                    schema_custom,
                }
            })
            .collect())
    }

    async fn custom_fields(&self) -> AppResult<Vec<FieldMeta>> {
        let fields: Vec<JiraField> = self.get_metadata("field").await?;
        Ok(fields
            .into_iter()
            .filter(|field| field.custom)
            .map(|field| {
                let (schema_type, schema_custom) = field.schema.unwrap_or_default().into_parts();
                FieldMeta {
                    id: field.id,
                    name: field.name,
                    required: false,
                    schema_type,
                    schema_custom,
                }
            })
            .collect())
    }

    async fn create_issue(&self, draft: &IssueDraft) -> AppResult<IssueRef> {
        let project_key = draft.project_key.trim();
        if project_key.is_empty() {
            return Err(AppError::TrackerCreation(
                "project key must not be empty".to_string(),
            ));
        }
        if draft.summary.trim().is_empty() {
            return Err(AppError::TrackerCreation(
                "summary must not be empty".to_string(),
            ));
        }

        let (base_url, email, token) = self.api_details()?;
        let request_body = JiraCreateIssueRequest::from_draft(draft);

        let response = self
            .http
            .post(Self::api_url(base_url, "issue"))
            .header(AUTHORIZATION, Self::auth_header(email, token))
            .header(ACCEPT, "application/json")
            .header(CONTENT_TYPE, "application/json")
            .json(&request_body)
            .send()
            .await
            .map_err(|err| AppError::TrackerCreation(format!("failed to call Jira: {err}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unable to read response>".to_string());
            return Err(AppError::TrackerCreation(format!(
                "Jira responded with {status}: {}",
                describe_error(&body)
            )));
        }

        let payload: JiraCreateIssueResponse = response.json().await.map_err(|err| {
            AppError::TrackerCreation(format!("failed to parse Jira response: {err}"))
        })?;

        let url = Self::browse_url(base_url, &payload.key);
        Ok(IssueRef {
            key: payload.key,
            url: Some(url),
        })
    }
}

/// Condenses Jira's `{errorMessages, errors}` body into one line.
fn describe_error(body: &str) -> String {
    if let Ok(parsed) = serde_json::from_str::<JiraErrorBody>(body) {
        let mut messages = parsed.error_messages;
        messages.extend(parsed.errors.into_iter().map(|(field, value)| {
            let text = value
                .as_str()
                .map(str::to_string)
                .unwrap_or_else(|| value.to_string());
            format!("{field}: {text}")
        }));
        if !messages.is_empty() {
            return messages.join("; ");
        }
    }
    let trimmed = body.trim();
    if trimmed.is_empty() {
        "<empty response>".to_string()
    } else {
        trimmed.to_string()
    }
}

#[derive(Serialize)]
struct JiraCreateIssueRequest {
    fields: JiraCreateIssueFields,
}

impl JiraCreateIssueRequest {
    fn from_draft(draft: &IssueDraft) -> Self {
        let custom = draft
            .custom_fields
            .iter()
            .map(|(id, value)| (id.clone(), value.clone()))
            .collect::<Map<_, _>>();
        Self {
            fields: JiraCreateIssueFields {
                project: JiraKeyRef {
                    key: draft.project_key.trim().to_string(),
                },
                summary: draft.summary.trim().to_string(),
                description: JiraDescription::from_markdown(&draft.description),
                issuetype: JiraNamed {
                    name: draft.issue_type.clone(),
                },
                priority: draft.priority.as_ref().map(|name| JiraNamed { name: name.clone() }),
                parent: draft.parent_key.as_ref().map(|key| JiraKeyRef { key: key.clone() }),
                custom,
            },
        }
    }
}

#[derive(Serialize)]
struct JiraCreateIssueFields {
    project: JiraKeyRef,
    summary: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<JiraDescription>,
    issuetype: JiraNamed,
    #[serde(skip_serializing_if = "Option::is_none")]
    priority: Option<JiraNamed>,
    #[serde(skip_serializing_if = "Option::is_none")]
    parent: Option<JiraKeyRef>,
    #[serde(flatten)]
    custom: Map<String, Value>,
}

#[derive(Serialize)]
struct JiraKeyRef {
    key: String,
}

#[derive(Serialize)]
struct JiraNamed {
    name: String,
}

/// Atlassian Document Format body: one paragraph per blank-line block.
#[derive(Serialize)]
struct JiraDescription {
    #[serde(rename = "type")]
    doc_type: &'static str,
    version: u8,
    content: Vec<JiraDocNode>,
}

impl JiraDescription {
    fn from_markdown(description: &str) -> Option<Self> {
        let cleaned = description.replace('\r', "");
        let content = cleaned
            .split("\n\n")
            .map(|section| section.trim())
            .filter(|section| !section.is_empty())
            .map(|section| JiraDocNode::paragraph(section.replace('\n', " ")))
            .collect::<Vec<_>>();

        if content.is_empty() {
            return None;
        }
        Some(Self {
            doc_type: "doc",
            version: 1,
            content,
        })
    }
}

#[derive(Serialize)]
struct JiraDocNode {
    #[serde(rename = "type")]
    node_type: &'static str,
    content: Vec<JiraDocText>,
}

impl JiraDocNode {
    fn paragraph(text: String) -> Self {
        Self {
            node_type: "paragraph",
            content: vec![JiraDocText::text(text)],
        }
    }
}

#[derive(Serialize)]
struct JiraDocText {
    #[serde(rename = "type")]
    text_type: &'static str,
    text: String,
}

impl JiraDocText {
    fn text(text: String) -> Self {
        Self {
            text_type: "text",
            text,
        }
    }
}

#[derive(Deserialize)]
struct JiraCreateIssueResponse {
    key: String,
}

#[derive(Deserialize)]
struct JiraIssueTypePage {
    #[serde(rename = "issueTypes", alias = "values", default)]
    issue_types: Vec<JiraIssueTypeEntry>,
}

#[derive(Deserialize)]
struct JiraIssueTypeEntry {
    id: String,
    name: String,
}

#[derive(Deserialize)]
struct JiraCreateMetaFieldPage {
    #[serde(alias = "results", alias = "values", default)]
    fields: Vec<JiraCreateMetaField>,
}

#[derive(Deserialize)]
struct JiraCreateMetaField {
    #[serde(rename = "fieldId")]
    field_id: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    required: bool,
    #[serde(default)]
    schema: Option<JiraFieldSchema>,
}

#[derive(Deserialize)]
struct JiraField {
    id: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    custom: bool,
    #[serde(default)]
    schema: Option<JiraFieldSchema>,
}

#[derive(Deserialize, Default)]
struct JiraFieldSchema {
    #[serde(rename = "type", default)]
    field_type: Option<String>,
    #[serde(default)]
    custom: Option<String>,
}

impl JiraFieldSchema {
    fn into_parts(self) -> (Option<String>, Option<String>) {
        (self.field_type, self.custom)
    }
}

#[derive(Deserialize)]
struct JiraErrorBody {
    #[serde(rename = "errorMessages", default)]
    error_messages: Vec<String>,
    #[serde(default)]
    errors: BTreeMap<String, Value>,
}
