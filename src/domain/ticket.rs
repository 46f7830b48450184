use serde::Serialize;
use serde_json::{Map, Value, json};

/// Hierarchy level of a node, fixed by its nesting depth.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TicketLevel {
    Epic,
    Story,
    Subtask,
}

impl TicketLevel {
    pub const MAX_DEPTH: usize = 3;

    pub fn from_depth(depth: usize) -> Option<Self> {
        match depth {
            0 => Some(TicketLevel::Epic),
            1 => Some(TicketLevel::Story),
            2 => Some(TicketLevel::Subtask),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TicketLevel::Epic => "epic",
            TicketLevel::Story => "story",
            TicketLevel::Subtask => "subtask",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TicketNode {
    pub title: String,
    pub description: String,
    pub priority: Option<String>,
    pub children: Vec<TicketNode>,
}

impl TicketNode {
    pub fn new(title: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            description: description.into(),
            priority: None,
            children: Vec::new(),
        }
    }

    pub fn with_children(mut self, children: Vec<TicketNode>) -> Self {
        self.children = children;
        self
    }

    /// Number of nodes below this one, at any depth.
    pub fn descendant_count(&self) -> usize {
        self.children
            .iter()
            .map(|child| 1 + child.descendant_count())
            .sum()
    }

    fn to_json(&self, level: TicketLevel) -> Value {
        let mut object = Map::new();
        object.insert("summary".to_string(), json!(self.title));
        object.insert("description".to_string(), json!(self.description));
        if let Some(priority) = &self.priority {
            object.insert("priority".to_string(), json!(priority));
        }
        let child_key = match level {
            TicketLevel::Epic => Some("stories"),
            TicketLevel::Story => Some("subtasks"),
            TicketLevel::Subtask => None,
        };
        if let (Some(key), Some(child_level)) = (child_key, level_below(level)) {
            let children = self
                .children
                .iter()
                .map(|child| child.to_json(child_level))
                .collect::<Vec<_>>();
            object.insert(key.to_string(), Value::Array(children));
        }
        Value::Object(object)
    }
}

fn level_below(level: TicketLevel) -> Option<TicketLevel> {
    match level {
        TicketLevel::Epic => Some(TicketLevel::Story),
        TicketLevel::Story => Some(TicketLevel::Subtask),
        TicketLevel::Subtask => None,
    }
}

/// Validated Epic -> Story -> Subtask forest.
///
/// Built by the hierarchy normalizer and read-only afterwards: depth never
/// exceeds three levels, every title is non-empty and unique among its
/// siblings.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TicketTree {
    epics: Vec<TicketNode>,
}

impl TicketTree {
    pub(crate) fn from_validated(epics: Vec<TicketNode>) -> Self {
        Self { epics }
    }

    pub fn epics(&self) -> &[TicketNode] {
        &self.epics
    }

    pub fn is_empty(&self) -> bool {
        self.epics.is_empty()
    }

    pub fn stats(&self) -> TreeStats {
        let stories = self.epics.iter().map(|epic| epic.children.len()).sum();
        let subtasks = self
            .epics
            .iter()
            .flat_map(|epic| epic.children.iter())
            .map(|story| story.children.len())
            .sum();
        TreeStats {
            epics: self.epics.len(),
            stories,
            subtasks,
        }
    }

    /// JSON projection in the same shape the model is asked to produce, so a
    /// saved tree can be fed back through the normalizer unchanged.
    pub fn to_json(&self) -> Value {
        let epics = self
            .epics
            .iter()
            .map(|epic| epic.to_json(TicketLevel::Epic))
            .collect::<Vec<_>>();
        json!({ "epics": epics })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TreeStats {
    pub epics: usize,
    pub stories: usize,
    pub subtasks: usize,
}

/// An issue that exists in the tracker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IssueRef {
    pub key: String,
    pub url: Option<String>,
}
