//! Turns raw model output into a validated ticket tree.
//!
//! Model text is untrusted: it may be prose around a JSON block, a fenced
//! code block, or truncated mid-object. Parsing is strict first, then one
//! recovery attempt on the largest balanced `{...}` region. Anything that
//! still fails is reported with the raw text attached; a tree is never
//! invented from unparsable input.

use std::collections::HashSet;

use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::domain::ticket::{TicketLevel, TicketNode, TicketTree};
use crate::error::{AppError, AppResult};

const SUBTASK_DEPTH: usize = TicketLevel::MAX_DEPTH - 1;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
struct Repairs {
    dropped: usize,
    renamed: usize,
    flattened: usize,
}

pub fn normalize_response(raw: &str) -> AppResult<TicketTree> {
    let document = parse_document(raw)?;

    let epics = document
        .as_object()
        .and_then(|object| object.get("epics"))
        .and_then(Value::as_array)
        .ok_or_else(|| AppError::normalization("response has no \"epics\" array", raw))?;

    let mut repairs = Repairs::default();
    let nodes = coerce_level(epics, 0, &mut repairs);

    if repairs != Repairs::default() {
        warn!(
            dropped = repairs.dropped,
            renamed = repairs.renamed,
            flattened = repairs.flattened,
            "repaired model output"
        );
    }

    let tree = TicketTree::from_validated(nodes);
    let stats = tree.stats();
    debug!(
        epics = stats.epics,
        stories = stats.stories,
        subtasks = stats.subtasks,
        "normalized ticket tree"
    );
    Ok(tree)
}

fn parse_document(raw: &str) -> AppResult<Value> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(AppError::normalization("response is empty", raw));
    }

    match serde_json::from_str::<Value>(trimmed) {
        Ok(value) => Ok(value),
        Err(strict_err) => {
            debug!(error = %strict_err, "strict parse failed, trying recovery");
            let candidate = largest_balanced_object(trimmed).ok_or_else(|| {
                AppError::normalization(
                    format!("response is not valid JSON and has no complete object: {strict_err}"),
                    raw,
                )
            })?;
            serde_json::from_str::<Value>(candidate).map_err(|err| {
                AppError::normalization(format!("recovered JSON block is invalid: {err}"), raw)
            })
        }
    }
}

/// Longest `{...}` region whose braces balance, ignoring braces inside JSON
/// strings. Quotes are only tracked inside an open object so stray quotes in
/// surrounding prose do not confuse the scan.
fn largest_balanced_object(text: &str) -> Option<&str> {
    let mut open: Vec<usize> = Vec::new();
    let mut in_string = false;
    let mut escaped = false;
    let mut best: Option<(usize, usize)> = None;

    for (index, ch) in text.char_indices() {
        if in_string {
            if escaped {
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == '"' {
                in_string = false;
            }
            continue;
        }

        match ch {
            '"' if !open.is_empty() => in_string = true,
            '{' => open.push(index),
            '}' => {
                if let Some(start) = open.pop() {
                    let end = index + ch.len_utf8();
                    if best.is_none_or(|(s, e)| end - start > e - s) {
                        best = Some((start, end));
                    }
                }
            }
            _ => {}
        }
    }

    best.map(|(start, end)| &text[start..end])
}

fn coerce_level(items: &[Value], depth: usize, repairs: &mut Repairs) -> Vec<TicketNode> {
    let mut nodes = Vec::with_capacity(items.len());

    for item in items {
        let Some(object) = item.as_object() else {
            repairs.dropped += 1;
            continue;
        };
        let Some(title) = node_title(object) else {
            repairs.dropped += 1;
            continue;
        };

        let mut node = TicketNode::new(title, text_field(object, "description"));
        node.priority = Some(text_field(object, "priority")).filter(|p| !p.is_empty());

        let nested = child_items(object, depth);
        if depth < SUBTASK_DEPTH {
            let children = coerce_level(nested, depth + 1, repairs);
            nodes.push(node.with_children(children));
        } else {
            // Nothing may live below a subtask; lift deeper items up to sit
            // right after their ancestor.
            nodes.push(node);
            if !nested.is_empty() {
                let counted_before = repairs.flattened;
                let lifted = coerce_level(nested, depth, repairs);
                // `lifted` already holds whatever the nested call lifted.
                repairs.flattened = counted_before + lifted.len();
                nodes.extend(lifted);
            }
        }
    }

    repairs.renamed += disambiguate_siblings(&mut nodes);
    nodes
}

/// Single-line title; tracker summaries cannot hold line breaks.
fn node_title(object: &Map<String, Value>) -> Option<String> {
    ["summary", "title"]
        .iter()
        .filter_map(|key| object.get(*key).and_then(Value::as_str))
        .map(|title| title.split_whitespace().collect::<Vec<_>>().join(" "))
        .find(|title| !title.is_empty())
}

fn text_field(object: &Map<String, Value>, key: &str) -> String {
    object
        .get(key)
        .and_then(Value::as_str)
        .map(|text| text.trim().to_string())
        .unwrap_or_default()
}

fn child_items(object: &Map<String, Value>, depth: usize) -> &[Value] {
    let primary = match depth {
        0 => "stories",
        _ => "subtasks",
    };
    [primary, "children"]
        .iter()
        .find_map(|key| object.get(*key).and_then(Value::as_array))
        .map(Vec::as_slice)
        .unwrap_or(&[])
}

/// Renames repeated sibling titles to `Title (2)`, `Title (3)`, ... skipping
/// any name another sibling already uses. Returns how many were renamed.
fn disambiguate_siblings(nodes: &mut [TicketNode]) -> usize {
    let originals = nodes
        .iter()
        .map(|node| node.title.clone())
        .collect::<HashSet<_>>();
    let mut taken = HashSet::with_capacity(nodes.len());
    let mut renamed = 0;

    for node in nodes.iter_mut() {
        if taken.insert(node.title.clone()) {
            continue;
        }
        let mut suffix = 2;
        let unique = loop {
            let candidate = format!("{} ({suffix})", node.title);
            if !taken.contains(&candidate) && !originals.contains(&candidate) {
                break candidate;
            }
            suffix += 1;
        };
        debug!(from = %node.title, to = %unique, "renamed duplicate sibling");
        taken.insert(unique.clone());
        node.title = unique;
        renamed += 1;
    }

    renamed
}
