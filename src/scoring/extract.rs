//! Tolerant field extraction from loosely shaped JSON scorer responses.
//!
//! Remote evaluators wrap their verdict in different envelopes (`choices[].message.content`,
//! `output.text`, `data[]`, fenced code blocks, JSON encoded inside strings). Instead of
//! matching each envelope, responses are expanded and searched for known keys at any depth.

use serde_json::Value;
use std::collections::{HashSet, VecDeque};

/// Nesting limit for expansion and search.
pub const MAX_DEPTH: usize = 32;

/// Strip a surrounding ```` ```json ```` / ```` ``` ```` fence.
pub fn strip_json_fence(text: &str) -> &str {
    let trimmed = text.trim();
    if !trimmed.starts_with("```") {
        return trimmed;
    }
    let body = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .unwrap_or(trimmed)
        .trim();
    body.strip_suffix("```").unwrap_or(body).trim()
}

/// Replace every string that holds a JSON object or array with the parsed value.
pub fn expand_embedded_json(value: Value) -> Value {
    expand(value, 0)
}

fn expand(value: Value, depth: usize) -> Value {
    if depth >= MAX_DEPTH {
        return value;
    }
    match value {
        Value::String(text) => {
            let cleaned = strip_json_fence(&text);
            if cleaned.starts_with('{') || cleaned.starts_with('[') {
                if let Ok(parsed) = serde_json::from_str::<Value>(cleaned) {
                    return expand(parsed, depth + 1);
                }
            }
            Value::String(text)
        }
        Value::Array(items) => Value::Array(items.into_iter().map(|v| expand(v, depth + 1)).collect()),
        Value::Object(map) => Value::Object(
            map.into_iter()
                .map(|(key, v)| (key, expand(v, depth + 1)))
                .collect(),
        ),
        other => other,
    }
}

/// Breadth-first search for `key`; the match nearest the root wins.
pub fn find_key<'a>(root: &'a Value, key: &str) -> Option<&'a Value> {
    let mut visited: HashSet<*const Value> = HashSet::new();
    let mut queue: VecDeque<(&Value, usize)> = VecDeque::from([(root, 0)]);

    while let Some((node, depth)) = queue.pop_front() {
        if depth > MAX_DEPTH || !visited.insert(node as *const Value) {
            continue;
        }
        match node {
            Value::Object(map) => {
                if let Some(found) = map.get(key) {
                    return Some(found);
                }
                queue.extend(map.values().map(|child| (child, depth + 1)));
            }
            Value::Array(items) => queue.extend(items.iter().map(|child| (child, depth + 1))),
            _ => {}
        }
    }
    None
}

/// Number or numeric string.
pub fn coerce_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(number) => number.as_f64(),
        Value::String(text) => text.trim().parse::<f64>().ok().filter(|n| n.is_finite()),
        _ => None,
    }
}

/// Depth-first numeric search: a bare number, else the first of `keys` that yields one,
/// else the first of `containers` that does, else the first array element that does.
pub fn find_number(value: &Value, keys: &[&str], containers: &[&str]) -> Option<f64> {
    find_number_at(value, keys, containers, 0)
}

fn find_number_at(value: &Value, keys: &[&str], containers: &[&str], depth: usize) -> Option<f64> {
    if depth > MAX_DEPTH {
        return None;
    }
    match value {
        Value::Number(_) | Value::String(_) => coerce_number(value),
        Value::Object(map) => keys
            .iter()
            .chain(containers.iter())
            .filter_map(|key| map.get(*key))
            .find_map(|child| find_number_at(child, keys, containers, depth + 1)),
        Value::Array(items) => items
            .iter()
            .find_map(|item| find_number_at(item, keys, containers, depth + 1)),
        _ => None,
    }
}
