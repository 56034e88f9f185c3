//! Raw document representation and dotted-path helpers.
//!
//! Stores persist entities as JSON objects. Field paths use dots to address
//! nested objects (`friendRequests.inbox`); when a path crosses an array the
//! remaining segments apply to every element.

use std::cmp::Ordering;

use serde_json::{Map, Value};

use crate::EntityId;

/// A stored document: a JSON object with an `id` key once persisted.
pub type Document = Map<String, Value>;

/// Key holding the identifier in every stored document.
pub const ID_FIELD: &str = "id";

/// Read the identifier of a stored document.
pub fn document_id(doc: &Document) -> Option<EntityId> {
    doc.get(ID_FIELD)
        .and_then(Value::as_str)
        .and_then(|s| s.parse().ok())
}

/// Split a dotted path into its segments.
pub fn segments(path: &str) -> Vec<&str> {
    path.split('.').filter(|s| !s.is_empty()).collect()
}

/// Resolve a dotted path through nested objects.
///
/// Does not descend into arrays; use [`collect_path`] for that.
pub fn get_path<'a>(doc: &'a Document, path: &str) -> Option<&'a Value> {
    let parts = segments(path);
    let (first, rest) = parts.split_first()?;
    let mut current = doc.get(*first)?;
    for part in rest {
        current = current.as_object()?.get(*part)?;
    }
    Some(current)
}

/// Mutable value at `path`, without creating anything.
pub fn get_path_mut<'a>(doc: &'a mut Document, path: &str) -> Option<&'a mut Value> {
    let parts = segments(path);
    let (first, rest) = parts.split_first()?;
    let mut current = doc.get_mut(*first)?;
    for part in rest {
        current = current.as_object_mut()?.get_mut(*part)?;
    }
    Some(current)
}

/// Mutable slot at `path`, creating intermediate objects as needed.
///
/// Returns `None` when an intermediate segment holds a non-object value.
pub fn get_path_mut_or_insert<'a>(doc: &'a mut Document, path: &str) -> Option<&'a mut Value> {
    let parts = segments(path);
    let (last, parents) = parts.split_last()?;
    let mut current = doc;
    for part in parents {
        let slot = current
            .entry(part.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        if slot.is_null() {
            *slot = Value::Object(Map::new());
        }
        current = slot.as_object_mut()?;
    }
    Some(current.entry(last.to_string()).or_insert(Value::Null))
}

/// Remove the value at `path`, returning it.
pub fn remove_path(doc: &mut Document, path: &str) -> Option<Value> {
    let parts = segments(path);
    let (last, parents) = parts.split_last()?;
    let mut current = doc;
    for part in parents {
        current = current.get_mut(*part)?.as_object_mut()?;
    }
    current.remove(*last)
}

/// Collect every leaf value under `path`, descending into arrays.
///
/// A leaf that is itself an array contributes each of its elements.
pub fn collect_path<'a>(doc: &'a Document, path: &str) -> Vec<&'a Value> {
    let parts = segments(path);
    let mut out = Vec::new();
    if let Some((first, rest)) = parts.split_first() {
        if let Some(value) = doc.get(*first) {
            collect_into(value, rest, &mut out);
        }
    }
    out
}

fn collect_into<'a>(value: &'a Value, rest: &[&str], out: &mut Vec<&'a Value>) {
    match (value, rest.split_first()) {
        (Value::Array(items), _) => {
            for item in items {
                collect_into(item, rest, out);
            }
        }
        (_, None) => out.push(value),
        (Value::Object(map), Some((next, tail))) => {
            if let Some(child) = map.get(*next) {
                collect_into(child, tail, out);
            }
        }
        _ => {}
    }
}

/// Apply `f` to every leaf under `path`, descending into arrays.
pub fn visit_path_mut(doc: &mut Document, path: &str, f: &mut dyn FnMut(&mut Value)) {
    let parts = segments(path);
    if let Some((first, rest)) = parts.split_first() {
        if let Some(value) = doc.get_mut(*first) {
            visit_into(value, rest, f);
        }
    }
}

fn visit_into(value: &mut Value, rest: &[&str], f: &mut dyn FnMut(&mut Value)) {
    if let Value::Array(items) = value {
        for item in items {
            visit_into(item, rest, f);
        }
        return;
    }
    match rest.split_first() {
        None => f(value),
        Some((next, tail)) => {
            if let Some(child) = value.as_object_mut().and_then(|m| m.get_mut(*next)) {
                visit_into(child, tail, f);
            }
        }
    }
}

/// Total order over JSON values used for sorting and range filters.
///
/// Null sorts first, then booleans, numbers, strings, arrays and objects.
/// RFC 3339 timestamps in the same offset compare correctly as strings.
pub fn compare_values(a: &Value, b: &Value) -> Ordering {
    fn rank(v: &Value) -> u8 {
        match v {
            Value::Null => 0,
            Value::Bool(_) => 1,
            Value::Number(_) => 2,
            Value::String(_) => 3,
            Value::Array(_) => 4,
            Value::Object(_) => 5,
        }
    }

    match (a, b) {
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        (Value::Number(x), Value::Number(y)) => {
            let x = x.as_f64().unwrap_or(0.0);
            let y = y.as_f64().unwrap_or(0.0);
            x.partial_cmp(&y).unwrap_or(Ordering::Equal)
        }
        (Value::String(x), Value::String(y)) => x.cmp(y),
        (Value::Array(x), Value::Array(y)) => x
            .iter()
            .zip(y.iter())
            .map(|(l, r)| compare_values(l, r))
            .find(|o| *o != Ordering::Equal)
            .unwrap_or_else(|| x.len().cmp(&y.len())),
        _ => rank(a).cmp(&rank(b)),
    }
}

/// Replace loaded sub-documents under `path` with their identifiers.
///
/// Used before persisting so reference fields always store ids.
pub fn collapse_refs(doc: &mut Document, path: &str) {
    visit_path_mut(doc, path, &mut |value: &mut Value| {
        let id = value
            .as_object()
            .and_then(|obj| obj.get(ID_FIELD))
            .filter(|id| id.is_string())
            .cloned();
        if let Some(id) = id {
            *value = id;
        }
    });
}
