//! Load an API document and resolve every `$ref` in it.
//!
//! Internal refs (`#/components/schemas/Book`) and external file refs
//! (`schemas.yaml#/Book`) are inlined. Each external file is loaded once.
//! A ref that points back into its own expansion is left as a `$ref`
//! object, since recursive schemas are legal. Anything unresolvable is an
//! error.

use super::DocumentSource;
use serde_json::{Map, Value};
use std::collections::{HashMap, HashSet, VecDeque};

/// Load the document at `location` and every file it references, then
/// return the fully dereferenced root.
pub async fn load_document(source: &dyn DocumentSource, location: &str) -> Result<Value, String> {
    let root = source.load(location).await?;
    check_shape(&root, location)?;

    let mut docs: HashMap<String, Value> = HashMap::new();
    let mut queue: VecDeque<String> = VecDeque::new();
    docs.insert(location.to_string(), root);
    queue.push_back(location.to_string());

    // Breadth-first over referenced files; only loading is async.
    while let Some(current) = queue.pop_front() {
        let mut refs = Vec::new();
        if let Some(doc) = docs.get(&current) {
            collect_refs(doc, &mut refs);
        }
        let mut files: Vec<String> = refs
            .iter()
            .filter_map(|r| split_ref(r, &current).ok())
            .map(|(file, _)| file)
            .filter(|file| !docs.contains_key(file))
            .collect();
        files.sort();
        files.dedup();
        for file in files {
            let doc = source
                .load(&file)
                .await
                .map_err(|e| format!("cannot resolve external $ref: {}", e))?;
            docs.insert(file.clone(), doc);
            queue.push_back(file);
        }
    }

    dereference(location, &docs)
}

/// Dereference the document stored under `root` using the preloaded `docs`.
pub fn dereference(root: &str, docs: &HashMap<String, Value>) -> Result<Value, String> {
    let doc = docs
        .get(root)
        .ok_or_else(|| format!("document '{}' not loaded", root))?;
    let mut active = HashSet::new();
    deref_value(doc, root, docs, &mut active)
}

/// Dereference a single self-contained document.
pub fn dereference_internal(doc: &Value) -> Result<Value, String> {
    let docs = HashMap::from([(String::new(), doc.clone())]);
    dereference("", &docs)
}

fn deref_value(
    value: &Value,
    current: &str,
    docs: &HashMap<String, Value>,
    active: &mut HashSet<(String, String)>,
) -> Result<Value, String> {
    match value {
        Value::Object(map) => {
            if let Some(Value::String(reference)) = map.get("$ref") {
                let (file, pointer) = split_ref(reference, current)?;
                let key = (file.clone(), pointer.clone());
                if active.contains(&key) {
                    return Ok(value.clone());
                }
                let doc = docs
                    .get(&file)
                    .ok_or_else(|| format!("unresolvable $ref '{}': '{}' not loaded", reference, file))?;
                let target = doc
                    .pointer(&pointer)
                    .ok_or_else(|| format!("unresolvable $ref '{}'", reference))?;
                active.insert(key.clone());
                let resolved = deref_value(target, &file, docs, active);
                active.remove(&key);
                return resolved;
            }
            let mut out = Map::with_capacity(map.len());
            for (k, v) in map {
                out.insert(k.clone(), deref_value(v, current, docs, active)?);
            }
            Ok(Value::Object(out))
        }
        Value::Array(items) => items
            .iter()
            .map(|v| deref_value(v, current, docs, active))
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Array),
        other => Ok(other.clone()),
    }
}

/// Split a `$ref` into (document, JSON pointer). An empty file part means
/// the document the ref appears in; any other file part is relative to the
/// directory of that document.
fn split_ref(reference: &str, current: &str) -> Result<(String, String), String> {
    let (file, fragment) = match reference.split_once('#') {
        Some((file, fragment)) => (file, fragment),
        None => (reference, ""),
    };
    if file.contains("://") {
        return Err(format!("remote $ref not supported: '{}'", reference));
    }
    if !fragment.is_empty() && !fragment.starts_with('/') {
        return Err(format!("invalid $ref fragment: '{}'", reference));
    }
    let file = if file.is_empty() {
        current.to_string()
    } else {
        relative_location(current, file)
    };
    Ok((file, percent_decode(fragment)))
}

/// Location of `file` as seen from the document at `current`, normalized so
/// every spelling of the same file shares one key.
fn relative_location(current: &str, file: &str) -> String {
    let mut segments: Vec<&str> = Vec::new();
    if !file.starts_with('/') {
        if let Some((dir, _)) = current.rsplit_once('/') {
            segments.extend(dir.split('/').filter(|s| !s.is_empty() && *s != "."));
        }
    }
    for segment in file.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                if matches!(segments.last(), Some(s) if *s != "..") {
                    segments.pop();
                } else {
                    segments.push("..");
                }
            }
            other => segments.push(other),
        }
    }
    let joined = segments.join("/");
    if file.starts_with('/') {
        format!("/{}", joined)
    } else {
        joined
    }
}

fn percent_decode(s: &str) -> String {
    let bytes = s.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' && i + 2 < bytes.len() {
            let hex = std::str::from_utf8(&bytes[i + 1..i + 3]).ok();
            if let Some(b) = hex.and_then(|h| u8::from_str_radix(h, 16).ok()) {
                out.push(b);
                i += 3;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).to_string()
}

fn collect_refs(value: &Value, out: &mut Vec<String>) {
    match value {
        Value::Object(map) => {
            if let Some(Value::String(r)) = map.get("$ref") {
                out.push(r.clone());
            }
            for v in map.values() {
                collect_refs(v, out);
            }
        }
        Value::Array(items) => {
            for v in items {
                collect_refs(v, out);
            }
        }
        _ => {}
    }
}

/// The root must be an object with an `openapi` version and a `paths` map.
fn check_shape(doc: &Value, location: &str) -> Result<(), String> {
    let obj = doc
        .as_object()
        .ok_or_else(|| format!("API definition {} is not a mapping", location))?;
    match obj.get("openapi") {
        Some(Value::String(_)) => {}
        _ => {
            return Err(format!(
                "API definition {} has no 'openapi' version",
                location
            ))
        }
    }
    match obj.get("paths") {
        Some(Value::Object(_)) => Ok(()),
        _ => Err(format!("API definition {} has no 'paths' mapping", location)),
    }
}
