//! Tree operations over JSON configuration documents.
//!
//! Template bodies, project documents and parameter values are all plain
//! [`serde_json::Value`] trees. Everything here is pure: inputs are never
//! touched in place unless the function takes `&mut`.

use regex::{Captures, Regex};
use serde_json::{Map, Value};
use std::sync::OnceLock;

// ---------------------------------------------------------------------------
// Placeholders
// ---------------------------------------------------------------------------

static TOKEN_RE: OnceLock<Regex> = OnceLock::new();

fn token_re() -> &'static Regex {
    TOKEN_RE.get_or_init(|| Regex::new(r"\{\{\s*([^{}\s]+)\s*\}\}").unwrap())
}

/// Canonical placeholder token for a parameter: `{{ name }}`.
pub fn placeholder(name: &str) -> String {
    format!("{{{{ {name} }}}}")
}

/// Names of every placeholder token appearing in string leaves of `doc`,
/// in first-seen order without duplicates.
pub fn placeholder_names(doc: &Value) -> Vec<String> {
    let mut names = Vec::new();
    collect_placeholders(doc, &mut names);
    names
}

fn collect_placeholders(doc: &Value, out: &mut Vec<String>) {
    match doc {
        Value::String(s) => {
            for caps in token_re().captures_iter(s) {
                let name = &caps[1];
                if !out.iter().any(|n| n == name) {
                    out.push(name.to_string());
                }
            }
        }
        Value::Array(items) => items.iter().for_each(|v| collect_placeholders(v, out)),
        Value::Object(map) => map.values().for_each(|v| collect_placeholders(v, out)),
        _ => {}
    }
}

// ---------------------------------------------------------------------------
// Deep merge
// ---------------------------------------------------------------------------

/// Merge `overlay` onto `base`.
///
/// Maps present on both sides merge recursively, sequences present on both
/// sides concatenate (base elements first), and in every other case the
/// overlay value replaces the base value. Keys keep the position they have
/// in `base`; keys only in `overlay` are appended.
pub fn deep_merge(base: Value, overlay: Value) -> Value {
    match (base, overlay) {
        (Value::Object(mut base), Value::Object(overlay)) => {
            for (key, value) in overlay {
                match base.get_mut(&key) {
                    Some(slot) => {
                        let existing = std::mem::take(slot);
                        *slot = deep_merge(existing, value);
                    }
                    None => {
                        base.insert(key, value);
                    }
                }
            }
            Value::Object(base)
        }
        (Value::Array(mut base), Value::Array(overlay)) => {
            base.extend(overlay);
            Value::Array(base)
        }
        (_, overlay) => overlay,
    }
}

/// Like [`deep_merge`], except sequences are replaced rather than
/// concatenated. Used for user-supplied configuration updates, where a
/// list is a setting in its own right.
pub fn overlay(base: Value, update: Value) -> Value {
    match (base, update) {
        (Value::Object(mut base), Value::Object(update)) => {
            for (key, value) in update {
                match base.get_mut(&key) {
                    Some(slot) => {
                        let existing = std::mem::take(slot);
                        *slot = overlay(existing, value);
                    }
                    None => {
                        base.insert(key, value);
                    }
                }
            }
            Value::Object(base)
        }
        (_, update) => update,
    }
}

// ---------------------------------------------------------------------------
// Substitution
// ---------------------------------------------------------------------------

/// Replace placeholder tokens in string leaves with parameter values.
///
/// A string consisting of exactly one token becomes the parameter value
/// itself, keeping its JSON type. A token embedded in a longer string is
/// replaced by the value's text: strings verbatim, anything else as compact
/// JSON. Tokens that name no known parameter are left as they are. Map keys
/// are never rewritten.
pub fn substitute(doc: &Value, values: &Map<String, Value>) -> Value {
    match doc {
        Value::String(s) => substitute_str(s, values),
        Value::Array(items) => Value::Array(items.iter().map(|v| substitute(v, values)).collect()),
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), substitute(v, values)))
                .collect(),
        ),
        other => other.clone(),
    }
}

fn substitute_str(s: &str, values: &Map<String, Value>) -> Value {
    if let Some(caps) = token_re().captures(s) {
        let whole = caps.get(0).map(|m| m.range());
        if whole == Some(0..s.len()) {
            if let Some(value) = values.get(&caps[1]) {
                return value.clone();
            }
        }
    }
    let replaced = token_re().replace_all(s, |caps: &Captures<'_>| match values.get(&caps[1]) {
        Some(value) => value_text(value),
        None => caps[0].to_string(),
    });
    Value::String(replaced.into_owned())
}

/// Text form of a value when spliced into a longer string.
pub fn value_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

// ---------------------------------------------------------------------------
// Parameterization
// ---------------------------------------------------------------------------

/// Inverse of [`substitute`], used when turning a project document into a
/// template: every string leaf that contains one of `names`
/// (case-insensitively) is replaced by that parameter's placeholder. The
/// first matching name wins.
pub fn parameterize(doc: &Value, names: &[&str]) -> Value {
    match doc {
        Value::String(s) => {
            let lowered = s.to_lowercase();
            names
                .iter()
                .filter(|n| !n.is_empty())
                .find(|n| lowered.contains(&n.to_lowercase()))
                .map(|n| Value::String(placeholder(n)))
                .unwrap_or_else(|| doc.clone())
        }
        Value::Array(items) => Value::Array(items.iter().map(|v| parameterize(v, names)).collect()),
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), parameterize(v, names)))
                .collect(),
        ),
        other => other.clone(),
    }
}

// ---------------------------------------------------------------------------
// Dot paths
// ---------------------------------------------------------------------------

/// Look up `aws.region`-style paths through nested maps.
pub fn get_path<'a>(doc: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.')
        .try_fold(doc, |node, key| node.as_object()?.get(key))
}

/// Set a dot path, creating (or replacing non-map values with) intermediate
/// maps as needed.
pub fn set_path(doc: &mut Value, path: &str, value: Value) {
    if !doc.is_object() {
        *doc = Value::Object(Map::new());
    }
    if let Value::Object(map) = doc {
        match path.split_once('.') {
            Some((head, rest)) => set_path(map.entry(head).or_insert(Value::Null), rest, value),
            None => {
                map.insert(path.to_string(), value);
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn params(v: Value) -> Map<String, Value> {
        v.as_object().cloned().unwrap()
    }

    #[test]
    fn merge_recurses_maps_and_concatenates_sequences() {
        let base = json!({"a": {"x": 1}, "b": [1, 2]});
        let child = json!({"a": {"y": 2}, "b": [3]});
        assert_eq!(
            deep_merge(base, child),
            json!({"a": {"x": 1, "y": 2}, "b": [1, 2, 3]})
        );
    }

    #[test]
    fn merge_child_scalar_wins() {
        let base = json!({"region": "us-east-1", "nested": {"keep": true, "mode": "a"}});
        let child = json!({"region": "eu-west-1", "nested": {"mode": "b"}});
        assert_eq!(
            deep_merge(base, child),
            json!({"region": "eu-west-1", "nested": {"keep": true, "mode": "b"}})
        );
    }

    #[test]
    fn merge_type_mismatch_takes_child() {
        let base = json!({"a": {"x": 1}, "b": [1]});
        let child = json!({"a": [1], "b": "flat"});
        assert_eq!(deep_merge(base, child), json!({"a": [1], "b": "flat"}));
    }

    #[test]
    fn merge_keeps_base_key_order() {
        let base = json!({"first": 1, "second": 2});
        let child = json!({"third": 3, "first": 10});
        let merged = deep_merge(base, child);
        let keys: Vec<&String> = merged.as_object().unwrap().keys().collect();
        assert_eq!(keys, ["first", "second", "third"]);
    }

    #[test]
    fn overlay_replaces_sequences() {
        let base = json!({"stages": ["build", "test"], "deploy": {"strategy": "rolling", "auto": true}});
        let update = json!({"stages": ["build"], "deploy": {"strategy": "canary"}});
        assert_eq!(
            overlay(base, update),
            json!({"stages": ["build"], "deploy": {"strategy": "canary", "auto": true}})
        );
    }

    #[test]
    fn substitute_whole_token_keeps_type() {
        let doc = json!({"port": "{{ port }}", "flags": "{{flags}}", "name": "{{ name }}"});
        let out = substitute(
            &doc,
            &params(json!({"port": 8080, "flags": ["a"], "name": "svc"})),
        );
        assert_eq!(out, json!({"port": 8080, "flags": ["a"], "name": "svc"}));
    }

    #[test]
    fn substitute_embedded_token_uses_text() {
        let doc = json!({"cmd": ["echo {{ name }} on {{ port }}", "{{ name }}-{{ debug }}"]});
        let out = substitute(
            &doc,
            &params(json!({"name": "api", "port": 80, "debug": false})),
        );
        assert_eq!(out, json!({"cmd": ["echo api on 80", "api-false"]}));
    }

    #[test]
    fn substitute_leaves_unknown_tokens_and_keys() {
        let doc = json!({"{{ name }}": "{{ other }}", "mixed": "x {{ other }} {{ name }}"});
        let out = substitute(&doc, &params(json!({"name": "svc"})));
        assert_eq!(
            out,
            json!({"{{ name }}": "{{ other }}", "mixed": "x {{ other }} svc"})
        );
    }

    #[test]
    fn placeholder_names_in_order() {
        let doc = json!({"a": "{{ lang }}", "b": ["{{ region }} {{lang}}"], "c": 1});
        assert_eq!(placeholder_names(&doc), ["lang", "region"]);
    }

    #[test]
    fn parameterize_matches_case_insensitively() {
        let doc = json!({"runtime": "Python", "app": "my-REGION-app", "n": 3, "tags": ["keep"]});
        let out = parameterize(&doc, &["region", "python"]);
        assert_eq!(
            out,
            json!({"runtime": "{{ python }}", "app": "{{ region }}", "n": 3, "tags": ["keep"]})
        );
    }

    #[test]
    fn get_and_set_dot_paths() {
        let mut doc = json!({"aws": {"region": "us-east-1"}, "flat": 1});
        assert_eq!(get_path(&doc, "aws.region"), Some(&json!("us-east-1")));
        assert_eq!(get_path(&doc, "aws.missing"), None);
        assert_eq!(get_path(&doc, "flat.deeper"), None);

        set_path(&mut doc, "aws.region", json!("eu-west-1"));
        set_path(&mut doc, "deployment.strategy.kind", json!("blue-green"));
        set_path(&mut doc, "flat.child", json!(true));
        assert_eq!(
            doc,
            json!({
                "aws": {"region": "eu-west-1"},
                "flat": {"child": true},
                "deployment": {"strategy": {"kind": "blue-green"}}
            })
        );
    }
}
