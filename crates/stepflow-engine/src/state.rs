use serde::{Deserialize, Serialize};
use serde_json::Value;

use stepflow_core::types::StateMap;

/// Shared key/value state threaded through a run.
///
/// Values are JSON, so tool outputs and seeded state keep their dynamic shape
/// while staying serializable and comparable. Mutations are never rolled back.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StateStore {
    data: StateMap,
}

impl StateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a StateStore from initial data.
    pub fn from_map(data: StateMap) -> Self {
        Self { data }
    }

    /// Get a value by key.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.data.get(key)
    }

    /// Set a value.
    pub fn set(&mut self, key: impl Into<String>, value: Value) {
        self.data.insert(key.into(), value);
    }

    /// Resolve a dotted key path; numeric segments index into lists.
    pub fn lookup<S: AsRef<str>>(&self, path: &[S]) -> Option<&Value> {
        let (first, rest) = path.split_first()?;
        let mut current = self.data.get(first.as_ref())?;
        for segment in rest {
            let segment = segment.as_ref();
            current = match current {
                Value::Object(map) => map.get(segment)?,
                Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
                _ => return None,
            };
        }
        Some(current)
    }

    /// Merge another mapping into this one (overwrites on conflict).
    pub fn merge(&mut self, other: StateMap) {
        for (k, v) in other {
            self.data.insert(k, v);
        }
    }

    /// Record a tool output.
    ///
    /// With an output key the whole output is stored under it. Without one, a
    /// mapping output is merged into state and any other output is stored
    /// under `{node_id}_output`.
    pub fn apply_output(&mut self, node_id: &str, output_key: Option<&str>, output: Value) {
        match (output_key, output) {
            (Some(key), output) => self.set(key, output),
            (None, Value::Object(map)) => self.merge(map),
            (None, output) => self.set(format!("{}_output", node_id), output),
        }
    }

    /// Resolve `{{key.path}}` placeholders in an argument template.
    ///
    /// A string that is exactly one placeholder is replaced by the raw value
    /// (null when absent). Placeholders embedded in longer strings are
    /// interpolated as text, with absent keys rendering empty.
    pub fn render(&self, template: &Value) -> Value {
        match template {
            Value::String(s) => self.render_str(s),
            Value::Array(items) => Value::Array(items.iter().map(|v| self.render(v)).collect()),
            Value::Object(map) => Value::Object(
                map.iter()
                    .map(|(k, v)| (k.clone(), self.render(v)))
                    .collect(),
            ),
            other => other.clone(),
        }
    }

    fn render_str(&self, s: &str) -> Value {
        let trimmed = s.trim();
        if let Some(inner) = trimmed
            .strip_prefix("{{")
            .and_then(|rest| rest.strip_suffix("}}"))
        {
            if !inner.contains("{{") && !inner.contains("}}") {
                return self.lookup_key(inner).cloned().unwrap_or(Value::Null);
            }
        }

        let mut out = String::with_capacity(s.len());
        let mut rest = s;
        while let Some(start) = rest.find("{{") {
            out.push_str(&rest[..start]);
            let after = &rest[start + 2..];
            match after.find("}}") {
                Some(end) => {
                    if let Some(value) = self.lookup_key(&after[..end]) {
                        match value {
                            Value::String(text) => out.push_str(text),
                            other => out.push_str(&other.to_string()),
                        }
                    }
                    rest = &after[end + 2..];
                }
                None => {
                    out.push_str(&rest[start..]);
                    rest = "";
                }
            }
        }
        out.push_str(rest);
        Value::String(out)
    }

    fn lookup_key(&self, key: &str) -> Option<&Value> {
        let path: Vec<&str> = key.trim().split('.').collect();
        self.lookup(&path)
    }

    /// Get the underlying data map.
    pub fn data(&self) -> &StateMap {
        &self.data
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn store(value: Value) -> StateStore {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_basic_operations() {
        let mut s = StateStore::new();
        s.set("name", json!("Alice"));
        s.set("count", json!(42));

        assert_eq!(s.get("name"), Some(&json!("Alice")));
        assert_eq!(s.get("count"), Some(&json!(42)));
        assert_eq!(s.get("missing"), None);
    }

    #[test]
    fn test_lookup_nested() {
        let s = store(json!({"a": {"b": [10, {"c": "deep"}]}}));
        assert_eq!(s.lookup(&["a", "b", "0"]), Some(&json!(10)));
        assert_eq!(s.lookup(&["a", "b", "1", "c"]), Some(&json!("deep")));
        assert_eq!(s.lookup(&["a", "x"]), None);
        assert_eq!(s.lookup(&["a", "b", "zero"]), None);
        assert_eq!(s.lookup::<&str>(&[]), None);
    }

    #[test]
    fn test_apply_output_with_key() {
        let mut s = StateStore::new();
        s.apply_output("n1", Some("result"), json!({"x": 1}));
        assert_eq!(s.get("result"), Some(&json!({"x": 1})));
        assert_eq!(s.get("x"), None);
    }

    #[test]
    fn test_apply_output_merges_mapping() {
        let mut s = store(json!({"keep": true, "x": 0}));
        s.apply_output("n1", None, json!({"x": 1, "y": 2}));
        assert_eq!(s.data().len(), 3);
        assert_eq!(s.get("x"), Some(&json!(1)));
        assert_eq!(s.get("keep"), Some(&json!(true)));
    }

    #[test]
    fn test_apply_output_scalar_without_key() {
        let mut s = StateStore::new();
        s.apply_output("count", None, json!(7));
        assert_eq!(s.get("count_output"), Some(&json!(7)));
    }

    #[test]
    fn test_render_whole_placeholder_keeps_type() {
        let s = store(json!({"values": [1, 2], "user": {"name": "Ada"}}));
        let out = s.render(&json!({"values": "{{values}}", "who": "{{ user.name }}", "n": 3}));
        assert_eq!(out, json!({"values": [1, 2], "who": "Ada", "n": 3}));
    }

    #[test]
    fn test_render_interpolates_strings() {
        let s = store(json!({"name": "Ada", "age": 36}));
        let out = s.render(&json!("{{name}} is {{age}}{{missing}}!"));
        assert_eq!(out, json!("Ada is 36!"));
    }

    #[test]
    fn test_render_missing_placeholder_is_null() {
        let s = StateStore::new();
        assert_eq!(s.render(&json!("{{nothing}}")), Value::Null);
        assert_eq!(s.render(&json!(["{{nothing}}"])), json!([null]));
    }

    #[test]
    fn test_render_unterminated_placeholder_kept() {
        let s = store(json!({"a": "x"}));
        assert_eq!(s.render(&json!("{{a}} {{b")), json!("x {{b"));
    }
}
