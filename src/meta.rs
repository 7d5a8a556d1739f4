use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

pub const DEFAULT_META_FILE: &str = "project_build_meta.json";

/// Key/value context threaded through a step run.
///
/// The same type backs both the on-disk persisted meta and the in-memory
/// local scope of a single run; which one a value lives in is decided by the
/// step runner, not by this type. A key holding `null` is treated as absent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BuildMeta {
    values: Map<String, Value>,
}

impl BuildMeta {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_map(values: Map<String, Value>) -> Self {
        Self { values }
    }

    /// Reads the meta document at `path`. A missing, unreadable or malformed
    /// file yields an empty meta; first runs and corrupted files look the same.
    pub fn load(path: &Path) -> Self {
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(err) => {
                debug!(path = %path.display(), error = %err, "No build meta loaded");
                return Self::default();
            }
        };
        match serde_json::from_str::<Value>(&content) {
            Ok(Value::Object(values)) => Self { values },
            Ok(_) => {
                debug!(path = %path.display(), "Build meta is not a JSON object; ignoring");
                Self::default()
            }
            Err(err) => {
                debug!(path = %path.display(), error = %err, "Build meta is not valid JSON; ignoring");
                Self::default()
            }
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create build meta directory: {}", parent.display())
            })?;
        }
        let rendered =
            serde_json::to_string_pretty(&self.values).context("Failed to serialize build meta")?;
        fs::write(path, rendered)
            .with_context(|| format!("Failed to write build meta: {}", path.display()))?;
        Ok(())
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key).filter(|value| !value.is_null())
    }

    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.get(key).and_then(Value::as_bool)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(Value::as_str)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    pub fn set(&mut self, key: impl Into<String>, value: Value) {
        self.values.insert(key.into(), value);
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.values.remove(key)
    }

    /// Sub-mapping of the requested keys that are currently set.
    pub fn collect(&self, fields: &[&str]) -> Map<String, Value> {
        fields
            .iter()
            .filter_map(|field| {
                self.get(field)
                    .map(|value| ((*field).to_string(), value.clone()))
            })
            .collect()
    }

    /// Sets each pair unless the key already holds a value and `overwrite`
    /// is false.
    pub fn insert<I, K>(&mut self, overwrite: bool, pairs: I)
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<String>,
    {
        for (key, value) in pairs {
            let key = key.into();
            if overwrite || !self.contains(&key) {
                self.values.insert(key, value);
            }
        }
    }

    /// Overlays every entry of `other`, replacing existing values.
    pub fn extend(&mut self, other: &Map<String, Value>) {
        for (key, value) in other {
            self.values.insert(key.clone(), value.clone());
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.values.iter()
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.values
    }
}

#[cfg(test)]
mod tests {
    use super::BuildMeta;
    use serde_json::json;

    #[test]
    fn insert_respects_overwrite_flag() {
        let mut meta = BuildMeta::new();
        meta.set("version", json!("1.0.0.1"));
        meta.insert(false, [("version", json!("2.0.0.0")), ("branch", json!("main"))]);
        assert_eq!(meta.get_str("version"), Some("1.0.0.1"));
        assert_eq!(meta.get_str("branch"), Some("main"));

        meta.insert(true, [("version", json!("2.0.0.0"))]);
        assert_eq!(meta.get_str("version"), Some("2.0.0.0"));
    }

    #[test]
    fn null_values_count_as_absent() {
        let mut meta = BuildMeta::new();
        meta.set("stale", serde_json::Value::Null);
        assert!(!meta.contains("stale"));
        assert!(meta.collect(&["stale"]).is_empty());
        meta.insert(false, [("stale", json!(3))]);
        assert_eq!(meta.get("stale"), Some(&json!(3)));
    }

    #[test]
    fn collect_omits_missing_keys() {
        let mut meta = BuildMeta::new();
        meta.set("a", json!(1));
        meta.set("b", json!(true));
        let collected = meta.collect(&["a", "missing"]);
        assert_eq!(collected.len(), 1);
        assert_eq!(collected.get("a"), Some(&json!(1)));
    }
}
