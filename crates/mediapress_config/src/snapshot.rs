//! Immutable snapshot of the compression settings a cache was built under.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::types::CompressionConfig;

/// The compression settings in effect at the start of a run.
///
/// Stored verbatim in the cache manifest. When the stored snapshot differs
/// from the current one in any field, every cached artifact is considered
/// stale. Equality is structural.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConfigSnapshot(CompressionConfig);

/// A single field that differs between two snapshots.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigChange {
    /// Field name as it appears in `mediapress.toml`.
    pub field: String,
    /// Previous value rendered as JSON, or `null` when absent.
    pub old: String,
    /// Current value rendered as JSON, or `null` when absent.
    pub new: String,
}

impl ConfigSnapshot {
    /// Captures the given settings.
    pub fn capture(config: &CompressionConfig) -> Self {
        Self(config.clone())
    }

    /// The captured settings.
    pub fn settings(&self) -> &CompressionConfig {
        &self.0
    }

    /// The snapshot as a JSON object, the form it takes in the manifest.
    pub fn to_json(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }

    /// Returns `true` if a persisted snapshot (as raw JSON) is structurally
    /// equal to this one. Missing or extra fields count as differences.
    pub fn matches_json(&self, persisted: &Value) -> bool {
        self.to_json() == *persisted
    }

    /// Lists every field whose value differs from a persisted snapshot.
    ///
    /// Fields only present on one side are reported with `null` on the other.
    pub fn diff_json(&self, persisted: &Value) -> Vec<ConfigChange> {
        let current = self.to_json();
        let empty = serde_json::Map::new();
        let new_fields = current.as_object().unwrap_or(&empty);
        let old_fields = persisted.as_object().unwrap_or(&empty);

        let mut names: Vec<&String> = new_fields.keys().chain(old_fields.keys()).collect();
        names.sort();
        names.dedup();

        names
            .into_iter()
            .filter_map(|name| {
                let old = old_fields.get(name).unwrap_or(&Value::Null);
                let new = new_fields.get(name).unwrap_or(&Value::Null);
                (old != new).then(|| ConfigChange {
                    field: name.clone(),
                    old: old.to_string(),
                    new: new.to_string(),
                })
            })
            .collect()
    }
}
