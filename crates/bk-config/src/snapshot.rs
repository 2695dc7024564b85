//! Content-addressed snapshot of a resolved document.

use crate::document::ResolvedDocument;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use std::path::PathBuf;

/// Identity of a resolved configuration at a point in time.
///
/// Two snapshots with the same `digest` were resolved to identical trees.
/// Used to tell whether a reload actually changed anything.
#[derive(Debug, Clone, Serialize)]
pub struct ConfigSnapshot {
    pub environment: String,
    pub source: PathBuf,
    /// Hex-encoded SHA-256 of the serialized tree.
    pub digest: String,
    pub version: Option<String>,
    pub captured_at: DateTime<Utc>,
}

impl ConfigSnapshot {
    pub fn capture(doc: &ResolvedDocument) -> Self {
        Self {
            environment: doc.environment().to_string(),
            source: doc.source().to_path_buf(),
            digest: digest(doc.root()),
            version: doc.version().map(str::to_string),
            captured_at: Utc::now(),
        }
    }

    pub fn same_content(&self, other: &ConfigSnapshot) -> bool {
        self.digest == other.digest
    }
}

fn digest(root: &Value) -> String {
    let bytes = canonical(root).to_string();
    hex::encode(Sha256::digest(bytes.as_bytes()))
}

/// Rebuild `node` with mapping keys in sorted order.
fn canonical(node: &Value) -> Value {
    match node {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            Value::Object(
                keys.into_iter()
                    .map(|k| (k.clone(), canonical(&map[k])))
                    .collect::<Map<String, Value>>(),
            )
        }
        Value::Array(items) => Value::Array(items.iter().map(canonical).collect()),
        other => other.clone(),
    }
}
